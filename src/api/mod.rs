use serde::{Deserialize, Serialize};

use crate::core::message::{Message, Role, ToolCall, ToolFunction};
use crate::core::reduce::{Fragment, ToolCallDelta};

/// Request body for a serving-endpoint invocation. The same body serves the
/// streaming and non-streaming paths; `stream` is simply omitted for the
/// latter.
#[derive(Serialize)]
pub struct QueryRequest<'a> {
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub databricks_options: Option<QueryOptions>,
}

#[derive(Serialize)]
pub struct QueryOptions {
    pub return_trace: bool,
}

/// Provider envelope carried on stream fragments and sync responses; the
/// request id inside it correlates downstream feedback and telemetry.
#[derive(Deserialize)]
pub struct ProviderOutput {
    #[serde(default)]
    pub databricks_request_id: Option<String>,
}

/// Endpoint metadata, of which only the task classifier matters here.
#[derive(Deserialize)]
pub struct EndpointMetadata {
    #[serde(default)]
    pub task: Option<String>,
}

// Chat-completions stream fragments. Every fragment optionally carries one
// delta under choices[0] and optionally the provider envelope.

#[derive(Deserialize)]
pub struct CompletionsChunk {
    #[serde(default)]
    pub choices: Vec<CompletionsChoice>,
    #[serde(default)]
    pub databricks_output: Option<ProviderOutput>,
}

#[derive(Deserialize)]
pub struct CompletionsChoice {
    #[serde(default)]
    pub delta: CompletionsDelta,
}

#[derive(Default, Deserialize)]
pub struct CompletionsDelta {
    #[serde(default)]
    pub content: Option<String>,
}

// Chat-agent stream fragments: deltas keyed by message id, so several
// logical messages may interleave within one stream.

#[derive(Deserialize)]
pub struct AgentChunk {
    pub delta: AgentDelta,
    #[serde(default)]
    pub databricks_output: Option<ProviderOutput>,
}

#[derive(Deserialize)]
pub struct AgentDelta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl AgentDelta {
    pub fn into_fragment(self) -> Fragment {
        Fragment {
            role: self.role.as_deref().and_then(Role::parse),
            content: self.content.unwrap_or_default(),
            tool_calls: self.tool_calls.unwrap_or_default(),
            tool_call_id: self.tool_call_id,
        }
    }
}

// Responses event stream: heterogeneous events, each optionally carrying one
// complete output item.

#[derive(Deserialize)]
pub struct ResponsesEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub item: Option<ResponseItem>,
    #[serde(default)]
    pub databricks_output: Option<ProviderOutput>,
}

/// Output items are complete as received; there is no cross-event joining
/// for this format. Items with an unrecognized discriminant decode to
/// [`ResponseItem::Other`] and contribute nothing.
#[derive(Deserialize)]
#[serde(tag = "type")]
pub enum ResponseItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(rename = "function_call")]
    FunctionCall {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: String,
    },
    #[serde(rename = "function_call_output")]
    FunctionCallOutput {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        output: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

impl ResponseItem {
    /// Translates one output item into the common message shape. Only
    /// `output_text` parts of a `message` item carry visible text.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            ResponseItem::Message { content } => content
                .into_iter()
                .filter(|part| part.kind == "output_text" && !part.text.is_empty())
                .map(|part| Message::assistant(part.text))
                .collect(),
            ResponseItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                let call = ToolCall {
                    id: call_id.unwrap_or_default(),
                    kind: "function".to_string(),
                    function: ToolFunction {
                        name: name.unwrap_or_default(),
                        arguments,
                    },
                };
                vec![Message {
                    role: Role::Assistant,
                    content: String::new(),
                    tool_calls: Some(vec![call]),
                    tool_call_id: None,
                }]
            }
            ResponseItem::FunctionCallOutput { call_id, output } => {
                vec![Message::tool(call_id.unwrap_or_default(), output)]
            }
            ResponseItem::Other => Vec::new(),
        }
    }
}

pub mod client;
