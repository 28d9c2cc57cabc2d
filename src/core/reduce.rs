//! Folds an ordered run of partial-message fragments into one message.

use serde::Deserialize;

use crate::core::message::{Message, Role, ToolCall, ToolFunction};

/// One incremental unit of a streamed message, after wire decoding.
/// Correlating fragments to a logical message is the caller's concern; every
/// fragment handed to [`reduce`] already belongs to the same message.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    pub role: Option<Role>,
    pub content: String,
    pub tool_calls: Vec<ToolCallDelta>,
    pub tool_call_id: Option<String>,
}

impl Fragment {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Self::default()
        }
    }
}

/// Partial update to one tool call, keyed by `id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

struct ToolCallAccumulator {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

/// Reduces the fragments of one logical message, in arrival order, into the
/// complete message.
///
/// Content concatenates across fragments. Tool-call argument fragments
/// concatenate per call id, in arrival order, with calls emitted in the order
/// their ids first appeared; a name that was established once is never
/// blanked by a later delta that omits it. The first fragment supplies the
/// message role.
///
/// # Panics
///
/// Panics if `fragments` is empty. Callers only invoke the reducer for ids
/// that have received at least one fragment.
pub fn reduce(fragments: &[Fragment]) -> Message {
    assert!(
        !fragments.is_empty(),
        "reduce requires at least one fragment"
    );

    let role = fragments[0].role.unwrap_or(Role::Assistant);
    let mut content = String::new();
    let mut tool_call_id = None;
    let mut calls: Vec<ToolCallAccumulator> = Vec::new();

    for fragment in fragments {
        content.push_str(&fragment.content);

        for delta in &fragment.tool_calls {
            // A delta without a call id cannot be correlated; skip it.
            let Some(call_id) = delta.id.as_deref() else {
                continue;
            };
            let name = delta
                .function
                .as_ref()
                .and_then(|function| function.name.as_deref())
                .unwrap_or_default();
            let arguments = delta
                .function
                .as_ref()
                .and_then(|function| function.arguments.as_deref())
                .unwrap_or_default();

            match calls.iter_mut().find(|call| call.id == call_id) {
                Some(call) => {
                    call.arguments.push_str(arguments);
                    if !name.is_empty() {
                        call.name = name.to_string();
                    }
                }
                None => calls.push(ToolCallAccumulator {
                    id: call_id.to_string(),
                    kind: delta
                        .kind
                        .clone()
                        .unwrap_or_else(|| "function".to_string()),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                }),
            }
        }

        if let Some(id) = &fragment.tool_call_id {
            tool_call_id = Some(id.clone());
        }
    }

    let tool_calls = if calls.is_empty() {
        None
    } else {
        Some(
            calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    kind: call.kind,
                    function: ToolFunction {
                        name: call.name,
                        arguments: call.arguments,
                    },
                })
                .collect(),
        )
    };

    Message {
        role,
        content,
        tool_calls,
        tool_call_id,
    }
}
