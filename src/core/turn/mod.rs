//! Dispatches one chat turn to the adapter for the endpoint's wire format.
//!
//! Each adapter consumes the streaming fragment sequence, renders partial
//! state through the [`TurnCanvas`] seam as fragments arrive, and owns a
//! one-shot non-streaming fallback taken when the streaming attempt fails.
//! Accumulation state is scoped to one invocation and discarded wholesale
//! when the fallback runs.

mod agent;
mod completions;
mod responses;

use crate::api::client::{BoxError, Endpoint};
use crate::core::message::{AssistantResponse, Message};

pub(crate) const THINKING_PLACEHOLDER: &str = "Thinking…";
pub(crate) const RETRY_PLACEHOLDER: &str = "Ran into an error. Retrying without streaming…";

/// Which of the three wire protocols a serving endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Responses,
    ChatAgent,
    Completions,
}

impl TaskKind {
    /// Maps an endpoint task label onto an adapter. Unknown labels are not
    /// an error; they fall through to plain chat completions.
    pub fn classify(label: &str) -> Self {
        match label {
            "agent/v1/responses" | "responses-stream" => TaskKind::Responses,
            "agent/v2/chat" | "chat-agent-stream" => TaskKind::ChatAgent,
            _ => TaskKind::Completions,
        }
    }

    /// Agent-style endpoints accept trace requests, which carry the request
    /// id used for feedback correlation.
    pub fn supports_traces(self) -> bool {
        matches!(self, TaskKind::Responses | TaskKind::ChatAgent)
    }
}

/// Identifies one render target created during a turn, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId(pub usize);

/// Rendering seam the adapters draw through while a turn is in flight.
pub trait TurnCanvas {
    /// Replaces the turn's display area with a transient notice.
    fn placeholder(&mut self, text: &str);

    /// Appends a new render target. Targets keep their creation order even
    /// when their contents update out of that order.
    fn open_slot(&mut self) -> SlotId;

    /// Redraws one render target in place with the latest partial message.
    fn update_slot(&mut self, slot: SlotId, message: &Message);

    /// Redraws the whole turn area from a complete message list.
    fn replace_all(&mut self, messages: &[Message]);
}

/// Runs one exchange against the endpoint, rendering as fragments arrive.
pub async fn run_turn(
    task: TaskKind,
    endpoint: &dyn Endpoint,
    canvas: &mut dyn TurnCanvas,
    input_messages: &[Message],
    return_traces: bool,
) -> Result<AssistantResponse, BoxError> {
    match task {
        TaskKind::Responses => responses::run(endpoint, canvas, input_messages, return_traces).await,
        TaskKind::ChatAgent => agent::run(endpoint, canvas, input_messages, return_traces).await,
        TaskKind::Completions => {
            completions::run(endpoint, canvas, input_messages, return_traces).await
        }
    }
}

/// One-shot non-streaming retry shared by the adapters. Partial streamed
/// state has already been discarded by the time this runs; whatever the
/// synchronous call returns is authoritative. Its failure propagates to the
/// caller as a visible chat error.
pub(crate) async fn fallback_sync(
    endpoint: &dyn Endpoint,
    canvas: &mut dyn TurnCanvas,
    input_messages: &[Message],
    return_traces: bool,
) -> Result<AssistantResponse, BoxError> {
    canvas.placeholder(RETRY_PLACEHOLDER);
    let (messages, request_id) = endpoint.query_sync(input_messages, return_traces).await?;
    canvas.replace_all(&messages);
    Ok(AssistantResponse {
        messages,
        request_id,
    })
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::{RecordingCanvas, ScriptedEndpoint};
    use super::*;
    use crate::core::message::Role;

    #[test]
    fn known_labels_map_to_their_adapters() {
        assert_eq!(TaskKind::classify("agent/v1/responses"), TaskKind::Responses);
        assert_eq!(TaskKind::classify("responses-stream"), TaskKind::Responses);
        assert_eq!(TaskKind::classify("agent/v2/chat"), TaskKind::ChatAgent);
        assert_eq!(TaskKind::classify("chat-agent-stream"), TaskKind::ChatAgent);
        assert_eq!(TaskKind::classify("chat/completions"), TaskKind::Completions);
    }

    #[test]
    fn unknown_labels_fall_through_to_completions() {
        assert_eq!(TaskKind::classify(""), TaskKind::Completions);
        assert_eq!(TaskKind::classify("llm/v1/embeddings"), TaskKind::Completions);
        assert!(!TaskKind::classify("whatever").supports_traces());
    }

    #[tokio::test]
    async fn dispatch_reaches_the_completions_adapter() {
        let endpoint = ScriptedEndpoint::streaming(vec![Ok(json!({
            "choices": [{"delta": {"content": "Hi"}}]
        }))]);
        let mut canvas = RecordingCanvas::default();
        let response = run_turn(
            TaskKind::Completions,
            &endpoint,
            &mut canvas,
            &[Message::user("hello")],
            false,
        )
        .await
        .unwrap();
        assert_eq!(response.messages[0].content, "Hi");
        assert_eq!(response.messages[0].role, Role::Assistant);
    }

    #[tokio::test]
    async fn failed_fallback_surfaces_as_an_error() {
        // Streaming refuses and the scripted sync path refuses too; the
        // error must reach the caller instead of being swallowed.
        let endpoint = ScriptedEndpoint::streaming(vec![Err("boom".to_string())]);
        let mut canvas = RecordingCanvas::default();
        let result = run_turn(
            TaskKind::ChatAgent,
            &endpoint,
            &mut canvas,
            &[Message::user("hello")],
            true,
        )
        .await;
        assert!(result.is_err());
    }
}
