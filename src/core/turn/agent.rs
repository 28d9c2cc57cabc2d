//! Chat-agent adapter: deltas keyed by message id, so an assistant text
//! message and a tool-call message may interleave within one stream. Each id
//! gets its own fragment buffer and render slot, created in first-seen order.

use futures_util::StreamExt;
use tracing::warn;

use super::{fallback_sync, SlotId, TurnCanvas, THINKING_PLACEHOLDER};
use crate::api::client::{BoxError, Endpoint};
use crate::api::AgentChunk;
use crate::core::message::{AssistantResponse, Message};
use crate::core::reduce::{reduce, Fragment};

struct MessageBuffer {
    fragments: Vec<Fragment>,
    slot: SlotId,
}

pub(super) async fn run(
    endpoint: &dyn Endpoint,
    canvas: &mut dyn TurnCanvas,
    input_messages: &[Message],
    return_traces: bool,
) -> Result<AssistantResponse, BoxError> {
    canvas.placeholder(THINKING_PLACEHOLDER);
    match stream_attempt(endpoint, canvas, input_messages, return_traces).await {
        Ok(response) => Ok(response),
        Err(e) => {
            warn!(error = %e, "streaming attempt failed; retrying without streaming");
            fallback_sync(endpoint, canvas, input_messages, return_traces).await
        }
    }
}

async fn stream_attempt(
    endpoint: &dyn Endpoint,
    canvas: &mut dyn TurnCanvas,
    input_messages: &[Message],
    return_traces: bool,
) -> Result<AssistantResponse, BoxError> {
    let mut stream = endpoint.query_stream(input_messages, return_traces).await?;
    // Buffers in first-seen-id order; slots keep that order even as later
    // fragments update earlier ids.
    let mut buffers: Vec<(String, MessageBuffer)> = Vec::new();
    let mut request_id = None;

    while let Some(fragment) = stream.next().await {
        let value = fragment?;
        let Ok(chunk) = serde_json::from_value::<AgentChunk>(value) else {
            continue;
        };
        if let Some(output) = chunk.databricks_output {
            if let Some(id) = output.databricks_request_id {
                request_id = Some(id);
            }
        }
        // A delta without a message id cannot be correlated; skip it.
        let Some(message_id) = chunk.delta.id.clone() else {
            continue;
        };
        let fragment = chunk.delta.into_fragment();

        let index = match buffers.iter().position(|(id, _)| *id == message_id) {
            Some(index) => index,
            None => {
                buffers.push((
                    message_id,
                    MessageBuffer {
                        fragments: Vec::new(),
                        slot: canvas.open_slot(),
                    },
                ));
                buffers.len() - 1
            }
        };
        let buffer = &mut buffers[index].1;
        buffer.fragments.push(fragment);
        let partial = reduce(&buffer.fragments);
        canvas.update_slot(buffer.slot, &partial);
    }

    let messages = buffers
        .iter()
        .map(|(_, buffer)| reduce(&buffer.fragments))
        .collect();
    Ok(AssistantResponse {
        messages,
        request_id,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::test_support::{CanvasOp, RecordingCanvas, ScriptedEndpoint};
    use super::super::RETRY_PLACEHOLDER;
    use super::*;
    use crate::core::message::Role;

    fn content_chunk(id: &str, text: &str) -> serde_json::Value {
        json!({"delta": {"id": id, "role": "assistant", "content": text}})
    }

    #[tokio::test]
    async fn interleaved_ids_finalize_in_first_seen_order() {
        let endpoint = ScriptedEndpoint::streaming(vec![
            Ok(content_chunk("msg-a", "Al")),
            Ok(content_chunk("msg-b", "Be")),
            Ok(content_chunk("msg-a", "pha")),
            Ok(content_chunk("msg-b", "ta")),
        ]);
        let mut canvas = RecordingCanvas::default();
        let response = run(&endpoint, &mut canvas, &[Message::user("hi")], true)
            .await
            .unwrap();

        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.messages[0].content, "Alpha");
        assert_eq!(response.messages[1].content, "Beta");

        // Slot 0 belongs to msg-a and keeps receiving updates after slot 1
        // exists, without the slots reordering.
        let slot_a = canvas.updates_for(SlotId(0));
        assert_eq!(slot_a.last().unwrap().content, "Alpha");
        let slot_b = canvas.updates_for(SlotId(1));
        assert_eq!(slot_b.last().unwrap().content, "Beta");
    }

    #[tokio::test]
    async fn each_fragment_rerenders_the_partial_reduction() {
        let endpoint = ScriptedEndpoint::streaming(vec![
            Ok(content_chunk("msg-1", "He")),
            Ok(content_chunk("msg-1", "llo")),
        ]);
        let mut canvas = RecordingCanvas::default();
        run(&endpoint, &mut canvas, &[Message::user("hi")], true)
            .await
            .unwrap();
        let updates = canvas.updates_for(SlotId(0));
        assert_eq!(updates[0].content, "He");
        assert_eq!(updates[1].content, "Hello");
    }

    #[tokio::test]
    async fn tool_calls_stream_across_fragments_of_one_id() {
        let endpoint = ScriptedEndpoint::streaming(vec![
            Ok(json!({"delta": {
                "id": "msg-1",
                "role": "assistant",
                "tool_calls": [{"id": "c1", "function": {"name": "lookup", "arguments": "{\"q\":"}}]
            }})),
            Ok(json!({"delta": {
                "id": "msg-1",
                "tool_calls": [{"id": "c1", "function": {"arguments": "\"x\"}"}}]
            }})),
        ]);
        let mut canvas = RecordingCanvas::default();
        let response = run(&endpoint, &mut canvas, &[Message::user("hi")], true)
            .await
            .unwrap();
        let calls = response.messages[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "lookup");
        assert_eq!(calls[0].function.arguments, "{\"q\":\"x\"}");
    }

    #[tokio::test]
    async fn tool_result_deltas_become_tool_messages() {
        let endpoint = ScriptedEndpoint::streaming(vec![Ok(json!({"delta": {
            "id": "msg-2",
            "role": "tool",
            "content": "42",
            "tool_call_id": "c1"
        }}))]);
        let mut canvas = RecordingCanvas::default();
        let response = run(&endpoint, &mut canvas, &[Message::user("hi")], true)
            .await
            .unwrap();
        assert_eq!(response.messages[0].role, Role::Tool);
        assert_eq!(response.messages[0].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn request_id_rides_the_provider_envelope() {
        let endpoint = ScriptedEndpoint::streaming(vec![Ok(json!({
            "delta": {"id": "msg-1", "content": "Hi"},
            "databricks_output": {"databricks_request_id": "req-7"}
        }))]);
        let mut canvas = RecordingCanvas::default();
        let response = run(&endpoint, &mut canvas, &[Message::user("hi")], true)
            .await
            .unwrap();
        assert_eq!(response.request_id.as_deref(), Some("req-7"));
    }

    #[tokio::test]
    async fn mid_stream_failure_discards_multi_id_state_and_falls_back() {
        let fallback = vec![
            Message::assistant("answer"),
            Message::tool("c1", "result"),
        ];
        let endpoint = ScriptedEndpoint::streaming(vec![
            Ok(content_chunk("msg-a", "par")),
            Ok(content_chunk("msg-b", "tial")),
            Err("stream cut".to_string()),
        ])
        .with_sync(fallback.clone(), None);
        let mut canvas = RecordingCanvas::default();
        let response = run(&endpoint, &mut canvas, &[Message::user("hi")], true)
            .await
            .unwrap();

        assert_eq!(response.messages, fallback);
        assert!(canvas
            .ops
            .contains(&CanvasOp::Placeholder(RETRY_PLACEHOLDER.to_string())));
        assert_eq!(canvas.last_replace(), Some(&fallback));
    }
}
