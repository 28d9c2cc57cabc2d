//! Plain chat-completions adapter: exactly one logical assistant message per
//! turn, re-rendered in full after every content fragment.

use futures_util::StreamExt;
use tracing::warn;

use super::{fallback_sync, SlotId, TurnCanvas, THINKING_PLACEHOLDER};
use crate::api::client::{BoxError, Endpoint};
use crate::api::CompletionsChunk;
use crate::core::message::{AssistantResponse, Message};

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
    let mut accumulated = String::new();
    let mut request_id = None;
    let mut slot: Option<SlotId> = None;

    while let Some(fragment) = stream.next().await {
        let value = fragment?;
        // A fragment that does not decode is skipped, never fatal.
        let Ok(chunk) = serde_json::from_value::<CompletionsChunk>(value) else {
            continue;
        };
        if let Some(output) = chunk.databricks_output {
            if let Some(id) = output.databricks_request_id {
                request_id = Some(id);
            }
        }
        let Some(content) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        else {
            continue;
        };
        if content.is_empty() {
            continue;
        }
        accumulated.push_str(&content);
        let target = *slot.get_or_insert_with(|| canvas.open_slot());
        canvas.update_slot(target, &Message::assistant(accumulated.clone()));
    }

    Ok(AssistantResponse {
        messages: vec![Message::assistant(accumulated)],
        request_id,
    })
}
