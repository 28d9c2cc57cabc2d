//! Responses-event adapter: heterogeneous events whose items arrive complete,
//! appended to a flat output list that is redrawn in full after every event.

use futures_util::StreamExt;
use tracing::warn;

use super::{fallback_sync, TurnCanvas, THINKING_PLACEHOLDER};
use crate::api::client::{BoxError, Endpoint};
use crate::api::ResponsesEvent;
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
    let mut all_messages: Vec<Message> = Vec::new();
    let mut request_id = None;

    while let Some(fragment) = stream.next().await {
        let value = fragment?;
        let Ok(event) = serde_json::from_value::<ResponsesEvent>(value) else {
            continue;
        };
        if let Some(output) = event.databricks_output {
            if let Some(id) = output.databricks_request_id {
                request_id = Some(id);
            }
        }
        let Some(item) = event.item else {
            continue;
        };
        let translated = item.into_messages();
        if translated.is_empty() {
            continue;
        }
        all_messages.extend(translated);
        canvas.replace_all(&all_messages);
    }

    Ok(AssistantResponse {
        messages: all_messages,
        request_id,
    })
}
