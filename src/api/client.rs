//! HTTP client for serving-endpoint queries.
//!
//! Streaming queries return a lazy pull-based sequence of raw JSON fragments
//! decoded from SSE lines; non-streaming queries normalize whichever of the
//! three response shapes the endpoint returns into the common message list.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use memchr::memchr;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{EndpointMetadata, QueryOptions, QueryRequest, ResponseItem};
use crate::core::message::Message;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Lazy sequence of raw protocol fragments. Transport failures surface as
/// stream items so the consumer can switch to the non-streaming fallback.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Value, BoxError>> + Send>>;

/// Call contract for a remote model-serving endpoint.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn query_stream(
        &self,
        messages: &[Message],
        return_traces: bool,
    ) -> Result<FragmentStream, BoxError>;

    async fn query_sync(
        &self,
        messages: &[Message],
        return_traces: bool,
    ) -> Result<(Vec<Message>, Option<String>), BoxError>;
}

pub struct EndpointClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    endpoint: String,
}

impl EndpointClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            endpoint: endpoint.into(),
        }
    }

    fn invocations_url(&self) -> String {
        join_url(
            &self.base_url,
            &format!("serving-endpoints/{}/invocations", self.endpoint),
        )
    }

    fn metadata_url(&self) -> String {
        join_url(
            &self.base_url,
            &format!("api/2.0/serving-endpoints/{}", self.endpoint),
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    fn query(&self, body: &QueryRequest<'_>) -> reqwest::RequestBuilder {
        self.authorize(
            self.client
                .post(self.invocations_url())
                .header("Content-Type", "application/json"),
        )
        .json(body)
    }

    /// Fetches the endpoint's task classifier string. A lookup failure is
    /// not fatal: the empty label classifies as plain chat completions.
    pub async fn task_label(&self) -> String {
        let request = self.authorize(self.client.get(self.metadata_url()));
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<EndpointMetadata>().await {
                    Ok(metadata) => metadata.task.unwrap_or_default(),
                    Err(e) => {
                        warn!(error = %e, "could not decode endpoint metadata");
                        String::new()
                    }
                }
            }
            Ok(response) => {
                warn!(status = %response.status(), "endpoint metadata lookup failed");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "endpoint metadata lookup failed");
                String::new()
            }
        }
    }
}

#[async_trait]
impl Endpoint for EndpointClient {
    async fn query_stream(
        &self,
        messages: &[Message],
        return_traces: bool,
    ) -> Result<FragmentStream, BoxError> {
        let body = QueryRequest {
            messages,
            stream: Some(true),
            databricks_options: return_traces.then_some(QueryOptions { return_trace: true }),
        };
        let response = self.query(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(api_error(status, &body).into());
        }

        let bytes = response.bytes_stream().boxed();
        let state = (bytes, Vec::new(), VecDeque::new(), false);
        Ok(Box::pin(stream::unfold(
            state,
            |(mut bytes, mut buffer, mut pending, mut done)| async move {
                loop {
                    if let Some(value) = pending.pop_front() {
                        return Some((Ok(value), (bytes, buffer, pending, done)));
                    }
                    if done {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.extend_from_slice(&chunk);
                            if scan_sse_buffer(&mut buffer, &mut pending) {
                                done = true;
                            }
                        }
                        Some(Err(e)) => {
                            done = true;
                            let error: BoxError = e.into();
                            return Some((Err(error), (bytes, buffer, pending, done)));
                        }
                        None => done = true,
                    }
                }
            },
        )))
    }

    async fn query_sync(
        &self,
        messages: &[Message],
        return_traces: bool,
    ) -> Result<(Vec<Message>, Option<String>), BoxError> {
        let body = QueryRequest {
            messages,
            stream: None,
            databricks_options: return_traces.then_some(QueryOptions { return_trace: true }),
        };
        let response = self.query(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(api_error(status, &body).into());
        }
        let value: Value = response.json().await?;
        normalize_sync_response(value)
    }
}

/// Scans `buffer` for complete SSE lines, queueing each decoded `data:`
/// payload. Returns true once the `[DONE]` terminator has been seen.
/// Lines that are not data payloads, and payloads that do not decode as
/// JSON, are skipped.
fn scan_sse_buffer(buffer: &mut Vec<u8>, pending: &mut VecDeque<Value>) -> bool {
    while let Some(newline_pos) = memchr(b'\n', buffer) {
        let line = String::from_utf8_lossy(&buffer[..newline_pos])
            .trim()
            .to_string();
        buffer.drain(..=newline_pos);

        let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
            continue;
        };
        if payload == "[DONE]" {
            buffer.clear();
            return true;
        }
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => pending.push_back(value),
            Err(e) => {
                if !payload.is_empty() {
                    debug!(error = %e, "skipping undecodable stream payload");
                }
            }
        }
    }
    false
}

/// Shapes a non-streaming response body into the common message list. The
/// three protocols answer with `messages`, `output` items, or `choices`
/// respectively; anything else is an error the caller surfaces.
fn normalize_sync_response(value: Value) -> Result<(Vec<Message>, Option<String>), BoxError> {
    let request_id = value
        .pointer("/databricks_output/databricks_request_id")
        .and_then(Value::as_str)
        .map(str::to_owned);

    if let Some(items) = value.get("messages").and_then(Value::as_array) {
        let messages = items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect();
        return Ok((messages, request_id));
    }

    if let Some(items) = value.get("output").and_then(Value::as_array) {
        let messages = items
            .iter()
            .filter_map(|item| serde_json::from_value::<ResponseItem>(item.clone()).ok())
            .flat_map(ResponseItem::into_messages)
            .collect();
        return Ok((messages, request_id));
    }

    if let Some(message) = value.pointer("/choices/0/message") {
        let message: Message = serde_json::from_value(message.clone())?;
        return Ok((vec![message], request_id));
    }

    Err("unrecognized response shape from serving endpoint".into())
}

fn api_error(status: reqwest::StatusCode, body: &str) -> String {
    let summary = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    });
    match summary {
        Some(summary) => format!("endpoint returned {status}: {summary}"),
        None => format!("endpoint returned {status}: {}", body.trim()),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
