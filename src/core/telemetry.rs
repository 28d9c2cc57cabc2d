//! Fire-and-forget usage telemetry with bounded redelivery.
//!
//! One event per exchange is posted from a spawned task; the chat turn never
//! waits on delivery and never sees a delivery failure.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 3;
const PAYLOAD_LIMIT: usize = 10_000;

#[derive(Serialize)]
struct ChatEvent {
    telemetry_id: String,
    endpoint: String,
    user_message: String,
    assistant_message: String,
    response_time_ms: u64,
    created_at: DateTime<Utc>,
}

/// Posts usage events to an ingest URL, if one is configured.
#[derive(Clone)]
pub struct TelemetrySink {
    client: reqwest::Client,
    ingest_url: Option<String>,
    endpoint: String,
}

impl TelemetrySink {
    pub fn new(
        client: reqwest::Client,
        ingest_url: Option<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            client,
            ingest_url,
            endpoint: endpoint.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ingest_url.is_some()
    }

    /// Records one exchange. Returns immediately; delivery (with bounded
    /// retry and backoff) happens on a background task.
    pub fn record(&self, user_text: &str, assistant_text: &str, response_time_ms: u64) {
        let Some(url) = self.ingest_url.clone() else {
            return;
        };
        let event = ChatEvent {
            telemetry_id: Uuid::new_v4().to_string(),
            endpoint: self.endpoint.clone(),
            user_message: truncate(user_text),
            assistant_message: truncate(assistant_text),
            response_time_ms,
            created_at: Utc::now(),
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            deliver(client, url, event).await;
        });
    }
}

async fn deliver(client: reqwest::Client, url: String, event: ChatEvent) {
    for attempt in 0..MAX_ATTEMPTS {
        match client.post(&url).json(&event).send().await {
            Ok(response) if response.status().is_success() => {
                info!(attempt, "telemetry delivered");
                return;
            }
            Ok(response) => {
                warn!(status = %response.status(), attempt, "telemetry ingest rejected event");
            }
            Err(e) => {
                warn!(error = %e, attempt, "telemetry delivery failed");
            }
        }
        if attempt + 1 < MAX_ATTEMPTS {
            // 1s, 2s, 4s
            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
        }
    }
    warn!("giving up on telemetry event after {MAX_ATTEMPTS} attempts");
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(PAYLOAD_LIMIT) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_character_boundaries() {
        let short = "hello";
        assert_eq!(truncate(short), "hello");

        let long: String = "é".repeat(PAYLOAD_LIMIT + 5);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), PAYLOAD_LIMIT);
    }

    #[tokio::test]
    async fn a_sink_without_a_url_is_disabled() {
        let sink = TelemetrySink::new(reqwest::Client::new(), None, "chat-ep");
        assert!(!sink.is_enabled());
        // No ingest URL: record is a no-op and spawns nothing.
        sink.record("hi", "there", 12);
    }
}
