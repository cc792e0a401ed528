pub mod error;
pub mod stream;

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use log::{debug, info, warn};
use reqwest::Client;
use serde::Serialize;

use crate::config::AppConfig;
use crate::web::models::Message;

pub use error::CompletionError;

/// Lazy, finite sequence of reply increments. Can be consumed once.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

// Client for an OpenAI-compatible chat-completion API
pub struct CompletionClient {
    base_url: String,
    model: String,
    client: Client,
}

impl CompletionClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!("Using chat-completion API at {} with model {}", base_url, model);

        Self {
            base_url,
            model,
            client: Client::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.openai_base_url.clone(), config.openai_model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Opens a streaming completion for `messages`.
    ///
    /// Fails up front on transport errors and non-success statuses; once the
    /// stream is returned, later failures arrive as its items.
    pub async fn stream_chat(
        &self,
        api_key: &str,
        messages: &[Message],
    ) -> Result<DeltaStream, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        info!("Requesting streamed completion with {} messages", messages.len());
        debug!("Payload: {}", serde_json::to_string(&payload).unwrap_or_default());

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Completion request failed with {}: {}", status, error_text);
            return Err(CompletionError::from_status(status.as_u16(), &error_text));
        }

        let events = Box::pin(response.bytes_stream().eventsource());
        Ok(Box::pin(stream::text_deltas(events)))
    }
}

/// Drains `deltas`, handing every increment to `on_delta`, and returns the
/// full reply. Stops at the first error.
pub async fn collect_reply<S, F>(mut deltas: S, mut on_delta: F) -> Result<String, CompletionError>
where
    S: Stream<Item = Result<String, CompletionError>> + Unpin,
    F: FnMut(&str),
{
    let mut reply = String::new();
    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        on_delta(&delta);
        reply.push_str(&delta);
    }
    info!("Response length: {} characters", reply.len());
    Ok(reply)
}
