use eventsource_stream::{Event, EventStreamError};
use futures_util::stream::{self, Stream, StreamExt};
use log::{trace, warn};
use serde::Deserialize;
use serde_json::Value;

use super::error::{api_error_message, CompletionError};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChunkEvent {
    Delta(String),
    /// Role announcements, finish markers and other events without text.
    Empty,
    Done,
}

/// Decodes the `data` field of one SSE event.
pub fn parse_chunk(data: &str) -> Result<ChunkEvent, CompletionError> {
    let data = data.trim();
    if data == DONE_MARKER {
        return Ok(ChunkEvent::Done);
    }
    if data.is_empty() {
        return Ok(ChunkEvent::Empty);
    }

    let json: Value = serde_json::from_str(data)
        .map_err(|e| CompletionError::Malformed(format!("{}, data: {}", e, data)))?;

    if json.get("error").is_some() {
        let message = api_error_message(data)
            .unwrap_or_else(|| "An error occurred during streaming".to_string());
        return Err(CompletionError::Stream(message));
    }

    let chunk: ChatCompletionChunk = serde_json::from_value(json)
        .map_err(|e| CompletionError::Malformed(format!("{}, data: {}", e, data)))?;

    let text: String = chunk
        .choices
        .into_iter()
        .take(1)
        .filter_map(|choice| choice.delta.content)
        .collect();

    if text.is_empty() {
        Ok(ChunkEvent::Empty)
    } else {
        Ok(ChunkEvent::Delta(text))
    }
}

/// Turns a stream of SSE events into a stream of text increments.
///
/// Ends after `[DONE]` or after the first error; a source that runs dry
/// before `[DONE]` yields [`CompletionError::Incomplete`].
pub fn text_deltas<S, E>(events: S) -> impl Stream<Item = Result<String, CompletionError>>
where
    S: Stream<Item = Result<Event, EventStreamError<E>>> + Unpin,
    E: std::fmt::Display,
{
    stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            let event = match events.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!("SSE stream error: {}", e);
                    return Some((Err(CompletionError::Stream(e.to_string())), None));
                }
                None => {
                    warn!("SSE stream closed before [DONE]");
                    return Some((Err(CompletionError::Incomplete), None));
                }
            };

            trace!("SSE event: {:?}", event.data);
            match parse_chunk(&event.data) {
                Ok(ChunkEvent::Delta(text)) => return Some((Ok(text), Some(events))),
                Ok(ChunkEvent::Empty) => continue,
                Ok(ChunkEvent::Done) => return None,
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
}
