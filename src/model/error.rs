use thiserror::Error;

/// Why a chat completion did not produce a reply.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("the API key was rejected: {0}")]
    Unauthorized(String),

    #[error("rate limited by the completion API: {0}")]
    RateLimited(String),

    #[error("completion API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request to the completion API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion stream failed: {0}")]
    Stream(String),

    #[error("malformed completion chunk: {0}")]
    Malformed(String),

    #[error("completion stream closed before it finished")]
    Incomplete,
}

impl CompletionError {
    /// Maps a non-success HTTP status and its body to an error kind.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
        match status {
            401 | 403 => CompletionError::Unauthorized(message),
            429 => CompletionError::RateLimited(message),
            _ => CompletionError::Api { status, message },
        }
    }

    /// Stable machine-readable name of the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::Unauthorized(_) => "unauthorized",
            CompletionError::RateLimited(_) => "rate_limited",
            CompletionError::Api { .. } => "api",
            CompletionError::Transport(_) => "transport",
            CompletionError::Stream(_) => "stream",
            CompletionError::Malformed(_) => "malformed",
            CompletionError::Incomplete => "incomplete",
        }
    }
}

/// Pulls `error.message` out of an OpenAI-style error body.
pub fn api_error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    error.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = CompletionError::from_status(401, body);
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(err.to_string(), "the API key was rejected: Incorrect API key provided");

        assert_eq!(CompletionError::from_status(429, "slow down").kind(), "rate_limited");

        match CompletionError::from_status(500, "  upstream exploded \n") {
            CompletionError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn string_error_bodies_are_read() {
        assert_eq!(api_error_message(r#"{"error":"boom"}"#), Some("boom".to_string()));
        assert_eq!(api_error_message(r#"{"ok":true}"#), None);
        assert_eq!(api_error_message("<html>"), None);
    }
}
