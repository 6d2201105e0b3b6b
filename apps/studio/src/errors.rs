use serde::Deserialize;
use thiserror::Error;

/// Client-level error type.
/// Every core operation returns `Result<T, ClientError>`; only `main` converts to `anyhow`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response reached the client (DNS, connect, timeout, broken body).
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials were rejected and the single refresh-and-retry did not recover.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected (status {status}): {message}")]
    Client { status: u16, message: String },

    /// Rejected locally, never sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The generation job itself reported failure.
    #[error("Generation failed: {0}")]
    JobFailure(String),

    #[error("Could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Timed out waiting for the generation task")]
    TimedOut,

    #[error("Session is no longer valid; sign in again")]
    SessionInvalid,
}

/// Error body shape used by the document service (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    detail: String,
}

impl ClientError {
    /// Maps a non-success HTTP status and its body onto the taxonomy.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ServiceErrorBody>(body)
            .map(|b| b.detail)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

        match status {
            401 => ClientError::Unauthorized,
            403 => ClientError::Forbidden,
            500..=599 => ClientError::Server { status, message },
            _ => ClientError::Client { status, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    /// The request never produced a response, as opposed to the server refusing it.
    #[allow(dead_code)]
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    /// Short headline used on the notice surface.
    pub fn headline(&self) -> &'static str {
        match self {
            ClientError::Network(_) => "Could not reach the server",
            ClientError::Unauthorized => "Please sign in again",
            ClientError::Forbidden => "Access denied",
            ClientError::Server { .. } => "Server error",
            ClientError::Client { .. } => "Request failed",
            ClientError::Validation(_) => "Invalid input",
            ClientError::JobFailure(_) => "Generation failed",
            ClientError::Decode(_) | ClientError::UnexpectedResponse(_) => {
                "Unexpected server response"
            }
            ClientError::TimedOut => "Generation timed out",
            ClientError::SessionInvalid => "Session expired",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Network(e.to_string())
    }
}
