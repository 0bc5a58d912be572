use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Text suitable for showing to the user as a route workflow message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { detail, .. } if !detail.is_empty() => detail.clone(),
            Self::Status { status, .. } => format!("HTTP {status}"),
            Self::Http(e) if e.is_timeout() => "request timed out".to_string(),
            Self::Http(_) => "backend unreachable".to_string(),
            Self::Decode(_) => "unexpected response from backend".to_string(),
        }
    }
}
