use forum_types::PayloadError;
use reqwest::StatusCode;
use tidings::{Cancellable, LiveError};

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request was cancelled")]
    Cancelled,

    #[error("not authorized, even after refreshing the access token")]
    Unauthorized,

    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("transport error")]
    Transport(#[from] reqwest::Error),

    #[error("could not decode response")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Live(#[from] LiveError),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Cancellable for ClientError {
    fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

impl From<futures::future::Aborted> for ClientError {
    fn from(_: futures::future::Aborted) -> Self {
        ClientError::Cancelled
    }
}
