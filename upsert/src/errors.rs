use crate::config::ValidationError;
use crate::request::RequestError;
use http::StatusCode;
use table_store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum UpsertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
}

/// Failures while handling a single trigger request
#[derive(thiserror::Error, Debug)]
pub enum TriggerError {
    #[error("Unable to read POST body {0}")]
    ReadBody(String),

    #[error("Unable to decode POST body {0}")]
    DecodeBody(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidRequest(#[from] RequestError),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl TriggerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TriggerError::ReadBody(_)
            | TriggerError::DecodeBody(_)
            | TriggerError::InvalidRequest(_)
            | TriggerError::Store(StoreError::InvalidAccountKey(_)) => StatusCode::BAD_REQUEST,
            TriggerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
