use http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("endpoint cannot carry a path: {0}")]
    InvalidEndpoint(String),

    #[error("invalid account key: {0}")]
    InvalidAccountKey(String),

    #[error("table service returned {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("could not decode entity: {0}")]
    Decode(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("row ({partition_key}, {row_key}) already exists")]
    Conflict {
        partition_key: String,
        row_key: String,
    },

    #[error("row ({partition_key}, {row_key}) does not exist")]
    NotFound {
        partition_key: String,
        row_key: String,
    },
}
