use reqwest::StatusCode;
use thiserror::Error;

/// Why an outbound call to the assistant backend failed
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to assistant failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("assistant responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode assistant response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("assistant response carried no data")]
    MissingData,

    /// The envelope came back with a non-zero code
    #[error("assistant rejected the request (code {code}): {msg}")]
    Rejected { code: i64, msg: String },
}
