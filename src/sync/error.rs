use thiserror::Error;

use crate::api::FetchError;

/// Terminal and intermediate failures of a feed load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// DNS, connect or transport failure
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The request did not finish within the configured bound
    #[error("Request timeout")]
    Timeout,

    /// Non-2xx status from the news endpoint. `message` is the server's own
    /// explanation and is what the user sees when present.
    #[error("{}", describe_server_error(.status, .message))]
    ServerError {
        status: u16,
        message: Option<String>,
    },

    /// Offline with nothing cached to show
    #[error("You are offline and no cached news is available")]
    OfflineNoCache,

    /// The response body could not be used at all
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Aborted by a newer request, navigation away or disposal
    #[error("Request cancelled")]
    Cancelled,
}

fn describe_server_error(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{message} (status {status})"),
        None => format!("Server error (status {status})"),
    }
}

impl SyncError {
    /// Only transient transport failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::NetworkUnreachable(_) | SyncError::Timeout)
    }
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NetworkUnreachable(msg) => SyncError::NetworkUnreachable(msg),
            FetchError::Timeout => SyncError::Timeout,
            FetchError::HttpStatus { status, message } => SyncError::ServerError { status, message },
            FetchError::Decode(msg) => SyncError::MalformedResponse(msg),
            FetchError::ResponseTooLarge => {
                SyncError::MalformedResponse("response too large".to_string())
            }
            FetchError::Cancelled => SyncError::Cancelled,
            FetchError::InvalidUrl(msg) => SyncError::InvalidRequest(msg),
        }
    }
}
