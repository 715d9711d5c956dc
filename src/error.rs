use crate::response::Response;

/// All ways a request against the ESI API can fail.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("waited too long for a connection")]
    ConnectionTimeout,

    #[error("expected JSON response but failed to parse body: {source}")]
    ResponseFormatError {
        #[source]
        source: serde_json::Error,
        response: Response,
    },

    #[error("response code {status}")]
    HttpError { status: u16, response: Response },

    #[error("retry limit reached")]
    RetryLimitError { response: Response },

    #[error("page split detected")]
    PageSplitError { responses: Vec<Response> },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("connection closed")]
    Closed,
}

impl Error {
    /// The partial set of per-page responses collected before a paginated
    /// request failed, if any. Mirrors spec.md section 7: "any thrown error
    /// from a paginated request that has partial data may attach a
    /// `responses` list".
    pub fn partial_responses(&self) -> Option<&[Response]> {
        match self {
            Error::PageSplitError { responses } => Some(responses),
            _ => None,
        }
    }
}

/// Failures below the request/response model: dead sessions, TLS handshake
/// failures, stream resets. These surface through a pending stream's
/// resolution handle; they never surface through the session listener
/// itself (spec.md 4.1, "Failure semantics").
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("h2 protocol error: {0}")]
    H2(#[from] h2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("dns resolution failed for {host}")]
    Resolve { host: String },
}
