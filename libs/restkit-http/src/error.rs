use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used for transport and body failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL scheme is not `http` or `https`
    UnsupportedScheme,
}

/// Coarse ordering of failures.
///
/// The order is meaningful: `Network < Client < Server < Sentinel`, so callers
/// can bucket errors with a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorClass {
    /// Connection, TLS, timeout or I/O failure; usually worth retrying
    Network,
    /// The caller misused the client or the server rejected the request (4xx)
    Client,
    /// The server misbehaved or answered with 5xx
    Server,
    /// Internal control-flow marker that never reaches callers
    Sentinel,
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Construction or option validation failed
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Invalid URL
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field is
    /// a diagnostic message for logging only.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to validate (redacted)
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Request building failed
    #[error("failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Payload field encoding failed
    #[error("payload encoding failed: {0}")]
    Encode(String),

    /// Response content-type could not be parsed
    #[error("unsupported media type: {0:?}")]
    UnsupportedMediaType(String),

    /// Strict mode: the server answered with a different media type
    #[error("not acceptable: expected {expected}, got {actual}")]
    NotAcceptable { expected: String, actual: String },

    /// HTTP non-2xx status
    #[error("HTTP {status}{}", format_preview(.body_preview))]
    HttpStatus {
        status: StatusCode,
        body_preview: String,
        content_type: Option<String>,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// Redirect hop limit exceeded
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    /// Stream framing violation
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// No decoder exists for the response media type and no byte sink was given
    #[error("no decoder for media type {media_type}")]
    NoDecoder { media_type: String },

    /// Returned by a custom unmarshaller to request the default decoding
    #[error("not implemented")]
    NotImplemented,

    /// Returned by a stream callback to stop decoding without error
    #[error("end of stream")]
    EndOfStream,

    /// The dispatch did not finish within the client timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The dispatch was cancelled by the caller
    #[error("request cancelled")]
    Cancelled,

    /// Transport error (network, connection, etc)
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Body read or write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML decoding error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),
}

fn format_preview(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl HttpError {
    /// Coarse classification of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transport(_) | Self::Tls(_) | Self::Timeout(_) | Self::Io(_) => {
                ErrorClass::Network
            }
            Self::BadRequest(_)
            | Self::InvalidUri { .. }
            | Self::RequestBuild(_)
            | Self::InvalidHeaderName(_)
            | Self::InvalidHeaderValue(_)
            | Self::Encode(_)
            | Self::Cancelled => ErrorClass::Client,
            Self::HttpStatus { status, .. } if status.is_client_error() => ErrorClass::Client,
            Self::NotImplemented | Self::EndOfStream => ErrorClass::Sentinel,
            Self::HttpStatus { .. }
            | Self::UnsupportedMediaType(_)
            | Self::NotAcceptable { .. }
            | Self::TooManyRedirects { .. }
            | Self::UnexpectedResponse(_)
            | Self::NoDecoder { .. }
            | Self::Json(_)
            | Self::Xml(_) => ErrorClass::Server,
        }
    }

    /// HTTP status code equivalent of this error, when one exists.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::BadRequest(_)
            | Self::InvalidUri { .. }
            | Self::RequestBuild(_)
            | Self::InvalidHeaderName(_)
            | Self::InvalidHeaderValue(_)
            | Self::Encode(_) => Some(StatusCode::BAD_REQUEST),
            Self::UnsupportedMediaType(_) => Some(StatusCode::UNSUPPORTED_MEDIA_TYPE),
            Self::NotAcceptable { .. } => Some(StatusCode::NOT_ACCEPTABLE),
            Self::TooManyRedirects { .. } => Some(StatusCode::LOOP_DETECTED),
            Self::UnexpectedResponse(_) => Some(StatusCode::BAD_GATEWAY),
            Self::NoDecoder { .. } => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::NotImplemented => Some(StatusCode::NOT_IMPLEMENTED),
            Self::Timeout(_) => Some(StatusCode::GATEWAY_TIMEOUT),
            Self::EndOfStream
            | Self::Cancelled
            | Self::Transport(_)
            | Self::Tls(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Xml(_) => None,
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// True for network failures, 429 and 502/503/504 responses.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => matches!(
                *status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            other => other.class() == ErrorClass::Network,
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

/// Unwrap an [`HttpError`] carried inside an `io::Error`, if any.
///
/// Body readers surface failures as `io::Error`; this keeps the original
/// variant matchable after a round trip through `tokio::io`.
pub(crate) fn from_io(err: std::io::Error) -> HttpError {
    if err.get_ref().is_some_and(|inner| inner.is::<HttpError>()) {
        if let Some(inner) = err.into_inner()
            && let Ok(http) = inner.downcast::<HttpError>()
        {
            return *http;
        }
        return HttpError::UnexpectedResponse("body error lost during unwrap".to_owned());
    }
    HttpError::Io(err)
}
