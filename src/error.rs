//! Error types for chatpane.
//!
//! One error enum covers the transport to the completion service, the token
//! encoding table, and the lifecycle of a streamed reply.  Every variant is
//! meant to be shown to the user; none of them should take the event loop
//! down.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

/// The main error type for chatpane.
#[derive(Clone, Debug)]
pub enum Error {
    /// A generic API error occurred.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error type string from the API.
        error_type: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Request ID for debugging and support.
        request_id: Option<String>,
    },

    /// Authentication error.
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Authorization/Permission error.
    Permission {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found (usually an unknown model).
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    RateLimit {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// Bad request due to invalid parameters.
    BadRequest {
        /// Human-readable error message.
        message: String,
        /// Parameter that caused the error.
        param: Option<String>,
    },

    /// API timeout error.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// The reply was cancelled before it finished.
    Abort {
        /// Human-readable error message.
        message: String,
    },

    /// Connection error.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Server returned a 500 internal error.
    InternalServer {
        /// Human-readable error message.
        message: String,
        /// Request ID for debugging and support.
        request_id: Option<String>,
    },

    /// Server is overloaded or unavailable.
    ServiceUnavailable {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// Error during JSON or YAML serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// HTTP client error.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Invalid configuration or request parameters.
    Validation {
        /// Human-readable error message.
        message: String,
        /// Parameter that failed validation.
        param: Option<String>,
    },

    /// A URL parsing or manipulation error.
    Url {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<url::ParseError>,
    },

    /// A transport-level streaming error occurred.
    Streaming {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Byte-level decoding error (invalid UTF-8 in the stream).
    Encoding {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The token encoding table could not be loaded.
    EncodingUnavailable {
        /// Name of the encoding that was requested.
        encoding: String,
        /// Human-readable error message.
        message: String,
    },

    /// The completion service could not be reached or rejected the request
    /// before any reply text arrived.
    StreamAcquisitionFailed {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<Error>>,
    },

    /// The reply stream failed after at least one chunk was received.
    StreamReadFailed {
        /// Human-readable error message.
        message: String,
        /// Reply text received before the failure.  It is never committed to
        /// the conversation.
        partial: String,
        /// The underlying error.
        source: Option<Arc<Error>>,
    },

    /// A reply is already streaming; the submission was rejected.
    Busy {
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Creates a new API error.
    pub fn api(
        status_code: u16,
        error_type: Option<String>,
        message: String,
        request_id: Option<String>,
    ) -> Self {
        Error::Api {
            status_code,
            error_type,
            message,
            request_id,
        }
    }

    /// Creates a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Error::Permission {
            message: message.into(),
        }
    }

    /// Creates a new not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new bad request error.
    pub fn bad_request(message: impl Into<String>, param: Option<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
            param,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new abort error.
    pub fn abort(message: impl Into<String>) -> Self {
        Error::Abort {
            message: message.into(),
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new internal server error.
    pub fn internal_server(message: impl Into<String>, request_id: Option<String>) -> Self {
        Error::InternalServer {
            message: message.into(),
            request_id,
        }
    }

    /// Creates a new service unavailable error.
    pub fn service_unavailable(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new validation error.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    /// Creates a new URL error.
    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Creates a new streaming error.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new encoding error.
    pub fn encoding(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Encoding {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new encoding-unavailable error.
    pub fn encoding_unavailable(encoding: impl Into<String>, message: impl Into<String>) -> Self {
        Error::EncodingUnavailable {
            encoding: encoding.into(),
            message: message.into(),
        }
    }

    /// Creates a new stream acquisition error wrapping the transport failure.
    pub fn stream_acquisition(message: impl Into<String>, source: Option<Error>) -> Self {
        Error::StreamAcquisitionFailed {
            message: message.into(),
            source: source.map(Arc::new),
        }
    }

    /// Creates a new stream read error carrying the text received so far.
    pub fn stream_read(
        message: impl Into<String>,
        partial: impl Into<String>,
        source: Option<Error>,
    ) -> Self {
        Error::StreamReadFailed {
            message: message.into(),
            partial: partial.into(),
            source: source.map(Arc::new),
        }
    }

    /// Creates a new busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Error::Busy {
            message: message.into(),
        }
    }

    /// Returns true if this error is related to authentication.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    /// Returns true if this error is related to rate limiting.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is an abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Abort { .. })
    }

    /// Returns true if this error is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    /// Returns true if this error is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Error::InternalServer { .. } | Error::ServiceUnavailable { .. }
        )
    }

    /// Returns true if the token encoding table failed to load.
    pub fn is_encoding_unavailable(&self) -> bool {
        matches!(self, Error::EncodingUnavailable { .. })
    }

    /// Returns true if the reply stream could not be opened.
    pub fn is_stream_acquisition(&self) -> bool {
        matches!(self, Error::StreamAcquisitionFailed { .. })
    }

    /// Returns true if the reply stream failed part way through.
    pub fn is_stream_read(&self) -> bool {
        matches!(self, Error::StreamReadFailed { .. })
    }

    /// Returns true if the submission was rejected because a reply is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Error::Busy { .. })
    }

    /// The transport error underneath stream acquisition and read failures.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::StreamAcquisitionFailed {
                source: Some(inner),
                ..
            }
            | Error::StreamReadFailed {
                source: Some(inner),
                ..
            } => inner.root_cause(),
            _ => self,
        }
    }

    /// A short suggestion for the user, when the failure has an obvious fix.
    pub fn hint(&self) -> Option<&'static str> {
        let cause = self.root_cause();
        if cause.is_authentication() {
            Some("check that OPENAI_API_KEY holds a valid key")
        } else if cause.is_rate_limit() {
            Some("rate limited; wait a moment before sending again")
        } else if cause.is_connection() || cause.is_timeout() {
            Some("the endpoint could not be reached; check --base-url and the network")
        } else if cause.is_server_error() {
            Some("the service is having trouble; try again shortly")
        } else {
            None
        }
    }

    /// Returns the partial reply carried by a stream read failure.
    pub fn partial_reply(&self) -> Option<&str> {
        match self {
            Error::StreamReadFailed { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Returns the request ID associated with this error, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Api { request_id, .. } => request_id.as_deref(),
            Error::InternalServer { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api {
                message,
                error_type,
                request_id,
                ..
            } => {
                if let Some(error_type) = error_type {
                    if let Some(request_id) = request_id {
                        write!(f, "{error_type}: {message} (Request ID: {request_id})")
                    } else {
                        write!(f, "{error_type}: {message}")
                    }
                } else if let Some(request_id) = request_id {
                    write!(f, "API error: {message} (Request ID: {request_id})")
                } else {
                    write!(f, "API error: {message}")
                }
            }
            Error::Authentication { message } => {
                write!(f, "Authentication error: {message}")
            }
            Error::Permission { message } => {
                write!(f, "Permission error: {message}")
            }
            Error::NotFound { message } => {
                write!(f, "Resource not found: {message}")
            }
            Error::RateLimit {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Rate limit exceeded: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Rate limit exceeded: {message}")
                }
            }
            Error::BadRequest { message, param } => {
                if let Some(param) = param {
                    write!(f, "Bad request: {message} (parameter: {param})")
                } else {
                    write!(f, "Bad request: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Abort { message } => {
                write!(f, "Request aborted: {message}")
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::InternalServer {
                message,
                request_id,
            } => {
                if let Some(request_id) = request_id {
                    write!(
                        f,
                        "Internal server error: {message} (Request ID: {request_id})"
                    )
                } else {
                    write!(f, "Internal server error: {message}")
                }
            }
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Service unavailable: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Service unavailable: {message}")
                }
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} (parameter: {param})")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
            Error::Streaming { message, .. } => {
                write!(f, "Streaming error: {message}")
            }
            Error::Encoding { message, .. } => {
                write!(f, "Encoding error: {message}")
            }
            Error::EncodingUnavailable { encoding, message } => {
                write!(f, "Token encoding {encoding} unavailable: {message}")
            }
            Error::StreamAcquisitionFailed { message, source } => match source {
                Some(source) => write!(f, "Could not start reply: {message}: {source}"),
                None => write!(f, "Could not start reply: {message}"),
            },
            Error::StreamReadFailed {
                message,
                partial,
                source,
            } => {
                let received = partial.chars().count();
                match source {
                    Some(source) => write!(
                        f,
                        "Reply interrupted after {received} characters: {message}: {source}"
                    ),
                    None => write!(
                        f,
                        "Reply interrupted after {received} characters: {message}"
                    ),
                }
            }
            Error::Busy { message } => {
                write!(f, "Busy: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Serialization { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::HttpClient { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            Error::Streaming { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Encoding { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::StreamAcquisitionFailed { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::StreamReadFailed { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::encoding(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for chatpane operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn hint_looks_through_stream_failures() {
        let refused = Error::stream_acquisition(
            "the completion service did not start a reply",
            Some(Error::rate_limit("slow down", Some(30))),
        );
        assert!(refused.root_cause().is_rate_limit());
        assert_eq!(
            refused.hint(),
            Some("rate limited; wait a moment before sending again")
        );

        let dropped = Error::stream_read(
            "the reply stream failed",
            "Par",
            Some(Error::connection("reset", None)),
        );
        assert!(dropped.hint().unwrap().contains("--base-url"));
        assert!(Error::authentication("bad key").hint().unwrap().contains("OPENAI_API_KEY"));
        assert!(Error::internal_server("boom", None).hint().is_some());
        assert_eq!(Error::abort("cancelled").hint(), None);
    }

    #[test]
    fn stream_read_keeps_partial_text() {
        let err = Error::stream_read("connection reset", "Partial", None);
        assert!(err.is_stream_read());
        assert_eq!(err.partial_reply(), Some("Partial"));
        assert_eq!(
            err.to_string(),
            "Reply interrupted after 7 characters: connection reset"
        );
    }

    #[test]
    fn stream_acquisition_exposes_source() {
        let inner = Error::authentication("bad key");
        let err = Error::stream_acquisition("request rejected", Some(inner));
        assert!(err.is_stream_acquisition());
        let source = err.source().expect("source should be set");
        assert_eq!(source.to_string(), "Authentication error: bad key");
    }

    #[test]
    fn encoding_unavailable_display() {
        let err = Error::encoding_unavailable("cl100k_base", "table missing");
        assert!(err.is_encoding_unavailable());
        assert_eq!(
            err.to_string(),
            "Token encoding cl100k_base unavailable: table missing"
        );
    }

    #[test]
    fn api_error_display_variants() {
        let err = Error::api(418, None, "teapot".to_string(), None);
        assert_eq!(err.to_string(), "API error: teapot");
        assert_eq!(err.status_code(), Some(418));

        let err = Error::api(
            500,
            Some("server_error".to_string()),
            "boom".to_string(),
            Some("req_1".to_string()),
        );
        assert_eq!(err.to_string(), "server_error: boom (Request ID: req_1)");
        assert_eq!(err.request_id(), Some("req_1"));
    }
}
