//! Error types for mongoose
//!
//! Every variant renders as the `errmsg` text a client sees in a failed
//! response envelope, so the display strings are part of the wire contract.

use thiserror::Error;

/// Result type alias for mongoose operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Unified error type for all gateway operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Parameter text was not valid JSON (carries the raw text)
    #[error("couldn't parse json: {0}")]
    Parse(String),

    /// Parameter was valid JSON but not object-shaped (carries the raw text)
    #[error("type is not iterable: {0}")]
    NotIterable(String),

    /// Parameters arrived as a query string where a form body was required, or vice versa
    #[error("{operation} must be a {expected} request")]
    WrongMethod {
        operation: &'static str,
        expected: &'static str,
    },

    #[error("couldn't get connection to mongo")]
    NoConnection,

    #[error("db and collection must be defined")]
    MissingAddress,

    #[error("missing {0}")]
    MissingField(String),

    #[error("no cursor id given")]
    MissingCursorId,

    #[error("invalid {field}: {value}")]
    InvalidNumber { field: String, value: String },

    #[error("couldn't find the cursor with id {0}")]
    CursorNotFound(u64),

    /// The driver lost its server and could not get it back
    #[error("wasn't connected to the db and couldn't reconnect")]
    ReconnectFailed,

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl GatewayError {
    /// HTTP status used when this error is returned to a client.
    ///
    /// Operation failures travel inside a 200 response; only a request for an
    /// operation that does not exist is answered with 404.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::UnknownOperation(_) => 404,
            _ => 200,
        }
    }

    /// Returns true if the request itself was malformed
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::Parse(_)
                | GatewayError::NotIterable(_)
                | GatewayError::WrongMethod { .. }
                | GatewayError::MissingAddress
                | GatewayError::MissingField(_)
                | GatewayError::MissingCursorId
                | GatewayError::InvalidNumber { .. }
                | GatewayError::UnknownOperation(_)
        )
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for GatewayError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        let lost_server = matches!(
            err.kind.as_ref(),
            ErrorKind::Io(_)
                | ErrorKind::ServerSelection { .. }
                | ErrorKind::ConnectionPoolCleared { .. }
        );
        if lost_server {
            GatewayError::ReconnectFailed
        } else {
            GatewayError::Database(err.to_string())
        }
    }
}
