//! Error taxonomy shared by every layer of the protocol engine.

use thiserror::Error;

use crate::http::response::StatusCode;

pub type Result<T, E = HttpError> = std::result::Result<T, E>;

/// Every failure the engine can report.
///
/// None of these is fatal to the server instance: the connection loop
/// funnels all of them back to disconnect and relisten.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A blocking transport call ran out of time.
    #[error("timed out waiting on the transport")]
    Timeout,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// Malformed request line, resource, content length or boundary.
    #[error("malformed request: {0}")]
    Protocol(&'static str),

    /// Resource, file, header field or parameter is absent.
    #[error("not found")]
    NotFound,

    /// A challenge was sent; the request ends for this round trip.
    #[error("authentication challenge sent")]
    AuthPending,

    /// The segment pool is exhausted.
    #[error("segment pool exhausted")]
    Allocation,

    #[error("segment pool payload of {payload} bytes is below the {minimum}-byte minimum")]
    PoolTooSmall { payload: usize, minimum: usize },

    /// File store or other server-side failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// `get_entity_content` was called again before advancing past the boundary.
    #[error("multipart boundary already found")]
    BoundaryAlreadyFound,

    /// No request content remains at the requested offset.
    #[error("end of content")]
    DataEnd,

    #[error("parameter not properly terminated")]
    ImproperlyTerminated,

    #[error("destination buffer too small")]
    BufferTooSmall,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Status the dispatcher answers with, if any response is still possible.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Timeout | HttpError::Closed | HttpError::AuthPending => None,
            HttpError::Protocol(_) | HttpError::ImproperlyTerminated => Some(StatusCode::BadRequest),
            HttpError::NotFound => Some(StatusCode::NotFound),
            _ => Some(StatusCode::InternalServerError),
        }
    }

    /// Maps a file store error, keeping "no such file" distinguishable.
    pub fn from_store(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => HttpError::NotFound,
            _ => HttpError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(HttpError::Protocol("x").status(), Some(StatusCode::BadRequest));
        assert_eq!(HttpError::NotFound.status(), Some(StatusCode::NotFound));
        assert_eq!(HttpError::Allocation.status(), Some(StatusCode::InternalServerError));
        assert_eq!(HttpError::Timeout.status(), None);
        assert_eq!(HttpError::AuthPending.status(), None);
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(HttpError::from_store(err), HttpError::NotFound));

        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(HttpError::from_store(err), HttpError::Internal(_)));
    }
}
