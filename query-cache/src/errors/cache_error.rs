use std::{error, fmt, io};

use arcstr::ArcStr;

/// An enum of all error kinds.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backing store could not be reached, or the connection dropped.
    IoError,
    /// The backing store rejected the credentials.
    AuthenticationFailed,
    /// The connection parameters were wrong.
    InvalidConfig,
    /// The backing store answered with an error or an unexpected reply.
    ResponseError,
    /// A value could not be serialized to or from its stored form.
    Serialize,
}

/// Represents a cache error.
///
/// Most of these never reach callers of [`crate::QueryCache`]: the store
/// adapter turns them into misses. They are visible when talking to a
/// [`crate::CacheStore`] directly and when building connection parameters.
pub struct CacheError {
    repr: ErrorRepr,
}

#[derive(Debug)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, ArcStr),
    IoError(io::Error),
}

impl PartialEq for CacheError {
    fn eq(&self, other: &CacheError) -> bool {
        match (&self.repr, &other.repr) {
            (&ErrorRepr::WithDescription(kind_a, _), &ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                &ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                &ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::IoError(a), ErrorRepr::IoError(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}

impl From<io::Error> for CacheError {
    fn from(err: io::Error) -> CacheError {
        CacheError {
            repr: ErrorRepr::IoError(err),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(serde_err: serde_json::Error) -> CacheError {
        CacheError::from((
            ErrorKind::Serialize,
            "Serialization Error",
            format!("{serde_err}"),
        ))
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> CacheError {
        let kind = match err.kind() {
            redis::ErrorKind::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            redis::ErrorKind::InvalidClientConfig => ErrorKind::InvalidConfig,
            redis::ErrorKind::IoError => ErrorKind::IoError,
            _ if err.is_io_error() || err.is_connection_dropped() => ErrorKind::IoError,
            _ => ErrorKind::ResponseError,
        };
        CacheError::from((kind, "Redis error", err.to_string()))
    }
}

impl From<(ErrorKind, &'static str)> for CacheError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> CacheError {
        CacheError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for CacheError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> CacheError {
        CacheError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.into()),
        }
    }
}

impl error::Error for CacheError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Debug for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::WithDescription(kind, desc) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)
            }
            ErrorRepr::WithDescriptionAndDetail(kind, desc, detail) => {
                desc.fmt(f)?;
                f.write_str(" - ")?;
                fmt::Debug::fmt(&kind, f)?;
                f.write_str(": ")?;
                detail.fmt(f)
            }
            ErrorRepr::IoError(err) => err.fmt(f),
        }
    }
}

impl CacheError {
    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
            ErrorRepr::IoError(_) => ErrorKind::IoError,
        }
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, detail) => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Returns the name of the error category for display purposes.
    pub fn category(&self) -> &str {
        match self.kind() {
            ErrorKind::IoError => "I/O error",
            ErrorKind::AuthenticationFailed => "authentication failed",
            ErrorKind::InvalidConfig => "invalid config",
            ErrorKind::ResponseError => "response error",
            ErrorKind::Serialize => "serializing",
        }
    }

    /// Indicates that this failure is an IO failure.
    pub fn is_io_error(&self) -> bool {
        self.kind() == ErrorKind::IoError
    }

    /// Returns true if the store can no longer be used through the
    /// connection that produced this error.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self.kind(), ErrorKind::IoError | ErrorKind::AuthenticationFailed)
    }
}

/// Library generic result type.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_detail() {
        let err = CacheError::from((ErrorKind::InvalidConfig, "Invalid port", "abc".to_string()));
        assert_eq!(err.to_string(), "Invalid port - InvalidConfig: abc");
        assert_eq!(err.detail(), Some("abc"));
        assert_eq!(err.category(), "invalid config");
    }

    #[test]
    fn test_io_error_kind() {
        let err = CacheError::from(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(err.is_io_error());
        assert!(err.is_connection_lost());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_equality_ignores_description() {
        let a = CacheError::from((ErrorKind::ResponseError, "a"));
        let b = CacheError::from((ErrorKind::ResponseError, "b"));
        let c = CacheError::from((ErrorKind::Serialize, "a"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
