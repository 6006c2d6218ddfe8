#![forbid(unsafe_code)]

//! Errors raised while decoding shared tables.
//!
//! These never reach the parent process. Handlers log them and fall back to
//! an empty table; an invalid *handle*, by contrast, is a programming error
//! and panics at the call site.

use std::fmt;

/// A shared table could not be decoded.
#[derive(Debug)]
pub enum TableError {
    /// The segment is shorter than its header or declared length.
    Truncated { expected: usize, actual: usize },
    /// The declared slot count is not usable (zero or absurdly large).
    BadLength(u64),
    /// The payload is not valid JSON for the expected schema.
    Json(serde_json::Error),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Truncated { expected, actual } => {
                write!(f, "table truncated: need {expected} bytes, have {actual}")
            }
            TableError::BadLength(len) => write!(f, "bad table length: {len}"),
            TableError::Json(e) => write!(f, "malformed table: {e}"),
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableError::Json(e) => Some(e),
            TableError::Truncated { .. } | TableError::BadLength(_) => None,
        }
    }
}

impl From<serde_json::Error> for TableError {
    fn from(e: serde_json::Error) -> Self {
        TableError::Json(e)
    }
}

/// Result type for table decoding.
pub type TableResult<T> = Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_mentions_sizes() {
        let err = TableError::Truncated {
            expected: 16,
            actual: 4,
        };
        assert_eq!(err.to_string(), "table truncated: need 16 bytes, have 4");
        assert!(err.source().is_none());
    }

    #[test]
    fn json_errors_keep_their_source() {
        let json_err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let err = TableError::from(json_err);
        assert!(err.to_string().starts_with("malformed table"));
        assert!(err.source().is_some());
    }
}
