#![forbid(unsafe_code)]

//! Read-only shared segments handed over by the parent process.
//!
//! The real transport maps an OS shared-memory region; here a segment is an
//! immutable, reference-counted byte slice. Cloning a handle never copies the
//! payload.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Handle to a shared, read-only memory segment.
///
/// An invalid handle carries no segment. Handlers that receive one treat it
/// as a programming error on the sending side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedMemoryHandle {
    segment: Option<Arc<[u8]>>,
}

impl SharedMemoryHandle {
    /// A handle that refers to nothing.
    #[must_use]
    pub const fn invalid() -> Self {
        Self { segment: None }
    }

    /// Wrap an owned buffer as a shared segment.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            segment: Some(Arc::from(bytes)),
        }
    }

    /// Whether the handle refers to a mapped segment.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.segment.is_some()
    }

    /// Borrow the mapped bytes, if any.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.segment.as_deref()
    }

    /// Segment length in bytes; zero for an invalid handle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segment.as_deref().map_or(0, <[u8]>::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
