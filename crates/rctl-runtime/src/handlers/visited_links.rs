#![forbid(unsafe_code)]

//! Read-only view of the parent's visited-link table.
//!
//! The parent owns the authoritative table and shares it as a segment:
//!
//! ```text
//! offset  size        field
//! 0       8           salt
//! 8       4           slot count (u32, little endian)
//! 12      8 * count   slots (u64 fingerprints, little endian, 0 = empty)
//! ```
//!
//! Lookups hash into the slot array and probe linearly. Links added after
//! the segment was shared arrive as fingerprint lists and live in a small
//! overlay until the next full table replaces it.

use std::collections::HashSet;

use rctl_core::{Fingerprint, SharedMemoryHandle, TableError, TableResult};

const HEADER_LEN: usize = 12;
const SLOT_LEN: usize = 8;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv_hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

#[derive(Debug, Default)]
pub struct VisitedLinkTable {
    salt: [u8; 8],
    slots: Vec<Fingerprint>,
    added: HashSet<Fingerprint>,
}

impl VisitedLinkTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots in the shared table, empty or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Replace the table with the segment behind `handle`. The overlay is
    /// dropped; on a decode error the renderer is left with an empty table.
    ///
    /// # Panics
    ///
    /// If `handle` is invalid.
    pub fn init(&mut self, handle: &SharedMemoryHandle) -> TableResult<usize> {
        assert!(handle.is_valid(), "visited link table with invalid handle");
        self.salt = [0; 8];
        self.slots.clear();
        self.added.clear();

        let bytes = handle.bytes().unwrap_or_default();
        let (salt, slots) = decode(bytes)?;
        self.salt = salt;
        self.slots = slots;
        Ok(self.slots.len())
    }

    /// Remember fingerprints added since the table was shared.
    pub fn add(&mut self, fingerprints: &[Fingerprint]) {
        self.added.extend(fingerprints.iter().copied());
    }

    /// Forget every visited link until the next table arrives.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.added.clear();
    }

    /// Salted fingerprint of `url` under the current table.
    #[must_use]
    pub fn fingerprint_for(&self, url: &str) -> Fingerprint {
        let mut hash = FNV_OFFSET_BASIS;
        fnv_hash_bytes(&mut hash, &self.salt);
        fnv_hash_bytes(&mut hash, url.as_bytes());
        // Zero marks an empty slot.
        hash.max(1)
    }

    #[must_use]
    pub fn is_visited(&self, fingerprint: Fingerprint) -> bool {
        self.added.contains(&fingerprint) || self.table_contains(fingerprint)
    }

    #[must_use]
    pub fn is_url_visited(&self, url: &str) -> bool {
        self.is_visited(self.fingerprint_for(url))
    }

    fn table_contains(&self, fingerprint: Fingerprint) -> bool {
        let len = self.slots.len();
        if len == 0 || fingerprint == 0 {
            return false;
        }
        let start = (fingerprint % len as u64) as usize;
        for i in 0..len {
            match self.slots[(start + i) % len] {
                0 => return false,
                slot if slot == fingerprint => return true,
                _ => {}
            }
        }
        false
    }
}

fn decode(bytes: &[u8]) -> TableResult<([u8; 8], Vec<Fingerprint>)> {
    let Some((salt, rest)) = bytes.split_first_chunk::<8>() else {
        return Err(TableError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    };
    let Some((count, slots)) = rest.split_first_chunk::<4>() else {
        return Err(TableError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    };
    let count = u32::from_le_bytes(*count);
    if count == 0 {
        return Err(TableError::BadLength(0));
    }
    let needed = (count as usize)
        .checked_mul(SLOT_LEN)
        .ok_or(TableError::BadLength(u64::from(count)))?;
    if slots.len() < needed {
        return Err(TableError::Truncated {
            expected: HEADER_LEN + needed,
            actual: bytes.len(),
        });
    }
    let fingerprints = slots[..needed]
        .chunks_exact(SLOT_LEN)
        .map(|chunk| {
            let mut raw = [0u8; SLOT_LEN];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw)
        })
        .collect();
    Ok((*salt, fingerprints))
}

/// Lay out a table segment holding `fingerprints`, the way the parent does.
///
/// # Panics
///
/// If the fingerprints do not fit with at least one empty slot to spare.
#[must_use]
pub fn encode_table(salt: [u8; 8], slot_count: u32, fingerprints: &[Fingerprint]) -> Vec<u8> {
    let len = slot_count as usize;
    assert!(fingerprints.len() < len, "visited link table too small");
    let mut slots = vec![0u64; len];
    for &fp in fingerprints {
        let mut idx = (fp % len as u64) as usize;
        while slots[idx] != 0 {
            idx = (idx + 1) % len;
        }
        slots[idx] = fp;
    }
    let mut out = Vec::with_capacity(HEADER_LEN + len * SLOT_LEN);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&slot_count.to_le_bytes());
    for slot in slots {
        out.extend_from_slice(&slot.to_le_bytes());
    }
    out
}
