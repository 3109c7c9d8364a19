//! Checksums for artifacts and record sets
//!
//! Artifacts are hashed over their raw bytes. Record sets are hashed over the
//! exact JSON-lines encoding the store writes, so a snapshot's checksum can
//! be recomputed from its file and compared byte-for-byte across runs.

use crate::domain::{GridError, ReconciledRecord, Result};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes
///
/// # Examples
///
/// ```
/// use gridstats::core::verification::checksum::content_hash;
///
/// let hash = content_hash(b"country,value\nDEU,1\n");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{result:x}")
}

/// Encodes one record as a single JSON line (without the newline)
pub fn encode_record_line(record: &ReconciledRecord) -> Result<String> {
    serde_json::to_string(record).map_err(|e| GridError::Serialization(e.to_string()))
}

/// Incremental checksum over a sequence of records
///
/// Feeding the same records in the same order always yields the same digest,
/// whether they arrive in one call or in batches.
#[derive(Default)]
pub struct RecordSetHasher {
    hasher: Sha256,
    count: usize,
}

impl RecordSetHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an already encoded JSON line
    pub fn update_line(&mut self, line: &str) {
        self.hasher.update(line.as_bytes());
        self.hasher.update(b"\n");
        self.count += 1;
    }

    pub fn update(&mut self, record: &ReconciledRecord) -> Result<()> {
        let line = encode_record_line(record)?;
        self.update_line(&line);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finalize(self) -> String {
        let result = self.hasher.finalize();
        format!("{result:x}")
    }
}

/// Checksum of a complete record set
pub fn checksum_records(records: &[ReconciledRecord]) -> Result<String> {
    let mut hasher = RecordSetHasher::new();
    for record in records {
        hasher.update(record)?;
    }
    Ok(hasher.finalize())
}
