//! Content hashing for artifacts and snapshot record sets

pub mod checksum;

pub use checksum::{checksum_records, content_hash, RecordSetHasher};
