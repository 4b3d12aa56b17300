//! Wire encoding for a single change-log entry (spec §6: `changelog/{ts}-{seq}`).
//!
//! One file per entry, so the write-fsync-rename pattern already used for
//! noun/verb objects gives each append the atomicity the contract requires
//! without a separate log format.

use crate::types::ChangeLogEntry;

/// The `changelog/{ts}-{seq}` object key for an entry.
pub fn object_key(entry: &ChangeLogEntry) -> String {
    format!("changelog/{:020}-{:020}", entry.timestamp.as_micros(), entry.seq)
}

/// Serialize an entry to the on-disk JSON form.
pub fn encode(entry: &ChangeLogEntry) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(entry)
}

/// Parse a previously-encoded entry.
pub fn decode(bytes: &[u8]) -> serde_json::Result<ChangeLogEntry> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeOp, EntityKind};
    use vg_core::Timestamp;

    #[test]
    fn object_key_zero_pads_for_lexicographic_ordering() {
        let early = ChangeLogEntry { timestamp: Timestamp::from_micros(5), operation: ChangeOp::Add, entity: EntityKind::Noun, id: "a".into(), payload_digest: 0, writer: "w".into(), seq: 0 };
        let late = ChangeLogEntry { timestamp: Timestamp::from_micros(100), operation: ChangeOp::Add, entity: EntityKind::Noun, id: "b".into(), payload_digest: 0, writer: "w".into(), seq: 0 };
        assert!(object_key(&early) < object_key(&late));
    }

    #[test]
    fn round_trips_through_json() {
        let entry = ChangeLogEntry { timestamp: Timestamp::from_micros(5), operation: ChangeOp::Update, entity: EntityKind::Verb, id: "v".into(), payload_digest: 42, writer: "w".into(), seq: 3 };
        let bytes = encode(&entry).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.id, "v");
        assert_eq!(back.seq, 3);
    }
}
