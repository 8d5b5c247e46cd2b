// chain.rs - Hash chain sealing and verification.
//
// A ChainHead tracks the next sequence number and the hash of the last
// sealed record. Sinks keep one head per log; the SQLite store rebuilds it
// from the last row inside each write transaction.

use crate::error::AuditError;
use crate::hasher;
use crate::record::AuditRecord;

/// The tip of an audit chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainHead {
    last_sequence: u64,
    last_hash: Option<String>,
}

impl ChainHead {
    /// Resume a chain whose last record had `last_sequence` / `last_hash`.
    pub fn resume(last_sequence: u64, last_hash: Option<String>) -> Self {
        Self {
            last_sequence,
            last_hash,
        }
    }

    /// Rebuild the head from the final record of an existing log.
    pub fn after(last: Option<&AuditRecord>) -> Self {
        match last {
            Some(record) => Self::resume(record.sequence, record.record_hash.clone()),
            None => Self::default(),
        }
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Assign sequence and links to `record`, then advance the head.
    pub fn seal(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        record.sequence = self.last_sequence + 1;
        record.previous_hash = self.last_hash.clone();
        record.record_hash = None;
        let hash = hasher::hash_json(record)?;
        record.record_hash = Some(hash.clone());

        self.last_sequence = record.sequence;
        self.last_hash = Some(hash);
        Ok(())
    }
}

/// Recompute the hash of a sealed record.
fn recompute(record: &AuditRecord) -> Result<String, AuditError> {
    let mut unsealed = record.clone();
    unsealed.record_hash = None;
    hasher::hash_json(&unsealed)
}

/// Verify a complete log, oldest record first.
///
/// Checks that sequences are contiguous, that every `previous_hash` links to
/// the preceding record, and that every `record_hash` matches the content.
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), AuditError> {
    let mut head = ChainHead::default();

    for record in records {
        let expected_sequence = head.last_sequence + 1;
        if record.sequence != expected_sequence {
            return Err(AuditError::IntegrityViolation {
                sequence: record.sequence,
                expected: format!("sequence {}", expected_sequence),
                actual: format!("sequence {}", record.sequence),
            });
        }

        if record.previous_hash != head.last_hash {
            return Err(AuditError::IntegrityViolation {
                sequence: record.sequence,
                expected: head.last_hash.unwrap_or_else(|| "None".to_string()),
                actual: record
                    .previous_hash
                    .clone()
                    .unwrap_or_else(|| "None".to_string()),
            });
        }

        let actual = recompute(record)?;
        if record.record_hash.as_deref() != Some(actual.as_str()) {
            return Err(AuditError::IntegrityViolation {
                sequence: record.sequence,
                expected: actual,
                actual: record
                    .record_hash
                    .clone()
                    .unwrap_or_else(|| "None".to_string()),
            });
        }

        head = ChainHead::after(Some(record));
    }

    Ok(())
}
