// log.rs - Append-only JSONL audit log.
//
// One JSON object per line. On open, the last line is read to recover the
// chain head so records appended after a restart link to the ones before it.
// A batch of records is serialized into a single buffer and written with one
// `write_all` followed by a flush.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::chain::{verify_chain, ChainHead};
use crate::error::AuditError;
use crate::record::AuditRecord;
use crate::sink::AuditSink;

struct LogWriter {
    file: File,
    head: ChainHead,
}

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let head = if path.exists() {
            ChainHead::after(Self::read_all(&path)?.last())
        } else {
            ChainHead::default()
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            writer: Mutex::new(LogWriter { file, head }),
        })
    }

    /// Read all records from a log file, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }

        Ok(records)
    }

    /// Verify the hash chain of a log file.
    pub fn verify_file(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let records = Self::read_all(path)?;
        verify_chain(&records)?;
        Ok(records.len())
    }

    /// Write already-sealed records to `path`, replacing any existing file.
    ///
    /// Used to export a store's audit table; sequences and hashes are kept
    /// as-is so the exported file verifies on its own.
    pub fn export(path: impl AsRef<Path>, records: &[AuditRecord]) -> Result<(), AuditError> {
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }
        std::fs::write(path.as_ref(), buffer)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for AuditLog {
    fn append(&self, records: &mut [AuditRecord]) -> Result<(), AuditError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AuditError::Unavailable("audit log lock poisoned".to_string()))?;

        let mut head = writer.head.clone();
        let mut buffer = String::new();
        for record in records.iter_mut() {
            head.seal(record)?;
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }

        writer.file.write_all(buffer.as_bytes())?;
        writer.file.flush()?;
        writer.head = head;

        tracing::debug!(
            path = %self.path.display(),
            count = records.len(),
            last_sequence = writer.head.last_sequence(),
            "audit records appended"
        );
        Ok(())
    }

    fn records_for(&self, reference: &str) -> Result<Vec<AuditRecord>, AuditError> {
        Ok(Self::read_all(&self.path)?
            .into_iter()
            .filter(|r| r.concerns(reference))
            .collect())
    }

    fn all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        Self::read_all(&self.path)
    }
}
