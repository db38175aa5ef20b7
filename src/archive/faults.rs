//! Accumulating log of resource failures.
//!
//! Archive readers and writers still return `Result` from every
//! operation, but I/O-class failures are also appended here so batch
//! work (extracting many entries, adding many files) can keep going and
//! be inspected afterwards.  Integrity and credential failures are never
//! recorded: they abort the operation instead.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::errors::{Result, SealboxError};

/// One recorded resource failure.
#[derive(Debug, Clone)]
pub struct Fault {
    pub operation: &'static str,
    pub entry: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FaultLog {
    faults: Vec<Fault>,
}

impl FaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` if it is a resource failure.  Returns whether it was.
    pub fn record(&mut self, operation: &'static str, entry: Option<&str>, error: &SealboxError) -> bool {
        if !error.is_resource_failure() {
            return false;
        }
        warn!(operation, entry, %error, "recording resource fault");
        self.faults.push(Fault {
            operation,
            entry: entry.map(str::to_string),
            message: error.to_string(),
            at: Utc::now(),
        });
        true
    }

    /// Pass `result` through, recording its error on the way.
    pub fn observe<T>(&mut self, operation: &'static str, entry: Option<&str>, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            self.record(operation, entry, error);
        }
        result
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn clear(&mut self) {
        self.faults.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn only_resource_failures_are_recorded() {
        let mut log = FaultLog::new();

        let io_err = SealboxError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(log.record("add_file", Some("a.txt"), &io_err));
        assert!(!log.record("read_entry", Some("b"), &SealboxError::IntegrityFailure { block: 2 }));
        assert!(!log.record("open", None, &SealboxError::CredentialFailure));

        assert_eq!(log.faults().len(), 1);
        let fault = &log.faults()[0];
        assert_eq!(fault.operation, "add_file");
        assert_eq!(fault.entry.as_deref(), Some("a.txt"));
        assert!(fault.message.contains("denied"));

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn observe_passes_results_through() {
        let mut log = FaultLog::new();
        assert_eq!(log.observe("noop", None, Ok(5)).unwrap(), 5);
        let missing: Result<()> = Err(SealboxError::ArchiveNotFound("x.sbar".into()));
        assert!(log.observe("open", None, missing).is_err());
        assert_eq!(log.faults().len(), 1);
    }
}
