//! State backend trait and error types

use async_trait::async_trait;
use thiserror::Error;

use crate::state::StateFile;

/// Errors that can occur when interacting with a state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// State file is corrupted or invalid
    #[error("Invalid state file: {0}")]
    InvalidState(String),

    /// State lineage mismatch (prevents accidental state overwrites)
    #[error("State lineage mismatch: expected {expected}, got {actual}")]
    LineageMismatch { expected: String, actual: String },

    /// State serial went backwards
    #[error("Stale state: serial {attempted} is older than stored serial {stored}")]
    StaleSerial { stored: u64, attempted: u64 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Storage for a state file
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the current state from the backend
    ///
    /// Returns `None` if no state exists (first-time use)
    async fn read_state(&self) -> BackendResult<Option<StateFile>>;

    /// Write the state to the backend
    ///
    /// The state's serial number should be incremented before calling this
    async fn write_state(&self, state: &StateFile) -> BackendResult<()>;
}

/// Reject writes that would replace a different lineage or roll the serial back
pub fn check_overwrite(stored: &StateFile, incoming: &StateFile) -> BackendResult<()> {
    if stored.lineage != incoming.lineage {
        return Err(BackendError::LineageMismatch {
            expected: stored.lineage.clone(),
            actual: incoming.lineage.clone(),
        });
    }
    if incoming.serial < stored.serial {
        return Err(BackendError::StaleSerial {
            stored: stored.serial,
            attempted: incoming.serial,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_overwrite() {
        let mut stored = StateFile::new();
        stored.increment_serial();

        let mut next = stored.clone();
        next.increment_serial();
        assert!(check_overwrite(&stored, &next).is_ok());

        let mut stale = stored.clone();
        stale.serial = 0;
        assert!(matches!(
            check_overwrite(&stored, &stale),
            Err(BackendError::StaleSerial { stored: 1, attempted: 0 })
        ));

        let other = StateFile::new();
        let err = check_overwrite(&stored, &other).unwrap_err();
        assert!(err.to_string().starts_with("State lineage mismatch"));
    }
}
