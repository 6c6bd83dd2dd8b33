//! Error types for the creel CLI.
//!
//! Uses thiserror for derive macros. Each variant maps to a distinct exit
//! code so that pipeline scripts can tell a contended lock apart from a
//! correctness problem.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for creel operations.
#[derive(Error, Debug)]
pub enum CreelError {
    /// User provided invalid arguments or the site is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// The content index could not be read, parsed, or written.
    #[error("content index failure: {0}")]
    IndexError(String),

    /// Lock acquisition could not complete within the bounded wait.
    #[error(
        "timed out acquiring lock '{path}' after {waited_ms} ms (timeout: {timeout_ms} ms); \
         another publish may be running, or a lock may need clearing via `creel lock status`"
    )]
    LockTimeout {
        path: String,
        waited_ms: u64,
        timeout_ms: u64,
    },

    /// The underlying filesystem primitive failed (permissions, disk full).
    #[error("lock storage failure: {0}")]
    LockStorage(String),

    /// Release found a record the caller does not own. The caller's lock was
    /// reclaimed as stale while it believed it still held exclusivity, so its
    /// index mutation may have overlapped with another process.
    #[error(
        "lock ownership violation: held lock {expected_lock_id} (owner {expected_owner}) \
         but store contains {actual_lock_id} (owner {actual_owner}); \
         the index mutation may have overlapped with another publisher"
    )]
    OwnershipViolation {
        expected_lock_id: String,
        expected_owner: String,
        actual_lock_id: String,
        actual_owner: String,
    },
}

impl CreelError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CreelError::UserError(_) => exit_codes::USER_ERROR,
            CreelError::IndexError(_) => exit_codes::INDEX_FAILURE,
            CreelError::LockTimeout { .. } => exit_codes::LOCK_TIMEOUT,
            CreelError::LockStorage(_) => exit_codes::LOCK_STORAGE_FAILURE,
            CreelError::OwnershipViolation { .. } => exit_codes::OWNERSHIP_VIOLATION,
        }
    }
}

/// Result type alias for creel operations.
pub type Result<T> = std::result::Result<T, CreelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = CreelError::UserError("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn index_error_has_correct_exit_code() {
        let err = CreelError::IndexError("malformed JSON".to_string());
        assert_eq!(err.exit_code(), exit_codes::INDEX_FAILURE);
    }

    #[test]
    fn lock_timeout_has_correct_exit_code() {
        let err = CreelError::LockTimeout {
            path: "content/.locks/publish.lock".to_string(),
            waited_ms: 30_000,
            timeout_ms: 30_000,
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_TIMEOUT);
    }

    #[test]
    fn lock_storage_has_correct_exit_code() {
        let err = CreelError::LockStorage("permission denied".to_string());
        assert_eq!(err.exit_code(), exit_codes::LOCK_STORAGE_FAILURE);
    }

    #[test]
    fn ownership_violation_has_correct_exit_code() {
        let err = CreelError::OwnershipViolation {
            expected_lock_id: "aaa-111".to_string(),
            expected_owner: "100@host-a".to_string(),
            actual_lock_id: "bbb-222".to_string(),
            actual_owner: "200@host-b".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::OWNERSHIP_VIOLATION);
    }

    #[test]
    fn ownership_violation_names_both_parties() {
        let err = CreelError::OwnershipViolation {
            expected_lock_id: "aaa-111".to_string(),
            expected_owner: "100@host-a".to_string(),
            actual_lock_id: "bbb-222".to_string(),
            actual_owner: "200@host-b".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aaa-111"));
        assert!(msg.contains("bbb-222"));
        assert!(msg.contains("100@host-a"));
        assert!(msg.contains("200@host-b"));
    }

    #[test]
    fn timeout_message_is_actionable() {
        let err = CreelError::LockTimeout {
            path: "content/.locks/publish.lock".to_string(),
            waited_ms: 30_050,
            timeout_ms: 30_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("30050 ms"));
        assert!(msg.contains("creel lock status"));
    }
}
