//! Exit code constants for the creel CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, uninitialized site)
//! - 2: Content index failure (unreadable or unwritable index)
//! - 3: Lock acquisition timed out
//! - 4: Lock storage failure (filesystem-level)
//! - 5: Lock ownership violation (record reclaimed out from under a holder)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid input, or uninitialized site.
pub const USER_ERROR: i32 = 1;

/// Content index failure: the index document could not be read, parsed, or written.
pub const INDEX_FAILURE: i32 = 2;

/// Lock acquisition timed out waiting for another publisher.
pub const LOCK_TIMEOUT: i32 = 3;

/// Lock storage failure: the filesystem primitive itself failed.
pub const LOCK_STORAGE_FAILURE: i32 = 4;

/// Lock ownership violation: a release found someone else's record.
pub const OWNERSHIP_VIOLATION: i32 = 5;
