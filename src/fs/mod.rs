//! Filesystem utilities for creel.
//!
//! Provides the atomic write primitive used for the content index and the
//! metrics event log, so neither is ever left half-written by a crash.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;
