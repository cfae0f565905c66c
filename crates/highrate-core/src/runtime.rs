//! Shared tokio runtime for bounded blocking work (subprocesses, timeouts).
//!
//! The engine is synchronous; async is only used where a deadline must be
//! enforced on something that would otherwise block indefinitely.

use std::sync::LazyLock;

/// Shared tokio runtime, built on first use.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});
