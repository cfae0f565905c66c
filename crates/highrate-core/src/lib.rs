//! Highrate Core - Common infrastructure for archive retrieval pipelines
//!
//! This crate provides the reusable pieces shared by the retrieval engine
//! and the CLI: retry with backoff, graceful shutdown, logging that plays
//! well with progress bars, and the temp-then-rename file discipline.

pub mod fsutil;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod runtime;
pub mod shutdown;

// Re-exports for convenience
pub use fsutil::{cleanup_part_files, copy_cancellable, is_nonempty_file, part_path};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress};
pub use retry::{Retryable, RetryLog, RetryPolicy, retry_with_backoff};
pub use runtime::SHARED_RUNTIME;
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag};
