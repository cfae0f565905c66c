//! Highrate CDDIS - batch retrieval of high-rate GNSS observation files
//!
//! Expands a request (station, year, day and hour ranges) into remote
//! hour directories on the CDDIS archive, fetches the `.crx.gz` files over
//! anonymous FTPS with retry and backoff, and post-processes them into
//! `.crx` (gunzip) and `.rnx` (external `CRX2RNX`).
//!
//! # Features
//!
//! - Idempotent: artifacts on disk are the only state, re-runs skip them
//! - No partial artifacts: every write goes through a `.part` file
//! - One failing item never stops the batch
//!
//! # Example
//!
//! ```ignore
//! use highrate_cddis::{Config, RequestSpec, RetrievalRequest, run};
//! use highrate_core::ProgressContext;
//!
//! let request = RetrievalRequest::try_from(RequestSpec {
//!     station: "BRST00FRA".into(),
//!     year: 2024,
//!     days: "300-301".into(),
//!     hours: "00-01".into(),
//!     extract: true,
//!     ..Default::default()
//! })?;
//!
//! let summary = run(&request, &Config::default(), &ProgressContext::new())?;
//! println!("{} succeeded", summary.counts.succeeded);
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod ftp;
pub mod layout;
pub mod pipeline;
pub mod range;
pub mod request;
pub mod runner;
pub mod session;
pub mod state;
pub mod summary;
pub mod transfer;

// Re-exports
pub use config::{ArchiveConfig, Config, ConverterConfig};
pub use convert::{Converter, Crx2Rnx};
pub use error::{ItemError, RunError, TransferError, ValidationError};
pub use layout::{LocalLayout, LocalPaths, RemoteFileRef, RemoteLayout};
pub use range::{Field, ValueRange};
pub use request::{RequestSpec, RetrievalRequest, Station};
pub use runner::{run, run_with};
pub use session::{Connector, Session};
pub use state::{HourStatus, Stage, resolve_existing_stage, survey};
pub use summary::{OutcomeCounts, OutcomeStatus, RunSummary, TransferOutcome};
pub use transfer::{SessionState, TransferClient};
