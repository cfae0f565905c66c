//! Error taxonomy for the retrieval engine
//!
//! Three layers:
//! - [`TransferError`]: one session operation failed (classified for retry)
//! - [`ItemError`]: one (station, day, hour) item failed terminally
//! - [`RunError`]: the whole batch cannot proceed

use std::fmt;
use std::io;
use std::path::PathBuf;

use highrate_core::Retryable;

/// Reply code the archive uses for "no such file or directory"
pub const FTP_FILE_UNAVAILABLE: u16 = 550;

/// Reply code for "service not available, closing control connection"
pub const FTP_SERVICE_UNAVAILABLE: u16 = 421;

/// A request field failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}': {}", self.field, self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Failure of a single session operation (connect, list, size, retrieve).
#[derive(Debug)]
pub enum TransferError {
    /// Session could not be opened or authenticated
    Connect(String),
    /// Socket I/O error, timeouts included
    Io(io::Error),
    /// Writing the local destination failed
    Local(io::Error),
    /// Unexpected server reply
    Server { code: u16, message: String },
    /// Remote file or directory does not exist
    NotFound(String),
    /// Byte count differs from the size the server announced
    Truncated { expected: u64, received: u64 },
    /// Shutdown requested mid-transfer
    Cancelled,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect: {msg}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Local(e) => write!(f, "local write: {e}"),
            Self::Server { code, message } => write!(f, "server {code}: {}", message.trim()),
            Self::NotFound(path) => write!(f, "not found: {path}"),
            Self::Truncated { expected, received } => {
                write!(f, "truncated: received {received} of {expected} bytes")
            }
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for TransferError {}

// `io::Error` is not `Clone`: the copy keeps kind and message
impl Clone for TransferError {
    fn clone(&self) -> Self {
        match self {
            Self::Connect(msg) => Self::Connect(msg.clone()),
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Local(e) => Self::Local(io::Error::new(e.kind(), e.to_string())),
            Self::Server { code, message } => Self::Server {
                code: *code,
                message: message.clone(),
            },
            Self::NotFound(path) => Self::NotFound(path.clone()),
            Self::Truncated { expected, received } => Self::Truncated {
                expected: *expected,
                received: *received,
            },
            Self::Cancelled => Self::Cancelled,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::Interrupted {
            Self::Cancelled
        } else {
            Self::Io(e)
        }
    }
}

impl TransferError {
    /// The failure means the session itself is unusable and must be reopened.
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Io(_) => true,
            Self::Server { code, .. } => *code == FTP_SERVICE_UNAVAILABLE,
            Self::Local(_) | Self::NotFound(_) | Self::Truncated { .. } | Self::Cancelled => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Retryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Truncated { .. } => true,
            // Disk full is not retryable, timeout and reset are
            Self::Io(e) => e.kind() != io::ErrorKind::StorageFull,
            // 4xx = transient negative completion, 5xx = permanent
            Self::Server { code, .. } => (400..500).contains(code),
            Self::Local(_) | Self::NotFound(_) | Self::Cancelled => false,
        }
    }
}

/// Terminal failure of one batch item.
#[derive(Debug)]
pub enum ItemError {
    /// Transfer could not complete within the retry budget
    Connection(TransferError),
    /// Nothing to fetch at the expected remote path
    RemoteNotFound(String),
    /// Compressed artifact is truncated or malformed
    CorruptArchive { path: PathBuf, reason: String },
    /// External converter failed or timed out
    Conversion(String),
    /// Local filesystem error
    Io(io::Error),
    /// Shutdown requested
    Cancelled,
}

impl ItemError {
    /// Short stable label used in summaries and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::RemoteNotFound(_) => "remote-not-found",
            Self::CorruptArchive { .. } => "corrupt-archive",
            Self::Conversion(_) => "conversion",
            Self::Io(_) => "io",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "transfer failed: {e}"),
            Self::RemoteNotFound(path) => write!(f, "remote not found: {path}"),
            Self::CorruptArchive { path, reason } => {
                write!(f, "corrupt archive {}: {reason}", path.display())
            }
            Self::Conversion(msg) => write!(f, "conversion failed: {msg}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for ItemError {}

impl From<TransferError> for ItemError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::NotFound(path) => Self::RemoteNotFound(path),
            TransferError::Cancelled => Self::Cancelled,
            TransferError::Local(e) => Self::Io(e),
            other => Self::Connection(other),
        }
    }
}

impl From<io::Error> for ItemError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Failure that aborts the whole batch before or at its first network step.
#[derive(Debug)]
pub enum RunError {
    Validation(ValidationError),
    ConverterUnavailable { program: PathBuf, reason: String },
    Connection(TransferError),
    Io(io::Error),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{e}"),
            Self::ConverterUnavailable { program, reason } => {
                write!(f, "converter {} unavailable: {reason}", program.display())
            }
            Self::Connection(e) => write!(f, "cannot reach archive: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<ValidationError> for RunError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
