//! Remote archive session capability
//!
//! The transfer client only talks to these traits, so the FTPS
//! implementation and in-memory test archives are interchangeable.

use std::io::Write;

use indicatif::ProgressBar;

use crate::error::TransferError;
use crate::layout::RemoteFileRef;

/// An open, authenticated session against the archive.
pub trait Session {
    /// Entry names (not paths) of a remote directory.
    fn list(&mut self, dir: &str) -> Result<Vec<String>, TransferError>;

    /// Size of a remote file, `None` if the server does not report sizes.
    fn size(&mut self, remote: &RemoteFileRef) -> Result<Option<u64>, TransferError>;

    /// Stream a remote file into `sink`, returning the byte count.
    fn retrieve(
        &mut self,
        remote: &RemoteFileRef,
        sink: &mut dyn Write,
        pb: &ProgressBar,
    ) -> Result<u64, TransferError>;

    /// Politely end the session. Errors are ignored.
    fn close(&mut self) {}
}

/// Opens sessions; one call is one connection attempt.
pub trait Connector {
    type Session: Session;

    fn connect(&self) -> Result<Self::Session, TransferError>;

    /// Human-readable endpoint for log lines
    fn endpoint(&self) -> String;
}
