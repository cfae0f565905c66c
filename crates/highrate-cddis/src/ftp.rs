//! Anonymous FTPS session against the archive
//!
//! Explicit TLS (`AUTH TLS`, protected data channel), passive mode, binary
//! transfers. Every socket, control and data, carries the configured
//! timeout so no call can block indefinitely.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use highrate_core::{copy_cancellable, is_shutdown_requested};
use indicatif::ProgressBar;
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, NativeTlsConnector, NativeTlsFtpStream};

use crate::config::ArchiveConfig;
use crate::error::{FTP_FILE_UNAVAILABLE, TransferError};
use crate::layout::RemoteFileRef;
use crate::session::{Connector, Session};

/// NLST reply some servers send for an empty directory
const FTP_NO_FILES: u16 = 450;

/// Opens [`FtpSession`]s from archive settings.
#[derive(Debug, Clone)]
pub struct FtpConnector {
    host: String,
    port: u16,
    tls: bool,
    user: String,
    password: String,
    timeout: Duration,
}

impl FtpConnector {
    pub fn new(archive: &ArchiveConfig) -> Self {
        Self {
            host: archive.host.clone(),
            port: archive.port,
            tls: archive.tls,
            user: archive.user.clone(),
            password: archive.password.clone(),
            timeout: archive.timeout,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, TransferError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TransferError::Connect(format!("resolve {}: {e}", self.host)))?
            .next()
            .ok_or_else(|| TransferError::Connect(format!("no address for {}", self.host)))
    }
}

impl Connector for FtpConnector {
    type Session = FtpSession;

    fn connect(&self) -> Result<FtpSession, TransferError> {
        let addr = self.resolve()?;
        let timeout = self.timeout;

        let mut stream =
            NativeTlsFtpStream::connect_timeout(addr, timeout).map_err(|e| connect_error(&e))?;
        set_timeouts(stream.get_ref(), timeout).map_err(TransferError::Io)?;
        stream = stream.passive_stream_builder(move |data_addr| data_stream(data_addr, timeout));

        if self.tls {
            let tls = TlsConnector::new().map_err(|e| TransferError::Connect(format!("TLS: {e}")))?;
            stream = stream
                .into_secure(NativeTlsConnector::from(tls), &self.host)
                .map_err(|e| connect_error(&e))?;
        }

        stream
            .login(self.user.as_str(), self.password.as_str())
            .map_err(|e| connect_error(&e))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| map_ftp_error(e, "TYPE I"))?;

        Ok(FtpSession { stream })
    }

    fn endpoint(&self) -> String {
        let scheme = if self.tls { "ftps" } else { "ftp" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// One logged-in control connection.
pub struct FtpSession {
    stream: NativeTlsFtpStream,
}

impl Session for FtpSession {
    fn list(&mut self, dir: &str) -> Result<Vec<String>, TransferError> {
        match self.stream.nlst(Some(dir)) {
            Ok(names) => Ok(names
                .iter()
                .map(|n| n.trim_end_matches('/').rsplit('/').next().unwrap_or(n).to_string())
                .filter(|n| !n.is_empty() && n != "." && n != "..")
                .collect()),
            Err(FtpError::UnexpectedResponse(resp)) if reply_code(&resp) == FTP_NO_FILES => {
                Ok(Vec::new())
            }
            Err(e) => Err(map_ftp_error(e, dir)),
        }
    }

    fn size(&mut self, remote: &RemoteFileRef) -> Result<Option<u64>, TransferError> {
        let path = remote.path();
        match self.stream.size(&path) {
            Ok(n) => Ok(Some(n as u64)),
            Err(FtpError::UnexpectedResponse(resp)) => match reply_code(&resp) {
                FTP_FILE_UNAVAILABLE => Err(TransferError::NotFound(path)),
                // SIZE not supported
                500..=504 => Ok(None),
                code => Err(TransferError::Server {
                    code,
                    message: String::from_utf8_lossy(&resp.body).into_owned(),
                }),
            },
            Err(e) => Err(map_ftp_error(e, &path)),
        }
    }

    fn retrieve(
        &mut self,
        remote: &RemoteFileRef,
        sink: &mut dyn Write,
        pb: &ProgressBar,
    ) -> Result<u64, TransferError> {
        let path = remote.path();
        self.stream
            .retr(&path, |reader| {
                copy_cancellable(reader, &mut *sink, &is_shutdown_requested, |n| pb.inc(n))
                    .map_err(FtpError::ConnectionError)
            })
            .map_err(|e| map_ftp_error(e, &path))
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.quit() {
            log::debug!("QUIT failed: {e}");
        }
    }
}

fn set_timeouts(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

/// Passive-mode data connection with the same timeout as the control one
fn data_stream(addr: SocketAddr, timeout: Duration) -> FtpResult<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)?;
    set_timeouts(&stream, timeout).map_err(FtpError::ConnectionError)?;
    Ok(stream)
}

fn reply_code(resp: &suppaftp::types::Response) -> u16 {
    u16::try_from(resp.status.code()).unwrap_or(0)
}

fn connect_error(e: &FtpError) -> TransferError {
    match e {
        FtpError::ConnectionError(io) => {
            TransferError::Connect(format!("{}: {io}", io.kind()))
        }
        other => TransferError::Connect(other.to_string()),
    }
}

/// Classify an FTP failure for the retry policy.
fn map_ftp_error(e: FtpError, path: &str) -> TransferError {
    match e {
        FtpError::ConnectionError(io) => TransferError::from(io),
        FtpError::UnexpectedResponse(resp) => match reply_code(&resp) {
            FTP_FILE_UNAVAILABLE => TransferError::NotFound(path.to_string()),
            code => TransferError::Server {
                code,
                message: String::from_utf8_lossy(&resp.body).into_owned(),
            },
        },
        other => TransferError::Connect(other.to_string()),
    }
}
