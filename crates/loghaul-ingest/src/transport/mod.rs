//! Transport clients that fetch one remote file into one local file
//!
//! - **http**: stateless GET of `base_url + remote_path`, streamed to disk
//! - **ftp**: one passive-mode binary session reused for the whole run
//! - **sftp**: one SSH session with an SFTP channel reused for the whole run
//!
//! Each protocol's `connect` establishes its session up front and fails with
//! [`IngestError::Connection`]. A failed `fetch` is reported per file and
//! leaves the session usable for the next file.

pub mod ftp;
pub mod http;
pub mod sftp;

use crate::error::{IngestError, Result};
use crate::source::{Endpoint, Protocol};
use async_trait::async_trait;
use std::net::{TcpStream, ToSocketAddrs};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::time::Duration;

pub use ftp::FtpTransport;
pub use http::HttpTransport;
pub use sftp::SftpTransport;

/// Default timeout for one HTTP request, in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default timeout for opening an FTP or SSH connection, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Fetch capability shared by every protocol
#[async_trait]
pub trait Transport: Send {
    /// Protocol this transport speaks
    fn protocol(&self) -> Protocol;

    /// Download `remote_path` into `destination`, returning the bytes written
    ///
    /// `destination` is created or truncated.
    async fn fetch(&mut self, remote_path: &str, destination: &Path) -> Result<u64>;

    /// Release the session; calling it again is a no-op
    async fn close(&mut self);
}

/// Transport settings that are not part of a source
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub http_timeout: Duration,
    /// Bounds the TCP connect of FTP and SFTP sessions, and every blocking
    /// control-channel read after it
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: format!("loghaul/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Open the transport matching an endpoint's protocol
pub async fn connect(endpoint: &Endpoint, options: &TransportOptions) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match endpoint {
        Endpoint::Http { base_url } => Box::new(HttpTransport::connect(base_url, options)?),
        Endpoint::Ftp {
            host,
            port,
            credentials,
        } => Box::new(FtpTransport::connect(host, *port, credentials, options.connect_timeout).await?),
        Endpoint::Sftp {
            host,
            port,
            credentials,
            host_keys,
        } => Box::new(
            SftpTransport::connect(host, *port, credentials, host_keys, options.connect_timeout)
                .await?,
        ),
    };
    Ok(transport)
}

/// Open a TCP connection to the first reachable address of `host`
///
/// Read and write timeouts are set to `timeout` as well.
pub(crate) fn tcp_connect(host: &str, port: u16, timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last_error = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(stream);
            },
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{host} did not resolve to any address"),
        )
    }))
}

/// Run a blocking transfer on a session moved into the blocking pool
///
/// The session is handed back even when `op` panics. It comes back as `None`
/// only when the blocking task itself could not finish.
pub(crate) async fn on_session<S, T, F>(session: S, remote_path: &str, op: F) -> (Option<S>, Result<T>)
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T> + Send + 'static,
{
    let path = remote_path.to_string();
    let joined = tokio::task::spawn_blocking(move || {
        let mut session = session;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| op(&mut session)))
            .unwrap_or_else(|_| Err(IngestError::fetch(&path, "transfer panicked")));
        (session, result)
    })
    .await;

    match joined {
        Ok((session, result)) => (Some(session), result),
        Err(e) => (
            None,
            Err(IngestError::fetch(remote_path, format!("transfer task failed: {e}"))),
        ),
    }
}
