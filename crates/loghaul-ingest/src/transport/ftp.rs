//! FTP transport
//!
//! One control connection is opened and authenticated in [`FtpTransport::connect`]
//! and reused for every file of the run. `suppaftp`'s synchronous stream is
//! driven from `spawn_blocking`; the stream is moved into the blocking task and
//! handed back when the transfer finishes.
//!
//! # Examples
//!
//! ```rust,ignore
//! use loghaul_ingest::source::Credentials;
//! use loghaul_ingest::transport::{FtpTransport, Transport};
//!
//! let credentials = Credentials {
//!     login: "anonymous".to_string(),
//!     password: "user@example.com".to_string(),
//! };
//! let mut ftp = FtpTransport::connect("ftp.example.com", 21, &credentials, Duration::from_secs(30)).await?;
//! ftp.fetch("/logs/app-20240101.log", Path::new("/tmp/app.log")).await?;
//! ftp.close().await;
//! ```

use super::{on_session, tcp_connect, Transport};
use crate::error::{IngestError, Result};
use crate::source::{Credentials, Protocol};
use async_trait::async_trait;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, FtpStream, Mode};
use tracing::{debug, info, warn};

/// FTP client holding one authenticated session
pub struct FtpTransport {
    endpoint: String,
    stream: Option<FtpStream>,
}

impl FtpTransport {
    /// Connect, log in, and switch to passive binary mode
    ///
    /// `timeout` bounds the TCP connect and every control-channel reply.
    pub async fn connect(
        host: &str,
        port: u16,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = format!("ftp://{host}:{port}");
        let host = host.to_string();
        let credentials = credentials.clone();

        debug!(endpoint = %endpoint, login = %credentials.login, "Connecting to FTP server");

        let stream =
            tokio::task::spawn_blocking(move || open_session(&host, port, &credentials, timeout))
                .await
                .map_err(|e| IngestError::connection(&endpoint, format!("connect task failed: {e}")))?
                .map_err(|e| IngestError::connection(&endpoint, e))?;

        info!(endpoint = %endpoint, "FTP session established");
        Ok(Self {
            endpoint,
            stream: Some(stream),
        })
    }
}

fn open_session(
    host: &str,
    port: u16,
    credentials: &Credentials,
    timeout: Duration,
) -> FtpResult<FtpStream> {
    let tcp = tcp_connect(host, port, timeout).map_err(FtpError::ConnectionError)?;
    let mut stream = FtpStream::connect_with_stream(tcp)?;
    stream.set_mode(Mode::Passive);

    if let Err(e) = stream
        .login(&credentials.login, &credentials.password)
        .and_then(|_| stream.transfer_type(FileType::Binary))
    {
        let _ = stream.quit();
        return Err(e);
    }

    Ok(stream)
}

fn retrieve(stream: &mut FtpStream, remote_path: &str, destination: &Path) -> Result<u64> {
    let mut data = stream
        .retr_as_stream(remote_path)
        .map_err(|e| IngestError::fetch(remote_path, e))?;

    let copied = File::create(destination).and_then(|mut file| std::io::copy(&mut data, &mut file));

    // The data channel must be finalized even after a failed copy, or the
    // control connection falls out of step for the next file
    let finalized = stream.finalize_retr_stream(data);

    let bytes = copied.map_err(|e| IngestError::fetch(remote_path, e))?;
    finalized.map_err(|e| IngestError::fetch(remote_path, e))?;
    Ok(bytes)
}

#[async_trait]
impl Transport for FtpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    async fn fetch(&mut self, remote_path: &str, destination: &Path) -> Result<u64> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| IngestError::fetch(remote_path, "FTP session is closed"))?;

        let path = remote_path.to_string();
        let dest: PathBuf = destination.to_path_buf();
        let (stream, result) =
            on_session(stream, remote_path, move |stream| retrieve(stream, &path, &dest)).await;

        match stream {
            Some(stream) => self.stream = Some(stream),
            None => warn!(endpoint = %self.endpoint, "FTP session lost, later fetches of this run will fail"),
        }
        if let Ok(bytes) = &result {
            debug!(endpoint = %self.endpoint, path = remote_path, bytes, "Downloaded");
        }
        result
    }

    async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        match tokio::task::spawn_blocking(move || stream.quit()).await {
            Ok(Ok(())) => debug!(endpoint = %self.endpoint, "FTP session closed"),
            Ok(Err(e)) => warn!(endpoint = %self.endpoint, error = %e, "Failed to quit FTP session gracefully"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "FTP quit task failed"),
        }
    }
}
