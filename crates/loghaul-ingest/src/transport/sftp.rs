//! SFTP transport
//!
//! Host key verification follows the source's [`HostKeyPolicy`]. The default
//! policy accepts any key, matching how most log collectors are deployed
//! against internal hosts; set `strict_host_key_checking = true` and point
//! `known_hosts` at an OpenSSH known_hosts file to verify it.

use super::{on_session, tcp_connect, Transport};
use crate::error::{IngestError, Result};
use crate::source::{Credentials, HostKeyPolicy, Protocol};
use async_trait::async_trait;
use ssh2::{CheckResult, KnownHostFileKind, Session, Sftp};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

struct SftpSession {
    session: Session,
    sftp: Sftp,
}

/// SFTP client holding one authenticated SSH session
pub struct SftpTransport {
    endpoint: String,
    session: Option<SftpSession>,
}

impl SftpTransport {
    /// Open the SSH session, verify the host key, authenticate, and start SFTP
    ///
    /// `timeout` bounds the TCP connect and each blocking libssh2 call.
    pub async fn connect(
        host: &str,
        port: u16,
        credentials: &Credentials,
        host_keys: &HostKeyPolicy,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = format!("sftp://{host}:{port}");
        if matches!(host_keys, HostKeyPolicy::AcceptAny) {
            debug!(endpoint = %endpoint, "Host key checking is relaxed for this source");
        }

        let host = host.to_string();
        let credentials = credentials.clone();
        let host_keys = host_keys.clone();
        let label = endpoint.clone();

        let session = tokio::task::spawn_blocking(move || {
            open_session(&label, &host, port, &credentials, &host_keys, timeout)
        })
        .await
        .map_err(|e| IngestError::connection(&endpoint, format!("connect task failed: {e}")))??;

        info!(endpoint = %endpoint, "SFTP session established");
        Ok(Self {
            endpoint,
            session: Some(session),
        })
    }
}

fn open_session(
    endpoint: &str,
    host: &str,
    port: u16,
    credentials: &Credentials,
    host_keys: &HostKeyPolicy,
    timeout: Duration,
) -> Result<SftpSession> {
    let fail = |e: &dyn std::fmt::Display| IngestError::connection(endpoint, e);

    let tcp = tcp_connect(host, port, timeout).map_err(|e| fail(&e))?;
    let mut session = Session::new().map_err(|e| fail(&e))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| fail(&e))?;

    verify_host_key(&session, host, port, host_keys).map_err(|e| fail(&e))?;

    session
        .userauth_password(&credentials.login, &credentials.password)
        .map_err(|e| fail(&e))?;
    if !session.authenticated() {
        return Err(fail(&"authentication rejected"));
    }

    let sftp = session.sftp().map_err(|e| fail(&e))?;
    Ok(SftpSession { session, sftp })
}

fn verify_host_key(
    session: &Session,
    host: &str,
    port: u16,
    policy: &HostKeyPolicy,
) -> std::result::Result<(), String> {
    let known_hosts_file = match policy {
        HostKeyPolicy::AcceptAny => return Ok(()),
        HostKeyPolicy::KnownHosts(path) => path,
    };

    let mut known_hosts = session.known_hosts().map_err(|e| e.to_string())?;
    known_hosts
        .read_file(known_hosts_file, KnownHostFileKind::OpenSSH)
        .map_err(|e| format!("cannot read {}: {e}", known_hosts_file.display()))?;

    let (key, _) = session
        .host_key()
        .ok_or_else(|| "server presented no host key".to_string())?;

    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(format!("host key for {host} does not match known_hosts")),
        CheckResult::NotFound => Err(format!("{host} is not listed in known_hosts")),
        CheckResult::Failure => Err("host key check failed".to_string()),
    }
}

fn retrieve(session: &SftpSession, remote_path: &str, destination: &Path) -> Result<u64> {
    let mut remote = session
        .sftp
        .open(Path::new(remote_path))
        .map_err(|e| IngestError::fetch(remote_path, e))?;
    let mut file = File::create(destination).map_err(|e| IngestError::fetch(remote_path, e))?;
    std::io::copy(&mut remote, &mut file).map_err(|e| IngestError::fetch(remote_path, e))
}

#[async_trait]
impl Transport for SftpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Sftp
    }

    async fn fetch(&mut self, remote_path: &str, destination: &Path) -> Result<u64> {
        let session = self
            .session
            .take()
            .ok_or_else(|| IngestError::fetch(remote_path, "SFTP session is closed"))?;

        let path = remote_path.to_string();
        let dest: PathBuf = destination.to_path_buf();

        let (session, result) =
            on_session(session, remote_path, move |session| retrieve(session, &path, &dest)).await;

        match session {
            Some(session) => self.session = Some(session),
            None => warn!(endpoint = %self.endpoint, "SSH session lost, later fetches of this run will fail"),
        }
        if let Ok(bytes) = &result {
            debug!(endpoint = %self.endpoint, path = remote_path, bytes, "Downloaded");
        }
        result
    }

    async fn close(&mut self) {
        let Some(SftpSession { session, sftp }) = self.session.take() else {
            return;
        };

        let closed = tokio::task::spawn_blocking(move || {
            drop(sftp);
            session.disconnect(None, "loghaul run finished", None)
        })
        .await;

        match closed {
            Ok(Ok(())) => debug!(endpoint = %self.endpoint, "SFTP session closed"),
            Ok(Err(e)) => warn!(endpoint = %self.endpoint, error = %e, "Failed to disconnect SSH session gracefully"),
            Err(e) => warn!(endpoint = %self.endpoint, error = %e, "SFTP disconnect task failed"),
        }
    }
}
