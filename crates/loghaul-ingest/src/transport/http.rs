//! HTTP transport

use super::{Transport, TransportOptions};
use crate::error::{IngestError, Result};
use crate::source::Protocol;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Fetches files with plain GET requests against a base URL
///
/// There is no session: `connect` only builds the client, and `close` has
/// nothing to release.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn connect(base_url: &str, options: &TransportOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.http_timeout)
            .user_agent(options.user_agent.as_str())
            .build()
            .map_err(|e| IngestError::connection(base_url, e))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Full URL of a remote path
    pub fn url_for(&self, remote_path: &str) -> String {
        format!("{}{}", self.base_url, remote_path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn fetch(&mut self, remote_path: &str, destination: &Path) -> Result<u64> {
        let url = self.url_for(remote_path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::fetch(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::fetch(url, format!("HTTP status {status}")));
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| IngestError::fetch(&url, e))?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IngestError::fetch(&url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| IngestError::fetch(&url, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| IngestError::fetch(&url, e))?;

        debug!(url = %url, bytes = written, "Downloaded");
        Ok(written)
    }

    async fn close(&mut self) {}
}
