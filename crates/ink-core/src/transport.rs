use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{context} failed with HTTP {status}")]
    Status {
        context: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{context}: empty response from server")]
    EmptyBody { context: &'static str },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    pub(crate) fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

/// Bounded-timeout GETs. The seam between the pipeline and the network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the whole body of `url`.
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Write the body of `url` to `dest`, truncating anything already there.
    /// Returns the number of bytes written.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<u64, TransportError> {
        let body = self.get(url, timeout).await?;
        tokio::fs::write(dest, &body).await.map_err(|error| {
            TransportError::io_with_path("failed to write download file", dest, &error)
        })?;
        Ok(body.len() as u64)
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!("ink-updater/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        url: &str,
        timeout: Duration,
        context: &'static str,
    ) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| TransportError::http(context, error))?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                context,
                status: response.status(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        debug!("GET {url}");
        let response = self.send(url, timeout, "request").await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|error| TransportError::http("failed to read response body", error))
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<u64, TransportError> {
        use futures_util::StreamExt;

        let response = self.send(url, timeout, "download request").await?;
        let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
            TransportError::io_with_path("failed to create download file", dest, &error)
        })?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|error| TransportError::http("download stream error", error))?;
            file.write_all(&chunk).await.map_err(|error| {
                TransportError::io_with_path("failed to write download data", dest, &error)
            })?;
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|error| {
            TransportError::io_with_path("failed to flush download file", dest, &error)
        })?;

        info!("Download complete: {downloaded} bytes");
        Ok(downloaded)
    }
}
