use async_trait::async_trait;
use reqwest::Client;
use std::error::Error as _;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{Fetch, FetchError};

/// Downloads with the built-in `reqwest` client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> reqwest::Result<Self> {
        Self::build(false)
    }

    /// Connect directly, ignoring proxy environment variables.
    pub fn direct() -> reqwest::Result<Self> {
        Self::build(true)
    }

    fn build(direct: bool) -> reqwest::Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30));
        if direct {
            builder = builder.no_proxy();
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    fn classify(url: &str, timeout: Duration, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout {
                url: url.to_string(),
                timeout,
            };
        }
        if let Some(status) = err.status() {
            return FetchError::Http {
                url: url.to_string(),
                status: Some(status.as_u16()),
            };
        }
        let mut reason = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        FetchError::NetworkUnavailable {
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    fn name(&self) -> &str {
        "native"
    }

    async fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let mut resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(url, timeout, e))?;

        if !resp.status().is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: Some(resp.status().as_u16()),
            });
        }

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| FetchError::io(dest, e))?;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Self::classify(url, timeout, e))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(dest, e))?;
        }
        file.flush().await.map_err(|e| FetchError::io(dest, e))?;

        Ok(())
    }
}
