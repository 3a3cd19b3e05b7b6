//! Downloading archives to local files.
//!
//! A [`Fetch`] backend performs one timed GET into a file. [`fetch`] wraps a
//! backend with the retry policy and guarantees that a failed download never
//! leaves a partial file behind. The backend is chosen once, by
//! [`select_fetcher`], before any source is processed.

mod command;
mod http;

pub use command::{Tool, ToolFetcher};
pub use http::HttpFetcher;

use async_trait::async_trait;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Which download capability to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// Built-in HTTP client
    Native,
    /// External `wget`
    Wget,
    /// External `curl`
    Curl,
    /// `wget`, else `curl`, else the built-in client
    Auto,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Native => "native",
            Backend::Wget => "wget",
            Backend::Curl => "curl",
            Backend::Auto => "auto",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NetworkUnavailable,
    Timeout,
    HttpError,
    Io,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::NetworkUnavailable => "network unavailable",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::HttpError => "http error",
            FetchErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot reach {url}: {reason}")]
    NetworkUnavailable { url: String, reason: String },
    #[error("fetching {url} timed out after {}s", timeout.as_secs_f32())]
    Timeout { url: String, timeout: Duration },
    #[error("{url} answered with {}", status_text(*status))]
    Http { url: String, status: Option<u16> },
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn status_text(status: Option<u16>) -> String {
    match status {
        Some(code) => format!("HTTP status {code}"),
        None => "an HTTP error status".to_string(),
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::NetworkUnavailable { .. } => FetchErrorKind::NetworkUnavailable,
            FetchError::Timeout { .. } => FetchErrorKind::Timeout,
            FetchError::Http { .. } => FetchErrorKind::HttpError,
            FetchError::Io { .. } => FetchErrorKind::Io,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, FetchError::Io { .. })
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Fixed retry policy: `max_retries` extra attempts, `delay` apart, each
/// attempt bounded by `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// A client able to perform a timed GET into a file.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Short backend name used in logs and the run summary.
    fn name(&self) -> &str;

    /// Download `url` to `dest` once. May leave a partial file on failure.
    async fn fetch_once(&self, url: &str, dest: &Path, timeout: Duration)
    -> Result<(), FetchError>;
}

/// Download `url` into `dest`, retrying transient failures per `policy`.
///
/// On success `dest` holds the complete response body. On failure `dest`
/// does not exist.
pub async fn fetch(
    fetcher: &dyn Fetch,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
) -> Result<(), FetchError> {
    let attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(%url, attempt, backend = fetcher.name(), "fetching");

        let result = match tokio::time::timeout(
            policy.timeout,
            fetcher.fetch_once(url, dest, policy.timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: policy.timeout,
            }),
        };

        let err = match result {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        discard_partial(dest).await;
        if !err.is_transient() || attempt >= attempts {
            return Err(err);
        }

        warn!(
            "fetch attempt {}/{} for {} failed: {}",
            attempt, attempts, url, err
        );
        tokio::time::sleep(policy.delay).await;
    }
}

async fn discard_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!(path = %dest.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dest.display(), error = %e, "cannot remove partial download"),
    }
}

/// No backend satisfying the requested choice could be set up.
#[derive(Debug, Error)]
#[error("no download backend available for `{requested}`: {reason}")]
pub struct ToolingMissing {
    pub requested: Backend,
    pub reason: String,
}

/// Locates external download tools.
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    /// Replaces `PATH` when set.
    pub search_path: Option<OsString>,
}

impl ToolLocator {
    pub fn find(&self, tool: Tool) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => which::which_in(tool.program(), Some(paths), Path::new(".")),
            None => which::which(tool.program()),
        };
        found.ok()
    }
}

/// Resolve `choice` to a concrete backend, once, before any download.
///
/// `direct` makes every backend bypass proxy settings.
pub fn select_fetcher(
    choice: Backend,
    locator: &ToolLocator,
    direct: bool,
) -> Result<Arc<dyn Fetch>, ToolingMissing> {
    let tool = |tool: Tool| {
        locator.find(tool).map(|program| {
            Arc::new(ToolFetcher::new(tool, program).direct(direct)) as Arc<dyn Fetch>
        })
    };
    let native = || {
        let client = if direct {
            HttpFetcher::direct()
        } else {
            HttpFetcher::new()
        };
        client
            .map(|f| Arc::new(f) as Arc<dyn Fetch>)
            .map_err(|e| ToolingMissing {
                requested: choice,
                reason: format!("cannot build HTTP client: {e}"),
            })
    };

    let fetcher = match choice {
        Backend::Native => native()?,
        Backend::Wget | Backend::Curl => {
            let wanted = if choice == Backend::Wget {
                Tool::Wget
            } else {
                Tool::Curl
            };
            tool(wanted).ok_or_else(|| ToolingMissing {
                requested: choice,
                reason: format!("`{}` was not found on the search path", wanted.program()),
            })?
        }
        Backend::Auto => match tool(Tool::Wget).or_else(|| tool(Tool::Curl)) {
            Some(fetcher) => fetcher,
            None => native()?,
        },
    };

    info!("using {} download backend", fetcher.name());
    Ok(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays scripted outcomes, writing a partial file before each failure.
    struct Scripted {
        outcomes: Mutex<Vec<Result<(), FetchErrorKind>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<(), FetchErrorKind>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Fetch for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch_once(
            &self,
            url: &str,
            dest: &Path,
            timeout: Duration,
        ) -> Result<(), FetchError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.outcomes.lock().unwrap().pop().unwrap_or(Ok(()));
            std::fs::write(dest, b"partial").unwrap();
            match next {
                Ok(()) => Ok(()),
                Err(FetchErrorKind::Timeout) => Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout,
                }),
                Err(FetchErrorKind::HttpError) => Err(FetchError::Http {
                    url: url.to_string(),
                    status: Some(503),
                }),
                Err(FetchErrorKind::Io) => Err(FetchError::io(
                    dest,
                    std::io::Error::other("disk full"),
                )),
                Err(FetchErrorKind::NetworkUnavailable) => Err(FetchError::NetworkUnavailable {
                    url: url.to_string(),
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_retries,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pack.zip");
        let fetcher = Scripted::new(vec![
            Err(FetchErrorKind::NetworkUnavailable),
            Err(FetchErrorKind::HttpError),
            Ok(()),
        ]);

        fetch(&fetcher, "http://example.invalid/a.zip", &dest, &quick_policy(3))
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 3);
        assert!(dest.is_file());
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pack.zip");
        let fetcher = Scripted::new(vec![Err(FetchErrorKind::Timeout); 5]);

        let err = fetch(&fetcher, "http://example.invalid/a.zip", &dest, &quick_policy(2))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FetchErrorKind::Timeout);
        assert_eq!(fetcher.calls(), 3);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn local_write_failures_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("pack.zip");
        let fetcher = Scripted::new(vec![Err(FetchErrorKind::Io), Ok(())]);

        let err = fetch(&fetcher, "http://example.invalid/a.zip", &dest, &quick_policy(3))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FetchErrorKind::Io);
        assert_eq!(fetcher.calls(), 1);
        assert!(!dest.exists());
    }

    #[test]
    fn explicit_tool_missing_from_search_path_is_tooling_missing() {
        let empty = tempfile::tempdir().unwrap();
        let locator = ToolLocator {
            search_path: Some(empty.path().as_os_str().to_owned()),
        };

        for choice in [Backend::Wget, Backend::Curl] {
            let err = select_fetcher(choice, &locator, false).err().unwrap();
            assert_eq!(err.requested, choice);
        }
    }

    #[test]
    fn auto_falls_back_to_native_client() {
        let empty = tempfile::tempdir().unwrap();
        let locator = ToolLocator {
            search_path: Some(empty.path().as_os_str().to_owned()),
        };

        let fetcher = select_fetcher(Backend::Auto, &locator, false).unwrap();
        assert_eq!(fetcher.name(), "native");
    }
}
