use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Fetch, FetchError};

/// External download programs that can stand in for the built-in client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Wget,
    Curl,
}

impl Tool {
    pub fn program(&self) -> &'static str {
        match self {
            Tool::Wget => "wget",
            Tool::Curl => "curl",
        }
    }

    /// Quiet, non-interactive, single-attempt arguments; retries belong to
    /// [`fetch`](super::fetch).
    fn args(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
        direct: bool,
    ) -> Vec<std::ffi::OsString> {
        let secs = timeout.as_secs().max(1).to_string();
        let mut args: Vec<std::ffi::OsString> = match (self, direct) {
            (Tool::Wget, true) => vec!["--no-proxy".into()],
            (Tool::Curl, true) => vec!["--noproxy".into(), "*".into()],
            (_, false) => Vec::new(),
        };
        let rest: [std::ffi::OsString; 8] = match self {
            Tool::Wget => [
                "-q".into(),
                "-T".into(),
                secs.into(),
                "-t".into(),
                "1".into(),
                "-O".into(),
                dest.into(),
                url.into(),
            ],
            Tool::Curl => [
                "-fsSL".into(),
                "--max-time".into(),
                secs.into(),
                "-w".into(),
                "%{http_code}".into(),
                "-o".into(),
                dest.into(),
                url.into(),
            ],
        };
        args.extend(rest);
        args
    }

    /// Map a non-zero exit status to a fetch error.
    fn failure(&self, url: &str, timeout: Duration, code: Option<i32>, stdout: &str) -> FetchError {
        let url_owned = url.to_string();
        match (self, code) {
            // curl: 28 operation timed out, 22 HTTP error with -f
            (Tool::Curl, Some(28)) => FetchError::Timeout {
                url: url_owned,
                timeout,
            },
            (Tool::Curl, Some(22)) => FetchError::Http {
                url: url_owned,
                status: stdout.trim().parse().ok().filter(|code| *code != 0),
            },
            // wget: 8 server issued an error response
            (Tool::Wget, Some(8)) => FetchError::Http {
                url: url_owned,
                status: None,
            },
            _ => FetchError::NetworkUnavailable {
                url: url_owned,
                reason: match code {
                    Some(code) => format!("{} exited with status {code}", self.program()),
                    None => format!("{} was terminated by a signal", self.program()),
                },
            },
        }
    }
}

/// Downloads by running `wget` or `curl`.
pub struct ToolFetcher {
    tool: Tool,
    program: PathBuf,
    direct: bool,
}

impl ToolFetcher {
    pub fn new(tool: Tool, program: PathBuf) -> Self {
        Self {
            tool,
            program,
            direct: false,
        }
    }

    /// Ask the tool to ignore proxy settings.
    pub fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }
}

#[async_trait]
impl Fetch for ToolFetcher {
    fn name(&self) -> &str {
        self.tool.program()
    }

    async fn fetch_once(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let output = Command::new(&self.program)
            .args(self.tool.args(url, dest, timeout, self.direct))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::NetworkUnavailable {
                url: url.to_string(),
                reason: format!("cannot run {}: {e}", self.program.display()),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Err(self
            .tool
            .failure(url, timeout, output.status.code(), &stdout))
    }
}
