use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::collect::AssetExtensions;
use crate::config::{self, Settings};
use crate::fetch::{Backend, RetryPolicy};
use crate::registry::SourceRegistry;

#[derive(Parser, Debug)]
#[command(name = "presetsync")]
#[command(version)]
#[command(about = "Download projectM preset packs and merge them into one presets directory", long_about = None)]
#[command(after_help = "Examples:\n  \
  presetsync                          sync the built-in preset packs into ~/.projectM/presets\n  \
  presetsync --backend auto           download with wget or curl when available\n  \
  presetsync --local-archives --no-remote   only unpack *.zip files already in ~/.projectM")]
pub struct Cli {
    /// Presets directory to merge into [default: ~/.projectM/presets]
    #[arg(short = 'o', long, value_name = "DIR", env = "PRESETSYNC_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Directory for per-source scratch workspaces [default: system temp dir]
    #[arg(long, value_name = "DIR", env = "PRESETSYNC_SCRATCH")]
    pub scratch_dir: Option<PathBuf>,

    /// Download backend
    #[arg(long, value_enum, default_value_t = Backend::Native, env = "PRESETSYNC_BACKEND")]
    pub backend: Backend,

    /// Ignore proxy environment variables when downloading
    #[arg(long)]
    pub no_proxy: bool,

    /// Per-attempt download timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,

    /// Extra download attempts after a failure
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub retries: u32,

    /// Pause between download attempts in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// Time limit for extracting one archive in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub extract_timeout: u64,

    /// Accepted preset extension (repeatable)
    #[arg(long = "ext", value_name = "EXT", default_values = ["milk", "prjm"])]
    pub extensions: Vec<String>,

    /// Match extensions regardless of case
    #[arg(long)]
    pub ignore_case: bool,

    /// Also unpack *.zip archives found in DIR [default: ~/.projectM]
    #[arg(long, value_name = "DIR", num_args = 0..=1)]
    pub local_archives: Option<Option<PathBuf>>,

    /// Do not move consumed local archives into processed/
    #[arg(long)]
    pub keep_local_archives: bool,

    /// Skip the built-in remote preset packs
    #[arg(long)]
    pub no_remote: bool,

    /// Exit with status 3 when no asset was collected
    #[arg(long)]
    pub fail_on_empty: bool,

    /// Print the sources that would be processed and exit
    #[arg(long)]
    pub list_sources: bool,

    /// More output (-vv => trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Quiet mode (-qq => errors only)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => LevelFilter::INFO,
            (0, 1) => LevelFilter::DEBUG,
            (0, _) => LevelFilter::TRACE,
            (1, _) => LevelFilter::WARN,
            _ => LevelFilter::ERROR,
        }
    }

    pub fn settings(&self) -> Result<Settings> {
        let canonical_dir = match &self.output {
            Some(dir) => dir.clone(),
            None => config::default_canonical_dir()
                .context("cannot determine the home directory, pass --output")?,
        };

        let mut settings = Settings::new(canonical_dir);
        if let Some(dir) = &self.scratch_dir {
            settings.scratch_root = dir.clone();
        }
        settings.backend = self.backend;
        settings.direct_connection = self.no_proxy;
        settings.retry = RetryPolicy {
            timeout: Duration::from_secs(self.timeout.max(1)),
            max_retries: self.retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        };
        settings.extract_timeout = Duration::from_secs(self.extract_timeout.max(1));
        settings.extensions = AssetExtensions::new(&self.extensions)
            .context("at least one non-empty --ext is required")?
            .ignore_case(self.ignore_case);
        settings.keep_local_archives = self.keep_local_archives;
        Ok(settings)
    }

    pub fn registry(&self) -> Result<SourceRegistry> {
        let mut registry = SourceRegistry::builtin().context("built-in source table is invalid")?;

        if let Some(dir) = &self.local_archives {
            let dir = match dir {
                Some(dir) => dir.clone(),
                None => config::default_local_archive_dir()
                    .context("cannot determine the home directory, pass --local-archives DIR")?,
            };
            registry = registry.with_local_archives(&dir)?;
        }

        if self.no_remote {
            registry = registry.local_only();
            if registry.is_empty() {
                warn!("--no-remote leaves no sources to process");
            }
        }
        Ok(registry)
    }
}
