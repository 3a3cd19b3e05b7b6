//! # presetsync
//!
//! Keeps a projectM presets directory filled from a fixed list of preset
//! pack archives.
//!
//! Every source goes through the same pipeline: download the zip into a
//! private scratch workspace, unpack it, pick out files with an accepted
//! extension (`.milk` and `.prjm` by default) and copy them, flattened by
//! file name, into the presets directory. A source that cannot be downloaded
//! or unpacked is skipped and reported; the others still run. Name clashes
//! are resolved by the last copy, so later sources in the registry win.
//!
//! ## Example
//!
//! ```no_run
//! use presetsync::{Pipeline, Settings, SourceRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new("/home/me/.projectM/presets");
//!     let pipeline = Pipeline::new(settings);
//!     let summary = pipeline.run(&SourceRegistry::builtin()?).await?;
//!     print!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod collect;
pub mod config;
pub mod fetch;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod zip;

pub use cli::Cli;
pub use collect::AssetExtensions;
pub use config::Settings;
pub use fetch::{Backend, Fetch, FetchError, RetryPolicy};
pub use pipeline::{Pipeline, PipelineError, RunSummary, SourceOutcome};
pub use registry::{Source, SourceRegistry};
pub use zip::{ArchiveExtractor, ExtractError};
