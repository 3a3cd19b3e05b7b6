//! Fetch → extract → collect, one source at a time.
//!
//! Each source gets its own scratch workspace, removed before the next
//! source starts whatever happened. A failing source is recorded in the
//! summary and the run moves on; only backend selection and preparing the
//! output directories can stop a run. A run over local archives alone never
//! selects a backend.

mod summary;
mod workspace;

pub use summary::{RunSummary, SourceOutcome, SourceReport, Stage};
pub use workspace::ScratchWorkspace;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collect::{self, CanonicalDirError};
use crate::config::Settings;
use crate::fetch::{self, Fetch, FetchError, ToolingMissing};
use crate::registry::{Origin, Source, SourceRegistry};
use crate::zip::ArchiveExtractor;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    ToolingMissing(#[from] ToolingMissing),
    #[error(transparent)]
    CanonicalDir(#[from] CanonicalDirError),
    #[error("cannot create scratch directory {}: {source}", path.display())]
    ScratchRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Pipeline {
    settings: Settings,
    /// Injected backend; otherwise one is selected per run from `settings`.
    fetcher: Option<Arc<dyn Fetch>>,
    extractor: ArchiveExtractor,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Self {
        let extractor = ArchiveExtractor::new().with_timeout(settings.extract_timeout);
        Self {
            settings,
            fetcher: None,
            extractor,
        }
    }

    pub fn with_fetcher(settings: Settings, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher: Some(fetcher),
            ..Self::new(settings)
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Process every source in registry order.
    ///
    /// When the registry has remote sources the download backend is selected
    /// first, so [`PipelineError::ToolingMissing`] is returned before the
    /// filesystem is touched.
    pub async fn run(&self, registry: &SourceRegistry) -> Result<RunSummary, PipelineError> {
        let fetcher = match &self.fetcher {
            Some(fetcher) => Some(Arc::clone(fetcher)),
            None if registry.needs_network() => Some(fetch::select_fetcher(
                self.settings.backend,
                &self.settings.tool_locator,
                self.settings.direct_connection,
            )?),
            None => None,
        };

        let canonical_dir = &self.settings.canonical_dir;
        collect::ensure_canonical_dir(canonical_dir)?;
        let scratch_root = &self.settings.scratch_root;
        tokio::fs::create_dir_all(scratch_root)
            .await
            .map_err(|source| PipelineError::ScratchRoot {
                path: scratch_root.clone(),
                source,
            })?;

        info!(
            sources = registry.len(),
            output = %canonical_dir.display(),
            "synchronizing presets"
        );

        let mut summary = RunSummary::new(canonical_dir.clone(), self.settings.sample_size);
        for source in registry {
            let report = self.process(source, fetcher.as_deref()).await;
            summary.record(report);
        }

        let (dir, extensions) = (canonical_dir.clone(), self.settings.extensions.clone());
        match blocking(move || collect::inventory(&dir, &extensions)).await {
            Ok(names) => summary.canonical_assets = Some(names.len()),
            Err(e) => warn!(error = %e, "cannot list the presets directory"),
        }

        info!(
            assets = summary.total_assets(),
            failed = summary.failed().count(),
            "run finished"
        );
        Ok(summary)
    }

    async fn process(&self, source: &Source, fetcher: Option<&dyn Fetch>) -> SourceReport {
        let mut progress = Progress::new(source.id());

        let workspace = match ScratchWorkspace::create(&self.settings.scratch_root, source.id()) {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(source = source.id(), error = %e, "cannot create scratch workspace");
                return progress.finish(SourceOutcome::WorkspaceFailed(e));
            }
        };
        debug!(source = source.id(), path = %workspace.path().display(), "created workspace");

        let outcome = self
            .process_in(source, fetcher, &workspace, &mut progress)
            .await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %workspace_path.display(), error = %e, "failed to remove scratch workspace");
        }

        if outcome.is_success()
            && !self.settings.keep_local_archives
            && let Origin::Local(archive) = source.origin()
        {
            move_to_processed(archive);
        }

        progress.finish(outcome)
    }

    async fn process_in(
        &self,
        source: &Source,
        fetcher: Option<&dyn Fetch>,
        workspace: &ScratchWorkspace,
        progress: &mut Progress,
    ) -> SourceOutcome {
        let archive = match source.origin() {
            Origin::Remote(url) => {
                progress.advance(Stage::Fetching);
                let Some(fetcher) = fetcher else {
                    progress.advance(Stage::FetchFailed);
                    warn!(source = source.id(), "no download backend for remote source");
                    return SourceOutcome::FetchFailed(FetchError::NetworkUnavailable {
                        url: url.clone(),
                        reason: "no download backend selected".to_string(),
                    });
                };
                let dest = workspace.path().join(source.archive_name());
                if let Err(e) = fetch::fetch(fetcher, url, &dest, &self.settings.retry).await {
                    progress.advance(Stage::FetchFailed);
                    warn!(source = source.id(), error = %e, "skipping source");
                    return SourceOutcome::FetchFailed(e);
                }
                dest
            }
            Origin::Local(path) => path.clone(),
        };
        progress.advance(Stage::Fetched);

        progress.advance(Stage::Extracting);
        let extract = match self.extractor.extract(&archive, workspace.tree()).await {
            Ok(stats) => stats,
            Err(e) => {
                progress.advance(Stage::ExtractFailed);
                warn!(source = source.id(), error = %e, "skipping source");
                return SourceOutcome::ExtractFailed(e);
            }
        };
        progress.advance(Stage::Extracted);
        debug!(
            source = source.id(),
            files = extract.files,
            bytes = extract.bytes,
            "extracted archive"
        );

        progress.advance(Stage::Collecting);
        let tree = workspace.tree().to_path_buf();
        let extensions = self.settings.extensions.clone();
        let canonical_dir = self.settings.canonical_dir.clone();
        let collected =
            blocking(move || collect::collect(&tree, &extensions, &canonical_dir)).await;
        let report = match collected {
            Ok(report) => report,
            Err(e) => {
                warn!(source = source.id(), error = %e, "skipping source");
                return SourceOutcome::CollectFailed(e);
            }
        };
        progress.advance(Stage::Done);

        if report.total() == 0 {
            info!(source = source.id(), "no matching assets in archive");
        } else {
            info!(source = source.id(), assets = report.total(), "collected assets");
        }
        SourceOutcome::Collected { extract, report }
    }
}

/// Run synchronous filesystem work on the blocking pool, re-raising panics.
async fn blocking<F, T>(work: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(value) => value,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

/// Tracks one source through its stages.
struct Progress {
    id: String,
    stage: Stage,
}

impl Progress {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            stage: Stage::Pending,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!(source = %self.id, from = ?self.stage, to = ?stage, "stage");
        self.stage = stage;
    }

    fn finish(self, outcome: SourceOutcome) -> SourceReport {
        SourceReport {
            id: self.id,
            stage: self.stage,
            outcome,
        }
    }
}

/// Move a consumed local archive into `processed/` beside it.
fn move_to_processed(archive: &Path) {
    let (Some(dir), Some(name)) = (archive.parent(), archive.file_name()) else {
        return;
    };
    let processed = dir.join("processed");
    let target = processed.join(name);
    let moved = std::fs::create_dir_all(&processed).and_then(|()| std::fs::rename(archive, &target));
    match moved {
        Ok(()) => debug!(from = %archive.display(), to = %target.display(), "archived local source"),
        Err(e) => warn!(archive = %archive.display(), error = %e, "cannot move processed archive"),
    }
}
