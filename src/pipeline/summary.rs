use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::collect::{CanonicalDirError, CollectReport};
use crate::fetch::FetchError;
use crate::zip::{ExtractError, ExtractStats};

/// Per-source progress. `FetchFailed`, `ExtractFailed` and `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Fetching,
    Fetched,
    FetchFailed,
    Extracting,
    Extracted,
    ExtractFailed,
    Collecting,
    Done,
}

#[derive(Debug)]
pub enum SourceOutcome {
    Collected {
        extract: ExtractStats,
        report: CollectReport,
    },
    /// The scratch workspace could not be created.
    WorkspaceFailed(std::io::Error),
    FetchFailed(FetchError),
    ExtractFailed(ExtractError),
    /// The canonical directory vanished and could not be recreated.
    CollectFailed(CanonicalDirError),
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceOutcome::Collected { .. })
    }

    /// Short failure label for the summary, `None` on success.
    pub fn failure_kind(&self) -> Option<String> {
        match self {
            SourceOutcome::Collected { .. } => None,
            SourceOutcome::WorkspaceFailed(_) => Some("workspace error".to_string()),
            SourceOutcome::FetchFailed(e) => Some(format!("fetch failed: {}", e.kind())),
            SourceOutcome::ExtractFailed(e) => Some(match e.kind() {
                crate::zip::ExtractErrorKind::CorruptArchive => "corrupt archive".to_string(),
                crate::zip::ExtractErrorKind::Io => "extract failed: i/o error".to_string(),
            }),
            SourceOutcome::CollectFailed(_) => Some("collect failed".to_string()),
        }
    }
}

#[derive(Debug)]
pub struct SourceReport {
    pub id: String,
    /// Last stage reached.
    pub stage: Stage,
    pub outcome: SourceOutcome,
}

/// Result of one pipeline run, sources in registry order.
#[derive(Debug)]
pub struct RunSummary {
    pub canonical_dir: PathBuf,
    pub sources: Vec<SourceReport>,
    /// Copies per extension across all sources, not deduplicated by name.
    pub counts: BTreeMap<String, usize>,
    pub collection_failures: usize,
    /// Accepted assets present in the canonical directory after the run.
    pub canonical_assets: Option<usize>,
    /// Distinct file names written this run, in first-seen order.
    collected: Vec<String>,
    seen: HashSet<String>,
    sample_size: usize,
}

impl RunSummary {
    pub fn new(canonical_dir: PathBuf, sample_size: usize) -> Self {
        Self {
            canonical_dir,
            sources: Vec::new(),
            counts: BTreeMap::new(),
            collection_failures: 0,
            canonical_assets: None,
            collected: Vec::new(),
            seen: HashSet::new(),
            sample_size,
        }
    }

    pub fn record(&mut self, report: SourceReport) {
        if let SourceOutcome::Collected { report: collected, .. } = &report.outcome {
            for (ext, count) in &collected.counts {
                *self.counts.entry(ext.clone()).or_default() += count;
            }
            for name in &collected.collected {
                if self.seen.insert(name.clone()) {
                    self.collected.push(name.clone());
                }
            }
            self.collection_failures += collected.failures.len();
        }
        self.sources.push(report);
    }

    /// Distinct asset file names written during the run.
    pub fn total_assets(&self) -> usize {
        self.collected.len()
    }

    /// Every copy made, overwrites included.
    pub fn total_copies(&self) -> usize {
        self.counts.values().sum()
    }

    /// Up to the configured number of collected file names.
    pub fn sample(&self) -> &[String] {
        &self.collected[..self.collected.len().min(self.sample_size)]
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| !s.outcome.is_success())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Presets directory: {}", self.canonical_dir.display())?;

        for source in &self.sources {
            match &source.outcome {
                SourceOutcome::Collected { report, .. } => {
                    write!(f, "  ok    {}: {} assets", source.id, report.total())?;
                    if !report.failures.is_empty() {
                        write!(f, ", {} files failed", report.failures.len())?;
                    }
                    writeln!(f)?;
                }
                outcome => {
                    let kind = outcome.failure_kind().unwrap_or_default();
                    writeln!(f, "  fail  {}: {kind}", source.id)?;
                }
            }
        }

        let succeeded = self.succeeded().count();
        if self.total_assets() == 0 {
            if succeeded == 0 && !self.sources.is_empty() {
                writeln!(
                    f,
                    "No assets collected: all {} sources failed",
                    self.sources.len()
                )?;
            } else {
                writeln!(
                    f,
                    "No matching assets were collected (0 assets from {succeeded} of {} sources)",
                    self.sources.len()
                )?;
            }
        } else {
            let by_ext: Vec<String> = self
                .counts
                .iter()
                .map(|(ext, count)| format!("{ext} {count}"))
                .collect();
            writeln!(
                f,
                "Collected {} assets ({}) from {succeeded} of {} sources",
                self.total_assets(),
                by_ext.join(", "),
                self.sources.len()
            )?;
            writeln!(f, "Sample:")?;
            for name in self.sample() {
                writeln!(f, "  - {name}")?;
            }
        }

        if self.collection_failures > 0 {
            writeln!(f, "{} files could not be collected", self.collection_failures)?;
        }
        if let Some(total) = self.canonical_assets {
            writeln!(f, "Presets directory now holds {total} assets")?;
        }
        Ok(())
    }
}
