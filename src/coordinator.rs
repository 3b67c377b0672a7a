use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::models::Source;
use crate::scrapers::{SiteScraper, UnitOutcome};
use crate::sink::ResultSink;

/// Combined output of a merged run
pub const MERGED_FILE: &str = "dados.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Merging,
    Done,
}

/// What happened to one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSummary {
    pub source: Source,
    pub rows: usize,
    /// Per-site file written by the unit, if any
    pub file: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub units: Vec<UnitSummary>,
    /// Rows in the combined file, `None` when merging was off
    pub merged_rows: Option<usize>,
}

impl RunSummary {
    pub fn all_failed(&self) -> bool {
        !self.units.is_empty() && self.units.iter().all(|u| u.error.is_some())
    }
}

/// Fans the selected sites out to one unit each, then merges their files
pub struct Coordinator {
    config: RunConfig,
    scraper: Arc<dyn SiteScraper>,
    phase: Phase,
}

impl Coordinator {
    pub fn configure(config: RunConfig, scraper: Arc<dyn SiteScraper>) -> Self {
        Self {
            config,
            scraper,
            phase: Phase::Idle,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        info!("Coordinator {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        self.enter(Phase::Running);
        info!(
            "Scraping {} site(s) {} with {}",
            self.config.sites.len(),
            if self.config.parallel { "in parallel" } else { "one at a time" },
            self.scraper.backend_name()
        );

        let units = if self.config.parallel {
            self.run_parallel().await
        } else {
            self.run_sequential().await
        };

        let merged_rows = if self.config.merge {
            self.enter(Phase::Merging);
            Some(self.merge(&units)?)
        } else {
            None
        };

        self.enter(Phase::Done);
        Ok(RunSummary { units, merged_rows })
    }

    async fn run_sequential(&self) -> Vec<UnitSummary> {
        let mut units = Vec::with_capacity(self.config.sites.len());
        for source in &self.config.sites {
            let scraper = Arc::clone(&self.scraper);
            units.push(run_unit(scraper, *source, self.config.output_dir.clone()).await);
        }
        units
    }

    async fn run_parallel(&self) -> Vec<UnitSummary> {
        let handles: Vec<_> = self
            .config
            .sites
            .iter()
            .map(|source| {
                let scraper = Arc::clone(&self.scraper);
                let output_dir = self.config.output_dir.clone();
                (*source, tokio::spawn(run_unit(scraper, *source, output_dir)))
            })
            .collect();

        let mut units = Vec::with_capacity(handles.len());
        for (source, handle) in handles {
            let unit = handle.await.unwrap_or_else(|e| {
                error!("{} unit did not finish: {}", source, e);
                UnitSummary {
                    source,
                    rows: 0,
                    file: None,
                    error: Some(e.to_string()),
                }
            });
            units.push(unit);
        }
        units
    }

    /// Concatenate the per-site files written by `units` into [`MERGED_FILE`].
    ///
    /// Files left over from earlier runs are not picked up.
    fn merge(&self, units: &[UnitSummary]) -> Result<usize> {
        let files: Vec<PathBuf> = units.iter().filter_map(|u| u.file.clone()).collect();
        merge_files(&files, &self.config.output_dir.join(MERGED_FILE))
    }
}

/// Concatenate `files` in order into `merged`, then delete the files that
/// were read. Unreadable files are left out and kept on disk.
fn merge_files(files: &[PathBuf], merged: &Path) -> Result<usize> {
    let mut combined = ResultSink::new();
    let mut consumed = Vec::new();

    for path in files {
        if !path.exists() {
            debug!("No {} to merge", path.display());
            continue;
        }
        match ResultSink::read(path) {
            Ok(sink) => {
                combined.extend(sink.into_records());
                consumed.push(path);
            }
            Err(e) => warn!("Leaving unreadable {} out of the merge: {}", path.display(), e),
        }
    }

    combined
        .flush(merged)
        .with_context(|| format!("Failed to write {}", merged.display()))?;

    for path in &consumed {
        if let Err(e) = fs::remove_file(path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }

    info!(
        "Merged {} rows from {} file(s) into {}",
        combined.len(),
        consumed.len(),
        merged.display()
    );
    Ok(combined.len())
}

async fn run_unit(
    scraper: Arc<dyn SiteScraper>,
    source: Source,
    output_dir: PathBuf,
) -> UnitSummary {
    info!("Starting {}", source);
    let outcome = scraper.scrape(source).await;
    persist(outcome, &output_dir)
}

/// Write a unit's table to its per-site file.
///
/// A unit that aborted before collecting anything writes no file, and an
/// existing file of an earlier run stays as it was.
fn persist(outcome: UnitOutcome, output_dir: &Path) -> UnitSummary {
    let UnitOutcome { source, sink, error } = outcome;
    let mut summary = UnitSummary {
        source,
        rows: sink.len(),
        file: None,
        error: error.as_ref().map(|e| e.to_string()),
    };

    if let Some(e) = &error {
        error!("{} aborted after {} rows: {}", source, sink.len(), e);
        if sink.is_empty() {
            return summary;
        }
    }

    let path = output_dir.join(source.file_name());
    match sink.flush(&path) {
        Ok(()) => {
            info!(
                "Finished {}: {} rows written to {}",
                source,
                sink.len(),
                path.display()
            );
            summary.file = Some(path);
        }
        Err(e) => {
            error!("Could not write {}: {}", path.display(), e);
            if summary.error.is_none() {
                summary.error = Some(e.to_string());
            }
        }
    }
    summary
}
