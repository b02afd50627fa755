//! Folder orchestrator
//!
//! Discovers capture files under a directory tree and converts them on a
//! bounded thread pool. The [`Decoder`] is shared by reference; it is never
//! mutated after loading. One file failing never stops the others.

use crate::config::DecoderConfig;
use crate::converter::{FileConverter, FileReport, LineStats, OutputLayout, SKIPPED_EXTENSION};
use crate::decoder::Decoder;
use crate::types::{DecoderError, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// Shared flag that stops a batch from starting new files
///
/// Files already being converted run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A file whose conversion failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a folder conversion
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<FileReport>,
    pub failed: Vec<FileFailure>,
    /// Files never started because the batch was cancelled
    pub cancelled: Vec<PathBuf>,
}

impl BatchReport {
    /// Decoded CSV paths of all successful files, sorted
    pub fn output_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.succeeded.iter().map(|r| r.rows_path.clone()).collect();
        paths.sort();
        paths
    }

    /// Line counters summed over all successful files
    pub fn totals(&self) -> LineStats {
        let mut totals = LineStats::default();
        for report in &self.succeeded {
            totals.merge(&report.stats);
        }
        totals
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

enum FileOutcome {
    Done(FileReport),
    Failed(FileFailure),
    Cancelled(PathBuf),
}

/// Find every capture file below `root`, sorted
///
/// Symlinks are listed without being followed so that a dangling link shows
/// up as a per-file failure instead of silently disappearing. The configured
/// output directory is not descended into, and skip files from earlier runs
/// are never picked up as captures.
pub fn discover_files(root: &Path, config: &DecoderConfig) -> Result<Vec<PathBuf>> {
    // Absent until the first run creates it
    let output_dir = config.output_dir.canonicalize().ok();
    let files = walk_files(root, output_dir.as_deref(), |path| {
        config.is_capture_file(path) && !is_skip_file(path)
    })?;
    Ok(files)
}

/// Find every decoded `.csv` file below `root`, sorted
pub fn find_decoded_files(root: &Path) -> Result<Vec<PathBuf>> {
    let csv = DecoderConfig::new().with_extensions(["csv"]);
    walk_files(root, None, |path| csv.is_capture_file(path))
}

fn walk_files<F>(root: &Path, exclude_dir: Option<&Path>, mut wanted: F) -> Result<Vec<PathBuf>>
where
    F: FnMut(&Path) -> bool,
{
    if !root.is_dir() {
        return Err(DecoderError::InvalidPath(format!(
            "{:?} is not a directory",
            root
        )));
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let excluded = entry.depth() > 0
            && entry.file_type().is_dir()
            && exclude_dir.is_some()
            && entry.path().canonicalize().ok().as_deref() == exclude_dir;
        !excluded
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };
        let file_type = entry.file_type();
        if (file_type.is_file() || file_type.is_symlink()) && wanted(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

fn is_skip_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let suffix = format!(".{}", SKIPPED_EXTENSION);
            name.len() > suffix.len()
                && name
                    .get(name.len() - suffix.len()..)
                    .is_some_and(|tail| tail.eq_ignore_ascii_case(&suffix))
        })
        .unwrap_or(false)
}

/// Converts whole folders of capture files in parallel
pub struct BatchConverter<'a> {
    decoder: &'a Decoder,
    config: DecoderConfig,
    cancel: CancelToken,
}

impl<'a> BatchConverter<'a> {
    pub fn new(decoder: &'a Decoder, config: DecoderConfig) -> Self {
        Self {
            decoder,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Builder method: use an externally controlled cancel token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Convert every capture file below `root`
    ///
    /// Returns an error only if the folder cannot be listed or the worker
    /// pool cannot start. Per-file failures are collected in the report.
    pub fn convert_folder(&self, root: &Path) -> Result<BatchReport> {
        let files = discover_files(root, &self.config)?;
        log::info!("Number of files: {} under {:?}", files.len(), root);
        self.convert_files(root, &files)
    }

    /// Convert an explicit list of files, relative to `root` for output paths
    pub fn convert_files(&self, root: &Path, files: &[PathBuf]) -> Result<BatchReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .build()
            .map_err(|e| DecoderError::WorkerPool(e.to_string()))?;

        let layout = OutputLayout::new(root, &self.config);
        let converter = FileConverter::new(self.decoder);
        let mut report = BatchReport::default();

        // Two inputs writing the same output would overwrite each other
        let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
        let mut queue = Vec::with_capacity(files.len());
        for path in files {
            match layout.output_paths(path) {
                Ok((rows_path, _)) => match claimed.get(&rows_path) {
                    Some(first) => {
                        log::error!(
                            "Not converting {:?}: output {:?} already claimed by {:?}",
                            path,
                            rows_path,
                            first
                        );
                        report.failed.push(FileFailure {
                            path: path.clone(),
                            error: format!(
                                "output {:?} collides with the output of {:?}",
                                rows_path, first
                            ),
                        });
                    }
                    None => {
                        claimed.insert(rows_path, path);
                        queue.push(path);
                    }
                },
                Err(e) => report.failed.push(FileFailure {
                    path: path.clone(),
                    error: e.to_string(),
                }),
            }
        }

        let outcomes: Vec<FileOutcome> = pool.install(|| {
            queue
                .par_iter()
                .map(|&path| {
                    if self.cancel.is_cancelled() {
                        return FileOutcome::Cancelled(path.clone());
                    }
                    match converter.convert_file(path, &layout) {
                        Ok(report) => FileOutcome::Done(report),
                        Err(e) => {
                            log::error!("Failed to convert {:?}: {}", path, e);
                            FileOutcome::Failed(FileFailure {
                                path: path.clone(),
                                error: e.to_string(),
                            })
                        }
                    }
                })
                .collect()
        });

        for outcome in outcomes {
            match outcome {
                FileOutcome::Done(file) => report.succeeded.push(file),
                FileOutcome::Failed(failure) => report.failed.push(failure),
                FileOutcome::Cancelled(path) => report.cancelled.push(path),
            }
        }
        report.failed.sort_by(|a, b| a.path.cmp(&b.path));

        let totals = report.totals();
        log::info!(
            "Batch finished: {} converted, {} failed, {} cancelled; {} rows, {} of {} lines skipped",
            report.succeeded.len(),
            report.failed.len(),
            report.cancelled.len(),
            totals.rows,
            totals.rejected(),
            totals.lines
        );

        Ok(report)
    }
}
