//! Decoder configuration types
//!
//! This module defines the configuration shared by the file converter and the
//! folder orchestrator. Decoding itself needs no configuration beyond the
//! signal database; everything here concerns where output goes and how much
//! parallelism a batch uses.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for file and folder conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Directory receiving the decoded CSV and skip files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Capture file extensions to pick up (case-insensitive, without dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Number of worker threads for folder conversion (0 = one per core)
    #[serde(default)]
    pub jobs: usize,

    /// Mirror the input sub-directory structure in the output directory
    #[serde(default = "default_true")]
    pub keep_structure: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("parsed_files")
}

fn default_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            extensions: default_extensions(),
            jobs: 0,
            keep_structure: true,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder method: replace the capture file extensions
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method: set the worker count
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Builder method: flatten or mirror input sub-directories
    pub fn with_keep_structure(mut self, keep: bool) -> Self {
        self.keep_structure = keep;
        self
    }

    /// Check if a path has one of the configured capture extensions
    pub fn is_capture_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}
