//! File converter
//!
//! Drives the tokenizer, signal database and message decoder over a capture
//! file line by line. Decoded rows go to a headerless `timestamp,signal,value`
//! CSV; lines that cannot be tokenized, matched or decoded are copied verbatim
//! to a `.skipped.txt` side file, which only exists when something was skipped.

use crate::config::DecoderConfig;
use crate::decoder::Decoder;
use crate::formats::{CaptureLine, CaptureLines};
use crate::types::{DecoderError, RejectReason, Result, SignalRow};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Per-file line counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineStats {
    /// Lines read from the capture file
    pub lines: usize,
    /// Lines decoded into at least zero rows without error
    pub decoded_lines: usize,
    /// Rows written to the decoded CSV
    pub rows: usize,
    pub malformed: usize,
    pub unknown_id: usize,
    pub decode_failed: usize,
}

impl LineStats {
    /// Total number of rejected lines
    pub fn rejected(&self) -> usize {
        self.malformed + self.unknown_id + self.decode_failed
    }

    fn record_reject(&mut self, reason: &RejectReason) {
        match reason {
            RejectReason::Malformed(_) => self.malformed += 1,
            RejectReason::UnknownMessage(_) => self.unknown_id += 1,
            RejectReason::Decode(_) => self.decode_failed += 1,
        }
    }

    /// Add another file's counters to this one
    pub fn merge(&mut self, other: &LineStats) {
        self.lines += other.lines;
        self.decoded_lines += other.decoded_lines;
        self.rows += other.rows;
        self.malformed += other.malformed;
        self.unknown_id += other.unknown_id;
        self.decode_failed += other.decode_failed;
    }
}

/// In-memory result of converting one capture stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionResult {
    /// Decoded rows, in line order
    pub rows: Vec<SignalRow>,
    /// Rejected lines, byte for byte, in line order
    pub rejected: Vec<Vec<u8>>,
    pub stats: LineStats,
}

impl ConversionResult {
    /// True if at least one line was diverted
    pub fn any_rejected(&self) -> bool {
        !self.rejected.is_empty()
    }
}

/// Outcome of converting one capture file to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    /// Decoded rows CSV
    pub rows_path: PathBuf,
    /// Skip file, present only if lines were rejected
    pub skipped_path: Option<PathBuf>,
    pub stats: LineStats,
}

/// Extension of the side file holding rejected lines
pub const SKIPPED_EXTENSION: &str = "skipped.txt";

/// Where a capture file's outputs go
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// Root the input paths are made relative to
    pub input_root: PathBuf,
    pub output_dir: PathBuf,
    /// Mirror sub-directories below `input_root`
    pub keep_structure: bool,
}

impl OutputLayout {
    pub fn new(input_root: impl Into<PathBuf>, config: &DecoderConfig) -> Self {
        Self {
            input_root: input_root.into(),
            output_dir: config.output_dir.clone(),
            keep_structure: config.keep_structure,
        }
    }

    /// Output paths for an input file: `(rows.csv, rows.skipped.txt)`
    pub fn output_paths(&self, input: &Path) -> Result<(PathBuf, PathBuf)> {
        let relative = if self.keep_structure {
            input.strip_prefix(&self.input_root).unwrap_or(input)
        } else {
            Path::new(input.file_name().ok_or_else(|| {
                DecoderError::InvalidPath(format!("{:?} has no file name", input))
            })?)
        };
        if relative.file_name().is_none() {
            return Err(DecoderError::InvalidPath(format!(
                "{:?} has no file name",
                input
            )));
        }

        let base = self.output_dir.join(relative);
        Ok((base.with_extension("csv"), base.with_extension(SKIPPED_EXTENSION)))
    }
}

/// Receives the outcome of each capture line
trait LineSink {
    fn rows(&mut self, rows: Vec<SignalRow>) -> Result<()>;
    fn reject(&mut self, line: CaptureLine) -> Result<()>;
}

impl LineSink for ConversionResult {
    fn rows(&mut self, rows: Vec<SignalRow>) -> Result<()> {
        self.rows.extend(rows);
        Ok(())
    }

    fn reject(&mut self, line: CaptureLine) -> Result<()> {
        self.rejected.push(line.into_bytes());
        Ok(())
    }
}

/// Streams rows and rejects into temporary files next to their final paths
struct FileSink {
    rows_out: csv::Writer<BufWriter<File>>,
    rows_part: PathBuf,
    skipped_out: Option<BufWriter<File>>,
    skipped_part: PathBuf,
}

impl FileSink {
    fn create(rows_path: &Path, skipped_path: &Path) -> Result<Self> {
        let rows_part = part_path(rows_path);
        let rows_out = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(File::create(&rows_part)?));
        Ok(Self {
            rows_out,
            rows_part,
            skipped_out: None,
            skipped_part: part_path(skipped_path),
        })
    }

    /// Flush and move the outputs into place; returns whether a skip file was written
    fn commit(mut self, rows_path: &Path, skipped_path: &Path) -> Result<bool> {
        self.rows_out.flush()?;
        drop(self.rows_out);
        fs::rename(&self.rows_part, rows_path)?;

        match self.skipped_out.take() {
            Some(mut out) => {
                out.flush()?;
                drop(out);
                fs::rename(&self.skipped_part, skipped_path)?;
                Ok(true)
            }
            None => {
                // Leftover from an earlier run with rejects
                if skipped_path.exists() {
                    fs::remove_file(skipped_path)?;
                }
                Ok(false)
            }
        }
    }

    /// Remove the temporary files of a failed conversion
    fn discard(self) {
        let Self {
            rows_out,
            rows_part,
            skipped_out,
            skipped_part,
        } = self;
        drop(rows_out);
        let _ = fs::remove_file(&rows_part);
        if skipped_out.is_some() {
            drop(skipped_out);
            let _ = fs::remove_file(&skipped_part);
        }
    }
}

impl LineSink for FileSink {
    fn rows(&mut self, rows: Vec<SignalRow>) -> Result<()> {
        for row in &rows {
            self.rows_out.write_record([
                row.timestamp.to_string(),
                row.signal.clone(),
                row.value.to_string(),
            ])?;
        }
        Ok(())
    }

    fn reject(&mut self, line: CaptureLine) -> Result<()> {
        if self.skipped_out.is_none() {
            self.skipped_out = Some(BufWriter::new(File::create(&self.skipped_part)?));
        }
        if let Some(out) = self.skipped_out.as_mut() {
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Converts capture files using a shared [`Decoder`]
pub struct FileConverter<'a> {
    decoder: &'a Decoder,
}

impl<'a> FileConverter<'a> {
    pub fn new(decoder: &'a Decoder) -> Self {
        Self { decoder }
    }

    /// Convert a capture stream in memory
    pub fn convert_reader<R: BufRead>(&self, reader: R) -> Result<ConversionResult> {
        let mut result = ConversionResult::default();
        let stats = self.drive(reader, &mut result)?;
        result.stats = stats;
        Ok(result)
    }

    /// Convert one capture file, streaming rows and rejects to disk
    ///
    /// Outputs are written under temporary names and only moved into place
    /// once the whole input has been read, so a failed file leaves no
    /// partial CSV behind. An unreadable input or unwritable output fails
    /// this file only.
    pub fn convert_file(&self, input: &Path, layout: &OutputLayout) -> Result<FileReport> {
        log::info!("Parsing file: {:?}", input);

        let reader = BufReader::new(File::open(input)?);
        let (rows_path, skipped_path) = layout.output_paths(input)?;
        if let Some(parent) = rows_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut sink = FileSink::create(&rows_path, &skipped_path)?;
        let stats = match self.drive(reader, &mut sink) {
            Ok(stats) => stats,
            Err(e) => {
                sink.discard();
                return Err(e);
            }
        };
        let skipped_path = sink
            .commit(&rows_path, &skipped_path)?
            .then_some(skipped_path);

        log::info!(
            "Converted {:?}: {} rows, {} of {} lines skipped",
            input,
            stats.rows,
            stats.rejected(),
            stats.lines
        );

        Ok(FileReport {
            input: input.to_path_buf(),
            rows_path,
            skipped_path,
            stats,
        })
    }

    /// Decode every line of `reader`, handing rows and rejects to `sink`
    fn drive<R: BufRead, S: LineSink>(&self, reader: R, sink: &mut S) -> Result<LineStats> {
        let mut stats = LineStats::default();

        for line in CaptureLines::new(reader) {
            let line = line?;
            stats.lines += 1;
            let decoded = self.decoder.decode_line(&line.text());
            match decoded {
                Ok(rows) => {
                    stats.decoded_lines += 1;
                    stats.rows += rows.len();
                    sink.rows(rows)?;
                }
                Err(reason) => {
                    log_reject(&line, &reason);
                    stats.record_reject(&reason);
                    sink.reject(line)?;
                }
            }
        }

        Ok(stats)
    }
}

fn log_reject(line: &CaptureLine, reason: &RejectReason) {
    match reason {
        RejectReason::UnknownMessage(_) => log::trace!("Skipping line {:?}: {}", line.text(), reason),
        _ => log::debug!("Skipping line {:?}: {}", line.text(), reason),
    }
}
