//! Conversion report printing
//!
//! Human-readable summary on stdout, or the whole report as JSON with `--json`.

use anyhow::Result;
use can_capture_decoder::{BatchReport, FileReport, LineStats};
use std::io::Write;

/// Print a single file's report
pub fn print_file_report<W: Write>(out: &mut W, report: &FileReport, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Generated {}", report.rows_path.display())?;
    if let Some(skipped) = &report.skipped_path {
        writeln!(out, "Skipped lines in {}", skipped.display())?;
    }
    write_stats(out, &report.stats)
}

/// Print a folder conversion report
pub fn print_batch_report<W: Write>(out: &mut W, report: &BatchReport, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }

    for path in report.output_paths() {
        writeln!(out, "Generated {}", path.display())?;
    }
    if !report.failed.is_empty() {
        writeln!(out, "\nFailed files:")?;
        for failure in &report.failed {
            writeln!(out, "  {}: {}", failure.path.display(), failure.error)?;
        }
    }
    if !report.cancelled.is_empty() {
        writeln!(out, "\nCancelled: {} files not started", report.cancelled.len())?;
    }

    writeln!(
        out,
        "\nFiles: {} converted, {} failed",
        report.succeeded.len(),
        report.failed.len()
    )?;
    write_stats(out, &report.totals())
}

fn write_stats<W: Write>(out: &mut W, stats: &LineStats) -> Result<()> {
    writeln!(
        out,
        "Lines: {} read, {} decoded, {} skipped (malformed {}, unknown ID {}, decode error {})",
        stats.lines,
        stats.decoded_lines,
        stats.rejected(),
        stats.malformed,
        stats.unknown_id,
        stats.decode_failed
    )?;
    writeln!(out, "Rows:  {}", stats.rows)?;
    Ok(())
}
