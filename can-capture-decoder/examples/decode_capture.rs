//! Standalone capture inspection tool
//!
//! Decodes one raw capture file with DBC signal definitions and prints the
//! decoded signals per line plus a summary, without writing any output files.
//!
//! Usage:
//!   decode_capture <CAN_0001.TXT> --dbc <file.dbc> [--dbc <file.dbc>] [--limit <count>] [--verbose]

use can_capture_decoder::formats::{tokenize, CaptureLines};
use can_capture_decoder::{Decoder, RejectReason};
use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

#[derive(Default)]
struct CaptureStats {
    lines: usize,
    decoded_lines: usize,
    rows: usize,
    malformed: usize,
    decode_failed: usize,
    unknown_ids: HashMap<u32, usize>,
    messages: HashMap<String, usize>,
}

impl CaptureStats {
    fn print_summary(&self) {
        println!("\n=== DECODING SUMMARY ===");
        println!("Lines read: {}", self.lines);
        println!("Lines decoded: {}", self.decoded_lines);
        println!("Rows emitted: {}", self.rows);
        println!("Malformed lines: {}", self.malformed);
        println!("Decode failures: {}", self.decode_failed);
        println!(
            "Unknown IDs: {} distinct, {} lines",
            self.unknown_ids.len(),
            self.unknown_ids.values().sum::<usize>()
        );

        if !self.messages.is_empty() {
            println!("\nTop 10 Most Frequent Messages:");
            let mut sorted: Vec<_> = self.messages.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (name, count) in sorted.iter().take(10) {
                println!("  {}: {} times", name, count);
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <capture.TXT> --dbc <file.dbc> [--limit <count>] [--verbose]",
            args[0]
        );
        std::process::exit(1);
    }

    let capture_file = PathBuf::from(&args[1]);
    let mut dbc_files = Vec::new();
    let mut limit: Option<usize> = None;
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--dbc" => {
                i += 1;
                if i < args.len() {
                    dbc_files.push(PathBuf::from(&args[i]));
                }
            }
            "--limit" => {
                i += 1;
                if i < args.len() {
                    limit = Some(args[i].parse()?);
                }
            }
            "--verbose" | "-v" => verbose = true,
            other => eprintln!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let decoder = Decoder::from_dbc_files(&dbc_files)?;
    let db_stats = decoder.database_stats();
    println!("=== SIGNAL DATABASE ===");
    println!("Messages: {}", db_stats.num_messages);
    println!("Signals: {}", db_stats.num_signals);
    println!();

    let reader = BufReader::new(File::open(&capture_file)?);
    let mut stats = CaptureStats::default();

    for line in CaptureLines::new(reader) {
        if limit.is_some_and(|n| stats.lines >= n) {
            break;
        }
        let line = line?;
        let line = line.text();
        stats.lines += 1;

        match decoder.decode_line(&line) {
            Ok(rows) => {
                stats.decoded_lines += 1;
                stats.rows += rows.len();

                let name = tokenize(&line)
                    .ok()
                    .and_then(|frame| decoder.lookup(frame.can_id))
                    .map(|message| message.name.clone())
                    .unwrap_or_default();
                if let Some(first) = rows.first() {
                    println!("[{}] {} - {} signals", first.timestamp, name, rows.len());
                }
                if verbose {
                    for row in &rows {
                        println!("    {}: {}", row.signal, row.value);
                    }
                }
                *stats.messages.entry(name).or_insert(0) += 1;
            }
            Err(RejectReason::UnknownMessage(id)) => {
                *stats.unknown_ids.entry(id).or_insert(0) += 1;
            }
            Err(reason @ RejectReason::Malformed(_)) => {
                stats.malformed += 1;
                if verbose {
                    println!("    skipped {:?}: {}", line, reason);
                }
            }
            Err(reason @ RejectReason::Decode(_)) => {
                stats.decode_failed += 1;
                if verbose {
                    println!("    skipped {:?}: {}", line, reason);
                }
            }
        }
    }

    stats.print_summary();
    Ok(())
}
