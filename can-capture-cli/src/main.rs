//! CAN Capture CLI Application
//!
//! Command-line front end for the can-capture-decoder library:
//! - Convert a single capture file or a whole folder tree
//! - Print a conversion report (text or JSON)
//! - Serve the latest decoded snapshot over HTTP

use anyhow::{bail, Context, Result};
use can_capture_decoder::{
    find_decoded_files, parse_csv, to_csv_bytes, BatchConverter, Decoder, FileConverter,
    OutputLayout, SignalRow,
};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod config;
mod report;
mod server;

use config::AppConfig;
use server::SnapshotStore;

/// CAN Capture - Decode raw CAN capture logs into signal CSVs
#[derive(Parser, Debug)]
#[command(name = "can-capture")]
#[command(about = "Decode raw CAN capture logs using DBC signal definitions", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output directory for decoded files (default: parsed_files)
    #[arg(short, long, value_name = "DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// Print the conversion report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a single capture file
    Convert {
        /// Capture file to decode
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Path to DBC file(s) (can be repeated)
        #[arg(long, value_name = "FILE")]
        dbc: Vec<PathBuf>,
    },

    /// Decode every capture file below a folder
    ConvertFolder {
        /// Root folder of the capture tree
        #[arg(value_name = "DIR")]
        dir: PathBuf,

        /// Path to DBC file(s) (can be repeated)
        #[arg(long, value_name = "FILE")]
        dbc: Vec<PathBuf>,

        /// Number of worker threads (0 = one per CPU core)
        #[arg(short, long, value_name = "N")]
        jobs: Option<usize>,

        /// Write all outputs directly into the output directory
        #[arg(long)]
        flat: bool,
    },

    /// Serve decoded CSVs as the latest snapshot
    Serve {
        /// Decoded CSV files or folders containing them
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: 8000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Capture CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", can_capture_decoder::VERSION);

    let mut app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    if let Some(dir) = &args.output_dir {
        app_config.output.output_dir = dir.clone();
    }

    match &args.command {
        Command::Convert { file, dbc } => convert_file(&args, &app_config, file, dbc),
        Command::ConvertFolder {
            dir,
            dbc,
            jobs,
            flat,
        } => {
            if let Some(jobs) = jobs {
                app_config.workers.jobs = *jobs;
            }
            if *flat {
                app_config.output.keep_structure = false;
            }
            convert_folder(&args, &app_config, dir, dbc)
        }
        Command::Serve { paths, host, port } => {
            if let Some(host) = host {
                app_config.server.host = host.clone();
            }
            if let Some(port) = port {
                app_config.server.port = *port;
            }
            serve(&app_config, paths)
        }
    }
}

/// Load the signal database; DBCs given on the command line replace the configured ones
fn load_decoder(app_config: &AppConfig, dbc: &[PathBuf]) -> Result<Decoder> {
    let dbc_files = if dbc.is_empty() {
        app_config.input.dbc_files.as_slice()
    } else {
        dbc
    };
    if dbc_files.is_empty() {
        bail!("No DBC file given (use --dbc or [input] dbc_files)");
    }

    let decoder = Decoder::from_dbc_files(dbc_files).context("Failed to load signal database")?;
    let stats = decoder.database_stats();
    log::info!(
        "Signal database: {} messages, {} signals",
        stats.num_messages,
        stats.num_signals
    );
    Ok(decoder)
}

fn convert_file(args: &Args, app_config: &AppConfig, file: &Path, dbc: &[PathBuf]) -> Result<()> {
    let decoder = load_decoder(app_config, dbc)?;
    let config = app_config.decoder_config();

    let input_root = file.parent().unwrap_or_else(|| Path::new(""));
    let layout = OutputLayout::new(input_root, &config);
    let file_report = FileConverter::new(&decoder)
        .convert_file(file, &layout)
        .with_context(|| format!("Failed to convert {:?}", file))?;

    if !args.quiet || args.json {
        report::print_file_report(&mut io::stdout().lock(), &file_report, args.json)?;
    }
    Ok(())
}

fn convert_folder(args: &Args, app_config: &AppConfig, dir: &Path, dbc: &[PathBuf]) -> Result<()> {
    let decoder = load_decoder(app_config, dbc)?;
    let config = app_config.decoder_config();

    let batch_report = BatchConverter::new(&decoder, config)
        .convert_folder(dir)
        .with_context(|| format!("Failed to convert folder {:?}", dir))?;

    if !args.quiet || args.json {
        report::print_batch_report(&mut io::stdout().lock(), &batch_report, args.json)?;
    }
    Ok(())
}

fn serve(app_config: &AppConfig, paths: &[PathBuf]) -> Result<()> {
    let rows = load_snapshot_rows(paths)?;
    let store = Arc::new(SnapshotStore::new());
    store.replace(to_csv_bytes(&rows).context("Failed to serialize snapshot")?);

    let addr = app_config.server.socket_addr()?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(server::serve(addr, store))
}

/// Read every decoded CSV under `paths` into one row list
///
/// Files that are empty or fail to parse are logged and left out.
fn load_snapshot_rows(paths: &[PathBuf]) -> Result<Vec<SignalRow>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(find_decoded_files(path)?);
        } else {
            files.push(path.clone());
        }
    }

    let mut rows = Vec::new();
    let mut loaded = 0;
    for file in &files {
        match parse_csv(file) {
            Ok(Some(parsed)) => {
                loaded += 1;
                rows.extend(parsed);
            }
            Ok(None) => log::warn!("No rows in {:?}", file),
            // One broken file must not keep the others from being served
            Err(e) => log::warn!("Skipping {:?}: {}", file, e),
        }
    }

    log::info!("Loaded {} rows from {} of {} files", rows.len(), loaded, files.len());
    Ok(rows)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
