use anyhow::Context;
use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;
use tnsflow_lib::capture::read_capture;
use tnsflow_lib::{AnalysisSession, Report, SessionConfig};
use tracing::{info, warn};

/// Find the top SQL statements in a database packet capture, from the
/// application's point of view.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the pcap/pcapng file to analyze
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Database server IP; several can be separated by the literal
    /// token "or", e.g. "10.0.0.5 or 10.0.0.6"
    #[arg(short = 'i', long = "db-ip")]
    db_ip: String,

    /// Database listener port
    #[arg(short = 'p', long = "db-port")]
    db_port: u16,

    /// Stop ingesting after this many unclassified frames and report
    /// over what was gathered so far
    #[arg(long)]
    failure_limit: Option<u64>,

    /// Emit the report as JSON instead of a text table
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    verbosity: Verbosity<WarnLevel>,
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.verbosity.tracing_level_filter())
        .init();

    let db_ips = SessionConfig::parse_db_ips(&args.db_ip)?;
    let read = read_capture(&args.file, &db_ips, args.db_port)
        .with_context(|| format!("failed to read capture {}", args.file.display()))?;
    info!(frames = read.frames.len(), malformed = read.malformed_frames, "capture loaded");

    let mut session = AnalysisSession::new(SessionConfig {
        db_ips,
        db_port: args.db_port,
        classification_failure_limit: args.failure_limit,
    });
    if let Err(err) = session.ingest_all(&read) {
        // partial statistics are still worth reporting
        warn!("{err}");
    }
    session.analyze();

    let report = Report::build(&session);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}
