use anyhow::{Context, Result};
use clap::Parser;
use sstable_inspect::{report, scan};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(about = "Dump the content of an sstable summary file")]
struct Args {
    /// Summary file to parse.
    summary_file: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let summary = scan::read_summary_file(&args.summary_file)
        .with_context(|| format!("failed to read {}", args.summary_file.display()))?;

    report::dump_summary(&mut io::stdout().lock(), &summary)?;

    Ok(())
}
