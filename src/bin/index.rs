use anyhow::{Context, Result};
use clap::Parser;
use sstable_inspect::report::{ReportKind, REPORT_EVERYTHING};
use sstable_inspect::scan::{self, ScanOptions, Scanned};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(about = "Dump the partitions of sstable index files")]
struct Args {
    /// Index files to parse.
    #[clap(required = true)]
    index_file: Vec<PathBuf>,

    /// Print one line per partition instead of the full output.
    #[clap(long, conflicts_with = "quiet")]
    summary: bool,

    /// Print nothing but the count of partitions, logged at info level.
    #[clap(short, long)]
    quiet: bool,

    /// Report on partitions this size or larger.
    #[clap(long, default_value_t = REPORT_EVERYTHING, allow_negative_numbers = true)]
    partition_size_threshold: i64,

    /// Ignore missing files (useful when running on live data that can be compacted).
    #[clap(long)]
    ignore_missing: bool,
}

impl Args {
    fn report_kind(&self) -> ReportKind {
        if self.quiet {
            ReportKind::Null
        } else if self.summary {
            ReportKind::Summary
        } else {
            ReportKind::Full
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let options = ScanOptions {
        threshold: args.partition_size_threshold,
        ignore_missing: args.ignore_missing,
    };

    let kind = args.report_kind();
    info!(%kind, threshold = options.threshold, "scanning {} files", args.index_file.len());

    let stdout = io::stdout();
    let mut report = kind.build(stdout.lock());

    for path in &args.index_file {
        match scan::scan_index_file(path, &options, report.as_mut())
            .with_context(|| format!("failed to scan {}", path.display()))?
        {
            Scanned::Partitions(partitions) => {
                info!(path = %path.display(), partitions, "done");
            }
            Scanned::Missing => println!("File {} missing, possible compacted", path.display()),
        }
    }

    Ok(())
}
