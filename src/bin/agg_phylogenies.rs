use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use phylo_agg::io::{TimeExtractor, discover_snapshots, read_snapshot, write_tables};
use phylo_agg::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(about = "Aggregate phylogeny snapshots into edge and size tables")]
struct Args {
    /// Glob pattern matching the snapshot CSV files
    pattern: String,
    /// Minimum population size to include
    #[arg(long, default_value_t = 500, allow_negative_numbers = true)]
    cutoff: i64,
    /// Regular expression that extracts the time step from a file name.
    /// Only the final path component is searched, not the directories.
    #[arg(long = "time_regex", visible_alias = "time-regex", default_value = "[0-9]+")]
    time_regex: String,
    /// String to start output file names with
    #[arg(
        long = "output_file_root",
        visible_alias = "output-file-root",
        default_value = "all_phylogeny"
    )]
    output_file_root: String,
}

// ── Main ─────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let params = Parameters {
        cutoff: args.cutoff,
        time_regex: args.time_regex,
        output_file_root: args.output_file_root,
    };
    info!("{:?}", params);

    // Reject a bad cutoff before touching the file system.
    Cutoff::new(params.cutoff)?;
    let extractor = TimeExtractor::new(&params.time_regex)?;
    let paths = discover_snapshots(&args.pattern)?;

    let bar = ProgressBar::new(paths.len() as u64);
    let mut batches = Vec::with_capacity(paths.len());
    for path in &paths {
        let time = extractor.extract(path)?;
        batches.push(read_snapshot(path, time)?);
        bar.inc(1);
    }
    bar.finish();

    let (tables, _report) = aggregate(&batches, &params)?;
    let (edges, sizes) = write_tables(&tables, &params.output_file_root)?;
    info!(edges = %edges.display(), sizes = %sizes.display(), "wrote tables");
    Ok(())
}
