use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use listening::lastfm::LastfmClient;
use listening::sync::{self, SyncOptions};
use listening::tabular::{self, HeaderMatching, ParseOptions};
use listening::{import, store, utils, Config};

/// Load listening history into the store, from a csv export or from last.fm
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV export to import. Without one, recent plays are synced from last.fm
    csv_path: Option<PathBuf>,

    /// Ignore the stored high-water mark and walk the whole page budget
    #[arg(long)]
    full: bool,

    /// Maximum pages to fetch this run
    #[arg(long, env = "SYNC_MAX_PAGES")]
    max_pages: Option<u32>,

    /// CSV field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Only accept `uts`, `utc_time`, or `*time*` as the timestamp header
    #[arg(long)]
    strict_columns: bool,

    /// Print a standalone SQL script for the CSV instead of writing to the store
    #[arg(long, requires = "csv_path")]
    sql: bool,

    /// Print the schema DDL and exit
    #[arg(long)]
    print_schema: bool,
}

fn read_rows(args: &Args, path: &Path) -> anyhow::Result<Vec<tabular::CsvRow>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    let opts = ParseOptions {
        delimiter: args.delimiter,
        matching: if args.strict_columns {
            HeaderMatching::Strict
        } else {
            HeaderMatching::Loose
        },
    };
    Ok(tabular::parse(&content, &opts)?)
}

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if args.print_schema {
        print!("{}", store::SCHEMA);
        return Ok(());
    }

    if args.sql {
        if let Some(path) = &args.csv_path {
            let rows = read_rows(&args, path)?;
            print!("{}", import::sql_dump(&rows, utils::now_seconds()));
            eprintln!("generated sql for {} rows", rows.len());
        }
        return Ok(());
    }

    let config = Config::load()?;
    config.validate(args.csv_path.is_none())?;

    match &args.csv_path {
        Some(path) => {
            // column detection happens before any store i/o
            let rows = read_rows(&args, path)?;
            let store = store::connect(&config.store_target()?).await?;
            let report =
                import::run_import(&*store, &rows, config.sync_stale_after_seconds).await?;
            println!(
                "imported {}: {} rows, {} processed, {} inserted, {} skipped, {} errors ({} artists, {} tracks)",
                path.display(),
                report.rows,
                report.processed,
                report.inserted,
                report.skipped(),
                report.errors,
                report.artists,
                report.tracks,
            );
        }
        None => {
            let source = LastfmClient::from_config(&config)?;
            let store = store::connect(&config.store_target()?).await?;
            let mut opts = SyncOptions::from_config(&config);
            opts.incremental = !args.full;
            if let Some(max_pages) = args.max_pages {
                opts.max_pages = max_pages;
            }
            let report = sync::run_sync(&*store, &source, &opts).await?;
            println!(
                "synced: {} processed, {} inserted, {} skipped, {} errors over {} pages (stopped: {:?})",
                report.processed,
                report.inserted,
                report.processed - report.inserted,
                report.errors,
                report.pages_fetched,
                report.stopped,
            );
        }
    }
    Ok(())
}
