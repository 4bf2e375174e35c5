use anyhow::{Context, Result, bail};
use chrono::Local;
use gauchogrub::{
    cli::{Cli, Commands, CrawlArgs, DateLabelArgs},
    crawl::{Crawler, Status, UnitReport},
    models::MenuDocument,
    signals,
    util::write_json,
};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[cfg(all(target_env = "musl", target_pointer_width = "64"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // a missing .env is fine, everything can be given as flags or real env vars
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    cli.init_logger()?;

    match &cli.command {
        Commands::Crawl(args) => crawl(args).await,
        Commands::DateLabels(args) => date_labels(args),
    }
}

async fn crawl(args: &CrawlArgs) -> Result<()> {
    let opts = args.opts()?;
    let today = args
        .dates
        .date
        .unwrap_or_else(|| Local::now().date_naive());

    let cancel = CancellationToken::new();
    signals::cancel_on_shutdown(cancel.clone())?;

    let mut crawler = Crawler::with_cancellation(opts, cancel).with_date(today);
    info!(units = args.units.len(), %today, "Starting crawl");
    for unit in &args.units {
        crawler.spawn(unit.clone());
    }
    let reports = crawler.join().await;

    let documents: Vec<&MenuDocument> = reports.iter().filter_map(UnitReport::document).collect();
    let written = match &args.output {
        Some(path) => write_json(create(path)?, &documents, args.pretty),
        None => write_json(io::stdout().lock(), &documents, args.pretty),
    };
    written.context("failed to write menus")?;
    if let Some(path) = &args.report {
        let summary: Vec<_> = reports.iter().map(UnitReport::summary).collect();
        write_json(create(path)?, &summary, true).context("failed to write report")?;
        debug!(path = %path.display(), "Wrote report");
    }

    let count = |s: Status| reports.iter().filter(|r| r.status() == s).count();
    let (completed, failed, cancelled) = (
        count(Status::Completed),
        count(Status::Failed),
        count(Status::Cancelled),
    );
    info!(completed, failed, cancelled, "Crawl finished");

    if failed + cancelled > 0 {
        error!(failed, cancelled, "Not all units were crawled");
        bail!("{} of {} units did not complete", failed + cancelled, reports.len());
    }
    Ok(())
}

fn date_labels(args: &DateLabelArgs) -> Result<()> {
    let date = args
        .dates
        .date
        .unwrap_or_else(|| Local::now().date_naive());
    let mut out = io::stdout().lock();
    for label in args.dates.formats()?.candidates(date) {
        writeln!(out, "{label}")?;
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    Ok(BufWriter::new(file))
}
