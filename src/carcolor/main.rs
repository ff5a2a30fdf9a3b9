mod scrape;

use std::sync::Arc;

use compact_str::CompactString;
use futures_util::future::join_all;
use tokio::sync::Semaphore;

/// VINs scraped concurrently before each store.
const BATCH_SIZE: usize = 50;
/// Upper bound on simultaneously open tabs.
const MAX_CONCURRENT_PAGES: usize = 10;
/// Consecutive source-query failures tolerated before giving up; an empty
/// result (the queue drained) is the normal exit.
const MAX_QUERY_FAILURES: u32 = 3;

#[derive(clap::Parser)]
struct Args {
    /// Pointer file: credentials file path on the first line, target URLs on
    /// the following lines.
    #[arg(value_name = "file", default_value = "links.txt")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    pretty_env_logger::init_timed();

    let args = Args::parse();
    let config = vscr::config::Config::load(&args.config)?;
    vscr::db::init_db(&config.db).await?;
    let url = config.link(1)?;

    let mut failures = 0;
    loop {
        match scrape::fetch_vins().await {
            Ok(vins) if vins.is_empty() => {
                tracing::info!(target: "main", "all VINs processed, no new VINs found.");
                break Ok(());
            }
            Ok(vins) => {
                failures = 0;
                tracing::info!(target: "main", "processing {} VINs ...", vins.len());
                process_vins(url, &vins).await?;
            }
            Err(e) => {
                failures += 1;
                tracing::error!(target: "db", "\x1b[31merror fetching VINs ({failures}/{MAX_QUERY_FAILURES}): {e}\x1b[0m");
                if failures >= MAX_QUERY_FAILURES {
                    break Err(anyhow::anyhow!("source query failed {failures} times in a row"));
                }
            }
        }
    }
}

async fn process_vins(url: &str, vins: &[CompactString]) -> anyhow::Result<()> {
    let browser = vscr::scrape::puppeteer(true)?;
    let pages = Arc::new(Semaphore::new(MAX_CONCURRENT_PAGES));

    for batch in vins.chunks(BATCH_SIZE) {
        let futs = batch
            .iter()
            .map(|vin| scrape::process_one(&browser, &pages, url, vin));
        let results = join_all(futs)
            .await
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;

        let n = results.len();
        match scrape::store_batch(results).await {
            Ok(stored) => {
                tracing::info!(target: "db", "\x1b[36mstored {stored}/{n} records in carcolor\x1b[0m");
            }
            Err(e) => {
                tracing::error!(target: "db", "\x1b[31mdatabase insert error: {e}\x1b[0m");
            }
        }
    }

    Ok(())
}
