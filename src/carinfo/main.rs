mod scrape;

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

/// VINs scraped concurrently before each store.
const BATCH_SIZE: usize = 20;
/// Upper bound on simultaneously open tabs.
const MAX_CONCURRENT_PAGES: usize = 20;

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
    let url = config.link(0)?;

    let vins = match scrape::fetch_vins().await {
        Ok(vins) => vins,
        Err(e) => {
            tracing::error!(target: "db", "\x1b[31merror fetching VINs: {e}\x1b[0m");
            Vec::new()
        }
    };
    if vins.is_empty() {
        tracing::info!(target: "main", "no pending VINs in forvin.");
        return Ok(());
    }
    tracing::info!(target: "main", "processing {} VINs ...", vins.len());

    let browser = vscr::scrape::puppeteer(true)?;
    let pages = Arc::new(Semaphore::new(MAX_CONCURRENT_PAGES));

    // Single pass: one page of VINs, then stop, leftovers wait for the next
    // invocation.
    for batch in vins.chunks(BATCH_SIZE) {
        let futs = batch
            .iter()
            .map(|item| scrape::process_one(&browser, &pages, url, item));
        let results = join_all(futs)
            .await
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;

        let n = results.len();
        match scrape::store_batch(results).await {
            Ok(stored) => {
                tracing::info!(target: "db", "\x1b[36mstored {stored}/{n} records in carinfo\x1b[0m");
            }
            Err(e) => {
                tracing::error!(target: "db", "\x1b[31merror inserting vehicle data: {e}\x1b[0m");
            }
        }
    }

    Ok(())
}
