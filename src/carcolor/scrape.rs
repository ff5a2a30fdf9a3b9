use core::time::Duration;
use std::sync::{Arc, LazyLock};

use compact_str::CompactString;
use headless_chrome::{Browser, Tab};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use vscr::{
    db::{get_connection, BB8Error, ToSqlIter},
    record::{dedup_by_vin, or_not_found, VehicleColor},
    scrape::puppeteer,
};

const RESULT_TIMEOUT: Duration = Duration::from_secs(3);

static SEL_COLOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".bh-m.spacing-s").unwrap());

/// VINs with no color data and not yet written to `carcolor`.
pub async fn fetch_vins() -> Result<Vec<CompactString>, BB8Error> {
    const SQL: &str = "select vin from forvin where (vin not in (select vin from carcolor)) and (color is null or interior is null) limit 500";

    let conn = get_connection().await?;
    let rows = conn.query(SQL, &[]).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let vin = row.try_get::<_, String>(0).ok()?;
            Some(vin.trim().into())
        })
        .collect())
}

/// One unit of work: fresh tab on the paint-lookup form, one VIN, one record.
pub async fn process_one(
    browser: &Browser,
    pages: &Semaphore,
    url: &str,
    vin: &str,
) -> anyhow::Result<VehicleColor> {
    let _permit = pages.acquire().await?;

    let tab = browser.new_tab()?;
    puppeteer::navigate_to(&tab, url.to_owned()).await?;

    let colors = get_color(&tab, vin).await;

    if let Err(e) = puppeteer::close_tab(tab).await {
        tracing::debug!(target: "worker", "closing tab for VIN {vin}: {e:?}");
    }
    Ok(colors)
}

async fn get_color(tab: &Arc<Tab>, vin: &str) -> VehicleColor {
    match submit_form(tab, vin).await {
        Ok(html) => extract_colors(&html, vin),
        Err(e) => {
            tracing::warn!(target: "worker", "error extracting color data for VIN {vin}: {e:?}");
            VehicleColor::not_found(vin)
        }
    }
}

async fn submit_form(tab: &Arc<Tab>, vin: &str) -> anyhow::Result<String> {
    // Anything other than a full 17-character VIN is submitted empty and
    // comes back as a sentinel record once the result wait times out.
    let vin = vin.trim();
    if vin.len() == 17 {
        puppeteer::type_into(tab, "#VIN".into(), vin.to_owned()).await?;
    }
    puppeteer::click(tab, ".MuiButtonBase-root.MuiButton-root".into()).await?;
    puppeteer::wait_for(tab, ".bh-m.spacing-s".into(), RESULT_TIMEOUT).await?;

    puppeteer::inner_html(tab, "body".into()).await
}

/// Pure extraction: the first swatch label is the exterior color, the second
/// the interior.
pub fn extract_colors(html: &str, vin: &str) -> VehicleColor {
    let fragment = Html::parse_fragment(html);
    let mut labels = fragment
        .select(&SEL_COLOR)
        .map(|el| el.text().map(str::trim).collect::<String>());

    VehicleColor {
        vin: vin.trim().into(),
        color: or_not_found(labels.next()),
        interior: or_not_found(labels.next()),
    }
}

/// Appends one deduplicated batch to `carcolor` in a single statement.
pub async fn store_batch(mut records: Vec<VehicleColor>) -> Result<u64, BB8Error> {
    const SQL: &str = "with tmp_insert(v, c, i) as (select * from unnest($1::text[], $2::text[], $3::text[])) insert into carcolor (vin, color, interior) select v, c, i from tmp_insert";

    dedup_by_vin(&mut records, |r| &r.vin);

    let conn = get_connection().await?;
    let n_rows = conn
        .execute(
            SQL,
            &[
                &ToSqlIter(records.iter().map(|x| &*x.vin)),
                &ToSqlIter(records.iter().map(|x| &*x.color)),
                &ToSqlIter(records.iter().map(|x| &*x.interior)),
            ],
        )
        .await?;
    Ok(n_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscr::record::NOT_FOUND;

    #[test]
    fn extracts_color_and_interior() {
        let html = r#"
            <div class="bh-m spacing-s">Crystal Black Pearl</div>
            <div class="bh-m spacing-s">Gray Leather</div>
        "#;
        let colors = extract_colors(html, "1HGCM82633A004352");
        assert_eq!(colors.color, "Crystal Black Pearl");
        assert_eq!(colors.interior, "Gray Leather");
    }

    #[test]
    fn single_swatch_leaves_interior_sentinel() {
        let html = r#"<span class="bh-m spacing-s">Alpine White</span>"#;
        let colors = extract_colors(html, "1HGCM82633A004352");
        assert_eq!(colors.color, "Alpine White");
        assert_eq!(colors.interior, NOT_FOUND);
    }

    #[test]
    fn junk_page_yields_sentinel_record() {
        let colors = extract_colors("<p>no results</p>", "1HGCM82633A004352");
        assert_eq!(colors, VehicleColor::not_found("1HGCM82633A004352"));
    }
}
