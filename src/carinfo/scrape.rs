use core::time::Duration;
use std::sync::{Arc, LazyLock};

use compact_str::CompactString;
use headless_chrome::{Browser, Tab};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use vscr::{
    db::{get_connection, BB8Error, ToSqlIter},
    record::{dedup_by_vin, normalize_transmission, or_not_found, VehicleInfo},
    scrape::puppeteer,
};

const RESULT_TIMEOUT: Duration = Duration::from_secs(3);

static SEL_MAKE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".col-md-6 #decodedMake").unwrap());
static SEL_MODEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".col-md-6 #decodedModel").unwrap());
static SEL_DETAILS_P: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".col-md-6 p").unwrap());
static SEL_PANEL_BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".panel-body").unwrap());

pub struct PendingVin {
    pub vin: CompactString,
    pub year: Option<i32>,
}

/// VINs still missing decoder fields and not yet written to `carinfo`.
pub async fn fetch_vins() -> Result<Vec<PendingVin>, BB8Error> {
    const SQL: &str = "select vin, year from forvin where (vin not in (select vin from carinfo)) and (make is null or body is null or model is null or transmission is null) limit 500";

    let conn = get_connection().await?;
    let rows = conn.query(SQL, &[]).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let vin = row.try_get::<_, String>(0).ok()?;
            let year = row.try_get::<_, Option<i32>>(1).ok()?;
            Some(PendingVin {
                vin: vin.trim().into(),
                year,
            })
        })
        .collect())
}

/// One unit of work: a fresh tab on the decoder form, one VIN, one record.
/// Tab or navigation failure propagates; everything downstream degrades to
/// sentinel fields instead.
pub async fn process_one(
    browser: &Browser,
    pages: &Semaphore,
    url: &str,
    item: &PendingVin,
) -> anyhow::Result<VehicleInfo> {
    let _permit = pages.acquire().await?;

    let tab = browser.new_tab()?;
    puppeteer::navigate_to(&tab, url.to_owned()).await?;

    let info = get_info(&tab, &item.vin, item.year).await;

    if let Err(e) = puppeteer::close_tab(tab).await {
        tracing::debug!(target: "worker", "closing tab for VIN {}: {e:?}", item.vin);
    }
    Ok(info)
}

async fn get_info(tab: &Arc<Tab>, vin: &str, year: Option<i32>) -> VehicleInfo {
    match submit_form(tab, vin, year).await {
        Ok(html) => extract_info(&html, vin, year),
        Err(e) => {
            tracing::warn!(target: "worker", "error extracting vehicle info for VIN {vin}: {e:?}");
            VehicleInfo::not_found(vin, year)
        }
    }
}

async fn submit_form(tab: &Arc<Tab>, vin: &str, year: Option<i32>) -> anyhow::Result<String> {
    puppeteer::type_into(tab, "#VIN".into(), vin.trim().to_owned()).await?;
    if let Some(year) = year {
        puppeteer::type_into(tab, "#ModelYear".into(), year.to_string()).await?;
    }
    puppeteer::click(tab, "#btnSubmit".into()).await?;
    puppeteer::wait_for(tab, ".col-md-6".into(), RESULT_TIMEOUT).await?;

    puppeteer::inner_html(tab, "body".into()).await
}

/// Pure extraction over the result page: each field is looked up by literal
/// label or id and reduced to the sentinel when missing.
pub fn extract_info(html: &str, vin: &str, year: Option<i32>) -> VehicleInfo {
    let fragment = Html::parse_fragment(html);

    let make = fragment
        .select(&SEL_MAKE)
        .next()
        .map(|el| el.text().map(str::trim).collect::<String>());
    let model = fragment
        .select(&SEL_MODEL)
        .next()
        .map(|el| el.text().map(str::trim).collect::<String>());

    let body = fragment.select(&SEL_DETAILS_P).find_map(|p| {
        let text = p.text().collect::<String>();
        let (_, rest) = text.split_once("Body Class:")?;
        Some(rest.trim().to_owned())
    });

    // Transmission style lives in the second details panel.
    let transmission = fragment.select(&SEL_PANEL_BODY).nth(1).and_then(|panel| {
        let text = panel.text().collect::<String>();
        text.lines()
            .filter(|line| line.contains("Transmission Style:"))
            .find_map(|line| Some(line.split_once(':')?.1.trim().to_owned()))
    });

    VehicleInfo {
        vin: vin.trim().into(),
        year,
        body: or_not_found(body),
        make: or_not_found(make),
        model: or_not_found(model),
        transmission: normalize_transmission(transmission.as_deref().unwrap_or_default())
            .to_owned(),
    }
}

/// Appends one deduplicated batch to `carinfo` in a single statement.
pub async fn store_batch(mut records: Vec<VehicleInfo>) -> Result<u64, BB8Error> {
    const SQL: &str = "with tmp_insert(v, y, b, m, o, t) as (select * from unnest($1::text[], $2::int[], $3::text[], $4::text[], $5::text[], $6::text[])) insert into carinfo (vin, year, body, make, model, transmission) select v, y, b, m, o, t from tmp_insert";

    dedup_by_vin(&mut records, |r| &r.vin);

    let conn = get_connection().await?;
    let n_rows = conn
        .execute(
            SQL,
            &[
                &ToSqlIter(records.iter().map(|x| &*x.vin)),
                &ToSqlIter(records.iter().map(|x| x.year)),
                &ToSqlIter(records.iter().map(|x| &*x.body)),
                &ToSqlIter(records.iter().map(|x| &*x.make)),
                &ToSqlIter(records.iter().map(|x| &*x.model)),
                &ToSqlIter(records.iter().map(|x| &*x.transmission)),
            ],
        )
        .await?;
    Ok(n_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vscr::record::NOT_FOUND;

    const RESULT_PAGE: &str = r#"
        <div class="col-md-6">
            <h4><span id="decodedMake">HONDA</span> <span id="decodedModel">Accord</span></h4>
            <p>Body Class: Sedan/Saloon</p>
            <p>Drive Type: FWD</p>
        </div>
        <div class="panel-body">Engine Number of Cylinders: 4</div>
        <div class="panel-body">
Transmission Style: 5-Speed Automatic
Transmission Speeds: 5
        </div>
    "#;

    #[test]
    fn extracts_all_fields() {
        let info = extract_info(RESULT_PAGE, "1HGCM82633A004352", Some(2003));
        assert_eq!(info.make, "HONDA");
        assert_eq!(info.model, "Accord");
        assert_eq!(info.body, "Sedan/Saloon");
        assert_eq!(info.transmission, "Automatic");
    }

    #[test]
    fn partial_page_defaults_missing_fields() {
        let html = r#"<div class="col-md-6"><span id="decodedMake">HONDA</span></div>"#;
        let info = extract_info(html, "1HGCM82633A004352", Some(2003));
        assert_eq!(info.make, "HONDA");
        assert_eq!(info.model, NOT_FOUND);
        assert_eq!(info.body, NOT_FOUND);
        assert_eq!(info.transmission, NOT_FOUND);
    }

    #[test]
    fn junk_page_yields_sentinel_record() {
        let info = extract_info("<html><body>service unavailable</body></html>", "VIN00000000000000", None);
        assert_eq!(info, VehicleInfo::not_found("VIN00000000000000", None));
    }
}
