//! Async shims over `headless_chrome`. The CDP client is blocking, so every
//! per-page interaction is pushed onto the blocking pool; elements are looked
//! up by selector inside the closure instead of being carried across the
//! `spawn_blocking` boundary.

use core::time::Duration;
use std::{borrow::Cow, ffi::OsStr, sync::Arc, time::Instant};

use headless_chrome::{browser::tab::NoElementFound, Browser, LaunchOptions, Tab};
use serde_json::Value;
use tokio::{task::spawn_blocking, time::sleep};

const POLL_PERIOD: Duration = Duration::from_millis(250);

pub fn puppeteer(headless: bool) -> anyhow::Result<Browser> {
    Browser::new(LaunchOptions {
        args: vec![OsStr::new("--disable-blink-features=AutomationControlled")],
        headless,
        ..LaunchOptions::default()
    })
}

pub async fn navigate_to(tab: &Arc<Tab>, url: String) -> anyhow::Result<()> {
    let tab = Arc::clone(tab);
    spawn_blocking(move || tab.navigate_to(&url).map(|_| ())).await?
}

/// Clicks the element, then sends the text as keystrokes.
pub async fn type_into(
    tab: &Arc<Tab>,
    selector: Cow<'static, str>,
    text: String,
) -> anyhow::Result<()> {
    let tab = Arc::clone(tab);
    spawn_blocking(move || tab.find_element(&selector)?.type_into(&text).map(|_| ())).await?
}

pub async fn click(tab: &Arc<Tab>, selector: Cow<'static, str>) -> anyhow::Result<()> {
    let tab = Arc::clone(tab);
    spawn_blocking(move || tab.find_element(&selector)?.click().map(|_| ())).await?
}

/// Polls for the selector until it appears or the deadline passes. Anything
/// other than "element not found yet" fails immediately.
pub async fn wait_for(
    tab: &Arc<Tab>,
    selector: Cow<'static, str>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let t = Arc::clone(tab);
        let sel = selector.clone();
        match spawn_blocking(move || t.find_element(&sel).map(|_| ())).await? {
            Ok(()) => break Ok(()),
            Err(err) => {
                if !err.is::<NoElementFound>() {
                    break Err(err);
                }
                if Instant::now() >= deadline {
                    break Err(anyhow::anyhow!("timed out waiting for `{selector}`"));
                }
            }
        }

        sleep(POLL_PERIOD).await;
    }
}

pub async fn inner_html(tab: &Arc<Tab>, selector: Cow<'static, str>) -> anyhow::Result<String> {
    let tab = Arc::clone(tab);

    let ret = spawn_blocking(move || {
        tab.find_element(&selector)?
            .call_js_fn("function(){return this.innerHTML}", Vec::new(), false)
    })
    .await??;

    match ret.value {
        Some(Value::String(s)) => Ok(s),
        Some(value) => anyhow::bail!("not a string: {value}"),
        None => anyhow::bail!("returned nothing"),
    }
}

pub async fn close_tab(tab: Arc<Tab>) -> anyhow::Result<()> {
    spawn_blocking(move || tab.close(true).map(|_| ())).await?
}
