use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const EVENTS_TIMEOUT_SECS: u64 = 60;
const CLIENT_AGENT: &str = concat!("scout_stream/", env!("CARGO_PKG_VERSION"));

static CLIENT: OnceCell<Client> = OnceCell::new();

pub fn http_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build http client")
    })
}

// Event logs run to several megabytes, so they bypass the catalog cache and get a longer timeout.
pub fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .header(USER_AGENT, CLIENT_AGENT)
        .timeout(Duration::from_secs(EVENTS_TIMEOUT_SECS))
        .send()
        .with_context(|| format!("request failed: {url}"))?;
    let status = resp.status();
    let body = resp.text().context("failed reading body")?;
    if !status.is_success() {
        return Err(anyhow!("http {status} for {url}"));
    }
    Ok(body)
}

pub fn user_agent() -> &'static str {
    CLIENT_AGENT
}
