use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ETAG, HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http_client::user_agent;

const CACHE_DIR: &str = "scout_stream";

/// Catalog listings change rarely, so each one is revalidated with its
/// validators instead of downloaded again. One JSON file per listing key.
#[derive(Debug)]
pub struct ListingCache {
    dir: Option<PathBuf>,
    listings: Mutex<HashMap<String, Listing>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Listing {
    body: String,
    etag: Option<String>,
    last_modified: Option<String>,
}

impl ListingCache {
    /// Without a directory listings are only remembered for the life of the process.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            listings: Mutex::default(),
        }
    }

    pub fn in_app_cache() -> Self {
        Self::new(app_cache_dir().map(|dir| dir.join("catalog")))
    }

    pub fn fetch(&self, client: &Client, key: &str, url: &str) -> Result<String> {
        let cached = self.lookup(key);
        let mut req = client.get(url).header(USER_AGENT, user_agent());
        if let Some(listing) = cached.as_ref() {
            req = with_validators(req, listing);
        }

        let resp = req.send().with_context(|| format!("request failed: {url}"))?;
        let status = resp.status();
        if status == StatusCode::NOT_MODIFIED {
            let listing = cached.ok_or_else(|| anyhow!("304 for uncached listing {url}"))?;
            debug!(key, "listing unchanged");
            return Ok(listing.body);
        }

        let etag = header_string(resp.headers(), ETAG);
        let last_modified = header_string(resp.headers(), LAST_MODIFIED);
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {status} for {url}"));
        }
        if etag.is_some() || last_modified.is_some() {
            self.store(
                key,
                Listing {
                    body: body.clone(),
                    etag,
                    last_modified,
                },
            );
        }
        Ok(body)
    }

    fn lookup(&self, key: &str) -> Option<Listing> {
        let mut listings = self.listings.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listing) = listings.get(key) {
            return Some(listing.clone());
        }
        let raw = fs::read_to_string(self.file_for(key)?).ok()?;
        let listing = serde_json::from_str::<Listing>(&raw).ok()?;
        listings.insert(key.to_string(), listing.clone());
        Some(listing)
    }

    fn store(&self, key: &str, listing: Listing) {
        if let Some(path) = self.file_for(key)
            && let Err(err) = write_listing(&path, &listing)
        {
            debug!("listing {key} not cached on disk: {err:#}");
        }
        self.listings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), listing);
    }

    fn file_for(&self, key: &str) -> Option<PathBuf> {
        let name = key.replace(['/', '\\'], "_");
        self.dir.as_ref().map(|dir| dir.join(format!("{name}.json")))
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

fn with_validators(mut req: RequestBuilder, listing: &Listing) -> RequestBuilder {
    if let Some(etag) = listing.etag.as_ref() {
        req = req.header(IF_NONE_MATCH, etag);
    }
    if let Some(last_modified) = listing.last_modified.as_ref() {
        req = req.header(IF_MODIFIED_SINCE, last_modified);
    }
    req
}

fn write_listing(path: &Path, listing: &Listing) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    }
    let json = serde_json::to_string(listing).context("serialize listing")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(body: &str) -> Listing {
        Listing {
            body: body.to_string(),
            etag: Some("\"abc\"".to_string()),
            last_modified: None,
        }
    }

    #[test]
    fn stored_listings_outlive_the_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ListingCache::new(Some(dir.path().to_path_buf()));
        cache.store("matches/11/1", listing("[]"));

        let reopened = ListingCache::new(Some(dir.path().to_path_buf()));
        assert_eq!(reopened.lookup("matches/11/1"), Some(listing("[]")));
        assert!(dir.path().join("matches_11_1.json").exists());
        assert_eq!(reopened.lookup("competitions"), None);
    }

    #[test]
    fn memory_only_cache_keeps_listings() {
        let cache = ListingCache::new(None);
        cache.store("competitions", listing("[1]"));
        assert_eq!(cache.lookup("competitions"), Some(listing("[1]")));
    }

    #[test]
    fn revalidation_sends_cached_validators() {
        let client = Client::new();
        let cached = Listing {
            last_modified: Some("Tue, 01 Oct 2024 10:00:00 GMT".to_string()),
            ..listing("[]")
        };
        let req = with_validators(client.get("http://localhost/competitions.json"), &cached)
            .build()
            .expect("request");
        assert_eq!(req.headers()[IF_NONE_MATCH], "\"abc\"");
        assert_eq!(
            req.headers()[IF_MODIFIED_SINCE],
            "Tue, 01 Oct 2024 10:00:00 GMT"
        );
    }
}
