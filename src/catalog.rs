use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;

use crate::event::{EventParse, parse_events_json};
use crate::http_cache::ListingCache;
use crate::http_client::{fetch_text, http_client};

pub const STATSBOMB_OPEN_DATA_URL: &str =
    "https://raw.githubusercontent.com/statsbomb/open-data/master/data";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Competition {
    pub competition_id: u32,
    pub season_id: u32,
    #[serde(default)]
    pub competition_name: String,
    #[serde(default)]
    pub season_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub id: u64,
    pub competition_id: u32,
    pub season_id: u32,
    pub match_date: Option<String>,
    pub home_team: String,
    pub away_team: String,
}

impl MatchInfo {
    pub fn new(id: u64, competition_id: u32, season_id: u32) -> Self {
        Self {
            id,
            competition_id,
            season_id,
            match_date: None,
            home_team: String::new(),
            away_team: String::new(),
        }
    }
}

/// Read-only view of an upstream competition/match catalog.
///
/// Calls block; async callers go through `tokio::task::spawn_blocking`.
pub trait MatchSource: Send + Sync {
    fn competitions(&self) -> Result<Vec<Competition>>;

    fn matches(&self, competition_id: u32, season_id: u32) -> Result<Vec<MatchInfo>>;

    /// Events come back untagged (`match_id == 0`).
    fn events(&self, match_id: u64) -> Result<EventParse>;
}

#[derive(Debug, Clone)]
pub struct StatsbombOpenData {
    base_url: String,
    listings: Arc<ListingCache>,
}

impl StatsbombOpenData {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            listings: Arc::new(ListingCache::in_app_cache()),
        }
    }

    fn competitions_url(&self) -> String {
        format!("{}/competitions.json", self.base_url)
    }

    fn matches_url(&self, competition_id: u32, season_id: u32) -> String {
        format!("{}/matches/{competition_id}/{season_id}.json", self.base_url)
    }

    fn events_url(&self, match_id: u64) -> String {
        format!("{}/events/{match_id}.json", self.base_url)
    }
}

impl Default for StatsbombOpenData {
    fn default() -> Self {
        Self::new(STATSBOMB_OPEN_DATA_URL)
    }
}

impl MatchSource for StatsbombOpenData {
    fn competitions(&self) -> Result<Vec<Competition>> {
        let client = http_client()?;
        let body = self
            .listings
            .fetch(client, "competitions", &self.competitions_url())
            .context("fetch competitions failed")?;
        parse_competitions_json(&body)
    }

    fn matches(&self, competition_id: u32, season_id: u32) -> Result<Vec<MatchInfo>> {
        let client = http_client()?;
        let key = format!("matches/{competition_id}/{season_id}");
        let body = self
            .listings
            .fetch(client, &key, &self.matches_url(competition_id, season_id))
            .with_context(|| {
                format!("fetch matches failed (competition={competition_id} season={season_id})")
            })?;
        parse_matches_json(&body, competition_id, season_id)
    }

    fn events(&self, match_id: u64) -> Result<EventParse> {
        let client = http_client()?;
        let body = fetch_text(client, &self.events_url(match_id))
            .with_context(|| format!("fetch events failed (match={match_id})"))?;
        parse_events_json(&body).with_context(|| format!("parse events (match={match_id})"))
    }
}

pub fn parse_competitions_json(raw: &str) -> Result<Vec<Competition>> {
    let parsed = serde_json::from_str::<Option<Vec<Competition>>>(raw.trim())
        .context("invalid competitions json")?;
    Ok(parsed.unwrap_or_default())
}

pub fn parse_matches_json(
    raw: &str,
    fallback_competition_id: u32,
    fallback_season_id: u32,
) -> Result<Vec<MatchInfo>> {
    let value = serde_json::from_str::<Value>(raw.trim()).context("invalid matches json")?;
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(anyhow!("matches json is not an array")),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        if let Some(row) = parse_match(item, fallback_competition_id, fallback_season_id) {
            out.push(row);
        }
    }
    Ok(out)
}

fn parse_match(v: &Value, fallback_competition_id: u32, fallback_season_id: u32) -> Option<MatchInfo> {
    let id = as_u64_any(v.get("match_id")?)?;
    let competition_id = v
        .get("competition")
        .and_then(|c| c.get("competition_id"))
        .and_then(as_u32_any)
        .unwrap_or(fallback_competition_id);
    let season_id = v
        .get("season")
        .and_then(|s| s.get("season_id"))
        .and_then(as_u32_any)
        .unwrap_or(fallback_season_id);
    let match_date = v
        .get("match_date")
        .and_then(|x| x.as_str())
        .map(|s| s.to_string());
    let home_team = team_name(v.get("home_team"), "home_team_name");
    let away_team = team_name(v.get("away_team"), "away_team_name");

    Some(MatchInfo {
        id,
        competition_id,
        season_id,
        match_date,
        home_team,
        away_team,
    })
}

fn team_name(team: Option<&Value>, key: &str) -> String {
    team.and_then(|t| t.get(key))
        .and_then(|x| x.as_str())
        .unwrap_or_default()
        .to_string()
}

fn as_u64_any(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<u64>().ok()
}

fn as_u32_any(v: &Value) -> Option<u32> {
    let n = as_u64_any(v)?;
    u32::try_from(n).ok()
}
