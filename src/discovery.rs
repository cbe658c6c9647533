use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::catalog::{Competition, MatchInfo, MatchSource};
use crate::ledger::ProcessedLedger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    pub competition_ids: Vec<u32>,
    pub season_ids: Vec<u32>,
}

impl AllowList {
    pub fn new(competition_ids: Vec<u32>, season_ids: Vec<u32>) -> Self {
        Self {
            competition_ids,
            season_ids,
        }
    }

    pub fn allows(&self, competition_id: u32, season_id: u32) -> bool {
        self.competition_ids.contains(&competition_id) && self.season_ids.contains(&season_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryRound {
    pub pairs_total: usize,
    pub pairs_succeeded: usize,
    pub matches: Vec<MatchInfo>,
    pub errors: Vec<String>,
}

pub fn select_pairs(competitions: &[Competition], allow: &AllowList) -> Vec<(u32, u32)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in competitions {
        if allow.allows(c.competition_id, c.season_id)
            && seen.insert((c.competition_id, c.season_id))
        {
            out.push((c.competition_id, c.season_id));
        }
    }
    out
}

pub async fn discover_new_matches(
    source: &Arc<dyn MatchSource>,
    allow: &AllowList,
    ledger: &mut ProcessedLedger,
) -> DiscoveryRound {
    let mut round = DiscoveryRound::default();

    let competitions = match blocking(source, |s| s.competitions()).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!("failed to load competitions: {err:#}");
            round.errors.push(format!("competitions: {err:#}"));
            return round;
        }
    };

    let pairs = select_pairs(&competitions, allow);
    if pairs.is_empty() {
        info!("no matching competitions found");
        return round;
    }
    round.pairs_total = pairs.len();

    for (competition_id, season_id) in pairs {
        let fetched = blocking(source, move |s| s.matches(competition_id, season_id)).await;
        match fetched {
            Ok(matches) => {
                round.pairs_succeeded += 1;
                round.matches.extend(matches.into_iter().filter(|m| {
                    allow.allows(m.competition_id, m.season_id) && !ledger.contains(m.id)
                }));
            }
            Err(err) => {
                warn!(
                    competition_id,
                    season_id, "failed to load matches: {err:#}"
                );
                round
                    .errors
                    .push(format!("competition {competition_id} season {season_id}: {err:#}"));
            }
        }
    }
    round
}

async fn blocking<T, F>(source: &Arc<dyn MatchSource>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn MatchSource) -> Result<T> + Send + 'static,
{
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || call(source.as_ref()))
        .await
        .map_err(|err| anyhow!("catalog task failed: {err}"))?
}
