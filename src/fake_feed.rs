use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{Competition, MatchInfo, MatchSource};
use crate::event::{
    DUEL_AERIAL, DUEL_GROUND_DEFENDING, DUEL_LOOSE_BALL, DribbleDetail, DuelDetail, EntityRef,
    Event, EventKind, EventParse, GoalkeeperDetail, HEIGHT_HIGH_PASS, Label, OUTCOME_COMPLETE,
    OUTCOME_GOAL, OUTCOME_ON_TARGET, OUTCOME_OWN_GOAL, OUTCOME_SAVED, OUTCOME_SUCCESS,
    OUTCOME_WON, PassDetail, SUBTYPE_FREE_KICK, SUBTYPE_PENALTY, SUBTYPE_SHOT_SAVED, ShotDetail,
};

const SEED_COMPETITIONS: &[(u32, u32, &str, &str)] = &[
    (11, 1, "La Liga", "2017/2018"),
    (11, 2, "La Liga", "2016/2017"),
    (11, 4, "La Liga", "2018/2019"),
    (43, 3, "FIFA World Cup", "2018"),
];

const TEAMS: &[(u64, &str)] = &[
    (217, "Barcelona"),
    (220, "Real Madrid"),
    (206, "Deportivo Alavés"),
    (212, "Atlético Madrid"),
    (771, "France"),
    (785, "Croatia"),
];

const SQUAD_SIZE: u64 = 11;

/// Deterministic offline catalog. Each pair starts with `initial` matches and
/// reveals `per_poll` more on every `matches` call, so repeated discovery rounds
/// keep finding new work the way a live catalog does.
pub struct FakeCatalog {
    seed: u64,
    initial: usize,
    per_poll: usize,
    max_per_pair: usize,
    events_per_match: usize,
    failing_matches: HashSet<u64>,
    failing_pairs: HashSet<(u32, u32)>,
    polls: Mutex<HashMap<(u32, u32), usize>>,
}

impl FakeCatalog {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            initial: 6,
            per_poll: 3,
            max_per_pair: 38,
            events_per_match: 120,
            failing_matches: HashSet::new(),
            failing_pairs: HashSet::new(),
            polls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_growth(mut self, initial: usize, per_poll: usize, max_per_pair: usize) -> Self {
        self.initial = initial;
        self.per_poll = per_poll;
        self.max_per_pair = max_per_pair.max(initial);
        self
    }

    pub fn with_events_per_match(mut self, events: usize) -> Self {
        self.events_per_match = events;
        self
    }

    pub fn with_failing_matches(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.failing_matches.extend(ids);
        self
    }

    pub fn with_failing_pairs(mut self, pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        self.failing_pairs.extend(pairs);
        self
    }

    pub fn match_id(competition_id: u32, season_id: u32, n: usize) -> u64 {
        u64::from(competition_id) * 1_000_000 + u64::from(season_id) * 1_000 + n as u64 + 1
    }

    fn visible(&self, competition_id: u32, season_id: u32) -> usize {
        let mut polls = self
            .polls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seen = polls.entry((competition_id, season_id)).or_insert(0);
        let visible = self
            .initial
            .saturating_add(seen.saturating_mul(self.per_poll))
            .min(self.max_per_pair);
        *seen += 1;
        visible
    }
}

impl Default for FakeCatalog {
    fn default() -> Self {
        Self::new(7)
    }
}

impl MatchSource for FakeCatalog {
    fn competitions(&self) -> Result<Vec<Competition>> {
        Ok(SEED_COMPETITIONS
            .iter()
            .map(|(c, s, name, season)| Competition {
                competition_id: *c,
                season_id: *s,
                competition_name: name.to_string(),
                season_name: season.to_string(),
            })
            .collect())
    }

    fn matches(&self, competition_id: u32, season_id: u32) -> Result<Vec<MatchInfo>> {
        if self.failing_pairs.contains(&(competition_id, season_id)) {
            return Err(anyhow!(
                "fake catalog refused competition {competition_id} season {season_id}"
            ));
        }
        let count = self.visible(competition_id, season_id);
        let start = NaiveDate::from_ymd_opt(2017, 8, 18);
        Ok((0..count)
            .map(|n| {
                let id = Self::match_id(competition_id, season_id, n);
                let (home, away) = fixture_teams(id);
                let mut info = MatchInfo::new(id, competition_id, season_id);
                info.match_date = start
                    .map(|d| (d + ChronoDuration::days(7 * n as i64)).format("%Y-%m-%d").to_string());
                info.home_team = home.1.to_string();
                info.away_team = away.1.to_string();
                info
            })
            .collect())
    }

    fn events(&self, match_id: u64) -> Result<EventParse> {
        if self.failing_matches.contains(&match_id) {
            return Err(anyhow!("fake catalog has no events for match {match_id}"));
        }
        Ok(EventParse {
            events: synth_events(self.seed ^ match_id, match_id, self.events_per_match),
            rejected: 0,
        })
    }
}

fn fixture_teams(match_id: u64) -> ((u64, &'static str), (u64, &'static str)) {
    let home = (match_id as usize) % TEAMS.len();
    let away = (home + 1 + (match_id as usize / TEAMS.len()) % (TEAMS.len() - 1)) % TEAMS.len();
    (TEAMS[home], TEAMS[away])
}

fn player_for(team: (u64, &str), slot: u64) -> EntityRef {
    EntityRef {
        id: team.0 * 100 + slot,
        name: format!("{} #{}", team.1, slot + 1),
    }
}

fn label(name: &str) -> Option<Label> {
    Some(Label::new(name))
}

fn synth_events(seed: u64, match_id: u64, count: usize) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    let (home, away) = fixture_teams(match_id);
    let mut events: Vec<Event> = Vec::with_capacity(count);
    let mut last_pass: [Option<usize>; 2] = [None, None];

    for index in 0..count {
        let side = rng.gen_range(0..2usize);
        let team = if side == 0 { home } else { away };
        // Slot 0 keeps goal.
        let slot = rng.gen_range(1..SQUAD_SIZE);
        let elapsed = (index * 90 * 60 / count.max(1)) as u32;

        let roll = rng.gen_range(0..100u32);
        let (kind, player_slot) = match roll {
            0..=34 => (random_pass(&mut rng), slot),
            35..=44 => (EventKind::Carry, slot),
            45..=52 => {
                let mut shot = random_shot(&mut rng);
                if let Some(pass_idx) = last_pass[side].filter(|_| rng.gen_bool(0.5)) {
                    let pass_event = &mut events[pass_idx];
                    if let EventKind::Pass(pass) = &mut pass_event.kind {
                        if shot.is_goal() {
                            pass.goal_assist = true;
                        } else {
                            pass.shot_assist = true;
                        }
                        pass.recipient = Some(player_for(team, slot));
                        shot.key_pass_id = Some(pass_event.id.clone());
                    }
                }
                (EventKind::Shot(shot), slot)
            }
            53..=64 => (random_duel(&mut rng), slot),
            65..=70 => (
                EventKind::Dribble(DribbleDetail {
                    outcome: if rng.gen_bool(0.6) {
                        label(OUTCOME_COMPLETE)
                    } else {
                        label("Incomplete")
                    },
                }),
                slot,
            ),
            71..=75 => (EventKind::Interception, slot),
            76..=80 => (EventKind::Clearance, slot),
            81..=84 => (EventKind::Block, slot),
            85..=91 => (EventKind::BallRecovery, slot),
            92..=95 => (random_goalkeeper(&mut rng), 0),
            _ => (EventKind::Other("Pressure".to_string()), slot),
        };

        let is_pass = matches!(kind, EventKind::Pass(_));
        events.push(Event {
            match_id: 0,
            id: format!("{match_id}-{index:04}"),
            index: index as u64 + 1,
            period: if elapsed < 45 * 60 { 1 } else { 2 },
            minute: elapsed / 60,
            second: elapsed % 60,
            team: Some(EntityRef {
                id: team.0,
                name: team.1.to_string(),
            }),
            player: Some(player_for(team, player_slot)),
            kind,
        });
        if is_pass {
            last_pass[side] = Some(events.len() - 1);
        }
    }
    events
}

fn random_pass(rng: &mut StdRng) -> EventKind {
    let free_kick = rng.gen_bool(0.05);
    EventKind::Pass(PassDetail {
        kind: if free_kick { label(SUBTYPE_FREE_KICK) } else { None },
        outcome: if rng.gen_bool(0.8) {
            None
        } else {
            label("Incomplete")
        },
        height: if rng.gen_bool(0.15) {
            label(HEIGHT_HIGH_PASS)
        } else {
            label("Ground Pass")
        },
        recipient: None,
        shot_assist: false,
        goal_assist: false,
    })
}

fn random_shot(rng: &mut StdRng) -> ShotDetail {
    let kind = match rng.gen_range(0..20u32) {
        0 => label(SUBTYPE_PENALTY),
        1 | 2 => label(SUBTYPE_FREE_KICK),
        _ => label("Open Play"),
    };
    let outcome = match rng.gen_range(0..100u32) {
        0..=11 => label(OUTCOME_GOAL),
        12..=29 => label(OUTCOME_SAVED),
        30..=34 => label(OUTCOME_ON_TARGET),
        35 => label(OUTCOME_OWN_GOAL),
        36..=69 => label("Off T"),
        _ => label("Blocked"),
    };
    ShotDetail {
        kind,
        outcome,
        key_pass_id: None,
    }
}

fn random_duel(rng: &mut StdRng) -> EventKind {
    let kind = match rng.gen_range(0..3u32) {
        0 => DUEL_AERIAL,
        1 => DUEL_GROUND_DEFENDING,
        _ => DUEL_LOOSE_BALL,
    };
    EventKind::Duel(DuelDetail {
        kind: label(kind),
        outcome: if rng.gen_bool(0.5) {
            label(OUTCOME_WON)
        } else {
            label("Lost In Play")
        },
    })
}

fn random_goalkeeper(rng: &mut StdRng) -> EventKind {
    let save = rng.gen_bool(0.6);
    EventKind::GoalKeeper(GoalkeeperDetail {
        kind: if save {
            label(SUBTYPE_SHOT_SAVED)
        } else {
            label("Collected")
        },
        outcome: if rng.gen_bool(0.7) {
            label(OUTCOME_SUCCESS)
        } else {
            None
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_deterministic_per_match() {
        let catalog = FakeCatalog::new(42).with_events_per_match(60);
        let a = catalog.events(11_001_001).expect("events");
        let b = catalog.events(11_001_001).expect("events");
        assert_eq!(a.events, b.events);
        assert_eq!(a.events.len(), 60);
        assert!(a.events.iter().all(|e| e.player.is_some()));
    }

    #[test]
    fn catalog_reveals_more_matches_each_poll() {
        let catalog = FakeCatalog::new(1).with_growth(2, 3, 6);
        assert_eq!(catalog.matches(11, 1).expect("first").len(), 2);
        assert_eq!(catalog.matches(11, 1).expect("second").len(), 5);
        assert_eq!(catalog.matches(11, 1).expect("third").len(), 6);
        assert_eq!(catalog.matches(11, 2).expect("other pair").len(), 2);
    }

    #[test]
    fn key_passes_point_at_same_match_passes() {
        let catalog = FakeCatalog::new(3).with_events_per_match(400);
        let parsed = catalog.events(43_003_001).expect("events");
        let ids: HashSet<&str> = parsed.events.iter().map(|e| e.id.as_str()).collect();
        for event in &parsed.events {
            if let EventKind::Shot(shot) = &event.kind
                && let Some(key) = &shot.key_pass_id
            {
                assert!(ids.contains(key.as_str()));
            }
        }
    }

    #[test]
    fn configured_failures_surface_as_errors() {
        let catalog = FakeCatalog::new(1)
            .with_failing_matches([5])
            .with_failing_pairs([(11, 2)]);
        assert!(catalog.events(5).is_err());
        assert!(catalog.matches(11, 2).is_err());
        assert!(catalog.matches(11, 1).is_ok());
    }
}
