use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::event::{DuelCategory, Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatColumn {
    pub key: &'static str,
    pub label: &'static str,
}

const fn col(key: &'static str, label: &'static str) -> StatColumn {
    StatColumn { key, label }
}

pub const STAT_COUNT: usize = 40;

pub const PLAYER_STAT_COLUMNS: [StatColumn; STAT_COUNT] = [
    col("matches_played", "Matches Played"),
    col("total_shots", "Total Shots"),
    col("accurate_shots", "Accurate Shots"),
    col("shot_accuracy", "Shot Accuracy"),
    col("goals", "Goals"),
    col("shot_conversion", "Shot Conversion"),
    col("penalties_taken", "Penalties Taken"),
    col("penalties_scored", "Penalties Scored"),
    col("penalty_conversion", "Penalty Conversion"),
    col("free_kick_shots", "Free Kick Shots"),
    col("total_passes", "Total Passes"),
    col("accurate_passes", "Accurate Passes"),
    col("pass_accuracy", "Pass Accuracy"),
    col("key_passes", "Key Passes"),
    col("assists", "Assists"),
    col("crosses", "Crosses"),
    col("free_kick_crosses", "Free Kick Crosses"),
    col("run_attempts_with_ball", "Run Attempts With Ball"),
    col("successful_runs_with_ball", "Successful Runs With Ball"),
    col("perc_successful_runs_with_ball", "Perc Successful Runs With Ball"),
    col("dribbles", "Dribbles"),
    col("aerial_duels", "Aerial Duels"),
    col("aerial_duels_won", "Aerial Duels Won"),
    col("perc_aerial_duels_won", "Perc Aerial Duels Won"),
    col("ground_defensive_duels", "Ground Defensive Duels"),
    col("ground_defensive_duels_won", "Ground Defensive duels Won"),
    col("perc_ground_defensive_duels_won", "Perc Ground Defensive Duels Won"),
    col("loose_ball_duels", "Loose Ball Duels"),
    col("loose_balls_won", "Loose Balls Won"),
    col("perc_loose_balls_won", "Perc Loose Balls Won"),
    col("sliding_tackles", "Sliding Tackles"),
    col("interceptions", "Interceptions"),
    col("clearances", "Clearances"),
    col("blocks", "Blocks"),
    col("possession_regained", "Possession Regained"),
    col("own_goals", "Own Goals"),
    col("gk_balls_attacked", "GK Balls Attacked"),
    col("gk_save_attempts", "GK Save Attempts"),
    col("gk_successful_save_attempts", "GK Successful Save Attempts"),
    col("perc_gk_save_success", "Perc GK Save Success"),
];

/// One player's season line. Ratios are 0 when their denominator is 0; check
/// the matching count column to tell "never attempted" from "always failed".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStatsRow {
    pub player_id: u64,
    pub player_name: String,
    pub matches_played: u32,

    pub total_shots: u32,
    pub accurate_shots: u32,
    pub shot_accuracy: f64,
    pub goals: u32,
    pub shot_conversion: f64,
    pub penalties_taken: u32,
    pub penalties_scored: u32,
    pub penalty_conversion: f64,
    pub free_kick_shots: u32,

    pub total_passes: u32,
    pub accurate_passes: u32,
    pub pass_accuracy: f64,
    pub key_passes: u32,
    pub assists: u32,
    pub crosses: u32,
    pub free_kick_crosses: u32,

    pub run_attempts_with_ball: u32,
    pub successful_runs_with_ball: u32,
    pub perc_successful_runs_with_ball: f64,
    pub dribbles: u32,

    pub aerial_duels: u32,
    pub aerial_duels_won: u32,
    pub perc_aerial_duels_won: f64,
    pub ground_defensive_duels: u32,
    pub ground_defensive_duels_won: u32,
    pub perc_ground_defensive_duels_won: f64,
    pub loose_ball_duels: u32,
    pub loose_balls_won: u32,
    pub perc_loose_balls_won: f64,

    pub sliding_tackles: u32,
    pub interceptions: u32,
    pub clearances: u32,
    pub blocks: u32,
    pub possession_regained: u32,
    pub own_goals: u32,

    pub gk_balls_attacked: u32,
    pub gk_save_attempts: u32,
    pub gk_successful_save_attempts: u32,
    pub perc_gk_save_success: f64,
}

impl PlayerStatsRow {
    /// Values in `PLAYER_STAT_COLUMNS` order.
    pub fn values(&self) -> [f64; STAT_COUNT] {
        [
            self.matches_played as f64,
            self.total_shots as f64,
            self.accurate_shots as f64,
            self.shot_accuracy,
            self.goals as f64,
            self.shot_conversion,
            self.penalties_taken as f64,
            self.penalties_scored as f64,
            self.penalty_conversion,
            self.free_kick_shots as f64,
            self.total_passes as f64,
            self.accurate_passes as f64,
            self.pass_accuracy,
            self.key_passes as f64,
            self.assists as f64,
            self.crosses as f64,
            self.free_kick_crosses as f64,
            self.run_attempts_with_ball as f64,
            self.successful_runs_with_ball as f64,
            self.perc_successful_runs_with_ball,
            self.dribbles as f64,
            self.aerial_duels as f64,
            self.aerial_duels_won as f64,
            self.perc_aerial_duels_won,
            self.ground_defensive_duels as f64,
            self.ground_defensive_duels_won as f64,
            self.perc_ground_defensive_duels_won,
            self.loose_ball_duels as f64,
            self.loose_balls_won as f64,
            self.perc_loose_balls_won,
            self.sliding_tackles as f64,
            self.interceptions as f64,
            self.clearances as f64,
            self.blocks as f64,
            self.possession_regained as f64,
            self.own_goals as f64,
            self.gk_balls_attacked as f64,
            self.gk_save_attempts as f64,
            self.gk_successful_save_attempts as f64,
            self.perc_gk_save_success,
        ]
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        let idx = PLAYER_STAT_COLUMNS.iter().position(|c| c.key == key)?;
        Some(self.values()[idx])
    }
}

type Table<T> = BTreeMap<u64, T>;

#[derive(Debug, Clone, Default)]
struct Appearance {
    name: String,
    matches: HashSet<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ShotTotals {
    total: u32,
    accurate: u32,
    goals: u32,
    penalties_taken: u32,
    penalties_scored: u32,
    free_kick: u32,
}

impl ShotTotals {
    fn accuracy(&self) -> Option<f64> {
        ratio(self.accurate, self.total)
    }

    fn conversion(&self) -> Option<f64> {
        ratio(self.goals, self.total)
    }

    fn penalty_conversion(&self) -> Option<f64> {
        ratio(self.penalties_scored, self.penalties_taken)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PassTotals {
    total: u32,
    accurate: u32,
    key_passes: u32,
    crosses: u32,
    free_kick_crosses: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct CarryTotals {
    attempts: u32,
    successful: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct DuelTotals {
    attempts: u32,
    won: u32,
}

impl DuelTotals {
    fn won_ratio(&self) -> Option<f64> {
        ratio(self.won, self.attempts)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GoalkeeperTotals {
    balls_attacked: u32,
    save_attempts: u32,
    successful_saves: u32,
}

#[derive(Debug, Default)]
struct CategoryTables {
    appearances: Table<Appearance>,
    shots: Table<ShotTotals>,
    passes: Table<PassTotals>,
    assists: Table<u32>,
    carries: Table<CarryTotals>,
    dribbles: Table<u32>,
    aerial: Table<DuelTotals>,
    ground_defending: Table<DuelTotals>,
    loose_ball: Table<DuelTotals>,
    interceptions: Table<u32>,
    sliding_tackles: Table<u32>,
    clearances: Table<u32>,
    recoveries: Table<u32>,
    blocks: Table<u32>,
    own_goals: Table<u32>,
    goalkeeping: Table<GoalkeeperTotals>,
}

impl CategoryTables {
    fn compute(events: &[Event]) -> Self {
        let mut tables = CategoryTables::default();
        {
            let CategoryTables {
                appearances,
                shots,
                passes,
                assists,
                carries,
                dribbles,
                aerial,
                ground_defending,
                loose_ball,
                interceptions,
                sliding_tackles,
                clearances,
                recoveries,
                blocks,
                own_goals,
                goalkeeping,
            } = &mut tables;
            rayon::scope(|s| {
                s.spawn(move |_| *appearances = appearance_table(events));
                s.spawn(move |_| *shots = shot_table(events));
                s.spawn(move |_| *passes = pass_table(events));
                s.spawn(move |_| *assists = assist_table(events));
                s.spawn(move |_| *carries = carry_table(events));
                s.spawn(move |_| {
                    *dribbles = count_table(events, |k| {
                        matches!(k, EventKind::Dribble(d) if d.is_complete())
                    })
                });
                s.spawn(move |_| *aerial = duel_table(events, DuelCategory::Aerial));
                s.spawn(move |_| {
                    *ground_defending = duel_table(events, DuelCategory::GroundDefending)
                });
                s.spawn(move |_| *loose_ball = duel_table(events, DuelCategory::LooseBall));
                s.spawn(move |_| {
                    *interceptions = count_table(events, |k| matches!(k, EventKind::Interception))
                });
                // Counted from Block events; the upstream feed has no tackle type.
                s.spawn(move |_| {
                    *sliding_tackles = count_table(events, |k| matches!(k, EventKind::Block))
                });
                s.spawn(move |_| {
                    *clearances = count_table(events, |k| matches!(k, EventKind::Clearance))
                });
                s.spawn(move |_| {
                    *recoveries = count_table(events, |k| matches!(k, EventKind::BallRecovery))
                });
                s.spawn(move |_| *blocks = count_table(events, |k| matches!(k, EventKind::Block)));
                s.spawn(move |_| {
                    *own_goals = count_table(events, |k| {
                        matches!(k, EventKind::Shot(shot) if shot.is_own_goal())
                    })
                });
                s.spawn(move |_| *goalkeeping = goalkeeper_table(events));
            });
        }
        tables
    }

    // Outer merge key set: every player id present in any category.
    fn player_ids(&self) -> BTreeSet<u64> {
        let mut ids = BTreeSet::new();
        ids.extend(self.appearances.keys());
        ids.extend(self.shots.keys());
        ids.extend(self.passes.keys());
        ids.extend(self.assists.keys());
        ids.extend(self.carries.keys());
        ids.extend(self.dribbles.keys());
        ids.extend(self.aerial.keys());
        ids.extend(self.ground_defending.keys());
        ids.extend(self.loose_ball.keys());
        ids.extend(self.interceptions.keys());
        ids.extend(self.sliding_tackles.keys());
        ids.extend(self.clearances.keys());
        ids.extend(self.recoveries.keys());
        ids.extend(self.blocks.keys());
        ids.extend(self.own_goals.keys());
        ids.extend(self.goalkeeping.keys());
        ids
    }

    fn merge(&self, player_id: u64) -> PlayerStatsRow {
        let appearance = self.appearances.get(&player_id);
        let shots = lookup(&self.shots, player_id);
        let passes = lookup(&self.passes, player_id);
        let carries = lookup(&self.carries, player_id);
        let aerial = lookup(&self.aerial, player_id);
        let ground = lookup(&self.ground_defending, player_id);
        let loose = lookup(&self.loose_ball, player_id);
        let gk = lookup(&self.goalkeeping, player_id);

        PlayerStatsRow {
            player_id,
            player_name: appearance.map(|a| a.name.clone()).unwrap_or_default(),
            matches_played: appearance.map_or(0, |a| a.matches.len() as u32),

            total_shots: shots.total,
            accurate_shots: shots.accurate,
            shot_accuracy: fill(shots.accuracy()),
            goals: shots.goals,
            shot_conversion: fill(shots.conversion()),
            penalties_taken: shots.penalties_taken,
            penalties_scored: shots.penalties_scored,
            penalty_conversion: fill(shots.penalty_conversion()),
            free_kick_shots: shots.free_kick,

            total_passes: passes.total,
            accurate_passes: passes.accurate,
            pass_accuracy: fill(ratio(passes.accurate, passes.total)),
            key_passes: passes.key_passes,
            assists: lookup(&self.assists, player_id),
            crosses: passes.crosses,
            free_kick_crosses: passes.free_kick_crosses,

            run_attempts_with_ball: carries.attempts,
            successful_runs_with_ball: carries.successful,
            perc_successful_runs_with_ball: fill(ratio(carries.successful, carries.attempts)),
            dribbles: lookup(&self.dribbles, player_id),

            aerial_duels: aerial.attempts,
            aerial_duels_won: aerial.won,
            perc_aerial_duels_won: fill(aerial.won_ratio()),
            ground_defensive_duels: ground.attempts,
            ground_defensive_duels_won: ground.won,
            perc_ground_defensive_duels_won: fill(ground.won_ratio()),
            loose_ball_duels: loose.attempts,
            loose_balls_won: loose.won,
            perc_loose_balls_won: fill(loose.won_ratio()),

            sliding_tackles: lookup(&self.sliding_tackles, player_id),
            interceptions: lookup(&self.interceptions, player_id),
            clearances: lookup(&self.clearances, player_id),
            blocks: lookup(&self.blocks, player_id),
            possession_regained: lookup(&self.recoveries, player_id),
            own_goals: lookup(&self.own_goals, player_id),

            gk_balls_attacked: gk.balls_attacked,
            gk_save_attempts: gk.save_attempts,
            gk_successful_save_attempts: gk.successful_saves,
            perc_gk_save_success: fill(ratio(gk.successful_saves, gk.save_attempts)),
        }
    }
}

/// Builds one row per player seen in `events`, sorted by player id.
///
/// Each statistic family is computed on its own and the results are
/// outer-merged on player id, so a player who only ever passed still gets a
/// full row with zero shooting and defensive numbers. Events without a player
/// are ignored.
pub fn aggregate_player_stats(events: &[Event]) -> Vec<PlayerStatsRow> {
    let tables = CategoryTables::compute(events);
    tables
        .player_ids()
        .into_iter()
        .map(|id| tables.merge(id))
        .collect()
}

fn ratio(numerator: u32, denominator: u32) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64)
}

fn fill(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn lookup<T: Copy + Default>(table: &Table<T>, player_id: u64) -> T {
    table.get(&player_id).copied().unwrap_or_default()
}

fn with_player(events: &[Event]) -> impl Iterator<Item = (u64, &Event)> {
    events
        .iter()
        .filter_map(|e| e.player_id().map(|id| (id, e)))
}

fn appearance_table(events: &[Event]) -> Table<Appearance> {
    let mut table: Table<Appearance> = BTreeMap::new();
    for (id, event) in with_player(events) {
        let entry = table.entry(id).or_default();
        entry.matches.insert(event.match_id);
        if let Some(player) = event.player.as_ref() {
            entry.name.clone_from(&player.name);
        }
    }
    table
}

fn count_table(events: &[Event], pred: impl Fn(&EventKind) -> bool) -> Table<u32> {
    let mut table = BTreeMap::new();
    for (id, event) in with_player(events) {
        if pred(&event.kind) {
            *table.entry(id).or_insert(0) += 1;
        }
    }
    table
}

fn shot_table(events: &[Event]) -> Table<ShotTotals> {
    let mut table: Table<ShotTotals> = BTreeMap::new();
    for (id, event) in with_player(events) {
        let EventKind::Shot(shot) = &event.kind else {
            continue;
        };
        let t = table.entry(id).or_default();
        t.total += 1;
        t.accurate += u32::from(shot.is_accurate());
        t.goals += u32::from(shot.is_goal());
        t.penalties_taken += u32::from(shot.is_penalty());
        t.penalties_scored += u32::from(shot.is_penalty() && shot.is_goal());
        t.free_kick += u32::from(shot.is_free_kick());
    }
    table
}

fn pass_table(events: &[Event]) -> Table<PassTotals> {
    let mut table: Table<PassTotals> = BTreeMap::new();
    for (id, event) in with_player(events) {
        let EventKind::Pass(pass) = &event.kind else {
            continue;
        };
        let t = table.entry(id).or_default();
        t.total += 1;
        t.accurate += u32::from(pass.is_accurate());
        t.key_passes += u32::from(pass.is_key_pass());
        t.crosses += u32::from(pass.is_cross());
        t.free_kick_crosses += u32::from(pass.is_free_kick_cross());
    }
    table
}

// A goal's assisting pass is the one its shot names as key pass, looked up
// within the same match. The assist is counted for that pass's recipient.
fn assist_table(events: &[Event]) -> Table<u32> {
    let mut recipients: HashMap<(u64, &str), u64> = HashMap::new();
    for event in events {
        if let EventKind::Pass(pass) = &event.kind
            && let Some(recipient) = pass.recipient.as_ref()
        {
            recipients.insert((event.match_id, event.id.as_str()), recipient.id);
        }
    }

    let mut table = BTreeMap::new();
    for event in events {
        let EventKind::Shot(shot) = &event.kind else {
            continue;
        };
        if !shot.is_goal() {
            continue;
        }
        let Some(key_pass_id) = shot.key_pass_id.as_deref() else {
            continue;
        };
        if let Some(recipient) = recipients.get(&(event.match_id, key_pass_id)) {
            *table.entry(*recipient).or_insert(0) += 1;
        }
    }
    table
}

// Carries have no outcome upstream, so every attempt is also counted as a success.
fn carry_table(events: &[Event]) -> Table<CarryTotals> {
    let mut table: Table<CarryTotals> = BTreeMap::new();
    for (id, event) in with_player(events) {
        if !matches!(event.kind, EventKind::Carry) {
            continue;
        }
        let t = table.entry(id).or_default();
        t.attempts += 1;
        t.successful += 1;
    }
    table
}

fn duel_table(events: &[Event], category: DuelCategory) -> Table<DuelTotals> {
    let mut table: Table<DuelTotals> = BTreeMap::new();
    for (id, event) in with_player(events) {
        let EventKind::Duel(duel) = &event.kind else {
            continue;
        };
        if duel.category() != Some(category) {
            continue;
        }
        let t = table.entry(id).or_default();
        t.attempts += 1;
        t.won += u32::from(duel.is_won());
    }
    table
}

fn goalkeeper_table(events: &[Event]) -> Table<GoalkeeperTotals> {
    let mut table: Table<GoalkeeperTotals> = BTreeMap::new();
    for (id, event) in with_player(events) {
        let EventKind::GoalKeeper(gk) = &event.kind else {
            continue;
        };
        let t = table.entry(id).or_default();
        t.balls_attacked += 1;
        t.save_attempts += u32::from(gk.is_save_attempt());
        t.successful_saves += u32::from(gk.is_success());
    }
    table
}
