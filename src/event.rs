use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const TYPE_SHOT: &str = "Shot";
pub const TYPE_PASS: &str = "Pass";
pub const TYPE_DUEL: &str = "Duel";
pub const TYPE_DRIBBLE: &str = "Dribble";
pub const TYPE_GOAL_KEEPER: &str = "Goal Keeper";
pub const TYPE_CARRY: &str = "Carry";
pub const TYPE_INTERCEPTION: &str = "Interception";
pub const TYPE_CLEARANCE: &str = "Clearance";
pub const TYPE_BLOCK: &str = "Block";
pub const TYPE_BALL_RECOVERY: &str = "Ball Recovery";

pub const OUTCOME_GOAL: &str = "Goal";
pub const OUTCOME_ON_TARGET: &str = "On Target";
pub const OUTCOME_SAVED: &str = "Saved";
pub const OUTCOME_OWN_GOAL: &str = "Own Goal";
pub const OUTCOME_WON: &str = "Won";
pub const OUTCOME_COMPLETE: &str = "Complete";
pub const OUTCOME_SUCCESS: &str = "Success";

pub const SUBTYPE_PENALTY: &str = "Penalty";
pub const SUBTYPE_FREE_KICK: &str = "Free Kick";
pub const SUBTYPE_KEY_PASS: &str = "Key Pass";
pub const SUBTYPE_SHOT_SAVED: &str = "Shot Saved";
pub const HEIGHT_HIGH_PASS: &str = "High Pass";

pub const DUEL_AERIAL: &str = "Aerial Duel";
pub const DUEL_GROUND_DEFENDING: &str = "Ground defending duel";
pub const DUEL_LOOSE_BALL: &str = "Loose Ball";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed event record: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("{kind} event is missing its payload")]
    MissingPayload { kind: String },
    #[error("{kind} event has an invalid payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

impl Label {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

fn label_is(label: &Option<Label>, name: &str) -> bool {
    label.as_ref().is_some_and(|l| l.name == name)
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShotDetail {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pass_id: Option<String>,
}

impl ShotDetail {
    pub fn is_goal(&self) -> bool {
        label_is(&self.outcome, OUTCOME_GOAL)
    }

    pub fn is_accurate(&self) -> bool {
        self.is_goal()
            || label_is(&self.outcome, OUTCOME_ON_TARGET)
            || label_is(&self.outcome, OUTCOME_SAVED)
    }

    pub fn is_own_goal(&self) -> bool {
        label_is(&self.outcome, OUTCOME_OWN_GOAL)
    }

    pub fn is_penalty(&self) -> bool {
        label_is(&self.kind, SUBTYPE_PENALTY)
    }

    pub fn is_free_kick(&self) -> bool {
        label_is(&self.kind, SUBTYPE_FREE_KICK)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PassDetail {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shot_assist: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub goal_assist: bool,
}

impl PassDetail {
    // Completed passes carry no outcome at all.
    pub fn is_accurate(&self) -> bool {
        self.outcome.is_none()
    }

    pub fn is_key_pass(&self) -> bool {
        label_is(&self.kind, SUBTYPE_KEY_PASS)
    }

    pub fn is_cross(&self) -> bool {
        label_is(&self.height, HEIGHT_HIGH_PASS)
    }

    pub fn is_free_kick_cross(&self) -> bool {
        label_is(&self.kind, SUBTYPE_FREE_KICK) && self.is_cross()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DuelCategory {
    Aerial,
    GroundDefending,
    LooseBall,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DuelDetail {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Label>,
}

impl DuelDetail {
    pub fn category(&self) -> Option<DuelCategory> {
        match self.kind.as_ref()?.name.as_str() {
            DUEL_AERIAL => Some(DuelCategory::Aerial),
            DUEL_GROUND_DEFENDING => Some(DuelCategory::GroundDefending),
            DUEL_LOOSE_BALL => Some(DuelCategory::LooseBall),
            _ => None,
        }
    }

    pub fn is_won(&self) -> bool {
        label_is(&self.outcome, OUTCOME_WON)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DribbleDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Label>,
}

impl DribbleDetail {
    pub fn is_complete(&self) -> bool {
        label_is(&self.outcome, OUTCOME_COMPLETE)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalkeeperDetail {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Label>,
}

impl GoalkeeperDetail {
    pub fn is_save_attempt(&self) -> bool {
        label_is(&self.kind, SUBTYPE_SHOT_SAVED)
    }

    pub fn is_success(&self) -> bool {
        label_is(&self.outcome, OUTCOME_SUCCESS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Shot(ShotDetail),
    Pass(PassDetail),
    Duel(DuelDetail),
    Dribble(DribbleDetail),
    GoalKeeper(GoalkeeperDetail),
    Carry,
    Interception,
    Clearance,
    Block,
    BallRecovery,
    Other(String),
}

impl EventKind {
    pub fn type_name(&self) -> &str {
        match self {
            EventKind::Shot(_) => TYPE_SHOT,
            EventKind::Pass(_) => TYPE_PASS,
            EventKind::Duel(_) => TYPE_DUEL,
            EventKind::Dribble(_) => TYPE_DRIBBLE,
            EventKind::GoalKeeper(_) => TYPE_GOAL_KEEPER,
            EventKind::Carry => TYPE_CARRY,
            EventKind::Interception => TYPE_INTERCEPTION,
            EventKind::Clearance => TYPE_CLEARANCE,
            EventKind::Block => TYPE_BLOCK,
            EventKind::BallRecovery => TYPE_BALL_RECOVERY,
            EventKind::Other(name) => name,
        }
    }

    pub fn from_payload(type_name: &str, payload: Option<Value>) -> Result<Self, EventError> {
        let kind = match type_name {
            TYPE_SHOT => EventKind::Shot(detail(type_name, payload)?),
            TYPE_PASS => EventKind::Pass(detail(type_name, payload)?),
            TYPE_DUEL => EventKind::Duel(detail(type_name, payload)?),
            TYPE_DRIBBLE => EventKind::Dribble(detail(type_name, payload)?),
            TYPE_GOAL_KEEPER => EventKind::GoalKeeper(detail(type_name, payload)?),
            TYPE_CARRY => EventKind::Carry,
            TYPE_INTERCEPTION => EventKind::Interception,
            TYPE_CLEARANCE => EventKind::Clearance,
            TYPE_BLOCK => EventKind::Block,
            TYPE_BALL_RECOVERY => EventKind::BallRecovery,
            other => EventKind::Other(other.to_string()),
        };
        Ok(kind)
    }

    pub fn payload(&self) -> Option<Value> {
        let value = match self {
            EventKind::Shot(d) => serde_json::to_value(d),
            EventKind::Pass(d) => serde_json::to_value(d),
            EventKind::Duel(d) => serde_json::to_value(d),
            EventKind::Dribble(d) => serde_json::to_value(d),
            EventKind::GoalKeeper(d) => serde_json::to_value(d),
            _ => return None,
        };
        value.ok()
    }
}

fn detail<T: DeserializeOwned>(type_name: &str, payload: Option<Value>) -> Result<T, EventError> {
    let value = payload.ok_or_else(|| EventError::MissingPayload {
        kind: type_name.to_string(),
    })?;
    serde_json::from_value(value).map_err(|source| EventError::InvalidPayload {
        kind: type_name.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    // Zero until the batch processor tags the event with its match.
    pub match_id: u64,
    pub id: String,
    pub index: u64,
    pub period: u8,
    pub minute: u32,
    pub second: u32,
    pub team: Option<EntityRef>,
    pub player: Option<EntityRef>,
    pub kind: EventKind,
}

impl Event {
    pub fn player_id(&self) -> Option<u64> {
        self.player.as_ref().map(|p| p.id)
    }
}

#[derive(Debug, Default)]
pub struct EventParse {
    pub events: Vec<Event>,
    pub rejected: usize,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(default)]
    index: u64,
    #[serde(default)]
    period: u8,
    #[serde(default)]
    minute: u32,
    #[serde(default)]
    second: u32,
    #[serde(rename = "type")]
    kind: Label,
    #[serde(default)]
    team: Option<EntityRef>,
    #[serde(default)]
    player: Option<EntityRef>,
    #[serde(default)]
    shot: Option<Value>,
    #[serde(default)]
    pass: Option<Value>,
    #[serde(default)]
    duel: Option<Value>,
    #[serde(default)]
    dribble: Option<Value>,
    #[serde(default)]
    goalkeeper: Option<Value>,
}

impl TryFrom<RawEvent> for Event {
    type Error = EventError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let payload = match raw.kind.name.as_str() {
            TYPE_SHOT => raw.shot,
            TYPE_PASS => raw.pass,
            TYPE_DUEL => raw.duel,
            TYPE_DRIBBLE => raw.dribble,
            TYPE_GOAL_KEEPER => raw.goalkeeper,
            _ => None,
        };
        let kind = EventKind::from_payload(&raw.kind.name, payload)?;
        Ok(Event {
            match_id: 0,
            id: raw.id,
            index: raw.index,
            period: raw.period,
            minute: raw.minute,
            second: raw.second,
            team: raw.team,
            player: raw.player,
            kind,
        })
    }
}

pub fn parse_event(value: Value) -> Result<Event, EventError> {
    let raw = serde_json::from_value::<RawEvent>(value).map_err(EventError::Malformed)?;
    Event::try_from(raw)
}

pub fn parse_events_json(raw: &str) -> anyhow::Result<EventParse> {
    let value = serde_json::from_str::<Value>(raw.trim()).context("invalid events json")?;
    let items = match value {
        Value::Null => return Ok(EventParse::default()),
        Value::Array(items) => items,
        _ => return Err(anyhow!("events json is not an array")),
    };

    let mut out = EventParse {
        events: Vec::with_capacity(items.len()),
        rejected: 0,
    };
    for item in items {
        match parse_event(item) {
            Ok(event) => out.events.push(event),
            Err(err) => {
                debug!("rejected event: {err}");
                out.rejected += 1;
            }
        }
    }
    Ok(out)
}
