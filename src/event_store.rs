use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Row, RowAccessor};
use serde_json::Value;
use tracing::{debug, info};

use crate::columnar::{Column, write_table};
use crate::event::{EntityRef, Event, EventKind, EventParse};

pub const DEFAULT_EVENTS_PATH: &str = "streamed_events.parquet";

const PART_PREFIX: &str = "part-";

const EVENT_LOG_SCHEMA: &str = "
    message event_log {
        REQUIRED INT64 match_id;
        REQUIRED BYTE_ARRAY event_id (UTF8);
        REQUIRED INT64 event_index;
        REQUIRED INT32 period;
        REQUIRED INT32 minute;
        REQUIRED INT32 second;
        REQUIRED BYTE_ARRAY type_name (UTF8);
        OPTIONAL INT64 team_id;
        OPTIONAL BYTE_ARRAY team_name (UTF8);
        OPTIONAL INT64 player_id;
        OPTIONAL BYTE_ARRAY player_name (UTF8);
        OPTIONAL BYTE_ARRAY payload (UTF8);
    }
";

const COL_MATCH_ID: usize = 0;
const COL_EVENT_ID: usize = 1;
const COL_INDEX: usize = 2;
const COL_PERIOD: usize = 3;
const COL_MINUTE: usize = 4;
const COL_SECOND: usize = 5;
const COL_TYPE: usize = 6;
const COL_TEAM_ID: usize = 7;
const COL_TEAM_NAME: usize = 8;
const COL_PLAYER_ID: usize = 9;
const COL_PLAYER_NAME: usize = 10;
const COL_PAYLOAD: usize = 11;

/// Writes the accumulated event log, one row per event; the category detail is
/// stored as a JSON string so the table stays flat.
pub fn write_event_log(path: &Path, events: &[Event]) -> Result<usize> {
    let mut match_ids = Vec::with_capacity(events.len());
    let mut event_ids = Vec::with_capacity(events.len());
    let mut indexes = Vec::with_capacity(events.len());
    let mut periods = Vec::with_capacity(events.len());
    let mut minutes = Vec::with_capacity(events.len());
    let mut seconds = Vec::with_capacity(events.len());
    let mut types = Vec::with_capacity(events.len());
    let mut team_ids = Vec::with_capacity(events.len());
    let mut team_names = Vec::with_capacity(events.len());
    let mut player_ids = Vec::with_capacity(events.len());
    let mut player_names = Vec::with_capacity(events.len());
    let mut payloads = Vec::with_capacity(events.len());

    for e in events {
        match_ids.push(e.match_id as i64);
        event_ids.push(e.id.clone());
        indexes.push(e.index as i64);
        periods.push(i32::from(e.period));
        minutes.push(e.minute as i32);
        seconds.push(e.second as i32);
        types.push(e.kind.type_name().to_string());
        team_ids.push(e.team.as_ref().map(|t| t.id as i64));
        team_names.push(e.team.as_ref().map(|t| t.name.clone()));
        player_ids.push(e.player.as_ref().map(|p| p.id as i64));
        player_names.push(e.player.as_ref().map(|p| p.name.clone()));
        payloads.push(e.kind.payload().map(|v| v.to_string()));
    }

    write_table(
        path,
        EVENT_LOG_SCHEMA,
        vec![
            Column::Int64(match_ids),
            Column::Text(event_ids),
            Column::Int64(indexes),
            Column::Int32(periods),
            Column::Int32(minutes),
            Column::Int32(seconds),
            Column::Text(types),
            Column::OptInt64(team_ids),
            Column::OptText(team_names),
            Column::OptInt64(player_ids),
            Column::OptText(player_names),
            Column::OptText(payloads),
        ],
    )
    .with_context(|| format!("write event log {}", path.display()))?;
    info!("wrote {} events to {}", events.len(), path.display());
    Ok(events.len())
}

/// Directory of Parquet part files, one per processed batch. Parts are never
/// rewritten, so a restarted process adds to what earlier runs stored.
#[derive(Debug)]
pub struct EventStore {
    dir: PathBuf,
    run_id: i64,
    next_part: usize,
}

impl EventStore {
    pub fn open(dir: &Path) -> Result<Self> {
        if dir.is_file() {
            return Err(anyhow!(
                "event store {} is a file, expected a directory",
                dir.display()
            ));
        }
        fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
        let mut store = Self {
            dir: dir.to_path_buf(),
            run_id: Utc::now().timestamp_millis(),
            next_part: 0,
        };
        // Two runs started within the same millisecond must not share part names.
        while store.part_path(0).exists() {
            store.run_id += 1;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn parts_written(&self) -> usize {
        self.next_part
    }

    pub fn write_part(&mut self, events: &[Event]) -> Result<PathBuf> {
        let path = self.part_path(self.next_part);
        write_event_log(&path, events)?;
        self.next_part += 1;
        Ok(path)
    }

    fn part_path(&self, part: usize) -> PathBuf {
        self.dir
            .join(format!("{PART_PREFIX}{:013}-{part:05}.parquet", self.run_id))
    }
}

/// Part files of a store directory in write order.
pub fn part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?;
    let mut parts = Vec::new();
    for entry in entries {
        let path = entry.context("read dir entry")?.path();
        let is_part = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(PART_PREFIX) && n.ends_with(".parquet"));
        if is_part && path.is_file() {
            parts.push(path);
        }
    }
    parts.sort();
    Ok(parts)
}

/// Reads a single file written by `write_event_log`, or every part of an
/// `EventStore` directory. Rows whose payload no longer validates are counted
/// in `rejected` instead of failing the read.
pub fn read_event_log(path: &Path) -> Result<EventParse> {
    if !path.is_dir() {
        return read_event_file(path);
    }
    let mut out = EventParse::default();
    for part in part_files(path)? {
        let parsed = read_event_file(&part)?;
        out.events.extend(parsed.events);
        out.rejected += parsed.rejected;
    }
    Ok(out)
}

fn read_event_file(path: &Path) -> Result<EventParse> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open parquet reader events")?;
    let iter = reader.get_row_iter(None).context("iterate event rows")?;

    let mut out = EventParse::default();
    for row in iter {
        let row = row.context("read event row")?;
        match event_from_row(&row) {
            Ok(event) => out.events.push(event),
            Err(err) => {
                debug!("rejected stored event: {err:#}");
                out.rejected += 1;
            }
        }
    }
    Ok(out)
}

fn event_from_row(row: &Row) -> Result<Event> {
    let type_name = row.get_string(COL_TYPE).context("type_name")?.clone();
    let payload = match row.get_string(COL_PAYLOAD).ok() {
        Some(raw) => Some(serde_json::from_str::<Value>(raw).context("payload json")?),
        None => None,
    };
    let kind = EventKind::from_payload(&type_name, payload)?;

    Ok(Event {
        match_id: row.get_long(COL_MATCH_ID).context("match_id")? as u64,
        id: row.get_string(COL_EVENT_ID).context("event_id")?.clone(),
        index: row.get_long(COL_INDEX).context("event_index")? as u64,
        period: row.get_int(COL_PERIOD).context("period")? as u8,
        minute: row.get_int(COL_MINUTE).context("minute")? as u32,
        second: row.get_int(COL_SECOND).context("second")? as u32,
        team: entity(row, COL_TEAM_ID, COL_TEAM_NAME),
        player: entity(row, COL_PLAYER_ID, COL_PLAYER_NAME),
        kind,
    })
}

fn entity(row: &Row, id_col: usize, name_col: usize) -> Option<EntityRef> {
    let id = row.get_long(id_col).ok()?;
    let name = row
        .get_string(name_col)
        .ok()
        .cloned()
        .unwrap_or_default();
    Some(EntityRef {
        id: id as u64,
        name,
    })
}
