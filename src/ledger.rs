use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use lru::LruCache;
use rusqlite::{Connection, OptionalExtension, params};

use crate::catalog::MatchInfo;
use crate::http_cache::app_cache_dir;

pub const DEFAULT_RESIDENT_CAPACITY: usize = 10_000;

/// Set of match ids already handed to (or queued for) the batch processor.
///
/// The resident part is an LRU bounded by `capacity`; when a SQLite ledger is
/// attached, ids evicted from memory are still found on disk and survive restarts.
pub struct ProcessedLedger {
    recent: LruCache<u64, ()>,
    conn: Option<Connection>,
}

impl ProcessedLedger {
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            recent: LruCache::new(resident_capacity(capacity)),
            conn: None,
        }
    }

    pub fn open(path: &Path, capacity: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open ledger db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self {
            recent: LruCache::new(resident_capacity(capacity)),
            conn: Some(conn),
        })
    }

    pub fn contains(&mut self, match_id: u64) -> bool {
        if self.recent.get(&match_id).is_some() {
            return true;
        }
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        match durable_contains(conn, match_id) {
            Ok(true) => {
                self.recent.put(match_id, ());
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!(match_id, "ledger lookup failed: {err:#}");
                false
            }
        }
    }

    /// Returns `false` when the id was already known.
    pub fn mark(&mut self, match_id: u64) -> bool {
        if self.contains(match_id) {
            return false;
        }
        self.recent.put(match_id, ());
        true
    }

    /// Drops ids from the resident set so they are rediscovered; durable rows are untouched.
    pub fn forget(&mut self, ids: &[u64]) {
        for id in ids {
            self.recent.pop(id);
        }
    }

    /// Persists a processed batch; `failed` ids are stored too, since they are never retried.
    pub fn commit(&mut self, batch: &[MatchInfo], failed: &[u64]) -> Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(());
        };
        let processed_at = Utc::now().to_rfc3339();
        let tx = conn.transaction().context("begin ledger transaction")?;
        for m in batch {
            let status = if failed.contains(&m.id) { "failed" } else { "ok" };
            tx.execute(
                "INSERT INTO processed_matches(match_id, competition_id, season_id, status, processed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(match_id) DO NOTHING",
                params![
                    m.id as i64,
                    m.competition_id as i64,
                    m.season_id as i64,
                    status,
                    processed_at
                ],
            )
            .context("insert processed match")?;
        }
        tx.commit().context("commit ledger transaction")?;
        Ok(())
    }

    pub fn resident_len(&self) -> usize {
        self.recent.len()
    }

    pub fn durable_len(&self) -> Result<usize> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(0);
        };
        let n = conn
            .query_row("SELECT COUNT(*) FROM processed_matches", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("count processed matches")?;
        Ok(n.max(0) as usize)
    }
}

pub fn default_ledger_path() -> PathBuf {
    app_cache_dir()
        .map(|dir| dir.join("processed_matches.sqlite"))
        .unwrap_or_else(|| PathBuf::from("processed_matches.sqlite"))
}

fn resident_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS processed_matches (
            match_id INTEGER PRIMARY KEY,
            competition_id INTEGER NOT NULL,
            season_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            processed_at TEXT NOT NULL
        );
        "#,
    )
    .context("create ledger schema")?;
    Ok(())
}

fn durable_contains(conn: &Connection, match_id: u64) -> Result<bool> {
    let hit = conn
        .query_row(
            "SELECT 1 FROM processed_matches WHERE match_id = ?1",
            params![match_id as i64],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .context("query processed match")?;
    Ok(hit.is_some())
}
