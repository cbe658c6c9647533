use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::batch::DEFAULT_BATCH_DELAY;
use crate::buffer::DEFAULT_BUFFER_SIZE;
use crate::catalog::STATSBOMB_OPEN_DATA_URL;
use crate::discovery::AllowList;
use crate::event_store::DEFAULT_EVENTS_PATH;
use crate::ledger::{DEFAULT_RESIDENT_CAPACITY, default_ledger_path};
use crate::pipeline::PipelineSettings;

const DEFAULT_COMPETITION_IDS: &[u32] = &[11];
const DEFAULT_SEASON_IDS: &[u32] = &[1, 2];
const DEFAULT_POLL_SECS: u64 = 5;
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_FAKE_SEED: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Statsbomb,
    Fake,
}

impl SourceKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "statsbomb" | "" => Ok(SourceKind::Statsbomb),
            "fake" => Ok(SourceKind::Fake),
            other => Err(anyhow!("unknown SCOUT_SOURCE {other:?} (statsbomb | fake)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub competition_ids: Vec<u32>,
    pub season_ids: Vec<u32>,
    pub buffer_size: usize,
    pub batch_delay: Duration,
    pub poll_interval: Duration,
    pub metrics_addr: SocketAddr,
    pub events_out: PathBuf,
    pub ledger_db: PathBuf,
    pub ledger_capacity: usize,
    pub source: SourceKind,
    pub statsbomb_url: String,
    pub fake_seed: u64,
    pub max_rounds: Option<usize>,
}

impl StreamConfig {
    /// Environment (after `.env` loading) overridden by process arguments.
    pub fn from_env() -> Result<Self> {
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        Self::resolve(&args, |key| std::env::var(key).ok())
    }

    pub fn resolve(args: &[String], env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_nonempty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let competition_ids = arg_value(args, "--competitions")
            .or_else(|| env_nonempty("SCOUT_COMPETITION_IDS"))
            .map(|raw| parse_ids(&raw))
            .unwrap_or_else(|| DEFAULT_COMPETITION_IDS.to_vec());
        let season_ids = arg_value(args, "--seasons")
            .or_else(|| env_nonempty("SCOUT_SEASON_IDS"))
            .map(|raw| parse_ids(&raw))
            .unwrap_or_else(|| DEFAULT_SEASON_IDS.to_vec());
        if competition_ids.is_empty() || season_ids.is_empty() {
            return Err(anyhow!("no competition or season ids resolved"));
        }

        let buffer_size = parse_number::<usize>(
            arg_value(args, "--buffer-size").or_else(|| env_nonempty("SCOUT_BUFFER_SIZE")),
            "buffer size",
        )?
        .unwrap_or(DEFAULT_BUFFER_SIZE)
        .max(1);
        let batch_delay = parse_number::<u64>(env_nonempty("SCOUT_BATCH_DELAY_MS"), "batch delay")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BATCH_DELAY);
        let poll_interval = Duration::from_secs(
            parse_number::<u64>(env_nonempty("SCOUT_POLL_SECS"), "poll interval")?
                .unwrap_or(DEFAULT_POLL_SECS)
                .max(1),
        );

        let metrics_raw =
            env_nonempty("SCOUT_METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = metrics_raw
            .trim()
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid SCOUT_METRICS_ADDR {metrics_raw:?}"))?;

        let events_out = arg_value(args, "--out")
            .or_else(|| env_nonempty("SCOUT_EVENTS_OUT"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENTS_PATH));
        let ledger_db = arg_value(args, "--db")
            .or_else(|| env_nonempty("SCOUT_LEDGER_DB"))
            .map(PathBuf::from)
            .unwrap_or_else(default_ledger_path);
        let ledger_capacity =
            parse_number::<usize>(env_nonempty("SCOUT_LEDGER_CAPACITY"), "ledger capacity")?
                .unwrap_or(DEFAULT_RESIDENT_CAPACITY)
                .max(1);

        let source = if has_flag(args, "--fake") {
            SourceKind::Fake
        } else {
            env_nonempty("SCOUT_SOURCE")
                .map(|raw| SourceKind::parse(&raw))
                .transpose()?
                .unwrap_or(SourceKind::Statsbomb)
        };
        let statsbomb_url = env_nonempty("SCOUT_STATSBOMB_URL")
            .map(|raw| raw.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| STATSBOMB_OPEN_DATA_URL.to_string());
        let fake_seed = parse_number::<u64>(env_nonempty("SCOUT_FAKE_SEED"), "fake seed")?
            .unwrap_or(DEFAULT_FAKE_SEED);
        let max_rounds = parse_number::<usize>(
            arg_value(args, "--max-rounds").or_else(|| env_nonempty("SCOUT_MAX_ROUNDS")),
            "max rounds",
        )?
        .filter(|n| *n > 0);

        Ok(Self {
            competition_ids,
            season_ids,
            buffer_size,
            batch_delay,
            poll_interval,
            metrics_addr,
            events_out,
            ledger_db,
            ledger_capacity,
            source,
            statsbomb_url,
            fake_seed,
            max_rounds,
        })
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(self.competition_ids.clone(), self.season_ids.clone())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            allow: self.allow_list(),
            buffer_size: self.buffer_size,
            batch_delay: self.batch_delay,
            poll_interval: self.poll_interval,
        }
    }
}

/// `--name=value` or `--name value`; blank values are ignored.
pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn parse_number<T: std::str::FromStr>(raw: Option<String>, what: &str) -> Result<Option<T>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| anyhow!("invalid {what}: {raw:?}"))
}

pub fn parse_ids(raw: &str) -> Vec<u32> {
    let ids = raw
        .split([',', ';', ' '])
        .filter_map(|part| part.trim().parse::<u32>().ok())
        .filter(|id| *id != 0)
        .collect::<Vec<_>>();
    dedup_ids(ids)
}

fn dedup_ids(ids: Vec<u32>) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(args: &[&str], env: &[(&str, &str)]) -> Result<StreamConfig> {
        let args = args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let env = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        StreamConfig::resolve(&args, |key| env.get(key).cloned())
    }

    #[test]
    fn defaults_without_env_or_args() {
        let cfg = resolve(&[], &[]).expect("defaults");
        assert_eq!(cfg.competition_ids, vec![11]);
        assert_eq!(cfg.season_ids, vec![1, 2]);
        assert_eq!(cfg.buffer_size, 5);
        assert_eq!(cfg.batch_delay, Duration::from_millis(200));
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.metrics_addr.port(), 8000);
        assert_eq!(cfg.events_out, PathBuf::from("streamed_events.parquet"));
        assert_eq!(cfg.source, SourceKind::Statsbomb);
        assert_eq!(cfg.max_rounds, None);
    }

    #[test]
    fn args_override_env() {
        let cfg = resolve(
            &["--competitions=43", "--seasons", "3;3 0", "--fake", "--out", "x.parquet"],
            &[
                ("SCOUT_COMPETITION_IDS", "11,12"),
                ("SCOUT_SOURCE", "statsbomb"),
                ("SCOUT_BUFFER_SIZE", "0"),
                ("SCOUT_MAX_ROUNDS", "2"),
            ],
        )
        .expect("config");
        assert_eq!(cfg.competition_ids, vec![43]);
        assert_eq!(cfg.season_ids, vec![3]);
        assert_eq!(cfg.source, SourceKind::Fake);
        assert_eq!(cfg.events_out, PathBuf::from("x.parquet"));
        assert_eq!(cfg.buffer_size, 1);
        assert_eq!(cfg.max_rounds, Some(2));
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(resolve(&[], &[("SCOUT_BUFFER_SIZE", "five")]).is_err());
        assert!(resolve(&[], &[("SCOUT_METRICS_ADDR", "nowhere")]).is_err());
        assert!(resolve(&[], &[("SCOUT_SOURCE", "ftp")]).is_err());
        assert!(resolve(&["--seasons=0"], &[]).is_err());
    }

    #[test]
    fn id_lists_drop_zero_and_duplicates() {
        assert_eq!(parse_ids("11, 43;11 0 x 2"), vec![11, 43, 2]);
    }
}
