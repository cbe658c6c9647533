use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use scout_stream::batch::{BatchProcessor, EventLog};
use scout_stream::catalog::{Competition, MatchInfo, MatchSource};
use scout_stream::discovery::{AllowList, discover_new_matches};
use scout_stream::event::{EntityRef, Event, EventKind, EventParse};
use scout_stream::event_store::{EventStore, read_event_log};
use scout_stream::fake_feed::FakeCatalog;
use scout_stream::ledger::ProcessedLedger;
use scout_stream::metrics::PipelineMetrics;
use scout_stream::pipeline::{Pipeline, PipelineSettings};

#[derive(Default)]
struct StubSource {
    competitions: Vec<Competition>,
    matches: Mutex<HashMap<(u32, u32), Vec<MatchInfo>>>,
    failing_matches: HashSet<u64>,
    failing_pairs: HashSet<(u32, u32)>,
    event_calls: Mutex<Vec<u64>>,
    match_calls: Mutex<Vec<(u32, u32)>>,
}

impl StubSource {
    fn with_pairs(pairs: &[(u32, u32)]) -> Self {
        Self {
            competitions: pairs
                .iter()
                .map(|(c, s)| Competition {
                    competition_id: *c,
                    season_id: *s,
                    competition_name: format!("c{c}"),
                    season_name: format!("s{s}"),
                })
                .collect(),
            ..Self::default()
        }
    }

    fn add_matches(&self, competition_id: u32, season_id: u32, ids: impl IntoIterator<Item = u64>) {
        let mut matches = self.matches.lock().expect("matches lock");
        let entry = matches.entry((competition_id, season_id)).or_default();
        entry.extend(
            ids.into_iter()
                .map(|id| MatchInfo::new(id, competition_id, season_id)),
        );
    }

    fn event_calls(&self) -> Vec<u64> {
        self.event_calls.lock().expect("calls lock").clone()
    }
}

impl MatchSource for StubSource {
    fn competitions(&self) -> Result<Vec<Competition>> {
        Ok(self.competitions.clone())
    }

    fn matches(&self, competition_id: u32, season_id: u32) -> Result<Vec<MatchInfo>> {
        self.match_calls
            .lock()
            .expect("calls lock")
            .push((competition_id, season_id));
        if self.failing_pairs.contains(&(competition_id, season_id)) {
            return Err(anyhow!("pair unavailable"));
        }
        Ok(self
            .matches
            .lock()
            .expect("matches lock")
            .get(&(competition_id, season_id))
            .cloned()
            .unwrap_or_default())
    }

    fn events(&self, match_id: u64) -> Result<EventParse> {
        self.event_calls.lock().expect("calls lock").push(match_id);
        if self.failing_matches.contains(&match_id) {
            return Err(anyhow!("events unavailable for {match_id}"));
        }
        let events = (0..3)
            .map(|i| Event {
                match_id: 0,
                id: format!("{match_id}-{i}"),
                index: i + 1,
                period: 1,
                minute: i as u32,
                second: 0,
                team: None,
                player: Some(EntityRef {
                    id: 100 + i,
                    name: format!("player {i}"),
                }),
                kind: EventKind::Carry,
            })
            .collect();
        Ok(EventParse {
            events,
            rejected: 0,
        })
    }
}

fn settings(buffer_size: usize) -> PipelineSettings {
    PipelineSettings {
        allow: AllowList::new(vec![11], vec![1, 2]),
        buffer_size,
        batch_delay: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
    }
}

fn pipeline(source: &Arc<StubSource>, buffer_size: usize) -> (Pipeline, PipelineMetrics) {
    let metrics = PipelineMetrics::new().expect("metrics");
    let source: Arc<dyn MatchSource> = source.clone();
    let pipeline = Pipeline::new(
        source,
        settings(buffer_size),
        ProcessedLedger::in_memory(64),
        metrics.clone(),
    );
    (pipeline, metrics)
}

#[tokio::test]
async fn failed_fetches_are_excluded_and_events_tagged() {
    let mut stub = StubSource::with_pairs(&[(11, 1)]);
    stub.failing_matches = HashSet::from([3, 6]);
    let stub = Arc::new(stub);
    stub.add_matches(11, 1, 1..=7);

    let (mut pipeline, metrics) = pipeline(&stub, 5);
    let summary = pipeline.run_round().await;

    assert_eq!(summary.discovered, 7);
    assert_eq!(summary.batches.len(), 2);
    assert_eq!(summary.batches[0].match_ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(summary.batches[1].match_ids, vec![6, 7]);
    assert_eq!(summary.batches[1].failed_ids(), vec![6]);

    let log = pipeline.event_log();
    let tagged = log.events().iter().map(|e| e.match_id).collect::<HashSet<_>>();
    assert_eq!(tagged, HashSet::from([1, 2, 4, 5, 7]));
    assert_eq!(log.len(), 5 * 3);
    for event in log.events() {
        assert!(event.id.starts_with(&format!("{}-", event.match_id)));
    }

    assert_eq!(metrics.matches_processed.get(), 7);
    assert_eq!(metrics.batches_processed.get(), 2);
    assert_eq!(metrics.fetch_failures.get(), 2);
    assert_eq!(metrics.events_ingested.get(), 15);
    assert_eq!(metrics.buffer_size.get(), 0);
    assert_eq!(metrics.discovery_rounds.get(), 1);
}

#[tokio::test]
async fn no_match_is_processed_twice_across_polls() {
    let stub = Arc::new(StubSource::with_pairs(&[(11, 1), (11, 2)]));
    stub.add_matches(11, 1, 1..=4);
    stub.add_matches(11, 2, 10..=12);

    let (mut pipeline, _) = pipeline(&stub, 5);
    pipeline.run_round().await;
    stub.add_matches(11, 1, 5..=6);
    let second = pipeline.run_round().await;
    let third = pipeline.run_round().await;

    assert_eq!(second.discovered, 2);
    assert_eq!(third.discovered, 0);
    assert!(third.batches.is_empty());

    let calls = stub.event_calls();
    let unique = calls.iter().copied().collect::<HashSet<_>>();
    assert_eq!(calls.len(), unique.len());
    assert_eq!(unique.len(), 9);
    assert_eq!(pipeline.rounds(), 3);
}

#[tokio::test]
async fn buffer_flushes_at_threshold_and_round_end() {
    let stub = Arc::new(StubSource::with_pairs(&[(11, 1)]));
    stub.add_matches(11, 1, 1..=3);

    let (mut pipeline, _) = pipeline(&stub, 2);
    let summary = pipeline.run_round().await;

    let sizes = summary
        .batches
        .iter()
        .map(|b| b.match_ids.len())
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![2, 1]);
    assert_eq!(pipeline.buffered(), 0);
    assert_eq!(pipeline.event_log().batches(), 2);
}

#[tokio::test]
async fn pairs_outside_allow_list_are_never_queried() {
    let stub = Arc::new(StubSource::with_pairs(&[(11, 1), (11, 4), (43, 3)]));
    stub.add_matches(11, 4, [40]);
    stub.add_matches(43, 3, [50]);
    stub.add_matches(11, 1, [1]);

    let (mut pipeline, _) = pipeline(&stub, 5);
    let summary = pipeline.run_round().await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(stub.event_calls(), vec![1]);
    assert_eq!(*stub.match_calls.lock().expect("calls lock"), vec![(11, 1)]);
}

#[tokio::test]
async fn failing_pair_does_not_stop_discovery() {
    let mut stub = StubSource::with_pairs(&[(11, 1), (11, 2)]);
    stub.failing_pairs = HashSet::from([(11, 1)]);
    let stub = Arc::new(stub);
    stub.add_matches(11, 2, [7, 8]);

    let source: Arc<dyn MatchSource> = stub.clone();
    let allow = AllowList::new(vec![11], vec![1, 2]);
    let mut ledger = ProcessedLedger::in_memory(16);
    let round = discover_new_matches(&source, &allow, &mut ledger).await;

    assert_eq!(round.pairs_total, 2);
    assert_eq!(round.pairs_succeeded, 1);
    assert_eq!(round.errors.len(), 1);
    assert_eq!(
        round.matches.iter().map(|m| m.id).collect::<Vec<_>>(),
        vec![7, 8]
    );
}

#[tokio::test]
async fn batch_with_only_failures_appends_nothing() {
    let mut stub = StubSource::with_pairs(&[(11, 1)]);
    stub.failing_matches = HashSet::from([1, 2]);
    let source: Arc<dyn MatchSource> = Arc::new(stub);
    let metrics = PipelineMetrics::new().expect("metrics");
    let processor = BatchProcessor::new(source, Duration::ZERO, metrics.clone());

    let mut log = EventLog::default();
    let batch = vec![MatchInfo::new(1, 11, 1), MatchInfo::new(2, 11, 1)];
    let report = processor.process(&batch, &mut log).await;

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed_ids(), vec![1, 2]);
    assert!(log.is_empty());
    assert_eq!(log.batches(), 0);
    assert_eq!(metrics.batches_processed.get(), 1);
    assert_eq!(metrics.fetch_failures.get(), 2);
}

#[tokio::test]
async fn restart_skips_matches_already_committed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("ledger.sqlite");
    let stub = Arc::new(StubSource::with_pairs(&[(11, 1)]));
    stub.add_matches(11, 1, 1..=3);

    {
        let source: Arc<dyn MatchSource> = stub.clone();
        let ledger = ProcessedLedger::open(&db, 8).expect("ledger");
        let metrics = PipelineMetrics::new().expect("metrics");
        let mut first = Pipeline::new(source, settings(5), ledger, metrics);
        first.run_round().await;
        assert_eq!(first.event_log().len(), 9);
    }

    let source: Arc<dyn MatchSource> = stub.clone();
    let ledger = ProcessedLedger::open(&db, 8).expect("ledger");
    let metrics = PipelineMetrics::new().expect("metrics");
    let mut second = Pipeline::new(source, settings(5), ledger, metrics);
    let summary = second.run_round().await;

    assert_eq!(summary.discovered, 0);
    assert_eq!(stub.event_calls(), vec![1, 2, 3]);
}

fn stored_pipeline(source: &Arc<StubSource>, db: &Path, events_dir: &Path) -> Pipeline {
    let source: Arc<dyn MatchSource> = source.clone();
    let ledger = ProcessedLedger::open(db, 8).expect("ledger");
    let store = EventStore::open(events_dir).expect("event store");
    let metrics = PipelineMetrics::new().expect("metrics");
    Pipeline::new(source, settings(5), ledger, metrics).with_store(store)
}

fn stored_match_ids(events_dir: &Path) -> HashSet<u64> {
    read_event_log(events_dir)
        .expect("read stored events")
        .events
        .iter()
        .map(|e| e.match_id)
        .collect()
}

#[tokio::test]
async fn restarted_run_keeps_events_stored_by_earlier_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("ledger.sqlite");
    let events_dir = dir.path().join("streamed_events.parquet");
    let stub = Arc::new(StubSource::with_pairs(&[(11, 1)]));
    stub.add_matches(11, 1, 1..=3);

    {
        let mut first = stored_pipeline(&stub, &db, &events_dir);
        first.run_round().await;
        assert_eq!(first.store().map(EventStore::parts_written), Some(1));
    }

    stub.add_matches(11, 1, 4..=5);
    let mut second = stored_pipeline(&stub, &db, &events_dir);
    let summary = second.run_round().await;

    assert_eq!(summary.discovered, 2);
    assert_eq!(second.event_log().len(), 2 * 3);
    assert_eq!(stored_match_ids(&events_dir), HashSet::from([1, 2, 3, 4, 5]));
    assert_eq!(read_event_log(&events_dir).expect("read").events.len(), 5 * 3);
    assert_eq!(stub.event_calls(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn batch_is_retried_when_its_events_cannot_be_stored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("ledger.sqlite");
    let events_dir = dir.path().join("events");
    let stub = Arc::new(StubSource::with_pairs(&[(11, 1)]));
    stub.add_matches(11, 1, [1, 2]);

    let mut pipeline = stored_pipeline(&stub, &db, &events_dir);
    fs::remove_dir(&events_dir).expect("remove store dir");
    fs::write(&events_dir, b"not a directory").expect("block store dir");

    let blocked = pipeline.run_round().await;
    assert_eq!(blocked.batches.len(), 1);
    assert!(pipeline.event_log().is_empty());
    assert_eq!(pipeline.event_log().batches(), 0);
    assert_eq!(pipeline.ledger_mut().durable_len().expect("count"), 0);

    fs::remove_file(&events_dir).expect("unblock store dir");
    let retried = pipeline.run_round().await;

    assert_eq!(retried.discovered, 2);
    assert_eq!(stub.event_calls(), vec![1, 2, 1, 2]);
    assert_eq!(pipeline.ledger_mut().durable_len().expect("count"), 2);
    assert_eq!(stored_match_ids(&events_dir), HashSet::from([1, 2]));
}

#[tokio::test]
async fn fake_catalog_streams_until_round_limit() {
    let catalog = FakeCatalog::new(11)
        .with_growth(3, 2, 7)
        .with_events_per_match(40)
        .with_failing_matches([FakeCatalog::match_id(11, 1, 1)]);
    let source: Arc<dyn MatchSource> = Arc::new(catalog);
    let metrics = PipelineMetrics::new().expect("metrics");
    let mut pipeline = Pipeline::new(
        source,
        settings(5),
        ProcessedLedger::in_memory(128),
        metrics.clone(),
    );

    let rounds = pipeline.run(Some(4)).await;

    assert_eq!(rounds, 4);
    // Two allowed pairs grow 3 -> 5 -> 7 -> 7.
    assert_eq!(metrics.matches_processed.get(), 14);
    assert_eq!(metrics.fetch_failures.get(), 1);
    assert_eq!(pipeline.event_log().len(), 13 * 40);
}
