use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::batch::{BatchProcessor, BatchReport, EventLog};
use crate::buffer::{MatchBuffer, Offer};
use crate::catalog::{MatchInfo, MatchSource};
use crate::discovery::{AllowList, discover_new_matches};
use crate::event_store::EventStore;
use crate::ledger::ProcessedLedger;
use crate::metrics::PipelineMetrics;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub allow: AllowList,
    pub buffer_size: usize,
    pub batch_delay: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub discovered: usize,
    pub buffered: usize,
    pub batches: Vec<BatchReport>,
    pub discovery_errors: Vec<String>,
}

impl RoundSummary {
    pub fn matches_processed(&self) -> usize {
        self.batches.iter().map(|b| b.match_ids.len()).sum()
    }
}

/// Owns every piece of ingestion state: discovery, buffering, batch processing
/// and the accumulated event log all run through one context, one round at a time.
pub struct Pipeline {
    source: Arc<dyn MatchSource>,
    allow: AllowList,
    poll_interval: Duration,
    ledger: ProcessedLedger,
    buffer: MatchBuffer,
    processor: BatchProcessor,
    metrics: PipelineMetrics,
    log: EventLog,
    store: Option<EventStore>,
    rounds: usize,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn MatchSource>,
        settings: PipelineSettings,
        ledger: ProcessedLedger,
        metrics: PipelineMetrics,
    ) -> Self {
        let processor =
            BatchProcessor::new(Arc::clone(&source), settings.batch_delay, metrics.clone());
        metrics.set_buffer_len(0);
        Self {
            source,
            allow: settings.allow,
            poll_interval: settings.poll_interval,
            ledger,
            buffer: MatchBuffer::new(settings.buffer_size),
            processor,
            metrics,
            log: EventLog::default(),
            store: None,
            rounds: 0,
        }
    }

    /// Persists each batch's events as a store part before the batch is committed.
    pub fn with_store(mut self, store: EventStore) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn run_round(&mut self) -> RoundSummary {
        let discovery = discover_new_matches(&self.source, &self.allow, &mut self.ledger).await;
        let mut summary = RoundSummary {
            discovered: discovery.matches.len(),
            discovery_errors: discovery.errors,
            ..RoundSummary::default()
        };
        if discovery.matches.is_empty() {
            info!("no new matches");
        } else {
            info!("found {} new matches", discovery.matches.len());
        }

        for m in discovery.matches {
            let offer = self.buffer.offer(m, &mut self.ledger);
            self.metrics.set_buffer_len(self.buffer.len());
            match offer {
                Offer::AlreadyProcessed => {}
                Offer::Buffered { .. } => summary.buffered += 1,
                Offer::Flush(batch) => {
                    summary.buffered += 1;
                    let report = self.flush(batch).await;
                    summary.batches.push(report);
                }
            }
        }

        if let Some(rest) = self.buffer.finish_round() {
            let report = self.flush(rest).await;
            summary.batches.push(report);
        }

        self.rounds += 1;
        self.metrics.discovery_rounds.inc();
        summary
    }

    /// Polls until `max_rounds` rounds have run; without a limit it only stops when cancelled.
    pub async fn run(&mut self, max_rounds: Option<usize>) -> usize {
        let mut completed = 0usize;
        loop {
            let summary = self.run_round().await;
            completed += 1;
            if summary.discovered == 0 {
                info!("sleeping {:?} before next poll", self.poll_interval);
            } else {
                info!(
                    "round {} done: {} matches in {} batches, log holds {} events",
                    self.rounds,
                    summary.matches_processed(),
                    summary.batches.len(),
                    self.log.len()
                );
            }
            if max_rounds.is_some_and(|max| completed >= max) {
                return completed;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn flush(&mut self, batch: Vec<MatchInfo>) -> BatchReport {
        self.metrics.set_buffer_len(0);
        let mark = self.log.len();
        let report = self.processor.process(&batch, &mut self.log).await;
        if let Some(store) = self.store.as_mut()
            && !report.succeeded.is_empty()
            && let Err(err) = store.write_part(&self.log.events()[mark..])
        {
            // Uncommitted ids stay unprocessed, so the next round fetches them again.
            warn!("failed to store batch events, batch will be retried: {err:#}");
            self.log.discard_since(mark);
            self.ledger.forget(&report.match_ids);
            return report;
        }
        if let Err(err) = self.ledger.commit(&batch, &report.failed_ids()) {
            warn!("failed to persist processed matches: {err:#}");
        }
        report
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn into_event_log(self) -> EventLog {
        self.log
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn store(&self) -> Option<&EventStore> {
        self.store.as_ref()
    }

    pub fn ledger_mut(&mut self) -> &mut ProcessedLedger {
        &mut self.ledger
    }
}
