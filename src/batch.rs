use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tracing::{info, warn};

use crate::catalog::{MatchInfo, MatchSource};
use crate::event::{Event, EventParse};
use crate::metrics::PipelineMetrics;

pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(200);

/// Everything the batch processor has appended so far, in batch order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    batches: usize,
}

impl EventLog {
    pub fn append(&mut self, events: Vec<Event>) {
        self.events.extend(events);
        self.batches += 1;
    }

    /// Removes every event appended after `mark`, counting it as one batch undone.
    pub fn discard_since(&mut self, mark: usize) {
        if mark < self.events.len() {
            self.events.truncate(mark);
            self.batches = self.batches.saturating_sub(1);
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub match_ids: Vec<u64>,
    pub succeeded: Vec<u64>,
    pub failed: Vec<(u64, String)>,
    pub events: usize,
    pub rejected_events: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn failed_ids(&self) -> Vec<u64> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }
}

pub struct BatchProcessor {
    source: Arc<dyn MatchSource>,
    delay: Duration,
    metrics: PipelineMetrics,
}

impl BatchProcessor {
    pub fn new(source: Arc<dyn MatchSource>, delay: Duration, metrics: PipelineMetrics) -> Self {
        Self {
            source,
            delay,
            metrics,
        }
    }

    pub async fn process(&self, batch: &[MatchInfo], log: &mut EventLog) -> BatchReport {
        let started = Instant::now();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut report = BatchReport {
            match_ids: batch.iter().map(|m| m.id).collect(),
            ..BatchReport::default()
        };
        info!("processing batch: {:?}", report.match_ids);

        let mut combined = Vec::new();
        for m in batch {
            match self.fetch_events(m.id).await {
                Ok(parsed) => {
                    let mut events = parsed.events;
                    for event in &mut events {
                        event.match_id = m.id;
                    }
                    report.succeeded.push(m.id);
                    report.rejected_events += parsed.rejected;
                    combined.extend(events);
                }
                Err(err) => {
                    warn!(match_id = m.id, "error processing match: {err:#}");
                    report.failed.push((m.id, format!("{err:#}")));
                }
            }
        }

        report.events = combined.len();
        if report.succeeded.is_empty() {
            info!("no events processed in this batch");
        } else {
            log.append(combined);
            info!(
                "combined {} events from {}/{} matches; log now holds {} events",
                report.events,
                report.succeeded.len(),
                batch.len(),
                log.len()
            );
        }

        report.elapsed = started.elapsed();
        self.metrics.record_batch(
            batch.len(),
            report.failed.len(),
            report.events,
            report.elapsed,
        );
        report
    }

    async fn fetch_events(&self, match_id: u64) -> anyhow::Result<EventParse> {
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.events(match_id))
            .await
            .map_err(|err| anyhow!("event fetch task failed: {err}"))?
    }
}
