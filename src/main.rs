use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use scout_stream::catalog::{MatchSource, StatsbombOpenData};
use scout_stream::config::{SourceKind, StreamConfig};
use scout_stream::event_store::EventStore;
use scout_stream::fake_feed::FakeCatalog;
use scout_stream::ledger::ProcessedLedger;
use scout_stream::logging;
use scout_stream::metrics::{self, PipelineMetrics};
use scout_stream::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init();

    let config = StreamConfig::from_env()?;
    let metrics = PipelineMetrics::new().context("register metrics")?;
    let listener = metrics::bind(config.metrics_addr).await?;
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(err) = metrics::serve(listener, server_metrics).await {
            error!("{err:#}");
        }
    });

    let source: Arc<dyn MatchSource> = match config.source {
        SourceKind::Statsbomb => Arc::new(StatsbombOpenData::new(&config.statsbomb_url)),
        SourceKind::Fake => Arc::new(FakeCatalog::new(config.fake_seed)),
    };
    let ledger = ProcessedLedger::open(&config.ledger_db, config.ledger_capacity)?;
    let store = EventStore::open(&config.events_out)?;
    info!(
        "streaming competitions {:?} seasons {:?} (buffer {}, ledger {})",
        config.competition_ids,
        config.season_ids,
        config.buffer_size,
        config.ledger_db.display()
    );

    let mut pipeline = Pipeline::new(source, config.pipeline_settings(), ledger, metrics.clone())
        .with_store(store);
    let interrupted = tokio::select! {
        rounds = pipeline.run(config.max_rounds) => {
            info!("stopping after {rounds} rounds");
            false
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!("ctrl-c handler failed: {err}");
            }
            info!("interrupt received, stopping");
            true
        }
    };

    let rounds = pipeline.rounds();
    let unflushed = pipeline.buffered();
    let parts = pipeline.store().map_or(0, EventStore::parts_written);
    let log = pipeline.into_event_log();
    if log.is_empty() {
        println!("No events collected this run");
    } else {
        println!(
            "Stored {} events in {parts} parts under {}",
            log.len(),
            config.events_out.display()
        );
    }

    println!("Stream {}", if interrupted { "interrupted" } else { "complete" });
    println!("Rounds: {rounds}");
    println!("Batches: {}", log.batches());
    println!("Matches processed: {}", metrics.matches_processed.get());
    println!("Fetch failures: {}", metrics.fetch_failures.get());
    if unflushed > 0 {
        println!("Unflushed matches dropped: {unflushed}");
    }
    Ok(())
}
