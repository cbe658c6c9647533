use std::path::PathBuf;

use anyhow::{Result, anyhow};

use scout_stream::config::arg_value;
use scout_stream::event_store::{DEFAULT_EVENTS_PATH, read_event_log};
use scout_stream::features::aggregate_player_stats;
use scout_stream::logging;
use scout_stream::stats_export::{DEFAULT_STATS_PATH, export_player_stats};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    logging::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let input = arg_value(&args, "--in")
        .or_else(|| std::env::var("SCOUT_EVENTS_OUT").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EVENTS_PATH));
    let output = arg_value(&args, "--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATS_PATH));

    let parsed = read_event_log(&input)?;
    if parsed.events.is_empty() {
        return Err(anyhow!("no events in {}", input.display()));
    }
    let rows = aggregate_player_stats(&parsed.events);
    let format = export_player_stats(&output, &rows)?;

    let matches = parsed
        .events
        .iter()
        .map(|e| e.match_id)
        .collect::<std::collections::HashSet<_>>()
        .len();
    println!("Aggregation complete");
    println!("Input: {}", input.display());
    println!("Events: {} (rejected {})", parsed.events.len(), parsed.rejected);
    println!("Matches: {matches}");
    println!("Players: {}", rows.len());
    println!("Output: {} ({format:?})", output.display());

    let mut top = rows.iter().filter(|r| r.goals > 0).collect::<Vec<_>>();
    top.sort_by(|a, b| b.goals.cmp(&a.goals).then(a.player_id.cmp(&b.player_id)));
    for row in top.iter().take(5) {
        println!(
            "  {} ({}): goals={} shots={} acc={:.2}",
            row.player_name, row.player_id, row.goals, row.total_shots, row.shot_accuracy
        );
    }
    Ok(())
}
