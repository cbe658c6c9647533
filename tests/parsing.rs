use std::fs;
use std::path::PathBuf;

use scout_stream::catalog::{parse_competitions_json, parse_matches_json};
use scout_stream::discovery::{AllowList, select_pairs};
use scout_stream::event::{EventKind, parse_events_json};
use scout_stream::features::aggregate_player_stats;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_statsbomb_competitions_fixture() {
    let raw = read_fixture("statsbomb_competitions.json");
    let rows = parse_competitions_json(&raw).expect("fixture should parse");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].competition_id, 11);
    assert_eq!(rows[0].season_name, "2017/2018");

    let allow = AllowList::new(vec![11], vec![1, 2]);
    assert_eq!(select_pairs(&rows, &allow), vec![(11, 1)]);
}

#[test]
fn parses_statsbomb_matches_fixture() {
    let raw = read_fixture("statsbomb_matches.json");
    let rows = parse_matches_json(&raw, 11, 1).expect("fixture should parse");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, 9880);
    assert_eq!(rows[0].home_team, "Barcelona");
    assert_eq!(rows[0].match_date.as_deref(), Some("2018-04-14"));
    assert_eq!(rows[1].id, 9889);
    assert_eq!(rows[2].competition_id, 11);
    assert_eq!(rows[2].season_id, 1);
}

#[test]
fn parses_statsbomb_events_fixture() {
    let raw = read_fixture("statsbomb_events.json");
    let parsed = parse_events_json(&raw).expect("fixture should parse");
    assert_eq!(parsed.events.len(), 6);
    assert_eq!(parsed.rejected, 1);

    let shot = parsed
        .events
        .iter()
        .find(|e| e.id == "ev-shot-1")
        .expect("shot present");
    let EventKind::Shot(detail) = &shot.kind else {
        panic!("expected shot, got {:?}", shot.kind);
    };
    assert!(detail.is_goal());
    assert_eq!(detail.key_pass_id.as_deref(), Some("ev-pass-1"));
    assert!(
        parsed
            .events
            .iter()
            .any(|e| e.kind == EventKind::Other("Half End".to_string()) && e.player.is_none())
    );
}

#[test]
fn fixture_events_aggregate_into_player_rows() {
    let raw = read_fixture("statsbomb_events.json");
    let mut events = parse_events_json(&raw).expect("fixture should parse").events;
    for event in &mut events {
        event.match_id = 9880;
    }
    let rows = aggregate_player_stats(&events);
    let ids = rows.iter().map(|r| r.player_id).collect::<Vec<_>>();
    assert_eq!(ids, vec![5246, 5503, 6570, 6581]);

    let messi = &rows[1];
    // The assist is counted for the recipient of the assisting pass, and the
    // pass has no "Key Pass" sub-type, so the passer gets neither.
    assert_eq!(messi.assists, 0);
    assert_eq!(messi.key_passes, 0);
    assert_eq!(messi.total_passes, 1);
    assert_eq!(messi.total_shots, 0);

    let suarez = &rows[0];
    assert_eq!(suarez.goals, 1);
    assert_eq!(suarez.shot_conversion, 1.0);
    assert_eq!(suarez.assists, 1);

    let keeper = &rows[2];
    assert_eq!(keeper.gk_save_attempts, 1);
    assert_eq!(keeper.perc_gk_save_success, 1.0);

    let defender = &rows[3];
    assert_eq!(defender.aerial_duels_won, 1);
    assert_eq!(defender.matches_played, 1);
}
