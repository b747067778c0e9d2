use std::fs::File;

use fpl_forecast::data_source::{
    FetchError, ParsedSeason, SeasonFetch, load_seasons_with, parse_season_csv,
};
use fpl_forecast::records::Feature;

const FIXTURE: &str = "tests/fixtures/merged_gw_sample.csv";

fn fixture(season: &str) -> ParsedSeason {
    let file = File::open(FIXTURE).expect("fixture present");
    parse_season_csv(file, season).expect("fixture parses")
}

#[test]
fn merged_gw_fixture_parses_every_row() {
    let parsed = fixture("2023-24");
    assert_eq!(parsed.records.len(), 40);
    assert_eq!(parsed.skipped_rows, 0);

    let first = &parsed.records[0];
    assert_eq!(first.name, "Bukayo Saka");
    assert_eq!(first.position.as_deref(), Some("MID"));
    assert_eq!(first.team.as_deref(), Some("Arsenal"));
    assert_eq!(first.gameweek, Some(1));
    assert_eq!(first.opponent_team, Some(7));
    assert_eq!(first.was_home, Some(false));
    assert_eq!(first.season, "2023-24");
    assert!(parsed.records.iter().all(|r| r.total_points.is_some()));
}

#[test]
fn blank_cells_stay_missing() {
    let parsed = fixture("2023-24");
    let palmer_gw3 = parsed
        .records
        .iter()
        .find(|r| r.name == "Cole Palmer" && r.gameweek == Some(3))
        .expect("row present");
    assert_eq!(palmer_gw3.expected_goals, None);
    assert!(!palmer_gw3.has_feature(Feature::ExpectedGoals));
    assert!(palmer_gw3.has_feature(Feature::Minutes));
}

#[test]
fn failed_season_is_reported_and_the_rest_combined() {
    let seasons = vec!["2022-23".to_string(), "2023-24".to_string(), "2024-25".to_string()];
    let load = load_seasons_with(&seasons, |season| {
        if season == "2022-23" {
            Err(FetchError::Request {
                url: format!("https://example.invalid/{season}/merged_gw.csv"),
                source: anyhow::anyhow!("http 404"),
            })
        } else {
            Ok(fixture(season))
        }
    });

    assert_eq!(load.seasons.len(), 3);
    assert_eq!(load.succeeded(), 2);
    let failed: Vec<&str> = load.failures().map(SeasonFetch::season).collect();
    assert_eq!(failed, vec!["2022-23"]);

    let combined = load.combined();
    assert_eq!(combined.len(), 80);
    assert_eq!(combined[0].season, "2023-24");
    assert_eq!(combined[40].season, "2024-25");
}

#[test]
fn all_seasons_failing_yields_no_rows() {
    let seasons = vec!["2023-24".to_string()];
    let load = load_seasons_with(&seasons, |_| {
        Err(FetchError::Request {
            url: "https://example.invalid".to_string(),
            source: anyhow::anyhow!("timed out"),
        })
    });
    assert_eq!(load.succeeded(), 0);
    assert!(load.combined().is_empty());
    assert!(load.seasons[0].is_failed());
}
