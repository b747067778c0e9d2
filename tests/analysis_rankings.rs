use std::fs::File;

use fpl_forecast::analysis::{
    goals_by_position, histogram, records_for_season, season_totals, top_by_points, xg_vs_goals,
};
use fpl_forecast::data_source::parse_season_csv;
use fpl_forecast::records::PlayerGameweekRecord;

fn fixture_records(season: &str) -> Vec<PlayerGameweekRecord> {
    let file = File::open("tests/fixtures/merged_gw_sample.csv").expect("fixture present");
    parse_season_csv(file, season).expect("fixture parses").records
}

#[test]
fn season_totals_match_row_sums() {
    let records = fixture_records("2023-24");
    let totals = season_totals(&records);
    assert_eq!(totals.len(), 8);
    assert!(totals.iter().all(|t| t.appearances == 5));

    let points_sum: i64 = records.iter().filter_map(|r| r.total_points).map(i64::from).sum();
    assert_eq!(totals.iter().map(|t| t.total_points).sum::<i64>(), points_sum);

    let goals_sum: u64 = records.iter().filter_map(|r| r.goals_scored).map(u64::from).sum();
    let by_pos = goals_by_position(&totals);
    let pos_goals: f64 = by_pos.iter().map(|p| p.mean_goals * p.players as f64).sum();
    assert!((pos_goals - goals_sum as f64).abs() < 1e-9);
    assert_eq!(by_pos.iter().map(|p| p.players).sum::<usize>(), 8);

    let top = top_by_points(&totals, 3);
    assert_eq!(top.len(), 3);
    assert!(top[0].total_points >= top[2].total_points);
}

#[test]
fn season_filter_keeps_only_that_season() {
    let mut records = fixture_records("2023-24");
    records.extend(fixture_records("2024-25"));
    assert_eq!(records_for_season(&records, "2024-25").len(), 40);
    assert!(records_for_season(&records, "2019-20").is_empty());
}

#[test]
fn points_histogram_and_xg_gap() {
    let records = fixture_records("2023-24");
    let points: Vec<f64> = records
        .iter()
        .filter_map(|r| r.total_points.map(f64::from))
        .collect();
    let bins = histogram(&points, 6);
    assert_eq!(bins.len(), 6);
    assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), points.len());
    assert!(bins.windows(2).all(|w| w[0].end <= w[1].start + 1e-9));

    let totals = season_totals(&records);
    let gaps = xg_vs_goals(&totals);
    assert!(!gaps.is_empty());
    let diffs: Vec<f64> = gaps.iter().map(|(_, xg, g)| *g as f64 - xg).collect();
    assert!(diffs.windows(2).all(|w| w[0] >= w[1]));
}
