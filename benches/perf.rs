use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use fpl_forecast::config::PipelineConfig;
use fpl_forecast::data_source::parse_season_csv;
use fpl_forecast::features;
use fpl_forecast::forest::{ForestConfig, RandomForest};
use fpl_forecast::predictor::{self, predict_many};
use fpl_forecast::records::{PlayerGameweekRecord, Target};

const FIXTURE: &str = include_str!("../tests/fixtures/merged_gw_sample.csv");

/// The fixture repeated under distinct player names, for a season-sized input.
fn season_records(copies: usize) -> Vec<PlayerGameweekRecord> {
    let base = parse_season_csv(FIXTURE.as_bytes(), "2023-24")
        .expect("valid fixture csv")
        .records;
    (0..copies)
        .flat_map(|copy| {
            base.iter().map(move |r| PlayerGameweekRecord {
                name: format!("{} {copy}", r.name),
                ..r.clone()
            })
        })
        .collect()
}

fn bench_csv_parse(c: &mut Criterion) {
    c.bench_function("merged_gw_parse", |b| {
        b.iter(|| {
            let parsed = parse_season_csv(black_box(FIXTURE.as_bytes()), "2023-24").unwrap();
            black_box(parsed.records.len());
        })
    });
}

fn bench_forest_fit(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let records = season_records(25);
    let (matrix, y) = features::build(&records, &config.features, Target::TotalPoints);
    let forest_config = ForestConfig {
        n_trees: 20,
        ..Default::default()
    };

    let mut group = c.benchmark_group("forest");
    group.sample_size(10);
    group.bench_function("fit_20_trees", |b| {
        b.iter(|| {
            let forest =
                RandomForest::fit(black_box(matrix.rows()), &y, forest_config.clone()).unwrap();
            black_box(forest.n_trees());
        })
    });
    group.finish();
}

fn bench_predict_many(c: &mut Criterion) {
    let config = PipelineConfig {
        n_trees: 20,
        db_path: None,
        ..PipelineConfig::default()
    };
    let records = season_records(25);
    let (model, _) = predictor::train_from_records(&records, &config).unwrap();

    c.bench_function("predict_many_200_players", |b| {
        b.iter(|| {
            let ranked = predict_many(&model, black_box(&records), &config.features, Some(20));
            black_box(ranked.len());
        })
    });
}

criterion_group!(perf, bench_csv_parse, bench_forest_fit, bench_predict_many);
criterion_main!(perf);
