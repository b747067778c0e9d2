use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::records::PlayerGameweekRecord;

/// One player's sums over a season (or any record slice).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeasonTotals {
    pub name: String,
    pub position: String,
    pub team: String,
    pub appearances: usize,
    pub total_points: i64,
    pub goals_scored: u64,
    pub assists: u64,
    pub expected_goals: f64,
    pub expected_assists: f64,
    pub minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionGoals {
    pub position: String,
    pub players: usize,
    pub mean_goals: f64,
    pub max_goals: u64,
}

/// Pearson correlation and least-squares line of `y` on `x` over gameweek rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub x: String,
    pub y: String,
    pub samples: usize,
    pub correlation: f64,
    pub slope: f64,
    pub intercept: f64,
}

pub fn records_for_season<'a>(
    records: &'a [PlayerGameweekRecord],
    season: &str,
) -> Vec<&'a PlayerGameweekRecord> {
    records.iter().filter(|r| r.season == season).collect()
}

/// Group by (name, position, team) and sum; missing cells count as zero.
/// Sorted by total points, highest first.
pub fn season_totals<'a, I>(records: I) -> Vec<SeasonTotals>
where
    I: IntoIterator<Item = &'a PlayerGameweekRecord>,
{
    let mut grouped: BTreeMap<(String, String, String), SeasonTotals> = BTreeMap::new();
    for r in records {
        let position = r.position.clone().unwrap_or_default();
        let team = r.team.clone().unwrap_or_default();
        let entry = grouped
            .entry((r.name.clone(), position.clone(), team.clone()))
            .or_insert_with(|| SeasonTotals {
                name: r.name.clone(),
                position,
                team,
                ..Default::default()
            });
        entry.appearances += 1;
        entry.total_points += i64::from(r.total_points.unwrap_or(0));
        entry.goals_scored += u64::from(r.goals_scored.unwrap_or(0));
        entry.assists += u64::from(r.assists.unwrap_or(0));
        entry.expected_goals += r.expected_goals.unwrap_or(0.0);
        entry.expected_assists += r.expected_assists.unwrap_or(0.0);
        entry.minutes += u64::from(r.minutes.unwrap_or(0));
    }

    let mut out: Vec<SeasonTotals> = grouped.into_values().collect();
    out.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.name.cmp(&b.name))
    });
    out
}

pub fn top_by_points(totals: &[SeasonTotals], n: usize) -> &[SeasonTotals] {
    &totals[..n.min(totals.len())]
}

/// Equal-width bins over `[min, max]`; the last bin is closed on the right.
pub fn histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || bins == 0 {
        return Vec::new();
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: finite.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            start: min + width * i as f64,
            end: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();
    for v in finite {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}

/// Goals per player summarized by position. Players without a position are grouped
/// under `?`.
pub fn goals_by_position(totals: &[SeasonTotals]) -> Vec<PositionGoals> {
    let mut grouped: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for t in totals {
        let key = if t.position.is_empty() {
            "?".to_string()
        } else {
            t.position.clone()
        };
        grouped.entry(key).or_default().push(t.goals_scored);
    }
    grouped
        .into_iter()
        .map(|(position, goals)| PositionGoals {
            players: goals.len(),
            mean_goals: goals.iter().sum::<u64>() as f64 / goals.len() as f64,
            max_goals: goals.iter().copied().max().unwrap_or(0),
            position,
        })
        .collect()
}

/// (player, expected goals, actual goals), largest over-performance first.
pub fn xg_vs_goals(totals: &[SeasonTotals]) -> Vec<(String, f64, u64)> {
    let mut out: Vec<(String, f64, u64)> = totals
        .iter()
        .filter(|t| t.expected_goals > 0.0 || t.goals_scored > 0)
        .map(|t| (t.name.clone(), t.expected_goals, t.goals_scored))
        .collect();
    out.sort_by(|a, b| {
        let da = a.2 as f64 - a.1;
        let db = b.2 as f64 - b.1;
        db.total_cmp(&da).then_with(|| a.0.cmp(&b.0))
    });
    out
}

/// Pearson r; NaN with fewer than two pairs or when either side is constant.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let (mx, my) = (mean(&xs[..n]), mean(&ys[..n]));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys).take(n) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    sxy / (sxx * syy).sqrt()
}

/// Minutes, goals scored and expected goal involvements each against total
/// points, over rows where both values are present.
pub fn points_relationships<'a, I>(records: I) -> Vec<Relationship>
where
    I: IntoIterator<Item = &'a PlayerGameweekRecord>,
{
    type Pick = fn(&PlayerGameweekRecord) -> Option<f64>;
    let axes: [(&str, Pick); 3] = [
        ("minutes", |r| r.minutes.map(f64::from)),
        ("goals_scored", |r| r.goals_scored.map(f64::from)),
        ("expected_goal_involvements", |r| r.expected_goal_involvements),
    ];
    let rows: Vec<&PlayerGameweekRecord> = records.into_iter().collect();

    axes.iter()
        .map(|(name, pick)| {
            let (xs, ys): (Vec<f64>, Vec<f64>) = rows
                .iter()
                .filter_map(|r| Some((pick(r)?, f64::from(r.total_points?))))
                .unzip();
            let (slope, intercept) = least_squares(&xs, &ys);
            Relationship {
                x: name.to_string(),
                y: "total_points".to_string(),
                samples: xs.len(),
                correlation: pearson(&xs, &ys),
                slope,
                intercept,
            }
        })
        .collect()
}

fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    if xs.len() < 2 {
        return (f64::NAN, f64::NAN);
    }
    let (mx, my) = (mean(xs), mean(ys));
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx) * (x - mx);
    }
    if sxx == 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let slope = sxy / sxx;
    (slope, my - slope * mx)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, pos: &str, points: i32, goals: u32, xg: f64) -> PlayerGameweekRecord {
        PlayerGameweekRecord {
            position: Some(pos.to_string()),
            team: Some("Arsenal".to_string()),
            total_points: Some(points),
            goals_scored: Some(goals),
            expected_goals: Some(xg),
            minutes: Some(90),
            ..PlayerGameweekRecord::new(name, "2023-24")
        }
    }

    #[test]
    fn totals_sum_and_rank() {
        let records = vec![
            rec("Saka", "MID", 6, 1, 0.4),
            rec("White", "DEF", 2, 0, 0.0),
            rec("Saka", "MID", 9, 2, 0.9),
        ];
        let totals = season_totals(&records);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].name, "Saka");
        assert_eq!(totals[0].total_points, 15);
        assert_eq!(totals[0].goals_scored, 3);
        assert_eq!(totals[0].minutes, 180);
        assert_eq!(totals[0].appearances, 2);
        assert_eq!(top_by_points(&totals, 1).len(), 1);
        assert_eq!(top_by_points(&totals, 10).len(), 2);

        let by_pos = goals_by_position(&totals);
        let mid = by_pos.iter().find(|p| p.position == "MID").unwrap();
        assert_eq!(mid.max_goals, 3);
    }

    #[test]
    fn perfect_line_has_unit_correlation() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [2.0, 7.0, 12.0, 17.0];
        assert!((pearson(&xs, &ys) - 1.0).abs() < 1e-12);
        assert!((pearson(&xs, &[17.0, 12.0, 7.0, 2.0]) + 1.0).abs() < 1e-12);
        assert!(pearson(&xs, &[3.0; 4]).is_nan());
        assert!(pearson(&[1.0], &[1.0]).is_nan());

        let records: Vec<PlayerGameweekRecord> = xs
            .iter()
            .zip(ys)
            .map(|(g, p)| PlayerGameweekRecord {
                goals_scored: Some(*g as u32),
                minutes: Some(90),
                total_points: Some(p as i32),
                ..PlayerGameweekRecord::new("X", "2023-24")
            })
            .collect();
        let rel = points_relationships(&records);
        assert_eq!(rel.len(), 3);
        let goals = rel.iter().find(|r| r.x == "goals_scored").unwrap();
        assert_eq!(goals.samples, 4);
        assert!((goals.slope - 5.0).abs() < 1e-12);
        assert!((goals.intercept - 2.0).abs() < 1e-12);
        let minutes = rel.iter().find(|r| r.x == "minutes").unwrap();
        assert!(minutes.correlation.is_nan());
        let xgi = rel.iter().find(|r| r.x == "expected_goal_involvements").unwrap();
        assert_eq!(xgi.samples, 0);
    }

    #[test]
    fn histogram_counts_every_value() {
        let values = [0.0, 1.0, 2.0, 3.0, 10.0];
        let bins = histogram(&values, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[4].count, 1);
        assert!(histogram(&[], 4).is_empty());
        assert_eq!(histogram(&[3.0, 3.0], 4)[0].count, 2);
    }
}
