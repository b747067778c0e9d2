use std::io::Read;

use anyhow::Result;
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::http_cache::fetch_text_cached;
use crate::http_client::http_client;
use crate::records::PlayerGameweekRecord;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {url} failed: {source:#}")]
    Request {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("unreadable csv from {url}: {source}")]
    Csv {
        url: String,
        #[source]
        source: csv::Error,
    },
}

/// Outcome of loading one season. A failure carries the season it belongs to and
/// contributes zero rows to the combined set.
#[derive(Debug)]
pub enum SeasonFetch {
    Loaded {
        season: String,
        records: Vec<PlayerGameweekRecord>,
        skipped_rows: usize,
    },
    Failed {
        season: String,
        error: FetchError,
    },
}

impl SeasonFetch {
    pub fn season(&self) -> &str {
        match self {
            SeasonFetch::Loaded { season, .. } | SeasonFetch::Failed { season, .. } => season,
        }
    }

    pub fn records(&self) -> &[PlayerGameweekRecord] {
        match self {
            SeasonFetch::Loaded { records, .. } => records,
            SeasonFetch::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SeasonFetch::Failed { .. })
    }
}

#[derive(Debug, Default)]
pub struct SeasonLoad {
    pub seasons: Vec<SeasonFetch>,
}

impl SeasonLoad {
    /// Rows from every season that loaded, in season order.
    pub fn combined(&self) -> Vec<PlayerGameweekRecord> {
        self.seasons
            .iter()
            .flat_map(|s| s.records().iter().cloned())
            .collect()
    }

    pub fn into_combined(self) -> Vec<PlayerGameweekRecord> {
        let mut out = Vec::new();
        for fetch in self.seasons {
            if let SeasonFetch::Loaded { records, .. } = fetch {
                out.extend(records);
            }
        }
        out
    }

    pub fn failures(&self) -> impl Iterator<Item = &SeasonFetch> {
        self.seasons.iter().filter(|s| s.is_failed())
    }

    pub fn succeeded(&self) -> usize {
        self.seasons.iter().filter(|s| !s.is_failed()).count()
    }
}

/// Parsed rows for one season plus how many rows were rejected.
#[derive(Debug, Default)]
pub struct ParsedSeason {
    pub records: Vec<PlayerGameweekRecord>,
    pub skipped_rows: usize,
}

/// Fetch every configured season over HTTP.
pub fn load_all(config: &PipelineConfig) -> Result<SeasonLoad> {
    let client = http_client(config.http_timeout)?;
    Ok(load_seasons_with(&config.seasons, |season| {
        fetch_season(client, config, season)
    }))
}

/// Load each season through `fetch`, turning per-season errors into
/// [`SeasonFetch::Failed`] instead of aborting the whole load.
pub fn load_seasons_with<F>(seasons: &[String], mut fetch: F) -> SeasonLoad
where
    F: FnMut(&str) -> Result<ParsedSeason, FetchError>,
{
    let mut out = SeasonLoad::default();
    for season in seasons {
        match fetch(season) {
            Ok(parsed) => {
                info!(
                    season = season.as_str(),
                    rows = parsed.records.len(),
                    skipped = parsed.skipped_rows,
                    "season loaded"
                );
                out.seasons.push(SeasonFetch::Loaded {
                    season: season.clone(),
                    records: parsed.records,
                    skipped_rows: parsed.skipped_rows,
                });
            }
            Err(error) => {
                warn!(season = season.as_str(), "season fetch failed: {error}");
                out.seasons.push(SeasonFetch::Failed {
                    season: season.clone(),
                    error,
                });
            }
        }
    }
    out
}

pub fn fetch_season(
    client: &Client,
    config: &PipelineConfig,
    season: &str,
) -> Result<ParsedSeason, FetchError> {
    let url = config.season_url(season);
    let body = fetch_text_cached(client, &url).map_err(|source| FetchError::Request {
        url: url.clone(),
        source,
    })?;
    parse_season_csv(body.as_bytes(), season).map_err(|source| FetchError::Csv { url, source })
}

/// Parse a `merged_gw.csv` body, tagging every row with `season`.
///
/// Rows that do not fit the expected schema are skipped; only an unreadable
/// header fails the season.
pub fn parse_season_csv<R: Read>(rdr: R, season: &str) -> Result<ParsedSeason, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(rdr);
    reader.headers()?;

    let mut out = ParsedSeason::default();
    for (idx, result) in reader.deserialize::<RawGameweekRow>().enumerate() {
        match result {
            Ok(raw) => match raw.into_record(season) {
                Some(record) => out.records.push(record),
                None => out.skipped_rows += 1,
            },
            Err(err) => {
                debug!(season, row = idx + 1, "skipping malformed row: {err}");
                out.skipped_rows += 1;
            }
        }
    }
    if out.skipped_rows > 0 {
        warn!(season, skipped = out.skipped_rows, "skipped malformed rows");
    }
    Ok(out)
}

#[derive(Debug, Deserialize)]
struct RawGameweekRow {
    name: String,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default, rename = "GW")]
    gw: Option<u32>,
    #[serde(default)]
    round: Option<u32>,
    #[serde(default)]
    minutes: Option<u32>,
    #[serde(default)]
    goals_scored: Option<u32>,
    #[serde(default)]
    assists: Option<u32>,
    #[serde(default)]
    bonus: Option<u32>,
    #[serde(default)]
    bps: Option<i32>,
    #[serde(default)]
    clean_sheets: Option<u32>,
    #[serde(default)]
    saves: Option<u32>,
    #[serde(default)]
    penalties_saved: Option<u32>,
    #[serde(default)]
    yellow_cards: Option<u32>,
    #[serde(default)]
    red_cards: Option<u32>,
    #[serde(default)]
    expected_goals: Option<f64>,
    #[serde(default)]
    expected_assists: Option<f64>,
    #[serde(default)]
    expected_goal_involvements: Option<f64>,
    #[serde(default)]
    opponent_team: Option<u32>,
    #[serde(default, deserialize_with = "de_opt_bool")]
    was_home: Option<bool>,
    #[serde(default)]
    total_points: Option<i32>,
}

impl RawGameweekRow {
    fn into_record(self, season: &str) -> Option<PlayerGameweekRecord> {
        let name = self.name.trim();
        if name.is_empty() {
            return None;
        }
        let floats = [
            self.expected_goals,
            self.expected_assists,
            self.expected_goal_involvements,
        ];
        if floats.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        Some(PlayerGameweekRecord {
            name: name.to_string(),
            season: season.to_string(),
            position: non_blank(self.position),
            team: non_blank(self.team),
            gameweek: self.gw.or(self.round),
            minutes: self.minutes,
            goals_scored: self.goals_scored,
            assists: self.assists,
            bonus: self.bonus,
            bps: self.bps,
            clean_sheets: self.clean_sheets,
            saves: self.saves,
            penalties_saved: self.penalties_saved,
            yellow_cards: self.yellow_cards,
            red_cards: self.red_cards,
            expected_goals: self.expected_goals,
            expected_assists: self.expected_assists,
            expected_goal_involvements: self.expected_goal_involvements,
            opponent_team: self.opponent_team,
            was_home: self.was_home,
            total_points: self.total_points,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn de_opt_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" => Ok(Some(true)),
        "false" | "0" => Ok(Some(false)),
        other => Err(serde::de::Error::custom(format!(
            "invalid was_home value `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_python_style_booleans_and_gameweek_fallback() {
        let csv = "name,position,team,round,minutes,was_home,opponent_team,total_points\n\
                   Bukayo Saka,MID,Arsenal,3,90,True,7,12\n\
                   Ben White,DEF,Arsenal,3,0,False,7,0\n";
        let parsed = parse_season_csv(csv.as_bytes(), "2023-24").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped_rows, 0);
        let saka = &parsed.records[0];
        assert_eq!(saka.was_home, Some(true));
        assert_eq!(saka.gameweek, Some(3));
        assert_eq!(saka.season, "2023-24");
        assert_eq!(parsed.records[1].was_home, Some(false));
        assert_eq!(saka.expected_goals, None);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let csv = "name,minutes,was_home,total_points\n\
                   Good Row,90,True,5\n\
                   Bad Minutes,ninety,True,5\n\
                   Too,Many,Fields,Here,Now\n\
                   ,90,True,5\n\
                   Also Good,45,False,-1\n";
        let parsed = parse_season_csv(csv.as_bytes(), "2024-25").unwrap();
        let names: Vec<&str> = parsed.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Good Row", "Also Good"]);
        assert_eq!(parsed.skipped_rows, 3);
        assert_eq!(parsed.records[1].total_points, Some(-1));
    }
}
