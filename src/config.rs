use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::http_cache::app_cache_dir;
use crate::records::{Feature, PlayerGameweekRecord, Target, is_attacking_position};

pub const DEFAULT_URL_TEMPLATE: &str =
    "https://raw.githubusercontent.com/vaastav/Fantasy-Premier-League/master/data/{season}/gws/merged_gw.csv";
pub const DEFAULT_TABLE: &str = "fpl_players";
pub const DEFAULT_SEED: u64 = 1;
pub const DEFAULT_TREES: usize = 100;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SEASONS: [&str; 2] = ["2023-24", "2024-25"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown feature column `{0}`")]
    UnknownFeature(String),
    #[error("unsupported target column `{0}`")]
    UnknownTarget(String),
    #[error("unknown feature preset `{0}` (expected `all` or `attackers`)")]
    UnknownPreset(String),
    #[error("invalid value for {key}: `{value}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("table name `{0}` must be a plain identifier")]
    InvalidTableName(String),
}

/// Named feature sets. `Attackers` also narrows the rows to midfielders and forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeaturePreset {
    #[default]
    AllPositions,
    Attackers,
}

impl FeaturePreset {
    pub fn features(self) -> Vec<Feature> {
        match self {
            FeaturePreset::AllPositions => Feature::ALL.to_vec(),
            FeaturePreset::Attackers => vec![
                Feature::Minutes,
                Feature::GoalsScored,
                Feature::Assists,
                Feature::ExpectedGoals,
                Feature::ExpectedAssists,
                Feature::ExpectedGoalInvolvements,
                Feature::Bonus,
                Feature::Bps,
                Feature::OpponentTeam,
                Feature::WasHome,
            ],
        }
    }

    pub fn includes(self, record: &PlayerGameweekRecord) -> bool {
        match self {
            FeaturePreset::AllPositions => true,
            FeaturePreset::Attackers => record.is_attacker(),
        }
    }

    /// Same rule as [`FeaturePreset::includes`] for an aggregated position label.
    pub fn includes_position(self, position: &str) -> bool {
        match self {
            FeaturePreset::AllPositions => true,
            FeaturePreset::Attackers => is_attacking_position(position),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FeaturePreset::AllPositions => "all positions",
            FeaturePreset::Attackers => "midfielders + forwards",
        }
    }
}

impl FromStr for FeaturePreset {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "all" | "all_positions" => Ok(FeaturePreset::AllPositions),
            "attackers" | "attack" => Ok(FeaturePreset::Attackers),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Everything the pipeline needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub url_template: String,
    pub seasons: Vec<String>,
    pub current_season: String,
    pub db_path: Option<PathBuf>,
    pub table: String,
    pub preset: FeaturePreset,
    pub features: Vec<Feature>,
    pub target: Target,
    pub seed: u64,
    pub n_trees: usize,
    pub test_fraction: f64,
    pub http_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let seasons: Vec<String> = DEFAULT_SEASONS.iter().map(|s| s.to_string()).collect();
        let current_season = seasons.last().cloned().unwrap_or_default();
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            seasons,
            current_season,
            db_path: default_db_path(),
            table: DEFAULT_TABLE.to_string(),
            preset: FeaturePreset::AllPositions,
            features: FeaturePreset::AllPositions.features(),
            target: Target::TotalPoints,
            seed: DEFAULT_SEED,
            n_trees: DEFAULT_TREES,
            test_fraction: DEFAULT_TEST_FRACTION,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `FPL_*` variables from the process env and `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();

        if let Some(raw) = opt_env("FPL_SEASONS") {
            let seasons: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if seasons.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "FPL_SEASONS",
                    value: raw,
                });
            }
            cfg.current_season = seasons.last().cloned().unwrap_or_default();
            cfg.seasons = seasons;
        }
        if let Some(raw) = opt_env("FPL_CURRENT_SEASON") {
            cfg.current_season = raw.trim().to_string();
        }
        if let Some(raw) = opt_env("FPL_URL_TEMPLATE") {
            cfg.url_template = raw;
        }
        if let Some(raw) = opt_env("FPL_DB_PATH") {
            cfg.db_path = Some(PathBuf::from(raw.trim()));
        }
        if let Some(raw) = opt_env("FPL_TABLE") {
            cfg.set_table(&raw)?;
        }
        if let Some(raw) = opt_env("FPL_PRESET") {
            cfg.set_preset(raw.parse()?);
        }
        if let Some(raw) = opt_env("FPL_FEATURES") {
            let names: Vec<&str> = raw.split(',').filter(|s| !s.trim().is_empty()).collect();
            cfg.features = Feature::parse_list(&names)?;
        }
        if let Some(raw) = opt_env("FPL_SEED") {
            cfg.seed = parse_value("FPL_SEED", &raw)?;
        }
        if let Some(raw) = opt_env("FPL_TREES") {
            cfg.n_trees = parse_value::<usize>("FPL_TREES", &raw)?.max(1);
        }
        if let Some(raw) = opt_env("FPL_TEST_FRACTION") {
            let fraction: f64 = parse_value("FPL_TEST_FRACTION", &raw)?;
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(ConfigError::InvalidValue {
                    key: "FPL_TEST_FRACTION",
                    value: raw,
                });
            }
            cfg.test_fraction = fraction;
        }
        if let Some(raw) = opt_env("FPL_HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse_value("FPL_HTTP_TIMEOUT_SECS", &raw)?;
            cfg.http_timeout = Duration::from_secs(secs.max(1));
        }
        Ok(cfg)
    }

    /// Command-line overrides: `--db`, `--table`, `--preset`, `--seasons`, `--seed`, `--trees`.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        if let Some(path) = arg_value(args, "--db") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(table) = arg_value(args, "--table") {
            self.set_table(&table)?;
        }
        if let Some(preset) = arg_value(args, "--preset") {
            self.set_preset(preset.parse()?);
        }
        if let Some(raw) = arg_value(args, "--seasons") {
            let seasons: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if let Some(last) = seasons.last() {
                self.current_season = last.clone();
                self.seasons = seasons;
            }
        }
        if let Some(raw) = arg_value(args, "--seed") {
            self.seed = parse_value("--seed", &raw)?;
        }
        if let Some(raw) = arg_value(args, "--trees") {
            self.n_trees = parse_value::<usize>("--trees", &raw)?.max(1);
        }
        Ok(())
    }

    pub fn season_url(&self, season: &str) -> String {
        self.url_template.replace("{season}", season.trim())
    }

    pub fn set_preset(&mut self, preset: FeaturePreset) {
        self.preset = preset;
        self.features = preset.features();
    }

    pub fn set_table(&mut self, raw: &str) -> Result<(), ConfigError> {
        let name = raw.trim();
        if !valid_identifier(name) {
            return Err(ConfigError::InvalidTableName(name.to_string()));
        }
        self.table = name.to_string();
        Ok(())
    }
}

/// SQL identifiers are interpolated into statements, so only `[A-Za-z_][A-Za-z0-9_]*` passes.
pub fn valid_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("fpl_players.sqlite"))
}

/// Value of `--flag=value` or `--flag value`; blank values are ignored.
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg
            .strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
        {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() && !next.starts_with("--") {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .and_then(|val| if val.trim().is_empty() { None } else { Some(val) })
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_url_fills_template() {
        let cfg = PipelineConfig::default();
        assert_eq!(
            cfg.season_url("2023-24"),
            "https://raw.githubusercontent.com/vaastav/Fantasy-Premier-League/master/data/2023-24/gws/merged_gw.csv"
        );
    }

    #[test]
    fn presets_switch_feature_sets() {
        let mut cfg = PipelineConfig::default();
        assert_eq!(cfg.features.len(), 15);
        cfg.set_preset("attackers".parse().unwrap());
        assert_eq!(cfg.preset, FeaturePreset::Attackers);
        assert!(!cfg.features.contains(&Feature::Saves));
        assert!(cfg.features.contains(&Feature::OpponentTeam));
        assert!("keepers".parse::<FeaturePreset>().is_err());
    }

    #[test]
    fn table_names_are_identifiers() {
        let mut cfg = PipelineConfig::default();
        assert!(cfg.set_table("fpl_players_2024").is_ok());
        assert!(cfg.set_table("players; DROP TABLE x").is_err());
        assert!(cfg.set_table("9lives").is_err());
        assert_eq!(cfg.table, "fpl_players_2024");
    }

    #[test]
    fn cli_args_override_defaults() {
        let args: Vec<String> = ["--db=/tmp/x.sqlite", "--table", "gw_rows", "--trees", "25", "--seasons", "2022-23,2023-24"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut cfg = PipelineConfig::default();
        cfg.apply_args(&args).unwrap();
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(cfg.table, "gw_rows");
        assert_eq!(cfg.n_trees, 25);
        assert_eq!(cfg.seasons, vec!["2022-23", "2023-24"]);
        assert_eq!(cfg.current_season, "2023-24");
        assert_eq!(arg_value(&args, "--player"), None);
        assert!(!has_flag(&args, "--refresh"));
    }

    #[test]
    fn defaults_match_reference_pipeline() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.seed, 1);
        assert_eq!(cfg.n_trees, 100);
        assert!((cfg.test_fraction - 0.2).abs() < f64::EPSILON);
        assert_eq!(cfg.current_season, "2024-25");
    }
}
