use std::collections::VecDeque;
use std::sync::Arc;

use crate::analysis::{self, HistogramBin, PositionGoals, Relationship, SeasonTotals};
use crate::config::{FeaturePreset, PipelineConfig};
use crate::predictor::{self, EvaluationReport, PlayerOutcome, PlayerPrediction, TrainedModel};
use crate::records::{Feature, PlayerGameweekRecord};

const MAX_LOGS: usize = 200;
pub const HISTOGRAM_BINS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Overview,
    Model,
    Player,
}

impl Screen {
    pub fn label(self) -> &'static str {
        match self {
            Screen::Overview => "OVERVIEW",
            Screen::Model => "MODEL",
            Screen::Player => "PLAYER",
        }
    }
}

/// Messages from the background worker to the UI thread.
#[derive(Debug)]
pub enum Delta {
    Status(String),
    Log(String),
    Loaded {
        records: Vec<PlayerGameweekRecord>,
        source: String,
        warnings: Vec<String>,
    },
    Trained {
        model: Arc<TrainedModel>,
        evaluation: EvaluationReport,
        predictions: Vec<PlayerPrediction>,
    },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    /// Reload rows (optionally bypassing the store) and refit.
    Reload { refresh: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerLookup {
    pub name: String,
    pub outcome: PlayerOutcome,
}

pub struct AppState {
    pub screen: Screen,
    pub season: String,
    pub features: Vec<Feature>,
    pub preset: FeaturePreset,
    pub status: String,
    pub source: String,
    pub records: Vec<PlayerGameweekRecord>,
    pub totals: Vec<SeasonTotals>,
    pub histogram: Vec<HistogramBin>,
    pub position_goals: Vec<PositionGoals>,
    pub xg_vs_goals: Vec<(String, f64, u64)>,
    pub relationships: Vec<Relationship>,
    pub model: Option<Arc<TrainedModel>>,
    pub evaluation: Option<EvaluationReport>,
    pub predictions: Vec<PlayerPrediction>,
    pub selected: usize,
    pub search: String,
    pub search_active: bool,
    pub lookup: Option<PlayerLookup>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl AppState {
    pub fn new(season: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            screen: Screen::Overview,
            season: season.into(),
            features,
            preset: FeaturePreset::AllPositions,
            status: "loading".to_string(),
            source: String::new(),
            records: Vec::new(),
            totals: Vec::new(),
            histogram: Vec::new(),
            position_goals: Vec::new(),
            xg_vs_goals: Vec::new(),
            relationships: Vec::new(),
            model: None,
            evaluation: None,
            predictions: Vec::new(),
            selected: 0,
            search: String::new(),
            search_active: false,
            lookup: None,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    /// State for a run of `config`: its season, features and position preset.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            preset: config.preset,
            ..Self::new(config.current_season.clone(), config.features.clone())
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn set_screen(&mut self, screen: Screen) {
        if self.screen != screen {
            self.screen = screen;
            self.selected = 0;
            self.search_active = false;
        }
    }

    /// Number of rows the current screen's list can select from.
    pub fn list_len(&self) -> usize {
        match self.screen {
            Screen::Overview => self.totals.len(),
            Screen::Model => self.predictions.len(),
            Screen::Player => self.player_matches().len(),
        }
    }

    pub fn select_next(&mut self) {
        let total = self.list_len();
        if total == 0 {
            self.selected = 0;
            return;
        }
        self.selected = (self.selected + 1).min(total - 1);
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Current-season players inside the preset whose name contains the search
    /// text (case-insensitive).
    pub fn player_matches(&self) -> Vec<&SeasonTotals> {
        let needle = self.search.trim().to_lowercase();
        self.totals
            .iter()
            .filter(|t| self.preset.includes_position(&t.position))
            .filter(|t| needle.is_empty() || t.name.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn push_search_char(&mut self, c: char) {
        self.search.push(c);
        self.selected = 0;
    }

    pub fn pop_search_char(&mut self) {
        self.search.pop();
        self.selected = 0;
    }

    /// Predict the highlighted player, or the raw search text when nothing matches.
    pub fn lookup_selected(&mut self) {
        let name = match self.player_matches().get(self.selected) {
            Some(t) => t.name.clone(),
            None => self.search.trim().to_string(),
        };
        if name.is_empty() {
            return;
        }
        let Some(model) = self.model.clone() else {
            self.push_log("[INFO] Model not trained yet");
            return;
        };
        let outcome = predictor::lookup_player(
            &model,
            &self.records,
            &name,
            Some(self.season.as_str()),
            self.preset,
            &self.features,
        );
        self.lookup = Some(PlayerLookup { name, outcome });
    }

    fn rebuild_summaries(&mut self) {
        let season_rows = analysis::records_for_season(&self.records, &self.season);
        let points: Vec<f64> = season_rows
            .iter()
            .filter_map(|r| r.total_points.map(f64::from))
            .collect();
        self.relationships = analysis::points_relationships(season_rows.iter().copied());
        self.totals = analysis::season_totals(season_rows);
        self.histogram = analysis::histogram(&points, HISTOGRAM_BINS);
        self.position_goals = analysis::goals_by_position(&self.totals);
        self.xg_vs_goals = analysis::xg_vs_goals(&self.totals);
    }
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::Status(status) => state.status = status,
        Delta::Log(msg) => state.push_log(msg),
        Delta::Loaded {
            records,
            source,
            warnings,
        } => {
            state.records = records;
            state.source = source;
            for warning in warnings {
                state.push_log(format!("[WARN] {warning}"));
            }
            state.rebuild_summaries();
            state.selected = state.selected.min(state.list_len().saturating_sub(1));
            state.push_log(format!(
                "[INFO] {} rows loaded, {} players in {}",
                state.records.len(),
                state.totals.len(),
                state.season
            ));
        }
        Delta::Trained {
            model,
            evaluation,
            predictions,
        } => {
            state.model = Some(model);
            state.evaluation = Some(evaluation);
            state.predictions = predictions;
            state.lookup = None;
            state.status = "ready".to_string();
        }
        Delta::Failed(err) => {
            state.status = "error".to_string();
            state.push_log(format!("[ERROR] {err}"));
        }
    }
}
