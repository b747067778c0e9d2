use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One player's line for one gameweek of one season.
///
/// Every stat is optional: older seasons lack the expected-goals columns and
/// the source CSV occasionally leaves cells blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameweekRecord {
    pub name: String,
    pub season: String,
    pub position: Option<String>,
    pub team: Option<String>,
    pub gameweek: Option<u32>,
    pub minutes: Option<u32>,
    pub goals_scored: Option<u32>,
    pub assists: Option<u32>,
    pub bonus: Option<u32>,
    pub bps: Option<i32>,
    pub clean_sheets: Option<u32>,
    pub saves: Option<u32>,
    pub penalties_saved: Option<u32>,
    pub yellow_cards: Option<u32>,
    pub red_cards: Option<u32>,
    pub expected_goals: Option<f64>,
    pub expected_assists: Option<f64>,
    pub expected_goal_involvements: Option<f64>,
    pub opponent_team: Option<u32>,
    pub was_home: Option<bool>,
    pub total_points: Option<i32>,
}

impl PlayerGameweekRecord {
    pub fn new(name: impl Into<String>, season: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            season: season.into(),
            ..Default::default()
        }
    }

    /// Numeric value of a non-categorical feature, `None` when the cell is missing.
    ///
    /// `was_home` is coerced to 0/1 here. `opponent_team` is categorical and never
    /// yields a numeric value; it is expanded into indicator columns instead.
    pub fn numeric(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::Minutes => self.minutes.map(f64::from),
            Feature::GoalsScored => self.goals_scored.map(f64::from),
            Feature::Assists => self.assists.map(f64::from),
            Feature::ExpectedGoals => self.expected_goals,
            Feature::ExpectedAssists => self.expected_assists,
            Feature::ExpectedGoalInvolvements => self.expected_goal_involvements,
            Feature::Bonus => self.bonus.map(f64::from),
            Feature::Bps => self.bps.map(f64::from),
            Feature::CleanSheets => self.clean_sheets.map(f64::from),
            Feature::Saves => self.saves.map(f64::from),
            Feature::PenaltiesSaved => self.penalties_saved.map(f64::from),
            Feature::YellowCards => self.yellow_cards.map(f64::from),
            Feature::RedCards => self.red_cards.map(f64::from),
            Feature::WasHome => self.was_home.map(|home| if home { 1.0 } else { 0.0 }),
            Feature::OpponentTeam => None,
        }
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::OpponentTeam => self.opponent_team.is_some(),
            other => self.numeric(other).is_some(),
        }
    }

    pub fn target(&self, target: Target) -> Option<f64> {
        match target {
            Target::TotalPoints => self.total_points.map(f64::from),
        }
    }

    pub fn is_attacker(&self) -> bool {
        self.position.as_deref().is_some_and(is_attacking_position)
    }
}

/// Midfielders and forwards (`AM` appears in older seasons).
pub fn is_attacking_position(position: &str) -> bool {
    matches!(position.trim(), "MID" | "FWD" | "AM")
}

/// A raw column the feature builder can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    Minutes,
    GoalsScored,
    Assists,
    ExpectedGoals,
    ExpectedAssists,
    ExpectedGoalInvolvements,
    Bonus,
    Bps,
    CleanSheets,
    Saves,
    PenaltiesSaved,
    YellowCards,
    RedCards,
    OpponentTeam,
    WasHome,
}

impl Feature {
    pub const ALL: [Feature; 15] = [
        Feature::Minutes,
        Feature::GoalsScored,
        Feature::Assists,
        Feature::ExpectedGoals,
        Feature::ExpectedAssists,
        Feature::ExpectedGoalInvolvements,
        Feature::Bonus,
        Feature::Bps,
        Feature::CleanSheets,
        Feature::Saves,
        Feature::PenaltiesSaved,
        Feature::YellowCards,
        Feature::RedCards,
        Feature::OpponentTeam,
        Feature::WasHome,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Feature::Minutes => "minutes",
            Feature::GoalsScored => "goals_scored",
            Feature::Assists => "assists",
            Feature::ExpectedGoals => "expected_goals",
            Feature::ExpectedAssists => "expected_assists",
            Feature::ExpectedGoalInvolvements => "expected_goal_involvements",
            Feature::Bonus => "bonus",
            Feature::Bps => "bps",
            Feature::CleanSheets => "clean_sheets",
            Feature::Saves => "saves",
            Feature::PenaltiesSaved => "penalties_saved",
            Feature::YellowCards => "yellow_cards",
            Feature::RedCards => "red_cards",
            Feature::OpponentTeam => "opponent_team",
            Feature::WasHome => "was_home",
        }
    }

    pub fn is_categorical(self) -> bool {
        self == Feature::OpponentTeam
    }

    pub fn parse_list(names: &[&str]) -> Result<Vec<Feature>, ConfigError> {
        names.iter().map(|name| name.parse()).collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Feature {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.column().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownFeature(wanted.to_string()))
    }
}

/// Supervised label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    TotalPoints,
}

impl Target {
    pub fn column(self) -> &'static str {
        match self {
            Target::TotalPoints => "total_points",
        }
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().eq_ignore_ascii_case("total_points") {
            Ok(Target::TotalPoints)
        } else {
            Err(ConfigError::UnknownTarget(raw.trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_names_parse_case_insensitively() {
        assert_eq!("Goals_Scored".parse::<Feature>().unwrap(), Feature::GoalsScored);
        assert_eq!(" was_home ".parse::<Feature>().unwrap(), Feature::WasHome);
        assert!("shots".parse::<Feature>().is_err());
        assert!("xP".parse::<Target>().is_err());
    }

    #[test]
    fn was_home_coerces_to_indicator() {
        let mut rec = PlayerGameweekRecord::new("A", "2023-24");
        rec.was_home = Some(true);
        assert_eq!(rec.numeric(Feature::WasHome), Some(1.0));
        rec.was_home = Some(false);
        assert_eq!(rec.numeric(Feature::WasHome), Some(0.0));
        rec.opponent_team = Some(4);
        assert_eq!(rec.numeric(Feature::OpponentTeam), None);
        assert!(rec.has_feature(Feature::OpponentTeam));
    }
}
