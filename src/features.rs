use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::records::{Feature, PlayerGameweekRecord, Target};

pub const OPPONENT_PREFIX: &str = "opponent_team_";

/// Rectangular numeric table with named columns. Each row remembers the player
/// it was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
    entities: Vec<String>,
}

impl FeatureMatrix {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>, entities: Vec<String>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        debug_assert_eq!(rows.len(), entities.len());
        Self {
            columns,
            rows,
            entities,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r[col])
    }

    /// Copy of the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            entities: indices.iter().map(|&i| self.entities[i].clone()).collect(),
        }
    }

    /// Rearrange to exactly `schema`: columns missing here are zero-filled,
    /// columns not in `schema` are dropped, order follows `schema`.
    pub fn reindex(&self, schema: &[String]) -> FeatureMatrix {
        let lookup: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();
        let sources: Vec<Option<usize>> = schema
            .iter()
            .map(|name| lookup.get(name.as_str()).copied())
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.map(|idx| row[idx]).unwrap_or(0.0))
                    .collect()
            })
            .collect();

        FeatureMatrix {
            columns: schema.to_vec(),
            rows,
            entities: self.entities.clone(),
        }
    }
}

/// Column layout captured at fit time and replayed at prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub columns: Vec<String>,
    pub opponent_columns: Vec<String>,
}

impl FeatureSchema {
    pub fn from_columns(columns: &[String]) -> Self {
        Self {
            columns: columns.to_vec(),
            opponent_columns: columns
                .iter()
                .filter(|c| c.starts_with(OPPONENT_PREFIX))
                .cloned()
                .collect(),
        }
    }
}

/// Build the training matrix and its target vector.
///
/// Rows without a target are dropped, as are rows missing any selected feature.
/// Empty input gives an empty matrix; rejecting it is up to the caller.
pub fn build(
    records: &[PlayerGameweekRecord],
    features: &[Feature],
    target: Target,
) -> (FeatureMatrix, Vec<f64>) {
    let mut kept = Vec::with_capacity(records.len());
    let mut y = Vec::with_capacity(records.len());
    for record in records {
        let Some(label) = record.target(target) else {
            continue;
        };
        if !complete(record, features) {
            continue;
        }
        kept.push(record);
        y.push(label);
    }
    (encode(&kept, features), y)
}

/// Build a matrix from rows that have every selected feature; the target is ignored.
pub fn build_for_prediction(records: &[PlayerGameweekRecord], features: &[Feature]) -> FeatureMatrix {
    let kept: Vec<&PlayerGameweekRecord> = records
        .iter()
        .filter(|r| complete(r, features))
        .collect();
    encode(&kept, features)
}

fn complete(record: &PlayerGameweekRecord, features: &[Feature]) -> bool {
    features.iter().all(|f| record.has_feature(*f))
}

// Numeric columns keep their selection order; opponent indicators go last, one per
// observed id in ascending order, minus the smallest id (the reference category).
fn encode(records: &[&PlayerGameweekRecord], features: &[Feature]) -> FeatureMatrix {
    let numeric: Vec<Feature> = dedup(features)
        .into_iter()
        .filter(|f| !f.is_categorical())
        .collect();
    let wants_opponent = features.contains(&Feature::OpponentTeam);

    let opponents: Vec<u32> = if wants_opponent {
        let observed: BTreeSet<u32> = records.iter().filter_map(|r| r.opponent_team).collect();
        observed.into_iter().skip(1).collect()
    } else {
        Vec::new()
    };

    let mut columns: Vec<String> = numeric.iter().map(|f| f.column().to_string()).collect();
    columns.extend(opponents.iter().map(|id| format!("{OPPONENT_PREFIX}{id}")));

    let mut rows = Vec::with_capacity(records.len());
    let mut entities = Vec::with_capacity(records.len());
    for record in records {
        let mut row: Vec<f64> = numeric
            .iter()
            .map(|f| record.numeric(*f).unwrap_or(0.0))
            .collect();
        row.extend(opponents.iter().map(|id| {
            if record.opponent_team == Some(*id) {
                1.0
            } else {
                0.0
            }
        }));
        rows.push(row);
        entities.push(record.name.clone());
    }

    FeatureMatrix {
        columns,
        rows,
        entities,
    }
}

fn dedup(features: &[Feature]) -> Vec<Feature> {
    let mut out: Vec<Feature> = Vec::with_capacity(features.len());
    for f in features {
        if !out.contains(f) {
            out.push(*f);
        }
    }
    out
}
