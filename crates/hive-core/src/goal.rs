//! Immutable specification of what a run must achieve (spec.md §3 `Goal`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriterion {
    pub id: String,
    pub description: String,
    pub metric: String,
    pub target: Value,
    /// Not required to sum to 1 across criteria; normalization is left to
    /// an external evaluator (spec.md §9, Open Question 2).
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub description: String,
    pub kind: ConstraintKind,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub description: String,
    pub success_criteria: Vec<SuccessCriterion>,
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
}

impl Goal {
    pub fn hard_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::Hard)
    }
}
