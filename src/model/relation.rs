//! Relation entity - a named join between two models.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::reference::extract_refs;

/// Join kind of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    /// SQL keyword sequence for this join.
    pub fn sql_keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }

    /// The same join seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            JoinType::Left => JoinType::Right,
            JoinType::Right => JoinType::Left,
            other => other,
        }
    }
}

/// A join descriptor between exactly two models.
///
/// The condition names both sides with `${ref(model).column}` tokens, e.g.
/// `${ref(orders).user_id} = ${ref(users).id}`. The first model mentioned is
/// the left side of the join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub condition: String,
    #[serde(default)]
    pub join_type: JoinType,
    /// Preferred relation when several join the same pair of models.
    #[serde(default)]
    pub is_default: bool,
}

impl Relation {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            condition: condition.into(),
            join_type: JoinType::Inner,
            is_default: false,
        }
    }

    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Distinct model names in the condition, in order of appearance.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = Vec::new();
        for token in extract_refs(&self.condition) {
            if !models.contains(&token.name) {
                models.push(token.name);
            }
        }
        models
    }
}
