//! Metric entity - an aggregate SQL expression.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An aggregate expression such as `SUM(amount)`.
///
/// A metric declared inside a model is implicitly parented to it and reads
/// that model's columns directly. A metric declared at project level points at
/// what it needs with `${ref(...)}` tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: None,
            expression: expression.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}
