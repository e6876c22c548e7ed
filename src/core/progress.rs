use crate::core::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Status attached to a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Milestone,
    Completed,
    Error,
}

/// A single progress report from a running action.
///
/// Updates are validated before they leave the engine; a malformed update is
/// dropped and logged by the forwarding sink, never emitted to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Completion percentage in [0, 100]; None means indeterminate.
    pub percentage: Option<f64>,
    pub message: String,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
    /// Reserved for hierarchical progress; validated but otherwise unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tasks: Option<Vec<ProgressUpdate>>,
}

impl ProgressUpdate {
    pub fn running<S: Into<String>>(percentage: f64, message: S) -> Self {
        Self {
            percentage: Some(percentage),
            message: message.into(),
            status: ProgressStatus::Running,
            details: HashMap::new(),
            sub_tasks: None,
        }
    }

    pub fn indeterminate<S: Into<String>>(message: S) -> Self {
        Self {
            percentage: None,
            message: message.into(),
            status: ProgressStatus::Running,
            details: HashMap::new(),
            sub_tasks: None,
        }
    }

    pub fn milestone<S: Into<String>>(percentage: f64, message: S) -> Self {
        Self {
            percentage: Some(percentage),
            message: message.into(),
            status: ProgressStatus::Milestone,
            details: HashMap::new(),
            sub_tasks: None,
        }
    }

    pub fn completed<S: Into<String>>(message: S) -> Self {
        Self {
            percentage: Some(100.0),
            message: message.into(),
            status: ProgressStatus::Completed,
            details: HashMap::new(),
            sub_tasks: None,
        }
    }

    pub fn with_detail<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Reject out-of-range or non-finite percentages, recursively through
    /// `sub_tasks`.
    pub fn validate(&self) -> Result<()> {
        if let Some(pct) = self.percentage {
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                return Err(EngineError::validation_field(
                    format!("percentage {pct} is outside [0, 100]"),
                    "percentage",
                ));
            }
        }
        if let Some(subs) = &self.sub_tasks {
            for sub in subs {
                sub.validate()?;
            }
        }
        Ok(())
    }
}
