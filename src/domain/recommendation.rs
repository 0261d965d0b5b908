//! Recommendations emitted by the hourly cycle and the deep report

use std::fmt;

use serde::{Deserialize, Serialize};

/// Recommendation priority, ordered high to low
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Regime,
    Performance,
    Recovery,
    Confluence,
    Risk,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Regime => "regime",
            Self::Performance => "performance",
            Self::Recovery => "recovery",
            Self::Confluence => "confluence",
            Self::Risk => "risk",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: Category,
    pub message: String,
    /// Suggested action for the operator
    pub action: String,
}

impl Recommendation {
    pub fn new(
        priority: Priority,
        category: Category,
        message: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            category,
            message: message.into(),
            action: action.into(),
        }
    }
}

/// Sort high to low, keeping insertion order inside a priority
pub fn sort_by_priority(recommendations: &mut [Recommendation]) {
    recommendations.sort_by_key(|r| r.priority);
}

/// Verb attached to a deep-report action item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionVerb {
    Fix,
    Remove,
    Tune,
    Keep,
}

impl fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fix => "FIX",
            Self::Remove => "REMOVE",
            Self::Tune => "TUNE",
            Self::Keep => "KEEP",
        };
        f.pad(s)
    }
}

/// Consolidated report entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub verb: ActionVerb,
    pub priority: Priority,
    /// What the verb applies to (`dca`, `factor:vwap_bias`, `regime_gate`, ...)
    pub target: String,
    pub reason: String,
}
