//! Pattern rules and their paired remediation templates.
//!
//! Rules are matched against free-text log lines; templates are
//! instantiated into solutions by the remediation engine.

use crate::finding::Severity;
use serde::{Deserialize, Serialize};

/// A named, reusable detection condition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern_id: String,
    /// Finding kind emitted when this rule matches
    pub kind: String,
    /// Regex source, compiled by the pattern registry at load time
    pub condition: String,
    pub severity: Severity,
    pub description: String,
}

/// Remediation blueprint keyed by pattern id (or structural finding kind)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationTemplate {
    pub title: String,
    pub steps: Vec<String>,
    pub success_indicators: Vec<String>,
}
