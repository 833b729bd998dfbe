//! Findings - detected conditions with a severity and a kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural finding kinds emitted by the detector's snapshot pass.
/// Textual findings carry the kind of their pattern rule instead.
pub mod kinds {
    pub const FIRMWARE_OUTDATED: &str = "firmware_outdated";
    pub const LOW_SECURITY_SCORE: &str = "low_security_score";
    pub const UNENCRYPTED_CONNECTION: &str = "unencrypted_connection";
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by the vulnerability-weighted network score
    pub fn weight(&self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 4,
            Self::Critical => 8,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// A detected condition. Immutable once produced; the detector derives ids
/// deterministically so re-detection on identical input is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    /// Pattern that matched; None for structural findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// Device/connection identifiers involved
    pub affected_entities: Vec<String>,
    pub detected_at: DateTime<Utc>,
}

impl Finding {
    /// Key used to resolve a remediation template: the pattern id when the
    /// finding came from a rule, otherwise the structural kind.
    pub fn template_key(&self) -> &str {
        self.pattern_id.as_deref().unwrap_or(&self.kind)
    }
}

/// Direction of the accumulated finding history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Worsening,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Worsening => "worsening",
        };
        write!(f, "{}", s)
    }
}

/// Aggregate view over a clone's finding history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingStats {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub most_common_pattern: Option<String>,
    pub trend: Trend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_weights() {
        assert_eq!(Severity::Low.weight(), 1);
        assert_eq!(Severity::Medium.weight(), 2);
        assert_eq!(Severity::High.weight(), 4);
        assert_eq!(Severity::Critical.weight(), 8);
    }

    #[test]
    fn test_template_key_prefers_pattern_id() {
        let mut finding = Finding {
            id: "finding_x".to_string(),
            kind: "authentication_attack".to_string(),
            severity: Severity::High,
            description: String::new(),
            pattern_id: Some("auth_bruteforce".to_string()),
            affected_entities: vec![],
            detected_at: Utc::now(),
        };
        assert_eq!(finding.template_key(), "auth_bruteforce");

        finding.pattern_id = None;
        assert_eq!(finding.template_key(), "authentication_attack");
    }
}
