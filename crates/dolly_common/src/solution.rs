//! Solutions - proposed or applied remediations tied to a finding.

use crate::finding::Severity;
use crate::network::NetworkSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Solution lifecycle: proposed until applied, applied exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    Proposed,
    Applied,
}

/// One entry in a solution's change ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub entity: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// A remediation tied to one finding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub id: String,
    /// Id of the finding this solution addresses
    pub error_id: String,
    pub title: String,
    pub steps: Vec<String>,
    pub success_indicators: Vec<String>,
    pub severity: Severity,
    pub status: SolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

impl Solution {
    pub fn new_id() -> String {
        format!("solution_{}", uuid::Uuid::new_v4())
    }
}

/// Result of applying a solution against a snapshot copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub success: bool,
    pub changes: Vec<ChangeRecord>,
    /// Deep copy of the input snapshot with the changes applied
    pub snapshot: NetworkSnapshot,
}
