//! Remediation engine - turns findings into solutions and applies them.
//!
//! Applying always operates on a deep copy of the snapshot and records a
//! change ledger. Only the firmware and encryption findings carry concrete
//! mutation logic; every other pattern applies with an empty ledger.

use chrono::Utc;
use dolly_common::finding::kinds;
use dolly_common::{
    ApplyOutcome, ChangeRecord, Finding, FindingStats, FleetError, NetworkSnapshot, Solution,
    SolutionStatus, Trend,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::patterns::PatternRegistry;

/// History size below which the trend is always reported stable
const TREND_MIN_SAMPLES: usize = 10;

/// Per-clone remediation engine holding the proposed/applied solution ledger
pub struct RemediationEngine {
    patterns: Arc<PatternRegistry>,
    solutions: Vec<Solution>,
}

impl RemediationEngine {
    pub fn new(patterns: Arc<PatternRegistry>) -> Self {
        Self {
            patterns,
            solutions: Vec::new(),
        }
    }

    /// Build one solution per finding, in input order. Findings with a
    /// registered template use it; the rest get a synthesized generic
    /// remediation.
    pub fn generate(&mut self, findings: &[Finding]) -> Vec<Solution> {
        let mut generated = Vec::with_capacity(findings.len());

        for finding in findings {
            let solution = match self.patterns.template_for(finding.template_key()) {
                Some(template) => Solution {
                    id: Solution::new_id(),
                    error_id: finding.id.clone(),
                    title: template.title,
                    steps: template.steps,
                    success_indicators: template.success_indicators,
                    severity: finding.severity,
                    status: SolutionStatus::Proposed,
                    applied_at: None,
                    changes: Vec::new(),
                },
                None => generic_solution(finding),
            };
            generated.push(solution);
        }

        debug!("Generated {} solutions", generated.len());
        self.solutions.extend(generated.iter().cloned());
        generated
    }

    /// Apply a proposed solution against a copy of the snapshot. Applying
    /// an already-applied solution is a deterministic no-op with zero
    /// changes. Pattern ids without concrete mutation logic still apply,
    /// with an empty ledger.
    pub fn apply(
        &mut self,
        solution_id: &str,
        snapshot: &NetworkSnapshot,
        findings: &VecDeque<Finding>,
    ) -> Result<ApplyOutcome, FleetError> {
        let solution = self
            .solutions
            .iter_mut()
            .find(|s| s.id == solution_id)
            .ok_or_else(|| FleetError::SolutionNotFound(solution_id.to_string()))?;

        if solution.status == SolutionStatus::Applied {
            return Ok(ApplyOutcome {
                success: true,
                changes: Vec::new(),
                snapshot: snapshot.clone(),
            });
        }

        let mut modified = snapshot.clone();
        let finding = findings.iter().find(|f| f.id == solution.error_id);
        let changes = match finding {
            Some(finding) => apply_finding(finding, &mut modified),
            None => Vec::new(),
        };

        solution.status = SolutionStatus::Applied;
        solution.applied_at = Some(Utc::now());
        solution.changes = changes.clone();

        Ok(ApplyOutcome {
            success: true,
            changes,
            snapshot: modified,
        })
    }

    /// Solution ledger, in generation order
    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }

    pub fn proposed_count(&self) -> usize {
        self.solutions
            .iter()
            .filter(|s| s.status == SolutionStatus::Proposed)
            .count()
    }
}

fn apply_finding(finding: &Finding, snapshot: &mut NetworkSnapshot) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    match finding.template_key() {
        kinds::FIRMWARE_OUTDATED => {
            for entity in &finding.affected_entities {
                if let Some(device) = snapshot.find_device_mut(entity) {
                    if !device.firmware_updated {
                        device.firmware_updated = true;
                        changes.push(ChangeRecord {
                            entity: device.id.clone(),
                            field: "firmware_updated".to_string(),
                            old_value: "false".to_string(),
                            new_value: "true".to_string(),
                        });
                    }
                }
            }
        }
        kinds::UNENCRYPTED_CONNECTION => {
            let connection = snapshot.connections.iter_mut().find(|c| {
                !c.encrypted
                    && finding.affected_entities.contains(&c.from_device)
                    && finding.affected_entities.contains(&c.to_device)
            });
            if let Some(connection) = connection {
                connection.encrypted = true;
                changes.push(ChangeRecord {
                    entity: connection.id.clone(),
                    field: "encrypted".to_string(),
                    old_value: "false".to_string(),
                    new_value: "true".to_string(),
                });
            }
        }
        // Remaining patterns are accepted but carry no mutation logic yet
        _ => {}
    }

    changes
}

/// Fallback remediation for findings without a registered template
fn generic_solution(finding: &Finding) -> Solution {
    Solution {
        id: Solution::new_id(),
        error_id: finding.id.clone(),
        title: format!("Remediate {}", finding.kind),
        steps: vec![
            "Isolate the affected entities".to_string(),
            format!("Investigate the reported {}", finding.kind),
            "Apply the relevant hardening or patch".to_string(),
            "Re-run detection to confirm the finding clears".to_string(),
        ],
        success_indicators: vec![
            "Finding no longer reported on the next scan".to_string(),
            "No related alerts in the log stream".to_string(),
        ],
        severity: finding.severity,
        status: SolutionStatus::Proposed,
        applied_at: None,
        changes: Vec::new(),
    }
}

/// Aggregate statistics over a clone's finding history. The trend splits
/// the history in half by insertion order and compares the halves'
/// finding counts: improving below 80%, worsening above 120%.
pub fn statistics(history: &VecDeque<Finding>) -> FindingStats {
    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_pattern: BTreeMap<String, usize> = BTreeMap::new();

    for finding in history {
        *by_kind.entry(finding.kind.clone()).or_default() += 1;
        *by_severity.entry(finding.severity.to_string()).or_default() += 1;
        if let Some(pattern_id) = &finding.pattern_id {
            *by_pattern.entry(pattern_id.clone()).or_default() += 1;
        }
    }

    let most_common_pattern = by_pattern
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(pattern_id, _)| pattern_id.clone());

    FindingStats {
        total: history.len(),
        by_kind,
        by_severity,
        most_common_pattern,
        trend: trend(history),
    }
}

fn trend(history: &VecDeque<Finding>) -> Trend {
    let total = history.len();
    if total < TREND_MIN_SAMPLES {
        return Trend::Stable;
    }

    let first_half = total / 2;
    let second_half = total - first_half;

    let ratio = second_half as f64 / first_half as f64;
    if ratio < 0.8 {
        Trend::Improving
    } else if ratio > 1.2 {
        Trend::Worsening
    } else {
        Trend::Stable
    }
}
