//! Finding detector - structural and textual scans over network facts.
//!
//! Structural findings come from the device/connection snapshot; textual
//! findings come from matching pattern rules against log lines. Ids are
//! deterministic so re-detection on identical input is idempotent.

use chrono::Utc;
use dolly_common::finding::kinds;
use dolly_common::{Finding, NetworkSnapshot, Severity};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::patterns::PatternRegistry;

/// Security score below which a device is flagged
const SECURITY_SCORE_FLOOR: u32 = 50;

/// Per-clone detector holding a bounded occurrence history
pub struct FindingDetector {
    patterns: Arc<PatternRegistry>,
    history: VecDeque<Finding>,
    history_cap: usize,
}

impl FindingDetector {
    pub fn new(patterns: Arc<PatternRegistry>, history_cap: usize) -> Self {
        Self {
            patterns,
            history: VecDeque::new(),
            history_cap: history_cap.max(1),
        }
    }

    /// Scan a snapshot and a batch of log lines. Structural findings come
    /// first (device order, then connection order), then textual findings
    /// (line order, then rule order). Inputs are never mutated.
    pub fn detect(&mut self, snapshot: &NetworkSnapshot, log_lines: &[String]) -> Vec<Finding> {
        let mut findings = Vec::new();
        let now = Utc::now();

        for device in &snapshot.devices {
            if !device.firmware_updated {
                findings.push(Finding {
                    id: format!("finding_{}_{}", kinds::FIRMWARE_OUTDATED, device.id),
                    kind: kinds::FIRMWARE_OUTDATED.to_string(),
                    severity: Severity::High,
                    description: format!("Device {} is running outdated firmware", device.name),
                    pattern_id: None,
                    affected_entities: vec![device.id.clone()],
                    detected_at: now,
                });
            }

            if device.security_score < SECURITY_SCORE_FLOOR {
                findings.push(Finding {
                    id: format!("finding_{}_{}", kinds::LOW_SECURITY_SCORE, device.id),
                    kind: kinds::LOW_SECURITY_SCORE.to_string(),
                    severity: Severity::High,
                    description: format!(
                        "Device {} has security score {} (below {})",
                        device.name, device.security_score, SECURITY_SCORE_FLOOR
                    ),
                    pattern_id: None,
                    affected_entities: vec![device.id.clone()],
                    detected_at: now,
                });
            }
        }

        for connection in &snapshot.connections {
            if !connection.encrypted {
                let from = snapshot.device_name(&connection.from_device);
                let to = snapshot.device_name(&connection.to_device);
                findings.push(Finding {
                    id: format!("finding_{}_{}", kinds::UNENCRYPTED_CONNECTION, connection.id),
                    kind: kinds::UNENCRYPTED_CONNECTION.to_string(),
                    severity: Severity::High,
                    description: format!("Traffic between {} and {} is not encrypted", from, to),
                    pattern_id: None,
                    affected_entities: vec![
                        connection.from_device.clone(),
                        connection.to_device.clone(),
                    ],
                    detected_at: now,
                });
            }
        }

        for line in log_lines {
            for rule in self.patterns.match_line(line) {
                findings.push(Finding {
                    id: textual_finding_id(&rule.pattern_id, line),
                    kind: rule.kind.clone(),
                    severity: rule.severity,
                    description: rule.description.clone(),
                    pattern_id: Some(rule.pattern_id.clone()),
                    affected_entities: Vec::new(),
                    detected_at: now,
                });
            }
        }

        for finding in &findings {
            if self.history.len() == self.history_cap {
                self.history.pop_front();
            }
            self.history.push_back(finding.clone());
        }

        findings
    }

    /// Accumulated finding history, oldest first
    pub fn history(&self) -> &VecDeque<Finding> {
        &self.history
    }
}

/// Deterministic id for a log-sourced finding: truncated digest of the
/// pattern id and the exact line
fn textual_finding_id(pattern_id: &str, line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pattern_id.as_bytes());
    hasher.update(b":");
    hasher.update(line.as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("finding_{}", hex)
}
