//! Pattern registry - detection rules and remediation templates.
//!
//! Built-in defaults are loaded at startup; rules added at runtime are
//! persisted back to the pattern file. Rule conditions are regexes tested
//! against individual log lines.

use dolly_common::finding::kinds;
use dolly_common::{PatternRule, RemediationTemplate, Severity};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid condition for pattern {pattern_id}: {source}")]
    InvalidCondition {
        pattern_id: String,
        source: regex::Error,
    },

    #[error("pattern already registered: {0}")]
    DuplicatePattern(String),
}

/// On-disk pattern file format
#[derive(Debug, Serialize, Deserialize)]
struct PatternFile {
    rules: Vec<PatternRule>,
    templates: HashMap<String, RemediationTemplate>,
}

struct PatternSet {
    rules: Vec<PatternRule>,
    /// Compiled conditions, index-aligned with `rules`
    compiled: Vec<Regex>,
    templates: HashMap<String, RemediationTemplate>,
}

/// Shared, runtime-extensible rule/template registry
pub struct PatternRegistry {
    inner: RwLock<PatternSet>,
    path: Option<PathBuf>,
}

impl PatternRegistry {
    /// Build a registry holding only the built-in defaults, unbacked by a file
    pub fn builtin() -> Self {
        let file = default_patterns();
        Self::from_file_contents(file, None)
    }

    /// Load the registry from `path`, writing the defaults there if the
    /// file does not exist yet. Falls back to the defaults on any failure.
    pub fn load_or_default(path: PathBuf) -> Self {
        if !path.exists() {
            info!("No pattern file at {}, seeding defaults", path.display());
            let registry = Self::from_file_contents(default_patterns(), Some(path));
            registry.persist();
            return registry;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<PatternFile>(&contents) {
                Ok(file) => {
                    info!(
                        "Loaded {} pattern rules from {}",
                        file.rules.len(),
                        path.display()
                    );
                    Self::from_file_contents(file, Some(path))
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using built-in patterns", path.display(), e);
                    Self::from_file_contents(default_patterns(), Some(path))
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}. Using built-in patterns", path.display(), e);
                Self::from_file_contents(default_patterns(), Some(path))
            }
        }
    }

    fn from_file_contents(file: PatternFile, path: Option<PathBuf>) -> Self {
        let mut rules = Vec::new();
        let mut compiled = Vec::new();

        for rule in file.rules {
            match compile_condition(&rule.condition) {
                Ok(regex) => {
                    compiled.push(regex);
                    rules.push(rule);
                }
                Err(e) => {
                    warn!("Skipping pattern {} with bad condition: {}", rule.pattern_id, e);
                }
            }
        }

        Self {
            inner: RwLock::new(PatternSet {
                rules,
                compiled,
                templates: file.templates,
            }),
            path,
        }
    }

    /// All registered rules, in registration order
    pub fn rules(&self) -> Vec<PatternRule> {
        self.inner.read().unwrap().rules.clone()
    }

    /// Rules whose condition matches the line, in registration order
    pub fn match_line(&self, line: &str) -> Vec<PatternRule> {
        let set = self.inner.read().unwrap();
        set.rules
            .iter()
            .zip(set.compiled.iter())
            .filter(|(_, regex)| regex.is_match(line))
            .map(|(rule, _)| rule.clone())
            .collect()
    }

    /// Remediation template for a pattern id or structural finding kind
    pub fn template_for(&self, key: &str) -> Option<RemediationTemplate> {
        self.inner.read().unwrap().templates.get(key).cloned()
    }

    /// Register a new rule (and optionally its template) at runtime and
    /// persist the registry. A save failure is logged, not raised; the
    /// in-memory registry keeps the new rule either way.
    pub fn add_rule(
        &self,
        rule: PatternRule,
        template: Option<RemediationTemplate>,
    ) -> Result<(), PatternError> {
        let regex = compile_condition(&rule.condition).map_err(|e| {
            PatternError::InvalidCondition {
                pattern_id: rule.pattern_id.clone(),
                source: e,
            }
        })?;

        {
            let mut set = self.inner.write().unwrap();
            if set.rules.iter().any(|r| r.pattern_id == rule.pattern_id) {
                return Err(PatternError::DuplicatePattern(rule.pattern_id));
            }
            if let Some(template) = template {
                set.templates.insert(rule.pattern_id.clone(), template);
            }
            info!("Registered pattern {}", rule.pattern_id);
            set.rules.push(rule);
            set.compiled.push(regex);
        }

        self.persist();
        Ok(())
    }

    fn persist(&self) {
        let path = match &self.path {
            Some(p) => p,
            None => return,
        };

        let set = self.inner.read().unwrap();
        let file = PatternFile {
            rules: set.rules.clone(),
            templates: set.templates.clone(),
        };

        let json = match serde_json::to_string_pretty(&file) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize patterns: {}", e);
                return;
            }
        };

        if let Some(dir) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("Failed to create pattern directory: {}", e);
                return;
            }
        }

        if let Err(e) = std::fs::write(path, json) {
            warn!("Failed to write {}: {}", path.display(), e);
        }
    }
}

fn compile_condition(condition: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(condition).case_insensitive(true).build()
}

fn template(title: &str, steps: &[&str], indicators: &[&str]) -> RemediationTemplate {
    RemediationTemplate {
        title: title.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        success_indicators: indicators.iter().map(|s| s.to_string()).collect(),
    }
}

/// Built-in rule set and remediation templates
fn default_patterns() -> PatternFile {
    let rules = vec![
        PatternRule {
            pattern_id: "auth_bruteforce".to_string(),
            kind: "authentication_attack".to_string(),
            condition: r"failed (password|login)|authentication failure".to_string(),
            severity: Severity::High,
            description: "Repeated authentication failures suggest a brute force attempt"
                .to_string(),
        },
        PatternRule {
            pattern_id: "port_scan".to_string(),
            kind: "reconnaissance".to_string(),
            condition: r"port scan|syn scan|nmap".to_string(),
            severity: Severity::Medium,
            description: "Port scanning activity observed".to_string(),
        },
        PatternRule {
            pattern_id: "malware_beacon".to_string(),
            kind: "malware_activity".to_string(),
            condition: r"beacon|command and control|c2 callback".to_string(),
            severity: Severity::Critical,
            description: "Traffic consistent with malware command-and-control".to_string(),
        },
        PatternRule {
            pattern_id: "dos_flood".to_string(),
            kind: "denial_of_service".to_string(),
            condition: r"flood|too many (requests|connections)".to_string(),
            severity: Severity::High,
            description: "Request volume consistent with a denial-of-service flood".to_string(),
        },
        PatternRule {
            pattern_id: "dns_tunneling".to_string(),
            kind: "exfiltration".to_string(),
            condition: r"dns tunnel|txt query burst".to_string(),
            severity: Severity::High,
            description: "DNS query pattern consistent with tunneling".to_string(),
        },
    ];

    let mut templates = HashMap::new();
    templates.insert(
        kinds::FIRMWARE_OUTDATED.to_string(),
        template(
            "Update device firmware",
            &[
                "Download the latest firmware image from the vendor",
                "Verify the image checksum",
                "Apply the update during a maintenance window",
                "Reboot the device and confirm the new version",
            ],
            &[
                "Device reports the current firmware version",
                "Finding no longer appears on the next scan",
            ],
        ),
    );
    templates.insert(
        kinds::LOW_SECURITY_SCORE.to_string(),
        template(
            "Harden weakly configured device",
            &[
                "Review the device security configuration",
                "Disable unused services and default accounts",
                "Enable the strongest supported encryption",
                "Re-evaluate the device score",
            ],
            &[
                "Device security score at or above 50",
                "No new findings on the device",
            ],
        ),
    );
    templates.insert(
        kinds::UNENCRYPTED_CONNECTION.to_string(),
        template(
            "Encrypt exposed connection",
            &[
                "Identify the endpoints of the unencrypted link",
                "Enable TLS or an encrypted tunnel on both endpoints",
                "Force traffic through the encrypted channel",
                "Verify cleartext traffic is no longer observed",
            ],
            &[
                "Connection reports encrypted transport",
                "Packet capture shows no cleartext payloads",
            ],
        ),
    );
    templates.insert(
        "auth_bruteforce".to_string(),
        template(
            "Contain brute force source",
            &[
                "Identify source addresses behind the failed attempts",
                "Block or rate-limit the offending sources",
                "Enforce lockout and strong password policy",
                "Monitor authentication logs for recurrence",
            ],
            &[
                "Failed authentication volume returns to baseline",
                "No lockouts triggered by the blocked sources",
            ],
        ),
    );
    templates.insert(
        "port_scan".to_string(),
        template(
            "Respond to reconnaissance",
            &[
                "Confirm the scan source and scope",
                "Close or filter unnecessary exposed ports",
                "Add the source to the watch list",
                "Review firewall drop counters",
            ],
            &[
                "No further scan traffic from the source",
                "Exposed port count reduced",
            ],
        ),
    );
    templates.insert(
        "malware_beacon".to_string(),
        template(
            "Isolate beaconing host",
            &[
                "Quarantine the affected host from the network",
                "Capture and preserve the suspicious traffic",
                "Run a full malware scan on the host",
                "Rotate credentials used from the host",
            ],
            &[
                "No further callback traffic observed",
                "Host scan comes back clean",
            ],
        ),
    );
    templates.insert(
        "dos_flood".to_string(),
        template(
            "Mitigate traffic flood",
            &[
                "Enable rate limiting on the ingress path",
                "Identify and filter the dominant flood sources",
                "Scale or shield the targeted service",
                "Monitor service latency until stable",
            ],
            &[
                "Request volume back under threshold",
                "Service latency back to baseline",
            ],
        ),
    );
    templates.insert(
        "dns_tunneling".to_string(),
        template(
            "Break DNS tunnel",
            &[
                "Identify hosts issuing the anomalous queries",
                "Block the suspicious resolver or domain",
                "Force internal resolvers for all clients",
                "Inspect the hosts for exfiltration tooling",
            ],
            &[
                "Anomalous query volume gone",
                "Only sanctioned resolvers in use",
            ],
        ),
    );

    PatternFile { rules, templates }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_compile() {
        let registry = PatternRegistry::builtin();
        assert_eq!(registry.rules().len(), 5);
    }

    #[test]
    fn test_match_line_case_insensitive() {
        let registry = PatternRegistry::builtin();
        let matched = registry.match_line("Jan 10 sshd[231]: Failed password for root");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].pattern_id, "auth_bruteforce");

        assert!(registry.match_line("quiet day, nothing happened").is_empty());
    }

    #[test]
    fn test_structural_kinds_have_templates() {
        let registry = PatternRegistry::builtin();
        for key in [
            kinds::FIRMWARE_OUTDATED,
            kinds::LOW_SECURITY_SCORE,
            kinds::UNENCRYPTED_CONNECTION,
        ] {
            assert!(registry.template_for(key).is_some(), "missing template {}", key);
        }
    }

    #[test]
    fn test_add_rule_rejects_duplicates_and_bad_regex() {
        let registry = PatternRegistry::builtin();

        let bad = PatternRule {
            pattern_id: "broken".to_string(),
            kind: "broken".to_string(),
            condition: "(unclosed".to_string(),
            severity: Severity::Low,
            description: String::new(),
        };
        assert!(matches!(
            registry.add_rule(bad, None),
            Err(PatternError::InvalidCondition { .. })
        ));

        let dup = PatternRule {
            pattern_id: "port_scan".to_string(),
            kind: "reconnaissance".to_string(),
            condition: "scan".to_string(),
            severity: Severity::Low,
            description: String::new(),
        };
        assert!(matches!(
            registry.add_rule(dup, None),
            Err(PatternError::DuplicatePattern(_))
        ));
    }

    #[test]
    fn test_add_rule_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        let registry = PatternRegistry::load_or_default(path.clone());
        assert!(path.exists());

        registry
            .add_rule(
                PatternRule {
                    pattern_id: "arp_spoof".to_string(),
                    kind: "spoofing".to_string(),
                    condition: r"arp (spoof|poison)".to_string(),
                    severity: Severity::High,
                    description: "ARP table manipulation observed".to_string(),
                },
                None,
            )
            .unwrap();

        let reloaded = PatternRegistry::load_or_default(path);
        assert_eq!(reloaded.rules().len(), 6);
        assert_eq!(
            reloaded.match_line("gateway arp spoof detected")[0].pattern_id,
            "arp_spoof"
        );
    }
}
