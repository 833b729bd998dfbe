//! Deterministic security scoring.
//!
//! Pure weighted-sum functions over structured facts. The orchestrator
//! calls these for display values and owns no scoring state.

use dolly_common::{Finding, NetworkSnapshot};

/// Base score per protocol class: open links score zero, legacy schemes
/// land between 10 and 50, modern ones between 80 and 99.
pub fn protocol_base_score(protocol: &str) -> u32 {
    match protocol.trim().to_lowercase().as_str() {
        "open" | "none" => 0,
        "wep" => 10,
        "wpa" | "wpa-tkip" => 35,
        "wpa2" => 80,
        "wpa2-enterprise" => 88,
        "wpa3" => 95,
        "wpa3-enterprise" => 99,
        _ => 20,
    }
}

/// Protocol score with additive bonuses for strong cipher and
/// authentication choices, capped at 100
pub fn security_score(protocol: &str, cipher: Option<&str>, auth: Option<&str>) -> u32 {
    let mut score = protocol_base_score(protocol);

    if let Some(cipher) = cipher {
        score += match cipher.trim().to_lowercase().as_str() {
            "aes" | "ccmp" | "gcmp" => 5,
            _ => 0,
        };
    }

    if let Some(auth) = auth {
        score += match auth.trim().to_lowercase().as_str() {
            "802.1x" | "eap" => 5,
            "sae" => 4,
            "psk" => 2,
            _ => 0,
        };
    }

    score.min(100)
}

/// Human-facing rating for a 0-100 score
pub fn score_label(score: u32) -> &'static str {
    match score {
        80.. => "strong",
        50..=79 => "acceptable",
        25..=49 => "weak",
        _ => "critical",
    }
}

/// Vulnerability-weighted network score: 100 minus the severity-weighted
/// finding count per device, times 10, floored at 0. An empty network
/// scores 100.
pub fn network_score(snapshot: &NetworkSnapshot, findings: &[Finding]) -> u32 {
    let device_count = snapshot.devices.len();
    if device_count == 0 {
        return 100;
    }

    let weighted: u32 = findings.iter().map(|f| f.severity.weight()).sum();
    let raw = 100.0 - (weighted as f64 / device_count as f64) * 10.0;
    raw.max(0.0).round() as u32
}
