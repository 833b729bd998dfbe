//! Request routing types - the closed set of analysis request kinds and
//! the envelopes returned to callers.

use crate::clone::Specialization;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Known analysis request kinds. External callers speak strings; anything
/// that does not parse into this enum is reported as unsupported inside
/// the response envelope, never as a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    NetworkAnalysis,
    ProtocolAnalysis,
    VulnerabilityAnalysis,
    TrendAnalysis,
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NetworkAnalysis => "network_analysis",
            Self::ProtocolAnalysis => "protocol_analysis",
            Self::VulnerabilityAnalysis => "vulnerability_analysis",
            Self::TrendAnalysis => "trend_analysis",
        };
        write!(f, "{}", s)
    }
}

impl RequestType {
    /// Parse the external string form, accepting the aliases callers use
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "network_analysis" | "analyze_network" | "network" => Some(Self::NetworkAnalysis),
            "protocol_analysis" | "analyze_protocol" | "protocol" => Some(Self::ProtocolAnalysis),
            "vulnerability_analysis" | "analyze_vulnerability" | "analyze_vulnerabilities"
            | "vulnerability" => Some(Self::VulnerabilityAnalysis),
            "trend_analysis" | "analyze_trends" | "analyze_trend" | "trend" | "trends" => {
                Some(Self::TrendAnalysis)
            }
            _ => None,
        }
    }

    /// Specialization best suited to handle this request kind. Trend
    /// analysis rides on the network specialists; nothing targets general.
    pub fn target_specialization(&self) -> Specialization {
        match self {
            Self::NetworkAnalysis | Self::TrendAnalysis => Specialization::Network,
            Self::ProtocolAnalysis => Specialization::Protocol,
            Self::VulnerabilityAnalysis => Specialization::Vulnerability,
        }
    }
}

/// Identity of the clone that handled a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneInfo {
    pub id: String,
    pub name: String,
    pub specialization: Specialization,
}

/// Envelope returned by request routing. An unreachable clone or unknown
/// request type is reported inside `result`, not as a transport error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub result: serde_json::Value,
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub clone: CloneInfo,
}

/// Registry-wide aggregate summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub total_clones: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_specialization: BTreeMap<String, usize>,
    pub total_requests_processed: u64,
    /// Mean response time weighted by each clone's processed request count
    pub average_response_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_aliases() {
        assert_eq!(
            RequestType::parse("analyze_network"),
            Some(RequestType::NetworkAnalysis)
        );
        assert_eq!(
            RequestType::parse("network-analysis"),
            Some(RequestType::NetworkAnalysis)
        );
        assert_eq!(
            RequestType::parse("Protocol_Analysis"),
            Some(RequestType::ProtocolAnalysis)
        );
        assert_eq!(
            RequestType::parse("analyze_trends"),
            Some(RequestType::TrendAnalysis)
        );
        assert_eq!(RequestType::parse("make_coffee"), None);
    }

    #[test]
    fn test_target_specialization() {
        assert_eq!(
            RequestType::NetworkAnalysis.target_specialization(),
            Specialization::Network
        );
        assert_eq!(
            RequestType::TrendAnalysis.target_specialization(),
            Specialization::Network
        );
        assert_eq!(
            RequestType::VulnerabilityAnalysis.target_specialization(),
            Specialization::Vulnerability
        );
    }
}
