//! Clone runtime - live state behind each registry entry.
//!
//! A clone owns its record, a private finding detector and a private
//! remediation engine. All mutation of one clone (request processing,
//! training, scan cycles, updates) is serialized through its own mutex;
//! the simulated processing delay deliberately happens outside the lock
//! so a slow clone never stalls work on its siblings.

use chrono::Utc;
use dolly_common::{
    ApplyOutcome, CloneInfo, CloneRecord, CloneStatus, FleetError, NetworkSnapshot, RequestType,
    RouteResponse, Severity, TrainingSession, TrainingStatus,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::detector::FindingDetector;
use crate::patterns::PatternRegistry;
use crate::remediation::{self, RemediationEngine};
use crate::scoring;

/// Flat confidence bonus when a request lands on a matching specialist
const SPECIALIZATION_BONUS: f64 = 0.10;

/// Payload field count treated as fully complete
const COMPLETENESS_FIELDS: f64 = 5.0;

/// Live state of one clone
pub struct CloneState {
    pub record: CloneRecord,
    pub detector: FindingDetector,
    pub remediation: RemediationEngine,
}

impl CloneState {
    pub fn new(record: CloneRecord, patterns: Arc<PatternRegistry>, history_cap: usize) -> Self {
        Self {
            record,
            detector: FindingDetector::new(patterns.clone(), history_cap),
            remediation: RemediationEngine::new(patterns),
        }
    }

    pub fn info(&self) -> CloneInfo {
        CloneInfo {
            id: self.record.id.clone(),
            name: self.record.name.clone(),
            specialization: self.record.specialization,
        }
    }

    /// Begin a training run. Fails if one is already in progress; the
    /// clone's current status is snapshotted before entering training.
    pub fn start_training(&mut self, params: Value) -> Result<String, FleetError> {
        if self.record.status == CloneStatus::Training {
            return Err(FleetError::AlreadyTraining(self.record.id.clone()));
        }

        self.record.previous_status = Some(self.record.status);
        self.record.status = CloneStatus::Training;

        let session = TrainingSession::start(params);
        let session_id = session.id.clone();
        self.record.training_sessions.push(session);
        self.record.last_active_at = Utc::now();

        info!("Clone {} started training session {}", self.record.id, session_id);
        Ok(session_id)
    }

    /// Complete the matching in-progress session: merge known metric keys,
    /// bump the patch version and reactivate the clone. A wrong session id
    /// leaves everything untouched.
    pub fn complete_training(
        &mut self,
        session_id: &str,
        results: Value,
    ) -> Result<String, FleetError> {
        let index = self
            .record
            .training_sessions
            .iter()
            .position(|s| s.id == session_id && s.status == TrainingStatus::InProgress)
            .ok_or_else(|| FleetError::SessionNotFound {
                clone_id: self.record.id.clone(),
                session_id: session_id.to_string(),
            })?;

        self.record.performance_metrics.merge_results(&results);
        self.record.bump_patch_version();
        self.record.status = CloneStatus::Active;
        self.record.previous_status = None;
        self.record.last_active_at = Utc::now();

        let session = &mut self.record.training_sessions[index];
        session.status = TrainingStatus::Completed;
        session.completed_at = Some(Utc::now());
        session.results = results;

        info!(
            "Clone {} completed training session {} (now v{})",
            self.record.id, session_id, self.record.version
        );
        Ok(self.record.version.clone())
    }

    /// One detection + remediation pass, as run by the scan worker.
    /// Returns (findings, solutions) counts for logging.
    pub fn run_scan(&mut self, snapshot: &NetworkSnapshot, log_lines: &[String]) -> (usize, usize) {
        let findings = self.detector.detect(snapshot, log_lines);
        let solutions = self.remediation.generate(&findings);
        self.record.last_scan_at = Some(Utc::now());
        (findings.len(), solutions.len())
    }

    /// Apply one of this clone's proposed solutions against a snapshot copy
    pub fn apply_solution(
        &mut self,
        solution_id: &str,
        snapshot: &NetworkSnapshot,
    ) -> Result<ApplyOutcome, FleetError> {
        let Self {
            detector,
            remediation,
            ..
        } = self;
        remediation.apply(solution_id, snapshot, detector.history())
    }

    fn dispatch(&mut self, request_type: RequestType, payload: &Value) -> Value {
        match request_type {
            RequestType::NetworkAnalysis => self.analyze_network(payload),
            RequestType::ProtocolAnalysis => analyze_protocol(payload),
            RequestType::VulnerabilityAnalysis => analyze_vulnerabilities(payload),
            RequestType::TrendAnalysis => self.analyze_trend(),
        }
    }

    /// Network analysis runs the detector over payload-supplied facts
    fn analyze_network(&mut self, payload: &Value) -> Value {
        let snapshot: NetworkSnapshot =
            serde_json::from_value(payload.clone()).unwrap_or_default();
        let findings = self.detector.detect(&snapshot, &[]);

        let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
        for finding in &findings {
            *by_severity.entry(finding.severity.to_string()).or_default() += 1;
        }

        let score = scoring::network_score(&snapshot, &findings);
        json!({
            "analysis": RequestType::NetworkAnalysis.to_string(),
            "devices_total": snapshot.devices.len(),
            "connections_total": snapshot.connections.len(),
            "findings": findings.len(),
            "findings_by_severity": by_severity,
            "network_score": score,
            "rating": scoring::score_label(score),
        })
    }

    /// Trend analysis reports over this clone's accumulated history
    fn analyze_trend(&mut self) -> Value {
        let stats = remediation::statistics(self.detector.history());
        json!({
            "analysis": RequestType::TrendAnalysis.to_string(),
            "findings_analyzed": stats.total,
            "by_kind": stats.by_kind,
            "most_common_pattern": stats.most_common_pattern,
            "trend": stats.trend,
        })
    }
}

fn analyze_protocol(payload: &Value) -> Value {
    let protocol = payload
        .get("protocol")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let cipher = payload.get("cipher").and_then(|v| v.as_str());
    let auth = payload.get("authentication").and_then(|v| v.as_str());

    let score = scoring::security_score(protocol, cipher, auth);
    let mut recommendations = Vec::new();
    if score < 50 {
        recommendations.push("Migrate to WPA3 or WPA2 with AES where supported");
        recommendations.push("Disable legacy protocol fallback");
    }

    json!({
        "analysis": RequestType::ProtocolAnalysis.to_string(),
        "protocol": protocol,
        "score": score,
        "rating": scoring::score_label(score),
        "recommendations": recommendations,
    })
}

fn analyze_vulnerabilities(payload: &Value) -> Value {
    let entries = payload
        .get("vulnerabilities")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    let mut weighted = 0u32;
    let mut highest: Option<Severity> = None;

    for entry in &entries {
        let severity = entry
            .get("severity")
            .cloned()
            .and_then(|v| serde_json::from_value::<Severity>(v).ok())
            .unwrap_or(Severity::Low);
        *by_severity.entry(severity.to_string()).or_default() += 1;
        weighted += severity.weight();
        highest = Some(highest.map_or(severity, |h| h.max(severity)));
    }

    json!({
        "analysis": RequestType::VulnerabilityAnalysis.to_string(),
        "total": entries.len(),
        "by_severity": by_severity,
        "weighted_exposure": weighted,
        "highest_severity": highest.map(|s| s.to_string()),
    })
}

fn payload_field_count(payload: &Value) -> usize {
    payload.as_object().map(|m| m.len()).unwrap_or(0)
}

/// Shared reference to one clone's live state
#[derive(Clone)]
pub struct CloneHandle {
    pub id: String,
    state: Arc<Mutex<CloneState>>,
}

impl CloneHandle {
    pub fn new(record: CloneRecord, patterns: Arc<PatternRegistry>, history_cap: usize) -> Self {
        Self {
            id: record.id.clone(),
            state: Arc::new(Mutex::new(CloneState::new(record, patterns, history_cap))),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, CloneState> {
        self.state.lock().await
    }

    pub async fn record(&self) -> CloneRecord {
        self.state.lock().await.record.clone()
    }

    /// Process one routed request. A non-active clone answers with an
    /// inactive-status message inside a success envelope and its metrics
    /// stay untouched.
    pub async fn process_request(&self, raw_type: &str, payload: &Value) -> RouteResponse {
        let (learning_rate, threshold, specialization) = {
            let state = self.state.lock().await;
            let record = &state.record;
            if record.status != CloneStatus::Active {
                return RouteResponse {
                    result: json!({
                        "error": format!("Clone inactif (statut: {})", record.status)
                    }),
                    confidence: 0.0,
                    processing_time_ms: 0.0,
                    clone: state.info(),
                };
            }
            (
                record.learning_rate,
                record.confidence_threshold,
                record.specialization,
            )
        };

        // Simulated cost inversely tied to skill; deliberately outside the lock
        let started = Instant::now();
        let latency_secs = 0.05 + 0.1 * (1.0 - learning_rate);
        tokio::time::sleep(Duration::from_secs_f64(latency_secs)).await;

        let request_type = RequestType::parse(raw_type);

        let mut state = self.state.lock().await;
        let result = match request_type {
            Some(request_type) => state.dispatch(request_type, payload),
            None => json!({
                "error": format!("Type d'analyse non supporté: {}", raw_type)
            }),
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        state.record.performance_metrics.record_request(elapsed_ms);
        state.record.last_active_at = Utc::now();

        let bonus = match request_type {
            Some(rt) if rt.target_specialization() == specialization => SPECIALIZATION_BONUS,
            _ => 0.0,
        };
        let completeness = (payload_field_count(payload) as f64 / COMPLETENESS_FIELDS).min(1.0);
        let confidence = (threshold + bonus).min(0.99) * completeness;

        RouteResponse {
            result,
            confidence,
            processing_time_ms: elapsed_ms,
            clone: state.info(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dolly_common::Specialization;

    fn handle(specialization: Specialization, threshold: f64) -> CloneHandle {
        let record = CloneRecord::new("Test", specialization, 1.0, threshold);
        CloneHandle::new(record, Arc::new(PatternRegistry::builtin()), 100)
    }

    fn full_payload() -> Value {
        json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5})
    }

    #[tokio::test]
    async fn test_paused_clone_answers_inactive_envelope() {
        let handle = handle(Specialization::Network, 0.7);
        {
            let mut state = handle.lock().await;
            state.record.status = CloneStatus::Paused;
        }

        let response = handle.process_request("analyze_network", &full_payload()).await;
        assert_eq!(
            response.result["error"],
            json!("Clone inactif (statut: paused)")
        );
        assert_relative_eq!(response.confidence, 0.0);

        let record = handle.record().await;
        assert_eq!(record.performance_metrics.requests_processed, 0);
    }

    #[tokio::test]
    async fn test_unknown_type_reported_in_envelope() {
        let handle = handle(Specialization::General, 0.5);
        let response = handle.process_request("make_coffee", &full_payload()).await;

        assert!(response.result["error"]
            .as_str()
            .unwrap()
            .contains("make_coffee"));
        // The clone was reachable, so the request still counts
        assert_eq!(handle.record().await.performance_metrics.requests_processed, 1);
    }

    #[tokio::test]
    async fn test_confidence_specialist_bonus_and_completeness() {
        let specialist = handle(Specialization::Network, 0.7);
        let response = specialist
            .process_request("analyze_network", &full_payload())
            .await;
        assert_relative_eq!(response.confidence, 0.8, epsilon = 1e-9);

        let general = handle(Specialization::General, 0.7);
        let response = general
            .process_request("analyze_network", &full_payload())
            .await;
        assert_relative_eq!(response.confidence, 0.7, epsilon = 1e-9);

        // Two payload fields out of five
        let sparse = json!({"a": 1, "b": 2});
        let response = general.process_request("analyze_network", &sparse).await;
        assert_relative_eq!(response.confidence, 0.7 * 0.4, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_confidence_capped_below_one() {
        let specialist = handle(Specialization::Network, 0.95);
        let response = specialist
            .process_request("analyze_network", &full_payload())
            .await;
        assert_relative_eq!(response.confidence, 0.99, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_metrics_running_mean_updates() {
        let handle = handle(Specialization::General, 0.5);
        handle.process_request("analyze_network", &full_payload()).await;
        handle.process_request("analyze_network", &full_payload()).await;

        let record = handle.record().await;
        assert_eq!(record.performance_metrics.requests_processed, 2);
        assert!(record.performance_metrics.average_response_time_ms >= 50.0);
    }

    #[tokio::test]
    async fn test_start_training_twice_fails() {
        let handle = handle(Specialization::General, 0.5);
        let mut state = handle.lock().await;

        state.start_training(json!({"epochs": 3})).unwrap();
        assert_eq!(state.record.status, CloneStatus::Training);

        let second = state.start_training(json!({}));
        assert!(matches!(second, Err(FleetError::AlreadyTraining(_))));
        assert_eq!(state.record.status, CloneStatus::Training);
    }

    #[tokio::test]
    async fn test_complete_training_wrong_session_changes_nothing() {
        let handle = handle(Specialization::General, 0.5);
        let mut state = handle.lock().await;
        state.start_training(json!({})).unwrap();

        let result = state.complete_training("session_bogus", json!({"accuracy": 0.9}));
        assert!(matches!(result, Err(FleetError::SessionNotFound { .. })));
        assert_eq!(state.record.status, CloneStatus::Training);
        assert_eq!(state.record.version, "1.0.0");
        assert_relative_eq!(state.record.performance_metrics.accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_complete_training_merges_and_bumps_version() {
        let handle = handle(Specialization::General, 0.5);
        let mut state = handle.lock().await;
        let session_id = state.start_training(json!({"epochs": 3})).unwrap();

        let version = state
            .complete_training(&session_id, json!({"accuracy": 0.91, "recall": 0.8}))
            .unwrap();

        assert_eq!(version, "1.0.1");
        assert_eq!(state.record.status, CloneStatus::Active);
        assert_relative_eq!(state.record.performance_metrics.accuracy, 0.91);
        assert_relative_eq!(state.record.performance_metrics.recall, 0.8);

        let session = &state.record.training_sessions[0];
        assert_eq!(session.status, TrainingStatus::Completed);
        assert!(session.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_protocol_analysis_scores_payload() {
        let handle = handle(Specialization::Protocol, 0.6);
        let payload = json!({"protocol": "wpa2", "cipher": "aes", "authentication": "psk"});
        let response = handle.process_request("protocol_analysis", &payload).await;

        assert_eq!(response.result["score"], json!(87));
        assert_eq!(response.result["rating"], json!("strong"));
    }

    #[tokio::test]
    async fn test_vulnerability_analysis_weights_severities() {
        let handle = handle(Specialization::Vulnerability, 0.6);
        let payload = json!({
            "vulnerabilities": [
                {"name": "cve-1", "severity": "critical"},
                {"name": "cve-2", "severity": "low"},
                {"name": "cve-3"}
            ]
        });
        let response = handle
            .process_request("vulnerability_analysis", &payload)
            .await;

        assert_eq!(response.result["total"], json!(3));
        assert_eq!(response.result["weighted_exposure"], json!(10));
        assert_eq!(response.result["highest_severity"], json!("critical"));
    }
}
