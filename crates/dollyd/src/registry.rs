//! Clone registry - ownership, persistence and request routing.
//!
//! The registry is an explicitly constructed instance handed to callers,
//! not a process global. Clones live in an insertion-ordered Vec so the
//! routing tie-break (first created wins among equal thresholds) is
//! deterministic. Structural mutations persist the full registry
//! snapshot; a failed save is logged and the in-memory state keeps going.

use dolly_common::{
    clamp_confidence_threshold, clamp_learning_rate, CloneRecord, CloneStatus, CloneUpdate,
    FleetError, RegistrySummary, RequestType, RouteResponse, Specialization,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clone::CloneHandle;
use crate::patterns::PatternRegistry;
use crate::store::RegistryStore;

pub struct CloneRegistry {
    clones: RwLock<Vec<CloneHandle>>,
    store: Arc<dyn RegistryStore>,
    patterns: Arc<PatternRegistry>,
    history_cap: usize,
}

impl CloneRegistry {
    /// Build the registry from whatever the store holds. A load failure
    /// logs a warning and starts the fleet empty.
    pub async fn load(
        store: Arc<dyn RegistryStore>,
        patterns: Arc<PatternRegistry>,
        history_cap: usize,
    ) -> Self {
        let records = match store.load().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Failed to load registry: {}. Starting empty", e);
                Vec::new()
            }
        };

        let clones = records
            .into_iter()
            .map(|record| CloneHandle::new(record, patterns.clone(), history_cap))
            .collect();

        Self {
            clones: RwLock::new(clones),
            store,
            patterns,
            history_cap,
        }
    }

    /// Create a clone. Numeric parameters are clamped silently; the
    /// specialization string defaults to general when unrecognized.
    pub async fn create(
        &self,
        name: &str,
        specialization: Specialization,
        learning_rate: f64,
        confidence_threshold: f64,
    ) -> CloneRecord {
        let record = CloneRecord::new(name, specialization, learning_rate, confidence_threshold);
        let handle = CloneHandle::new(record.clone(), self.patterns.clone(), self.history_cap);

        self.clones.write().await.push(handle);
        info!("Created clone {} ({}, {})", record.id, record.name, record.specialization);

        self.persist().await;
        record
    }

    pub async fn handle(&self, id: &str) -> Option<CloneHandle> {
        self.clones
            .read()
            .await
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    pub async fn get(&self, id: &str) -> Option<CloneRecord> {
        match self.handle(id).await {
            Some(handle) => Some(handle.record().await),
            None => None,
        }
    }

    pub async fn list(&self) -> Vec<CloneRecord> {
        let handles: Vec<CloneHandle> = self.clones.read().await.iter().cloned().collect();
        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            records.push(handle.record().await);
        }
        records
    }

    /// Apply an external patch. Only name, the numeric parameters and the
    /// externally settable statuses are mutable; absent id yields None.
    pub async fn update(&self, id: &str, patch: CloneUpdate) -> Option<CloneRecord> {
        let handle = self.handle(id).await?;

        let record = {
            let mut state = handle.lock().await;
            if let Some(name) = patch.name {
                state.record.name = name;
            }
            if let Some(learning_rate) = patch.learning_rate {
                state.record.learning_rate = clamp_learning_rate(learning_rate);
            }
            if let Some(threshold) = patch.confidence_threshold {
                state.record.confidence_threshold = clamp_confidence_threshold(threshold);
            }
            if let Some(status) = patch.status {
                state.record.status = status.into();
            }
            state.record.last_active_at = chrono::Utc::now();
            state.record.clone()
        };

        self.persist().await;
        Some(record)
    }

    /// Remove a clone. An absent id is not an error.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = {
            let mut clones = self.clones.write().await;
            let before = clones.len();
            clones.retain(|h| h.id != id);
            clones.len() < before
        };

        if removed {
            info!("Deleted clone {}", id);
            self.persist().await;
        }
        removed
    }

    /// Route a request to an explicitly named clone, or to the best
    /// qualified active clone: matching specialists first, then generals,
    /// highest confidence threshold wins, creation order breaks ties.
    pub async fn route_request(
        &self,
        raw_type: &str,
        payload: &Value,
        clone_id: Option<&str>,
    ) -> Result<RouteResponse, FleetError> {
        let handle = match clone_id {
            Some(id) => self
                .handle(id)
                .await
                .ok_or_else(|| FleetError::CloneNotFound(id.to_string()))?,
            None => self.select(raw_type).await?,
        };

        Ok(handle.process_request(raw_type, payload).await)
    }

    async fn select(&self, raw_type: &str) -> Result<CloneHandle, FleetError> {
        let target = RequestType::parse(raw_type).map(|t| t.target_specialization());
        let handles: Vec<CloneHandle> = self.clones.read().await.iter().cloned().collect();

        let mut best_specialist: Option<(f64, CloneHandle)> = None;
        let mut best_general: Option<(f64, CloneHandle)> = None;
        let mut first_active: Option<CloneHandle> = None;

        for handle in handles {
            let (status, specialization, threshold) = {
                let state = handle.lock().await;
                (
                    state.record.status,
                    state.record.specialization,
                    state.record.confidence_threshold,
                )
            };

            if status != CloneStatus::Active {
                continue;
            }
            if first_active.is_none() {
                first_active = Some(handle.clone());
            }

            // Strict comparison keeps the earliest clone on equal thresholds
            if Some(specialization) == target {
                if best_specialist.as_ref().map_or(true, |(t, _)| threshold > *t) {
                    best_specialist = Some((threshold, handle));
                }
            } else if specialization == Specialization::General {
                if best_general.as_ref().map_or(true, |(t, _)| threshold > *t) {
                    best_general = Some((threshold, handle));
                }
            }
        }

        best_specialist
            .or(best_general)
            .map(|(_, handle)| handle)
            .or(first_active)
            .ok_or(FleetError::NoActiveClone)
    }

    /// Counts by status and specialization plus fleet-wide request totals
    pub async fn statistics(&self) -> RegistrySummary {
        let records = self.list().await;

        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_specialization: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_requests = 0u64;
        let mut weighted_time = 0.0;

        for record in &records {
            *by_status.entry(record.status.to_string()).or_default() += 1;
            *by_specialization
                .entry(record.specialization.to_string())
                .or_default() += 1;
            total_requests += record.performance_metrics.requests_processed;
            weighted_time += record.performance_metrics.average_response_time_ms
                * record.performance_metrics.requests_processed as f64;
        }

        let average_response_time_ms = if total_requests > 0 {
            weighted_time / total_requests as f64
        } else {
            0.0
        };

        RegistrySummary {
            total_clones: records.len(),
            by_status,
            by_specialization,
            total_requests_processed: total_requests,
            average_response_time_ms,
        }
    }

    /// Start a training session on a clone and persist the new state
    pub async fn start_training(&self, id: &str, params: Value) -> Result<String, FleetError> {
        let handle = self
            .handle(id)
            .await
            .ok_or_else(|| FleetError::CloneNotFound(id.to_string()))?;

        let session_id = handle.lock().await.start_training(params)?;
        self.persist().await;
        Ok(session_id)
    }

    /// Complete a training session, returning the clone's new version
    pub async fn complete_training(
        &self,
        id: &str,
        session_id: &str,
        results: Value,
    ) -> Result<String, FleetError> {
        let handle = self
            .handle(id)
            .await
            .ok_or_else(|| FleetError::CloneNotFound(id.to_string()))?;

        let version = handle.lock().await.complete_training(session_id, results)?;
        self.persist().await;
        Ok(version)
    }

    /// Write the full registry snapshot. Failures are logged; the
    /// in-memory fleet keeps serving (last-writer-wins on disk).
    pub async fn persist(&self) {
        let records = self.list().await;
        if let Err(e) = self.store.save(&records).await {
            warn!("Failed to persist registry: {}. Continuing in memory", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn registry() -> CloneRegistry {
        CloneRegistry::load(
            Arc::new(MemoryStore::new()),
            Arc::new(PatternRegistry::builtin()),
            100,
        )
        .await
    }

    fn payload() -> Value {
        json!({"devices": [], "connections": []})
    }

    #[tokio::test]
    async fn test_specialist_beats_higher_confidence_general() {
        let registry = registry().await;
        let net = registry.create("Net-1", Specialization::Network, 0.5, 0.7).await;
        registry.create("Gen-1", Specialization::General, 0.5, 0.9).await;

        let response = registry
            .route_request("analyze_network", &payload(), None)
            .await
            .unwrap();
        assert_eq!(response.clone.id, net.id);
    }

    #[tokio::test]
    async fn test_tie_break_prefers_creation_order() {
        let registry = registry().await;
        let first = registry.create("Net-1", Specialization::Network, 0.5, 0.7).await;
        registry.create("Net-2", Specialization::Network, 0.5, 0.7).await;

        let response = registry
            .route_request("analyze_network", &payload(), None)
            .await
            .unwrap();
        assert_eq!(response.clone.id, first.id);
    }

    #[tokio::test]
    async fn test_highest_threshold_specialist_wins() {
        let registry = registry().await;
        registry.create("Net-1", Specialization::Network, 0.5, 0.6).await;
        let stronger = registry.create("Net-2", Specialization::Network, 0.5, 0.8).await;

        let response = registry
            .route_request("analyze_network", &payload(), None)
            .await
            .unwrap();
        assert_eq!(response.clone.id, stronger.id);
    }

    #[tokio::test]
    async fn test_falls_back_to_general_then_any_active() {
        let registry = registry().await;
        let gen = registry.create("Gen-1", Specialization::General, 0.5, 0.4).await;
        let response = registry
            .route_request("analyze_network", &payload(), None)
            .await
            .unwrap();
        assert_eq!(response.clone.id, gen.id);

        // Only a protocol specialist left active: network requests land on it
        registry
            .update(
                &gen.id,
                CloneUpdate {
                    status: Some(dolly_common::ExternalStatus::Paused),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let proto = registry.create("Proto-1", Specialization::Protocol, 0.5, 0.5).await;

        let response = registry
            .route_request("analyze_network", &payload(), None)
            .await
            .unwrap();
        assert_eq!(response.clone.id, proto.id);
    }

    #[tokio::test]
    async fn test_no_active_clone_is_an_error() {
        let registry = registry().await;
        let record = registry.create("Gen-1", Specialization::General, 0.5, 0.5).await;
        registry
            .update(
                &record.id,
                CloneUpdate {
                    status: Some(dolly_common::ExternalStatus::Stopped),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = registry.route_request("analyze_network", &payload(), None).await;
        assert!(matches!(result, Err(FleetError::NoActiveClone)));
    }

    #[tokio::test]
    async fn test_explicit_unknown_clone_id_errors() {
        let registry = registry().await;
        registry.create("Gen-1", Specialization::General, 0.5, 0.5).await;

        let result = registry
            .route_request("analyze_network", &payload(), Some("clone_missing"))
            .await;
        assert!(matches!(result, Err(FleetError::CloneNotFound(_))));
    }

    #[tokio::test]
    async fn test_update_clamps_and_delete_is_boolean() {
        let registry = registry().await;
        let record = registry.create("Gen-1", Specialization::General, 0.5, 0.5).await;

        let updated = registry
            .update(
                &record.id,
                CloneUpdate {
                    learning_rate: Some(9.0),
                    confidence_threshold: Some(-2.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.learning_rate, 1.0);
        assert_eq!(updated.confidence_threshold, 0.0);

        assert!(registry.delete(&record.id).await);
        assert!(!registry.delete(&record.id).await);
        assert!(registry.get(&record.id).await.is_none());
    }

    #[tokio::test]
    async fn test_registry_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let patterns = Arc::new(PatternRegistry::builtin());

        let registry = CloneRegistry::load(store.clone(), patterns.clone(), 100).await;
        let created = registry.create("Net-1", Specialization::Network, 0.3, 0.7).await;
        let session_id = registry
            .start_training(&created.id, json!({"epochs": 2}))
            .await
            .unwrap();
        registry
            .complete_training(&created.id, &session_id, json!({"accuracy": 0.9}))
            .await
            .unwrap();

        let reloaded = CloneRegistry::load(store, patterns, 100).await;
        let record = reloaded.get(&created.id).await.unwrap();
        assert_eq!(record.name, "Net-1");
        assert_eq!(record.specialization, Specialization::Network);
        assert_eq!(record.version, "1.0.1");
        assert_eq!(record.training_sessions.len(), 1);
        assert_eq!(record.status, CloneStatus::Active);
    }

    #[tokio::test]
    async fn test_statistics_aggregate() {
        let registry = registry().await;
        registry.create("Net-1", Specialization::Network, 1.0, 0.7).await;
        let gen = registry.create("Gen-1", Specialization::General, 1.0, 0.5).await;
        registry
            .update(
                &gen.id,
                CloneUpdate {
                    status: Some(dolly_common::ExternalStatus::Paused),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        registry
            .route_request("analyze_network", &payload(), None)
            .await
            .unwrap();

        let summary = registry.statistics().await;
        assert_eq!(summary.total_clones, 2);
        assert_eq!(summary.by_status.get("active"), Some(&1));
        assert_eq!(summary.by_status.get("paused"), Some(&1));
        assert_eq!(summary.by_specialization.get("network"), Some(&1));
        assert_eq!(summary.total_requests_processed, 1);
        assert!(summary.average_response_time_ms > 0.0);
    }
}
