//! Fleet handlers - the routing surface an external request layer calls.
//!
//! Thin coordination over the registry and the scan scheduler: the one
//! non-obvious rule lives here, that stopping or deleting a clone also
//! stops its scan worker within the bounded join.

use dolly_common::{
    CloneRecord, CloneUpdate, ExternalStatus, FleetError, RegistrySummary, RouteResponse,
    Specialization,
};
use serde_json::Value;

use crate::registry::CloneRegistry;
use crate::scheduler::ScanScheduler;

pub async fn create_clone(
    registry: &CloneRegistry,
    name: &str,
    specialization: &str,
    learning_rate: f64,
    confidence_threshold: f64,
) -> CloneRecord {
    registry
        .create(
            name,
            Specialization::parse(specialization),
            learning_rate,
            confidence_threshold,
        )
        .await
}

pub async fn list_clones(registry: &CloneRegistry) -> Vec<CloneRecord> {
    registry.list().await
}

pub async fn get_clone(registry: &CloneRegistry, id: &str) -> Option<CloneRecord> {
    registry.get(id).await
}

/// Update a clone; setting it stopped also retires its scan worker
pub async fn update_clone(
    registry: &CloneRegistry,
    scheduler: &ScanScheduler,
    id: &str,
    patch: CloneUpdate,
) -> Option<CloneRecord> {
    let stopping = matches!(patch.status, Some(ExternalStatus::Stopped));
    let record = registry.update(id, patch).await?;

    if stopping {
        scheduler.stop_scan(id).await;
    }
    Some(record)
}

pub async fn delete_clone(registry: &CloneRegistry, scheduler: &ScanScheduler, id: &str) -> bool {
    scheduler.stop_scan(id).await;
    registry.delete(id).await
}

pub async fn route_request(
    registry: &CloneRegistry,
    request_type: &str,
    payload: &Value,
    clone_id: Option<&str>,
) -> Result<RouteResponse, FleetError> {
    registry.route_request(request_type, payload, clone_id).await
}

pub async fn start_training(
    registry: &CloneRegistry,
    id: &str,
    params: Value,
) -> Result<String, FleetError> {
    registry.start_training(id, params).await
}

pub async fn complete_training(
    registry: &CloneRegistry,
    id: &str,
    session_id: &str,
    results: Value,
) -> Result<String, FleetError> {
    registry.complete_training(id, session_id, results).await
}

pub async fn registry_statistics(registry: &CloneRegistry) -> RegistrySummary {
    registry.statistics().await
}

pub async fn start_scan(
    registry: &CloneRegistry,
    scheduler: &ScanScheduler,
    id: &str,
) -> Result<(), FleetError> {
    let handle = registry
        .handle(id)
        .await
        .ok_or_else(|| FleetError::CloneNotFound(id.to_string()))?;
    scheduler.start_scan(handle).await;
    Ok(())
}

pub async fn stop_scan(scheduler: &ScanScheduler, id: &str) -> bool {
    scheduler.stop_scan(id).await
}
