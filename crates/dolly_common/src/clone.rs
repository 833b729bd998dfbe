//! Clone records - the persistent shape of an analysis clone.
//!
//! A clone is a simulated analysis agent with a declared specialization,
//! tunable learning parameters and a small lifecycle state machine. All
//! "learning" here is deterministic arithmetic, not a statistical model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Learning rate bounds, enforced silently on every write
pub const LEARNING_RATE_MIN: f64 = 0.01;
pub const LEARNING_RATE_MAX: f64 = 1.0;

/// Default per-clone background scan interval
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 3600;

/// Problem domain a clone is tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Network,
    Protocol,
    Vulnerability,
    General,
}

impl Default for Specialization {
    fn default() -> Self {
        Self::General
    }
}

impl std::fmt::Display for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Vulnerability => "vulnerability",
            Self::General => "general",
        };
        write!(f, "{}", s)
    }
}

impl Specialization {
    /// Parse from the external string form, defaulting to general
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "network" => Self::Network,
            "protocol" => Self::Protocol,
            "vulnerability" => Self::Vulnerability,
            _ => Self::General,
        }
    }
}

/// Clone lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneStatus {
    Active,
    Paused,
    Training,
    Stopped,
}

impl std::fmt::Display for CloneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Training => "training",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Externally settable status values. `training` is reached only through
/// the training operations, so the update surface cannot express it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalStatus {
    Active,
    Paused,
    Stopped,
}

impl From<ExternalStatus> for CloneStatus {
    fn from(s: ExternalStatus) -> Self {
        match s {
            ExternalStatus::Active => CloneStatus::Active,
            ExternalStatus::Paused => CloneStatus::Paused,
            ExternalStatus::Stopped => CloneStatus::Stopped,
        }
    }
}

/// Background scan worker status for one clone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Idle,
    Scanning,
    Error,
}

impl Default for ScanStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Simulated performance counters for one clone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub requests_processed: u64,
    pub average_response_time_ms: f64,
}

/// Metric keys that `complete_training` is allowed to overwrite
const KNOWN_METRIC_KEYS: [&str; 4] = ["accuracy", "precision", "recall", "f1"];

impl PerformanceMetrics {
    /// Fold one processed request into the counters. The average response
    /// time is an incremental running mean, not a windowed one.
    pub fn record_request(&mut self, elapsed_ms: f64) {
        self.requests_processed += 1;
        let n = self.requests_processed as f64;
        self.average_response_time_ms += (elapsed_ms - self.average_response_time_ms) / n;
    }

    /// Merge training results into the metrics. Only the known metric keys
    /// are accepted; everything else in the results map is ignored.
    /// Returns how many keys were merged.
    pub fn merge_results(&mut self, results: &serde_json::Value) -> usize {
        let map = match results.as_object() {
            Some(m) => m,
            None => return 0,
        };

        let mut merged = 0;
        for key in KNOWN_METRIC_KEYS {
            if let Some(value) = map.get(key).and_then(|v| v.as_f64()) {
                let clamped = value.clamp(0.0, 1.0);
                match key {
                    "accuracy" => self.accuracy = clamped,
                    "precision" => self.precision = clamped,
                    "recall" => self.recall = clamped,
                    "f1" => self.f1 = clamped,
                    _ => unreachable!(),
                }
                merged += 1;
            }
        }
        merged
    }
}

/// Training session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    InProgress,
    Completed,
}

/// One simulated training run on a clone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TrainingStatus,
    /// Opaque caller-supplied parameters
    pub params: serde_json::Value,
    /// Opaque results, filled in on completion
    pub results: serde_json::Value,
}

impl TrainingSession {
    pub fn start(params: serde_json::Value) -> Self {
        Self {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            started_at: Utc::now(),
            completed_at: None,
            status: TrainingStatus::InProgress,
            params,
            results: serde_json::Value::Null,
        }
    }
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

/// The persistent record of one clone. Owned exclusively by the registry;
/// the scan scheduler only ever holds a reference to the live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneRecord {
    pub id: String,
    pub name: String,
    pub specialization: Specialization,
    pub learning_rate: f64,
    pub confidence_threshold: f64,
    pub status: CloneStatus,
    /// Status held before the current training run started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<CloneStatus>,
    /// Dotted integer triple; the patch segment increments on completed training
    pub version: String,
    pub performance_metrics: PerformanceMetrics,
    pub training_sessions: Vec<TrainingSession>,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    #[serde(default)]
    pub scan_status: ScanStatus,
    #[serde(default)]
    pub last_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl CloneRecord {
    pub fn new(
        name: impl Into<String>,
        specialization: Specialization,
        learning_rate: f64,
        confidence_threshold: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("clone_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            specialization,
            learning_rate: clamp_learning_rate(learning_rate),
            confidence_threshold: clamp_confidence_threshold(confidence_threshold),
            status: CloneStatus::Active,
            previous_status: None,
            version: "1.0.0".to_string(),
            performance_metrics: PerformanceMetrics::default(),
            training_sessions: Vec::new(),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            scan_status: ScanStatus::Idle,
            last_scan_at: None,
            created_at: now,
            last_active_at: now,
        }
    }

    /// Increment the patch segment of the version triple. An unparseable
    /// version is reset to 1.0.0 before bumping.
    pub fn bump_patch_version(&mut self) {
        let parts: Vec<Option<u64>> = self
            .version
            .split('.')
            .map(|p| p.parse::<u64>().ok())
            .collect();

        self.version = match parts.as_slice() {
            [Some(major), Some(minor), Some(patch)] => {
                format!("{}.{}.{}", major, minor, patch + 1)
            }
            _ => {
                warn!("Unparseable clone version '{}', resetting", self.version);
                "1.0.1".to_string()
            }
        };
    }

    /// The in-progress session, if any. The training state machine keeps
    /// at most one session in progress per clone.
    pub fn in_progress_session(&self) -> Option<&TrainingSession> {
        self.training_sessions
            .iter()
            .find(|s| s.status == TrainingStatus::InProgress)
    }
}

/// Patch applied by the external update surface. Absent fields are left
/// untouched; numeric fields are clamped on write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloneUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub status: Option<ExternalStatus>,
}

pub fn clamp_learning_rate(value: f64) -> f64 {
    value.clamp(LEARNING_RATE_MIN, LEARNING_RATE_MAX)
}

pub fn clamp_confidence_threshold(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
