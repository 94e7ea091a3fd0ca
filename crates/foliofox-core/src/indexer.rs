//! Indexer registry records and health tracking.
//!
//! An indexer is an external, third-party search/download provider for book
//! metadata and files. The registry is owned by a collaborator (see
//! `ports::indexer_registry`); these are the domain types that cross that
//! boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for an indexer in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexerId(pub i64);

impl fmt::Display for IndexerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for IndexerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// An indexer as configured in the registry.
///
/// Carries everything the engine needs to talk to the indexer: endpoint,
/// credentials, rate-limit window and per-request timeout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Indexer {
    /// Registry identifier.
    pub id: IndexerId,
    /// Human-readable name for logs and UI.
    pub name: String,
    /// API base URL.
    pub base_url: String,
    /// API key, if the indexer requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Whether the indexer is enabled at all.
    pub enabled: bool,
    /// Requests admitted per rate-limit window.
    pub rate_limit_requests: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Indexer {
    /// Create an indexer record with default limits (60 requests/minute,
    /// 30 second timeout).
    pub fn new(id: IndexerId, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            enabled: true,
            rate_limit_requests: 60,
            rate_limit_window_secs: 60,
            timeout_secs: 30,
        }
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the rate limit (requests per window).
    #[must_use]
    pub const fn with_rate_limit(mut self, requests: u32, window_secs: u64) -> Self {
        self.rate_limit_requests = requests;
        self.rate_limit_window_secs = window_secs;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Rolling health status of an indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Probes succeed under the latency ceiling.
    Healthy,
    /// Probes succeed but slowly.
    Degraded,
    /// Probes fail or time out.
    Down,
    /// Taken out of rotation by an operator; never overwritten by probes.
    Maintenance,
}

impl HealthStatus {
    /// String representation for storage and wire formats.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Down => "down",
            Self::Maintenance => "maintenance",
        }
    }

    /// Whether new work (search fan-out, download admission) may target an
    /// indexer in this state. In-flight work is never preempted on a
    /// status change.
    #[must_use]
    pub const fn accepts_new_work(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record in an indexer's health time series.
///
/// The series is append-only; "current" health is the most recent record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexerHealth {
    /// The indexer this record describes.
    pub indexer_id: IndexerId,
    /// Observed status.
    pub status: HealthStatus,
    /// Probe round-trip time, when the probe completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Error message, when the probe failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
}

impl IndexerHealth {
    /// Record a successful probe under the latency ceiling.
    #[must_use]
    pub fn healthy(indexer_id: IndexerId, response_time_ms: u64) -> Self {
        Self {
            indexer_id,
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Record a successful but slow probe.
    #[must_use]
    pub fn degraded(indexer_id: IndexerId, response_time_ms: u64) -> Self {
        Self {
            indexer_id,
            status: HealthStatus::Degraded,
            response_time_ms: Some(response_time_ms),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// Record a failed probe.
    pub fn down(indexer_id: IndexerId, error: impl Into<String>) -> Self {
        Self {
            indexer_id,
            status: HealthStatus::Down,
            response_time_ms: None,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}
