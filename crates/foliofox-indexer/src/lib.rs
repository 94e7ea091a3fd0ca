#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod client;
mod error;
mod health;
mod http;
mod models;
mod rate_limit;
mod url;

// ============================================================================
// Public API
// ============================================================================

// Client
pub use client::{DefaultIndexerClient, IndexerClient};

// HTTP backend abstraction (public so adapters can inject their own)
pub use http::{HttpBackend, ReqwestBackend};

// Configuration
pub use models::IndexerClientConfig;

// Rate limiting
pub use rate_limit::{RateLimiter, RateLimiterSet};

// Health monitoring
pub use health::{HealthMonitor, HealthMonitorConfig};

// Errors
pub use error::IndexerError;

// Silence unused dev-dependency warnings
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tokio_test as _;
