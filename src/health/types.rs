//! # Health Status Types
//!
//! Shared types for probe results, module records and the aggregate bridge verdict.
//! All types serialize to the JSON shape served by `GET /health`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Service Probe Types
// =============================================================================

/// Connectivity observed for one dependent service
///
/// `Unknown` is used before a service has been probed at all and is never treated as
/// healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connectivity {
    Up,
    Down,
    #[default]
    Unknown,
}

impl Connectivity {
    #[must_use]
    pub const fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Whether a service version satisfies the configured minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compatibility {
    Ok,
    #[default]
    Nok,
}

impl Compatibility {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Outcome of probing one dependent service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub service_name: String,
    pub connectivity: Connectivity,
    pub current_version: Option<String>,
    pub min_version: String,
    pub compatibility: Compatibility,
}

impl ProbeResult {
    /// A `Down`, incompatible result used when a probe could not produce one
    pub fn down(service_name: impl Into<String>, min_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            connectivity: Connectivity::Down,
            current_version: None,
            min_version: min_version.into(),
            compatibility: Compatibility::Nok,
        }
    }

    /// Up and compatible
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connectivity.is_up() && self.compatibility.is_ok()
    }
}

// =============================================================================
// Module Types
// =============================================================================

/// Activation status of an integration module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleStatus {
    #[default]
    Inactive,
    Active,
    #[serde(rename = "RETRYING_BOOTSTRAP")]
    Retrying,
    FailedBootstrap,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "INACTIVE"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Retrying => write!(f, "RETRYING_BOOTSTRAP"),
            Self::FailedBootstrap => write!(f, "FAILED_BOOTSTRAP"),
        }
    }
}

/// OK/NOK marker used by module flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlagValue {
    Ok,
    Nok,
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        if value {
            Self::Ok
        } else {
            Self::Nok
        }
    }
}

/// Setup checkpoints reported per module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFlags {
    pub parser_installed: FlagValue,
    pub configurator_installed: FlagValue,
    pub certificate_installed: FlagValue,
    pub user_authenticated: FlagValue,
}

impl Default for ModuleFlags {
    fn default() -> Self {
        Self {
            parser_installed: FlagValue::Ok,
            configurator_installed: FlagValue::Nok,
            certificate_installed: FlagValue::Nok,
            user_authenticated: FlagValue::Nok,
        }
    }
}

/// Health record for one integration module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    pub module_type: String,
    pub status: ModuleStatus,
    pub message: String,
    pub last_updated: DateTime<Utc>,
    pub flags: ModuleFlags,
    /// Last time the module successfully handled a request
    pub latest_post_timestamp: Option<DateTime<Utc>>,
    pub circuit_open: bool,
    pub attempt_count: u32,
}

impl ModuleRecord {
    pub fn new(
        id: impl Into<String>,
        module_type: impl Into<String>,
        status: ModuleStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            module_type: module_type.into(),
            status,
            message: message.into(),
            last_updated: Utc::now(),
            flags: ModuleFlags::default(),
            latest_post_timestamp: None,
            circuit_open: false,
            attempt_count: 0,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ModuleStatus::Active
    }
}

// =============================================================================
// Aggregate Types
// =============================================================================

/// Bridge-level verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Result of one composite probe aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealthReport {
    pub status: HealthStatus,
    pub services: BTreeMap<String, ProbeResult>,
}

impl ServiceHealthReport {
    /// Down if any result is Down or incompatible; an empty set is Up
    pub fn from_results(services: BTreeMap<String, ProbeResult>) -> Self {
        let status = if services.values().all(ProbeResult::is_healthy) {
            HealthStatus::Up
        } else {
            HealthStatus::Down
        };
        Self { status, services }
    }

    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}

/// Full bridge health, recomputed on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub message: String,
    pub version: String,
    pub checked_at: DateTime<Utc>,
    pub services: BTreeMap<String, ProbeResult>,
    pub modules: BTreeMap<String, ModuleRecord>,
}

impl AggregateHealth {
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.status == HealthStatus::Up
    }
}
