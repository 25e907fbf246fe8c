//! # Health Module
//!
//! Service probing and the bridge-level health verdict.
//!
//! ## Architecture
//!
//! ```text
//! ServiceHealthProbe (per service, TTL cached)
//!        │
//!        ▼
//! CompositeProbeAggregator (bounded pool, shared deadline)
//!        │ ServiceHealthView
//!        ▼
//! HealthManager ◄── module status updates (bootstrap, request gate)
//!        │
//!        ▼
//! AggregateHealth (GET /health)
//! ```

pub mod aggregator;
pub mod manager;
pub mod probe;
pub mod types;
pub mod version;

pub use aggregator::{CompositeProbeAggregator, ServiceHealthView};
pub use manager::{HealthManager, NO_ACTIVE_INTEGRATION, SERVICES_UNAVAILABLE, SUCCESS_MESSAGE};
pub use probe::{
    FetchResponse, HealthFetcher, HealthProbe, ReqwestFetcher, ServiceHealthProbe,
    ServiceVersionUpdated,
};
pub use types::{
    AggregateHealth, Compatibility, Connectivity, FlagValue, HealthStatus, ModuleFlags,
    ModuleRecord, ModuleStatus, ProbeResult, ServiceHealthReport,
};
pub use version::{check_compatibility, ServiceVersion, VersionError};
