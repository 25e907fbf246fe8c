//! Module provisioning snapshots consulted by the bootstrap scheduler.

use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::info;

/// Source of the module types currently provisioned for this bridge
///
/// The bootstrap scheduler reads this once per tick; tickets whose type is missing from
/// the snapshot are deferred until the type appears.
pub trait ModuleConfiguration: Send + Sync {
    fn configured_module_types(&self) -> HashSet<String>;
}

/// Runtime-mutable provisioning set
#[derive(Debug, Default)]
pub struct DynamicModuleConfiguration {
    types: RwLock<HashSet<String>>,
}

impl DynamicModuleConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: RwLock::new(types.into_iter().map(Into::into).collect()),
        }
    }

    /// Provision a module type; returns false if it was already present
    pub fn provision(&self, module_type: impl Into<String>) -> bool {
        let module_type = module_type.into();
        let added = self.types.write().insert(module_type.clone());
        if added {
            info!(module_type = %module_type, "Module type provisioned");
        }
        added
    }

    /// Remove a module type; returns false if it was not provisioned
    pub fn deprovision(&self, module_type: &str) -> bool {
        let removed = self.types.write().remove(module_type);
        if removed {
            info!(module_type = %module_type, "Module type deprovisioned");
        }
        removed
    }

    pub fn is_provisioned(&self, module_type: &str) -> bool {
        self.types.read().contains(module_type)
    }
}

impl ModuleConfiguration for DynamicModuleConfiguration {
    fn configured_module_types(&self) -> HashSet<String> {
        self.types.read().clone()
    }
}
