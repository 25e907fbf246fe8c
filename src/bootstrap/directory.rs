//! Directory of successfully activated modules, keyed by module id.

use dashmap::DashMap;
use std::sync::Arc;

use super::module::IntegrationModule;

#[derive(Default)]
pub struct ActiveModules {
    modules: DashMap<String, Arc<dyn IntegrationModule>>,
}

impl std::fmt::Debug for ActiveModules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveModules")
            .field("module_ids", &self.ids())
            .finish()
    }
}

impl ActiveModules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, module_id: impl Into<String>, module: Arc<dyn IntegrationModule>) {
        self.modules.insert(module_id.into(), module);
    }

    pub fn get(&self, module_id: &str) -> Option<Arc<dyn IntegrationModule>> {
        self.modules.get(module_id).map(|m| Arc::clone(m.value()))
    }

    pub fn remove(&self, module_id: &str) -> Option<Arc<dyn IntegrationModule>> {
        self.modules.remove(module_id).map(|(_, module)| module)
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.modules.contains_key(module_id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules.iter().map(|m| m.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Remove and return every active module
    pub fn drain(&self) -> Vec<(String, Arc<dyn IntegrationModule>)> {
        let ids = self.ids();
        ids.into_iter()
            .filter_map(|id| self.remove(&id).map(|module| (id, module)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
