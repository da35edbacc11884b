use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use serde::Serialize;

use super::backend::DetectorBackend;
use super::backends::{ReplayBackend, StubBackend};

/// Backend plus the classes it can emit, for "model info" style reporting.
#[derive(Clone, Debug, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub is_default: bool,
    pub classes: Vec<String>,
}

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn DetectorBackend>>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry holding the backends that ship with the crate. `replay` is the default.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ReplayBackend::new());
        registry.register(StubBackend::new());
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get backend by name, failing with the list of known names.
    pub fn require(&self, name: &str) -> Result<Arc<Mutex<dyn DetectorBackend>>> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            )
        })
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Describe every registered backend, sorted by name.
    pub fn describe(&self) -> Result<Vec<BackendInfo>> {
        let mut out = Vec::with_capacity(self.backends.len());
        for name in self.list() {
            let backend = self.require(&name)?;
            let guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            out.push(BackendInfo {
                is_default: self.default_name.as_deref() == Some(name.as_str()),
                classes: guard.class_names().into_iter().map(String::from).collect(),
                name,
            });
        }
        Ok(out)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_defaults_to_replay() -> Result<()> {
        let registry = BackendRegistry::with_builtin();
        assert_eq!(registry.list(), vec!["replay", "stub"]);

        let backend = registry.default_backend().expect("default backend");
        let guard = backend.lock().map_err(|_| anyhow!("poisoned"))?;
        assert_eq!(guard.name(), "replay");
        Ok(())
    }

    #[test]
    fn set_default_rejects_unknown_backend() {
        let mut registry = BackendRegistry::with_builtin();
        assert!(registry.set_default("yolo").is_err());
        assert!(registry.set_default("stub").is_ok());
        let err = registry.require("yolo").err().expect("missing backend");
        assert!(err.to_string().contains("replay, stub"));
    }

    #[test]
    fn describe_marks_default_and_lists_classes() -> Result<()> {
        let mut registry = BackendRegistry::with_builtin();
        registry.set_default("stub")?;
        let infos = registry.describe()?;
        assert_eq!(infos.len(), 2);
        assert!(!infos[0].is_default);
        assert!(infos[1].is_default);
        assert_eq!(infos[0].classes, vec!["person", "helmet", "safety-vest"]);
        Ok(())
    }
}
