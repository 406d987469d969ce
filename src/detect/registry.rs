use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Shared detector handle. `detect` takes `&mut self`, and the polling loop moves the
/// call onto a blocking worker, so backends live behind `Arc<Mutex<..>>`.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Registry of detector backends selectable by name.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
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

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Backend by name, or an error listing what is available.
    pub fn select(&self, name: &str) -> Result<SharedBackend> {
        self.get(name).ok_or_else(|| {
            anyhow!(
                "unknown detector backend '{}' (available: {})",
                name,
                self.list().join(", ")
            )
        })
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
