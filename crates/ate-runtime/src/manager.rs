//! Registry of named runtimes.
//!
//! The manager owns every [`Runtime`] it creates and replays a shared set
//! of default objects and scripts into each new one, so all runtimes start
//! with the same capabilities.

use crate::config::ManagerConfig;
use crate::error::RuntimeResult;
use crate::events::EventProcessor;
use crate::runtime::{Runtime, RuntimeOptions};
use crate::value::ApiValue;
use ate_capability::CapabilitySurface;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Defaults replayed into every new runtime, in registration order.
#[derive(Debug, Default, Clone)]
struct Defaults {
    objects: Vec<(String, ApiValue)>,
    scripts: Vec<(String, String)>,
}

/// Owns the name → runtime map.
pub struct RuntimeManager {
    runtimes: RwLock<HashMap<String, Arc<Runtime>>>,
    defaults: Mutex<Defaults>,
    processor: Arc<dyn EventProcessor>,
    surface: CapabilitySurface,
    options: RuntimeOptions,
}

impl RuntimeManager {
    /// Create an empty manager whose runtimes subscribe through `processor`.
    pub fn new(processor: Arc<dyn EventProcessor>) -> Self {
        Self {
            runtimes: RwLock::new(HashMap::new()),
            defaults: Mutex::new(Defaults::default()),
            processor,
            surface: CapabilitySurface::default(),
            options: RuntimeOptions::default(),
        }
    }

    /// Use a different capability surface for runtimes created from now on.
    pub fn with_surface(mut self, surface: CapabilitySurface) -> Self {
        self.surface = surface;
        self
    }

    /// Use different per-runtime options.
    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Build a manager from config, registering its default script files.
    ///
    /// Every configured file must be readable.
    pub fn from_config(
        config: &ManagerConfig,
        processor: Arc<dyn EventProcessor>,
    ) -> RuntimeResult<Self> {
        config.validate()?;
        let manager = Self::new(processor)
            .with_surface(config.surface())
            .with_options(config.runtime_options());

        for path in &config.runtime.default_scripts {
            let source = std::fs::read_to_string(path)?;
            manager.push_script(format!("@{}", path.display()), source);
        }
        Ok(manager)
    }

    /// The capability surface bound into new runtimes.
    pub fn surface(&self) -> &CapabilitySurface {
        &self.surface
    }

    /// Create a runtime, apply the defaults and register it under `name`.
    ///
    /// A default object that fails to bind, or a default script that fails
    /// to run, is logged and skipped. An existing runtime with the same
    /// name is shut down before the new one initializes, so the two never
    /// hold the same subscription ids at once.
    pub fn create_runtime(&self, name: &str) -> RuntimeResult<Arc<Runtime>> {
        let previous = self.runtimes.write().remove(name);
        if let Some(old) = previous {
            warn!(runtime = %name, "Replacing existing runtime; shutting the old one down");
            old.shutdown();
        }

        let defaults = self.defaults.lock().clone();
        let runtime = Runtime::new(
            name,
            &self.surface,
            Arc::clone(&self.processor),
            &self.options,
        )?;

        for (object, value) in defaults.objects {
            if let Err(e) = runtime.bind_script_object(&object, value) {
                warn!(runtime = %name, "Failed to bind default object {}: {}", object, e);
            }
        }
        for (label, source) in &defaults.scripts {
            match runtime.add_named_script(label, source) {
                Ok(()) => debug!(runtime = %name, "Loaded default script {}", label),
                Err(e) => warn!(runtime = %name, "Skipping default script {}: {}", label, e),
            }
        }

        let replaced = self
            .runtimes
            .write()
            .insert(name.to_string(), Arc::clone(&runtime));
        if let Some(old) = replaced {
            warn!(runtime = %name, "Runtime was created concurrently; shutting the other one down");
            old.shutdown();
        }

        info!(runtime = %name, "Created runtime");
        Ok(runtime)
    }

    /// Look up a runtime by name.
    pub fn get_runtime(&self, name: &str) -> Option<Arc<Runtime>> {
        self.runtimes.read().get(name).cloned()
    }

    /// Remove and shut down a runtime. Unknown names are ignored.
    pub fn remove_runtime(&self, name: &str) {
        let removed = self.runtimes.write().remove(name);
        if let Some(runtime) = removed {
            runtime.shutdown();
            info!(runtime = %name, "Removed runtime");
        }
    }

    /// Register a host value for runtimes created afterwards.
    pub fn register_api_object(&self, name: impl Into<String>, value: impl Into<ApiValue>) {
        self.defaults
            .lock()
            .objects
            .push((name.into(), value.into()));
    }

    /// Register script source for runtimes created afterwards.
    pub fn register_api_script(&self, source: impl Into<String>) {
        let mut defaults = self.defaults.lock();
        let label = format!("=api-script-{}", defaults.scripts.len() + 1);
        defaults.scripts.push((label, source.into()));
    }

    fn push_script(&self, label: String, source: String) {
        self.defaults.lock().scripts.push((label, source));
    }

    /// Shut down and forget every runtime.
    pub fn shutdown_runtimes(&self) {
        let drained: Vec<_> = self.runtimes.write().drain().collect();
        for (_, runtime) in &drained {
            runtime.shutdown();
        }
        info!("Shut down {} runtimes", drained.len());
    }

    /// Names of all registered runtimes, sorted.
    pub fn runtime_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.runtimes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered runtimes.
    pub fn runtime_count(&self) -> usize {
        self.runtimes.read().len()
    }
}

impl std::fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("runtimes", &self.runtime_names())
            .field("surface", &self.surface)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
