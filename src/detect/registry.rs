use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};

use crate::config::DetectionSettings;

use super::backend::DetectorBackend;
use super::backends::{ReplayBackend, StubBackend};

type BackendFactory = Box<dyn Fn(&DetectionSettings) -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Registry of detector backend constructors, keyed by configuration name.
///
/// Backends are built on demand so that only the selected one loads its
/// model or replay file.
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every backend compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("stub", |_| Ok(Box::new(StubBackend::demo())));
        registry.register("replay", |settings| {
            let path = settings
                .replay_path
                .as_ref()
                .ok_or_else(|| anyhow!("replay backend requires detection.replay_path"))?;
            Ok(Box::new(ReplayBackend::open(path)?))
        });
        #[cfg(feature = "backend-tract")]
        registry.register("tract", |settings| {
            let path = settings
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract backend requires detection.model_path"))?;
            Ok(Box::new(super::backends::TractBackend::new(
                path,
                settings.input_size,
                settings.input_size,
                settings.class_names.clone(),
            )?))
        });
        registry
    }

    /// Register a backend constructor. Re-registering a name replaces it.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&DetectionSettings) -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Build and warm up the backend named by `settings.backend`.
    pub fn build(&self, settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
        let factory = self.factories.get(&settings.backend).ok_or_else(|| {
            anyhow!(
                "detector backend '{}' not available (registered: {})",
                settings.backend,
                self.list().join(", ")
            )
        })?;
        let mut backend = factory(settings)
            .with_context(|| format!("failed to build detector backend '{}'", settings.backend))?;
        backend
            .warm_up()
            .with_context(|| format!("detector backend '{}' failed to warm up", settings.backend))?;
        log::info!("detector backend: {}", backend.name());
        Ok(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(backend: &str) -> DetectionSettings {
        DetectionSettings {
            backend: backend.to_string(),
            ..DetectionSettings::default()
        }
    }

    #[test]
    fn builtin_registry_builds_stub() {
        let registry = BackendRegistry::with_builtin();
        assert!(registry.contains("stub"));
        assert!(registry.contains("replay"));
        let backend = registry.build(&settings("stub")).unwrap();
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn unknown_backend_lists_alternatives() {
        let registry = BackendRegistry::with_builtin();
        let err = registry.build(&settings("yolo-cloud")).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("yolo-cloud"));
        assert!(message.contains("stub"));
    }

    #[test]
    fn replay_without_path_fails() {
        let registry = BackendRegistry::with_builtin();
        assert!(registry.build(&settings("replay")).is_err());
    }

    #[test]
    fn custom_factories_can_be_registered() {
        let mut registry = BackendRegistry::new();
        registry.register("scripted", |_| Ok(Box::new(StubBackend::new())));
        assert_eq!(registry.list(), vec!["scripted".to_string()]);
        assert!(registry.build(&settings("scripted")).is_ok());
    }
}
