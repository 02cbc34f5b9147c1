//! Backend tag to constructor mapping, filled at startup.

use std::collections::HashMap;
use std::sync::Arc;

use trove_torrent_core::{FleetError, FleetResult, WorkerBackend, WorkerInstance};

type Constructor =
    Arc<dyn Fn(&WorkerInstance) -> FleetResult<Arc<dyn WorkerBackend>> + Send + Sync>;

/// Known worker backends keyed by the tag stored on worker rows.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, Constructor>,
}

impl BackendRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F)
    where
        F: Fn(&WorkerInstance) -> FleetResult<Arc<dyn WorkerBackend>> + Send + Sync + 'static,
    {
        self.constructors.insert(tag.into(), Arc::new(constructor));
    }

    /// Whether `tag` has a constructor.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build the backend for a worker row.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotFound`] for an unknown tag, or whatever the
    /// constructor reports.
    pub fn build(&self, instance: &WorkerInstance) -> FleetResult<Arc<dyn WorkerBackend>> {
        let constructor = self
            .constructors
            .get(&instance.backend)
            .ok_or_else(|| FleetError::not_found("backend", instance.backend.clone()))?;
        constructor(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trove_test_support::RecordingBackend;
    use trove_torrent_core::WorkerId;

    fn instance(tag: &str) -> WorkerInstance {
        WorkerInstance {
            id: WorkerId(1),
            backend: tag.to_string(),
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn unknown_tag_fails() {
        let registry = BackendRegistry::new();
        assert!(matches!(
            registry.build(&instance("deluge")),
            Err(FleetError::NotFound {
                entity: "backend",
                ..
            })
        ));
    }

    #[test]
    fn registered_tag_builds() {
        let mut registry = BackendRegistry::new();
        registry.register("fake", |_: &WorkerInstance| {
            Ok(Arc::new(RecordingBackend::new()) as Arc<dyn WorkerBackend>)
        });
        assert!(registry.contains("fake"));
        assert!(registry.build(&instance("fake")).is_ok());
    }
}
