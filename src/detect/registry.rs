use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};

use crate::config::DetectorSettings;

use super::backend::{DetectorBackend, DetectorMethod};

/// Builds a backend for a method from detector settings.
pub type BackendFactory =
    Box<dyn Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Reported when the requested method could not be built and the baseline
/// method was used instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackNotice {
    pub requested: DetectorMethod,
    pub active: DetectorMethod,
    pub reason: String,
}

/// A ready backend plus how it was chosen.
pub struct BackendSelection {
    pub backend: Box<dyn DetectorBackend>,
    pub active: DetectorMethod,
    pub fallback: Option<FallbackNotice>,
}

/// Registry of backend factories keyed by detection method.
///
/// HOG is the baseline: when any other method cannot be built, selection falls
/// back to HOG and reports it through `FallbackNotice` instead of failing.
pub struct BackendRegistry {
    factories: HashMap<DetectorMethod, BackendFactory>,
}

impl BackendRegistry {
    pub const BASELINE: DetectorMethod = DetectorMethod::Hog;

    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry populated with the backends compiled into this build.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DetectorMethod::Hog, super::backends::hog_backend);
        registry.register(DetectorMethod::Neural, super::backends::neural_backend);
        registry
    }

    /// Register (or replace) the factory for a method.
    pub fn register<F>(&mut self, method: DetectorMethod, factory: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn DetectorBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(method, Box::new(factory));
    }

    /// Methods with a registered factory.
    pub fn list(&self) -> Vec<DetectorMethod> {
        let mut methods: Vec<_> = self.factories.keys().copied().collect();
        methods.sort_by_key(|m| m.label());
        methods
    }

    /// Build and warm up the backend for exactly `method`.
    pub fn create(
        &self,
        method: DetectorMethod,
        settings: &DetectorSettings,
    ) -> Result<Box<dyn DetectorBackend>> {
        let factory = self
            .factories
            .get(&method)
            .ok_or_else(|| anyhow!("no backend registered for {}", method))?;
        let mut backend = factory(settings)?;
        backend
            .warm_up()
            .with_context(|| format!("{} backend warm-up failed", backend.name()))?;
        Ok(backend)
    }

    /// Build the backend for `requested`, falling back to the baseline method.
    ///
    /// Fails only when the baseline itself cannot be built.
    pub fn select(
        &self,
        requested: DetectorMethod,
        settings: &DetectorSettings,
    ) -> Result<BackendSelection> {
        match self.create(requested, settings) {
            Ok(backend) => Ok(BackendSelection {
                backend,
                active: requested,
                fallback: None,
            }),
            Err(err) if requested != Self::BASELINE => {
                let reason = format!("{:#}", err);
                log::info!(
                    "{} detector unavailable ({}); falling back to {}",
                    requested,
                    reason,
                    Self::BASELINE
                );
                let backend = self
                    .create(Self::BASELINE, settings)
                    .context("baseline detector unavailable")?;
                Ok(BackendSelection {
                    backend,
                    active: Self::BASELINE,
                    fallback: Some(FallbackNotice {
                        requested,
                        active: Self::BASELINE,
                        reason,
                    }),
                })
            }
            Err(err) => Err(err.context("baseline detector unavailable")),
        }
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
    use crate::detect::StubBackend;

    fn stub_factory(_: &DetectorSettings) -> Result<Box<dyn DetectorBackend>> {
        Ok(Box::new(StubBackend::new()))
    }

    fn registry_without_neural() -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(DetectorMethod::Hog, stub_factory);
        registry.register(DetectorMethod::Neural, |_| {
            Err(anyhow!("model file not found"))
        });
        registry
    }

    #[test]
    fn select_returns_requested_method_when_available() {
        let registry = registry_without_neural();
        let selection = registry
            .select(DetectorMethod::Hog, &DetectorSettings::default())
            .unwrap();
        assert_eq!(selection.active, DetectorMethod::Hog);
        assert!(selection.fallback.is_none());
    }

    #[test]
    fn select_falls_back_to_hog() {
        let registry = registry_without_neural();
        let selection = registry
            .select(DetectorMethod::Neural, &DetectorSettings::default())
            .unwrap();
        assert_eq!(selection.active, DetectorMethod::Hog);
        assert_eq!(selection.backend.method(), DetectorMethod::Hog);
        let notice = selection.fallback.expect("fallback notice");
        assert_eq!(notice.requested, DetectorMethod::Neural);
        assert!(notice.reason.contains("model file not found"));
    }

    #[test]
    fn select_fails_without_baseline() {
        let mut registry = BackendRegistry::new();
        registry.register(DetectorMethod::Hog, |_| Err(anyhow!("opencv missing")));
        assert!(registry
            .select(DetectorMethod::Neural, &DetectorSettings::default())
            .is_err());
        assert!(registry
            .select(DetectorMethod::Hog, &DetectorSettings::default())
            .is_err());
    }

    #[test]
    fn unregistered_method_is_an_error() {
        let registry = BackendRegistry::new();
        assert!(registry
            .create(DetectorMethod::Neural, &DetectorSettings::default())
            .is_err());
    }
}
