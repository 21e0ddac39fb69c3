//! Provider registry for dynamic provider resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use fsgate_common::{Error, Result};

use crate::provider::FileProvider;

#[derive(Default)]
struct RegistryState {
    providers: HashMap<String, Arc<dyn FileProvider>>,
    current: Option<String>,
}

/// Registry of named providers with a current default.
///
/// The registry is an ordinary value: construct one, share it behind an
/// `Arc`, and hand it to a dispatcher. Separate registries never observe
/// each other's providers.
pub struct ProviderRegistry {
    state: RwLock<RegistryState>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Register a provider under `name`.
    ///
    /// # Postconditions
    /// - A provider already registered under `name` is replaced
    /// - If no provider is current, this one becomes current
    ///
    /// # Errors
    /// - Returns error if `name` is empty
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn FileProvider>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "Provider name cannot be empty".to_string(),
            ));
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.providers.insert(name.clone(), provider).is_some() {
            debug!("Replaced provider '{}'", name);
        } else {
            debug!("Registered provider '{}'", name);
        }
        if state.current.is_none() {
            info!("Using provider '{}' by default", name);
            state.current = Some(name);
        }
        Ok(())
    }

    /// Switch the current provider.
    ///
    /// # Errors
    /// - Provider not found; the current provider is left unchanged
    pub fn use_provider(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.providers.contains_key(name) {
            return Err(Error::NotFound(format!(
                "Provider '{}' is not registered",
                name
            )));
        }
        info!("Switched current provider to '{}'", name);
        state.current = Some(name.to_string());
        Ok(())
    }

    /// Initialize a registered provider with its configuration.
    ///
    /// Providers without initialization needs complete immediately.
    ///
    /// # Errors
    /// - Provider not found
    /// - Errors reported by the provider's own initialization
    pub async fn init(&self, name: &str, config: Value) -> Result<()> {
        let provider = self.get(name)?;
        debug!("Initializing provider '{}'", name);
        provider.init(config).await
    }

    /// Resolve a provider by name, or the current provider when `name` is None.
    ///
    /// # Errors
    /// - Provider not found
    /// - No name given and no provider is current
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<dyn FileProvider>> {
        match name {
            Some(name) => self.get(name),
            None => {
                let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
                state
                    .current
                    .as_ref()
                    .and_then(|current| state.providers.get(current))
                    .cloned()
                    .ok_or_else(|| Error::NotFound("No provider is selected".to_string()))
            }
        }
    }

    /// Get a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn FileProvider>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Provider '{}' is not registered", name)))
    }

    /// Name of the current provider.
    pub fn current_name(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    /// Get list of registered provider names.
    pub fn providers(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = state.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .providers
            .contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use crate::provider::Response;
    use crate::request::FileRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingInit {
        inits: AtomicU32,
    }

    #[async_trait]
    impl FileProvider for CountingInit {
        fn name(&self) -> &str {
            "counting"
        }

        async fn init(&self, config: Value) -> Result<()> {
            assert_eq!(config["apiKey"], "key");
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn handle(&self, _request: FileRequest) -> Result<Response> {
            Err(Error::NotSupported("counting".to_string()))
        }
    }

    #[test]
    fn test_first_registered_becomes_current() {
        let registry = ProviderRegistry::new();
        assert!(registry.current_name().is_none());

        registry.register("a", Arc::new(MemoryProvider::new())).unwrap();
        registry.register("b", Arc::new(MemoryProvider::new())).unwrap();

        assert_eq!(registry.current_name().as_deref(), Some("a"));
        assert_eq!(registry.providers(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_use_switches_current() {
        let registry = ProviderRegistry::new();
        registry.register("a", Arc::new(MemoryProvider::new())).unwrap();
        registry.register("b", Arc::new(MemoryProvider::new())).unwrap();

        registry.use_provider("b").unwrap();
        assert_eq!(registry.current_name().as_deref(), Some("b"));
    }

    #[test]
    fn test_use_unknown_fails_and_keeps_current() {
        let registry = ProviderRegistry::new();
        registry.register("a", Arc::new(MemoryProvider::new())).unwrap();

        let result = registry.use_provider("missing");
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(registry.current_name().as_deref(), Some("a"));
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = ProviderRegistry::new();
        assert!(registry.resolve(None).is_err());
        assert!(registry.resolve(Some("unknown")).is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = ProviderRegistry::new();
        let result = registry.register("", Arc::new(MemoryProvider::new()));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(registry.current_name().is_none());
    }

    #[test]
    fn test_registries_are_isolated() {
        let first = ProviderRegistry::new();
        let second = ProviderRegistry::new();
        first.register("a", Arc::new(MemoryProvider::new())).unwrap();

        assert!(first.has_provider("a"));
        assert!(!second.has_provider("a"));
    }

    #[tokio::test]
    async fn test_init_invokes_provider_each_time() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(CountingInit {
            inits: AtomicU32::new(0),
        });
        registry.register("counting", provider.clone()).unwrap();

        let config = serde_json::json!({ "apiKey": "key" });
        registry.init("counting", config.clone()).await.unwrap();
        registry.init("counting", config).await.unwrap();

        assert_eq!(provider.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_init_without_override_is_noop() {
        let registry = ProviderRegistry::new();
        registry.register("memory", Arc::new(MemoryProvider::new())).unwrap();
        registry.init("memory", Value::Null).await.unwrap();
        assert!(registry.init("missing", Value::Null).await.is_err());
    }
}
