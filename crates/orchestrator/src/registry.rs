//! Named generation providers and the default provider per asset kind.

use std::collections::HashMap;
use std::sync::Arc;

use scenegen_core::asset::AssetKind;
use scenegen_providers::{GenerationProvider, ProviderApi, ProviderError};

use crate::config::ProviderSettings;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
    defaults: HashMap<AssetKind, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP clients for every configured provider, sharing one
    /// connection pool.
    pub fn from_settings(
        settings: &[ProviderSettings],
        request_timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        let mut registry = Self::new();
        for provider in settings {
            let api = ProviderApi::with_client(
                client.clone(),
                provider.name.clone(),
                provider.dialect,
                provider.base_url.clone(),
                provider.api_key.clone(),
            );
            registry.register(Arc::new(api), &provider.kinds);
        }
        Ok(registry)
    }

    /// Add a provider, making it the default for `default_for` kinds. The
    /// first provider registered for a kind wins.
    pub fn register(&mut self, provider: Arc<dyn GenerationProvider>, default_for: &[AssetKind]) {
        let name = provider.name().to_string();
        for kind in default_for {
            self.defaults.entry(*kind).or_insert_with(|| name.clone());
        }
        tracing::debug!(provider = %name, ?default_for, "Registered generation provider");
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(name).cloned()
    }

    /// The named provider, or the default for `kind` when `name` is `None`.
    pub fn resolve(
        &self,
        kind: AssetKind,
        name: Option<&str>,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        let name = match name {
            Some(name) => name,
            None => self.defaults.get(&kind).map(String::as_str).ok_or_else(|| {
                ProviderError::NotConfigured(format!("kind {kind}"))
            })?,
        };
        self.get(name)
            .ok_or_else(|| ProviderError::NotConfigured(format!("name '{name}'")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
