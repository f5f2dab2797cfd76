use std::collections::BTreeMap;

use crate::config::Config;
use crate::providers::{self, Category, ProviderDescriptor};
use crate::RegistryError;

/// Prioritized providers per category
///
/// Built once at startup and shared read-only afterwards (wrap it in an `Arc`).
/// Each category's list is kept sorted by ascending priority; providers with
/// equal priority stay in registration order.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<Category, Vec<ProviderDescriptor>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from configuration, registering providers in file order
    pub fn from_config(config: &Config, client: &reqwest::Client) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for provider in &config.providers {
            let backend = providers::build_backend(provider, &config.http, client);
            registry.register(ProviderDescriptor::new(
                provider.name.clone(),
                provider.category,
                provider.priority,
                backend,
            ))?;
        }

        tracing::debug!(
            script = registry.list_providers(Category::Script).len(),
            image = registry.list_providers(Category::Image).len(),
            voice = registry.list_providers(Category::Voice).len(),
            "Provider registry built"
        );

        Ok(registry)
    }

    /// Register a provider under its category
    pub fn register(&mut self, descriptor: ProviderDescriptor) -> Result<(), RegistryError> {
        let list = self.providers.entry(descriptor.category()).or_default();

        if list.iter().any(|existing| existing.name() == descriptor.name()) {
            return Err(RegistryError::DuplicateProvider {
                category: descriptor.category(),
                name: descriptor.name().to_string(),
            });
        }

        list.push(descriptor);
        // sort_by_key is stable, so equal priorities keep registration order
        list.sort_by_key(ProviderDescriptor::priority);

        Ok(())
    }

    /// Providers of a category in the order they should be tried
    pub fn list_providers(&self, category: Category) -> &[ProviderDescriptor] {
        self.providers
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of registered providers
    pub fn len(&self) -> usize {
        self.providers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Artifact, GenerationRequest, ProviderBackend};
    use crate::ProviderError;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StaticBackend;

    #[async_trait]
    impl ProviderBackend for StaticBackend {
        fn is_configured(&self) -> bool {
            true
        }

        async fn is_connected(&self) -> Result<bool, ProviderError> {
            Ok(true)
        }

        async fn invoke(&self, _request: &GenerationRequest) -> Result<Artifact, ProviderError> {
            Ok(Artifact::Text("static".into()))
        }
    }

    fn descriptor(name: &str, category: Category, priority: i32) -> ProviderDescriptor {
        ProviderDescriptor::new(name, category, priority, Arc::new(StaticBackend))
    }

    fn names(registry: &ProviderRegistry, category: Category) -> Vec<&str> {
        registry
            .list_providers(category)
            .iter()
            .map(ProviderDescriptor::name)
            .collect()
    }

    #[test]
    fn test_sorted_by_priority() {
        let mut registry = ProviderRegistry::new();
        registry.register(descriptor("OpenAI", Category::Script, 3)).unwrap();
        registry.register(descriptor("Groq", Category::Script, 1)).unwrap();
        registry.register(descriptor("Gemini", Category::Script, 2)).unwrap();

        assert_eq!(names(&registry, Category::Script), ["Groq", "Gemini", "OpenAI"]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = ProviderRegistry::new();
        registry.register(descriptor("B", Category::Image, 5)).unwrap();
        registry.register(descriptor("A", Category::Image, 5)).unwrap();
        registry.register(descriptor("First", Category::Image, 1)).unwrap();
        registry.register(descriptor("C", Category::Image, 5)).unwrap();

        assert_eq!(names(&registry, Category::Image), ["First", "B", "A", "C"]);
    }

    #[test]
    fn test_duplicate_name_in_category_rejected() {
        let mut registry = ProviderRegistry::new();
        registry.register(descriptor("Groq", Category::Script, 1)).unwrap();

        let err = registry
            .register(descriptor("Groq", Category::Script, 2))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateProvider {
                category: Category::Script,
                name: "Groq".into(),
            }
        );
        assert_eq!(registry.list_providers(Category::Script).len(), 1);
    }

    #[test]
    fn test_same_name_in_different_categories_allowed() {
        let mut registry = ProviderRegistry::new();
        registry.register(descriptor("Google", Category::Script, 1)).unwrap();
        registry.register(descriptor("Google", Category::Voice, 1)).unwrap();

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_empty_category_is_valid() {
        let registry = ProviderRegistry::new();
        assert!(registry.list_providers(Category::Voice).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_from_config_registers_defaults() {
        let config = Config::default();
        let registry = ProviderRegistry::from_config(&config, &reqwest::Client::new()).unwrap();

        assert_eq!(registry.len(), 8);
        assert_eq!(
            names(&registry, Category::Image),
            ["Replicate", "HuggingFace", "Stability"]
        );
    }

    #[test]
    fn test_from_config_rejects_duplicates() {
        let mut config = Config::default();
        let mut duplicate = config.providers[0].clone();
        duplicate.priority = 9;
        config.providers.push(duplicate);

        let err = ProviderRegistry::from_config(&config, &reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateProvider { .. }));
    }
}
