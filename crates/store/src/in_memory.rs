//! In-memory module source: useful for testing and embedding.

use async_trait::async_trait;
use promptweave_core::error::StoreError;
use promptweave_core::module::ModuleSource;
use promptweave_core::text::normalize_key;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::token_cache::TokenCounter;

/// A module source backed by a map of name → text.
pub struct InMemoryModuleSource {
    modules: Arc<RwLock<HashMap<String, (String, String)>>>,
    tokens: TokenCounter,
}

impl InMemoryModuleSource {
    pub fn new() -> Self {
        Self {
            modules: Arc::new(RwLock::new(HashMap::new())),
            tokens: TokenCounter::default(),
        }
    }

    /// Build a source from `(name, text)` pairs.
    pub fn with_modules<I, N, T>(modules: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let map = modules
            .into_iter()
            .map(|(name, text)| {
                let name = name.into();
                (normalize_key(&name), (name, text.into()))
            })
            .collect();
        Self {
            modules: Arc::new(RwLock::new(map)),
            tokens: TokenCounter::default(),
        }
    }

    pub async fn insert(&self, name: &str, text: &str) {
        self.modules
            .write()
            .await
            .insert(normalize_key(name), (name.to_string(), text.to_string()));
    }

    pub async fn remove(&self, name: &str) -> bool {
        self.modules.write().await.remove(&normalize_key(name)).is_some()
    }
}

impl Default for InMemoryModuleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModuleSource for InMemoryModuleSource {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn read(&self, name: &str) -> Result<Option<String>, StoreError> {
        let modules = self.modules.read().await;
        Ok(modules
            .get(&normalize_key(name))
            .map(|(_, text)| text.trim().to_string()))
    }

    fn token_count(&self, name: &str, text: &str) -> usize {
        self.tokens.count(&normalize_key(name), text)
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .modules
            .read()
            .await
            .values()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
