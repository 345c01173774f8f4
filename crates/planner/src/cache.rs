//! Memoized base context per conversational signature.

use moka::sync::Cache;
use std::sync::Arc;
use tracing::debug;

/// What identifies a reusable context.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyParts<'a> {
    pub identity: Option<&'a str>,
    pub openness: u8,
    pub intensity: f64,
    pub memory_count: usize,
    pub has_steps: bool,
    pub has_derived_context: bool,
    pub hybrid_opening: bool,
    pub has_heuristic_flags: bool,
    pub has_embedding: bool,
}

impl CacheKeyParts<'_> {
    pub fn key(&self) -> String {
        let bit = |b: bool| u8::from(b);
        format!(
            "ctx:{}:{}:{}:ms{}:v{}:d{}:a{}:h{}:e{}",
            self.identity.filter(|id| !id.is_empty()).unwrap_or("anon"),
            self.openness,
            self.intensity.round() as i64,
            self.memory_count,
            bit(self.has_steps),
            bit(self.has_derived_context),
            bit(self.hybrid_opening),
            bit(self.has_heuristic_flags),
            bit(self.has_embedding),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedContext {
    pub text: String,
    pub footers: Vec<String>,
    pub tokens_used: usize,
}

pub struct ContextCache {
    cache: Cache<String, Arc<CachedContext>>,
}

impl ContextCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    /// Contexts built with memories are never served from cache.
    pub fn lookup(&self, parts: &CacheKeyParts<'_>) -> Option<Arc<CachedContext>> {
        if parts.memory_count > 0 {
            return None;
        }
        let key = parts.key();
        let hit = self.cache.get(&key);
        if hit.is_some() {
            debug!(key = %key, "Context cache hit");
        }
        hit
    }

    /// Store a context. Only shallow turns (openness ≤ 2) without
    /// memories are kept. Returns whether the entry was stored.
    pub fn store(&self, parts: &CacheKeyParts<'_>, context: CachedContext) -> bool {
        if parts.openness > 2 || parts.memory_count > 0 {
            return false;
        }
        self.cache.insert(parts.key(), Arc::new(context));
        true
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(512)
    }
}
