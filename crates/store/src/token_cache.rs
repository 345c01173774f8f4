//! Token counting with a bounded `(name, length)` cache.

use moka::sync::Cache;
use promptweave_core::token::estimate_tokens;

const DEFAULT_CAPACITY: u64 = 4096;

/// Caches token counts keyed by module name and text length.
///
/// A module whose text changes length gets a fresh entry; identical
/// reads hit the cache.
#[derive(Clone)]
pub struct TokenCounter {
    cache: Cache<(String, usize), usize>,
}

impl TokenCounter {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn count(&self, name: &str, text: &str) -> usize {
        let key = (name.to_string(), text.len());
        self.cache.get_with(key, || estimate_tokens(text))
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_match_estimate() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count("A.txt", "hello"), 2);
        assert_eq!(counter.count("A.txt", ""), 0);
    }

    #[test]
    fn cache_is_keyed_by_length() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count("A.txt", "abcd"), 1);
        // Same length, same name: cached value is reused.
        assert_eq!(counter.count("A.txt", "wxyz"), 1);
        assert_eq!(counter.count("A.txt", "abcdefgh"), 2);
    }
}
