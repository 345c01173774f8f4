//! Compiled pattern lists used by the decision hub and the heuristic engine.
//!
//! Patterns are written against normalized text (lowercase, no diacritics,
//! single-spaced), see [`promptweave_core::text::normalize`].

use regex_lite::Regex;
use tracing::warn;

/// An ordered list of compiled patterns.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    patterns: Vec<Regex>,
}

impl Lexicon {
    /// Compile `patterns`, skipping (and logging) any that fail to compile.
    pub fn new(patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Skipping invalid lexicon pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn any(&self, text: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(text))
    }

    /// Number of distinct patterns that match.
    pub fn count(&self, text: &str) -> usize {
        self.patterns.iter().filter(|re| re.is_match(text)).count()
    }

    /// Source of the first matching pattern.
    pub fn first(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(text))
            .map(Regex::as_str)
    }

    /// Sources of every matching pattern, in declaration order.
    pub fn matches(&self, text: &str) -> Vec<&str> {
        self.patterns
            .iter()
            .filter(|re| re.is_match(text))
            .map(Regex::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
