//! Prompt modules: reusable text fragments and where they come from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::StoreError;

/// Typed front-matter header of a module.
///
/// Every field is optional; an absent field never excludes a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontMatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_intensity: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_intensity: Option<u8>,

    /// Allowed openness levels. Empty means any level.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub openness_in: BTreeSet<u8>,

    #[serde(default)]
    pub require_vulnerability: bool,

    /// The module passes when at least one of these flags is set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags_any: Vec<String>,

    /// Ordering hint; lower sorts first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,

    /// Injection target (`footer` moves the module after the main body).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject_as: Option<String>,
}

impl FrontMatter {
    pub fn is_footer(&self) -> bool {
        self.inject_as
            .as_deref()
            .is_some_and(|target| target.eq_ignore_ascii_case("footer"))
    }
}

/// A loaded module ready for selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCandidate {
    pub name: String,
    /// Body text with the front-matter header removed.
    pub text: String,
    pub token_count: usize,
    #[serde(default)]
    pub meta: FrontMatter,
}

/// Source of raw module text.
///
/// Implementations: file roots on disk, in-memory map (tests and embedding).
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// The source name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Read a module by name. `Ok(None)` means "not found".
    async fn read(&self, name: &str) -> std::result::Result<Option<String>, StoreError>;

    /// Token count for `text`, cached by `(name, text length)`.
    fn token_count(&self, name: &str, text: &str) -> usize;

    /// All module names this source can resolve.
    async fn list(&self) -> std::result::Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_detection_ignores_case() {
        let meta = FrontMatter {
            inject_as: Some("Footer".into()),
            ..FrontMatter::default()
        };
        assert!(meta.is_footer());
        assert!(!FrontMatter::default().is_footer());
    }

    #[test]
    fn front_matter_uses_camel_case_keys() {
        let meta = FrontMatter {
            min_intensity: Some(7),
            openness_in: BTreeSet::from([2, 3]),
            ..FrontMatter::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("minIntensity"));
        assert!(json.contains("opennessIn"));
    }
}
