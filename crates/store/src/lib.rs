//! Module sources and analytics storage for PromptWeave.
//!
//! - [`FileModuleSource`]: module text files under one or more roots.
//! - [`InMemoryModuleSource`]: a name → text map for tests and embedding.
//! - [`InMemoryAnalytics`]: bandit posteriors and value-per-token statistics.

pub mod analytics;
pub mod file_backend;
pub mod in_memory;
pub mod token_cache;

pub use analytics::InMemoryAnalytics;
pub use promptweave_core::BanditPriors;
pub use file_backend::FileModuleSource;
pub use in_memory::InMemoryModuleSource;
pub use token_cache::TokenCounter;
