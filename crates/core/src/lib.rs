//! # Promptweave Core
//!
//! Domain types, traits, and error definitions for the Promptweave prompt
//! assembly pipeline. This crate has **no framework dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (module text source, bandit posterior store,
//! value-per-token statistics) is defined as a trait here. Implementations
//! live in `promptweave-store`. This enables:
//! - Swapping storage via configuration
//! - Easy testing with in-memory implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod analytics;
pub mod decision;
pub mod error;
pub mod module;
pub mod signal;
pub mod text;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use analytics::{BanditPosterior, BanditPriors, PosteriorStore, VptStats, VptStore};
pub use decision::{DecSnapshot, DecisionDebug, MEMORY_THRESHOLD, Openness, Step};
pub use error::{AnalyticsError, Error, ManifestError, Result, RuleError, StoreError};
pub use module::{FrontMatter, ModuleCandidate, ModuleSource};
pub use signal::{HeuristicSignalDetail, SignalSource};
