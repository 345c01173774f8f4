//! Module rules: declarative boolean gates over the decision snapshot.
//!
//! Rules are written as short expressions in the selection matrix and
//! compiled once into a tagged-predicate tree:
//!
//! ```text
//! "intensity>=7 && level>=2 && !practical_request"
//!
//!            And
//!           /   \
//!         And    Not
//!        /   \     \
//!  intensity  level  practical_request
//!    >= 7     >= 2
//! ```
//!
//! Evaluation walks the tree against a typed [`RuleContext`]; there is no
//! string interpretation at request time.

mod model;
mod parser;

pub use model::{ModuleRule, RuleOutcome, RuleSet};
pub use parser::{Atom, Condition, Op, RuleContext, Variable, parse_rule};
