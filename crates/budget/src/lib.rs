//! Token budget estimation and progressive reduction.
//!
//! Estimates the token cost of JSON values with a cheap deterministic
//! heuristic, derives available budgets from a model limit, and shrinks
//! collection-shaped payloads through fixed retention steps until they
//! fit. Estimation and reduction stay decoupled: `reduce` takes the
//! per-item estimator as a closure, so a real tokenizer can be swapped
//! in without touching the search.

pub mod estimate;
pub mod limit;
pub mod reduce;
pub mod shape;

pub use estimate::{estimate_text, estimate_tokens};
pub use limit::{calculate_token_budget, SafetyMargin};
pub use reduce::{reduce, reduce_best, reduce_with_priority, Reduction, StrategyKind};
pub use shape::{shape_to_budget, ShapeOutcome, Shaped};
