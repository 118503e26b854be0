//! Page prioritization.

pub mod priority;

pub use priority::{heuristic_score, PriorityScorer};
