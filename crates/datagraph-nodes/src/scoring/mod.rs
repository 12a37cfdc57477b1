//! Scoring nodes
//!
//! Nodes that rank rows.

mod weighted_scorer;

pub use weighted_scorer::{WeightedScorerConfig, WeightedScorerModel, WEIGHT_TOLERANCE};
