//! Statistical scoring: per-token probabilities and their combination
//! into a verdict.

pub mod combine;
pub mod stat;
