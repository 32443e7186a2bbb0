//! Exercise catalog and workout plan building on top of ExerciseDB results.

pub mod catalog;
pub mod plan;
