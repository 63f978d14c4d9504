pub mod evaluator;
pub mod generator;
