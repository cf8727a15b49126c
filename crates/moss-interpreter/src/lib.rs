//! Moss tree-walking evaluator.

pub mod evaluator;

pub use evaluator::eval_program;
