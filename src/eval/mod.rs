pub mod evaluator;
pub(crate) mod operators;
