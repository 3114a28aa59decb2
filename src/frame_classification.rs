pub mod classifier;

pub use classifier::{validate_rule, CompiledRule, FrameClassifier, ValidationReport};
