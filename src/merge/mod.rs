pub mod engine;

pub use engine::{merge, MergeOutcome};
