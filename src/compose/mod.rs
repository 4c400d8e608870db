pub mod composer;
pub mod error;
