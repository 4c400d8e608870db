pub mod error;
pub mod facade;
