pub mod abbreviation;
pub mod local_time;
pub mod metric_document;
pub mod observation;
pub mod station;
