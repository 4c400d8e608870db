pub mod collection;
pub mod credentials;
pub mod error;
pub mod file_collection;
pub mod firestore;
pub mod gateway;
pub mod key_order;
