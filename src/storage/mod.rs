// src/storage/mod.rs
pub mod json_file;
pub mod memory;
pub mod record_store;

pub use json_file::JsonFileRecordStore;
pub use memory::InMemoryRecordStore;
pub use record_store::{RecordStore, StatusUpdate};
