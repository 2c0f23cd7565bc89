pub mod memory;
pub mod s3;

pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, S3Settings};
