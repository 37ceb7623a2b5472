pub mod exporter;
pub mod minio_client;
pub mod relation_store;

pub use exporter::*;
pub use minio_client::*;
pub use relation_store::*;
