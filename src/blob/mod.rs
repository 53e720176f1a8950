mod storage;

pub use storage::{BlobStore, BlobStoreError, is_valid_storage_id};
