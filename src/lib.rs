//! # ClawdHub
//!
//! A registry for versioned skill bundles, usable both as a standalone server
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! clawdhub = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use clawdhub::blob::BlobStore;
//! use clawdhub::registry::{HashEmbeddingProvider, Registry};
//! use clawdhub::server::{AppState, create_router};
//! use clawdhub::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/clawdhub.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let store: Arc<dyn Store> = Arc::new(store);
//! let blobs = Arc::new(BlobStore::new(&PathBuf::from("./data")));
//! let embedder = Arc::new(HashEmbeddingProvider::default());
//! let registry = Registry::new(store.clone(), blobs.clone(), embedder, None);
//! let state = Arc::new(AppState::new(store, blobs, registry));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the `clawdhub` sync CLI. Disable with
//!   `default-features = false`.

pub mod auth;
pub mod blob;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;
