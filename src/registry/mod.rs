mod bundle;
mod changelog;
mod embeddings;
mod fingerprint;
mod moderation;
mod publish;
mod resolve;
mod search;

pub use bundle::{
    MAX_BUNDLE_BYTES, MoltbotMeta, MoltbotRequires, ParsedBundle, build_embedding_text,
    is_allowed_file, is_skill_md, sanitize_path, validate_slug,
};
pub use changelog::{AutoChangelog, ChangelogContext, ChangelogGenerator};
pub use embeddings::{EMBEDDING_DIM, EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider};
pub use fingerprint::{bundle_fingerprint, is_hex64, sha256_hex};
pub use publish::{ForkOfInput, PublishFile, PublishInput, PublishOutcome};
pub use resolve::ResolveOutcome;
pub use search::{SearchHit, SearchRequest, tokenize};

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::store::Store;

/// The registry engine: publish pipeline, fingerprint resolver, hybrid
/// search, and moderation operations, behind one handle.
///
/// External collaborators (embedding provider, changelog summarizer) are
/// injected; the engine owns no global state.
#[derive(Clone)]
pub struct Registry {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) blobs: Arc<BlobStore>,
    pub(crate) embedder: Arc<dyn EmbeddingProvider>,
    pub(crate) changelog: Arc<dyn ChangelogGenerator>,
}

impl Registry {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<BlobStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        changelog: Option<Arc<dyn ChangelogGenerator>>,
    ) -> Self {
        Self {
            store,
            blobs,
            embedder,
            changelog: changelog.unwrap_or_else(|| Arc::new(AutoChangelog)),
        }
    }
}
