use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use clawdhub::auth::TokenGenerator;
use clawdhub::blob::BlobStore;
use clawdhub::registry::{HashEmbeddingProvider, Registry};
use clawdhub::server::{AppState, create_router};
use clawdhub::store::{SqliteStore, Store};
use clawdhub::types::{ApiToken, Role, User};

/// In-process registry server on an ephemeral port, with a deterministic
/// embedding provider and a temp data directory.
pub struct TestServer {
    pub base_url: String,
    pub state: Arc<AppState>,
    pub temp_dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let store = SqliteStore::new(temp_dir.path().join("clawdhub.db")).expect("open store");
        store.initialize().expect("initialize store");

        let store: Arc<dyn Store> = Arc::new(store);
        let blobs = Arc::new(BlobStore::new(temp_dir.path()));
        let embedder = Arc::new(HashEmbeddingProvider::default());
        let registry = Registry::new(store.clone(), blobs.clone(), embedder, None);
        let state = Arc::new(AppState::new(store, blobs, registry));

        let app = create_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            temp_dir,
        }
    }

    /// Creates a user directly in the store and returns (user id, raw token).
    pub fn create_user(&self, handle: &str, role: Role) -> (String, String) {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            handle: Some(handle.to_string()),
            display_name: None,
            image: None,
            role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.state.store.create_user(&user).expect("create user");

        let generator = TokenGenerator::new();
        let (raw_token, lookup, hash) = generator.generate().expect("generate token");
        let token = ApiToken {
            id: Uuid::new_v4().to_string(),
            token_hash: hash,
            token_lookup: lookup,
            user_id: user.id.clone(),
            label: Some("test".to_string()),
            created_at: now,
            revoked_at: None,
            last_used_at: None,
        };
        self.state.store.create_token(&token).expect("create token");

        (user.id, raw_token)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }
}

/// Multipart publish helper: one payload field plus inline file parts.
pub async fn publish_multipart(
    client: &reqwest::Client,
    server: &TestServer,
    token: &str,
    payload: serde_json::Value,
    files: &[(&str, &str)],
) -> reqwest::Response {
    let mut form = reqwest::multipart::Form::new().text("payload", payload.to_string());
    for (path, content) in files {
        let mime = match path.rsplit_once('.').map(|(_, ext)| ext) {
            Some("md") => "text/markdown",
            Some("png") => "image/png",
            _ => "text/plain",
        };
        let part = reqwest::multipart::Part::bytes(content.as_bytes().to_vec())
            .file_name(path.to_string())
            .mime_str(mime)
            .expect("mime");
        form = form.part("files", part);
    }

    client
        .post(server.url("/skills"))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .expect("publish request")
}

/// The fingerprint the server should assign to these files.
pub fn expected_fingerprint(files: &[(&str, &str)]) -> String {
    let hashes: Vec<(String, String)> = files
        .iter()
        .map(|(path, content)| {
            (
                path.to_string(),
                clawdhub::registry::sha256_hex(content.as_bytes()),
            )
        })
        .collect();
    clawdhub::registry::bundle_fingerprint(
        hashes.iter().map(|(p, h)| (p.as_str(), h.as_str())),
    )
}
