use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post, put};
use axum::Router;

use super::rate_limit::{RateLimiter, rate_limit_middleware};
use super::{comments, moderation, publish, skills, stars, tokens};
use crate::blob::BlobStore;
use crate::registry::Registry;
use crate::store::Store;

/// Bundles are capped at 50 MB; leave room for multipart framing.
const BODY_LIMIT: usize = 52 * 1024 * 1024;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<BlobStore>,
    pub registry: Registry,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<BlobStore>, registry: Registry) -> Self {
        Self {
            store,
            blobs,
            registry,
            limiter: RateLimiter::new(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/search", get(skills::search))
        .route("/skills", get(skills::list_skills))
        .route("/skills", post(publish::publish_skill))
        .route("/skills/{slug}", get(skills::get_skill))
        .route("/skills/{slug}", delete(moderation::soft_delete_skill))
        .route("/skills/{slug}/undelete", post(moderation::undelete_skill))
        .route("/skills/{slug}/versions", get(skills::list_versions))
        .route("/skills/{slug}/versions/{version}", get(skills::get_version))
        .route("/skills/{slug}/file", get(skills::get_file))
        .route("/skills/{slug}/tags", put(moderation::update_tags))
        .route("/skills/{slug}/comments", get(comments::list_comments))
        .route("/skills/{slug}/comments", post(comments::create_comment))
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/skill/resolve", get(skills::resolve))
        .route("/download", get(skills::download))
        .route("/whoami", get(skills::whoami))
        .route("/installs", post(skills::report_install))
        .route("/stars/{slug}", post(stars::star_skill))
        .route("/stars/{slug}", delete(stars::unstar_skill))
        .route("/tokens", get(tokens::list_tokens))
        .route("/tokens", post(tokens::create_token))
        .route("/tokens/{id}", delete(tokens::revoke_token))
        .route("/mod/skills/{slug}/badges", post(moderation::set_badge))
        .route(
            "/mod/skills/{slug}/badges/{kind}",
            delete(moderation::delete_badge),
        )
        .route("/mod/skills/{slug}/duplicate", post(moderation::set_duplicate))
        .route("/mod/skills/{slug}/owner", post(moderation::change_owner))
        .route("/admin/skills/{slug}", delete(moderation::hard_delete_skill));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn(log_request))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
