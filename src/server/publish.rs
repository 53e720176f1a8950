use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::registry::{ForkOfInput, PublishFile, PublishInput, sha256_hex};

use super::AppState;
use super::dto::{FileRefBody, PublishRequestBody, PublishResponse};
use super::response::{ApiError, ApiResponse};

/// Publish a version. Accepts `application/json` with pre-uploaded file
/// references, or `multipart/form-data` with a `payload` field and the files
/// uploaded inline.
pub async fn publish_skill(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let (body, files) = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?;
        read_multipart(&state, multipart).await?
    } else if content_type.starts_with("application/json") {
        let Json(body): Json<PublishRequestBody> = Json::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?;
        let files = body
            .files
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .map(file_ref_to_input)
            .collect();
        (body, files)
    } else {
        return Err(ApiError::unsupported_media_type(
            "expected application/json or multipart/form-data",
        ));
    };

    let input = PublishInput {
        display_name: body
            .display_name
            .clone()
            .unwrap_or_else(|| body.slug.clone()),
        slug: body.slug,
        version: body.version,
        changelog: body.changelog,
        tags: body.tags.unwrap_or_default(),
        fork_of: body.fork_of.map(|f| ForkOfInput {
            slug: f.slug,
            version: f.version,
        }),
        source: body.source,
        files,
    };

    let outcome = state
        .registry
        .publish(input, &auth.user)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiResponse::success(PublishResponse {
        skill_id: outcome.skill.id,
        version_id: outcome.version.id,
        slug: outcome.skill.slug,
        version: outcome.version.version,
        fingerprint: outcome.version.fingerprint,
    })))
}

fn file_ref_to_input(f: &FileRefBody) -> PublishFile {
    PublishFile {
        path: f.path.clone(),
        size: f.size,
        storage_id: f.storage_id.clone(),
        sha256: f.sha256.clone(),
        content_type: f.content_type.clone(),
    }
}

/// Multipart layout: one `payload` field carrying the JSON metadata, then a
/// `files` part per bundle file whose filename is the relative path. Parts
/// are written to the object store before the pipeline runs; orphans from a
/// failed publish are reclaimed by blob garbage collection.
async fn read_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(PublishRequestBody, Vec<PublishFile>), ApiError> {
    let mut payload: Option<PublishRequestBody> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart field: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("payload") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("invalid payload field: {e}")))?;
                payload = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| ApiError::bad_request(format!("invalid payload JSON: {e}")))?,
                );
            }
            Some("files") => {
                let path = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::bad_request("file part missing a filename"))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file part: {e}")))?;

                let sha256 = sha256_hex(&bytes);
                let storage_id = state
                    .blobs
                    .put(&bytes)
                    .await
                    .map_err(|_| ApiError::internal("Failed to store file"))?;

                files.push(PublishFile {
                    path,
                    size: bytes.len() as i64,
                    storage_id,
                    sha256,
                    content_type,
                });
            }
            _ => continue,
        }
    }

    let payload = payload.ok_or_else(|| ApiError::bad_request("missing payload field"))?;
    Ok((payload, files))
}
