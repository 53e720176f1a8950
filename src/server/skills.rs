use std::io::Write;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::auth::{OptionalUser, RequireUser};
use crate::registry::SearchRequest;
use crate::store::SkillSort;
use crate::types::{SkillInstall, SkillVersion};

use super::AppState;
use super::dto::*;
use super::response::{
    ApiError, ApiResponse, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PaginatedResponse, StoreOptionExt,
    StoreResultExt,
};
use super::validation::{clamp_limit, require_hex64, require_semver, require_slug};

/// Raw file reads refuse anything larger than this.
const MAX_RAW_FILE_BYTES: i64 = 200 * 1024;

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.q.unwrap_or_default();
    let request = SearchRequest {
        query,
        limit: params.limit.unwrap_or(10).clamp(1, 50),
        highlighted_only: params.highlighted_only.unwrap_or(false),
    };

    let hits = state
        .registry
        .search(&request)
        .await
        .api_err("Search failed")?;

    let results = hits
        .into_iter()
        .map(|hit| SearchResultEntry {
            score: hit.score,
            slug: hit.skill.slug,
            display_name: hit.skill.display_name,
            summary: hit.skill.summary,
            version: hit.version.version,
            updated_at: hit.skill.updated_at,
            owner: hit.owner_handle,
            badges: hit.badges.iter().map(|b| b.as_str().to_string()).collect(),
        })
        .collect();

    Ok(Json(ApiResponse::success(SearchResponse { results })))
}

pub async fn list_skills(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSkillsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(params.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let sort = match params.sort.as_deref() {
        None => SkillSort::Updated,
        Some(s) => SkillSort::parse(s)
            .ok_or_else(|| ApiError::bad_request(format!("unknown sort: {s}")))?,
    };

    // Only the updated sort honours the cursor; the rest are bounded pages.
    if sort != SkillSort::Updated {
        let skills = state
            .store
            .list_skills(sort, None, limit)
            .api_err("Failed to list skills")?;
        return Ok(Json(PaginatedResponse::new(skills, None, false)));
    }

    let skills = state
        .store
        .list_skills(sort, params.cursor.as_deref(), limit + 1)
        .api_err("Failed to list skills")?;

    let (skills, next_cursor, has_more) = super::response::paginate(skills, limit as usize, |s| {
        format!("{}|{}", s.updated_at.to_rfc3339(), s.id)
    });

    Ok(Json(PaginatedResponse::new(skills, next_cursor, has_more)))
}

pub async fn get_skill(
    auth: OptionalUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = state
        .store
        .get_skill_by_slug(&slug)
        .api_err("Failed to get skill")?
        .or_not_found("Skill not found")?;
    if skill.is_soft_deleted() {
        return Err(ApiError::gone("Skill has been deleted"));
    }

    let latest_version = match &skill.latest_version_id {
        Some(id) => state
            .store
            .get_version(id)
            .api_err("Failed to get version")?
            .as_ref()
            .map(VersionSummary::from),
        None => None,
    };

    let owner = state
        .store
        .get_user(&skill.owner_user_id)
        .api_err("Failed to get owner")?
        .as_ref()
        .map(OwnerSummary::from);

    let badges = state
        .store
        .list_badges(&skill.id)
        .api_err("Failed to list badges")?
        .iter()
        .map(|b| b.kind.as_str().to_string())
        .collect();

    let starred = match &auth.0 {
        Some(user) => Some(
            state
                .store
                .has_star(&user.id, &skill.id)
                .api_err("Failed to check star")?,
        ),
        None => None,
    };

    Ok(Json(ApiResponse::success(SkillDetailResponse {
        skill,
        latest_version,
        owner,
        badges,
        starred,
    })))
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<ListVersionsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = require_live_skill(&state, &slug)?;

    let limit = clamp_limit(params.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let versions = state
        .store
        .list_versions(&skill.id, params.cursor.as_deref(), limit + 1)
        .api_err("Failed to list versions")?;

    let versions: Vec<SkillVersion> = versions
        .into_iter()
        .filter(|v| v.soft_deleted_at.is_none())
        .collect();

    let (versions, next_cursor, has_more) =
        super::response::paginate(versions, limit as usize, |v| v.id.clone());
    let summaries: Vec<VersionSummary> = versions.iter().map(VersionSummary::from).collect();

    Ok(Json(PaginatedResponse::new(summaries, next_cursor, has_more)))
}

pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path((slug, version)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require_semver(&version)?;
    let skill = require_live_skill(&state, &slug)?;

    let version = state
        .store
        .get_version_by_number(&skill.id, &version)
        .api_err("Failed to get version")?
        .or_not_found("Version not found")?;
    if version.soft_deleted_at.is_some() {
        return Err(ApiError::gone("Version has been deleted"));
    }

    Ok(Json(ApiResponse::success(VersionDetail::from(&version))))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<FileParams>,
) -> Result<Response, ApiError> {
    let skill = require_live_skill(&state, &slug)?;
    let version = resolve_version_selector(
        &state,
        &skill,
        params.version.as_deref(),
        params.tag.as_deref(),
    )?;

    let file = version
        .files
        .iter()
        .find(|f| f.path == params.path)
        .or_not_found("File not found in version")?;

    if file.size > MAX_RAW_FILE_BYTES {
        return Err(ApiError::payload_too_large(format!(
            "file exceeds the {MAX_RAW_FILE_BYTES} byte raw read limit"
        )));
    }

    let bytes = state
        .blobs
        .get(&file.storage_id)
        .await
        .map_err(|_| ApiError::internal("Failed to read file"))?;

    let content_type = file
        .content_type
        .clone()
        .unwrap_or_else(|| "text/plain; charset=utf-8".to_string());

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or(HeaderValue::from_static("text/plain; charset=utf-8")),
    );
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", file.sha256)) {
        headers.insert(header::ETAG, etag);
    }
    if skill.latest_version_id.as_deref() != Some(version.id.as_str()) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("private, max-age=60"),
        );
    }

    Ok(response)
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_slug(&params.slug)?;
    require_hex64(&params.hash)?;

    let outcome = state
        .registry
        .resolve_fingerprint(&params.slug, &params.hash)
        .api_err("Resolve failed")?
        .unwrap_or_default();

    Ok(Json(ApiResponse::success(ResolveResponse {
        matched: outcome.matched.map(|v| ResolvedVersionRef {
            version: v.version,
        }),
        latest_version: outcome.latest_version.map(|v| ResolvedVersionRef {
            version: v.version,
        }),
    })))
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, ApiError> {
    let skill = require_live_skill(&state, &params.slug)?;
    let version =
        resolve_version_selector(&state, &skill, params.version.as_deref(), None)?;

    let mut buf = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for file in &version.files {
            let bytes = state
                .blobs
                .get(&file.storage_id)
                .await
                .map_err(|_| ApiError::internal("Failed to read bundle file"))?;
            writer
                .start_file(file.path.as_str(), options)
                .map_err(|_| ApiError::internal("Failed to build archive"))?;
            writer
                .write_all(&bytes)
                .map_err(|_| ApiError::internal("Failed to build archive"))?;
        }
        writer
            .finish()
            .map_err(|_| ApiError::internal("Failed to build archive"))?;
    }

    state
        .store
        .increment_downloads(&skill.id)
        .api_err("Failed to record download")?;

    let mut response = buf.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}-{}.zip\"",
        skill.slug, version.version
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", version.fingerprint)) {
        headers.insert(header::ETAG, etag);
    }
    if skill.latest_version_id.as_deref() != Some(version.id.as_str()) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("private, max-age=60"),
        );
    }

    Ok(response)
}

pub async fn whoami(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(WhoamiResponse {
        user: OwnerSummary::from(&auth.user),
    }))
}

pub async fn report_install(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReportInstallBody>,
) -> Result<impl IntoResponse, ApiError> {
    let skill = require_live_skill(&state, &body.slug)?;
    let active = body.action != "removed";
    let now = Utc::now();

    state
        .store
        .upsert_install(&SkillInstall {
            skill_id: skill.id.clone(),
            client_id: format!("{}:{}", auth.user.id, body.client_id),
            version: body.version,
            active,
            installed_at: now,
            updated_at: now,
        })
        .api_err("Failed to record install")?;
    state
        .store
        .recount_installs(&skill.id)
        .api_err("Failed to update install counters")?;

    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}

/// Loads a skill by slug; 404 when absent, 410 when soft-deleted.
pub(super) fn require_live_skill(
    state: &AppState,
    slug: &str,
) -> Result<crate::types::Skill, ApiError> {
    let skill = state
        .store
        .get_skill_by_slug(slug)
        .api_err("Failed to get skill")?
        .or_not_found("Skill not found")?;
    if skill.is_soft_deleted() {
        return Err(ApiError::gone("Skill has been deleted"));
    }
    Ok(skill)
}

/// Resolves a version from a `version=` or `tag=` selector, defaulting to
/// the `latest` tag.
fn resolve_version_selector(
    state: &AppState,
    skill: &crate::types::Skill,
    version: Option<&str>,
    tag: Option<&str>,
) -> Result<SkillVersion, ApiError> {
    let version = match (version, tag) {
        (Some(number), _) => {
            require_semver(number)?;
            state
                .store
                .get_version_by_number(&skill.id, number)
                .api_err("Failed to get version")?
        }
        (None, selector) => {
            let tag = selector.unwrap_or("latest");
            let version_id = skill
                .tags
                .get(tag)
                .ok_or_else(|| ApiError::not_found("Tag not found"))?;
            state
                .store
                .get_version(version_id)
                .api_err("Failed to get version")?
        }
    };

    let version = version.or_not_found("Version not found")?;
    if version.soft_deleted_at.is_some() {
        return Err(ApiError::gone("Version has been deleted"));
    }
    Ok(version)
}
