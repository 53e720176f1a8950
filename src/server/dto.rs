use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Skill, SkillVersion, User, VersionFile};

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
    #[serde(rename = "highlightedOnly")]
    pub highlighted_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListSkillsParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListVersionsParams {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub path: String,
    pub version: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub slug: String,
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub slug: String,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequestBody {
    pub slug: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub fork_of: Option<ForkOfBody>,
    #[serde(default)]
    pub source: Option<String>,
    /// Present on the JSON flow (after a prior upload); absent on multipart,
    /// where the parts themselves carry the files.
    #[serde(default)]
    pub files: Option<Vec<FileRefBody>>,
}

#[derive(Debug, Deserialize)]
pub struct ForkOfBody {
    pub slug: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRefBody {
    pub path: String,
    pub size: i64,
    pub storage_id: String,
    pub sha256: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTagsBody {
    pub tags: Vec<TagEntryBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntryBody {
    pub tag: String,
    pub version_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetBadgeBody {
    pub kind: String,
    #[serde(default = "default_true")]
    pub on: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SetDuplicateBody {
    #[serde(rename = "canonicalSlug")]
    pub canonical_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeOwnerBody {
    pub new_owner_user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTokenBody {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInstallBody {
    pub slug: String,
    pub version: String,
    pub client_id: String,
    /// `installed` or `removed`.
    pub action: String,
}

// ── Responses ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultEntry {
    pub score: f32,
    pub slug: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub version: String,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultEntry>,
}

/// Version metadata without the full parsed frontmatter blob.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: String,
    pub version: String,
    pub changelog: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl From<&SkillVersion> for VersionSummary {
    fn from(v: &SkillVersion) -> Self {
        Self {
            id: v.id.clone(),
            version: v.version.clone(),
            changelog: v.changelog.clone(),
            fingerprint: v.fingerprint.clone(),
            created_at: v.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDetail {
    #[serde(flatten)]
    pub summary: VersionSummary,
    pub files: Vec<VersionFile>,
    pub changelog_source: crate::types::ChangelogSource,
    pub parsed: crate::types::ParsedSkillMd,
}

impl From<&SkillVersion> for VersionDetail {
    fn from(v: &SkillVersion) -> Self {
        Self {
            summary: VersionSummary::from(v),
            files: v.files.clone(),
            changelog_source: v.changelog_source,
            parsed: v.parsed.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl From<&User> for OwnerSummary {
    fn from(u: &User) -> Self {
        Self {
            handle: u.handle.clone(),
            display_name: u.display_name.clone(),
            image: u.image.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDetailResponse {
    pub skill: Skill,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<VersionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerSummary>,
    pub badges: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    pub skill_id: String,
    pub version_id: String,
    pub slug: String,
    pub version: String,
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVersionRef {
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    #[serde(rename = "match")]
    pub matched: Option<ResolvedVersionRef>,
    pub latest_version: Option<ResolvedVersionRef>,
}

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub user: OwnerSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTokenResponse {
    /// The raw token; shown exactly once.
    pub token: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
