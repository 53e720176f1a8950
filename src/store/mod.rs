mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// The metadata store's vector index admits at most this many results per call.
pub const VECTOR_INDEX_MAX_RESULTS: usize = 256;

/// Sort orders for the public skill listing. Only `Updated` supports keyset
/// cursors; the stat-ordered sorts return a single bounded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillSort {
    Updated,
    Downloads,
    Stars,
    InstallsCurrent,
    InstallsAllTime,
    Trending,
}

impl SkillSort {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "updated" => Some(SkillSort::Updated),
            "downloads" => Some(SkillSort::Downloads),
            "stars" => Some(SkillSort::Stars),
            "installsCurrent" => Some(SkillSort::InstallsCurrent),
            "installsAllTime" => Some(SkillSort::InstallsAllTime),
            "trending" => Some(SkillSort::Trending),
            _ => None,
        }
    }
}

/// One hit from the vector index, scored by cosine similarity.
#[derive(Debug, Clone)]
pub struct EmbeddingHit {
    pub embedding_id: String,
    pub skill_id: String,
    pub version_id: String,
    pub score: f32,
}

/// Flag patch applied to an existing embedding row.
#[derive(Debug, Clone)]
pub struct EmbeddingFlagUpdate {
    pub id: String,
    pub is_latest: bool,
    pub is_approved: bool,
    pub visibility: Visibility,
}

/// Everything a publish writes in one transaction. The version row is
/// inserted before the skill's latest pointer moves, so a reader observing
/// the tag always resolves the version.
#[derive(Debug, Clone)]
pub struct PublishCommit {
    pub skill: Skill,
    pub skill_is_new: bool,
    pub version: SkillVersion,
    pub fingerprint: VersionFingerprint,
    pub embedding: SkillEmbedding,
    pub demote_embeddings: Vec<EmbeddingFlagUpdate>,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>>;
    fn update_user(&self, user: &User) -> Result<()>;

    // Token operations
    fn create_token(&self, token: &ApiToken) -> Result<()>;
    fn get_token_by_id(&self, id: &str) -> Result<Option<ApiToken>>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<ApiToken>>;
    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>>;
    fn revoke_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
    fn has_admin_token(&self) -> Result<bool>;

    // Skill operations
    fn create_skill(&self, skill: &Skill) -> Result<()>;
    fn get_skill(&self, id: &str) -> Result<Option<Skill>>;
    fn get_skill_by_slug(&self, slug: &str) -> Result<Option<Skill>>;
    fn update_skill(&self, skill: &Skill) -> Result<()>;
    fn list_skills(&self, sort: SkillSort, cursor: Option<&str>, limit: i64) -> Result<Vec<Skill>>;
    /// Cascades to versions, fingerprints, embeddings, stars, comments,
    /// badges, installs; clears inbound lineage references from other skills.
    fn hard_delete_skill(&self, id: &str) -> Result<bool>;

    // Version operations
    fn get_version(&self, id: &str) -> Result<Option<SkillVersion>>;
    fn get_version_by_number(
        &self,
        skill_id: &str,
        version: &str,
    ) -> Result<Option<SkillVersion>>;
    /// Newest first by created_at. Cursor is the last seen version id.
    fn list_versions(
        &self,
        skill_id: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SkillVersion>>;

    // Fingerprint operations
    fn list_fingerprints(
        &self,
        skill_id: &str,
        fingerprint: &str,
        limit: i64,
    ) -> Result<Vec<VersionFingerprint>>;
    /// Cross-skill duplicate probe: the earliest non-soft-deleted skill
    /// holding a version with this fingerprint.
    fn find_fingerprint_owner(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(Skill, VersionFingerprint)>>;

    // Embedding operations
    fn get_embedding(&self, id: &str) -> Result<Option<SkillEmbedding>>;
    fn get_latest_embedding(&self, skill_id: &str) -> Result<Option<SkillEmbedding>>;
    fn list_skill_embeddings(&self, skill_id: &str) -> Result<Vec<SkillEmbedding>>;
    fn update_embedding_flags(&self, update: &EmbeddingFlagUpdate) -> Result<()>;
    fn update_embeddings_owner(&self, skill_id: &str, owner_id: &str) -> Result<()>;
    /// Top-K by cosine similarity over embeddings in the given visibility
    /// states. K is capped at [`VECTOR_INDEX_MAX_RESULTS`].
    fn embedding_top_k(
        &self,
        query: &[f32],
        visibility: &[Visibility],
        k: usize,
    ) -> Result<Vec<EmbeddingHit>>;

    // Publish
    fn commit_publish(&self, commit: &PublishCommit) -> Result<()>;

    // Star operations
    fn add_star(&self, star: &Star) -> Result<bool>;
    fn remove_star(&self, user_id: &str, skill_id: &str) -> Result<bool>;
    fn has_star(&self, user_id: &str, skill_id: &str) -> Result<bool>;

    // Comment operations
    fn create_comment(&self, comment: &Comment) -> Result<()>;
    fn get_comment(&self, id: &str) -> Result<Option<Comment>>;
    fn list_comments(&self, skill_id: &str, limit: i64) -> Result<Vec<Comment>>;
    fn soft_delete_comment(&self, id: &str) -> Result<bool>;

    // Badge operations
    fn upsert_badge(&self, badge: &SkillBadge) -> Result<()>;
    fn delete_badge(&self, skill_id: &str, kind: BadgeKind) -> Result<bool>;
    fn list_badges(&self, skill_id: &str) -> Result<Vec<SkillBadge>>;

    // Audit log
    fn append_audit(&self, entry: &AuditLogEntry) -> Result<()>;

    // Install tracking
    fn upsert_install(&self, install: &SkillInstall) -> Result<()>;
    /// Recomputes `stats.installsCurrent` / `stats.installsAllTime` from rows.
    fn recount_installs(&self, skill_id: &str) -> Result<()>;

    // Stat counters
    fn increment_downloads(&self, skill_id: &str) -> Result<()>;
    fn adjust_star_count(&self, skill_id: &str, delta: i64) -> Result<()>;
    fn adjust_comment_count(&self, skill_id: &str, delta: i64) -> Result<()>;

    fn close(&self) -> Result<()>;
}
