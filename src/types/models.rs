use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    User,
}

impl Role {
    #[must_use]
    pub fn is_moderator(self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "moderator" => Some(Role::Moderator),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An opaque API credential. The raw token string is never stored; only the
/// argon2id hash plus a short lookup prefix for indexed retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiToken {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Active,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkKind {
    Fork,
    Duplicate,
}

/// Lineage pointer recorded when a skill is published as a fork of another
/// skill, or detected as a byte-identical duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkOf {
    pub skill_id: String,
    pub kind: ForkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStats {
    pub downloads: i64,
    pub stars: i64,
    pub versions: i64,
    pub comments: i64,
    pub installs_current: i64,
    pub installs_all_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub slug: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub owner_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version_id: Option<String>,
    /// Mutable named aliases; `tags["latest"]` always tracks `latest_version_id`.
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_skill_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_of: Option<ForkOf>,
    pub moderation_status: ModerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_deleted_at: Option<DateTime<Utc>>,
    pub report_count: i64,
    pub stats: SkillStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    #[must_use]
    pub fn is_soft_deleted(&self) -> bool {
        self.soft_deleted_at.is_some()
    }
}

/// One file in a published version's manifest. `sha256` is the digest of the
/// stored bytes; `storage_id` addresses those bytes in the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFile {
    pub path: String,
    pub size: i64,
    pub sha256: String,
    pub storage_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangelogSource {
    Auto,
    User,
}

/// Raw frontmatter plus the optional nested metadata record from SKILL.md.
/// Kept as JSON; typed projections are parsed defensively on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedSkillMd {
    pub frontmatter: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillVersion {
    pub id: String,
    pub skill_id: String,
    pub version: String,
    pub changelog: String,
    pub changelog_source: ChangelogSource,
    pub files: Vec<VersionFile>,
    pub fingerprint: String,
    pub parsed: ParsedSkillMd,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_deleted_at: Option<DateTime<Utc>>,
}

/// Secondary index row mapping a bundle fingerprint to the version that
/// produced it; also powers cross-skill duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionFingerprint {
    pub skill_id: String,
    pub version_id: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    #[serde(rename = "latest")]
    Latest,
    #[serde(rename = "latest-approved")]
    LatestApproved,
    #[serde(rename = "archived")]
    Archived,
    #[serde(rename = "archived-approved")]
    ArchivedApproved,
    #[serde(rename = "deleted")]
    Deleted,
}

impl Visibility {
    /// The visibility a live embedding must carry for its `(is_latest,
    /// is_approved)` pair. Soft-deleted skills force `Deleted` regardless.
    #[must_use]
    pub fn compute(is_latest: bool, is_approved: bool, skill_soft_deleted: bool) -> Self {
        if skill_soft_deleted {
            return Visibility::Deleted;
        }
        match (is_latest, is_approved) {
            (true, true) => Visibility::LatestApproved,
            (true, false) => Visibility::Latest,
            (false, true) => Visibility::ArchivedApproved,
            (false, false) => Visibility::Archived,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Latest => "latest",
            Visibility::LatestApproved => "latest-approved",
            Visibility::Archived => "archived",
            Visibility::ArchivedApproved => "archived-approved",
            Visibility::Deleted => "deleted",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "latest" => Some(Visibility::Latest),
            "latest-approved" => Some(Visibility::LatestApproved),
            "archived" => Some(Visibility::Archived),
            "archived-approved" => Some(Visibility::ArchivedApproved),
            "deleted" => Some(Visibility::Deleted),
            _ => None,
        }
    }

    /// The states that participate in search.
    pub const SEARCHABLE: &'static [Visibility] =
        &[Visibility::Latest, Visibility::LatestApproved];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEmbedding {
    pub id: String,
    pub skill_id: String,
    pub version_id: String,
    pub owner_id: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub is_latest: bool,
    pub is_approved: bool,
    pub visibility: Visibility,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Star {
    pub user_id: String,
    pub skill_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub skill_id: String,
    pub user_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BadgeKind {
    #[serde(rename = "highlighted")]
    Highlighted,
    #[serde(rename = "official")]
    Official,
    #[serde(rename = "deprecated")]
    Deprecated,
    #[serde(rename = "redactionApproved")]
    RedactionApproved,
}

impl BadgeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeKind::Highlighted => "highlighted",
            BadgeKind::Official => "official",
            BadgeKind::Deprecated => "deprecated",
            BadgeKind::RedactionApproved => "redactionApproved",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "highlighted" => Some(BadgeKind::Highlighted),
            "official" => Some(BadgeKind::Official),
            "deprecated" => Some(BadgeKind::Deprecated),
            "redactionApproved" => Some(BadgeKind::RedactionApproved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillBadge {
    pub skill_id: String,
    pub kind: BadgeKind,
    pub by_user_id: String,
    pub at: DateTime<Utc>,
}

/// Append-only record of privileged mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_user_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One client machine's installation of a skill; feeds the install counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillInstall {
    pub skill_id: String,
    pub client_id: String,
    pub version: String,
    pub active: bool,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_mapping_table() {
        assert_eq!(
            Visibility::compute(true, true, false),
            Visibility::LatestApproved
        );
        assert_eq!(Visibility::compute(true, false, false), Visibility::Latest);
        assert_eq!(
            Visibility::compute(false, true, false),
            Visibility::ArchivedApproved
        );
        assert_eq!(
            Visibility::compute(false, false, false),
            Visibility::Archived
        );
        for latest in [true, false] {
            for approved in [true, false] {
                assert_eq!(
                    Visibility::compute(latest, approved, true),
                    Visibility::Deleted
                );
            }
        }
    }

    #[test]
    fn visibility_round_trips_as_str() {
        for v in [
            Visibility::Latest,
            Visibility::LatestApproved,
            Visibility::Archived,
            Visibility::ArchivedApproved,
            Visibility::Deleted,
        ] {
            assert_eq!(Visibility::parse(v.as_str()), Some(v));
        }
        assert_eq!(Visibility::parse("bogus"), None);
    }

    #[test]
    fn badge_kind_round_trips() {
        for k in [
            BadgeKind::Highlighted,
            BadgeKind::Official,
            BadgeKind::Deprecated,
            BadgeKind::RedactionApproved,
        ] {
            assert_eq!(BadgeKind::parse(k.as_str()), Some(k));
        }
    }

    #[test]
    fn moderator_check_covers_admin() {
        assert!(Role::Admin.is_moderator());
        assert!(Role::Moderator.is_moderator());
        assert!(!Role::User.is_moderator());
    }
}
