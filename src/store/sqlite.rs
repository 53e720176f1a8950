use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::SCHEMA;
use super::{
    EmbeddingFlagUpdate, EmbeddingHit, PublishCommit, SkillSort, Store, VECTOR_INDEX_MAX_RESULTS,
};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

fn format_opt_datetime(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(format_datetime)
}

/// Serialize a slice of f32s to a BLOB of little-endian bytes.
fn vec_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity; dimension disagreements score zero rather than erroring.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

const USER_COLS: &str = "id, handle, display_name, image, role, created_at, updated_at, deleted_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        handle: row.get(1)?,
        display_name: row.get(2)?,
        image: row.get(3)?,
        role: Role::parse(&role).unwrap_or(Role::User),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
        deleted_at: opt_datetime(row.get(7)?),
    })
}

const TOKEN_COLS: &str =
    "id, token_hash, token_lookup, user_id, label, created_at, revoked_at, last_used_at";

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<ApiToken> {
    Ok(ApiToken {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        label: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        revoked_at: opt_datetime(row.get(6)?),
        last_used_at: opt_datetime(row.get(7)?),
    })
}

const SKILL_COLS: &str = "id, slug, display_name, summary, owner_user_id, latest_version_id, \
     tags, canonical_skill_id, fork_of_skill_id, fork_of_kind, fork_of_version, \
     moderation_status, soft_deleted_at, report_count, \
     stat_downloads, stat_stars, stat_versions, stat_comments, \
     stat_installs_current, stat_installs_all_time, created_at, updated_at";

fn skill_from_row(row: &Row<'_>) -> rusqlite::Result<Skill> {
    let tags_json: String = row.get(6)?;
    let tags = serde_json::from_str(&tags_json).unwrap_or_else(|e| {
        tracing::error!("Invalid tags JSON in database: {e}");
        Default::default()
    });

    let fork_of = match (
        row.get::<_, Option<String>>(8)?,
        row.get::<_, Option<String>>(9)?,
    ) {
        (Some(skill_id), Some(kind)) => {
            let kind = match kind.as_str() {
                "fork" => ForkKind::Fork,
                _ => ForkKind::Duplicate,
            };
            Some(ForkOf {
                skill_id,
                kind,
                version: row.get(10)?,
            })
        }
        _ => None,
    };

    let moderation: String = row.get(11)?;

    Ok(Skill {
        id: row.get(0)?,
        slug: row.get(1)?,
        display_name: row.get(2)?,
        summary: row.get(3)?,
        owner_user_id: row.get(4)?,
        latest_version_id: row.get(5)?,
        tags,
        canonical_skill_id: row.get(7)?,
        fork_of,
        moderation_status: if moderation == "hidden" {
            ModerationStatus::Hidden
        } else {
            ModerationStatus::Active
        },
        soft_deleted_at: opt_datetime(row.get(12)?),
        report_count: row.get(13)?,
        stats: SkillStats {
            downloads: row.get(14)?,
            stars: row.get(15)?,
            versions: row.get(16)?,
            comments: row.get(17)?,
            installs_current: row.get(18)?,
            installs_all_time: row.get(19)?,
        },
        created_at: parse_datetime(&row.get::<_, String>(20)?),
        updated_at: parse_datetime(&row.get::<_, String>(21)?),
    })
}

/// `SKILL_COLS` with a table qualifier, for joined queries where column
/// names would otherwise be ambiguous.
const SKILL_COLS_QUALIFIED: &str =
    "skills.id, skills.slug, skills.display_name, skills.summary, skills.owner_user_id, \
     skills.latest_version_id, skills.tags, skills.canonical_skill_id, skills.fork_of_skill_id, \
     skills.fork_of_kind, skills.fork_of_version, skills.moderation_status, \
     skills.soft_deleted_at, skills.report_count, skills.stat_downloads, skills.stat_stars, \
     skills.stat_versions, skills.stat_comments, skills.stat_installs_current, \
     skills.stat_installs_all_time, skills.created_at, skills.updated_at";

const VERSION_COLS: &str = "id, skill_id, version, changelog, changelog_source, files, \
     fingerprint, parsed, created_by, created_at, soft_deleted_at";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<SkillVersion> {
    let files_json: String = row.get(5)?;
    let files = serde_json::from_str(&files_json).unwrap_or_else(|e| {
        tracing::error!("Invalid files JSON in database: {e}");
        Vec::new()
    });
    let parsed_json: String = row.get(7)?;
    let parsed = serde_json::from_str(&parsed_json).unwrap_or_default();
    let source: String = row.get(4)?;

    Ok(SkillVersion {
        id: row.get(0)?,
        skill_id: row.get(1)?,
        version: row.get(2)?,
        changelog: row.get(3)?,
        changelog_source: if source == "user" {
            ChangelogSource::User
        } else {
            ChangelogSource::Auto
        },
        files,
        fingerprint: row.get(6)?,
        parsed,
        created_by: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        soft_deleted_at: opt_datetime(row.get(10)?),
    })
}

const EMBEDDING_COLS: &str =
    "id, skill_id, version_id, owner_id, vector, is_latest, is_approved, visibility, updated_at";

fn embedding_from_row(row: &Row<'_>) -> rusqlite::Result<SkillEmbedding> {
    let vector: Vec<u8> = row.get(4)?;
    let visibility: String = row.get(7)?;
    Ok(SkillEmbedding {
        id: row.get(0)?,
        skill_id: row.get(1)?,
        version_id: row.get(2)?,
        owner_id: row.get(3)?,
        vector: blob_to_vec(&vector),
        is_latest: row.get::<_, i64>(5)? != 0,
        is_approved: row.get::<_, i64>(6)? != 0,
        visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Archived),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn changelog_source_str(source: ChangelogSource) -> &'static str {
    match source {
        ChangelogSource::Auto => "auto",
        ChangelogSource::User => "user",
    }
}

fn moderation_status_str(status: ModerationStatus) -> &'static str {
    match status {
        ModerationStatus::Active => "active",
        ModerationStatus::Hidden => "hidden",
    }
}

fn fork_kind_str(kind: ForkKind) -> &'static str {
    match kind {
        ForkKind::Fork => "fork",
        ForkKind::Duplicate => "duplicate",
    }
}

fn insert_skill_tx(tx: &Connection, skill: &Skill) -> Result<()> {
    tx.execute(
        "INSERT INTO skills (id, slug, display_name, summary, owner_user_id, latest_version_id, \
         tags, canonical_skill_id, fork_of_skill_id, fork_of_kind, fork_of_version, \
         moderation_status, soft_deleted_at, report_count, \
         stat_downloads, stat_stars, stat_versions, stat_comments, \
         stat_installs_current, stat_installs_all_time, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            skill.id,
            skill.slug,
            skill.display_name,
            skill.summary,
            skill.owner_user_id,
            skill.latest_version_id,
            serde_json::to_string(&skill.tags).unwrap_or_else(|_| "{}".into()),
            skill.canonical_skill_id,
            skill.fork_of.as_ref().map(|f| f.skill_id.clone()),
            skill.fork_of.as_ref().map(|f| fork_kind_str(f.kind)),
            skill.fork_of.as_ref().and_then(|f| f.version.clone()),
            moderation_status_str(skill.moderation_status),
            format_opt_datetime(&skill.soft_deleted_at),
            skill.report_count,
            skill.stats.downloads,
            skill.stats.stars,
            skill.stats.versions,
            skill.stats.comments,
            skill.stats.installs_current,
            skill.stats.installs_all_time,
            format_datetime(&skill.created_at),
            format_datetime(&skill.updated_at),
        ],
    )?;
    Ok(())
}

fn update_skill_tx(tx: &Connection, skill: &Skill) -> Result<()> {
    let rows = tx.execute(
        "UPDATE skills SET slug = ?2, display_name = ?3, summary = ?4, owner_user_id = ?5, \
         latest_version_id = ?6, tags = ?7, canonical_skill_id = ?8, fork_of_skill_id = ?9, \
         fork_of_kind = ?10, fork_of_version = ?11, moderation_status = ?12, \
         soft_deleted_at = ?13, report_count = ?14, stat_downloads = ?15, stat_stars = ?16, \
         stat_versions = ?17, stat_comments = ?18, stat_installs_current = ?19, \
         stat_installs_all_time = ?20, updated_at = ?21
         WHERE id = ?1",
        params![
            skill.id,
            skill.slug,
            skill.display_name,
            skill.summary,
            skill.owner_user_id,
            skill.latest_version_id,
            serde_json::to_string(&skill.tags).unwrap_or_else(|_| "{}".into()),
            skill.canonical_skill_id,
            skill.fork_of.as_ref().map(|f| f.skill_id.clone()),
            skill.fork_of.as_ref().map(|f| fork_kind_str(f.kind)),
            skill.fork_of.as_ref().and_then(|f| f.version.clone()),
            moderation_status_str(skill.moderation_status),
            format_opt_datetime(&skill.soft_deleted_at),
            skill.report_count,
            skill.stats.downloads,
            skill.stats.stars,
            skill.stats.versions,
            skill.stats.comments,
            skill.stats.installs_current,
            skill.stats.installs_all_time,
            format_datetime(&skill.updated_at),
        ],
    )?;
    if rows == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

fn insert_version_tx(tx: &Connection, version: &SkillVersion) -> Result<()> {
    tx.execute(
        "INSERT INTO skill_versions (id, skill_id, version, changelog, changelog_source, files, \
         fingerprint, parsed, created_by, created_at, soft_deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            version.id,
            version.skill_id,
            version.version,
            version.changelog,
            changelog_source_str(version.changelog_source),
            serde_json::to_string(&version.files).unwrap_or_else(|_| "[]".into()),
            version.fingerprint,
            serde_json::to_string(&version.parsed).unwrap_or_else(|_| "{}".into()),
            version.created_by,
            format_datetime(&version.created_at),
            format_opt_datetime(&version.soft_deleted_at),
        ],
    )?;
    Ok(())
}

fn insert_embedding_tx(tx: &Connection, emb: &SkillEmbedding) -> Result<()> {
    tx.execute(
        "INSERT INTO skill_embeddings (id, skill_id, version_id, owner_id, vector, is_latest, \
         is_approved, visibility, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            emb.id,
            emb.skill_id,
            emb.version_id,
            emb.owner_id,
            vec_to_blob(&emb.vector),
            emb.is_latest as i64,
            emb.is_approved as i64,
            emb.visibility.as_str(),
            format_datetime(&emb.updated_at),
        ],
    )?;
    Ok(())
}

fn apply_embedding_flags_tx(tx: &Connection, update: &EmbeddingFlagUpdate) -> Result<()> {
    tx.execute(
        "UPDATE skill_embeddings SET is_latest = ?2, is_approved = ?3, visibility = ?4, \
         updated_at = ?5 WHERE id = ?1",
        params![
            update.id,
            update.is_latest as i64,
            update.is_approved as i64,
            update.visibility.as_str(),
            format_datetime(&Utc::now()),
        ],
    )?;
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, handle, display_name, image, role, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.handle,
                user.display_name,
                user.image,
                user.role.as_str(),
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
                format_opt_datetime(&user.deleted_at),
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_handle(&self, handle: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE handle = ?1"),
            params![handle],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET handle = ?2, display_name = ?3, image = ?4, role = ?5, \
             updated_at = ?6, deleted_at = ?7 WHERE id = ?1",
            params![
                user.id,
                user.handle,
                user.display_name,
                user.image,
                user.role.as_str(),
                format_datetime(&Utc::now()),
                format_opt_datetime(&user.deleted_at),
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Token operations

    fn create_token(&self, token: &ApiToken) -> Result<()> {
        let conn = self.conn();

        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM api_tokens WHERE token_lookup = ?1",
                params![token.token_lookup],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(Error::TokenLookupCollision);
        }

        conn.execute(
            "INSERT INTO api_tokens (id, token_hash, token_lookup, user_id, label, created_at, revoked_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.user_id,
                token.label,
                format_datetime(&token.created_at),
                format_opt_datetime(&token.revoked_at),
                format_opt_datetime(&token.last_used_at),
            ],
        )?;
        Ok(())
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<ApiToken>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLS} FROM api_tokens WHERE id = ?1"),
            params![id],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<ApiToken>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TOKEN_COLS} FROM api_tokens WHERE token_lookup = ?1"),
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TOKEN_COLS} FROM api_tokens WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], token_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn revoke_token(&self, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE api_tokens SET revoked_at = ?2 WHERE id = ?1 AND revoked_at IS NULL",
            params![id, format_datetime(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE api_tokens SET last_used_at = ?2 WHERE id = ?1",
            params![id, format_datetime(&Utc::now())],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let exists: Option<bool> = conn
            .query_row(
                "SELECT 1 FROM api_tokens t JOIN users u ON u.id = t.user_id
                 WHERE u.role = 'admin' AND t.revoked_at IS NULL LIMIT 1",
                [],
                |_| Ok(true),
            )
            .optional()?;
        Ok(exists.unwrap_or(false))
    }

    // Skill operations

    fn create_skill(&self, skill: &Skill) -> Result<()> {
        insert_skill_tx(&self.conn(), skill)
    }

    fn get_skill(&self, id: &str) -> Result<Option<Skill>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SKILL_COLS} FROM skills WHERE id = ?1"),
            params![id],
            skill_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_skill_by_slug(&self, slug: &str) -> Result<Option<Skill>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SKILL_COLS} FROM skills WHERE slug = ?1"),
            params![slug],
            skill_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_skill(&self, skill: &Skill) -> Result<()> {
        update_skill_tx(&self.conn(), skill)
    }

    fn list_skills(&self, sort: SkillSort, cursor: Option<&str>, limit: i64) -> Result<Vec<Skill>> {
        let conn = self.conn();
        let base = format!(
            "SELECT {SKILL_COLS} FROM skills \
             WHERE soft_deleted_at IS NULL AND moderation_status = 'active'"
        );

        let map = |stmt: &mut rusqlite::Statement<'_>,
                   p: &[&dyn rusqlite::ToSql]|
         -> Result<Vec<Skill>> {
            let rows = stmt.query_map(p, skill_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::from)
        };

        match sort {
            SkillSort::Updated => {
                // Keyset cursor: "<updated_at>|<id>" from the last row seen.
                if let Some((ts, id)) = cursor.and_then(|c| c.split_once('|')) {
                    let mut stmt = conn.prepare(&format!(
                        "{base} AND (updated_at < ?1 OR (updated_at = ?1 AND id < ?2)) \
                         ORDER BY updated_at DESC, id DESC LIMIT ?3"
                    ))?;
                    map(&mut stmt, &[&ts, &id, &limit])
                } else {
                    let mut stmt = conn.prepare(&format!(
                        "{base} ORDER BY updated_at DESC, id DESC LIMIT ?1"
                    ))?;
                    map(&mut stmt, &[&limit])
                }
            }
            SkillSort::Downloads => {
                let mut stmt = conn.prepare(&format!(
                    "{base} ORDER BY stat_downloads DESC, updated_at DESC LIMIT ?1"
                ))?;
                map(&mut stmt, &[&limit])
            }
            SkillSort::Stars => {
                let mut stmt = conn.prepare(&format!(
                    "{base} ORDER BY stat_stars DESC, updated_at DESC LIMIT ?1"
                ))?;
                map(&mut stmt, &[&limit])
            }
            SkillSort::InstallsCurrent => {
                let mut stmt = conn.prepare(&format!(
                    "{base} ORDER BY stat_installs_current DESC, updated_at DESC LIMIT ?1"
                ))?;
                map(&mut stmt, &[&limit])
            }
            SkillSort::InstallsAllTime => {
                let mut stmt = conn.prepare(&format!(
                    "{base} ORDER BY stat_installs_all_time DESC, updated_at DESC LIMIT ?1"
                ))?;
                map(&mut stmt, &[&limit])
            }
            SkillSort::Trending => {
                // Downloads among recently-updated skills; single bounded page.
                let cutoff = format_datetime(&(Utc::now() - Duration::days(30)));
                let mut stmt = conn.prepare(&format!(
                    "{base} AND updated_at >= ?1 \
                     ORDER BY stat_downloads DESC, stat_installs_current DESC, updated_at DESC \
                     LIMIT ?2"
                ))?;
                map(&mut stmt, &[&cutoff, &limit])
            }
        }
    }

    fn hard_delete_skill(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE skills SET canonical_skill_id = NULL WHERE canonical_skill_id = ?1",
            params![id],
        )?;
        tx.execute(
            "UPDATE skills SET fork_of_skill_id = NULL, fork_of_kind = NULL, fork_of_version = NULL
             WHERE fork_of_skill_id = ?1",
            params![id],
        )?;

        tx.execute(
            "DELETE FROM version_fingerprints WHERE skill_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM skill_embeddings WHERE skill_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM skill_versions WHERE skill_id = ?1", params![id])?;
        tx.execute("DELETE FROM comments WHERE skill_id = ?1", params![id])?;
        tx.execute("DELETE FROM stars WHERE skill_id = ?1", params![id])?;
        tx.execute("DELETE FROM skill_badges WHERE skill_id = ?1", params![id])?;
        tx.execute("DELETE FROM skill_installs WHERE skill_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM skills WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Version operations

    fn get_version(&self, id: &str) -> Result<Option<SkillVersion>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {VERSION_COLS} FROM skill_versions WHERE id = ?1"),
            params![id],
            version_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_version_by_number(
        &self,
        skill_id: &str,
        version: &str,
    ) -> Result<Option<SkillVersion>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {VERSION_COLS} FROM skill_versions WHERE skill_id = ?1 AND version = ?2"
            ),
            params![skill_id, version],
            version_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_versions(
        &self,
        skill_id: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SkillVersion>> {
        let conn = self.conn();

        let rows = if let Some(after_id) = cursor {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLS} FROM skill_versions
                 WHERE skill_id = ?1
                   AND (created_at, id) < (SELECT created_at, id FROM skill_versions WHERE id = ?2)
                 ORDER BY created_at DESC, id DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![skill_id, after_id, limit], version_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VERSION_COLS} FROM skill_versions WHERE skill_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![skill_id, limit], version_from_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        };

        rows.map_err(Error::from)
    }

    // Fingerprint operations

    fn list_fingerprints(
        &self,
        skill_id: &str,
        fingerprint: &str,
        limit: i64,
    ) -> Result<Vec<VersionFingerprint>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT skill_id, version_id, fingerprint, created_at FROM version_fingerprints
             WHERE skill_id = ?1 AND fingerprint = ?2 ORDER BY created_at DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![skill_id, fingerprint, limit], |row| {
            Ok(VersionFingerprint {
                skill_id: row.get(0)?,
                version_id: row.get(1)?,
                fingerprint: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn find_fingerprint_owner(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(Skill, VersionFingerprint)>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {SKILL_COLS_QUALIFIED}, vf.version_id, vf.created_at
                 FROM version_fingerprints vf JOIN skills ON skills.id = vf.skill_id
                 WHERE vf.fingerprint = ?1 AND skills.soft_deleted_at IS NULL
                 ORDER BY vf.created_at ASC LIMIT 1"
            ),
            params![fingerprint],
            |row| {
                let skill = skill_from_row(row)?;
                let fp = VersionFingerprint {
                    skill_id: skill.id.clone(),
                    version_id: row.get(22)?,
                    fingerprint: fingerprint.to_string(),
                    created_at: parse_datetime(&row.get::<_, String>(23)?),
                };
                Ok((skill, fp))
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Embedding operations

    fn get_embedding(&self, id: &str) -> Result<Option<SkillEmbedding>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {EMBEDDING_COLS} FROM skill_embeddings WHERE id = ?1"),
            params![id],
            embedding_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_latest_embedding(&self, skill_id: &str) -> Result<Option<SkillEmbedding>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {EMBEDDING_COLS} FROM skill_embeddings
                 WHERE skill_id = ?1 AND is_latest = 1 LIMIT 1"
            ),
            params![skill_id],
            embedding_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_skill_embeddings(&self, skill_id: &str) -> Result<Vec<SkillEmbedding>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EMBEDDING_COLS} FROM skill_embeddings WHERE skill_id = ?1"
        ))?;
        let rows = stmt.query_map(params![skill_id], embedding_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_embedding_flags(&self, update: &EmbeddingFlagUpdate) -> Result<()> {
        apply_embedding_flags_tx(&self.conn(), update)
    }

    fn update_embeddings_owner(&self, skill_id: &str, owner_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE skill_embeddings SET owner_id = ?2, updated_at = ?3 WHERE skill_id = ?1",
            params![skill_id, owner_id, format_datetime(&Utc::now())],
        )?;
        Ok(())
    }

    fn embedding_top_k(
        &self,
        query: &[f32],
        visibility: &[Visibility],
        k: usize,
    ) -> Result<Vec<EmbeddingHit>> {
        let k = k.min(VECTOR_INDEX_MAX_RESULTS);
        if k == 0 || visibility.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=visibility.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, skill_id, version_id, vector FROM skill_embeddings
             WHERE visibility IN ({placeholders})"
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let vis_params: Vec<&str> = visibility.iter().map(|v| v.as_str()).collect();
        let rows = stmt.query_map(rusqlite::params_from_iter(vis_params), |row| {
            let vector: Vec<u8> = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                vector,
            ))
        })?;

        let mut scored: Vec<EmbeddingHit> = rows
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(embedding_id, skill_id, version_id, blob)| {
                let vector = blob_to_vec(&blob);
                EmbeddingHit {
                    embedding_id,
                    skill_id,
                    version_id,
                    score: cosine_similarity(query, &vector),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    // Publish

    fn commit_publish(&self, commit: &PublishCommit) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        // The version row lands before the skill's latest pointer moves.
        if commit.skill_is_new {
            insert_skill_tx(&tx, &commit.skill)?;
            insert_version_tx(&tx, &commit.version)?;
        } else {
            insert_version_tx(&tx, &commit.version)?;
            update_skill_tx(&tx, &commit.skill)?;
        }

        tx.execute(
            "INSERT INTO version_fingerprints (version_id, skill_id, fingerprint, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                commit.fingerprint.version_id,
                commit.fingerprint.skill_id,
                commit.fingerprint.fingerprint,
                format_datetime(&commit.fingerprint.created_at),
            ],
        )?;

        for demote in &commit.demote_embeddings {
            apply_embedding_flags_tx(&tx, demote)?;
        }
        insert_embedding_tx(&tx, &commit.embedding)?;

        tx.commit()?;
        Ok(())
    }

    // Star operations

    fn add_star(&self, star: &Star) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO stars (user_id, skill_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                star.user_id,
                star.skill_id,
                format_datetime(&star.created_at)
            ],
        )?;
        Ok(rows > 0)
    }

    fn remove_star(&self, user_id: &str, skill_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM stars WHERE user_id = ?1 AND skill_id = ?2",
            params![user_id, skill_id],
        )?;
        Ok(rows > 0)
    }

    fn has_star(&self, user_id: &str, skill_id: &str) -> Result<bool> {
        let conn = self.conn();
        let exists: Option<bool> = conn
            .query_row(
                "SELECT 1 FROM stars WHERE user_id = ?1 AND skill_id = ?2",
                params![user_id, skill_id],
                |_| Ok(true),
            )
            .optional()?;
        Ok(exists.unwrap_or(false))
    }

    // Comment operations

    fn create_comment(&self, comment: &Comment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO comments (id, skill_id, user_id, body, created_at, soft_deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                comment.id,
                comment.skill_id,
                comment.user_id,
                comment.body,
                format_datetime(&comment.created_at),
                format_opt_datetime(&comment.soft_deleted_at),
            ],
        )?;
        Ok(())
    }

    fn get_comment(&self, id: &str) -> Result<Option<Comment>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, skill_id, user_id, body, created_at, soft_deleted_at
             FROM comments WHERE id = ?1",
            params![id],
            |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    skill_id: row.get(1)?,
                    user_id: row.get(2)?,
                    body: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                    soft_deleted_at: opt_datetime(row.get(5)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_comments(&self, skill_id: &str, limit: i64) -> Result<Vec<Comment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, skill_id, user_id, body, created_at, soft_deleted_at
             FROM comments WHERE skill_id = ?1 AND soft_deleted_at IS NULL
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![skill_id, limit], |row| {
            Ok(Comment {
                id: row.get(0)?,
                skill_id: row.get(1)?,
                user_id: row.get(2)?,
                body: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
                soft_deleted_at: opt_datetime(row.get(5)?),
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn soft_delete_comment(&self, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE comments SET soft_deleted_at = ?2 WHERE id = ?1 AND soft_deleted_at IS NULL",
            params![id, format_datetime(&Utc::now())],
        )?;
        Ok(rows > 0)
    }

    // Badge operations

    fn upsert_badge(&self, badge: &SkillBadge) -> Result<()> {
        self.conn().execute(
            "INSERT INTO skill_badges (skill_id, kind, by_user_id, at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(skill_id, kind) DO UPDATE SET by_user_id = ?3, at = ?4",
            params![
                badge.skill_id,
                badge.kind.as_str(),
                badge.by_user_id,
                format_datetime(&badge.at),
            ],
        )?;
        Ok(())
    }

    fn delete_badge(&self, skill_id: &str, kind: BadgeKind) -> Result<bool> {
        let rows = self.conn().execute(
            "DELETE FROM skill_badges WHERE skill_id = ?1 AND kind = ?2",
            params![skill_id, kind.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn list_badges(&self, skill_id: &str) -> Result<Vec<SkillBadge>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT skill_id, kind, by_user_id, at FROM skill_badges WHERE skill_id = ?1",
        )?;
        let rows = stmt.query_map(params![skill_id], |row| {
            let kind: String = row.get(1)?;
            Ok((
                row.get::<_, String>(0)?,
                kind,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut badges = Vec::new();
        for row in rows {
            let (skill_id, kind, by_user_id, at) = row?;
            if let Some(kind) = BadgeKind::parse(&kind) {
                badges.push(SkillBadge {
                    skill_id,
                    kind,
                    by_user_id,
                    at: parse_datetime(&at),
                });
            }
        }
        Ok(badges)
    }

    // Audit log

    fn append_audit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO audit_log (id, actor_user_id, action, target_type, target_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.actor_user_id,
                entry.action,
                entry.target_type,
                entry.target_id,
                serde_json::to_string(&entry.metadata).unwrap_or_else(|_| "{}".into()),
                format_datetime(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    // Install tracking

    fn upsert_install(&self, install: &SkillInstall) -> Result<()> {
        self.conn().execute(
            "INSERT INTO skill_installs (skill_id, client_id, version, active, installed_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(skill_id, client_id) DO UPDATE SET version = ?3, active = ?4, updated_at = ?6",
            params![
                install.skill_id,
                install.client_id,
                install.version,
                install.active as i64,
                format_datetime(&install.installed_at),
                format_datetime(&install.updated_at),
            ],
        )?;
        Ok(())
    }

    fn recount_installs(&self, skill_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE skills SET
                stat_installs_current =
                    (SELECT COUNT(*) FROM skill_installs WHERE skill_id = ?1 AND active = 1),
                stat_installs_all_time =
                    (SELECT COUNT(*) FROM skill_installs WHERE skill_id = ?1)
             WHERE id = ?1",
            params![skill_id],
        )?;
        Ok(())
    }

    // Stat counters

    fn increment_downloads(&self, skill_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE skills SET stat_downloads = stat_downloads + 1 WHERE id = ?1",
            params![skill_id],
        )?;
        Ok(())
    }

    fn adjust_star_count(&self, skill_id: &str, delta: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE skills SET stat_stars = MAX(0, stat_stars + ?2) WHERE id = ?1",
            params![skill_id, delta],
        )?;
        Ok(())
    }

    fn adjust_comment_count(&self, skill_id: &str, delta: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE skills SET stat_comments = MAX(0, stat_comments + ?2) WHERE id = ?1",
            params![skill_id, delta],
        )?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        store
    }

    fn test_user(id: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            handle: Some(format!("handle-{id}")),
            display_name: None,
            image: None,
            role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn test_skill(id: &str, slug: &str, owner: &str) -> Skill {
        let now = Utc::now();
        Skill {
            id: id.to_string(),
            slug: slug.to_string(),
            display_name: slug.to_string(),
            summary: None,
            owner_user_id: owner.to_string(),
            latest_version_id: None,
            tags: BTreeMap::new(),
            canonical_skill_id: None,
            fork_of: None,
            moderation_status: ModerationStatus::Active,
            soft_deleted_at: None,
            report_count: 0,
            stats: SkillStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_skill_round_trip() {
        let store = store();
        store.create_user(&test_user("u1", Role::User)).unwrap();

        let mut skill = test_skill("s1", "demo", "u1");
        skill.tags.insert("latest".into(), "v1".into());
        skill.fork_of = Some(ForkOf {
            skill_id: "other".into(),
            kind: ForkKind::Duplicate,
            version: Some("1.0.0".into()),
        });
        store.create_skill(&skill).unwrap();

        let loaded = store.get_skill_by_slug("demo").unwrap().unwrap();
        assert_eq!(loaded.id, "s1");
        assert_eq!(loaded.tags.get("latest").map(String::as_str), Some("v1"));
        let fork = loaded.fork_of.unwrap();
        assert_eq!(fork.kind, ForkKind::Duplicate);
        assert_eq!(fork.version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_embedding_top_k_filters_visibility() {
        let store = store();
        store.create_user(&test_user("u1", Role::User)).unwrap();
        store.create_skill(&test_skill("s1", "a", "u1")).unwrap();
        store.create_skill(&test_skill("s2", "b", "u1")).unwrap();

        let now = Utc::now();
        let make = |id: &str, skill: &str, vis: Visibility, vector: Vec<f32>| SkillEmbedding {
            id: id.to_string(),
            skill_id: skill.to_string(),
            version_id: format!("{id}-v"),
            owner_id: "u1".to_string(),
            vector,
            is_latest: true,
            is_approved: false,
            visibility: vis,
            updated_at: now,
        };

        let conn = store.conn();
        insert_embedding_tx(&conn, &make("e1", "s1", Visibility::Latest, vec![1.0, 0.0])).unwrap();
        insert_embedding_tx(&conn, &make("e2", "s2", Visibility::Deleted, vec![1.0, 0.0])).unwrap();
        drop(conn);

        let hits = store
            .embedding_top_k(&[1.0, 0.0], Visibility::SEARCHABLE, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].skill_id, "s1");
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn test_hard_delete_clears_lineage() {
        let store = store();
        store.create_user(&test_user("u1", Role::User)).unwrap();
        store.create_skill(&test_skill("s1", "canon", "u1")).unwrap();

        let mut dup = test_skill("s2", "copy", "u1");
        dup.canonical_skill_id = Some("s1".into());
        dup.fork_of = Some(ForkOf {
            skill_id: "s1".into(),
            kind: ForkKind::Duplicate,
            version: None,
        });
        store.create_skill(&dup).unwrap();

        assert!(store.hard_delete_skill("s1").unwrap());
        let dup = store.get_skill("s2").unwrap().unwrap();
        assert!(dup.canonical_skill_id.is_none());
        assert!(dup.fork_of.is_none());
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vector_blob_round_trip() {
        let v = vec![0.25f32, -1.5, 3.75];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }
}
