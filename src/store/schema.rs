pub const SCHEMA: &str = r#"
-- Users are created by the platform's login flow; the core only reads them
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    handle TEXT UNIQUE,
    display_name TEXT,
    image TEXT,
    role TEXT NOT NULL DEFAULT 'user',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    deleted_at TEXT
);

-- Tokens are auth credentials; the raw string is never stored
CREATE TABLE IF NOT EXISTS api_tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- short prefix for indexed lookup
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    label TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    revoked_at TEXT,
    last_used_at TEXT
);

-- Skills; slugs are globally unique, including soft-deleted rows
CREATE TABLE IF NOT EXISTS skills (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    summary TEXT,
    owner_user_id TEXT NOT NULL REFERENCES users(id),
    latest_version_id TEXT,            -- no FK: written in the same txn as the version
    tags TEXT NOT NULL DEFAULT '{}',   -- JSON object tag-name -> version id
    canonical_skill_id TEXT,
    fork_of_skill_id TEXT,
    fork_of_kind TEXT,                 -- 'fork' | 'duplicate'
    fork_of_version TEXT,
    moderation_status TEXT NOT NULL DEFAULT 'active',
    soft_deleted_at TEXT,
    report_count INTEGER NOT NULL DEFAULT 0,

    -- Stat counters
    stat_downloads INTEGER NOT NULL DEFAULT 0,
    stat_stars INTEGER NOT NULL DEFAULT 0,
    stat_versions INTEGER NOT NULL DEFAULT 0,
    stat_comments INTEGER NOT NULL DEFAULT 0,
    stat_installs_current INTEGER NOT NULL DEFAULT 0,
    stat_installs_all_time INTEGER NOT NULL DEFAULT 0,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Immutable published versions
CREATE TABLE IF NOT EXISTS skill_versions (
    id TEXT PRIMARY KEY,
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    version TEXT NOT NULL,
    changelog TEXT NOT NULL DEFAULT '',
    changelog_source TEXT NOT NULL DEFAULT 'auto',
    files TEXT NOT NULL,               -- JSON array of the file manifest
    fingerprint TEXT NOT NULL,
    parsed TEXT NOT NULL DEFAULT '{}', -- JSON: frontmatter + optional metadata
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    soft_deleted_at TEXT,

    UNIQUE(skill_id, version)
);

-- Fingerprint index rows; also power cross-skill duplicate detection
CREATE TABLE IF NOT EXISTS version_fingerprints (
    version_id TEXT PRIMARY KEY REFERENCES skill_versions(id) ON DELETE CASCADE,
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    fingerprint TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- One embedding row per version; visibility drives search participation
CREATE TABLE IF NOT EXISTS skill_embeddings (
    id TEXT PRIMARY KEY,
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    version_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    vector BLOB NOT NULL,              -- little-endian f32s
    is_latest INTEGER NOT NULL DEFAULT 0,
    is_approved INTEGER NOT NULL DEFAULT 0,
    visibility TEXT NOT NULL,
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS stars (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, skill_id)
);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(id),
    body TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    soft_deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS skill_badges (
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    by_user_id TEXT NOT NULL,
    at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (skill_id, kind)
);

-- Append-only record of privileged mutations
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    actor_user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT DEFAULT (datetime('now'))
);

-- Per-client install rows; feed the install stat counters
CREATE TABLE IF NOT EXISTS skill_installs (
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    client_id TEXT NOT NULL,
    version TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    installed_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (skill_id, client_id)
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON api_tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON api_tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_skills_owner ON skills(owner_user_id);
CREATE INDEX IF NOT EXISTS idx_skills_updated ON skills(updated_at);
CREATE INDEX IF NOT EXISTS idx_versions_skill ON skill_versions(skill_id, created_at);
CREATE INDEX IF NOT EXISTS idx_fingerprints_skill ON version_fingerprints(skill_id, fingerprint);
CREATE INDEX IF NOT EXISTS idx_fingerprints_fp ON version_fingerprints(fingerprint);
CREATE INDEX IF NOT EXISTS idx_embeddings_skill ON skill_embeddings(skill_id);
CREATE INDEX IF NOT EXISTS idx_embeddings_visibility ON skill_embeddings(visibility);
CREATE INDEX IF NOT EXISTS idx_comments_skill ON comments(skill_id);
CREATE INDEX IF NOT EXISTS idx_stars_skill ON stars(skill_id);
CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor_user_id);
"#;
