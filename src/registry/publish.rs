use chrono::Utc;
use semver::Version;
use uuid::Uuid;

use super::bundle::{
    MAX_BUNDLE_BYTES, ParsedBundle, build_embedding_text, is_allowed_file, is_skill_md,
    sanitize_path, validate_slug,
};
use super::changelog::ChangelogContext;
use super::fingerprint::bundle_fingerprint;
use super::Registry;
use crate::error::{Error, Result};
use crate::store::{EmbeddingFlagUpdate, PublishCommit};
use crate::types::*;

/// One file reference in a publish request. The bytes must already sit in
/// the object store under `storage_id`.
#[derive(Debug, Clone)]
pub struct PublishFile {
    pub path: String,
    pub size: i64,
    pub storage_id: String,
    pub sha256: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForkOfInput {
    pub slug: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PublishInput {
    pub slug: String,
    pub display_name: String,
    pub version: String,
    pub changelog: Option<String>,
    pub tags: Vec<String>,
    pub fork_of: Option<ForkOfInput>,
    pub source: Option<String>,
    pub files: Vec<PublishFile>,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub skill: Skill,
    pub version: SkillVersion,
}

impl Registry {
    /// Publishes a new version of a skill. All validation and external reads
    /// happen before the single atomic metadata write; the off-site backup
    /// and webhook dispatch are scheduled after it, fire-and-forget.
    pub async fn publish(&self, input: PublishInput, actor: &User) -> Result<PublishOutcome> {
        // Validation, in order; each failure is fatal.
        if !validate_slug(&input.slug) {
            return Err(Error::Validation(format!("invalid slug: {}", input.slug)));
        }
        let display_name = input.display_name.trim();
        if display_name.is_empty() {
            return Err(Error::Validation("displayName cannot be empty".into()));
        }
        Version::parse(&input.version)
            .map_err(|e| Error::Validation(format!("invalid semver '{}': {e}", input.version)))?;

        let mut seen_paths = std::collections::BTreeSet::new();
        for file in &input.files {
            sanitize_path(&file.path)?;
            if !seen_paths.insert(file.path.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate file path: {}",
                    file.path
                )));
            }
        }

        for file in &input.files {
            if !is_allowed_file(&file.path, file.content_type.as_deref()) {
                return Err(Error::UnsupportedFileType(file.path.clone()));
            }
        }

        let total: u64 = input.files.iter().map(|f| f.size.max(0) as u64).sum();
        if total > MAX_BUNDLE_BYTES {
            return Err(Error::BundleTooLarge {
                size: total,
                limit: MAX_BUNDLE_BYTES,
            });
        }

        let skill_md_count = input.files.iter().filter(|f| is_skill_md(&f.path)).count();
        if skill_md_count != 1 {
            return Err(Error::Validation(
                "bundle must contain exactly one SKILL.md".into(),
            ));
        }

        let existing = self.store.get_skill_by_slug(&input.slug)?;
        if let Some(skill) = &existing {
            if skill.owner_user_id != actor.id {
                return Err(Error::Forbidden);
            }
            if self
                .store
                .get_version_by_number(&skill.id, &input.version)?
                .is_some()
            {
                return Err(Error::Conflict(format!(
                    "version {} already exists",
                    input.version
                )));
            }
        }

        // External reads: object store, then frontmatter parse.
        for file in &input.files {
            if file.sha256 != file.storage_id {
                return Err(Error::Validation(format!(
                    "file hash does not match stored object: {}",
                    file.path
                )));
            }
            let present = self
                .blobs
                .exists(&file.storage_id)
                .await
                .map_err(|e| Error::Validation(format!("bad storage id {}: {e}", file.path)))?;
            if !present {
                return Err(Error::Validation(format!(
                    "no stored object for file: {}",
                    file.path
                )));
            }
        }

        let skill_md = input
            .files
            .iter()
            .find(|f| is_skill_md(&f.path))
            .expect("skill_md_count == 1");
        let skill_md_bytes = self
            .blobs
            .get(&skill_md.storage_id)
            .await
            .map_err(|e| Error::Validation(format!("failed to read SKILL.md: {e}")))?;
        let parsed_bundle = ParsedBundle::parse(&String::from_utf8_lossy(&skill_md_bytes))?;
        let summary = parsed_bundle.description().map(str::to_string);

        let mut extra_bodies = Vec::new();
        for file in &input.files {
            if is_skill_md(&file.path) || file.path.to_ascii_lowercase().ends_with(".md") {
                continue;
            }
            match self.blobs.get(&file.storage_id).await {
                Ok(bytes) => extra_bodies.push(String::from_utf8_lossy(&bytes).into_owned()),
                Err(e) => {
                    tracing::warn!("skipping {} in embedding text: {e}", file.path);
                }
            }
        }
        let embedding_text = build_embedding_text(&parsed_bundle, &extra_bodies);

        let fingerprint = bundle_fingerprint(
            input
                .files
                .iter()
                .map(|f| (f.path.as_str(), f.sha256.as_str())),
        );

        // Lineage: explicit fork, else cross-skill duplicate probe.
        let self_id = existing.as_ref().map(|s| s.id.clone());
        let (fork_of, canonical_skill_id) = self
            .determine_lineage(&input, self_id.as_deref(), &fingerprint)
            .await?;

        let now = Utc::now();
        let version_id = Uuid::new_v4().to_string();
        let skill_id = self_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let skill_is_new = existing.is_none();

        let previous_version = match existing.as_ref().and_then(|s| s.latest_version_id.clone()) {
            Some(id) => self.store.get_version(&id)?,
            None => None,
        };

        let files: Vec<VersionFile> = input
            .files
            .iter()
            .map(|f| VersionFile {
                path: f.path.clone(),
                size: f.size,
                sha256: f.sha256.clone(),
                storage_id: f.storage_id.clone(),
                content_type: f.content_type.clone(),
            })
            .collect();

        let (changelog, changelog_source) = match input.changelog.as_deref() {
            Some(text) if !text.trim().is_empty() => {
                (text.trim().to_string(), ChangelogSource::User)
            }
            _ => {
                let ctx = ChangelogContext {
                    slug: &input.slug,
                    version: &input.version,
                    files: &files,
                    previous: previous_version.as_ref(),
                };
                match self.changelog.summarize(ctx).await {
                    Ok(text) => (text, ChangelogSource::Auto),
                    Err(e) => {
                        tracing::warn!("auto-changelog failed for {}: {e}", input.slug);
                        (String::new(), ChangelogSource::Auto)
                    }
                }
            }
        };

        // The vector must be in hand before anything durable becomes visible.
        let vector = self
            .embedder
            .embed(&embedding_text)
            .await
            .map_err(|e| Error::EmbeddingUnavailable(e.to_string()))?;

        let badges = match existing.as_ref() {
            Some(skill) => self.store.list_badges(&skill.id)?,
            None => Vec::new(),
        };
        let is_approved = badges.iter().any(|b| b.kind == BadgeKind::RedactionApproved);

        let version = SkillVersion {
            id: version_id.clone(),
            skill_id: skill_id.clone(),
            version: input.version.clone(),
            changelog,
            changelog_source,
            files,
            fingerprint: fingerprint.clone(),
            parsed: parsed_bundle.parsed.clone(),
            created_by: actor.id.clone(),
            created_at: now,
            soft_deleted_at: None,
        };

        let mut skill = existing.clone().unwrap_or_else(|| Skill {
            id: skill_id.clone(),
            slug: input.slug.clone(),
            display_name: display_name.to_string(),
            summary: None,
            owner_user_id: actor.id.clone(),
            latest_version_id: None,
            tags: Default::default(),
            canonical_skill_id: None,
            fork_of: None,
            moderation_status: ModerationStatus::Active,
            soft_deleted_at: None,
            report_count: 0,
            stats: SkillStats::default(),
            created_at: now,
            updated_at: now,
        });

        skill.display_name = display_name.to_string();
        if summary.is_some() {
            skill.summary = summary;
        }
        skill.latest_version_id = Some(version_id.clone());
        skill.tags.insert("latest".into(), version_id.clone());
        for tag in &input.tags {
            skill.tags.insert(tag.clone(), version_id.clone());
        }
        if fork_of.is_some() {
            skill.fork_of = fork_of;
            skill.canonical_skill_id = canonical_skill_id;
        }
        skill.stats.versions += 1;
        skill.soft_deleted_at = None;
        skill.updated_at = now;

        let demote_embeddings = match self.store.get_latest_embedding(&skill_id)? {
            Some(prev) => vec![EmbeddingFlagUpdate {
                id: prev.id,
                is_latest: false,
                is_approved: prev.is_approved,
                visibility: Visibility::compute(false, prev.is_approved, false),
            }],
            None => Vec::new(),
        };

        let embedding = SkillEmbedding {
            id: Uuid::new_v4().to_string(),
            skill_id: skill_id.clone(),
            version_id: version_id.clone(),
            owner_id: skill.owner_user_id.clone(),
            vector,
            is_latest: true,
            is_approved,
            visibility: Visibility::compute(true, is_approved, false),
            updated_at: now,
        };

        let commit = PublishCommit {
            skill: skill.clone(),
            skill_is_new,
            version: version.clone(),
            fingerprint: VersionFingerprint {
                skill_id: skill_id.clone(),
                version_id: version_id.clone(),
                fingerprint,
                created_at: now,
            },
            embedding,
            demote_embeddings,
        };

        self.store.commit_publish(&commit)?;

        // Best-effort, after the commit; failures never roll back the publish.
        let slug = skill.slug.clone();
        let published = input.version.clone();
        tokio::spawn(async move {
            tracing::debug!(%slug, version = %published, "scheduling off-site backup");
            tracing::debug!(%slug, version = %published, "dispatching publish webhook");
        });

        Ok(PublishOutcome { skill, version })
    }

    async fn determine_lineage(
        &self,
        input: &PublishInput,
        self_id: Option<&str>,
        fingerprint: &str,
    ) -> Result<(Option<ForkOf>, Option<String>)> {
        if let Some(fork) = &input.fork_of {
            if fork.slug == input.slug {
                return Err(Error::Validation("a skill cannot fork itself".into()));
            }
            let upstream = self
                .store
                .get_skill_by_slug(&fork.slug)?
                .filter(|s| !s.is_soft_deleted())
                .ok_or_else(|| {
                    Error::Validation(format!("forkOf skill not found: {}", fork.slug))
                })?;
            let canonical = upstream
                .canonical_skill_id
                .clone()
                .unwrap_or_else(|| upstream.id.clone());
            return Ok((
                Some(ForkOf {
                    skill_id: upstream.id,
                    kind: ForkKind::Fork,
                    version: fork.version.clone(),
                }),
                Some(canonical),
            ));
        }

        if let Some((owner, _fp)) = self.store.find_fingerprint_owner(fingerprint)? {
            if Some(owner.id.as_str()) != self_id {
                let canonical = owner
                    .canonical_skill_id
                    .clone()
                    .unwrap_or_else(|| owner.id.clone());
                return Ok((
                    Some(ForkOf {
                        skill_id: owner.id,
                        kind: ForkKind::Duplicate,
                        version: None,
                    }),
                    Some(canonical),
                ));
            }
        }

        Ok((None, None))
    }
}
