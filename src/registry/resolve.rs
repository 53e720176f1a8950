use semver::Version;

use super::Registry;
use super::fingerprint::bundle_fingerprint;
use crate::error::Result;
use crate::types::SkillVersion;

/// Resolver limits: fingerprint rows consulted, then versions recomputed.
const FINGERPRINT_ROW_LIMIT: i64 = 25;
const RECOMPUTE_VERSION_LIMIT: i64 = 200;

#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// The published version whose bundle fingerprint equals the requested
    /// hash, if any.
    pub matched: Option<SkillVersion>,
    /// The skill's current latest version, reported regardless of a match.
    pub latest_version: Option<SkillVersion>,
}

impl Registry {
    /// Maps `(slug, fingerprint)` to a previously published version. This is
    /// a pure read; missing or soft-deleted skills resolve to `None`.
    pub fn resolve_fingerprint(&self, slug: &str, hash: &str) -> Result<Option<ResolveOutcome>> {
        let Some(skill) = self.store.get_skill_by_slug(slug)? else {
            return Ok(None);
        };
        if skill.is_soft_deleted() {
            return Ok(None);
        }

        let mut matched = None;

        // Fast path: the fingerprint index, newest row first. Rows sharing a
        // created_at are broken by higher semver.
        let mut rows = self
            .store
            .list_fingerprints(&skill.id, hash, FINGERPRINT_ROW_LIMIT)?;
        if !rows.is_empty() {
            let newest_at = rows[0].created_at;
            let mut candidates: Vec<SkillVersion> = Vec::new();
            for row in rows.drain(..) {
                if row.created_at != newest_at {
                    break;
                }
                if let Some(version) = self.store.get_version(&row.version_id)? {
                    candidates.push(version);
                }
            }
            candidates.sort_by(|a, b| {
                let av = Version::parse(&a.version).ok();
                let bv = Version::parse(&b.version).ok();
                bv.cmp(&av)
            });
            matched = candidates
                .into_iter()
                .find(|v| v.soft_deleted_at.is_none());
        }

        // Fallback: recompute from the stored manifests, newest first.
        if matched.is_none() {
            let versions = self
                .store
                .list_versions(&skill.id, None, RECOMPUTE_VERSION_LIMIT)?;
            for version in versions {
                if version.soft_deleted_at.is_some() {
                    continue;
                }
                let fp = bundle_fingerprint(
                    version
                        .files
                        .iter()
                        .map(|f| (f.path.as_str(), f.sha256.as_str())),
                );
                if fp == hash {
                    matched = Some(version);
                    break;
                }
            }
        }

        let latest_version = match &skill.latest_version_id {
            Some(id) => self.store.get_version(id)?,
            None => None,
        };

        Ok(Some(ResolveOutcome {
            matched,
            latest_version,
        }))
    }
}
