use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::types::{SkillVersion, VersionFile};

/// Inputs handed to the changelog summarizer.
pub struct ChangelogContext<'a> {
    pub slug: &'a str,
    pub version: &'a str,
    pub files: &'a [VersionFile],
    pub previous: Option<&'a SkillVersion>,
}

/// The external auto-changelog collaborator: manifest in, short markdown out.
#[async_trait]
pub trait ChangelogGenerator: Send + Sync {
    async fn summarize(&self, ctx: ChangelogContext<'_>) -> anyhow::Result<String>;
}

/// Default summarizer: a one-line diff of the file manifests.
pub struct AutoChangelog;

#[async_trait]
impl ChangelogGenerator for AutoChangelog {
    async fn summarize(&self, ctx: ChangelogContext<'_>) -> anyhow::Result<String> {
        let Some(previous) = ctx.previous else {
            return Ok("Initial release.".to_string());
        };

        let old: BTreeMap<&str, &str> = previous
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.sha256.as_str()))
            .collect();
        let new: BTreeMap<&str, &str> = ctx
            .files
            .iter()
            .map(|f| (f.path.as_str(), f.sha256.as_str()))
            .collect();

        let added: Vec<&str> = new.keys().filter(|p| !old.contains_key(*p)).copied().collect();
        let removed: Vec<&str> = old.keys().filter(|p| !new.contains_key(*p)).copied().collect();
        let changed: Vec<&str> = new
            .iter()
            .filter(|(p, sha)| old.get(*p).is_some_and(|old_sha| old_sha != *sha))
            .map(|(p, _)| *p)
            .collect();

        let mut parts = Vec::new();
        if !changed.is_empty() {
            parts.push(format!("update {}", summarize_paths(&changed)));
        }
        if !added.is_empty() {
            parts.push(format!("add {}", summarize_paths(&added)));
        }
        if !removed.is_empty() {
            parts.push(format!("remove {}", summarize_paths(&removed)));
        }

        if parts.is_empty() {
            return Ok(format!("Republish as {}.", ctx.version));
        }

        let mut line = parts.join("; ");
        if let Some(first) = line.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        Ok(format!("{line}."))
    }
}

fn summarize_paths(paths: &[&str]) -> String {
    const SHOWN: usize = 3;
    let shown = paths.iter().take(SHOWN).copied().collect::<Vec<_>>().join(", ");
    if paths.len() > SHOWN {
        format!("{shown} and {} more", paths.len() - SHOWN)
    } else {
        shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::{ChangelogSource, ParsedSkillMd};

    fn file(path: &str, sha: &str) -> VersionFile {
        VersionFile {
            path: path.to_string(),
            size: 1,
            sha256: sha.to_string(),
            storage_id: sha.to_string(),
            content_type: None,
        }
    }

    fn version(files: Vec<VersionFile>) -> SkillVersion {
        SkillVersion {
            id: "v1".into(),
            skill_id: "s1".into(),
            version: "1.0.0".into(),
            changelog: String::new(),
            changelog_source: ChangelogSource::Auto,
            files,
            fingerprint: String::new(),
            parsed: ParsedSkillMd::default(),
            created_by: "u1".into(),
            created_at: Utc::now(),
            soft_deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_initial_release() {
        let files = vec![file("SKILL.md", "a")];
        let out = AutoChangelog
            .summarize(ChangelogContext {
                slug: "demo",
                version: "1.0.0",
                files: &files,
                previous: None,
            })
            .await
            .unwrap();
        assert_eq!(out, "Initial release.");
    }

    #[tokio::test]
    async fn test_diff_summary() {
        let previous = version(vec![file("SKILL.md", "a"), file("old.md", "b")]);
        let files = vec![file("SKILL.md", "a2"), file("new.md", "c")];
        let out = AutoChangelog
            .summarize(ChangelogContext {
                slug: "demo",
                version: "1.0.1",
                files: &files,
                previous: Some(&previous),
            })
            .await
            .unwrap();
        assert!(out.contains("SKILL.md"));
        assert!(out.contains("new.md"));
        assert!(out.contains("old.md"));
    }

    #[tokio::test]
    async fn test_identical_manifest() {
        let previous = version(vec![file("SKILL.md", "a")]);
        let files = vec![file("SKILL.md", "a")];
        let out = AutoChangelog
            .summarize(ChangelogContext {
                slug: "demo",
                version: "1.0.1",
                files: &files,
                previous: Some(&previous),
            })
            .await
            .unwrap();
        assert_eq!(out, "Republish as 1.0.1.");
    }
}
