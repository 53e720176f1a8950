use futures::StreamExt;
use semver::Version;

use super::commands::Bump;
use super::http_client::ApiClient;
use super::scan::LocalSkill;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 32;

/// Where a local skill stands relative to the registry.
#[derive(Debug, Clone)]
pub enum SkillStatus {
    /// Slug not on the registry yet.
    New,
    /// Local fingerprint matches no published version.
    Update { latest: String },
    /// Local fingerprint matches a published version.
    Synced { version: String },
}

#[derive(Debug, Clone)]
pub struct PlanItem {
    pub skill: LocalSkill,
    pub status: SkillStatus,
}

impl PlanItem {
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        !matches!(self.status, SkillStatus::Synced { .. })
    }

    /// The version a publish of this item would create.
    pub fn next_version(&self, bump: Bump) -> anyhow::Result<String> {
        match &self.status {
            SkillStatus::New => Ok("1.0.0".to_string()),
            SkillStatus::Update { latest } => bump_version(latest, bump),
            SkillStatus::Synced { version } => Ok(version.clone()),
        }
    }
}

/// Classifies each local skill against the registry, at most `concurrency`
/// requests in flight. Order of the input is preserved.
pub async fn classify(
    client: &ApiClient,
    skills: Vec<LocalSkill>,
    concurrency: usize,
) -> anyhow::Result<Vec<PlanItem>> {
    let concurrency = concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);

    let results: Vec<anyhow::Result<PlanItem>> =
        futures::stream::iter(skills.into_iter().map(|skill| async move {
            let status = classify_one(client, &skill).await?;
            Ok(PlanItem { skill, status })
        }))
        .buffered(concurrency)
        .collect()
        .await;

    results.into_iter().collect()
}

async fn classify_one(client: &ApiClient, skill: &LocalSkill) -> anyhow::Result<SkillStatus> {
    let Some(detail) = client.get_skill(&skill.slug).await? else {
        return Ok(SkillStatus::New);
    };

    let resolved = client.resolve(&skill.slug, &skill.fingerprint).await?;
    if let Some(matched) = resolved.matched {
        return Ok(SkillStatus::Synced {
            version: matched.version,
        });
    }

    let latest = resolved
        .latest_version
        .map(|v| v.version)
        .or(detail.latest_version.map(|v| v.version))
        .unwrap_or_else(|| "0.0.0".to_string());
    Ok(SkillStatus::Update { latest })
}

pub fn bump_version(version: &str, bump: Bump) -> anyhow::Result<String> {
    let mut v = Version::parse(version)
        .map_err(|e| anyhow::anyhow!("registry returned invalid version '{version}': {e}"))?;
    v.pre = semver::Prerelease::EMPTY;
    v.build = semver::BuildMetadata::EMPTY;
    match bump {
        Bump::Patch => v.patch += 1,
        Bump::Minor => {
            v.minor += 1;
            v.patch = 0;
        }
        Bump::Major => {
            v.major += 1;
            v.minor = 0;
            v.patch = 0;
        }
    }
    Ok(v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_version() {
        assert_eq!(bump_version("1.2.3", Bump::Patch).unwrap(), "1.2.4");
        assert_eq!(bump_version("1.2.3", Bump::Minor).unwrap(), "1.3.0");
        assert_eq!(bump_version("1.2.3", Bump::Major).unwrap(), "2.0.0");
        assert_eq!(bump_version("1.2.3-rc.1", Bump::Patch).unwrap(), "1.2.4");
        assert!(bump_version("nope", Bump::Patch).is_err());
    }

    #[test]
    fn test_next_version() {
        let skill = LocalSkill {
            slug: "demo".into(),
            dir: std::path::PathBuf::from("/tmp/demo"),
            files: vec![],
            fingerprint: String::new(),
            display_name: None,
        };

        let new = PlanItem {
            skill: skill.clone(),
            status: SkillStatus::New,
        };
        assert_eq!(new.next_version(Bump::Patch).unwrap(), "1.0.0");

        let update = PlanItem {
            skill,
            status: SkillStatus::Update {
                latest: "2.1.0".into(),
            },
        };
        assert_eq!(update.next_version(Bump::Minor).unwrap(), "2.2.0");
        assert!(update.is_actionable());
        assert!(new.is_actionable());
    }
}
