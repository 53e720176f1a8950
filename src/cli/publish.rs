use std::path::Path;

use super::CliContext;
use super::commands::Bump;
use super::http_client::UploadFile;
use super::planner::bump_version;
use super::scan;

pub struct PublishArgs {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub changelog: Option<String>,
    pub tags: Option<String>,
    pub fork_of: Option<String>,
}

pub async fn run_publish(ctx: &CliContext, path: &Path, args: PublishArgs) -> anyhow::Result<()> {
    let client = ctx.authenticated_client()?;

    let dir = path
        .canonicalize()
        .map_err(|_| anyhow::anyhow!("skill folder not found: {}", path.display()))?;
    let slug = match args.slug {
        Some(slug) => slug.to_lowercase(),
        None => dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| anyhow::anyhow!("could not derive a slug from {}", dir.display()))?,
    };

    let local = scan::hash_skill_dir(&slug, &dir)?;

    // Pick the version: explicit flag, else 1.0.0 for new slugs, else a
    // patch bump of the latest published version.
    let version = match args.version {
        Some(version) => version,
        None => match client.get_skill(&slug).await? {
            None => "1.0.0".to_string(),
            Some(detail) => {
                let resolved = client.resolve(&slug, &local.fingerprint).await?;
                if let Some(matched) = resolved.matched {
                    println!(
                        "{slug} is already published as {} (nothing changed)",
                        matched.version
                    );
                    return Ok(());
                }
                let latest = resolved
                    .latest_version
                    .map(|v| v.version)
                    .or(detail.latest_version.map(|v| v.version))
                    .unwrap_or_else(|| "0.0.0".to_string());
                bump_version(&latest, Bump::Patch)?
            }
        },
    };

    let display_name = args
        .name
        .or(local.display_name.clone())
        .unwrap_or_else(|| slug.clone());

    let tags: Vec<String> = args
        .tags
        .as_deref()
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let fork_of = args.fork_of.as_deref().map(parse_fork_of);

    let mut payload = serde_json::json!({
        "slug": slug,
        "displayName": display_name,
        "version": version,
        "changelog": args.changelog.unwrap_or_default(),
        "tags": tags,
        "source": "publish",
    });
    if let Some((fork_slug, fork_version)) = fork_of {
        payload["forkOf"] = serde_json::json!({
            "slug": fork_slug,
            "version": fork_version,
        });
    }

    let mut files = Vec::with_capacity(local.files.len());
    for file in &local.files {
        println!("  uploading {} ({} bytes)", file.path, file.size);
        files.push(UploadFile {
            path: file.path.clone(),
            bytes: std::fs::read(&file.abs_path)?,
            content_type: file.content_type.clone(),
        });
    }

    let result = client.publish(&payload, files).await?;
    println!("Published {}@{}", result.slug, result.version);
    println!("  fingerprint {}", result.fingerprint);
    Ok(())
}

/// Parses `slug` or `slug@version`.
fn parse_fork_of(spec: &str) -> (String, Option<String>) {
    match spec.split_once('@') {
        Some((slug, version)) => (slug.to_string(), Some(version.to_string())),
        None => (spec.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fork_of() {
        assert_eq!(parse_fork_of("demo"), ("demo".to_string(), None));
        assert_eq!(
            parse_fork_of("demo@1.2.0"),
            ("demo".to_string(), Some("1.2.0".to_string()))
        );
    }
}
