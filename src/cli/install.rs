use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::Utc;

use super::CliContext;
use super::lockfile::{self, LockEntry, ORIGIN_FORMAT_VERSION, OriginMarker};

pub async fn run_install(
    ctx: &CliContext,
    slug: &str,
    version: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let client = ctx.client()?;

    let detail = client
        .get_skill(slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("skill '{slug}' not found on {}", ctx.registry_url))?;

    let version = match version {
        Some(v) => v.to_string(),
        None => detail
            .latest_version
            .map(|v| v.version)
            .ok_or_else(|| anyhow::anyhow!("skill '{slug}' has no published versions"))?,
    };

    let dest = ctx.skills_dir().join(slug);
    if dest.exists() && !force {
        let overwrite = if ctx.no_input {
            false
        } else {
            inquire::Confirm::new(&format!("{} already exists. Overwrite?", dest.display()))
                .with_default(false)
                .prompt()
                .unwrap_or(false)
        };
        if !overwrite {
            anyhow::bail!(
                "{} already exists; pass --force to overwrite",
                dest.display()
            );
        }
    }

    let bytes = client.download_zip(slug, &version).await?;
    extract_zip(&bytes, &dest)?;

    lockfile::write_origin(
        &dest,
        &OriginMarker {
            version: ORIGIN_FORMAT_VERSION,
            registry: ctx.registry_url.clone(),
            slug: slug.to_string(),
            installed_version: version.clone(),
            installed_at: Utc::now(),
        },
    )?;

    let mut lock = lockfile::load_lockfile(&ctx.workdir)?;
    lock.skills.insert(
        slug.to_string(),
        LockEntry {
            version: version.clone(),
            installed_at: Utc::now(),
        },
    );
    lockfile::save_lockfile(&ctx.workdir, &lock)?;

    if !ctx.telemetry_disabled && ctx.token.is_some() {
        let client_id = machine_id();
        if let Err(e) = client
            .report_install(slug, &version, &client_id, "installed")
            .await
        {
            tracing::debug!("install report failed: {e}");
        }
    }

    println!("Installed {slug}@{version} to {}", dest.display());
    Ok(())
}

/// Extracts a bundle zip into `dest`, replacing previous contents. Entry
/// names are validated against traversal before any write.
pub(super) fn extract_zip(bytes: &[u8], dest: &Path) -> anyhow::Result<()> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            anyhow::bail!("archive entry escapes the target directory: {}", entry.name());
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content)?;
        fs::write(&target, content)?;
    }

    Ok(())
}

/// A stable per-machine identifier for install counters; random but persisted.
pub(super) fn machine_id() -> String {
    let path = directories::ProjectDirs::from("", "", "clawdhub")
        .map(|dirs| dirs.config_dir().join("machine-id"));

    if let Some(path) = path {
        if let Ok(existing) = fs::read_to_string(&path) {
            let existing = existing.trim();
            if !existing.is_empty() {
                return existing.to_string();
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let _ = fs::write(&path, &id);
        return id;
    }

    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn make_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for (path, content) in entries {
                writer.start_file(*path, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_extract_zip() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("demo");

        let bytes = make_zip(&[("SKILL.md", "---\nname: demo\n---\nBody"), ("docs/usage.md", "hi")]);
        extract_zip(&bytes, &dest).unwrap();

        assert!(dest.join("SKILL.md").is_file());
        assert_eq!(fs::read_to_string(dest.join("docs/usage.md")).unwrap(), "hi");
    }

    #[test]
    fn test_extract_zip_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("demo");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.md"), "old").unwrap();

        let bytes = make_zip(&[("SKILL.md", "new")]);
        extract_zip(&bytes, &dest).unwrap();

        assert!(!dest.join("stale.md").exists());
        assert!(dest.join("SKILL.md").is_file());
    }
}
