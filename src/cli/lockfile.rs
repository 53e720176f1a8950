use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-workdir record of installed skills: `<workdir>/.clawdhub/lock.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub skills: BTreeMap<String, LockEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub version: String,
    pub installed_at: DateTime<Utc>,
}

/// Per-install record of where a skill came from:
/// `<skill>/.clawdhub/origin.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginMarker {
    pub version: u32,
    pub registry: String,
    pub slug: String,
    pub installed_version: String,
    pub installed_at: DateTime<Utc>,
}

pub const ORIGIN_FORMAT_VERSION: u32 = 1;

fn lockfile_path(workdir: &Path) -> PathBuf {
    workdir.join(".clawdhub").join("lock.json")
}

pub fn load_lockfile(workdir: &Path) -> anyhow::Result<Lockfile> {
    let path = lockfile_path(workdir);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => return Ok(Lockfile::default()),
    };
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("corrupted lockfile at {}: {e}", path.display()))
}

pub fn save_lockfile(workdir: &Path, lockfile: &Lockfile) -> anyhow::Result<()> {
    let path = lockfile_path(workdir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(lockfile)?)?;
    Ok(())
}

fn origin_path(skill_dir: &Path) -> PathBuf {
    skill_dir.join(".clawdhub").join("origin.json")
}

pub fn read_origin(skill_dir: &Path) -> Option<OriginMarker> {
    let content = fs::read_to_string(origin_path(skill_dir)).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn write_origin(skill_dir: &Path, marker: &OriginMarker) -> anyhow::Result<()> {
    let path = origin_path(skill_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(marker)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lockfile_round_trip() {
        let tmp = TempDir::new().unwrap();

        let mut lockfile = Lockfile::default();
        lockfile.skills.insert(
            "demo".into(),
            LockEntry {
                version: "1.0.0".into(),
                installed_at: Utc::now(),
            },
        );
        save_lockfile(tmp.path(), &lockfile).unwrap();

        let loaded = load_lockfile(tmp.path()).unwrap();
        assert_eq!(loaded.skills.len(), 1);
        assert_eq!(loaded.skills["demo"].version, "1.0.0");
    }

    #[test]
    fn test_missing_lockfile_is_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = load_lockfile(tmp.path()).unwrap();
        assert!(loaded.skills.is_empty());
    }

    #[test]
    fn test_origin_round_trip() {
        let tmp = TempDir::new().unwrap();
        let marker = OriginMarker {
            version: ORIGIN_FORMAT_VERSION,
            registry: "https://clawdhub.com".into(),
            slug: "demo".into(),
            installed_version: "1.2.0".into(),
            installed_at: Utc::now(),
        };
        write_origin(tmp.path(), &marker).unwrap();

        let loaded = read_origin(tmp.path()).unwrap();
        assert_eq!(loaded.slug, "demo");
        assert_eq!(loaded.installed_version, "1.2.0");
    }
}
