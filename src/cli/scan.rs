use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::registry::{
    ParsedBundle, bundle_fingerprint, is_allowed_file, is_skill_md, sha256_hex, validate_slug,
};

/// One hashed file inside a local skill folder. `path` is the bundle-relative
/// path with `/` separators, exactly as the server stores it.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: String,
    pub abs_path: PathBuf,
    pub size: u64,
    pub sha256: String,
    pub content_type: Option<String>,
}

/// A local skill folder, hashed the way the server would hash it.
#[derive(Debug, Clone)]
pub struct LocalSkill {
    pub slug: String,
    pub dir: PathBuf,
    pub files: Vec<LocalFile>,
    pub fingerprint: String,
    pub display_name: Option<String>,
}

/// Merges user-provided roots, the workdir's install directory, the shared
/// user-level skills directory, and any roots named in the workspace pointer
/// file. Resolved through canonical paths and deduplicated.
pub fn discover_roots(explicit: &[PathBuf], workdir: &Path, install_dir: &str) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = explicit.to_vec();
    candidates.push(workdir.join(install_dir));

    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        candidates.push(home.join(".clawdhub").join("skills"));

        // Workspace pointer file: one extra root per line.
        let pointer = home.join(".clawdhub").join("workspace");
        if let Ok(content) = fs::read_to_string(&pointer) {
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    candidates.push(PathBuf::from(line));
                }
            }
        }
    }

    let mut seen = BTreeSet::new();
    let mut roots = Vec::new();
    for candidate in candidates {
        let Ok(resolved) = candidate.canonicalize() else {
            continue;
        };
        if !resolved.is_dir() {
            continue;
        }
        if seen.insert(resolved.clone()) {
            roots.push(resolved);
        }
    }
    roots
}

/// A candidate folder found during the scan, before hashing.
#[derive(Debug, Clone)]
pub struct SkillFolder {
    pub slug: String,
    pub dir: PathBuf,
}

/// Scans each root one level deep for folders containing a SKILL.md
/// (case-insensitively). Falls back to a `skills/` subdirectory of each root
/// when the direct scan finds nothing. Duplicate slugs keep the first folder;
/// the rest are reported back.
pub fn scan_roots(roots: &[PathBuf]) -> (Vec<SkillFolder>, Vec<SkillFolder>) {
    let mut found = Vec::new();
    for root in roots {
        scan_one_root(root, &mut found);
    }

    if found.is_empty() {
        // Legacy layout: skills nested one level deeper.
        for root in roots {
            let legacy = root.join("skills");
            if legacy.is_dir() {
                scan_one_root(&legacy, &mut found);
            }
        }
    }

    let mut seen = BTreeSet::new();
    let mut unique = Vec::new();
    let mut skipped = Vec::new();
    for folder in found {
        if seen.insert(folder.slug.clone()) {
            unique.push(folder);
        } else {
            skipped.push(folder);
        }
    }
    (unique, skipped)
}

fn scan_one_root(root: &Path, out: &mut Vec<SkillFolder>) {
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if !has_skill_md(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let slug = name.to_lowercase();
        if !validate_slug(&slug) {
            tracing::warn!("skipping folder with invalid slug: {}", path.display());
            continue;
        }
        out.push(SkillFolder { slug, dir: path });
    }
}

fn has_skill_md(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|e| {
        e.path().is_file()
            && e.file_name()
                .to_str()
                .is_some_and(is_skill_md)
    })
}

/// Hashes a skill folder: enumerates allow-listed text files, computes each
/// file's SHA-256 and the bundle fingerprint exactly as the server would.
pub fn hash_skill_dir(slug: &str, dir: &Path) -> anyhow::Result<LocalSkill> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let abs_path = entry.path().to_path_buf();
        let rel = abs_path
            .strip_prefix(dir)
            .expect("walkdir yields children of dir");
        let rel_str = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        // Never ship install metadata or hidden files.
        if rel_str.split('/').any(|c| c.starts_with('.')) {
            continue;
        }
        if !is_allowed_file(&rel_str, None) {
            continue;
        }

        let bytes = fs::read(&abs_path)?;
        files.push(LocalFile {
            sha256: sha256_hex(&bytes),
            size: bytes.len() as u64,
            path: rel_str,
            abs_path,
            content_type: None,
        });
    }

    if !files.iter().any(|f| is_skill_md(&f.path)) {
        anyhow::bail!("{} has no SKILL.md", dir.display());
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    let fingerprint =
        bundle_fingerprint(files.iter().map(|f| (f.path.as_str(), f.sha256.as_str())));

    let display_name = read_display_name(dir, &files);

    Ok(LocalSkill {
        slug: slug.to_string(),
        dir: dir.to_path_buf(),
        files,
        fingerprint,
        display_name,
    })
}

fn read_display_name(dir: &Path, files: &[LocalFile]) -> Option<String> {
    let skill_md = files.iter().find(|f| is_skill_md(&f.path))?;
    let content = fs::read_to_string(dir.join(&skill_md.path)).ok()?;
    let bundle = ParsedBundle::parse(&content).ok()?;
    bundle
        .parsed
        .frontmatter
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_skill(root: &Path, slug: &str, body: &str) -> PathBuf {
        let dir = root.join(slug);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {slug}\ndescription: test\n---\n{body}\n"),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_scan_finds_skill_folders() {
        let tmp = TempDir::new().unwrap();
        write_skill(tmp.path(), "alpha", "A");
        write_skill(tmp.path(), "beta", "B");
        fs::create_dir_all(tmp.path().join("not-a-skill")).unwrap();

        let (found, skipped) = scan_roots(&[tmp.path().to_path_buf()]);
        let slugs: Vec<&str> = found.iter().map(|f| f.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "beta"]);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_scan_dedupes_by_slug() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        write_skill(a.path(), "same", "first");
        write_skill(b.path(), "same", "second");

        let (found, skipped) =
            scan_roots(&[a.path().to_path_buf(), b.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert!(found[0].dir.starts_with(a.path()));
    }

    #[test]
    fn test_scan_legacy_fallback() {
        let tmp = TempDir::new().unwrap();
        write_skill(&tmp.path().join("skills"), "nested", "hello");

        let (found, _) = scan_roots(&[tmp.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "nested");
    }

    #[test]
    fn test_hash_skill_dir_matches_server_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let dir = write_skill(tmp.path(), "demo", "Body");
        fs::write(dir.join("notes.md"), "extra").unwrap();
        fs::write(dir.join("binary.png"), [0u8, 1, 2]).unwrap();
        fs::create_dir_all(dir.join(".clawdhub")).unwrap();
        fs::write(dir.join(".clawdhub/origin.json"), "{}").unwrap();

        let local = hash_skill_dir("demo", &dir).unwrap();
        let paths: Vec<&str> = local.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["SKILL.md", "notes.md"]);
        assert_eq!(local.display_name.as_deref(), Some("demo"));

        let expected = bundle_fingerprint(
            local
                .files
                .iter()
                .map(|f| (f.path.as_str(), f.sha256.as_str())),
        );
        assert_eq!(local.fingerprint, expected);
    }

    #[test]
    fn test_hash_skill_dir_requires_skill_md() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("empty");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("README.md"), "no skill file").unwrap();

        assert!(hash_skill_dir("empty", &dir).is_err());
    }
}
