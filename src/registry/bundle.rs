use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::ParsedSkillMd;

/// Bundles are text-only and capped at 50 MB total.
pub const MAX_BUNDLE_BYTES: u64 = 50 * 1024 * 1024;

/// Embedding input is truncated to this many characters.
const EMBEDDING_TEXT_LIMIT: usize = 12_000;

/// Extensions accepted at publish time. Anything else must declare an
/// allow-listed content type.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "md", "markdown", "mdx", "txt", "text", "rst", "adoc", "json", "jsonc", "yaml", "yml", "toml",
    "ini", "cfg", "conf", "csv", "tsv", "xml", "html", "css", "js", "mjs", "ts", "py", "sh",
    "bash", "zsh", "sql",
];

const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/json",
    "application/yaml",
    "application/toml",
    "application/xml",
    "application/x-sh",
];

/// Whether a file may appear in a bundle, judged by extension or declared
/// content type.
#[must_use]
pub fn is_allowed_file(path: &str, content_type: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        if ct.starts_with("text/") || ALLOWED_CONTENT_TYPES.contains(&ct) {
            return true;
        }
        return false;
    }

    match path.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Whether a manifest path is the bundle's skill file. Must sit at the
/// bundle root; the name match is case-insensitive.
#[must_use]
pub fn is_skill_md(path: &str) -> bool {
    path.eq_ignore_ascii_case("SKILL.md") || path.eq_ignore_ascii_case("skills.md")
}

/// Slugs are lowercase, begin with `[a-z0-9]`, continue in `[a-z0-9-]`.
#[must_use]
pub fn validate_slug(slug: &str) -> bool {
    let mut chars = slug.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Rejects absolute paths, backslashes, and any `.`/`..` traversal component.
pub fn sanitize_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::Validation("file path cannot be empty".into()));
    }
    if path.starts_with('/') {
        return Err(Error::Validation(format!(
            "file path cannot be absolute: {path}"
        )));
    }
    if path.contains('\\') {
        return Err(Error::Validation(format!(
            "file path cannot contain backslashes: {path}"
        )));
    }
    if path.split('/').any(|c| c == ".." || c == "." || c.is_empty()) {
        return Err(Error::Validation(format!(
            "file path cannot contain traversal components: {path}"
        )));
    }
    Ok(())
}

/// SKILL.md split into parsed frontmatter and body.
#[derive(Debug, Clone, Default)]
pub struct ParsedBundle {
    pub parsed: ParsedSkillMd,
    pub body: String,
}

impl ParsedBundle {
    /// Parse SKILL.md content. Frontmatter is optional; without it the whole
    /// content is the body and the frontmatter map is empty.
    pub fn parse(content: &str) -> Result<Self> {
        let Some((frontmatter_str, body)) = split_frontmatter(content) else {
            return Ok(ParsedBundle {
                parsed: ParsedSkillMd::default(),
                body: content.trim().to_string(),
            });
        };

        let yaml: serde_yaml::Value = serde_yaml::from_str(&frontmatter_str)
            .map_err(|e| Error::Validation(format!("invalid SKILL.md frontmatter: {e}")))?;
        let json = serde_json::to_value(&yaml)
            .map_err(|e| Error::Validation(format!("invalid SKILL.md frontmatter: {e}")))?;

        let mut frontmatter = match json {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            _ => {
                return Err(Error::Validation(
                    "SKILL.md frontmatter must be a mapping".into(),
                ));
            }
        };

        let metadata = frontmatter.remove("metadata");

        Ok(ParsedBundle {
            parsed: ParsedSkillMd {
                frontmatter,
                metadata,
            },
            body,
        })
    }

    /// The `description` frontmatter key, used as the skill summary.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.parsed
            .frontmatter
            .get("description")
            .and_then(|v| v.as_str())
    }
}

/// Split SKILL.md content at `---` delimiters into (frontmatter, body).
/// Returns None when the content does not start with a frontmatter block.
fn split_frontmatter(content: &str) -> Option<(String, String)> {
    let trimmed = content.trim_start();
    let after_open = trimmed.strip_prefix("---")?;
    let close_pos = after_open.find("\n---")?;

    let frontmatter = after_open[..close_pos].trim().to_string();
    let body = after_open[close_pos + 4..].trim().to_string();
    Some((frontmatter, body))
}

/// Typed projection of `metadata.moltbot` (also accepted under the legacy
/// `clawdbot` namespace). Parsed defensively; malformed metadata yields None.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoltbotMeta {
    #[serde(default)]
    pub requires: MoltbotRequires,
    #[serde(default)]
    pub homepage: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoltbotRequires {
    #[serde(default)]
    pub bins: Vec<String>,
    #[serde(default, rename = "anyBins")]
    pub any_bins: Vec<String>,
}

impl MoltbotMeta {
    #[must_use]
    pub fn from_parsed(parsed: &ParsedSkillMd) -> Option<Self> {
        let metadata = parsed.metadata.as_ref()?;
        let record = metadata.get("moltbot").or_else(|| metadata.get("clawdbot"))?;
        serde_json::from_value(record.clone()).ok()
    }
}

/// Concatenates the frontmatter scalar values, the SKILL.md body, and each
/// additional text body into one embedding input, truncated to the provider
/// limit on a char boundary.
#[must_use]
pub fn build_embedding_text(bundle: &ParsedBundle, extra_bodies: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();

    for (key, value) in &bundle.parsed.frontmatter {
        if let Some(s) = value.as_str() {
            parts.push(format!("{key}: {s}"));
        }
    }
    if !bundle.body.is_empty() {
        parts.push(bundle.body.clone());
    }
    for body in extra_bodies {
        if !body.is_empty() {
            parts.push(body.clone());
        }
    }

    let mut text = parts.join("\n\n");
    if text.chars().count() > EMBEDDING_TEXT_LIMIT {
        text = text.chars().take(EMBEDDING_TEXT_LIMIT).collect();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("demo"));
        assert!(validate_slug("my-skill-2"));
        assert!(validate_slug("0day"));
        assert!(!validate_slug(""));
        assert!(!validate_slug("-leading"));
        assert!(!validate_slug("Upper"));
        assert!(!validate_slug("has_underscore"));
        assert!(!validate_slug("has space"));
    }

    #[test]
    fn test_sanitize_path() {
        assert!(sanitize_path("SKILL.md").is_ok());
        assert!(sanitize_path("docs/usage.md").is_ok());
        assert!(sanitize_path("").is_err());
        assert!(sanitize_path("/etc/passwd").is_err());
        assert!(sanitize_path("a\\b.md").is_err());
        assert!(sanitize_path("../escape.md").is_err());
        assert!(sanitize_path("docs/../escape.md").is_err());
        assert!(sanitize_path("./relative.md").is_err());
        assert!(sanitize_path("docs//double.md").is_err());
    }

    #[test]
    fn test_is_skill_md() {
        assert!(is_skill_md("SKILL.md"));
        assert!(is_skill_md("skill.md"));
        assert!(is_skill_md("skills.md"));
        assert!(is_skill_md("SKILLS.MD"));
        assert!(!is_skill_md("docs/SKILL.md"));
        assert!(!is_skill_md("README.md"));
    }

    #[test]
    fn test_is_allowed_file() {
        assert!(is_allowed_file("SKILL.md", None));
        assert!(is_allowed_file("config.yaml", None));
        assert!(is_allowed_file("LICENSE", Some("text/plain")));
        assert!(is_allowed_file("data.json", Some("application/json; charset=utf-8")));
        assert!(!is_allowed_file("logo.png", None));
        assert!(!is_allowed_file("logo.png", Some("image/png")));
        assert!(!is_allowed_file("LICENSE", None));
    }

    #[test]
    fn test_parse_with_frontmatter() {
        let content = "---\nname: demo\ndescription: A demo skill\nmetadata:\n  moltbot:\n    requires:\n      bins: [jq]\n---\n# Demo\nBody text.\n";
        let bundle = ParsedBundle::parse(content).unwrap();
        assert_eq!(bundle.description(), Some("A demo skill"));
        assert!(bundle.body.contains("Body text"));
        assert_eq!(
            bundle.parsed.frontmatter.get("name").and_then(|v| v.as_str()),
            Some("demo")
        );

        let moltbot = MoltbotMeta::from_parsed(&bundle.parsed).unwrap();
        assert_eq!(moltbot.requires.bins, vec!["jq"]);
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let bundle = ParsedBundle::parse("# Just markdown\nNo frontmatter.").unwrap();
        assert!(bundle.parsed.frontmatter.is_empty());
        assert!(bundle.body.contains("Just markdown"));
    }

    #[test]
    fn test_parse_malformed_metadata_is_none() {
        let content = "---\nname: demo\nmetadata:\n  moltbot: \"not a mapping\"\n---\nBody\n";
        let bundle = ParsedBundle::parse(content).unwrap();
        assert!(MoltbotMeta::from_parsed(&bundle.parsed).is_none());
    }

    #[test]
    fn test_embedding_text_truncates() {
        let bundle = ParsedBundle {
            parsed: ParsedSkillMd::default(),
            body: "x".repeat(20_000),
        };
        let text = build_embedding_text(&bundle, &[]);
        assert_eq!(text.chars().count(), 12_000);
    }
}
