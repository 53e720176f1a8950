use sha2::{Digest, Sha256};

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The bundle fingerprint: SHA-256 over the newline-joined `path:sha256`
/// lines, sorted by path. Depends only on the (path, sha256) pairs, so the
/// CLI and the server always agree on it.
pub fn bundle_fingerprint<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = entries.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let joined = pairs
        .iter()
        .map(|(path, sha)| format!("{path}:{sha}"))
        .collect::<Vec<_>>()
        .join("\n");

    sha256_hex(joined.as_bytes())
}

#[must_use]
pub fn is_hex64(s: &str) -> bool {
    s.len() == 64
        && s.chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = bundle_fingerprint([("SKILL.md", "aaa"), ("notes.md", "bbb")]);
        let b = bundle_fingerprint([("notes.md", "bbb"), ("SKILL.md", "aaa")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_depends_on_pairs_only() {
        let a = bundle_fingerprint([("SKILL.md", "aaa")]);
        let b = bundle_fingerprint([("SKILL.md", "aab")]);
        let c = bundle_fingerprint([("skill.md", "aaa")]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_matches_manual_computation() {
        let fp = bundle_fingerprint([("SKILL.md", "h1")]);
        assert_eq!(fp, sha256_hex(b"SKILL.md:h1"));

        let fp = bundle_fingerprint([("b.md", "h2"), ("a.md", "h1")]);
        assert_eq!(fp, sha256_hex(b"a.md:h1\nb.md:h2"));
    }

    #[test]
    fn test_is_hex64() {
        assert!(is_hex64(
            "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
        ));
        assert!(!is_hex64("abc"));
        assert!(!is_hex64(
            "A665A45920422F9D417E4867EFDC4FB8A04A1F3FFF1FA07E998E86F7F7A27AE3"
        ));
    }
}
