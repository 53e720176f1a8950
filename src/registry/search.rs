use std::collections::BTreeSet;

use super::Registry;
use crate::error::Result;
use crate::store::VECTOR_INDEX_MAX_RESULTS;
use crate::types::{BadgeKind, Skill, SkillVersion, Visibility};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub highlighted_only: bool,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_SEARCH_LIMIT,
            highlighted_only: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub skill: Skill,
    pub version: SkillVersion,
    pub owner_handle: Option<String>,
    pub badges: Vec<BadgeKind>,
}

/// Lowercase alphanumeric runs of length >= 2; everything else is a stop
/// character.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// Whole-word gate: every query token must appear as a token of the hit's
/// display name, slug, or summary.
fn matches_all_tokens(query_tokens: &[String], skill: &Skill) -> bool {
    let haystack = format!(
        "{} {} {}",
        skill.display_name,
        skill.slug,
        skill.summary.as_deref().unwrap_or("")
    );
    let words: BTreeSet<String> = tokenize(&haystack).into_iter().collect();
    query_tokens.iter().all(|t| words.contains(t))
}

impl Registry {
    /// Hybrid search: vector-nearest-neighbour recall filtered by embedding
    /// visibility, then gated on exact token overlap. Search is best-effort;
    /// a failing embedding provider yields an empty result, not an error.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let query = request.query.trim();
        let limit = request.limit.clamp(1, MAX_SEARCH_LIMIT);

        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("search embedding failed, returning empty results: {e}");
                return Ok(Vec::new());
            }
        };

        let initial = (limit * 3).max(50).clamp(1, VECTOR_INDEX_MAX_RESULTS);
        let max_candidates = (limit * 10).max(200).clamp(1, VECTOR_INDEX_MAX_RESULTS);
        let mut candidate_limit = initial;

        loop {
            let hits =
                self.store
                    .embedding_top_k(&query_vector, Visibility::SEARCHABLE, candidate_limit)?;
            let exhausted = hits.len() < candidate_limit;

            let mut qualifying = Vec::new();
            for hit in &hits {
                let Some(skill) = self.store.get_skill(&hit.skill_id)? else {
                    continue;
                };
                if skill.is_soft_deleted() {
                    continue;
                }
                let Some(version) = self.store.get_version(&hit.version_id)? else {
                    continue;
                };

                let badges: Vec<BadgeKind> = self
                    .store
                    .list_badges(&skill.id)?
                    .into_iter()
                    .map(|b| b.kind)
                    .collect();

                if request.highlighted_only && !badges.contains(&BadgeKind::Highlighted) {
                    continue;
                }
                if !matches_all_tokens(&tokens, &skill) {
                    continue;
                }

                let owner_handle = self
                    .store
                    .get_user(&skill.owner_user_id)?
                    .and_then(|u| u.handle);

                qualifying.push(SearchHit {
                    score: hit.score,
                    skill,
                    version,
                    owner_handle,
                    badges,
                });
            }

            if qualifying.len() >= limit || exhausted || candidate_limit >= max_candidates {
                qualifying.truncate(limit);
                return Ok(qualifying);
            }

            candidate_limit = (candidate_limit * 2).min(max_candidates);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::{ModerationStatus, SkillStats};

    fn skill(display_name: &str, slug: &str, summary: &str) -> Skill {
        let now = Utc::now();
        Skill {
            id: "s1".into(),
            slug: slug.into(),
            display_name: display_name.into(),
            summary: Some(summary.into()),
            owner_user_id: "u1".into(),
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
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Google Workspace CLI"), vec!["google", "workspace", "cli"]);
        assert_eq!(tokenize("gif-encoder v2"), vec!["gif", "encoder", "v2"]);
        assert_eq!(tokenize("a ! ?"), Vec::<String>::new());
        assert_eq!(tokenize(""), Vec::<String>::new());
    }

    #[test]
    fn test_whole_word_gate() {
        let gif = skill("GIF Encoder", "gif-encoder", "Animated GIF encoder");
        let gog = skill("gogkit", "gogkit", "Google Workspace CLI");

        let tokens = tokenize("gif");
        assert!(matches_all_tokens(&tokens, &gif));
        assert!(!matches_all_tokens(&tokens, &gog));
    }

    #[test]
    fn test_all_tokens_required() {
        let s = skill("Demo", "demo", "A demo skill");
        assert!(matches_all_tokens(&tokenize("demo skill"), &s));
        assert!(!matches_all_tokens(&tokenize("demo missing"), &s));
    }

    #[test]
    fn test_candidate_limits() {
        // limit=10: start at max(30,50)=50, cap at max(100,200)=200.
        let limit = 10usize;
        assert_eq!((limit * 3).max(50).clamp(1, 256), 50);
        assert_eq!((limit * 10).max(200).clamp(1, 256), 200);

        // limit=50: start at 150, cap at the vector index's 256.
        let limit = 50usize;
        assert_eq!((limit * 3).max(50).clamp(1, 256), 150);
        assert_eq!((limit * 10).max(200).clamp(1, 256), 256);
    }
}
