use chrono::Utc;
use uuid::Uuid;

use super::Registry;
use crate::error::{Error, Result};
use crate::store::EmbeddingFlagUpdate;
use crate::types::*;

impl Registry {
    /// Moves tags. Owner or moderator only. Retargeting `latest` also moves
    /// `latest_version_id` and recomputes every embedding's latest flag.
    pub fn update_tags(
        &self,
        actor: &User,
        skill_id: &str,
        entries: &[(String, String)],
    ) -> Result<Skill> {
        let mut skill = self.require_skill(skill_id)?;
        if skill.owner_user_id != actor.id && !actor.role.is_moderator() {
            return Err(Error::Forbidden);
        }

        for (tag, version_id) in entries {
            let version = self
                .store
                .get_version(version_id)?
                .filter(|v| v.skill_id == skill.id)
                .ok_or_else(|| {
                    Error::Validation(format!("version {version_id} does not belong to skill"))
                })?;

            skill.tags.insert(tag.clone(), version.id.clone());

            if tag == "latest" {
                skill.latest_version_id = Some(version.id.clone());
                self.recompute_latest_flags(&skill, &version.id)?;
            }
        }

        skill.updated_at = Utc::now();
        self.store.update_skill(&skill)?;

        self.audit(
            actor,
            "skill.tags.update",
            "skill",
            &skill.id,
            serde_json::json!({ "tags": entries.iter().map(|(t, _)| t).collect::<Vec<_>>() }),
        )?;

        Ok(skill)
    }

    /// Marks a skill as a duplicate of another (or clears the marker).
    /// Moderator only; refuses self-reference.
    pub fn set_duplicate(
        &self,
        actor: &User,
        skill_id: &str,
        canonical_slug: Option<&str>,
    ) -> Result<Skill> {
        if !actor.role.is_moderator() {
            return Err(Error::Forbidden);
        }
        let mut skill = self.require_skill(skill_id)?;

        match canonical_slug {
            None => {
                skill.canonical_skill_id = None;
                skill.fork_of = None;
            }
            Some(slug) => {
                let canonical = self
                    .store
                    .get_skill_by_slug(slug)?
                    .filter(|s| !s.is_soft_deleted())
                    .ok_or(Error::NotFound)?;
                if canonical.id == skill.id {
                    return Err(Error::Validation(
                        "a skill cannot be its own canonical".into(),
                    ));
                }
                let upstream_version = match &canonical.latest_version_id {
                    Some(id) => self.store.get_version(id)?.map(|v| v.version),
                    None => None,
                };
                skill.canonical_skill_id = Some(canonical.id.clone());
                skill.fork_of = Some(ForkOf {
                    skill_id: canonical.id,
                    kind: ForkKind::Duplicate,
                    version: upstream_version,
                });
            }
        }

        skill.updated_at = Utc::now();
        self.store.update_skill(&skill)?;

        self.audit(
            actor,
            "skill.duplicate.set",
            "skill",
            &skill.id,
            serde_json::json!({ "canonical": canonical_slug }),
        )?;

        Ok(skill)
    }

    /// Transfers ownership. Admin only; every embedding follows.
    pub fn change_owner(&self, actor: &User, skill_id: &str, new_owner_id: &str) -> Result<Skill> {
        if actor.role != Role::Admin {
            return Err(Error::Forbidden);
        }
        let mut skill = self.require_skill(skill_id)?;

        let new_owner = self
            .store
            .get_user(new_owner_id)?
            .filter(|u| u.deleted_at.is_none())
            .ok_or(Error::NotFound)?;

        skill.owner_user_id = new_owner.id.clone();
        skill.updated_at = Utc::now();
        self.store.update_skill(&skill)?;
        self.store.update_embeddings_owner(&skill.id, &new_owner.id)?;

        self.audit(
            actor,
            "skill.owner.change",
            "skill",
            &skill.id,
            serde_json::json!({ "newOwner": new_owner.id }),
        )?;

        Ok(skill)
    }

    /// Hides or restores a skill. Owner or moderator. Hiding flips every
    /// embedding to `deleted`; restoring recomputes from the flag pairs.
    pub fn set_soft_deleted(&self, actor: &User, skill_id: &str, deleted: bool) -> Result<Skill> {
        let mut skill = self.require_skill(skill_id)?;
        if skill.owner_user_id != actor.id && !actor.role.is_moderator() {
            return Err(Error::Forbidden);
        }

        skill.soft_deleted_at = if deleted { Some(Utc::now()) } else { None };
        skill.updated_at = Utc::now();
        self.store.update_skill(&skill)?;

        for emb in self.store.list_skill_embeddings(&skill.id)? {
            self.store.update_embedding_flags(&EmbeddingFlagUpdate {
                id: emb.id,
                is_latest: emb.is_latest,
                is_approved: emb.is_approved,
                visibility: Visibility::compute(emb.is_latest, emb.is_approved, deleted),
            })?;
        }

        self.audit(
            actor,
            if deleted {
                "skill.softDelete"
            } else {
                "skill.undelete"
            },
            "skill",
            &skill.id,
            serde_json::json!({}),
        )?;

        Ok(skill)
    }

    /// Permanently removes a skill and everything hanging off it. Admin only.
    pub fn hard_delete(&self, actor: &User, skill_id: &str) -> Result<()> {
        if actor.role != Role::Admin {
            return Err(Error::Forbidden);
        }
        let skill = self.require_skill(skill_id)?;

        self.store.hard_delete_skill(&skill.id)?;

        self.audit(
            actor,
            "skill.hardDelete",
            "skill",
            &skill.id,
            serde_json::json!({ "slug": skill.slug }),
        )?;

        Ok(())
    }

    /// Grants or removes a badge. `highlighted` takes a moderator; the rest
    /// take an admin. Toggling `redactionApproved` recomputes every
    /// embedding's approval flag and visibility.
    pub fn set_badge(&self, actor: &User, skill_id: &str, kind: BadgeKind, on: bool) -> Result<()> {
        let allowed = match kind {
            BadgeKind::Highlighted => actor.role.is_moderator(),
            BadgeKind::Official | BadgeKind::Deprecated | BadgeKind::RedactionApproved => {
                actor.role == Role::Admin
            }
        };
        if !allowed {
            return Err(Error::Forbidden);
        }

        let skill = self.require_skill(skill_id)?;

        if on {
            self.store.upsert_badge(&SkillBadge {
                skill_id: skill.id.clone(),
                kind,
                by_user_id: actor.id.clone(),
                at: Utc::now(),
            })?;
        } else {
            self.store.delete_badge(&skill.id, kind)?;
        }

        if kind == BadgeKind::RedactionApproved {
            let soft_deleted = skill.is_soft_deleted();
            for emb in self.store.list_skill_embeddings(&skill.id)? {
                self.store.update_embedding_flags(&EmbeddingFlagUpdate {
                    id: emb.id,
                    is_latest: emb.is_latest,
                    is_approved: on,
                    visibility: Visibility::compute(emb.is_latest, on, soft_deleted),
                })?;
            }
        }

        self.audit(
            actor,
            "skill.badge.set",
            "skill",
            &skill.id,
            serde_json::json!({ "kind": kind.as_str(), "on": on }),
        )?;

        Ok(())
    }

    fn require_skill(&self, skill_id: &str) -> Result<Skill> {
        self.store.get_skill(skill_id)?.ok_or(Error::NotFound)
    }

    fn recompute_latest_flags(&self, skill: &Skill, latest_version_id: &str) -> Result<()> {
        let soft_deleted = skill.is_soft_deleted();
        for emb in self.store.list_skill_embeddings(&skill.id)? {
            let is_latest = emb.version_id == latest_version_id;
            self.store.update_embedding_flags(&EmbeddingFlagUpdate {
                id: emb.id,
                is_latest,
                is_approved: emb.is_approved,
                visibility: Visibility::compute(is_latest, emb.is_approved, soft_deleted),
            })?;
        }
        Ok(())
    }

    fn audit(
        &self,
        actor: &User,
        action: &str,
        target_type: &str,
        target_id: &str,
        metadata: serde_json::Value,
    ) -> Result<()> {
        self.store.append_audit(&AuditLogEntry {
            id: Uuid::new_v4().to_string(),
            actor_user_id: actor.id.clone(),
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            metadata,
            created_at: Utc::now(),
        })
    }
}
