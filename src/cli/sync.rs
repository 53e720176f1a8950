use std::path::PathBuf;

use super::CliContext;
use super::commands::Bump;
use super::http_client::UploadFile;
use super::planner::{self, PlanItem, SkillStatus};
use super::scan::{self, LocalSkill};

pub struct SyncArgs {
    pub roots: Vec<PathBuf>,
    pub all: bool,
    pub dry_run: bool,
    pub bump: Bump,
    pub changelog: Option<String>,
    pub tags: Option<String>,
    pub concurrency: usize,
}

pub async fn run_sync(ctx: &CliContext, args: SyncArgs) -> anyhow::Result<()> {
    let client = ctx.client()?;

    let roots = scan::discover_roots(&args.roots, &ctx.workdir, &ctx.install_dir);
    if roots.is_empty() {
        anyhow::bail!(
            "No skill roots found. Create {} or pass --root <dir>.",
            ctx.skills_dir().display()
        );
    }

    let (folders, skipped) = scan::scan_roots(&roots);
    if folders.is_empty() {
        anyhow::bail!(
            "No skill folders found under {} root(s). A skill folder contains a SKILL.md file.",
            roots.len()
        );
    }
    for dup in &skipped {
        println!(
            "  skipping duplicate slug '{}' at {}",
            dup.slug,
            dup.dir.display()
        );
    }

    let mut skills: Vec<LocalSkill> = Vec::new();
    for folder in folders {
        match scan::hash_skill_dir(&folder.slug, &folder.dir) {
            Ok(skill) => skills.push(skill),
            Err(e) => println!("  skipping {}: {e}", folder.dir.display()),
        }
    }

    let plan = planner::classify(&client, skills, args.concurrency).await?;

    let synced: Vec<&PlanItem> = plan.iter().filter(|i| !i.is_actionable()).collect();
    let actionable: Vec<&PlanItem> = plan.iter().filter(|i| i.is_actionable()).collect();

    if !synced.is_empty() {
        println!("{} skill(s) already in sync:", synced.len());
        for item in &synced {
            if let SkillStatus::Synced { version } = &item.status {
                println!("  = {}@{version}", item.skill.slug);
            }
        }
    }

    if !actionable.is_empty() {
        println!("{} actionable skill(s):", actionable.len());
        for item in &actionable {
            println!("  {}", describe(item, args.bump));
        }
    }

    if args.dry_run {
        println!();
        println!("Dry run - nothing was published.");
        return Ok(());
    }

    if actionable.is_empty() {
        println!("Everything is in sync.");
        return Ok(());
    }

    let selected = select_items(ctx, &args, &actionable)?;
    if selected.is_empty() {
        println!("Nothing selected.");
        return Ok(());
    }

    // Publishing requires a token; classification above did not.
    let client = ctx.authenticated_client()?;
    let tags = parse_tags(args.tags.as_deref());

    let mut failures = 0usize;
    for item in selected {
        let version = item.next_version(args.bump)?;
        let changelog = resolve_changelog(ctx, &args, &item.skill)?;

        println!("Publishing {}@{version}...", item.skill.slug);

        let mut files = Vec::with_capacity(item.skill.files.len());
        for file in &item.skill.files {
            println!("  uploading {} ({} bytes)", file.path, file.size);
            files.push(UploadFile {
                path: file.path.clone(),
                bytes: std::fs::read(&file.abs_path)?,
                content_type: file.content_type.clone(),
            });
        }

        let payload = serde_json::json!({
            "slug": item.skill.slug,
            "displayName": item.skill.display_name.clone().unwrap_or_else(|| item.skill.slug.clone()),
            "version": version,
            "changelog": changelog,
            "tags": tags,
            "source": "sync",
        });

        match client.publish(&payload, files).await {
            Ok(result) => println!("  published {}@{}", result.slug, result.version),
            Err(e) => {
                println!("  failed to publish {}: {e}", item.skill.slug);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} skill(s) failed to publish");
    }
    Ok(())
}

fn describe(item: &PlanItem, bump: Bump) -> String {
    match &item.status {
        SkillStatus::New => format!("+ {}@1.0.0 (new)", item.skill.slug),
        SkillStatus::Update { latest } => {
            let next = item
                .next_version(bump)
                .unwrap_or_else(|_| "?".to_string());
            format!("~ {}@{next} (update from {latest})", item.skill.slug)
        }
        SkillStatus::Synced { version } => format!("= {}@{version} (synced)", item.skill.slug),
    }
}

/// Interactive multi-select preselecting every actionable item; `--all` and
/// `--no-input` select everything.
fn select_items<'a>(
    ctx: &CliContext,
    args: &SyncArgs,
    actionable: &[&'a PlanItem],
) -> anyhow::Result<Vec<&'a PlanItem>> {
    if args.all || ctx.no_input {
        return Ok(actionable.to_vec());
    }

    let labels: Vec<String> = actionable
        .iter()
        .map(|item| describe(item, args.bump))
        .collect();
    let preselected: Vec<usize> = (0..labels.len()).collect();

    let chosen = inquire::MultiSelect::new("Select skills to publish:", labels.clone())
        .with_default(&preselected)
        .prompt()?;

    Ok(actionable
        .iter()
        .enumerate()
        .filter(|(i, _)| chosen.contains(&labels[*i]))
        .map(|(_, item)| *item)
        .collect())
}

fn resolve_changelog(
    ctx: &CliContext,
    args: &SyncArgs,
    skill: &LocalSkill,
) -> anyhow::Result<String> {
    if let Some(text) = &args.changelog {
        return Ok(text.clone());
    }
    if ctx.no_input || args.all {
        return Ok(String::new());
    }
    let text = inquire::Text::new(&format!("Changelog for {} (empty to auto-generate):", skill.slug))
        .prompt()
        .unwrap_or_default();
    Ok(text)
}

fn parse_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags(Some("a,b, c")), vec!["a", "b", "c"]);
        assert_eq!(parse_tags(Some("")), Vec::<String>::new());
        assert_eq!(parse_tags(None), Vec::<String>::new());
    }
}
