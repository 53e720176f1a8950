use super::CliContext;
use super::lockfile;

pub fn run_list(ctx: &CliContext) -> anyhow::Result<()> {
    let lock = lockfile::load_lockfile(&ctx.workdir)?;

    if lock.skills.is_empty() {
        println!("No skills installed under {}.", ctx.workdir.display());
        return Ok(());
    }

    for (slug, entry) in &lock.skills {
        let dir = ctx.skills_dir().join(slug);
        let origin = lockfile::read_origin(&dir);
        let registry = origin
            .as_ref()
            .map(|o| o.registry.as_str())
            .unwrap_or("unknown registry");
        let present = if dir.is_dir() { "" } else { " (missing on disk)" };
        println!(
            "{slug}@{} installed {} from {registry}{present}",
            entry.version,
            entry.installed_at.format("%Y-%m-%d"),
        );
    }

    Ok(())
}
