use chrono::Utc;
use semver::Version;

use super::CliContext;
use super::install::{extract_zip, machine_id};
use super::lockfile::{self, LockEntry, ORIGIN_FORMAT_VERSION, OriginMarker};
use super::scan;

pub async fn run_update(
    ctx: &CliContext,
    slug: Option<&str>,
    all: bool,
    version: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let lock = lockfile::load_lockfile(&ctx.workdir)?;

    let targets: Vec<String> = match (slug, all) {
        (Some(slug), _) => vec![slug.to_string()],
        (None, true) => lock.skills.keys().cloned().collect(),
        (None, false) => anyhow::bail!("specify a slug or pass --all"),
    };
    if targets.is_empty() {
        println!("Nothing installed. Run 'clawdhub install <slug>' first.");
        return Ok(());
    }

    let client = ctx.client()?;
    let mut failures = 0usize;

    for slug in targets {
        if let Err(e) = update_one(ctx, &client, &slug, version, force).await {
            println!("  {slug}: {e}");
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} skill(s) failed to update");
    }
    Ok(())
}

async fn update_one(
    ctx: &CliContext,
    client: &super::ApiClient,
    slug: &str,
    version: Option<&str>,
    force: bool,
) -> anyhow::Result<()> {
    let dir = ctx.skills_dir().join(slug);
    if !dir.is_dir() {
        anyhow::bail!("not installed at {}", dir.display());
    }

    let detail = client
        .get_skill(slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no longer on the registry"))?;
    let latest = detail
        .latest_version
        .map(|v| v.version)
        .ok_or_else(|| anyhow::anyhow!("has no published versions"))?;
    let target = version.unwrap_or(&latest).to_string();

    // Compare the installed contents against published versions before
    // overwriting anything.
    let local = scan::hash_skill_dir(slug, &dir)?;
    let resolved = client.resolve(slug, &local.fingerprint).await?;

    match resolved.matched {
        Some(matched) => {
            let local_version = Version::parse(&matched.version).ok();
            let target_version = Version::parse(&target).ok();
            if let (Some(local_v), Some(target_v)) = (local_version, target_version) {
                if local_v >= target_v {
                    println!("  {slug}@{} is up to date", matched.version);
                    return Ok(());
                }
            }
        }
        None => {
            // Local contents match no published version: modified by hand.
            let proceed = force
                || (!ctx.no_input
                    && inquire::Confirm::new(&format!(
                        "{slug} has local changes that would be overwritten. Continue?"
                    ))
                    .with_default(false)
                    .prompt()
                    .unwrap_or(false));
            if !proceed {
                anyhow::bail!("local changes present; pass --force to overwrite");
            }
        }
    }

    let bytes = client.download_zip(slug, &target).await?;
    extract_zip(&bytes, &dir)?;

    lockfile::write_origin(
        &dir,
        &OriginMarker {
            version: ORIGIN_FORMAT_VERSION,
            registry: ctx.registry_url.clone(),
            slug: slug.to_string(),
            installed_version: target.clone(),
            installed_at: Utc::now(),
        },
    )?;

    let mut lock = lockfile::load_lockfile(&ctx.workdir)?;
    lock.skills.insert(
        slug.to_string(),
        LockEntry {
            version: target.clone(),
            installed_at: Utc::now(),
        },
    );
    lockfile::save_lockfile(&ctx.workdir, &lock)?;

    if !ctx.telemetry_disabled && ctx.token.is_some() {
        if let Err(e) = client
            .report_install(slug, &target, &machine_id(), "installed")
            .await
        {
            tracing::debug!("install report failed: {e}");
        }
    }

    println!("  updated {slug} to {target}");
    Ok(())
}
