use super::CliContext;

pub async fn run_delete(ctx: &CliContext, slug: &str, yes: bool) -> anyhow::Result<()> {
    if !confirm(ctx, yes, &format!("Soft-delete '{slug}' from the registry?"))? {
        println!("Aborted.");
        return Ok(());
    }

    let client = ctx.authenticated_client()?;
    let _: serde_json::Value = client.delete(&format!("/skills/{slug}")).await?;
    println!("Deleted {slug}. Restore with 'clawdhub undelete {slug}'.");
    Ok(())
}

pub async fn run_undelete(ctx: &CliContext, slug: &str, yes: bool) -> anyhow::Result<()> {
    if !confirm(ctx, yes, &format!("Restore '{slug}' on the registry?"))? {
        println!("Aborted.");
        return Ok(());
    }

    let client = ctx.authenticated_client()?;
    let _: serde_json::Value = client
        .post(&format!("/skills/{slug}/undelete"), &serde_json::json!({}))
        .await?;
    println!("Restored {slug}.");
    Ok(())
}

fn confirm(ctx: &CliContext, yes: bool, prompt: &str) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    if ctx.no_input {
        anyhow::bail!("pass --yes when running with --no-input");
    }
    Ok(inquire::Confirm::new(prompt)
        .with_default(false)
        .prompt()?)
}
