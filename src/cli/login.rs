use super::CliContext;
use super::config::{self, GlobalConfig};
use super::http_client::ApiClient;

pub async fn run_login(ctx: &CliContext, token: Option<String>) -> anyhow::Result<()> {
    let token = match token {
        Some(token) => token,
        None => {
            if ctx.no_input {
                anyhow::bail!("pass --token when running with --no-input");
            }
            println!("Create a token at {}/settings/tokens", ctx.site_url);
            inquire::Password::new("Token:")
                .without_confirmation()
                .prompt()?
        }
    };

    // Verify before saving anything.
    let client = ApiClient::new(&ctx.registry_url, Some(token.clone()))?;
    let whoami = client.whoami().await.map_err(|e| {
        anyhow::anyhow!("token rejected by {}: {e}", ctx.registry_url)
    })?;

    config::save_config(&GlobalConfig {
        registry: Some(ctx.registry_url.clone()),
        token: Some(token),
    })?;

    let handle = whoami.user.handle.as_deref().unwrap_or("(no handle)");
    println!("Logged in to {} as {handle}", ctx.registry_url);
    Ok(())
}

pub fn run_logout(ctx: &CliContext) -> anyhow::Result<()> {
    let mut config = config::load_config().unwrap_or_default();
    if config.token.take().is_none() {
        println!("Not logged in.");
        return Ok(());
    }
    config::save_config(&config)?;
    println!("Logged out of {}.", ctx.registry_url);
    Ok(())
}

pub async fn run_whoami(ctx: &CliContext) -> anyhow::Result<()> {
    let client = ctx.authenticated_client()?;
    let whoami = client.whoami().await?;
    let handle = whoami.user.handle.as_deref().unwrap_or("(no handle)");
    match whoami.user.display_name.as_deref() {
        Some(name) => println!("{handle} ({name})"),
        None => println!("{handle}"),
    }
    Ok(())
}
