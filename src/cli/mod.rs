mod commands;
mod config;
mod delete;
mod http_client;
mod install;
mod list;
mod lockfile;
mod login;
mod planner;
mod publish;
mod scan;
mod search;
mod sync;
mod update;

pub use commands::{Bump, Cli, Commands};
pub use http_client::ApiClient;

use std::path::PathBuf;

use clap::Parser;

use config::GlobalConfig;

pub const DEFAULT_REGISTRY: &str = "https://clawdhub.com";

/// Resolved CLI environment: global config merged with flags and env vars.
/// Passed explicitly to every command; there is no process-global state.
pub struct CliContext {
    pub workdir: PathBuf,
    pub install_dir: String,
    pub registry_url: String,
    pub site_url: String,
    pub token: Option<String>,
    pub no_input: bool,
    pub telemetry_disabled: bool,
}

impl CliContext {
    fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let config = config::load_config().unwrap_or_default();

        let registry_url = cli
            .registry
            .clone()
            .or_else(|| config.registry.clone())
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
        let site_url = cli.site.clone().unwrap_or_else(|| registry_url.clone());

        let workdir = match &cli.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let telemetry_disabled = std::env::var("CLAWDHUB_DISABLE_TELEMETRY")
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false);

        Ok(Self {
            workdir,
            install_dir: cli.dir.clone(),
            registry_url,
            site_url,
            token: config.token.clone(),
            no_input: cli.no_input,
            telemetry_disabled,
        })
    }

    /// Directory installed skills land in: `<workdir>/<dir>`.
    #[must_use]
    pub fn skills_dir(&self) -> PathBuf {
        self.workdir.join(&self.install_dir)
    }

    pub fn client(&self) -> anyhow::Result<ApiClient> {
        ApiClient::new(&self.registry_url, self.token.clone())
    }

    pub fn authenticated_client(&self) -> anyhow::Result<ApiClient> {
        if self.token.is_none() {
            anyhow::bail!("Not logged in. Run 'clawdhub login' first.");
        }
        self.client()
    }
}

/// CLI entry point; returns Err for exit code 1.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = CliContext::from_cli(&cli)?;

    match cli.command {
        Commands::Login { token } => login::run_login(&ctx, token).await,
        Commands::Logout => login::run_logout(&ctx),
        Commands::Whoami => login::run_whoami(&ctx).await,
        Commands::Search { query, limit } => search::run_search(&ctx, &query.join(" "), limit).await,
        Commands::Explore { limit } => search::run_explore(&ctx, limit).await,
        Commands::Install {
            slug,
            version,
            force,
        } => install::run_install(&ctx, &slug, version.as_deref(), force).await,
        Commands::Update {
            slug,
            all,
            version,
            force,
        } => update::run_update(&ctx, slug.as_deref(), all, version.as_deref(), force).await,
        Commands::List => list::run_list(&ctx),
        Commands::Publish {
            path,
            slug,
            name,
            version,
            changelog,
            tags,
            fork_of,
        } => {
            publish::run_publish(
                &ctx,
                &path,
                publish::PublishArgs {
                    slug,
                    name,
                    version,
                    changelog,
                    tags,
                    fork_of,
                },
            )
            .await
        }
        Commands::Sync {
            root,
            all,
            dry_run,
            bump,
            changelog,
            tags,
            concurrency,
        } => {
            sync::run_sync(
                &ctx,
                sync::SyncArgs {
                    roots: root,
                    all,
                    dry_run,
                    bump,
                    changelog,
                    tags,
                    concurrency,
                },
            )
            .await
        }
        Commands::Delete { slug, yes } => delete::run_delete(&ctx, &slug, yes).await,
        Commands::Undelete { slug, yes } => delete::run_undelete(&ctx, &slug, yes).await,
    }
}
