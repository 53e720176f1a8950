use std::fs;
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use clawdhub::auth::TokenGenerator;
use clawdhub::blob::BlobStore;
use clawdhub::config::ServerConfig;
use clawdhub::registry::{
    EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider, Registry,
};
use clawdhub::server::{AppState, create_router};
use clawdhub::store::{SqliteStore, Store};
use clawdhub::types::{ApiToken, Role, User};

fn create_token(
    generator: &TokenGenerator,
    user_id: String,
    label: &str,
) -> anyhow::Result<(ApiToken, String)> {
    let (raw_token, lookup, hash) = generator.generate()?;
    let token = ApiToken {
        id: Uuid::new_v4().to_string(),
        token_hash: hash,
        token_lookup: lookup,
        user_id,
        label: Some(label.to_string()),
        created_at: Utc::now(),
        revoked_at: None,
        last_used_at: None,
    };
    Ok((token, raw_token))
}

fn create_user(handle: &str, role: Role) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4().to_string(),
        handle: Some(handle.to_string()),
        display_name: None,
        image: None,
        role,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "clawdhubd")]
#[command(about = "Skill bundle registry server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for database and stored bundle files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Public base URL for external access (e.g., "https://hub.example.com")
        #[arg(long)]
        public_base_url: Option<String>,

        /// OpenAI-compatible embeddings endpoint; the built-in hash embedder
        /// is used when unset
        #[arg(long, env = "CLAWDHUB_EMBEDDINGS_URL")]
        embeddings_url: Option<String>,

        /// API key for the embeddings endpoint
        #[arg(long, env = "CLAWDHUB_EMBEDDINGS_API_KEY", hide_env_values = true)]
        embeddings_api_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin user + token)
    Init {
        /// Data directory for database and stored bundle files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },
}

fn run_init(data_dir: String, non_interactive: bool) -> anyhow::Result<()> {
    let data_path: std::path::PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;

    let db_path = data_path.join("clawdhub.db");
    let store = SqliteStore::new(&db_path)?;
    store.initialize()?;

    let token_file = data_path.join(".admin_token");

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let admin = create_user("admin", Role::Admin);
    store.create_user(&admin)?;

    let generator = TokenGenerator::new();
    let (token, raw_token) = create_token(&generator, admin.id, "bootstrap admin")?;

    store.create_token(&token)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    if !non_interactive {
        create_default_user_prompt(&store, &generator)?;
    }

    Ok(())
}

fn create_default_user_prompt(store: &SqliteStore, generator: &TokenGenerator) -> anyhow::Result<()> {
    let create = inquire::Confirm::new("Would you like to create a default user?")
        .with_default(false)
        .prompt()?;

    if !create {
        return Ok(());
    }

    let handle = inquire::Text::new("Handle:")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Err("Handle cannot be empty".into())
            } else if input.contains(char::is_whitespace) {
                Err("Handle cannot contain whitespace".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let user = create_user(&handle, Role::User);
    store.create_user(&user)?;

    let (user_token, raw_token) = create_token(generator, user.id, "initial token")?;
    store.create_token(&user_token)?;

    println!();
    println!("========================================");
    println!("Created user '{handle}' with token:");
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("clawdhub=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => {
                run_init(data_dir, non_interactive)?;
            }
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            public_base_url,
            embeddings_url,
            embeddings_api_key,
        } => {
            let config = ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
                public_base_url,
                embeddings_url,
                embeddings_api_key,
            };

            let token_file = config.data_dir.join(".admin_token");
            if !token_file.exists() {
                bail!(
                    "Server not initialized. Run 'clawdhubd admin init' first to create the database and admin token."
                );
            }

            let store = SqliteStore::new(config.db_path())?;
            if !store.has_admin_token()? {
                bail!(
                    "Server not initialized. Run 'clawdhubd admin init' first to create the database and admin token."
                );
            }

            let embedder: Arc<dyn EmbeddingProvider> = match &config.embeddings_url {
                Some(url) => {
                    info!("Using embeddings endpoint at {url}");
                    Arc::new(HttpEmbeddingProvider::new(
                        url.clone(),
                        config.embeddings_api_key.clone(),
                    ))
                }
                None => {
                    info!("No embeddings endpoint configured; using the local hash embedder");
                    Arc::new(HashEmbeddingProvider::default())
                }
            };

            let store: Arc<dyn Store> = Arc::new(store);
            let blobs = Arc::new(BlobStore::new(&config.data_dir));
            let registry = Registry::new(store.clone(), blobs.clone(), embedder, None);
            let state = Arc::new(AppState::new(store, blobs, registry));

            let app = create_router(state);
            let addr = config.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
