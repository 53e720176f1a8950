use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "clawdhub")]
#[command(about = "Sync and install skill bundles from a ClawdHub registry", long_about = None)]
pub struct Cli {
    /// Working directory (defaults to the current directory)
    #[arg(long, global = true, env = "CLAWDHUB_WORKDIR")]
    pub workdir: Option<PathBuf>,

    /// Install directory under the workdir
    #[arg(long, global = true, default_value = "skills")]
    pub dir: String,

    /// Web site base URL
    #[arg(long, global = true, env = "CLAWDHUB_SITE")]
    pub site: Option<String>,

    /// Registry API base URL
    #[arg(long, global = true, env = "CLAWDHUB_REGISTRY")]
    pub registry: Option<String>,

    /// Never prompt; fail instead of asking
    #[arg(long, global = true)]
    pub no_input: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Bump {
    Patch,
    Minor,
    Major,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save a registry token for authenticated commands
    Login {
        /// Token to save; prompts when omitted
        #[arg(long)]
        token: Option<String>,
    },

    /// Forget the saved registry token
    Logout,

    /// Show the authenticated user
    Whoami,

    /// Search the registry
    Search {
        /// Query terms
        #[arg(required = true)]
        query: Vec<String>,

        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Browse trending skills
    Explore {
        /// Maximum results (1-50)
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Install a skill into the workdir
    Install {
        slug: String,

        /// Specific version (defaults to latest)
        #[arg(long)]
        version: Option<String>,

        /// Overwrite local changes without asking
        #[arg(long)]
        force: bool,
    },

    /// Update installed skills to their latest versions
    Update {
        /// Skill to update (all installed when omitted with --all)
        slug: Option<String>,

        /// Update every installed skill
        #[arg(long)]
        all: bool,

        /// Target version (defaults to latest)
        #[arg(long)]
        version: Option<String>,

        /// Overwrite local changes without asking
        #[arg(long)]
        force: bool,
    },

    /// List installed skills
    List,

    /// Publish a single skill folder
    Publish {
        /// Path to the skill folder
        path: PathBuf,

        /// Slug (defaults to the folder name)
        #[arg(long)]
        slug: Option<String>,

        /// Display name (defaults to the frontmatter name)
        #[arg(long)]
        name: Option<String>,

        /// Version (defaults to 1.0.0 for new skills, patch bump otherwise)
        #[arg(long)]
        version: Option<String>,

        /// Changelog text (the server auto-generates when omitted)
        #[arg(long)]
        changelog: Option<String>,

        /// Comma-separated extra tags
        #[arg(long)]
        tags: Option<String>,

        /// Mark as a fork of another skill: slug or slug@version
        #[arg(long)]
        fork_of: Option<String>,
    },

    /// Discover local skill folders and publish what changed
    Sync {
        /// Extra roots to scan
        #[arg(long)]
        root: Vec<PathBuf>,

        /// Select every actionable item without prompting
        #[arg(long)]
        all: bool,

        /// Print the plan and exit without publishing
        #[arg(long)]
        dry_run: bool,

        /// Version bump for updated skills
        #[arg(long, value_enum, default_value = "patch")]
        bump: Bump,

        /// Changelog text applied to every published skill
        #[arg(long)]
        changelog: Option<String>,

        /// Comma-separated extra tags applied to every published skill
        #[arg(long)]
        tags: Option<String>,

        /// Parallel registry requests (1-32)
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// Soft-delete a skill you own
    Delete {
        slug: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Restore a soft-deleted skill you own
    Undelete {
        slug: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
