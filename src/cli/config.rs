use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Global CLI config, persisted at a platform-specific path (overridable via
/// `CLAWDHUB_CONFIG_PATH`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub registry: Option<String>,
    pub token: Option<String>,
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CLAWDHUB_CONFIG_PATH") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let dirs = ProjectDirs::from("", "", "clawdhub")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory. Is $HOME set?"))?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config() -> anyhow::Result<GlobalConfig> {
    let path = config_path()?;
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => return Ok(GlobalConfig::default()),
    };
    toml::from_str(&content).map_err(|e| anyhow::anyhow!("corrupted config at {}: {e}", path.display()))
}

pub fn save_config(config: &GlobalConfig) -> anyhow::Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
