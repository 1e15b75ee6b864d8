use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default spector data directory: ~/.spector
pub fn get_spector_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".spector"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.spector/config.toml (highest)
    let spector_dir = get_spector_data_dir()?;
    let user_config = spector_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: AppConfig = if user_config.exists() {
        let s = std::fs::read_to_string(&user_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<AppConfig>(&s)?
    } else {
        AppConfig::default()
    };

    // Update logging directory to use spector data directory if not set
    if cfg
        .logging
        .directory
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        let logs_dir = spector_dir.join("logs");
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    if let Ok(v) = std::env::var("SPECTOR_MODEL_ENDPOINT") {
        if !v.trim().is_empty() {
            cfg.model.endpoint = v;
        }
    }
    if let Ok(v) = std::env::var("SPECTOR_MODEL_API_KEY") {
        if !v.trim().is_empty() {
            cfg.model.api_key = Some(v);
        }
    }
    if let Ok(v) = std::env::var("SPECTOR_POOL_SIZE") {
        if let Ok(n) = v.trim().parse::<usize>() {
            if n > 0 {
                cfg.scheduler.pool_size = n;
            }
        }
    }

    Ok(cfg)
}
