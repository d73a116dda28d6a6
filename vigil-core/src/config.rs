//! Configuration system for Vigil.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/vigil/config.toml` and/or `.vigil/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::feed::FeedConfig;
use crate::gateway::GatewayConfig;

/// Name of the workspace-level configuration directory.
pub const WORKSPACE_CONFIG_DIR: &str = ".vigil";
/// Prefix for environment overrides, e.g. `VIGIL_FEED__MAX_RETRIES=5`.
pub const ENV_PREFIX: &str = "VIGIL_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    pub feed: FeedConfig,
    pub gateway: GatewayConfig,
}

impl VigilConfig {
    /// Reject settings that would make the feed or gateway misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        let feed = &self.feed;
        if feed.server_url.trim().is_empty() {
            return invalid("feed.server_url must not be empty");
        }
        if !feed.server_url.starts_with("http://") && !feed.server_url.starts_with("https://") {
            return invalid("feed.server_url must start with http:// or https://");
        }
        if feed.threat_capacity == 0 {
            return invalid("feed.threat_capacity must be at least 1");
        }
        if feed.retry_base_delay_ms == 0 {
            return invalid("feed.retry_base_delay_ms must be positive");
        }
        if feed.poll_interval_ms == 0 {
            return invalid("feed.poll_interval_ms must be positive");
        }
        if feed.poll_threat_limit == 0 {
            return invalid("feed.poll_threat_limit must be at least 1");
        }

        let gw = &self.gateway;
        if gw.tick_interval_ms == 0 {
            return invalid("gateway.tick_interval_ms must be positive");
        }
        if gw.metrics_every_ticks == 0 {
            return invalid("gateway.metrics_every_ticks must be at least 1");
        }
        if gw.recent_capacity == 0 {
            return invalid("gateway.recent_capacity must be at least 1");
        }
        if gw.broadcast_capacity == 0 {
            return invalid("gateway.broadcast_capacity must be at least 1");
        }
        Ok(())
    }
}

fn user_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "vigil", "vigil")
}

/// Load configuration from all sources, merging in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `VIGIL_`)
/// 3. Workspace-local config (`.vigil/config.toml`)
/// 4. User config (`~/.config/vigil/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&VigilConfig>,
) -> Result<VigilConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(VigilConfig::default()));

    if let Some(dirs) = user_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG_DIR).join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // VIGIL_FEED__MODE, VIGIL_GATEWAY__PORT, etc.
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Path of the workspace configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Render a configuration as pretty TOML.
pub fn to_toml(config: &VigilConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write the default configuration to `.vigil/config.toml`.
///
/// Returns `Ok(None)` when a file already exists; it is never overwritten.
pub fn init_workspace_config(workspace: &Path) -> crate::error::Result<Option<PathBuf>> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Ok(None);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, to_toml(&VigilConfig::default())?)?;
    Ok(Some(path))
}
