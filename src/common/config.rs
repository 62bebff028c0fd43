//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config < enviroment < CLI
use anyhow::{ensure, Context, Result};
use directories::{ProjectDirs, UserDirs};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
const MAX_SHUTDOWN_GRACE_SECS: u64 = 300;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "lanshare")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("lanshare.toml"))
}

/// Fallback receiving folder: the user's download dir, then `~/Downloads`, then temp.
pub fn default_receiving_folder() -> PathBuf {
    if let Some(dirs) = UserDirs::new() {
        if let Some(download) = dirs.download_dir() {
            return download.to_path_buf();
        }
        return dirs.home_dir().join("Downloads");
    }
    std::env::temp_dir()
}

/// What to do when the suggested destination of an accepted file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Append ` (N)` before the extension.
    #[default]
    Suffix,
    Overwrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub shutdown_grace_secs: u64,
    pub max_upload_mb: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            shutdown_grace_secs: 5,
            max_upload_mb: 4096,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    pub collision: CollisionPolicy,
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub receive: ReceiveSettings,
}

impl AppConfig {
    /// Socket address the HTTP server binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .with_context(|| format!("Invalid server.host '{}'", self.server.host))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.server.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    /// Configured receiving folder, or the platform default when unset.
    pub fn receiving_folder(&self) -> PathBuf {
        self.receive
            .folder
            .clone()
            .unwrap_or_else(default_receiving_folder)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        ensure!(
            self.server.max_upload_mb > 0,
            "Invalid config: server.max_upload_mb must be > 0"
        );
        ensure!(
            self.server.shutdown_grace_secs > 0,
            "Invalid config: server.shutdown_grace_secs must be > 0"
        );
        ensure!(
            self.server.shutdown_grace_secs <= MAX_SHUTDOWN_GRACE_SECS,
            "Invalid config: server.shutdown_grace_secs must be <= {MAX_SHUTDOWN_GRACE_SECS}"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_dir: Option<PathBuf>,
}

/// Loads config from defaults/file/env.
pub fn load_config() -> Result<AppConfig> {
    let path = config_path();

    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("LANSHARE_").split("__"))
        .extract()
        .context("Failed to load configuration")?;

    config.validate()?;

    Ok(config)
}

/// Applies runtime overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(host) = &overrides.host {
        config.server.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(dir) = &overrides.receive_dir {
        config.receive.folder = Some(dir.clone());
    }

    config
}
