use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub services: ServicesConfig,
    pub store: StoreConfig,
    pub meter: MeterConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
}

/// Unit names of the stream processes handed to the service supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub spotify_stream: String,
    pub linein_stream: String,
    /// Talk to the per-user systemd instance (`systemctl --user`).
    pub user: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Overrides the default key-value store location.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub program: String,
    /// Argument template. `{device}`, `{rate}` and `{channels}` are substituted.
    pub args: Vec<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_bytes: usize,
    /// RMS amplitude that maps to a full-scale reading of 100.
    pub full_scale_rms: f64,
    pub stop_grace_ms: u64,
    pub stall_ms: u64,
    /// Capture device the meter follows while Spotify is the active source.
    pub spotify_device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub list_program: String,
    pub list_args: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            spotify_stream: "spotify-stream.service".to_string(),
            linein_stream: "linein-stream.service".to_string(),
            user: false,
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            program: "arecord".to_string(),
            args: [
                "-q", "-D", "{device}", "-f", "S16_LE", "-r", "{rate}", "-c", "{channels}", "-t",
                "raw",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            sample_rate: 48000,
            channels: 2,
            chunk_bytes: 4096,
            full_scale_rms: 3000.0,
            stop_grace_ms: 300,
            stall_ms: 250,
            spotify_device: "hw:Loopback,1,0".to_string(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            list_program: "arecord".to_string(),
            list_args: vec!["-l".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Location of the key-value store, honoring the `[store]` override.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => global::store_file(),
        }
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [services]
            user = true

            [meter]
            spotify_device = "hw:Loopback,1,1"
            "#,
        )
        .unwrap();

        assert!(config.services.user);
        assert_eq!(config.services.spotify_stream, "spotify-stream.service");
        assert_eq!(config.meter.spotify_device, "hw:Loopback,1,1");
        assert_eq!(config.meter.chunk_bytes, 4096);
        assert_eq!(config.api.port, 8088);
    }

    #[test]
    fn test_store_path_override() {
        let mut config = Config::default();
        config.store.path = Some(PathBuf::from("/etc/sourcectl/store.env"));
        assert_eq!(
            config.store_path().unwrap(),
            PathBuf::from("/etc/sourcectl/store.env")
        );
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.meter.args, MeterConfig::default().args);
        assert_eq!(parsed.resolver.list_args, vec!["-l".to_string()]);
    }
}
