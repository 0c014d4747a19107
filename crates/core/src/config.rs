use crate::composite::{MapOptions, MapSize, MapZoom};
use crate::geocode::GeocodeSettings;
use crate::naming::DEFAULT_SEPARATOR;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub separator: char,
    pub geocoding: bool,
    pub locationiq_api_key: Option<String>,
    pub recursive_default: bool,
    pub skip_processed: bool,
    pub watermark: bool,
    pub map: bool,
    pub map_size: MapSize,
    pub map_opacity: u8,
    pub map_zoom: MapZoom,
    pub request_timeout_secs: u64,
    pub min_request_interval_ms: u64,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            geocoding: true,
            locationiq_api_key: None,
            recursive_default: false,
            skip_processed: true,
            watermark: false,
            map: false,
            map_size: MapSize::Standard,
            map_opacity: 70,
            map_zoom: MapZoom::District,
            request_timeout_secs: 10,
            min_request_interval_ms: 1000,
            user_agent: format!("GeotagRenamer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AppConfig {
    pub fn map_options(&self) -> Option<MapOptions> {
        self.map.then(|| {
            MapOptions {
                size: self.map_size,
                opacity: self.map_opacity,
                zoom: self.map_zoom,
            }
            .clamped()
        })
    }

    pub fn geocode_settings(&self) -> GeocodeSettings {
        GeocodeSettings {
            api_key: self.locationiq_api_key.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            min_interval: Duration::from_millis(self.min_request_interval_ms),
            user_agent: self.user_agent.clone(),
            separator: self.separator,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub undo_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "geotag", "geotag-renamer")
        .context("cannot determine the OS configuration directory")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        undo_path: config_dir.join("undo-last.json"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    load_config_from(&app_paths()?.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("cannot parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(&app_paths()?.config_path, config)
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create config directory: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("cannot serialize config")?;
    fs::write(path, body)
        .with_context(|| format!("cannot write config file: {}", path.display()))?;
    Ok(())
}
