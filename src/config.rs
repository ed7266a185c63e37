use crate::error::ProvisionError;
use crate::platform::{expected_executable_name, get_system_info, release_url_for};
use crate::types::*;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "ffprovision";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

pub const CONFIG_PATH_ENV: &str = "FFPROVISION_CONFIG_PATH";
pub const INSTALL_DIR_ENV: &str = "FFPROVISION_INSTALL_DIR";
pub const RELEASE_URL_ENV: &str = "FFPROVISION_RELEASE_URL";
pub const BINARY_NAME_ENV: &str = "FFPROVISION_BINARY_NAME";

/// Keys accepted by `config get/set/unset`.
pub const SETTING_KEYS: [&str; 8] = [
    "binary_path",
    "binary_installed_at",
    "install_dir",
    "release_url",
    "binary_name",
    "force_mixdown",
    "wave_color",
    "wave_detail",
];

/// Read/write access to the one persisted path the installer owns.
pub trait SettingsStore {
    /// Configured binary; `None` means "rely on the system search path".
    fn binary_path(&self) -> Option<PathBuf>;

    fn set_binary_path(&mut self, path: &Path) -> Result<(), ProvisionError>;
}

impl SettingsStore for ProvisionSettings {
    fn binary_path(&self) -> Option<PathBuf> {
        self.configured_binary().map(Path::to_path_buf)
    }

    fn set_binary_path(&mut self, path: &Path) -> Result<(), ProvisionError> {
        self.binary_path = path.to_string_lossy().to_string();
        self.binary_installed_at = Some(Utc::now().to_rfc3339());
        Ok(())
    }
}

pub fn get_user_config_dir() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join(APP_NAME);
    Ok(path)
}

pub fn get_settings_file_path() -> Result<PathBuf> {
    let path = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => get_user_config_dir()?.join(SETTINGS_FILE_NAME),
    };
    tracing::debug!("Settings file path: {}", path.display());
    Ok(path)
}

pub fn load_settings_from(path: &Path) -> Result<ProvisionSettings> {
    if !path.exists() {
        return Ok(ProvisionSettings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read settings file at {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Could not parse settings file {} as JSON", path.display()))
}

pub fn save_settings_to(path: &Path, settings: &ProvisionSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create config directory {}", dir.display()))?;
    }

    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content)
        .with_context(|| format!("Could not write settings file {}", path.display()))?;

    Ok(())
}

/// Settings backed by a JSON file; every write to the binary path is
/// persisted immediately.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    pub settings: ProvisionSettings,
}

impl SettingsFile {
    pub fn load() -> Result<Self> {
        Self::open(get_settings_file_path()?)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = load_settings_from(&path)?;
        Ok(Self { path, settings })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        save_settings_to(&self.path, &self.settings)
    }
}

impl SettingsStore for SettingsFile {
    fn binary_path(&self) -> Option<PathBuf> {
        self.settings.binary_path()
    }

    fn set_binary_path(&mut self, path: &Path) -> Result<(), ProvisionError> {
        let previous = self.settings.clone();
        self.settings.set_binary_path(path)?;

        if let Err(e) = self.save() {
            self.settings = previous;
            return Err(ProvisionError::Settings(format!("{:#}", e)));
        }
        Ok(())
    }
}

/// Settings resolved for one run: file values with environment overrides
/// and platform defaults applied. Never written back to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionContext {
    pub install_dir: PathBuf,
    pub release_url: Option<String>,
    pub binary_name: String,
    pub platform: PlatformInfo,
}

impl ProvisionContext {
    pub fn resolve(settings: &ProvisionSettings) -> Self {
        Self::resolve_with(settings, get_system_info(), |key| {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        })
    }

    pub fn resolve_with(
        settings: &ProvisionSettings,
        platform: PlatformInfo,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let install_dir = env(INSTALL_DIR_ENV).unwrap_or_else(|| settings.install_dir.clone());
        let release_url = env(RELEASE_URL_ENV)
            .or_else(|| settings.release_url.clone())
            .or_else(|| release_url_for(&platform).map(str::to_string));
        let binary_name = env(BINARY_NAME_ENV)
            .or_else(|| settings.binary_name.clone())
            .unwrap_or_else(|| expected_executable_name(&platform.os).to_string());

        Self {
            install_dir: PathBuf::from(install_dir),
            release_url,
            binary_name,
            platform,
        }
    }

    /// Release archive to install from; platforms without a pinned build
    /// need an explicit URL.
    pub fn release_url(&self) -> Result<&str, ProvisionError> {
        self.release_url
            .as_deref()
            .ok_or_else(|| ProvisionError::UnsupportedPlatform {
                os: self.platform.os.clone(),
                arch: self.platform.arch.clone(),
            })
    }
}

pub fn normalize_key(key: &str) -> String {
    let key = key
        .trim()
        .replace('-', "_")
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() {
                format!("_{}", c.to_lowercase())
            } else {
                c.to_string()
            }
        })
        .collect::<String>()
        .to_lowercase();

    match key.as_str() {
        "path_to_ffmpeg" | "ffmpeg_path" => "binary_path".to_string(),
        _ => key,
    }
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "'{}' is not a valid configuration setting. Valid settings: {}",
        key,
        SETTING_KEYS.join(", ")
    )
}

pub fn get_setting(settings: &ProvisionSettings, key: &str) -> Result<String> {
    let key = normalize_key(key);
    let value = match key.as_str() {
        "binary_path" => settings.binary_path.clone(),
        "binary_installed_at" => settings.binary_installed_at.clone().unwrap_or_default(),
        "install_dir" => settings.install_dir.clone(),
        "release_url" => settings.release_url.clone().unwrap_or_default(),
        "binary_name" => settings.binary_name.clone().unwrap_or_default(),
        "force_mixdown" => settings.force_mixdown.to_string(),
        "wave_color" => format_wave_color(settings.wave_color),
        "wave_detail" => settings.wave_detail.to_string(),
        _ => return Err(unknown_key(&key)),
    };
    Ok(value)
}

pub fn set_setting(settings: &mut ProvisionSettings, key: &str, value: &str) -> Result<()> {
    let key = normalize_key(key);
    let value = value.trim();
    match key.as_str() {
        "binary_path" => settings.binary_path = value.to_string(),
        "install_dir" => {
            if value.is_empty() {
                return Err(anyhow!("install_dir cannot be empty"));
            }
            settings.install_dir = value.to_string();
        }
        "release_url" => settings.release_url = non_empty(value),
        "binary_name" => {
            if value.contains(['/', '\\']) {
                return Err(anyhow!("binary_name must be a file name, not a path"));
            }
            settings.binary_name = non_empty(value);
        }
        "force_mixdown" => settings.force_mixdown = parse_bool(value)?,
        "wave_color" => settings.wave_color = parse_wave_color(value)?,
        "wave_detail" => settings.wave_detail = value.parse().map_err(|e: String| anyhow!(e))?,
        "binary_installed_at" => {
            return Err(anyhow!("binary_installed_at is recorded by the installer"));
        }
        _ => return Err(unknown_key(&key)),
    }
    Ok(())
}

pub fn unset_setting(settings: &mut ProvisionSettings, key: &str) -> Result<()> {
    let key = normalize_key(key);
    let defaults = ProvisionSettings::default();
    match key.as_str() {
        "binary_path" => {
            settings.binary_path = defaults.binary_path;
            settings.binary_installed_at = None;
        }
        "binary_installed_at" => settings.binary_installed_at = None,
        "install_dir" => settings.install_dir = defaults.install_dir,
        "release_url" => settings.release_url = None,
        "binary_name" => settings.binary_name = None,
        "force_mixdown" => settings.force_mixdown = defaults.force_mixdown,
        "wave_color" => settings.wave_color = defaults.wave_color,
        "wave_detail" => settings.wave_detail = defaults.wave_detail,
        _ => return Err(unknown_key(&key)),
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("'{}' is not a boolean (use true or false)", value)),
    }
}

pub fn format_wave_color(color: [f32; 3]) -> String {
    format!("{:.4},{:.4},{:.4}", color[0], color[1], color[2])
}

/// Accepts `r,g,b` with components in 0..=1, or `#rrggbb`.
pub fn parse_wave_color(value: &str) -> Result<[f32; 3]> {
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow!("'{}' is not a #rrggbb color", value));
        }
        let mut color = [0.0f32; 3];
        for (i, channel) in color.iter_mut().enumerate() {
            let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)?;
            *channel = f32::from(byte) / 255.0;
        }
        return Ok(color);
    }

    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(anyhow!("wave_color needs three components, got '{}'", value));
    }

    let mut color = [0.0f32; 3];
    for (channel, part) in color.iter_mut().zip(parts) {
        let component: f32 = part
            .parse()
            .with_context(|| format!("'{}' is not a number", part))?;
        if !(0.0..=1.0).contains(&component) {
            return Err(anyhow!("color component {} is outside 0..1", component));
        }
        *channel = component;
    }
    Ok(color)
}
