use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where a candidate binary was looked for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LocationSource {
    #[serde(rename = "system_path")]
    SystemPath,
    #[serde(rename = "local_install")]
    LocalInstall,
}

impl fmt::Display for LocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSource::SystemPath => write!(f, "system PATH"),
            LocationSource::LocalInstall => write!(f, "local install"),
        }
    }
}

/// A candidate install of the external tool, computed fresh on every check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinaryLocation {
    pub source: LocationSource,
    pub resolved_path: Option<PathBuf>,
    pub exists: bool,
}

impl BinaryLocation {
    pub fn found(source: LocationSource, path: PathBuf) -> Self {
        Self {
            source,
            resolved_path: Some(path),
            exists: true,
        }
    }

    pub fn missing(source: LocationSource) -> Self {
        Self {
            source,
            resolved_path: None,
            exists: false,
        }
    }
}

/// One install attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub release_url: String,
    pub target_dir: PathBuf,
    pub overwrite_existing: bool,
}

impl InstallRequest {
    pub fn new(release_url: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            release_url: release_url.into(),
            target_dir: absolutize(target_dir.into()),
            overwrite_existing: false,
        }
    }

    /// Builds a request whose overwrite flag reflects whether `binary_name`
    /// is already installed in `target_dir`.
    pub fn detect(
        release_url: impl Into<String>,
        target_dir: impl Into<PathBuf>,
        binary_name: &str,
    ) -> Self {
        let mut request = Self::new(release_url, target_dir);
        request.overwrite_existing = request.binary_path(binary_name).is_file();
        request
    }

    /// Canonical location of the installed binary.
    pub fn binary_path(&self, binary_name: &str) -> PathBuf {
        self.target_dir.join(binary_name)
    }

    /// Temporary location the release archive is downloaded to.
    pub fn archive_path(&self) -> PathBuf {
        let file_name = self
            .release_url
            .split(['?', '#'])
            .next()
            .and_then(|url| url.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("release-archive");
        self.target_dir.join(format!("{}.download", file_name))
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

/// A member found while scanning a downloaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name_in_archive: String,
    pub base_name: String,
    pub index: usize,
}

impl ArchiveEntry {
    pub fn new(name_in_archive: impl Into<String>, index: usize) -> Self {
        let name_in_archive = name_in_archive.into();
        let base_name = base_name(&name_in_archive).to_string();
        Self {
            name_in_archive,
            base_name,
            index,
        }
    }
}

/// Final path component of an archive member name. Both separators are
/// accepted since zips built on Windows sometimes store backslashes.
pub fn base_name(name_in_archive: &str) -> &str {
    name_in_archive
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name_in_archive)
}

/// Progress of one install action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallState {
    Idle,
    CheckingExisting,
    Downloading,
    ScanningArchive,
    Extracting,
    UpdatingSettings,
    Done,
    Failed,
}

impl InstallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallState::Done | InstallState::Failed)
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstallState::Idle => "idle",
            InstallState::CheckingExisting => "checking existing install",
            InstallState::Downloading => "downloading",
            InstallState::ScanningArchive => "scanning archive",
            InstallState::Extracting => "extracting",
            InstallState::UpdatingSettings => "updating settings",
            InstallState::Done => "done",
            InstallState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

/// Resolution of the generated waveform image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WaveDetail {
    #[serde(rename = "512x128")]
    Blocky,
    #[serde(rename = "1024x256")]
    VeryLow,
    #[serde(rename = "2048x512")]
    Low,
    #[serde(rename = "4096x1024")]
    #[default]
    Medium,
    #[serde(rename = "8192x2048")]
    High,
}

impl WaveDetail {
    pub const ALL: [WaveDetail; 5] = [
        WaveDetail::Blocky,
        WaveDetail::VeryLow,
        WaveDetail::Low,
        WaveDetail::Medium,
        WaveDetail::High,
    ];

    pub fn resolution(self) -> (u32, u32) {
        match self {
            WaveDetail::Blocky => (512, 128),
            WaveDetail::VeryLow => (1024, 256),
            WaveDetail::Low => (2048, 512),
            WaveDetail::Medium => (4096, 1024),
            WaveDetail::High => (8192, 2048),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WaveDetail::Blocky => "blocky",
            WaveDetail::VeryLow => "very-low",
            WaveDetail::Low => "low",
            WaveDetail::Medium => "medium",
            WaveDetail::High => "high",
        }
    }
}

impl fmt::Display for WaveDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.resolution();
        write!(f, "{}x{}", width, height)
    }
}

impl FromStr for WaveDetail {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        WaveDetail::ALL
            .into_iter()
            .find(|detail| detail.label() == wanted || detail.to_string() == wanted)
            .ok_or_else(|| {
                let valid: Vec<String> = WaveDetail::ALL
                    .iter()
                    .map(|d| format!("{} ({})", d.label(), d))
                    .collect();
                format!(
                    "Unknown waveform detail '{}'. Valid values: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// Persisted preferences. `binary_path` is the field the installer writes;
/// the remaining display options are carried for the waveform renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisionSettings {
    #[serde(default, alias = "path_to_ffmpeg")]
    pub binary_path: String,
    #[serde(default)]
    pub binary_installed_at: Option<String>,
    #[serde(default = "default_install_dir")]
    pub install_dir: String,
    #[serde(default)]
    pub release_url: Option<String>,
    #[serde(default)]
    pub binary_name: Option<String>,
    #[serde(default = "default_force_mixdown")]
    pub force_mixdown: bool,
    #[serde(default = "default_wave_color")]
    pub wave_color: [f32; 3],
    #[serde(default)]
    pub wave_detail: WaveDetail,
}

pub(crate) fn default_install_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ffprovision")
        .join("bin")
        .to_string_lossy()
        .to_string()
}
fn default_force_mixdown() -> bool {
    true
}
pub(crate) fn default_wave_color() -> [f32; 3] {
    [0.2392, 0.5098, 0.6941]
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            binary_path: String::new(),
            binary_installed_at: None,
            install_dir: default_install_dir(),
            release_url: None,
            binary_name: None,
            force_mixdown: default_force_mixdown(),
            wave_color: default_wave_color(),
            wave_detail: WaveDetail::default(),
        }
    }
}

impl ProvisionSettings {
    /// Configured binary, `None` when the field is empty.
    pub fn configured_binary(&self) -> Option<&Path> {
        let trimmed = self.binary_path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Path::new(trimmed))
        }
    }
}
