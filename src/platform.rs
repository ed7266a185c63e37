use crate::types::PlatformInfo;

/// Page users are pointed at when no automatic install is available.
pub const FFMPEG_DOWNLOAD_PAGE: &str = "https://www.ffmpeg.org/download.html";

/// Pinned, known-compatible build for 64-bit Windows. The zip carries a
/// single-file `ffmpeg.exe` under `<release>/bin/`.
pub const WINDOWS_X64_RELEASE_URL: &str = "https://github.com/BtbN/FFmpeg-Builds/releases/download/autobuild-2021-11-23-12-19/ffmpeg-n4.4.1-2-gcc33e73618-win64-gpl-4.4.zip";

pub fn get_system_info() -> PlatformInfo {
    let os = std::env::consts::OS.to_string();
    let arch = std::env::consts::ARCH.to_string();

    let normalized_arch = match arch.as_str() {
        "x86_64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        _ => arch,
    };

    PlatformInfo {
        os,
        arch: normalized_arch,
    }
}

/// Executable name the pipeline looks for on the given OS.
pub fn expected_executable_name(os: &str) -> &'static str {
    if os == "windows" {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Pinned release archive for the platform, if one exists.
pub fn release_url_for(info: &PlatformInfo) -> Option<&'static str> {
    match (info.os.as_str(), info.arch.as_str()) {
        ("windows", "amd64") => Some(WINDOWS_X64_RELEASE_URL),
        _ => None,
    }
}

/// Whether the install action should be offered at all on this machine.
pub fn platform_supports_auto_install() -> bool {
    release_url_for(&get_system_info()).is_some()
}
