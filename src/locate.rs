//! Read-only discovery of an ffmpeg binary.
//!
//! Nothing in here mutates state or fails: a missing binary is reported as a
//! `BinaryLocation` with `exists == false`.

use crate::config::{ProvisionContext, SettingsStore};
use crate::types::{BinaryLocation, LocationSource};
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

/// Both discovery results, reported together as independent facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryStatus {
    pub system_path: BinaryLocation,
    pub local_install: BinaryLocation,
    pub configured_path: Option<PathBuf>,
}

impl BinaryStatus {
    /// Binary a downstream pipeline should run. A configured path is
    /// authoritative; with none set, a PATH hit is assumed sufficient.
    pub fn effective_binary(&self) -> Option<PathBuf> {
        self.configured_path
            .clone()
            .or_else(|| self.system_path.resolved_path.clone())
    }
}

pub fn check_status(ctx: &ProvisionContext, store: &dyn SettingsStore) -> BinaryStatus {
    let status = BinaryStatus {
        system_path: check_system_path(&ctx.binary_name),
        local_install: check_local_install(&ctx.install_dir, &ctx.binary_name),
        configured_path: store.binary_path(),
    };
    tracing::debug!("Binary status: {:?}", status);
    status
}

pub fn check_system_path(binary_name: &str) -> BinaryLocation {
    let search_path = env::var_os("PATH").unwrap_or_default();
    let path_ext = env::var_os("PATHEXT");
    match find_in_search_path(binary_name, &search_path, path_ext.as_deref()) {
        Some(path) => BinaryLocation::found(LocationSource::SystemPath, path),
        None => BinaryLocation::missing(LocationSource::SystemPath),
    }
}

pub fn check_local_install(target_dir: &Path, binary_name: &str) -> BinaryLocation {
    let candidate = target_dir.join(binary_name);
    if candidate.is_file() {
        BinaryLocation::found(LocationSource::LocalInstall, candidate)
    } else {
        BinaryLocation::missing(LocationSource::LocalInstall)
    }
}

/// Searches `search_path` (a PATH-style list) for `binary_name`. When the
/// name has no extension, each `PATHEXT` entry is tried as well.
pub fn find_in_search_path(
    binary_name: &str,
    search_path: &OsStr,
    path_ext: Option<&OsStr>,
) -> Option<PathBuf> {
    let candidates = candidate_names(binary_name, path_ext);
    let cwd = env::current_dir().ok();

    for dir in search_dirs(search_path, cwd.as_deref()) {
        for name in &candidates {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                tracing::trace!("Found {} at {}", binary_name, candidate.display());
                return Some(candidate);
            }
        }
    }

    None
}

/// PATH entries in order. Relative entries resolve against `cwd` and are
/// skipped when it is unknown.
fn search_dirs(search_path: &OsStr, cwd: Option<&Path>) -> Vec<PathBuf> {
    env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .filter_map(|dir| {
            if dir.is_absolute() {
                Some(dir)
            } else {
                cwd.map(|cwd| cwd.join(dir))
            }
        })
        .collect()
}

fn candidate_names(binary_name: &str, path_ext: Option<&OsStr>) -> Vec<OsString> {
    let mut names = vec![OsString::from(binary_name)];

    if Path::new(binary_name).extension().is_none() {
        if let Some(exts) = path_ext.and_then(OsStr::to_str) {
            for ext in exts.split(';').filter(|e| !e.is_empty()) {
                names.push(OsString::from(format!("{}{}", binary_name, ext.to_lowercase())));
            }
        }
    }

    names
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProvisionSettings;
    use tempfile::TempDir;

    fn make_executable(path: &Path) {
        fs::write(path, "#!/bin/sh\necho ffmpeg\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_finds_first_match_in_search_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        make_executable(&first.path().join("ffmpeg"));
        make_executable(&second.path().join("ffmpeg"));

        let search = env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_in_search_path("ffmpeg", &search, None).unwrap();
        assert_eq!(found, first.path().join("ffmpeg"));
    }

    #[test]
    fn test_missing_binary_is_not_an_error() {
        let empty = TempDir::new().unwrap();
        let search = env::join_paths([empty.path()]).unwrap();
        assert!(find_in_search_path("ffmpeg", &search, None).is_none());
        assert!(find_in_search_path("ffmpeg", OsStr::new(""), None).is_none());
    }

    #[test]
    fn test_path_ext_is_tried_for_bare_names() {
        let dir = TempDir::new().unwrap();
        make_executable(&dir.path().join("ffmpeg.exe"));

        let search = env::join_paths([dir.path()]).unwrap();
        let found = find_in_search_path("ffmpeg", &search, Some(OsStr::new(".COM;.EXE")));
        assert_eq!(found, Some(dir.path().join("ffmpeg.exe")));
    }

    #[test]
    fn test_unknown_cwd_skips_only_relative_entries() {
        let dir = TempDir::new().unwrap();
        let search =
            env::join_paths([PathBuf::from("relative/bin"), dir.path().to_path_buf()]).unwrap();

        assert_eq!(search_dirs(&search, None), vec![dir.path().to_path_buf()]);
        assert_eq!(
            search_dirs(&search, Some(Path::new("/work"))),
            vec![Path::new("/work").join("relative/bin"), dir.path().to_path_buf()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ffmpeg"), "not runnable").unwrap();

        let search = env::join_paths([dir.path()]).unwrap();
        assert!(find_in_search_path("ffmpeg", &search, None).is_none());
    }

    #[test]
    fn test_local_install_requires_a_file() {
        let dir = TempDir::new().unwrap();
        assert!(!check_local_install(dir.path(), "ffmpeg").exists);

        fs::create_dir(dir.path().join("ffmpeg")).unwrap();
        assert!(!check_local_install(dir.path(), "ffmpeg").exists);

        fs::remove_dir(dir.path().join("ffmpeg")).unwrap();
        fs::write(dir.path().join("ffmpeg"), "bin").unwrap();
        let location = check_local_install(dir.path(), "ffmpeg");
        assert!(location.exists);
        assert_eq!(location.source, LocationSource::LocalInstall);
        assert_eq!(location.resolved_path, Some(dir.path().join("ffmpeg")));
    }

    #[test]
    fn test_repeated_checks_are_identical() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tool.exe"), "bin").unwrap();
        let ctx = ProvisionContext {
            install_dir: dir.path().to_path_buf(),
            release_url: None,
            binary_name: "tool.exe".to_string(),
            platform: crate::platform::get_system_info(),
        };
        let settings = ProvisionSettings::default();

        let first = check_status(&ctx, &settings);
        for _ in 0..3 {
            assert_eq!(check_status(&ctx, &settings), first);
        }
        assert!(first.local_install.exists);
    }

    #[test]
    fn test_configured_path_is_authoritative() {
        let status = BinaryStatus {
            system_path: BinaryLocation::found(
                LocationSource::SystemPath,
                PathBuf::from("/usr/bin/ffmpeg"),
            ),
            local_install: BinaryLocation::missing(LocationSource::LocalInstall),
            configured_path: Some(PathBuf::from("/opt/ffmpeg/ffmpeg")),
        };
        assert_eq!(
            status.effective_binary(),
            Some(PathBuf::from("/opt/ffmpeg/ffmpeg"))
        );

        let status = BinaryStatus {
            configured_path: None,
            ..status
        };
        assert_eq!(status.effective_binary(), Some(PathBuf::from("/usr/bin/ffmpeg")));
    }
}
