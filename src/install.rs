use crate::archive::{extract_entry, find_entry, ArchiveKind};
use crate::config::SettingsStore;
use crate::download::Fetcher;
use crate::error::ProvisionError;
use crate::types::{InstallRequest, InstallState};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Terminal result of one install action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Done {
        binary_path: PathBuf,
    },
    Failed {
        stage: InstallState,
        error: ProvisionError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub outcome: InstallOutcome,
    pub download_time: Option<Duration>,
}

impl InstallReport {
    pub fn state(&self) -> InstallState {
        match self.outcome {
            InstallOutcome::Done { .. } => InstallState::Done,
            InstallOutcome::Failed { .. } => InstallState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, InstallOutcome::Done { .. })
    }

    /// The single user-facing message for this outcome.
    pub fn message(&self) -> String {
        match &self.outcome {
            InstallOutcome::Done { binary_path } => {
                format!("Installed: {}", binary_path.display())
            }
            InstallOutcome::Failed { stage, error } => {
                format!("Install failed while {}: {}", stage, error)
            }
        }
    }
}

/// Removes the downloaded archive when dropped, whichever way the install
/// ends.
struct ArchiveCleanup<'a>(&'a Path);

impl Drop for ArchiveCleanup<'_> {
    fn drop(&mut self) {
        if !self.0.exists() {
            return;
        }
        match fs::remove_file(self.0) {
            Ok(()) => tracing::debug!("Removed archive {}", self.0.display()),
            Err(e) => tracing::warn!("Could not remove archive {}: {}", self.0.display(), e),
        }
    }
}

/// Turns a release archive into an installed binary and records it.
pub struct Installer<F> {
    fetcher: F,
    binary_name: String,
}

impl<F: Fetcher> Installer<F> {
    pub fn new(fetcher: F, binary_name: impl Into<String>) -> Self {
        Self {
            fetcher,
            binary_name: binary_name.into(),
        }
    }

    /// Runs one install to a terminal state. The settings store is only
    /// written after the binary has been extracted.
    ///
    /// With `overwrite_existing` the previous binary is removed before the
    /// download starts, so a failed re-download leaves no binary behind.
    pub async fn install<S>(&self, request: &InstallRequest, store: &mut S) -> InstallReport
    where
        S: SettingsStore + ?Sized,
    {
        let mut download_time = None;
        let outcome = match self.run(request, store, &mut download_time).await {
            Ok(binary_path) => {
                tracing::info!("Installed {}", binary_path.display());
                InstallOutcome::Done { binary_path }
            }
            Err((stage, error)) => {
                tracing::debug!("Install failed while {}: {}", stage, error);
                InstallOutcome::Failed { stage, error }
            }
        };

        let report = InstallReport {
            outcome,
            download_time,
        };
        tracing::debug!("Install state: {}", report.state());
        report
    }

    async fn run<S>(
        &self,
        request: &InstallRequest,
        store: &mut S,
        download_time: &mut Option<Duration>,
    ) -> Result<PathBuf, (InstallState, ProvisionError)>
    where
        S: SettingsStore + ?Sized,
    {
        let binary_path = request.binary_path(&self.binary_name);

        let mut stage = InstallState::Idle;
        advance(&mut stage, InstallState::CheckingExisting);
        fs::create_dir_all(&request.target_dir).map_err(|e| {
            let error = ProvisionError::extraction(&self.binary_name, &request.target_dir, e);
            (stage, error)
        })?;
        if request.overwrite_existing && binary_path.exists() {
            tracing::info!("Removing previous install at {}", binary_path.display());
            fs::remove_file(&binary_path).map_err(|e| {
                (stage, ProvisionError::extraction(&self.binary_name, &binary_path, e))
            })?;
        }

        advance(&mut stage, InstallState::Downloading);
        let archive_path = request.archive_path();
        let cleanup = ArchiveCleanup(&archive_path);
        let elapsed = self
            .fetcher
            .download(&request.release_url, &archive_path)
            .await
            .map_err(|e| (stage, e))?;
        *download_time = Some(elapsed);

        // Archive access is blocking file I/O
        advance(&mut stage, InstallState::ScanningArchive);
        let scan_path = archive_path.clone();
        let binary_name = self.binary_name.clone();
        let (kind, entry) = tokio::task::spawn_blocking(move || {
            let kind = ArchiveKind::detect(&scan_path)?;
            let entry = find_entry(&scan_path, kind, &binary_name)?;
            Ok::<_, ProvisionError>((kind, entry))
        })
        .await
        .map_err(|e| {
            let error = ProvisionError::InvalidArchive {
                path: archive_path.clone(),
                reason: e.to_string(),
            };
            (stage, error)
        })?
        .map_err(|e| (stage, e))?;
        let entry = entry.ok_or_else(|| {
            let error = ProvisionError::BinaryNotFoundInArchive {
                binary: self.binary_name.clone(),
            };
            (stage, error)
        })?;

        advance(&mut stage, InstallState::Extracting);
        let source = archive_path.clone();
        let target_dir = request.target_dir.clone();
        let installed =
            tokio::task::spawn_blocking(move || extract_entry(&source, kind, &entry, &target_dir))
                .await
                .map_err(|e| {
                    let error =
                        ProvisionError::extraction(&self.binary_name, &request.target_dir, e);
                    (stage, error)
                })?
                .map_err(|e| (stage, e))?;
        drop(cleanup);

        advance(&mut stage, InstallState::UpdatingSettings);
        store.set_binary_path(&installed).map_err(|e| (stage, e))?;

        Ok(installed)
    }
}

fn advance(stage: &mut InstallState, next: InstallState) {
    debug_assert!(!stage.is_terminal());
    tracing::debug!("Install state: {} -> {}", stage, next);
    *stage = next;
}

/// Allows one install in flight at a time.
#[derive(Debug, Clone, Default)]
pub struct InstallGate {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of an install; dropping it reopens the gate.
#[derive(Debug)]
pub struct InstallPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for InstallPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl InstallGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Result<InstallPermit, ProvisionError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ProvisionError::InstallInProgress)?;
        Ok(InstallPermit {
            busy: Arc::clone(&self.busy),
        })
    }
}

/// Runs the install on a background task. The returned handle resolves to
/// the terminal report; the gate stays closed until then.
pub fn spawn_install<F, S>(
    installer: Arc<Installer<F>>,
    request: InstallRequest,
    store: Arc<Mutex<S>>,
    gate: &InstallGate,
) -> Result<JoinHandle<InstallReport>, ProvisionError>
where
    F: Fetcher + 'static,
    S: SettingsStore + Send + 'static,
{
    let permit = gate.try_acquire()?;

    Ok(tokio::spawn(async move {
        let _permit = permit;
        let mut store = store.lock().await;
        installer.install(&request, &mut *store).await
    }))
}
