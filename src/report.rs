//! User-invokable actions and the reports the CLI renders for them.

use crate::install::InstallReport;
use crate::locate::BinaryStatus;
use crate::platform::FFMPEG_DOWNLOAD_PAGE;
use crate::types::BinaryLocation;
use console::style;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CheckStatus,
    Install,
    DownloadPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Error,
}

/// A labelled found/not-found fact, shown as a check mark or a cross.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub label: String,
    pub found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionReport {
    pub action: Action,
    pub level: ReportLevel,
    pub message: String,
    pub indicators: Vec<Indicator>,
}

impl ActionReport {
    pub fn is_error(&self) -> bool {
        self.level == ReportLevel::Error
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for indicator in &self.indicators {
            let mark = if indicator.found {
                style("✔").green()
            } else {
                style("✘").red()
            };
            let _ = writeln!(out, "{} {}", mark, indicator.label);
        }
        let message = match self.level {
            ReportLevel::Info => style(self.message.as_str()),
            ReportLevel::Error => style(self.message.as_str()).red().bold(),
        };
        let _ = write!(out, "{}", message);
        out
    }
}

fn indicator(location: &BinaryLocation, binary_name: &str) -> Indicator {
    match (&location.resolved_path, location.exists) {
        (Some(path), true) => Indicator {
            label: format!(
                "{} found via {} ({})",
                binary_name,
                location.source,
                path.display()
            ),
            found: true,
        },
        _ => Indicator {
            label: format!("{} not found via {}", binary_name, location.source),
            found: false,
        },
    }
}

pub fn check_status_report(status: &BinaryStatus, binary_name: &str) -> ActionReport {
    let mut indicators = Vec::new();
    // The local folder is only worth mentioning when something is there
    if status.local_install.exists {
        indicators.push(indicator(&status.local_install, binary_name));
    }
    indicators.push(indicator(&status.system_path, binary_name));

    let (level, message) = match (status.effective_binary(), &status.configured_path) {
        (Some(path), Some(_)) if !path.exists() => (
            ReportLevel::Error,
            format!("Configured binary {} does not exist", path.display()),
        ),
        (Some(path), Some(_)) => (
            ReportLevel::Info,
            format!("Using configured binary: {}", path.display()),
        ),
        (Some(path), None) => (
            ReportLevel::Info,
            format!("Using {} from system PATH", path.display()),
        ),
        // Absence is a normal outcome, shown by the indicators
        (None, _) => (
            ReportLevel::Info,
            format!(
                "No usable {} found. Run `ffprovision install` or see `ffprovision download-page`",
                binary_name
            ),
        ),
    };

    ActionReport {
        action: Action::CheckStatus,
        level,
        message,
        indicators,
    }
}

pub fn install_report(report: &InstallReport) -> ActionReport {
    let mut message = report.message();
    if let Some(elapsed) = report.download_time {
        let _ = write!(message, " (download time {:.2}s)", elapsed.as_secs_f64());
    }

    ActionReport {
        action: Action::Install,
        level: if report.is_success() {
            ReportLevel::Info
        } else {
            ReportLevel::Error
        },
        message,
        indicators: Vec::new(),
    }
}

pub fn download_page_report(supports_auto_install: bool) -> ActionReport {
    let mut message = format!("FFmpeg download page: {}", FFMPEG_DOWNLOAD_PAGE);
    if supports_auto_install {
        message.push_str("\nOr run `ffprovision install` to fetch a compatible build automatically.");
    }

    ActionReport {
        action: Action::DownloadPage,
        level: ReportLevel::Info,
        message,
        indicators: Vec::new(),
    }
}
