mod archive;
mod cli;
mod config;
mod download;
mod error;
mod install;
mod locate;
mod platform;
mod report;
mod types;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use config::{
    get_setting, normalize_key, set_setting, unset_setting, ProvisionContext, SettingsFile,
    SETTING_KEYS,
};
use console::Term;
use download::HttpFetcher;
use install::{spawn_install, InstallGate, Installer};
use locate::check_status;
use platform::{platform_supports_auto_install, WINDOWS_X64_RELEASE_URL};
use report::{check_status_report, download_page_report, install_report, ActionReport};
use std::sync::Arc;
use tokio::sync::Mutex;
use types::InstallRequest;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let mut settings_file = SettingsFile::load()?;

    match cli.command {
        Commands::Version => {
            println!("ffprovision v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Check => {
            let ctx = ProvisionContext::resolve(&settings_file.settings);
            let status = check_status(&ctx, &settings_file);
            let report = check_status_report(&status, &ctx.binary_name);
            exit_with_report(&report);
        }

        Commands::DownloadPage => {
            let report = download_page_report(platform_supports_auto_install());
            exit_with_report(&report);
        }

        Commands::Path => {
            let ctx = ProvisionContext::resolve(&settings_file.settings);
            match check_status(&ctx, &settings_file).effective_binary() {
                Some(path) => println!("{}", path.display()),
                None => {
                    tracing::error!("No {} configured or found in PATH", ctx.binary_name);
                    std::process::exit(1);
                }
            }
        }

        Commands::Install { yes, url, dir } => {
            let mut ctx = ProvisionContext::resolve(&settings_file.settings);
            if let Some(dir) = dir {
                ctx.install_dir = dir;
            }
            if url.is_some() {
                ctx.release_url = url;
            }

            let release_url = match ctx.release_url() {
                Ok(url) => url.to_string(),
                Err(e) => {
                    eprintln!("{}", console::style(e).red().bold());
                    std::process::exit(1);
                }
            };

            let request = InstallRequest::detect(release_url, &ctx.install_dir, &ctx.binary_name);
            if !yes && !confirm_install(&request, &ctx.binary_name)? {
                println!("Install cancelled");
                return Ok(());
            }

            let fetcher = HttpFetcher::new().with_progress(!cli.quiet);
            let installer = Arc::new(Installer::new(fetcher, ctx.binary_name.clone()));
            let store = Arc::new(Mutex::new(settings_file));
            let gate = InstallGate::new();

            let handle = spawn_install(installer, request, Arc::clone(&store), &gate)?;
            let report = handle.await.context("Install task panicked")?;
            exit_with_report(&install_report(&report));
        }

        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                if let Some(key) = key {
                    println!("{}", get_setting(&settings_file.settings, &key)?);
                } else {
                    print_settings_plain(&settings_file)?;
                }
            }
            ConfigAction::Set { args } => {
                let (key, value) = parse_set_args(&args)?;
                set_setting(&mut settings_file.settings, &key, &value)?;
                settings_file.save()?;
                tracing::info!("Setting '{}' updated to '{}'", normalize_key(&key), value);
            }
            ConfigAction::Unset { key } => {
                unset_setting(&mut settings_file.settings, &key)?;
                settings_file.save()?;
                tracing::info!("Setting '{}' unset", normalize_key(&key));
            }
            ConfigAction::Show { format } => match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&settings_file.settings)?),
                "yaml" => print!("{}", serde_yaml::to_string(&settings_file.settings)?),
                "plain" => print_settings_plain(&settings_file)?,
                other => {
                    return Err(anyhow!(
                        "Unknown format '{}'. Use json, yaml or plain",
                        other
                    ))
                }
            },
        },
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

/// Prints the report and ends the process, failing for error reports.
fn exit_with_report(report: &ActionReport) {
    tracing::debug!("{:?} finished with {:?}", report.action, report.level);
    println!("{}", report.render());
    if report.is_error() {
        std::process::exit(1);
    }
}

fn confirm_install(request: &InstallRequest, binary_name: &str) -> Result<bool> {
    let term = Term::stderr();
    let size_hint = if request.release_url == WINDOWS_X64_RELEASE_URL {
        " (~90 MB)"
    } else {
        ""
    };

    if request.overwrite_existing {
        term.write_line(&format!(
            "{} is already in {}, delete and re-download?{}",
            binary_name,
            request.target_dir.display(),
            size_hint
        ))?;
    } else {
        term.write_line(&format!(
            "This will download {} into {}{}",
            request.release_url,
            request.target_dir.display(),
            size_hint
        ))?;
    }
    term.write_str("Would you like to continue? [y/N] ")?;

    // Answer on the prompt's terminal, or from piped stdin when there is none
    let answer = if term.is_term() {
        term.read_line()?
    } else {
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("Failed to read confirmation")?;
        line
    };
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn parse_set_args(args: &[String]) -> Result<(String, String)> {
    match args {
        [pair] => pair
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .ok_or_else(|| anyhow!("Invalid format. Use 'key=value' or 'key value'.")),
        [key, rest @ ..] => Ok((key.clone(), rest.join(" "))),
        [] => Err(anyhow!("Missing key and value")),
    }
}

fn print_settings_plain(settings_file: &SettingsFile) -> Result<()> {
    println!("--- ffprovision settings ({}) ---", settings_file.path().display());
    for key in SETTING_KEYS {
        println!("  {}: {}", key, get_setting(&settings_file.settings, key)?);
    }
    Ok(())
}
