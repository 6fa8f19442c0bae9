// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use pma_backup::config::{load_config, load_config_from, Config};
use pma_backup::{
    BackupError, Compression, Credentials, ExportRequest, NamingPolicy, Orchestrator,
    LocalFileSystem, WebDriverLauncher,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Usage error - invalid command line arguments
    pub const USAGE: i32 = 64;
    /// Service unavailable - WebDriver/browser not reachable
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Internal software error - page layout not as expected
    pub const SOFTWARE: i32 = 70;
    /// I/O error - output directory or rename failed
    pub const IO_ERR: i32 = 74;
    /// Temporary failure - download did not finish in time
    pub const TEMP_FAIL: i32 = 75;
    /// Permission denied - login rejected
    pub const NOPERM: i32 = 77;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// Create a spinner with consistent styling
    pub fn create(message: &str, hidden: bool) -> ProgressBar {
        if hidden {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("\u{28FB}\u{28F9}\u{28FC}\u{28F8}\u{28FE}\u{28F6}\u{28F7}\u{28E7}\u{28CF}\u{28DF} ")
            .template("{spinner:.cyan} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

/// Invalid combination of command line arguments.
#[derive(Debug)]
struct UsageError(String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

/// pma-backup - Automated download of MySQL backups from a phpMyAdmin web interface.
#[derive(Parser, Debug)]
#[command(name = "pma-backup")]
#[command(version = VERSION)]
#[command(about = "Automated download of MySQL backup files from a phpMyAdmin web interface, using just one command.")]
#[command(long_about = "pma-backup - phpMyAdmin SQL dump downloader\n\n\
    Plain dump:          pma-backup https://host/phpmyadmin/ root secret\n\
    Dated gzip dump:     pma-backup URL USER PASS -p --compression gzip -o /backups\n\
    Try without saving:  pma-backup URL USER PASS --dry-run\n\n\
    Requires a running WebDriver server (geckodriver --port 4444) and Firefox.")]
struct Cli {
    /// phpMyAdmin login page url
    #[arg(value_name = "URL")]
    url: String,

    /// phpMyAdmin login username
    #[arg(value_name = "USERNAME")]
    user: String,

    /// phpMyAdmin login password
    #[arg(value_name = "PASSWORD")]
    password: String,

    /// Output directory for the SQL dump file (default: the current working directory)
    #[arg(short = 'o', long)]
    output_directory: Option<PathBuf>,

    /// Prepend current UTC date & time to the filename (see --prefix-format)
    #[arg(short = 'p', long)]
    prepend_date: bool,

    /// Comma-separated list of database names to exclude from the dump
    #[arg(short = 'e', long, default_value = "")]
    exclude_dbs: String,

    /// MySQL server hostname to supply if enabled as field on login page
    #[arg(short = 's', long)]
    server_name: Option<String>,

    /// Compression method for the output file - must be supported by the server
    #[arg(long, default_value = "none", value_parser = ["none", "zip", "gzip"])]
    compression: String,

    /// Desired basename (without extension) of the SQL dump file (default: the name given by phpMyAdmin)
    #[arg(long)]
    basename: Option<String>,

    /// Timeout in seconds for page elements to appear (default: 10)
    #[arg(long)]
    timeout: Option<u64>,

    /// Timeout in seconds for the download to finish (default: 300)
    #[arg(long)]
    download_timeout: Option<u64>,

    /// Overwrite existing SQL dump files (instead of appending a number to the name)
    #[arg(long)]
    overwrite_existing: bool,

    /// Prefix format for --prepend-date in strftime format (default: "%Y-%m-%d_%H-%M-%S_UTC_")
    #[arg(long)]
    prefix_format: Option<String>,

    /// Dry run, do not actually download any file
    #[arg(long)]
    dry_run: bool,

    /// Basic HTTP authentication, using format "username:password"
    #[arg(long)]
    http_auth: Option<String>,

    /// WebDriver server URL (default: http://localhost:4444)
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Show the browser window instead of running headless
    #[arg(long)]
    show_browser: bool,

    /// Config file (default: ~/.pma-backup/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Quiet mode: only errors and the result line
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Verbose mode: detailed output for debugging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_request(cli: &Cli, config: &Config) -> Result<ExportRequest> {
    let compression: Compression = cli
        .compression
        .parse()
        .map_err(|e: String| UsageError(e))?;

    let mut request = ExportRequest::new(&cli.url, &cli.user, &cli.password)
        .with_exclude_dbs(&cli.exclude_dbs)
        .with_compression(compression)
        .with_timeout(cli.timeout.map(Duration::from_secs).unwrap_or(config.timeout()))
        .with_download_timeout(
            cli.download_timeout
                .map(Duration::from_secs)
                .unwrap_or(config.download_timeout()),
        )
        .with_poll_interval(config.poll_interval())
        .with_settle_delay(config.settle_delay())
        .with_frame_mode(config.legacy_frame_mode)
        .with_dry_run(cli.dry_run);

    if let Some(server_name) = &cli.server_name {
        request = request.with_server_name(server_name);
    }
    if let Some(pair) = &cli.http_auth {
        let auth = Credentials::parse_pair(pair).ok_or_else(|| {
            UsageError("--http-auth must use the format \"username:password\"".to_string())
        })?;
        request = request.with_http_auth(auth);
    }

    Ok(request)
}

fn build_policy(cli: &Cli, config: &Config) -> Result<NamingPolicy> {
    let output_dir = match &cli.output_directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine the current directory")?,
    };
    let prefix_format = cli
        .prefix_format
        .clone()
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| config.prefix_format.clone());

    let mut policy = NamingPolicy::new(output_dir, prefix_format)
        .with_prepend_date(cli.prepend_date)
        .with_overwrite_existing(cli.overwrite_existing);
    if let Some(basename) = &cli.basename {
        policy = policy.with_basename(basename);
    }
    Ok(policy)
}

fn run(cli: Cli) -> Result<()> {
    if cli.prefix_format.as_deref().is_some_and(|f| !f.is_empty()) && !cli.prepend_date {
        return Err(UsageError("--prefix-format given without --prepend-date".to_string()).into());
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let request = build_request(&cli, &config)?;
    let policy = build_policy(&cli, &config)?;

    let mut webdriver = config.webdriver();
    if let Some(url) = &cli.webdriver_url {
        webdriver.endpoint = url.clone();
    }
    if cli.show_browser {
        webdriver.headless = false;
    }
    let launcher = WebDriverLauncher::new(webdriver);

    let spinner = spinner::create("Starting browser...", cli.quiet);
    let outcome = Orchestrator::new(&launcher, &LocalFileSystem)
        .with_observer(|event| spinner.set_message(event.message()))
        .run(&request, &policy);
    spinner.finish_and_clear();

    let outcome = outcome?;
    let verb = if outcome.dry_run { "Would have" } else { "Successfully" };
    println!(
        "{} {} saved SQL dump to: {}",
        "[OK]".green(),
        verb,
        outcome.target_path.display()
    );
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() {
        return USAGE;
    }
    match err.downcast_ref::<BackupError>() {
        Some(BackupError::AuthenticationFailure) => NOPERM,
        Some(BackupError::ElementNotFound { .. }) => SOFTWARE,
        Some(BackupError::Timeout { .. }) => TEMP_FAIL,
        Some(BackupError::RenameFailure { .. }) | Some(BackupError::Io(_)) => IO_ERR,
        Some(BackupError::Agent(_)) => SERVICE_UNAVAILABLE,
        Some(BackupError::Config(_)) => CONFIG,
        None => ERROR,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let code = match run(cli) {
        Ok(()) => SUCCESS,
        Err(err) => {
            match err.downcast_ref::<BackupError>() {
                Some(backup_err) => eprintln!("{}", backup_err.report().red()),
                None => eprintln!("{} {:#}", "Error:".red(), err),
            }
            exit_code(&err)
        }
    };
    std::process::exit(code);
}
