//! Ensayador: command-line companion for the Ensayar test framework
//!
//! ## Usage
//!
//! ```bash
//! ensayador profile pixelphone     # Capture device capabilities to a profile
//! ensayador devices                # List connected devices
//! ensayador schedule runs.yaml     # Validate a schedule file
//! ```

mod error;

use clap::{Parser, Subcommand};
use console::style;
use ensayar::capabilities::profile_path;
use ensayar::device::adb;
use ensayar::ScheduleConfig;
use error::{CliError, CliResult};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line companion for the Ensayar test framework
#[derive(Debug, Parser)]
#[command(name = "ensayador", version, about)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Capture the connected device's capabilities into a JSON profile.
    ///
    /// Unlock the phone and open the app you want to automate first.
    Profile {
        /// Profile name; conventionally the first screen object's name in
        /// lower case
        name: String,

        /// Directory the profile is written to
        #[arg(long, default_value = "profiles")]
        profiles_dir: PathBuf,
    },

    /// List devices currently visible to adb
    Devices,

    /// Parse a schedule file and print the planned runs
    Schedule {
        /// Path to the YAML schedule file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Profile { name, profiles_dir } => capture_profile(name, profiles_dir),
        Commands::Devices => list_devices(),
        Commands::Schedule { file } => validate_schedule(file),
    }
}

fn capture_profile(name: &str, profiles_dir: &Path) -> CliResult<()> {
    println!("Reading capabilities from the connected device...");
    let capabilities = adb::basic_capabilities()?;
    let path = profile_path(profiles_dir, name);
    capabilities.save_profile(&path)?;

    println!(
        "{} profile saved to {}",
        style("✓").green().bold(),
        style(path.display()).cyan()
    );
    println!(
        "By default the capability 'automationName' is set to '{}'.",
        adb::DEFAULT_AUTOMATION_NAME
    );
    println!("If the test does not launch the app, try changing it to 'UiAutomator2'.");
    Ok(())
}

fn list_devices() -> CliResult<()> {
    let devices = adb::devices()?;
    if devices.is_empty() {
        println!("No devices attached");
        return Ok(());
    }
    for (serial, state) in devices {
        println!("{serial}\t{state}");
    }
    Ok(())
}

fn validate_schedule(file: &Path) -> CliResult<()> {
    let schedule = ScheduleConfig::load(file)?;
    if schedule.is_empty() {
        return Err(CliError::EmptySchedule {
            path: file.to_path_buf(),
        });
    }

    println!(
        "{} {} scheduled run(s) in {}",
        style("✓").green().bold(),
        schedule.len(),
        style(file.display()).cyan()
    );
    for (index, run) in schedule.runs.iter().enumerate() {
        println!(
            "  {}. suite '{}' with profile '{}' on {}",
            index + 1,
            style(&run.suite).bold(),
            run.profile,
            run.device
        );
    }
    Ok(())
}
