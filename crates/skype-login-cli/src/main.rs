//! Console launcher for the Skype login automation.
//!
//! Usage:
//!   skype-console-login <path to Skype.exe> /username:<username> /password:<password> [other Skype arguments]
//!
//! Everything that is not a credential switch is passed through to the target
//! verbatim; the password never reaches the target's command line.

use std::path::PathBuf;

use clap::Parser;
use regex::Regex;
use tracing::{info, warn};

use skype_login::{Credentials, LaunchRequest, LoginLauncher, LoginOutcome};

#[derive(Parser)]
#[command(name = "skype-console-login")]
#[command(about = "Logs the Skype desktop client in without human interaction")]
struct Cli {
    /// Path to the target Skype executable.
    executable: Option<PathBuf>,

    /// Credential switches plus arguments passed through to the target.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    arguments: Vec<String>,
}

fn main() {
    attach_parent_console();
    init_tracing();

    let cli = Cli::parse();
    run(cli);

    free_console();
}

fn run(cli: Cli) {
    let Some(executable) = cli.executable else {
        print_usage();
        return;
    };

    let parsed = match parse_arguments(&cli.arguments) {
        Ok(parsed) => parsed,
        Err(error) => {
            eprintln!("{error}");
            print_usage();
            return;
        }
    };

    if !executable.is_file() {
        println!("Skype executable not found at the provided path");
        return;
    }

    kill_running_instances(&executable);

    let request = LaunchRequest::new(executable, parsed.credentials, parsed.extra_arguments);
    let launcher = match LoginLauncher::new(request) {
        Ok(launcher) => launcher,
        Err(error) => {
            eprintln!("Error while starting Skype: {error}");
            return;
        }
    };

    match launcher.run() {
        Ok(LoginOutcome::AlreadyAuthenticated) => println!("Already logged in"),
        Ok(LoginOutcome::Completed) => info!("login flow completed"),
        Err(error) => eprintln!("Error while starting Skype: {error}"),
    }
}

struct ParsedArguments {
    credentials: Credentials,
    extra_arguments: String,
}

/// Splits the trailing arguments into credentials and the pass-through
/// argument string, matching the switches case-insensitively.
fn parse_arguments(arguments: &[String]) -> Result<ParsedArguments, anyhow::Error> {
    let username_switch = Regex::new(r"(?i)^/username:(.+)$").expect("valid pattern");
    let password_switch = Regex::new(r"(?i)^/password:(.+)$").expect("valid pattern");

    let mut username = None;
    let mut password = None;
    let mut extra = Vec::new();

    for argument in arguments {
        if let Some(capture) = username_switch.captures(argument) {
            username = Some(capture[1].to_string());
        } else if let Some(capture) = password_switch.captures(argument) {
            password = Some(capture[1].to_string());
        } else {
            extra.push(argument.as_str());
        }
    }

    match (username, password) {
        (Some(username), Some(password)) => Ok(ParsedArguments {
            credentials: Credentials::new(username, password),
            extra_arguments: extra.join(" "),
        }),
        _ => Err(anyhow::anyhow!("missing /username: or /password: switch")),
    }
}

fn print_usage() {
    println!(
        "Usage: skype-console-login <path to Skype.exe> /username:<username> /password:<password> [other Skype arguments]"
    );
}

/// Kills any pre-existing instance of the target so the login window is the
/// one we are about to create.
fn kill_running_instances(executable: &std::path::Path) {
    let Some(name) = executable.file_stem().and_then(|stem| stem.to_str()) else {
        return;
    };
    let system = sysinfo::System::new_all();
    for process in system.processes_by_name(name.as_ref()) {
        warn!(pid = process.pid().as_u32(), "killing pre-existing target instance");
        process.kill();
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}

#[cfg(target_os = "windows")]
fn attach_parent_console() {
    use windows::Win32::System::Console::{AttachConsole, ATTACH_PARENT_PROCESS};
    unsafe {
        let _ = AttachConsole(ATTACH_PARENT_PROCESS);
    }
}

#[cfg(not(target_os = "windows"))]
fn attach_parent_console() {}

#[cfg(target_os = "windows")]
fn free_console() {
    use windows::Win32::System::Console::FreeConsole;
    unsafe {
        let _ = FreeConsole();
    }
}

#[cfg(not(target_os = "windows"))]
fn free_console() {}
