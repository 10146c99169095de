//! shellbridge - run commands in a persistent shell from stdin
//!
//! Each input line is executed in the shell and its captured output is
//! printed. Lines starting with `:` control the session instead.

use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use shellbridge::{Error, ExecuteOptions, SessionEvent, ShellSessionManager};

/// Command line options
#[derive(Debug, Default)]
struct AppArgs {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Shell program overriding the configuration
    shell: Option<PathBuf>,
    /// Per-command completion timeout in seconds
    timeout: Option<u64>,
    /// Enable debug logging
    debug: bool,
}

impl AppArgs {
    /// Parse command line arguments
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = env::args().collect();
        let mut app_args = AppArgs::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    let Some(path) = args.get(i + 1) else {
                        bail!("Missing config file path");
                    };
                    app_args.config_path = Some(PathBuf::from(path));
                    i += 1;
                }
                "--shell" | "-s" => {
                    let Some(path) = args.get(i + 1) else {
                        bail!("Missing shell path");
                    };
                    app_args.shell = Some(PathBuf::from(path));
                    i += 1;
                }
                "--timeout" | "-t" => {
                    let Some(secs) = args.get(i + 1) else {
                        bail!("Missing timeout");
                    };
                    app_args.timeout = Some(secs.parse().context("Invalid timeout")?);
                    i += 1;
                }
                "--debug" | "-d" => {
                    app_args.debug = true;
                }
                "--help" | "-h" => {
                    print_help();
                    process::exit(0);
                }
                "--version" | "-v" => {
                    println!("shellbridge v{}", shellbridge::VERSION);
                    process::exit(0);
                }
                arg => bail!("Unknown option: {}", arg),
            }
            i += 1;
        }

        Ok(app_args)
    }
}

/// Print help information
fn print_help() {
    println!("shellbridge - run commands in a persistent interactive shell");
    println!();
    println!("USAGE:");
    println!("    shellbridge [OPTIONS] < commands");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <PATH>    Path to configuration file");
    println!("    -s, --shell <PATH>     Shell to run (default: $SHELL)");
    println!("    -t, --timeout <SECS>   Give up waiting for a command after SECS");
    println!("    -d, --debug            Enable debug logging");
    println!("    -h, --help             Print this help message");
    println!("    -v, --version          Print version information");
    println!();
    println!("COMMANDS:");
    println!("    :interrupt             Interrupt the running command");
    println!("    :pwd                   Print the shell's working directory");
    println!("    :cd <PATH>             Change the shell's working directory");
    println!("    :bg <COMMAND>          Start a command without waiting for it");
    println!("    :quit                  Close the shell and exit");
    println!();
    println!("ENVIRONMENT:");
    println!("    SHELLBRIDGE_DEBUG      Enable debug logging (1 or true)");
    println!("    RUST_LOG               Set logging level (error, warn, info, debug, trace)");
}

#[tokio::main]
async fn main() {
    let args = AppArgs::parse().unwrap_or_else(|e| {
        eprintln!("{}", e);
        print_help();
        process::exit(2);
    });

    init_logging(args.debug);

    if let Err(e) = run(args).await {
        match e.downcast_ref::<Error>() {
            Some(err) => eprintln!("{}", shellbridge::handle_startup_error(err)),
            None => error!("{:#}", e),
        }
        process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let debug_env = env::var("SHELLBRIDGE_DEBUG")
        .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let log_level = if debug || debug_env { "debug" } else { "info" };

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn run(args: AppArgs) -> anyhow::Result<()> {
    let mut config = match &args.config_path {
        Some(path) => shellbridge::init_with_config(path)?,
        None => shellbridge::init()?,
    };
    if let Some(shell) = args.shell {
        config.shell.program = Some(shell);
    }

    let manager = ShellSessionManager::with_pty(config);
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Notice { message } => warn!("{}", message),
                SessionEvent::Exited => info!("Shell exited"),
                SessionEvent::StateChanged { state } => debug!("Session state: {:?}", state),
                SessionEvent::Output { .. } => {}
            }
        }
    });

    manager.create_shell_session().await?;
    info!("Shell ready ({})", manager.shell_type());

    let options = ExecuteOptions {
        timeout: args.timeout.map(Duration::from_secs),
        ..ExecuteOptions::default()
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match line.split_once(' ').unwrap_or((line, "")) {
            (":quit", _) => break,
            (":interrupt", _) => manager.interrupt_shell_session().await.map(|()| String::new()),
            (":pwd", _) => manager
                .get_current_directory()
                .await
                .map(|cwd| cwd.display().to_string()),
            (":cd", path) => manager
                .navigate_to_directory(Path::new(path.trim()))
                .await
                .map(|cwd| cwd.display().to_string()),
            (":bg", command) => {
                manager
                    .execute_shell_command(command, ExecuteOptions::background())
                    .await
            }
            _ => manager.execute_shell_command(line, options.clone()).await,
        };

        match result {
            Ok(output) if output.is_empty() => {}
            Ok(output) => println!("{}", output),
            Err(e) if e.is_recoverable() || matches!(e, Error::EmptyCommand) => warn!("{}", e),
            Err(e) => {
                manager.close_shell_session().await?;
                return Err(e.into());
            }
        }
    }

    manager.close_shell_session().await?;
    Ok(())
}
