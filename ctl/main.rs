#![forbid(unsafe_code)]

//! `session-board-ctl`: local CLI companion for `session-board`.
//!
//! Wraps a command so its session shows up on the board, prints the board
//! as text, and kills sessions on the operator's behalf.

use std::path::Path;
use std::process::ExitStatus;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

use session_board::api::client::{ApiClient, DEFAULT_TIMEOUT, DEFAULT_URL};
use session_board::board;
use session_board::models::session::{NewSession, SessionStatus};
use session_board::{AppError, GlobalConfig, Result};

/// Exit code reported when the wrapped command cannot be started.
const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

#[derive(Debug, Parser)]
#[command(
    name = "session-board-ctl",
    about = "Local CLI for the session-board server",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the control API.
    #[arg(long, env = "SESSION_BOARD_URL", default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the board.
    List {
        /// Print the raw session snapshot as JSON.
        #[arg(long)]
        json: bool,

        /// Use ASCII glyphs instead of Unicode box drawing.
        #[arg(long, env = "SESSION_BOARD_ASCII")]
        ascii: bool,
    },

    /// Kill a running session.
    Kill {
        /// Session ID.
        id: String,
    },

    /// Run a command as a tracked session.
    Run {
        /// Display name; defaults to the directory name plus git branch.
        #[arg(long)]
        name: Option<String>,

        /// Command and arguments to run.
        #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() {
    let args = Cli::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(dispatch(args)) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

async fn dispatch(args: Cli) -> Result<i32> {
    let client = ApiClient::new(&args.url, DEFAULT_TIMEOUT)?;
    match args.command {
        Command::List { json, ascii } => {
            let sessions = client.list().await.map_err(|err| unreachable_hint(err, &args.url))?;
            if json {
                let text = serde_json::to_string_pretty(&sessions)
                    .map_err(|err| AppError::Http(format!("cannot encode sessions: {err}")))?;
                println!("{text}");
            } else {
                let retention = GlobalConfig::default().retention();
                let view = board::build(&sessions, Utc::now(), retention);
                print!("{}", board::render_text(&view, ascii));
            }
            Ok(0)
        }
        Command::Kill { id } => {
            let session = client.kill(&id).await.map_err(|err| unreachable_hint(err, &args.url))?;
            println!("{} {}", session.id, session.status);
            Ok(0)
        }
        Command::Run { name, command } => Ok(run_wrapped(&client, name, &command).await),
    }
}

fn unreachable_hint(err: AppError, url: &str) -> AppError {
    match err {
        AppError::Http(msg) => AppError::Http(format!("{msg} (is session-board running at {url}?)")),
        other => other,
    }
}

/// Run `command` as a tracked session and return its exit code.
///
/// Every API call is best-effort: failures are logged and the command runs
/// regardless.
async fn run_wrapped(client: &ApiClient, name: Option<String>, command: &[String]) -> i32 {
    let Some((program, program_args)) = command.split_first() else {
        return SPAWN_FAILURE_EXIT_CODE;
    };

    let cwd = std::env::current_dir()
        .ok()
        .map(|dir| dir.to_string_lossy().into_owned());
    let name = match name {
        Some(name) => name,
        None => default_name(cwd.as_deref()).await,
    };
    let id = uuid::Uuid::new_v4().to_string();

    let registration = NewSession {
        id: id.clone(),
        name,
        shell_pid: Some(std::process::id()),
        cwd,
        hostname: sysinfo::System::host_name(),
    };
    if let Err(err) = client.register(&registration).await {
        warn!(%err, "could not register session, continuing untracked");
    } else if let Err(err) = client.set_status(&id, SessionStatus::Running, None).await {
        warn!(%err, "could not mark session running");
    }

    // Interrupts go to the wrapped command; the wrapper stays alive to report.
    let _interrupts = tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt forwarded to wrapped command");
        }
    });

    let outcome = tokio::process::Command::new(program)
        .args(program_args)
        .status()
        .await;

    let (status, exit_code) = match outcome {
        Ok(exit) => classify_exit(exit),
        Err(err) => {
            eprintln!("session-board-ctl: cannot run {program}: {err}");
            (SessionStatus::Failed, SPAWN_FAILURE_EXIT_CODE)
        }
    };

    if let Err(err) = client.set_status(&id, status, Some(exit_code)).await {
        warn!(%err, "could not report session exit");
    }
    exit_code
}

/// Map a child exit status to the terminal status and shell exit code.
fn classify_exit(exit: ExitStatus) -> (SessionStatus, i32) {
    if exit.success() {
        return (SessionStatus::Done, 0);
    }
    if let Some(code) = exit.code() {
        return (SessionStatus::Failed, code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = exit.signal() {
            return (SessionStatus::Failed, 128 + signal);
        }
    }
    (SessionStatus::Failed, 1)
}

/// `<dir>` or `<dir> (<branch>)` when `cwd` is inside a git work tree.
async fn default_name(cwd: Option<&str>) -> String {
    let dir = cwd
        .and_then(|cwd| Path::new(cwd).file_name())
        .map_or_else(|| "session".to_owned(), |name| name.to_string_lossy().into_owned());

    let mut git = tokio::process::Command::new("git");
    git.args(["rev-parse", "--abbrev-ref", "HEAD"])
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    if let Some(cwd) = cwd {
        git.current_dir(cwd);
    }

    match git.output().await {
        Ok(output) if output.status.success() => {
            let branch = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            if branch.is_empty() {
                dir
            } else {
                format!("{dir} ({branch})")
            }
        }
        _ => dir,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
