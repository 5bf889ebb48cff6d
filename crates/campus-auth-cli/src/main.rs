//! campus - terminal shell for the campus portal session.
//!
//! Signs in, restores the stored session, and sends authorized requests
//! through the same pipeline the portal pages use.

mod commands;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Shell;

const USAGE: &str = "\
Usage: campus <command> [args]

Commands:
  status                          Restore the stored session and show it
  login [email]                   Sign in (password is prompted)
  logout                          Forget the stored session
  whoami                          Re-fetch and print the signed-in profile
  get <path>                      Authorized GET, e.g. `campus get /courses`
  register <name> <email> <role> [department_id] [student_number]
  verify-email <token>
  forgot-password <email>
  reset-password <token>          New password is prompted
";

/// Initialize the tracing subscriber for logging.
///
/// RUST_LOG controls the level (default `warn`). When CAMPUS_LOG_DIR is set
/// logs also go to a daily file there; the returned guard flushes it.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("CAMPUS_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "campus.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprint!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    info!(command = %command, "campus starting");
    let mut shell = Shell::new()?;

    match command.as_str() {
        "status" => shell.status().await,
        "login" => shell.login(rest.first().map(String::as_str)).await,
        "logout" => shell.logout(),
        "whoami" => shell.whoami().await,
        "get" => match rest.first() {
            Some(path) => shell.get(path).await,
            None => usage_error("get needs a path"),
        },
        "register" => shell.register(rest).await,
        "verify-email" => match rest.first() {
            Some(token) => shell.verify_email(token).await,
            None => usage_error("verify-email needs a token"),
        },
        "forgot-password" => match rest.first() {
            Some(email) => shell.forgot_password(email).await,
            None => usage_error("forgot-password needs an email"),
        },
        "reset-password" => match rest.first() {
            Some(token) => shell.reset_password(token).await,
            None => usage_error("reset-password needs a token"),
        },
        "help" | "--help" | "-h" => {
            print!("{}", USAGE);
            Ok(())
        }
        other => usage_error(&format!("unknown command `{}`", other)),
    }
}

fn usage_error(message: &str) -> Result<()> {
    eprint!("{}", USAGE);
    Err(anyhow::anyhow!("{}", message))
}
