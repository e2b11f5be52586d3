//! `spamwire` - filter mail through the spamd scoring daemon
//!
//! Reads one message on stdin, has spamd score or rewrite it, and writes
//! the result to stdout. Exit codes follow `sysexits.h`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod config;
mod output;

use std::process::{ExitCode, ExitStatus};

use clap::Parser;
use spamwire_client::{
    Command, ConnectionManager, LoggingHook, MessageSession, Outcome, exit,
};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;
use config::{FileConfig, Settings};
use output::Sink;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "cannot start runtime");
            return ExitCode::from(exit::SOFTWARE);
        }
    };

    match runtime.block_on(run(&cli)) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(failure_code(&err))
        }
    }
}

fn init_logging(debug: bool) {
    let default = if debug {
        "spamwire=debug,spamwire_client=debug"
    } else {
        "spamwire=info,spamwire_client=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<u8> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let settings = Settings::merge(cli, file)?;
    debug!(?settings, "effective settings");

    let command = settings.session.command.clone();
    let connections = ConnectionManager::system(
        settings.transport,
        settings.session.tls.as_ref(),
        settings.session.connect_timeout,
    )?;
    let mut session = MessageSession::new(settings.session, connections).with_hook(LoggingHook);

    let mut sink = Sink::open(&settings.exec)?;
    let result = session
        .run(&mut tokio::io::stdin(), sink.writer())
        .await;
    let child = sink.finish().await?;

    let code = outcome_code(&command, &result?);
    Ok(child.map_or(code, |status| child_code(status, code)))
}

/// Exit code for a session that completed.
fn outcome_code(command: &Command, outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Filtered { .. } if matches!(command, Command::Check) && outcome.is_spam() => {
            exit::IS_SPAM
        }
        Outcome::Told(ack) if ack.changed_anything() => exit::TOLD,
        Outcome::Told(_) => exit::TOLD_UNCHANGED,
        Outcome::Filtered { .. } | Outcome::Pong | Outcome::TooBig | Outcome::Fallback { .. } => {
            exit::OK
        }
    }
}

/// A failing `-e` command's status replaces a successful session's code.
fn child_code(status: ExitStatus, code: u8) -> u8 {
    if status.success() {
        return code;
    }
    status
        .code()
        .and_then(|c| u8::try_from(c).ok())
        .unwrap_or(exit::SOFTWARE)
}

fn failure_code(err: &anyhow::Error) -> u8 {
    if let Some(err) = err.downcast_ref::<spamwire_client::Error>() {
        return err.exit_code();
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return exit::IOERR;
    }
    exit::CONFIG
}
