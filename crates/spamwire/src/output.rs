//! Where the filtered message goes.

use std::process::{ExitStatus, Stdio};

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::process::{Child, ChildStdin};

/// Output sink: stdout, or the stdin of a child process.
#[derive(Debug)]
pub enum Sink {
    /// Standard output.
    Stdout(Stdout),
    /// A spawned `-e` command.
    Pipe {
        /// The running command.
        child: Child,
        /// Its standard input.
        stdin: ChildStdin,
    },
}

impl Sink {
    /// Opens stdout when `exec` is empty, otherwise spawns `exec`.
    pub fn open(exec: &[String]) -> anyhow::Result<Self> {
        let Some((program, args)) = exec.split_first() else {
            return Ok(Self::Stdout(tokio::io::stdout()));
        };
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("cannot run {program}"))?;
        let stdin = child
            .stdin
            .take()
            .context("child process has no stdin")?;
        tracing::debug!(%program, "piping output to command");
        Ok(Self::Pipe { child, stdin })
    }

    /// The writer to hand to the session.
    pub fn writer(&mut self) -> &mut (dyn AsyncWrite + Unpin + Send) {
        match self {
            Self::Stdout(stdout) => stdout,
            Self::Pipe { stdin, .. } => stdin,
        }
    }

    /// Flushes stdout, or closes the child's stdin and waits for it.
    pub async fn finish(self) -> anyhow::Result<Option<ExitStatus>> {
        match self {
            Self::Stdout(mut stdout) => {
                stdout.flush().await?;
                Ok(None)
            }
            Self::Pipe { mut child, stdin } => {
                drop(stdin);
                let status = child.wait().await.context("waiting for output command")?;
                Ok(Some(status))
            }
        }
    }
}
