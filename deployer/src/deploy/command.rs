//! External command execution
//!
//! The stack deploy command is a child process whose output lines are the only
//! progress feedback and whose exit code is the only completion signal.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error, warn};

use crate::errors::DeployerError;

/// Output of a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// One line of stdout or stderr, as it arrived
    Line(String),
    /// Process exit; always the last item
    Exited(i32),
}

/// Spawns external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Start `program` with `args` in `cwd`, streaming its output
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<Receiver<CommandOutput>, DeployerError>;
}

/// Runs commands as OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

async fn forward_lines<R>(reader: R, tx: Sender<CommandOutput>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(CommandOutput::Line(line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read command output: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<Receiver<CommandOutput>, DeployerError> {
        debug!("Running {} {} in {}", program, args.join(" "), cwd.display());

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (tx, rx) = mpsc::channel(64);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let program = program.to_string();

        tokio::spawn(async move {
            let out = stdout.map(|s| tokio::spawn(forward_lines(s, tx.clone())));
            let err = stderr.map(|s| tokio::spawn(forward_lines(s, tx.clone())));

            let status = tokio::select! {
                status = child.wait() => status,
                _ = tx.closed() => {
                    warn!("Output of {} no longer consumed, killing it", program);
                    if let Err(e) = child.kill().await {
                        error!("Failed to kill {}: {}", program, e);
                    }
                    return;
                }
            };

            // drain output before reporting the exit
            for handle in [out, err].into_iter().flatten() {
                let _ = handle.await;
            }

            let code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    error!("Failed to wait for {}: {}", program, e);
                    -1
                }
            };
            let _ = tx.send(CommandOutput::Exited(code)).await;
        });

        Ok(rx)
    }
}

/// One recorded call to a [`ScriptedRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// Replays canned output instead of starting processes
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    lines: Vec<String>,
    exit_code: i32,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(lines: &[&str], exit_code: i32) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit_code,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far
    pub fn invocations(&self) -> Vec<Invocation> {
        match self.invocations.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn spawn(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<Receiver<CommandOutput>, DeployerError> {
        let invocation = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        };
        match self.invocations.lock() {
            Ok(mut guard) => guard.push(invocation),
            Err(poisoned) => poisoned.into_inner().push(invocation),
        }

        let (tx, rx) = mpsc::channel(self.lines.len() + 1);
        for line in &self.lines {
            let _ = tx.try_send(CommandOutput::Line(line.clone()));
        }
        let _ = tx.try_send(CommandOutput::Exited(self.exit_code));
        Ok(rx)
    }
}
