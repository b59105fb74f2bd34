//! Helper process supervision
//!
//! Spawns a server with piped stdio, drains its stderr into the log and
//! publishes its exit on a watch channel so nobody has to poll.

use crate::config::ServerConfig;
use crate::types::RpcError;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How a helper process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// A running helper process.
///
/// The child itself is owned by a monitor task; the handle keeps the pipes
/// until they are taken, a kill switch, and the exit signal. Dropping the
/// handle kills the child.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    /// Spawn `config.command` with `config.env` merged over the current
    /// environment.
    pub fn spawn(config: &ServerConfig) -> Result<Self, RpcError> {
        info!("Spawning server '{}': {} {:?}", config.name, config.command, config.args);

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            RpcError::Transport(format!(
                "Failed to spawn '{}' for server '{}': {}",
                config.command, config.name, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::Transport("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::Transport("Failed to get stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(config.name.clone(), stderr));
        }

        let pid = child.id();
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let name = config.name.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                // Fires on an explicit kill or when the handle is dropped
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        debug!("Kill of '{}' failed: {}", name, e);
                    }
                    child.wait().await
                }
            };

            let exit = match status {
                Ok(status) => ProcessExit::from(status),
                Err(e) => {
                    warn!("Failed to reap server '{}': {}", name, e);
                    ProcessExit { code: None }
                }
            };
            debug!("Server '{}' exited: {}", name, exit);
            let _ = exit_tx.send(Some(exit));
        });

        Ok(Self {
            name: config.name.clone(),
            pid,
            stdin: Some(stdin),
            stdout: Some(stdout),
            exit_rx,
            kill_tx: Some(kill_tx),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Liveness signal: becomes `Some` once the process has exited.
    pub fn exit_signal(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    pub async fn wait(&self) -> Result<ProcessExit, RpcError> {
        let mut rx = self.exit_rx.clone();
        let exit = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| RpcError::Transport(format!("monitor for '{}' went away", self.name)))?;
        Ok(exit.unwrap_or(ProcessExit { code: None }))
    }

    /// Close stdin and give the process `grace` to leave on its own, then
    /// force-kill it.
    pub async fn terminate(mut self, grace: Duration) -> Result<ProcessExit, RpcError> {
        drop(self.stdin.take());

        if let Ok(result) = timeout(grace, self.wait()).await {
            return result;
        }

        warn!(
            "Server '{}' did not exit within {:?}; killing it",
            self.name, grace
        );
        if let Some(kill) = self.kill_tx.take() {
            let _ = kill.send(());
        }
        self.wait().await
    }
}

async fn drain_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "toolbridge::stderr", server = %name, "{}", line);
    }
}
