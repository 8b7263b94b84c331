//! Web proxy daemon supervisor
//!
//! Owns the child-process handle of the external web proxy: spawning,
//! waiting, signalling and stopping. Recent start timestamps are tracked in
//! a 10-second window so the controller can detect a crash loop.

use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::common::{AppError, Result};

/// Window over which daemon starts count as "rapid"
pub const RAPID_START_WINDOW: Duration = Duration::from_secs(10);

/// Result of a daemon exit
#[derive(Debug, Clone)]
pub struct DaemonExit {
    /// Process exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl DaemonExit {
    /// Whether the daemon exited cleanly
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Supervisor for one external daemon process
///
/// The child handle lives behind an async mutex: `wait()` holds it for the
/// duration of the wait, while `signal()` and `running()` only consult the
/// separately tracked pid. Cancelling a pending `wait()` releases the handle
/// without killing the child.
pub struct Supervisor {
    child: Mutex<Option<Child>>,
    pid: StdMutex<Option<i32>>,
    starts: StdMutex<Vec<Instant>>,
}

impl Supervisor {
    /// Create an idle supervisor
    pub fn new() -> Self {
        Self {
            child: Mutex::new(None),
            pid: StdMutex::new(None),
            starts: StdMutex::new(Vec::new()),
        }
    }

    /// Spawn the daemon
    ///
    /// Any previously running daemon is stopped first. The child gets no
    /// stdin; stdout and stderr are captured and returned by `wait()`.
    pub async fn start(&self, argv: &[String]) -> Result<()> {
        let (cmd, args) = argv
            .split_first()
            .ok_or_else(|| AppError::Proxy("empty daemon command line".to_string()))?;

        if self.running() {
            self.stop().await?;
        }

        debug!("Starting daemon: {}", argv.join(" "));
        let child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::Proxy(format!("failed to start {}: {}", cmd, e)))?;

        self.record_start();
        *self.pid.lock().unwrap() = child.id().map(|p| p as i32);
        *self.child.lock().await = Some(child);
        Ok(())
    }

    /// Wait for the daemon to exit
    ///
    /// Returns `None` when no daemon is running. The returned exit carries
    /// the captured stdout and stderr. This future is safe to cancel: the
    /// child keeps running and a later `wait()` picks it up again.
    pub async fn wait(&self) -> Result<Option<DaemonExit>> {
        let mut guard = self.child.lock().await;
        let Some(child) = guard.as_mut() else {
            return Ok(None);
        };

        let status = child.wait().await?;

        let mut child = guard.take().expect("child present while waiting");
        *self.pid.lock().unwrap() = None;

        let mut stdout = Vec::new();
        if let Some(mut pipe) = child.stdout.take() {
            let _ = pipe.read_to_end(&mut stdout).await;
        }
        let mut stderr = Vec::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_end(&mut stderr).await;
        }

        Ok(Some(DaemonExit {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }))
    }

    /// Forward a POSIX signal to the daemon
    ///
    /// Returns `false` when no daemon is running.
    pub fn signal(&self, sig: Signal) -> Result<bool> {
        let pid = *self.pid.lock().unwrap();
        let Some(pid) = pid else {
            return Ok(false);
        };
        match kill(Pid::from_raw(pid), sig) {
            Ok(()) => Ok(true),
            // The daemon exited between the pid read and the kill
            Err(nix::errno::Errno::ESRCH) => Ok(false),
            Err(e) => Err(AppError::Proxy(format!(
                "failed to send {} to pid {}: {}",
                sig, pid, e
            ))),
        }
    }

    /// Stop the daemon: send SIGTERM and wait for it to exit
    pub async fn stop(&self) -> Result<()> {
        if !self.signal(Signal::SIGTERM)? {
            return Ok(());
        }
        if let Some(exit) = self.wait().await? {
            debug!("Daemon stopped with code {:?}", exit.code);
        }
        Ok(())
    }

    /// Whether a daemon process is currently running
    pub fn running(&self) -> bool {
        self.pid.lock().unwrap().is_some()
    }

    /// Number of daemon starts within the rapid-start window
    pub fn rapid_start_count(&self) -> usize {
        let mut starts = self.starts.lock().unwrap();
        let now = Instant::now();
        starts.retain(|t| now.duration_since(*t) <= RAPID_START_WINDOW);
        starts.len()
    }

    fn record_start(&self) {
        let mut starts = self.starts.lock().unwrap();
        let now = Instant::now();
        starts.retain(|t| now.duration_since(*t) <= RAPID_START_WINDOW);
        starts.push(now);
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Filter a daemon command line through the daemon's own help output
///
/// Runs `<cmd> -h` and keeps only the `(flag, value)` pairs whose flag is
/// listed there, so variant daemon builds that lack a flag are still
/// startable. The returned vector starts with `cmd` itself.
pub async fn check_daemon_flags(cmd: &str, flags: &[(&str, Option<&str>)]) -> Vec<String> {
    let mut args = vec![cmd.to_string()];

    let output = match Command::new(cmd).arg("-h").output().await {
        Ok(output) if output.status.success() => output,
        Ok(_) => {
            warn!("{} -h exited with an error, passing no flags", cmd);
            return args;
        }
        Err(e) => {
            warn!("Failed to run {} -h: {}", cmd, e);
            return args;
        }
    };

    let help = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    for (flag, value) in flags {
        let supported = help.lines().map(str::trim).any(|line| {
            line.strip_prefix(flag)
                .and_then(|rest| rest.chars().next())
                .map(|c| c == ' ' || c == '\t')
                .unwrap_or(false)
        });
        if supported {
            args.push(flag.to_string());
            if let Some(value) = value {
                args.push(value.to_string());
            }
        } else {
            debug!("{} does not support flag {}", cmd, flag);
        }
    }

    args
}
