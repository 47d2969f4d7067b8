//! Launching and supervising the target process.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::errors::LoginError;
use crate::request::LaunchRequest;

/// A running target process. Liveness is observed through a one-way flag set
/// by the background exit watcher; the login flow never mutates it.
#[derive(Debug)]
pub struct SupervisedProcess {
    pid: u32,
    exited: Arc<AtomicBool>,
}

impl SupervisedProcess {
    pub(crate) fn from_parts(pid: u32, exited: Arc<AtomicBool>) -> Self {
        Self { pid, exited }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True once the process has terminated for any reason. Never true while
    /// the process is still running.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }
}

/// Seam between the login flow and the OS process table.
pub trait ProcessSupervisor: Send + Sync {
    /// Launches one target process and one background exit watcher. The
    /// watcher signals `cancel` when the process terminates; the token itself
    /// ignores the signal while disarmed.
    fn start(
        &self,
        request: &LaunchRequest,
        cancel: &CancelToken,
    ) -> Result<SupervisedProcess, LoginError>;
}

/// Supervisor backed by `std::process`.
pub struct SystemSupervisor;

impl ProcessSupervisor for SystemSupervisor {
    fn start(
        &self,
        request: &LaunchRequest,
        cancel: &CancelToken,
    ) -> Result<SupervisedProcess, LoginError> {
        let arguments = request.composed_arguments();
        debug!(executable = %request.executable().display(), %arguments, "starting target process");

        let mut command = Command::new(request.executable());
        // The target parses its own command line, so it receives the composed
        // string verbatim rather than pre-split arguments.
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.raw_arg(&arguments);
        }
        #[cfg(not(windows))]
        {
            command.args(arguments.split_whitespace());
        }

        let mut child = command.spawn().map_err(|source| LoginError::Launch {
            path: request.executable().to_path_buf(),
            source,
        })?;

        let pid = child.id();
        let exited = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&exited);
        let token = cancel.clone();
        let watcher = thread::Builder::new()
            .name(format!("exit-watcher-{pid}"))
            .spawn(move || {
                let _ = child.wait();
                flag.store(true, Ordering::SeqCst);
                // Honored only while the flow has armed the token; a
                // premature exit is a restart condition instead.
                if token.cancel() {
                    warn!(pid, "target process exited; cancelling login attempt");
                } else {
                    debug!(pid, "target process exited before cancellation was armed");
                }
            });
        if let Err(error) = watcher {
            warn!(pid, %error, "failed to spawn exit watcher");
        }

        debug!(pid, "target process started");
        Ok(SupervisedProcess { pid, exited })
    }
}
