use nix::{
    errno::Errno,
    sys::{
        signal::{kill, Signal},
        wait::{waitpid, WaitPidFlag},
    },
    unistd::Pid,
};

use super::status::ProcessStatus;

/// What a wait on one process id found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Running,
    Exited(ProcessStatus),
    /// Not our child (any more): already reaped elsewhere, or never existed.
    Gone,
}

impl ChildState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn status(&self) -> Option<ProcessStatus> {
        match self {
            Self::Exited(status) => Some(*status),
            _ => None,
        }
    }
}

/// Blocks until `pid` terminates. `ECHILD` is reported as [`ChildState::Gone`];
/// `EINTR` is returned to the caller so an interrupt can abandon the wait.
pub fn wait_pid(pid: Pid) -> nix::Result<ChildState> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(status) = ProcessStatus::from_wait_status(status) {
                    break Ok(ChildState::Exited(status));
                }
                // stop/continue notifications, keep waiting
            }
            Err(Errno::ECHILD) => break Ok(ChildState::Gone),
            Err(err) => break Err(err),
        }
    }
}

/// Non-blocking variant of [`wait_pid`].
pub fn try_wait_pid(pid: Pid) -> nix::Result<ChildState> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => Ok(ProcessStatus::from_wait_status(status)
            .map(ChildState::Exited)
            .unwrap_or(ChildState::Running)),
        Err(Errno::ECHILD) => Ok(ChildState::Gone),
        Err(Errno::EINTR) => Ok(ChildState::Running),
        Err(err) => Err(err),
    }
}

/// A process spawned for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProcess {
    pid: Pid,
    program: String,
}

impl ChildProcess {
    pub fn new(pid: Pid, program: impl Into<String>) -> Self {
        Self {
            pid,
            program: program.into(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn wait(&self) -> nix::Result<ChildState> {
        wait_pid(self.pid)
    }

    pub fn signal(&self, signal: Signal) -> nix::Result<()> {
        match kill(self.pid, signal) {
            // exited and reaped already
            Err(Errno::ESRCH) => Ok(()),
            res => res,
        }
    }

    /// SIGKILL and reap. Used while unwinding a pipeline that failed to start.
    pub fn terminate(&self) {
        if let Err(err) = self.signal(Signal::SIGKILL) {
            warn!(pid = %self.pid, program = %self.program, "failed to kill child: {err}");
        }
        loop {
            match self.wait() {
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    warn!(pid = %self.pid, "failed to reap child: {err}");
                    break;
                }
                Ok(_) => break,
            }
        }
    }
}
