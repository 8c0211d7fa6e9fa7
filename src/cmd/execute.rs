use std::os::fd::{AsRawFd, OwnedFd};

use itertools::Itertools;
use libc::c_char;
use nix::{
    errno::Errno,
    unistd::{fork, read, write, ForkResult, Pid},
};
use thiserror::Error;

use super::execution_plan::{ExecutionPlan, StagePlan};
use crate::{
    job::{JobId, JobMode, JobTable},
    process::{
        child::{ChildProcess, ChildState},
        install, Pipe, StdStream,
    },
    signal,
};

#[derive(Debug, Error)]
pub enum SetupErrorKind {
    #[error("failed to create pipe: {0}")]
    Pipe(Errno),
    #[error("failed to fork: {0}")]
    Fork(Errno),
    #[error("failed to read child status: {0}")]
    Status(Errno),
    #[error("failed to connect {stream:?}: {errno}")]
    Wire { stream: StdStream, errno: Errno },
    #[error("{path}: {errno}")]
    Redirect { path: String, errno: Errno },
}

/// A pipeline that could not be started. Every process already spawned for
/// it has been killed and reaped by the time this is returned.
#[derive(Debug, Error)]
#[error("{program}: {kind}")]
pub struct SetupError {
    pub program: String,
    pub kind: SetupErrorKind,
    /// Stages that were already running and got killed.
    pub killed: Vec<Pid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Foreground pipeline ran to completion; one state per stage.
    Completed(Vec<ChildState>),
    Background(JobId),
    /// Foreground wait abandoned by an interrupt; the pipeline now lives in
    /// the job table.
    Interrupted(JobId),
}

/// Processes of a pipeline whose stages have all been started.
#[derive(Debug)]
pub struct SpawnedPipeline {
    pub children: Vec<ChildProcess>,
    /// Link pipes created. Per-stage status pipes are not counted.
    pub pipes: usize,
}

/// What a child reports through its status pipe when it fails before exec.
/// Fixed size so the child can encode it without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildFailure {
    Wire { stream: StdStream, errno: Errno },
    Redirect { index: usize, errno: Errno },
}

const REPORT_LEN: usize = 12;

impl ChildFailure {
    fn encode(self) -> [u8; REPORT_LEN] {
        let (tag, arg, errno) = match self {
            Self::Wire { stream, errno } => (0i32, stream.fd(), errno),
            Self::Redirect { index, errno } => (1i32, index as i32, errno),
        };

        let mut buf = [0u8; REPORT_LEN];
        buf[0..4].copy_from_slice(&tag.to_ne_bytes());
        buf[4..8].copy_from_slice(&arg.to_ne_bytes());
        buf[8..12].copy_from_slice(&(errno as i32).to_ne_bytes());
        buf
    }

    fn decode(buf: &[u8; REPORT_LEN]) -> Option<Self> {
        let field = |at: usize| i32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let errno = Errno::from_i32(field(8));

        match field(0) {
            0 => Some(Self::Wire {
                stream: StdStream::from_fd(field(4))?,
                errno,
            }),
            1 => Some(Self::Redirect {
                index: usize::try_from(field(4)).ok()?,
                errno,
            }),
            _ => None,
        }
    }

    fn into_kind(self, stage: &StagePlan) -> SetupErrorKind {
        match self {
            Self::Wire { stream, errno } => SetupErrorKind::Wire { stream, errno },
            Self::Redirect { index, errno } => SetupErrorKind::Redirect {
                path: stage
                    .redirections
                    .get(index)
                    .map(|r| r.path.clone())
                    .unwrap_or_default(),
                errno,
            },
        }
    }
}

impl ExecutionPlan {
    /// Starts the pipeline. Foreground pipelines are waited on here;
    /// background ones are registered in `jobs` and left running.
    pub fn execute(&self, jobs: &mut JobTable) -> Result<Launch, SetupError> {
        let spawned = self.spawn()?;
        let pids = spawned.children.iter().map(ChildProcess::pid).collect_vec();

        if !self.foreground {
            let id = jobs.add(pids, JobMode::Background);
            return Ok(Launch::Background(id));
        }

        let mut states = Vec::with_capacity(spawned.children.len());
        for child in &spawned.children {
            match child.wait() {
                Ok(state) => {
                    trace!(pid = %child.pid(), program = child.program(), ?state, "stage finished");
                    states.push(state);
                }
                Err(Errno::EINTR) => {
                    debug!(pipeline = %self.describe(), "foreground wait interrupted");
                    let id = jobs.add(pids, JobMode::Background);
                    return Ok(Launch::Interrupted(id));
                }
                Err(errno) => {
                    warn!(pid = %child.pid(), "wait failed: {errno}");
                    states.push(ChildState::Gone);
                }
            }
        }

        Ok(Launch::Completed(states))
    }

    /// Forks one process per stage, wired together by pipes. On any failure
    /// the stages already started are killed before the error is returned.
    pub fn spawn(&self) -> Result<SpawnedPipeline, SetupError> {
        debug!(
            pipeline = %self.describe(),
            links = self.links(),
            foreground = self.foreground,
            "spawning pipeline"
        );

        let mut spawned = SpawnedPipeline {
            children: Vec::with_capacity(self.stages.len()),
            pipes: 0,
        };
        let mut previous: Option<Pipe> = None;

        for (index, stage) in self.stages.iter().enumerate() {
            if let Err(kind) = self.spawn_stage(index, stage, &mut previous, &mut spawned) {
                warn!(program = %stage.program, "pipeline setup failed: {kind}");
                terminate(&spawned.children);
                return Err(SetupError {
                    program: stage.program.clone(),
                    kind,
                    killed: spawned.children.iter().map(ChildProcess::pid).collect(),
                });
            }
        }

        Ok(spawned)
    }

    fn spawn_stage(
        &self,
        index: usize,
        stage: &StagePlan,
        previous: &mut Option<Pipe>,
        spawned: &mut SpawnedPipeline,
    ) -> Result<(), SetupErrorKind> {
        let next = if index + 1 < self.stages.len() {
            let link = Pipe::new().map_err(SetupErrorKind::Pipe)?;
            spawned.pipes += 1;
            Some(link)
        } else {
            None
        };
        let status = Pipe::new().map_err(SetupErrorKind::Pipe)?;
        let argv = stage.argv_ptrs();

        // SAFETY: the child only makes raw syscalls until it execs or exits
        match unsafe { fork() }.map_err(SetupErrorKind::Fork)? {
            ForkResult::Child => exec_stage(stage, &argv, previous.take(), next, status.write),
            ForkResult::Parent { child } => {
                trace!(index, pid = %child, program = %stage.program, "forked stage");
                spawned
                    .children
                    .push(ChildProcess::new(child, stage.program.clone()));

                // the children own their copies now
                drop(status.write);
                drop(previous.take());

                if let Some(failure) = read_report(status.read).map_err(SetupErrorKind::Status)? {
                    return Err(failure.into_kind(stage));
                }

                *previous = next;
                Ok(())
            }
        }
    }
}

fn terminate(children: &[ChildProcess]) {
    for child in children {
        debug!(pid = %child.pid(), program = child.program(), "killing stage");
        child.terminate();
    }
}

/// Reads the child's status pipe until the child execs (EOF, nothing
/// written) or reports a failure.
fn read_report(fd: OwnedFd) -> nix::Result<Option<ChildFailure>> {
    let mut buf = [0u8; REPORT_LEN];
    let mut filled = 0;

    while filled < REPORT_LEN {
        match read(fd.as_raw_fd(), &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(Errno::EINTR) => continue,
            Err(err) => return Err(err),
        }
    }

    if filled < REPORT_LEN {
        return Ok(None);
    }
    Ok(ChildFailure::decode(&buf))
}

/// Child side of a stage. Never returns: the process either becomes the
/// stage's program or exits.
fn exec_stage(
    stage: &StagePlan,
    argv: &[*const c_char],
    previous: Option<Pipe>,
    next: Option<Pipe>,
    status: OwnedFd,
) -> ! {
    signal::restore_defaults();

    if let Err(failure) = wire_stage(stage, previous, next) {
        let report = failure.encode();
        let _ = write(status.as_raw_fd(), &report);
        exit_child(1);
    }

    // SAFETY: argv is null-terminated and points into `stage`, which is alive
    unsafe { libc::execvp(argv[0], argv.as_ptr()) };
    let errno = Errno::last();

    let stderr = StdStream::Stderr.fd();
    let message: [&[u8]; 4] = [
        stage.program.as_bytes(),
        b": ",
        errno.desc().as_bytes(),
        b"\n",
    ];
    for part in message {
        let _ = write(stderr, part);
    }
    exit_child(if errno == Errno::ENOENT { 127 } else { 126 })
}

/// Pipe wiring first, then the stage's own redirections on top.
fn wire_stage(
    stage: &StagePlan,
    previous: Option<Pipe>,
    next: Option<Pipe>,
) -> Result<(), ChildFailure> {
    if let Some(link) = next {
        drop(link.read);
        install(link.write, StdStream::Stdout).map_err(|errno| ChildFailure::Wire {
            stream: StdStream::Stdout,
            errno,
        })?;
    }

    if let Some(link) = previous {
        drop(link.write);
        install(link.read, StdStream::Stdin).map_err(|errno| ChildFailure::Wire {
            stream: StdStream::Stdin,
            errno,
        })?;
    }

    for (index, redirection) in stage.redirections.iter().enumerate() {
        redirection
            .apply()
            .map_err(|errno| ChildFailure::Redirect { index, errno })?;
    }

    Ok(())
}

fn exit_child(code: i32) -> ! {
    // SAFETY: skips atexit handlers and buffered stdio inherited from the shell
    unsafe { libc::_exit(code) }
}
