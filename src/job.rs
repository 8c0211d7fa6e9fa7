use itertools::Itertools;
use nix::{errno::Errno, unistd::Pid};
use strum::Display;
use thiserror::Error;

use crate::process::{
    child::{try_wait_pid, wait_pid, ChildState},
    status::ProcessStatus,
};

pub type JobId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum JobMode {
    Foreground,
    Background,
}

/// The processes of one pipeline invocation, in spawn order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub pids: Vec<Pid>,
    pub mode: JobMode,
}

impl Job {
    pub fn pid_list(&self) -> String {
        self.pids.iter().join(" ")
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no background job running")]
    NoBackgroundJob,
    #[error("interrupted")]
    Interrupted,
    #[error(transparent)]
    Wait(Errno),
}

impl From<Errno> for JobError {
    fn from(value: Errno) -> Self {
        match value {
            Errno::EINTR => Self::Interrupted,
            err => Self::Wait(err),
        }
    }
}

/// Jobs launched by this shell. Ids come from a counter and are never
/// handed out twice.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: JobId,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pids: Vec<Pid>, mode: JobMode) -> JobId {
        let id = self.next_id;
        self.next_id += 1;

        debug!(id, %mode, pids = %pids.iter().join(" "), "job added");
        self.jobs.push(Job { id, pids, mode });
        id
    }

    pub fn list(&self) -> &[Job] {
        &self.jobs
    }

    /// Blocks on every process of the newest background job, then drops it.
    /// An interrupt leaves the job in place.
    pub fn wait_most_recent_background(&mut self) -> Result<JobId, JobError> {
        let index = self
            .jobs
            .iter()
            .rposition(|job| job.mode == JobMode::Background)
            .ok_or(JobError::NoBackgroundJob)?;

        for pid in &self.jobs[index].pids {
            let state = wait_pid(*pid)?;
            trace!(%pid, ?state, "background process finished");
        }

        let job = self.jobs.remove(index);
        debug!(id = job.id, "job reaped");
        Ok(job.id)
    }

    /// Blocks on one process, whichever job it belongs to. No record is
    /// removed; the reap pass notices once the whole job is done.
    pub fn wait_specific(&self, pid: Pid) -> Result<Option<ProcessStatus>, JobError> {
        let state = wait_pid(pid)?;
        trace!(%pid, ?state, "process finished");
        Ok(state.status())
    }

    /// Drops jobs whose processes have all exited, without blocking.
    pub fn reap_finished(&mut self) -> Vec<JobId> {
        let mut finished = Vec::new();

        self.jobs.retain(|job| {
            // poll every pid so exited members get reaped even when a
            // sibling is still running
            let done = job
                .pids
                .iter()
                .map(|pid| match try_wait_pid(*pid) {
                    Ok(state) => state,
                    Err(err) => {
                        warn!(%pid, "failed to poll child: {err}");
                        ChildState::Running
                    }
                })
                .fold(true, |done, state| done && state.is_finished());

            if done {
                finished.push(job.id);
            }
            !done
        });

        if !finished.is_empty() {
            debug!(jobs = ?finished, "reaped finished jobs");
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn spawn(args: &[&str]) -> Pid {
        let child = Command::new(args[0]).args(&args[1..]).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    #[test]
    fn ids_are_never_reused() {
        let mut jobs = JobTable::new();
        let first = jobs.add(vec![spawn(&["true"])], JobMode::Background);
        assert_eq!(first, 0);
        assert_eq!(jobs.wait_most_recent_background().unwrap(), 0);
        assert!(jobs.list().is_empty());

        let second = jobs.add(vec![spawn(&["true"])], JobMode::Background);
        assert_eq!(second, 1);
        jobs.wait_most_recent_background().unwrap();
    }

    #[test]
    fn listing_is_stable() {
        let mut jobs = JobTable::new();
        jobs.add(vec![Pid::from_raw(1), Pid::from_raw(2)], JobMode::Background);
        jobs.add(vec![Pid::from_raw(3)], JobMode::Foreground);

        let first = jobs.list().to_vec();
        let second = jobs.list().to_vec();
        assert_eq!(first, second);
        assert_eq!(first[0].pid_list(), "1 2");
        assert_eq!(first[1].mode.to_string(), "foreground");
    }

    #[test]
    fn waits_on_newest_background_job() {
        let mut jobs = JobTable::new();
        let older = jobs.add(vec![spawn(&["sleep", "0.1"])], JobMode::Background);
        let newer = jobs.add(
            vec![spawn(&["true"]), spawn(&["sh", "-c", "exit 4"])],
            JobMode::Background,
        );

        assert_eq!(jobs.wait_most_recent_background().unwrap(), newer);
        assert_eq!(jobs.list().len(), 1);
        assert_eq!(jobs.wait_most_recent_background().unwrap(), older);
        assert!(matches!(
            jobs.wait_most_recent_background(),
            Err(JobError::NoBackgroundJob)
        ));
    }

    #[test]
    fn foreground_records_are_not_waited_by_fg() {
        let mut jobs = JobTable::new();
        jobs.add(vec![Pid::from_raw(1)], JobMode::Foreground);
        assert!(matches!(
            jobs.wait_most_recent_background(),
            Err(JobError::NoBackgroundJob)
        ));
    }

    #[test]
    fn already_reaped_children_are_tolerated() {
        let mut jobs = JobTable::new();
        let pid = spawn(&["true"]);
        wait_pid(pid).unwrap();

        jobs.add(vec![pid], JobMode::Background);
        assert!(jobs.wait_most_recent_background().is_ok());
    }

    #[test]
    fn wait_specific_keeps_the_record() {
        let mut jobs = JobTable::new();
        let pid = spawn(&["sh", "-c", "exit 2"]);
        jobs.add(vec![pid], JobMode::Background);

        assert_eq!(
            jobs.wait_specific(pid).unwrap(),
            Some(ProcessStatus::Exited(2))
        );
        assert_eq!(jobs.list().len(), 1);

        assert_eq!(jobs.reap_finished(), vec![0]);
        assert!(jobs.list().is_empty());
    }

    #[test]
    fn reap_leaves_running_jobs() {
        let mut jobs = JobTable::new();
        let sleeper = spawn(&["sleep", "30"]);
        let id = jobs.add(vec![sleeper], JobMode::Background);

        assert!(jobs.reap_finished().is_empty());
        assert_eq!(jobs.list()[0].id, id);

        nix::sys::signal::kill(sleeper, nix::sys::signal::Signal::SIGKILL).unwrap();
        wait_pid(sleeper).unwrap();
        assert_eq!(jobs.reap_finished(), vec![id]);
    }
}
