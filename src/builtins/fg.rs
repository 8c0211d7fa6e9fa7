use std::io::Write;

use nix::unistd::Pid;

use crate::job::{JobError, JobMode, JobTable};

use super::{BuiltinCommand, BuiltinError, Flow};

/// `fg` waits for the newest background job; `fg <pid>` for one process.
#[derive(Debug, Default)]
pub struct Fg;

impl BuiltinCommand for Fg {
    fn name(&self) -> &'static str {
        "fg"
    }

    fn execute(
        &self,
        args: &[String],
        jobs: &mut JobTable,
        _out: &mut dyn Write,
    ) -> Result<Flow, BuiltinError> {
        if !jobs.list().iter().any(|job| job.mode == JobMode::Background) {
            return Err(JobError::NoBackgroundJob.into());
        }

        match args {
            [] => {
                let id = jobs.wait_most_recent_background()?;
                debug!(id, "job brought to foreground and finished");
            }
            [pid] => {
                let pid = pid
                    .parse::<i32>()
                    .ok()
                    .filter(|pid| *pid > 0)
                    .ok_or(BuiltinError::InvalidPid)?;
                let status = jobs.wait_specific(Pid::from_raw(pid))?;
                debug!(pid, ?status, "process brought to foreground and finished");
            }
            _ => return Err(BuiltinError::TooManyArguments),
        }

        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn fg(args: &[&str], jobs: &mut JobTable) -> Result<Flow, BuiltinError> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        Fg.execute(&args, jobs, &mut Vec::new())
    }

    fn spawn(args: &[&str]) -> Pid {
        let child = Command::new(args[0]).args(&args[1..]).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    #[test]
    fn nothing_to_bring_back() {
        let err = fg(&[], &mut JobTable::new()).unwrap_err();
        assert_eq!(err.to_string(), "no background job running");
    }

    #[test]
    fn waits_for_latest_job() {
        let mut jobs = JobTable::new();
        jobs.add(vec![spawn(&["sleep", "0.1"])], JobMode::Background);

        assert_eq!(fg(&[], &mut jobs).unwrap(), Flow::Continue);
        assert!(jobs.list().is_empty());
    }

    #[test]
    fn waits_for_one_pid_and_keeps_the_job() {
        let mut jobs = JobTable::new();
        let pid = spawn(&["true"]);
        jobs.add(vec![pid], JobMode::Background);

        fg(&[pid.to_string().as_str()], &mut jobs).unwrap();
        assert_eq!(jobs.list().len(), 1);
        assert_eq!(jobs.reap_finished(), vec![0]);
    }

    #[test]
    fn usage_errors() {
        let mut jobs = JobTable::new();
        let pid = spawn(&["true"]);
        jobs.add(vec![pid], JobMode::Background);

        assert!(matches!(fg(&["nope"], &mut jobs), Err(BuiltinError::InvalidPid)));
        assert!(matches!(fg(&["0"], &mut jobs), Err(BuiltinError::InvalidPid)));
        assert!(matches!(
            fg(&["1", "2"], &mut jobs),
            Err(BuiltinError::TooManyArguments)
        ));

        jobs.wait_most_recent_background().unwrap();
    }
}
