use std::io::Write;

use crate::job::JobTable;

use super::{BuiltinCommand, BuiltinError, Flow};

#[derive(Debug, Default)]
pub struct Jobs;

impl BuiltinCommand for Jobs {
    fn name(&self) -> &'static str {
        "jobs"
    }

    fn execute(
        &self,
        args: &[String],
        jobs: &mut JobTable,
        out: &mut dyn Write,
    ) -> Result<Flow, BuiltinError> {
        if !args.is_empty() {
            return Err(BuiltinError::TooManyArguments);
        }

        for job in jobs.list() {
            writeln!(out, "[{}] pid(s): {}", job.id, job.pid_list())?;
        }

        Ok(Flow::Continue)
    }
}
