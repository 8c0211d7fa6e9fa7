use std::io::Write;

use crate::job::JobTable;

use super::{BuiltinCommand, BuiltinError, Flow};

#[derive(Debug, Default)]
pub struct Exit;

impl BuiltinCommand for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn execute(
        &self,
        args: &[String],
        _jobs: &mut JobTable,
        _out: &mut dyn Write,
    ) -> Result<Flow, BuiltinError> {
        match args {
            [] => Ok(Flow::Exit(0)),
            [code] => code
                .parse()
                .map(Flow::Exit)
                .map_err(|_| BuiltinError::InvalidExitCode),
            _ => Err(BuiltinError::TooManyArguments),
        }
    }
}
