use std::io::{self, Write};

use enum_dispatch::enum_dispatch;
use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

use crate::job::{JobError, JobTable};

pub mod cd;
pub mod exit;
pub mod fg;
pub mod jobs;

/// What the read loop should do after a builtin ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(i32),
}

#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("too many arguments")]
    TooManyArguments,
    #[error("invalid exit code")]
    InvalidExitCode,
    #[error("invalid pid")]
    InvalidPid,
    #[error("invalid path")]
    InvalidPath,
    #[error("not a directory")]
    NotADirectory,
    #[error(transparent)]
    Job(#[from] JobError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[enum_dispatch(BuiltinCommands)]
pub trait BuiltinCommand {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        args: &[String],
        jobs: &mut JobTable,
        out: &mut dyn Write,
    ) -> Result<Flow, BuiltinError>;
}

#[enum_dispatch]
#[derive(Debug, EnumIter)]
pub enum BuiltinCommands {
    Cd(cd::Cd),
    Exit(exit::Exit),
    Fg(fg::Fg),
    Jobs(jobs::Jobs),
}

impl BuiltinCommands {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::iter().find(|cmd| cmd.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_by_name() {
        for name in ["cd", "exit", "fg", "jobs"] {
            assert_eq!(BuiltinCommands::from_name(name).map(|b| b.name()), Some(name));
        }
        assert!(BuiltinCommands::from_name("pwd").is_none());
        assert!(BuiltinCommands::from_name("").is_none());
    }
}
