use std::{
    ffi::{CString, NulError},
    iter, ptr,
};

use itertools::Itertools;
use thiserror::Error;

use super::redirect::{self, RedirectError, Redirections};
use crate::{parse::Word, process::StdStream};

/// One command of a pipeline, as written: program, arguments, and any
/// redirection operators still mixed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStage {
    pub words: Vec<Word>,
}

impl CommandStage {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    pub fn program(&self) -> &str {
        self.words.first().map(|w| w.text.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub stages: Vec<CommandStage>,
    pub foreground: bool,
}

#[derive(Debug, Error)]
pub enum PlanErrorKind {
    #[error(transparent)]
    Redirect(#[from] RedirectError),
    #[error("argument contains a nul byte")]
    Nul(#[from] NulError),
    #[error("missing command")]
    MissingCommand,
}

#[derive(Debug, Error)]
#[error("{program}: {kind}")]
pub struct PlanError {
    pub program: String,
    pub kind: PlanErrorKind,
}

/// A stage with its redirections pulled out and its argument vector ready
/// for exec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub program: String,
    pub argv: Vec<CString>,
    pub redirections: Redirections,
}

impl StagePlan {
    fn new(stage: &CommandStage) -> Result<Self, PlanErrorKind> {
        let mut words = stage.words.clone();
        let redirections = redirect::extract(&mut words)?;

        let program = words
            .first()
            .ok_or(PlanErrorKind::MissingCommand)?
            .text
            .clone();
        let argv = words
            .into_iter()
            .map(|w| CString::new(w.text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            program,
            argv,
            redirections,
        })
    }

    /// Null-terminated pointer array over `argv` for `execvp(3)`, built
    /// before forking so the child does not have to allocate. Only valid
    /// while `self` is.
    pub fn argv_ptrs(&self) -> Vec<*const libc::c_char> {
        self.argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(iter::once(ptr::null()))
            .collect()
    }

    /// Rejects explicit redirections of streams that the pipe wiring of
    /// position `index` out of `len` already owns.
    fn check_position(&self, index: usize, len: usize) -> Result<(), RedirectError> {
        if index > 0 && self.redirections.claims(StdStream::Stdin) {
            return Err(RedirectError::PipeConflict {
                stream: StdStream::Stdin,
            });
        }
        if index + 1 < len && self.redirections.claims(StdStream::Stdout) {
            return Err(RedirectError::PipeConflict {
                stream: StdStream::Stdout,
            });
        }
        Ok(())
    }
}

/// A pipeline that passed every usage check and can be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub stages: Vec<StagePlan>,
    pub foreground: bool,
}

impl ExecutionPlan {
    /// Number of pipes needed to connect the stages.
    pub fn links(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    pub fn describe(&self) -> String {
        self.stages.iter().map(|s| s.program.as_str()).join(" | ")
    }
}

impl TryFrom<&PipelineSpec> for ExecutionPlan {
    type Error = PlanError;

    fn try_from(spec: &PipelineSpec) -> Result<Self, Self::Error> {
        let len = spec.stages.len();
        let stages = spec
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| {
                StagePlan::new(stage)
                    .and_then(|plan| {
                        plan.check_position(index, len)?;
                        Ok(plan)
                    })
                    .map_err(|kind| PlanError {
                        program: stage.program().to_owned(),
                        kind,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            stages,
            foreground: spec.foreground,
        })
    }
}
