use std::{
    env,
    io::Write,
    path::{Path, PathBuf},
};

use crate::job::JobTable;

use super::{BuiltinCommand, BuiltinError, Flow};

#[derive(Debug, Default)]
pub struct Cd;

impl BuiltinCommand for Cd {
    fn name(&self) -> &'static str {
        "cd"
    }

    fn execute(
        &self,
        args: &[String],
        _jobs: &mut JobTable,
        _out: &mut dyn Write,
    ) -> Result<Flow, BuiltinError> {
        trace!("executing cd builtin: {args:?}");

        let home = env::var_os("HOME").map(PathBuf::from);
        let target = match args {
            [] => home.ok_or(BuiltinError::InvalidPath)?,
            [path] => expand_home(path, home.as_deref()),
            _ => return Err(BuiltinError::TooManyArguments),
        };

        if !target.exists() {
            return Err(BuiltinError::InvalidPath);
        }
        if !target.is_dir() {
            return Err(BuiltinError::NotADirectory);
        }

        env::set_current_dir(&target)?;
        debug!(cwd = %target.display(), "changed directory");

        Ok(Flow::Continue)
    }
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}
