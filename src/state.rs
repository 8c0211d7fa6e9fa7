use std::{
    env,
    io::{self, Write},
    path::Path,
};

use once_cell::sync::Lazy;
use termion::{color, style};

use crate::{
    builtins::{BuiltinCommand, Flow},
    cmd::{
        execute::Launch,
        execution_plan::{ExecutionPlan, PipelineSpec},
    },
    config::Config,
    job::JobTable,
    parse::{parse_line, Line},
};

static USER: Lazy<String> = Lazy::new(|| {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
        .or_else(|| env::var("USER").ok())
        .unwrap_or_else(|| "?".into())
});

static HOST: Lazy<String> = Lazy::new(|| {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".into())
});

pub struct State {
    pub config: Config,
    pub jobs: JobTable,
}

impl State {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            jobs: JobTable::new(),
        }
    }

    pub fn render<W: Write>(&self, stdout: &mut W, color: bool) -> io::Result<()> {
        let cwd = env::current_dir().unwrap_or_default();
        let home = env::var_os("HOME");
        let prompt = render_prompt(
            &self.config.prompt,
            &USER,
            &HOST,
            &cwd,
            home.as_deref().map(Path::new),
        );

        if color && self.config.color {
            write!(
                stdout,
                "{}{}{prompt}{}{}",
                style::Bold,
                color::Fg(color::Green),
                color::Fg(color::Reset),
                style::Reset,
            )?;
        } else {
            write!(stdout, "{prompt}")?;
        }

        stdout.flush()
    }

    /// Announces background jobs that finished since the last prompt.
    pub fn reap<W: Write>(&mut self, stdout: &mut W) -> io::Result<()> {
        for id in self.jobs.reap_finished() {
            writeln!(stdout, "[{id}] done")?;
        }
        Ok(())
    }

    /// Runs one input line. Failures are reported on `stderr`; only a
    /// broken terminal makes this return an error.
    pub fn execute<O: Write, E: Write>(
        &mut self,
        line: &str,
        stdout: &mut O,
        stderr: &mut E,
    ) -> io::Result<Flow> {
        let line = match parse_line(line) {
            Ok(line) => line,
            Err(err) => {
                debug!("parse failed: {err}");
                writeln!(stderr, "plumb: {err}")?;
                return Ok(Flow::Continue);
            }
        };

        trace!(?line, "parsed line");

        match line {
            Line::Empty => Ok(Flow::Continue),
            Line::Builtin { command, args } => {
                match command.execute(&args, &mut self.jobs, stdout) {
                    Ok(flow) => Ok(flow),
                    Err(err) => {
                        writeln!(stderr, "{}: {err}", command.name())?;
                        Ok(Flow::Continue)
                    }
                }
            }
            Line::Pipeline(spec) => {
                self.run_pipeline(&spec, stdout, stderr)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn run_pipeline<O: Write, E: Write>(
        &mut self,
        spec: &PipelineSpec,
        stdout: &mut O,
        stderr: &mut E,
    ) -> io::Result<()> {
        let plan = match ExecutionPlan::try_from(spec) {
            Ok(plan) => plan,
            Err(err) => {
                debug!("rejected pipeline: {err}");
                return writeln!(stderr, "{err}");
            }
        };

        // anything buffered would otherwise be duplicated into the children
        stdout.flush()?;
        stderr.flush()?;

        match plan.execute(&mut self.jobs) {
            Ok(Launch::Completed(states)) => {
                debug!(?states, "pipeline finished");
                Ok(())
            }
            Ok(Launch::Background(id)) => writeln!(stdout, "[{id}] new job added"),
            Ok(Launch::Interrupted(id)) => {
                writeln!(stdout)?;
                writeln!(stdout, "[{id}] new job added")
            }
            Err(err) => {
                warn!(killed = ?err.killed, "pipeline setup failed: {err}");
                writeln!(stderr, "{err}")
            }
        }
    }
}

/// Fills in the prompt placeholders. The home directory prefix of `cwd`
/// is shown as `~`.
pub fn render_prompt(
    template: &str,
    user: &str,
    host: &str,
    cwd: &Path,
    home: Option<&Path>,
) -> String {
    let cwd = match home.and_then(|home| cwd.strip_prefix(home).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_owned(),
        Some(rest) => format!("~/{}", rest.display()),
        None => cwd.display().to_string(),
    };

    template
        .replace("{user}", user)
        .replace("{host}", host)
        .replace("{cwd}", &cwd)
}
