use std::{
    fs,
    io::{self, Write},
};

use color_eyre::{eyre::WrapErr, Result};
use tracing_subscriber::prelude::*;

use crate::{
    builtins::Flow,
    config::Config,
    input::{Input, LineReader},
    state::State,
};

#[macro_use]
extern crate tracing;

pub mod builtins;
pub mod cmd;
pub mod config;
pub mod input;
pub mod job;
pub mod parse;
pub mod process;
pub mod signal;
pub mod state;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    let log_dir = config.log_dir();
    fs::create_dir_all(&log_dir)
        .wrap_err_with(|| format!("failed to create log directory {}", log_dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        &log_dir,
        &config.log_file,
    ));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_error::ErrorLayer::default())
        .init();

    color_eyre::install()?;

    signal::install_interrupt_handler().wrap_err("failed to install SIGINT handler")?;

    let code = run(State::new(config))?;

    trace!(code, "exiting");
    // flush pending log lines before the process goes away
    drop(guard);
    std::process::exit(code);
}

fn run(mut state: State) -> Result<i32> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    let interactive = termion::is_tty(&stdin);
    let color = termion::is_tty(&stdout);

    if let Some(intro) = &state.config.intro {
        writeln!(stdout, "{intro}")?;
    }

    let mut input = LineReader::new(stdin);

    loop {
        state.reap(&mut stdout)?;

        if interactive {
            state.render(&mut stdout, color)?;
        }

        let line = match input.next_line()? {
            Input::Line(line) => line,
            Input::Interrupted => {
                writeln!(stdout)?;
                continue;
            }
            Input::Eof => {
                debug!("end of input");
                return Ok(0);
            }
        };

        if let Flow::Exit(code) = state.execute(&line, &mut stdout, &mut stderr)? {
            return Ok(code);
        }
    }
}
