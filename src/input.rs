use std::{mem, os::fd::AsRawFd};

use nix::{errno::Errno, unistd::read};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// One line, without its newline.
    Line(String),
    /// SIGINT arrived while waiting; whatever was typed is dropped.
    Interrupted,
    Eof,
}

/// Line reader over a raw descriptor. Unlike `BufRead::read_line` it does
/// not retry on `EINTR`, so Ctrl-C at the prompt can be noticed.
#[derive(Debug)]
pub struct LineReader<F> {
    source: F,
    pending: Vec<u8>,
}

impl<F: AsRawFd> LineReader<F> {
    pub fn new(source: F) -> Self {
        Self {
            source,
            pending: Vec::new(),
        }
    }

    pub fn next_line(&mut self) -> nix::Result<Input> {
        let mut chunk = [0u8; 4096];

        loop {
            if let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(Input::Line(
                    String::from_utf8_lossy(&line[..end]).into_owned(),
                ));
            }

            match read(self.source.as_raw_fd(), &mut chunk) {
                Ok(0) if self.pending.is_empty() => return Ok(Input::Eof),
                // last line without a newline
                Ok(0) => {
                    let line = mem::take(&mut self.pending);
                    return Ok(Input::Line(String::from_utf8_lossy(&line).into_owned()));
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(Errno::EINTR) => {
                    trace!(dropped = self.pending.len(), "read interrupted");
                    self.pending.clear();
                    return Ok(Input::Interrupted);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
