use std::{
    ffi::{CString, NulError},
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
};

use nix::{
    fcntl::{open, OFlag},
    sys::stat::Mode,
    unistd::dup2,
};
use thiserror::Error;

use crate::{
    parse::Word,
    process::{install, StdStream},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectionKind {
    /// `<`
    Read,
    /// `>`
    Write,
    /// `2>`
    WriteStderr,
    /// `>>`
    Append,
    /// `2>>`
    AppendStderr,
    /// `&>`
    WriteBoth,
}

/// Recognized operators, in the order they are checked.
pub const OPERATORS: [(&str, RedirectionKind); 6] = [
    ("<", RedirectionKind::Read),
    (">", RedirectionKind::Write),
    ("2>", RedirectionKind::WriteStderr),
    (">>", RedirectionKind::Append),
    ("2>>", RedirectionKind::AppendStderr),
    ("&>", RedirectionKind::WriteBoth),
];

impl RedirectionKind {
    pub fn from_operator(word: &str) -> Option<Self> {
        OPERATORS
            .iter()
            .find(|(op, _)| *op == word)
            .map(|(_, kind)| *kind)
    }

    pub fn operator(self) -> &'static str {
        OPERATORS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(op, _)| *op)
            .unwrap_or_default()
    }

    pub fn streams(self) -> &'static [StdStream] {
        match self {
            Self::Read => &[StdStream::Stdin],
            Self::Write | Self::Append => &[StdStream::Stdout],
            Self::WriteStderr | Self::AppendStderr => &[StdStream::Stderr],
            Self::WriteBoth => &[StdStream::Stdout, StdStream::Stderr],
        }
    }

    pub fn flags(self) -> OFlag {
        let flags = match self {
            Self::Read => OFlag::O_RDONLY,
            Self::Write | Self::WriteStderr | Self::WriteBoth => {
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC
            }
            Self::Append | Self::AppendStderr => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
        };
        flags | OFlag::O_CLOEXEC
    }
}

/// `rw-r--r--`, before the umask.
pub fn file_mode() -> Mode {
    Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH
}

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("invalid usage of redirection and (or) piping")]
    MissingTarget { operator: &'static str },
    #[error("invalid usage of redirection and (or) piping")]
    DuplicateTarget { operator: &'static str, stream: StdStream },
    #[error("invalid usage of redirection and (or) piping")]
    PipeConflict { stream: StdStream },
    #[error("file name contains a nul byte")]
    Nul(#[from] NulError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub kind: RedirectionKind,
    pub path: String,
    c_path: CString,
}

impl Redirection {
    pub fn new(kind: RedirectionKind, path: impl Into<String>) -> Result<Self, NulError> {
        let path = path.into();
        let c_path = CString::new(path.as_bytes())?;
        Ok(Self { kind, path, c_path })
    }

    /// Opens the target and puts it on this process's stream(s).
    ///
    /// Runs in the forked child, so it must not allocate.
    pub fn apply(&self) -> nix::Result<()> {
        let fd = open(self.c_path.as_c_str(), self.kind.flags(), file_mode())?;
        // SAFETY: freshly opened, owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let streams = self.kind.streams();
        for stream in &streams[1..] {
            dup2(fd.as_raw_fd(), stream.fd())?;
        }
        install(fd, streams[0])
    }
}

/// The redirections of one stage, plus which streams they claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirections {
    list: Vec<Redirection>,
}

impl Redirections {
    pub fn claims(&self, stream: StdStream) -> bool {
        self.list.iter().any(|r| r.kind.streams().contains(&stream))
    }

    pub fn push(&mut self, redirection: Redirection) -> Result<(), RedirectError> {
        if let Some(stream) = redirection
            .kind
            .streams()
            .iter()
            .find(|s| self.claims(**s))
        {
            return Err(RedirectError::DuplicateTarget {
                operator: redirection.kind.operator(),
                stream: *stream,
            });
        }
        self.list.push(redirection);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Redirection> {
        self.list.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Redirection> {
        self.list.iter()
    }
}

fn operator_kind(word: &Word) -> Option<RedirectionKind> {
    word.unquoted().and_then(RedirectionKind::from_operator)
}

/// Pulls every redirection operator and its file name out of `words`,
/// leaving only the program and its arguments behind. Quoted words are
/// never operators.
pub fn extract(words: &mut Vec<Word>) -> Result<Redirections, RedirectError> {
    let mut redirections = Redirections::default();
    let mut i = 0;

    while i < words.len() {
        let Some(kind) = operator_kind(&words[i]) else {
            i += 1;
            continue;
        };

        let operator = kind.operator();
        match words.get(i + 1) {
            Some(target) if operator_kind(target).is_none() => {}
            _ => return Err(RedirectError::MissingTarget { operator }),
        }

        let path = words.remove(i + 1).text;
        words.remove(i);

        redirections.push(Redirection::new(kind, path)?)?;
    }

    Ok(redirections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<Word> {
        s.split_whitespace().map(|w| Word::new(w, false)).collect()
    }

    fn texts(words: &[Word]) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn extracts_stdin_and_stderr() {
        let mut args = words("cmd < in.txt 2> err.txt");
        let redirections = extract(&mut args).unwrap();

        assert_eq!(texts(&args), vec!["cmd"]);
        let found: Vec<_> = redirections
            .iter()
            .map(|r| (r.kind, r.path.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                (RedirectionKind::Read, "in.txt"),
                (RedirectionKind::WriteStderr, "err.txt"),
            ]
        );
        assert!(redirections.claims(StdStream::Stdin));
        assert!(!redirections.claims(StdStream::Stdout));
        assert!(redirections.claims(StdStream::Stderr));
    }

    #[test]
    fn keeps_arguments_around_operators() {
        let mut args = words("grep -n foo >> log.txt bar");
        let redirections = extract(&mut args).unwrap();
        assert_eq!(texts(&args), vec!["grep", "-n", "foo", "bar"]);
        assert_eq!(redirections.iter().count(), 1);
        assert_eq!(redirections.get(0).unwrap().kind, RedirectionKind::Append);
    }

    #[test]
    fn quoted_operators_are_plain_words() {
        let mut args = vec![
            Word::new("echo", false),
            Word::new(">", true),
            Word::new("x", false),
            Word::new(">", false),
            Word::new("2>", true),
        ];
        let redirections = extract(&mut args).unwrap();

        assert_eq!(texts(&args), vec!["echo", ">", "x"]);
        let target = redirections.get(0).unwrap();
        assert_eq!(target.kind, RedirectionKind::Write);
        assert_eq!(target.path, "2>");
    }

    #[test]
    fn rejects_second_stdout_target() {
        let mut args = words("cmd > out.txt > out2.txt");
        let err = extract(&mut args).unwrap_err();
        assert!(matches!(
            err,
            RedirectError::DuplicateTarget {
                stream: StdStream::Stdout,
                ..
            }
        ));
        assert_eq!(err.to_string(), "invalid usage of redirection and (or) piping");
    }

    #[test]
    fn combined_conflicts_with_either_stream() {
        for line in ["cmd 2> a &> b", "cmd &> a >> b", "cmd > a &> b"] {
            let mut args = words(line);
            assert!(
                matches!(extract(&mut args), Err(RedirectError::DuplicateTarget { .. })),
                "{line}"
            );
        }
    }

    #[test]
    fn rejects_missing_target() {
        for line in ["cmd >", "cmd < >", "cmd 2>> &>"] {
            let mut args = words(line);
            assert!(
                matches!(extract(&mut args), Err(RedirectError::MissingTarget { .. })),
                "{line}"
            );
        }
    }

    #[test]
    fn operator_table_round_trips() {
        for (op, kind) in OPERATORS {
            assert_eq!(RedirectionKind::from_operator(op), Some(kind));
            assert_eq!(kind.operator(), op);
        }
        assert_eq!(RedirectionKind::from_operator("1>"), None);
    }

    #[test]
    fn open_flags_follow_mode() {
        assert!(!RedirectionKind::Read.flags().contains(OFlag::O_CREAT));
        assert!(RedirectionKind::Write.flags().contains(OFlag::O_TRUNC));
        assert!(RedirectionKind::AppendStderr.flags().contains(OFlag::O_APPEND));
        assert!(!RedirectionKind::AppendStderr.flags().contains(OFlag::O_TRUNC));
    }

    #[test]
    fn missing_input_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let redirection =
            Redirection::new(RedirectionKind::Read, path.to_string_lossy()).unwrap();
        assert_eq!(redirection.apply(), Err(nix::errno::Errno::ENOENT));
        assert!(!path.exists());
    }
}
