use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::{
    fcntl::{fcntl, FcntlArg, FdFlag, OFlag},
    unistd::{dup2, pipe2},
};

pub mod child;
pub mod status;

/// One of the three standard streams of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    pub const ALL: [StdStream; 3] = [Self::Stdin, Self::Stdout, Self::Stderr];

    pub fn fd(self) -> RawFd {
        match self {
            Self::Stdin => libc::STDIN_FILENO,
            Self::Stdout => libc::STDOUT_FILENO,
            Self::Stderr => libc::STDERR_FILENO,
        }
    }

    pub fn from_fd(fd: RawFd) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.fd() == fd)
    }
}

/// Both ends of a close-on-exec pipe. Each end is closed when dropped, so
/// whichever process ends up not needing an end just lets it go.
#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl Pipe {
    pub fn new() -> nix::Result<Self> {
        let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
        // SAFETY: pipe2 just handed us these descriptors and nothing else owns them
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };
        Ok(Self { read, write })
    }
}

/// Makes `fd` the descriptor `stream` of the current process and closes the
/// original. The result survives exec.
///
/// Safe to call between fork and exec: no allocation happens here.
pub fn install(fd: OwnedFd, stream: StdStream) -> nix::Result<()> {
    let target = stream.fd();
    if fd.as_raw_fd() == target {
        // already in place, only the close-on-exec flag has to go
        fcntl(target, FcntlArg::F_SETFD(FdFlag::empty()))?;
        let _ = fd.into_raw_fd();
    } else {
        dup2(fd.as_raw_fd(), target)?;
    }
    Ok(())
}
