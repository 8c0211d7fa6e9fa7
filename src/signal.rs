use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

extern "C" fn on_interrupt(_: libc::c_int) {}

/// Keeps the shell alive on Ctrl-C. The handler does nothing, but since it
/// is installed without `SA_RESTART` a blocking `waitpid` returns `EINTR`,
/// which is how a foreground wait gets abandoned.
pub fn install_interrupt_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler touches no state at all
    unsafe { sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

/// Puts back the dispositions a freshly exec'd program expects. The Rust
/// runtime ignores SIGPIPE, and ignored signals survive exec.
///
/// Called between fork and exec.
pub fn restore_defaults() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGPIPE] {
        // SAFETY: resetting to the default disposition
        let _ = unsafe { sigaction(signal, &default) };
    }
}
