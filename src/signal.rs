// SPDX-License-Identifier: GPL-2.0
//! Termination signals
//!
//! The handler only does async-signal-safe work: it records the signal,
//! writes one byte to a self-pipe that the event loop polls, and returns.
//! Teardown then runs on the main thread between frames. A second signal
//! restores the default disposition and re-raises, so a wedged teardown can
//! still be killed with another Ctrl-C.

use std::fs::File;
use std::os::fd::{IntoRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::fcntl::OFlag;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::debug;

use crate::error::{Nu801Error, Result};

/// Signals that stop the daemon
pub const TERMINATION_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

static SIGNALLED: AtomicBool = AtomicBool::new(false);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn handle_signal(signum: libc::c_int) {
    if SIGNALLED.swap(true, Ordering::SeqCst) {
        // Second arrival: fall back to the default action
        if let Ok(sig) = Signal::try_from(signum) {
            // SAFETY: signal(2) and raise(2) are async-signal-safe.
            unsafe {
                let _ = signal::signal(sig, SigHandler::SigDfl);
            }
            let _ = signal::raise(sig);
        }
        return;
    }

    LAST_SIGNAL.store(signum, Ordering::SeqCst);
    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe; the pipe is non-blocking so
        // this never stalls the handler.
        unsafe {
            libc::write(fd, (&byte as *const u8).cast(), 1);
        }
    }
}

/// Install handlers for [`TERMINATION_SIGNALS`]
///
/// Returns the read end of the wake-up pipe. It becomes readable once a
/// termination signal arrived.
pub fn install() -> Result<File> {
    let (read_end, write_end): (OwnedFd, OwnedFd) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK).map_err(Nu801Error::Signal)?;

    // The write end lives as long as the process
    let previous = WAKE_FD.swap(write_end.into_raw_fd(), Ordering::SeqCst);
    if previous >= 0 {
        // SAFETY: `previous` came from an earlier install() and is ours.
        unsafe {
            libc::close(previous);
        }
    }

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in TERMINATION_SIGNALS {
        // SAFETY: the handler only touches atomics and calls
        // async-signal-safe functions.
        unsafe { signal::sigaction(sig, &action) }.map_err(Nu801Error::Signal)?;
        debug!("Installed handler for {}", sig);
    }

    Ok(File::from(read_end))
}

/// First termination signal received, if any
pub fn received() -> Option<Signal> {
    match LAST_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        signum => Signal::try_from(signum).ok(),
    }
}

/// Whether `sig` counts as a normal, successful shutdown request
pub fn is_clean_exit(sig: Signal) -> bool {
    matches!(sig, Signal::SIGINT | Signal::SIGTERM)
}
