//! ## utkik-reactor::vsignal
//! **Software-defined signals over one real signal**
//!
//! Applications get an unlimited signal namespace without consuming scarce
//! OS signal numbers: a virtual signal is a plain integer submitted to the
//! receiver's inbox, and a single reserved real signal ([`WAKE_SIGNAL`])
//! carries the wakeup. The receiving reactor drains its inbox in FIFO order
//! and invokes whatever watches are registered for each drained number.

use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;

use crate::directory::{self, ReactorThreadId};

/// The one real signal reserved for inter-reactor wakeups. Watching it
/// directly is rejected; its delivery is owned by the reactor loop.
pub const WAKE_SIGNAL: Signal = Signal::SIGURG;

/// Application-defined signal number, disjoint from the OS signal namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualSignal(pub u32);

impl fmt::Display for VirtualSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VsignalError {
    /// The target never registered a reactor, or already shut it down.
    #[error("no reactor registered for {0}")]
    UnknownThread(ReactorThreadId),
    /// The target's inbox is at capacity. Back-pressure, not loss: the
    /// caller decides whether to retry.
    #[error("virtual-signal inbox of {0} is full")]
    InboxFull(ReactorThreadId),
    /// The wakeup signal could not be delivered.
    #[error("wake delivery failed: {0}")]
    Wake(Errno),
}

/// Sends `vsig` to the reactor owned by `target`.
///
/// Two steps: queue the number on the target's inbox, then fire one
/// [`WAKE_SIGNAL`] at the target so its `poll` returns. `UnknownThread`
/// from the second step means the target shut down between the steps; the
/// queued number ends up in an orphaned buffer, which is harmless.
pub fn send_vsignal(target: ReactorThreadId, vsig: VirtualSignal) -> Result<(), VsignalError> {
    let inbox = directory::lookup_inbox(target).ok_or(VsignalError::UnknownThread(target))?;
    inbox
        .submit(vsig.0)
        .map_err(|_| VsignalError::InboxFull(target))?;

    match target.signal(WAKE_SIGNAL) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(VsignalError::UnknownThread(target)),
        Err(errno) => Err(VsignalError::Wake(errno)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_thread_is_a_typed_error() {
        // A thread that exists but never registered a reactor.
        let outside = std::thread::spawn(ReactorThreadId::current).join().unwrap();
        assert_eq!(
            send_vsignal(outside, VirtualSignal(3)),
            Err(VsignalError::UnknownThread(outside))
        );
    }

    #[test]
    fn virtual_signal_formatting() {
        assert_eq!(VirtualSignal(42).to_string(), "v42");
    }
}
