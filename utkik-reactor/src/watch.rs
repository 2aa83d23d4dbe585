//! ## utkik-reactor::watch
//! **Handler vocabulary shared by every watch kind**

use nix::poll::PollFlags;

/// What a handler tells the loop after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the loop running.
    Continue,
    /// Stop the loop; [`crate::Reactor::run`] returns the code immediately.
    Stop(i32),
}

/// Readiness a descriptor watch subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    ReadWrite,
}

impl Interest {
    pub(crate) fn poll_flags(self) -> PollFlags {
        match self {
            Interest::Readable => PollFlags::POLLIN,
            Interest::Writable => PollFlags::POLLOUT,
            Interest::ReadWrite => PollFlags::POLLIN | PollFlags::POLLOUT,
        }
    }
}

/// Readiness observed on a watched descriptor, handed to its handler.
///
/// `hangup` and `error` are reported even when the watch only asked for
/// read/write interest, matching `poll(2)` semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadyEvents {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
    pub error: bool,
}

impl ReadyEvents {
    pub(crate) fn from_poll(revents: PollFlags) -> Self {
        Self {
            readable: revents.contains(PollFlags::POLLIN),
            writable: revents.contains(PollFlags::POLLOUT),
            hangup: revents.contains(PollFlags::POLLHUP),
            error: revents.contains(PollFlags::POLLERR)
                || revents.contains(PollFlags::POLLNVAL),
        }
    }

    pub fn any(&self) -> bool {
        self.readable || self.writable || self.hangup || self.error
    }
}

/// Passed to a timer handler on every expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    /// How many times this timer has fired, counting this tick.
    pub fires: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_maps_to_poll_flags() {
        assert_eq!(Interest::Readable.poll_flags(), PollFlags::POLLIN);
        assert_eq!(Interest::Writable.poll_flags(), PollFlags::POLLOUT);
        assert!(Interest::ReadWrite.poll_flags().contains(PollFlags::POLLIN));
        assert!(Interest::ReadWrite.poll_flags().contains(PollFlags::POLLOUT));
    }

    #[test]
    fn error_conditions_always_surface() {
        let ready = ReadyEvents::from_poll(PollFlags::POLLHUP | PollFlags::POLLERR);
        assert!(ready.hangup);
        assert!(ready.error);
        assert!(!ready.readable);
        assert!(ready.any());

        let stale = ReadyEvents::from_poll(PollFlags::POLLNVAL);
        assert!(stale.error);
    }
}
