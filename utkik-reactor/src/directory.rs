//! ## utkik-reactor::directory
//! **Process-wide thread directory**
//!
//! Maps a thread's pthread identity to its virtual-signal inbox. The only
//! cross-thread lookup in the crate: senders find a receiver here, everything
//! else stays thread-local.

use std::collections::HashMap;
use std::fmt;

use nix::sys::pthread::{pthread_kill, pthread_self, Pthread};
use nix::sys::signal::Signal;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use utkik_core::mailbox::Mailbox;

/// Identity of a thread that owns (or owned) a reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReactorThreadId(pub(crate) Pthread);

impl ReactorThreadId {
    /// Identity of the calling thread.
    pub fn current() -> Self {
        Self(pthread_self())
    }

    /// True while the thread's reactor is published in the directory,
    /// i.e. between `Reactor::new()` and `shutdown()`.
    pub fn is_registered(self) -> bool {
        DIRECTORY.lock().contains_key(&(self.0 as u64))
    }

    /// Delivers a real OS signal to exactly this thread.
    pub fn signal(self, signal: Signal) -> nix::Result<()> {
        pthread_kill(self.0, signal)
    }

    pub(crate) fn raw(self) -> Pthread {
        self.0
    }
}

impl fmt::Display for ReactorThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {:#x}", self.0 as u64)
    }
}

struct ThreadEntry {
    inbox: Mailbox<u32>,
}

static DIRECTORY: Lazy<Mutex<HashMap<u64, ThreadEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Publishes a thread's inbox. Returns false if the thread is already
/// present, which means this thread already owns a live reactor.
pub(crate) fn register_thread(id: ReactorThreadId, inbox: Mailbox<u32>) -> bool {
    let mut directory = DIRECTORY.lock();
    if directory.contains_key(&(id.0 as u64)) {
        return false;
    }
    directory.insert(id.0 as u64, ThreadEntry { inbox });
    true
}

pub(crate) fn deregister_thread(id: ReactorThreadId) {
    DIRECTORY.lock().remove(&(id.0 as u64));
}

/// Shared handle to the target's inbox, or `None` for unknown threads.
/// The handle stays valid even if the target deregisters right after; a
/// message submitted then simply lands in an orphaned buffer.
pub(crate) fn lookup_inbox(id: ReactorThreadId) -> Option<Mailbox<u32>> {
    DIRECTORY.lock().get(&(id.0 as u64)).map(|e| e.inbox.share())
}
