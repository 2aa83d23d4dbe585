//! ## utkik-core::handle
//! **Process-wide unique identifiers for callback registrations**
//!
//! Every fd, signal, virtual-signal and timer registration is named by a
//! `WatchHandle`. Handles come from a single monotonically increasing
//! counter, so a handle is never reused while another registration is live
//! and a stale handle can never silently alias a newer one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for one callback registration.
///
/// Comparable and hashable so registries can key on it; the inner value is
/// deliberately private. Use [`WatchHandle::as_u64`] for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(u64);

impl WatchHandle {
    /// Raw counter value, for diagnostics only.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lock-free allocator backing [`WatchHandle`] issuance.
///
/// One instance serves the whole process; `fetch_add` makes concurrent
/// allocation from any number of reactor threads race-free.
pub struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    /// Starts issuing at 1 so a zeroed value never looks like a real handle.
    pub const fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    /// Issues the next unique handle.
    #[inline]
    pub fn allocate(&self) -> WatchHandle {
        WatchHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
