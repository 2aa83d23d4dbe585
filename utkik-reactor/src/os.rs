//! ## utkik-reactor::os
//! **The async-signal-safe layer**
//!
//! Everything the OS signal handler is allowed to touch lives here. Delivery
//! is two-phase: the `extern "C"` handler only records *which* signal landed
//! on *which* thread and pokes that thread's eventfd; the application-level
//! handlers run later, on the owning thread's normal stack, from the reactor
//! loop.
//!
//! ### Key Design Features
//! 1. **Lock-free slot table** - a fixed array of `{thread, wake_fd, pending}`
//!    atomics is the only state shared with the handler. No mutex, no
//!    allocation, no TLS on the signal path.
//! 2. **Refcounted dispositions** - one `sigaction` registration exists per
//!    signal number process-wide no matter how many watches share it; the
//!    previous disposition is restored when the last watcher goes away.
//! 3. **Coalesced wakeups** - the eventfd is a counter, so any number of
//!    signals before the next drain costs one wakeup.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use nix::errno::Errno;
use nix::sys::pthread::Pthread;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::warn;

/// Pending bits live in one `u64`, which covers every `Signal` variant.
const SLOT_COUNT: usize = 128;

const SLOT_FREE: u64 = 0;
const SLOT_RESERVED: u64 = u64::MAX;

/// One reactor thread's claim on signal routing.
///
/// NPTL thread ids are descriptor addresses, never 0 or all-ones, so the
/// two sentinels cannot collide with a live thread.
struct PendingSlot {
    thread: AtomicU64,
    wake_fd: AtomicI32,
    pending: AtomicU64,
}

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: PendingSlot = PendingSlot {
    thread: AtomicU64::new(SLOT_FREE),
    wake_fd: AtomicI32::new(-1),
    pending: AtomicU64::new(0),
};

static SLOTS: [PendingSlot; SLOT_COUNT] = [EMPTY_SLOT; SLOT_COUNT];

/// Signals that landed on a thread with no claimed slot.
static UNROUTED: AtomicU64 = AtomicU64::new(0);

/// How many watched signals were delivered to threads that never claimed a
/// routing slot. Diagnostic only; a nonzero value usually means a
/// process-directed signal landed on a non-reactor thread.
pub fn unrouted_signal_count() -> u64 {
    UNROUTED.load(Ordering::Relaxed)
}

/// First delivery phase. Runs in OS signal context.
///
/// Restricted to the async-signal-safe set: atomic loads/stores, a TLS
/// register read (`pthread_self`) and one `write(2)`. EAGAIN from the write
/// means the eventfd counter is already nonzero, so a wakeup is pending
/// anyway and the miss is harmless.
extern "C" fn record_signal(signo: libc::c_int) {
    if !(0..64).contains(&signo) {
        return;
    }
    // SAFETY: pthread_self only reads the thread pointer register.
    let me = unsafe { libc::pthread_self() } as u64;
    for slot in SLOTS.iter() {
        if slot.thread.load(Ordering::Acquire) != me {
            continue;
        }
        slot.pending.fetch_or(1u64 << signo, Ordering::AcqRel);
        let fd = slot.wake_fd.load(Ordering::Acquire);
        if fd >= 0 {
            let val: u64 = 1;
            // SAFETY: writes 8 bytes from a live stack slot to an eventfd.
            unsafe {
                libc::write(fd, &val as *const u64 as *const libc::c_void, 8);
            }
        }
        return;
    }
    UNROUTED.fetch_add(1, Ordering::Relaxed);
}

/// A claimed entry in the slot table, released on reactor shutdown.
pub(crate) struct SlotClaim {
    index: usize,
}

impl SlotClaim {
    /// Atomically takes and clears the pending-signal bitset.
    pub(crate) fn take_pending(&self) -> u64 {
        SLOTS[self.index].pending.swap(0, Ordering::AcqRel)
    }

    /// Puts undispatched bits back so they survive into the next `run()`.
    pub(crate) fn repost(&self, bits: u64) {
        SLOTS[self.index].pending.fetch_or(bits, Ordering::AcqRel);
    }

    pub(crate) fn release(self) {
        let slot = &SLOTS[self.index];
        // Stop matching this thread before touching the rest of the slot.
        slot.thread.store(SLOT_RESERVED, Ordering::Release);
        slot.wake_fd.store(-1, Ordering::Release);
        slot.pending.store(0, Ordering::Release);
        slot.thread.store(SLOT_FREE, Ordering::Release);
    }
}

/// Claims a free slot for `thread`, routing its watched signals to `wake_fd`.
/// `None` when all slots are taken.
pub(crate) fn claim_slot(thread: Pthread, wake_fd: RawFd) -> Option<SlotClaim> {
    for (index, slot) in SLOTS.iter().enumerate() {
        if slot
            .thread
            .compare_exchange(SLOT_FREE, SLOT_RESERVED, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            continue;
        }
        // The handler only matches real thread ids, so fd and pending are
        // published before the slot becomes visible.
        slot.wake_fd.store(wake_fd, Ordering::Release);
        slot.pending.store(0, Ordering::Release);
        slot.thread.store(thread as u64, Ordering::Release);
        return Some(SlotClaim { index });
    }
    None
}

struct DispositionEntry {
    saved: SigAction,
    watchers: usize,
}

/// Previous `sigaction` per signal number, saved on first claim.
static DISPOSITIONS: Lazy<Mutex<HashMap<i32, DispositionEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Counts one more watcher for `signal`, installing [`record_signal`] as the
/// process-wide disposition on the first claim anywhere in the process.
///
/// No `SA_RESTART`: a watched signal must interrupt blocking syscalls so a
/// thread stuck in one reaches its dispatch phase promptly.
pub(crate) fn claim_signal(signal: Signal) -> Result<(), Errno> {
    let mut table = DISPOSITIONS.lock();
    match table.entry(signal as i32) {
        Entry::Occupied(mut occupied) => {
            occupied.get_mut().watchers += 1;
            Ok(())
        }
        Entry::Vacant(vacant) => {
            let action = SigAction::new(
                SigHandler::Handler(record_signal),
                SaFlags::empty(),
                SigSet::empty(),
            );
            // SAFETY: record_signal is async-signal-safe and has a stable
            // address for the lifetime of the process.
            let saved = unsafe { signal::sigaction(signal, &action) }?;
            vacant.insert(DispositionEntry { saved, watchers: 1 });
            Ok(())
        }
    }
}

/// Drops one watcher for `signal`, restoring the saved disposition when the
/// process-wide count reaches zero.
pub(crate) fn release_signal(signal: Signal) {
    let mut table = DISPOSITIONS.lock();
    if let Entry::Occupied(mut occupied) = table.entry(signal as i32) {
        let entry = occupied.get_mut();
        entry.watchers -= 1;
        if entry.watchers > 0 {
            return;
        }
        let entry = occupied.remove();
        // SAFETY: restores the sigaction captured when the first watcher
        // claimed this signal.
        if let Err(errno) = unsafe { signal::sigaction(signal, &entry.saved) } {
            warn!(%signal, %errno, "failed to restore signal disposition");
        }
    }
}

/// Self-pipe style wake channel: one nonblocking eventfd per reactor.
pub(crate) struct WakeChannel {
    fd: RawFd,
}

impl WakeChannel {
    pub(crate) fn create() -> Result<Self, Errno> {
        // SAFETY: plain syscall, no pointers involved.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(Errno::last());
        }
        Ok(Self { fd })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    /// Resets the counter so the next poll blocks again. EAGAIN means nobody
    /// woke us since the last drain.
    pub(crate) fn drain(&self) {
        let mut buf = 0u64;
        // SAFETY: reads 8 bytes into a properly sized stack slot.
        let _ = unsafe {
            libc::read(
                self.fd,
                &mut buf as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
    }
}

impl Drop for WakeChannel {
    fn drop(&mut self) {
        if self.fd >= 0 {
            // SAFETY: fd is owned by this channel and closed exactly once.
            unsafe {
                libc::close(self.fd);
            }
            self.fd = -1;
        }
    }
}

/// Applies a realtime scheduling policy to `thread`.
pub(crate) fn set_thread_sched(
    thread: Pthread,
    policy: libc::c_int,
    priority: i32,
) -> Result<(), Errno> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: param outlives the call and thread is a live pthread id.
    let rc = unsafe { libc::pthread_setschedparam(thread, policy, &param) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Errno::from_raw(rc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::pthread::pthread_self;

    #[test]
    fn slot_claim_round_trip() {
        let wake = WakeChannel::create().unwrap();
        let claim = claim_slot(pthread_self(), wake.fd()).expect("slot available");

        assert_eq!(claim.take_pending(), 0);
        claim.repost(1 << 10 | 1 << 15);
        assert_eq!(claim.take_pending(), 1 << 10 | 1 << 15);
        assert_eq!(claim.take_pending(), 0);

        claim.release();
    }

    #[test]
    fn released_slots_are_reusable() {
        let wake = WakeChannel::create().unwrap();
        let mut claims = Vec::new();
        for _ in 0..4 {
            claims.push(claim_slot(pthread_self(), wake.fd()).expect("slot available"));
        }
        for claim in claims {
            claim.release();
        }
        // Exhausting and releasing leaves the table balanced.
        let again = claim_slot(pthread_self(), wake.fd()).expect("slot available");
        again.release();
    }

    #[test]
    fn wake_channel_drains_to_empty() {
        let wake = WakeChannel::create().unwrap();
        let val: u64 = 1;
        for _ in 0..3 {
            // SAFETY: writes 8 bytes from a live stack slot.
            let rc = unsafe {
                libc::write(wake.fd(), &val as *const u64 as *const libc::c_void, 8)
            };
            assert_eq!(rc, 8);
        }
        // Three notifies coalesce into one drain.
        wake.drain();
        let mut buf = 0u64;
        // SAFETY: reads 8 bytes into a properly sized stack slot.
        let rc = unsafe {
            libc::read(
                wake.fd(),
                &mut buf as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        assert_eq!(rc, -1, "counter must be empty after drain");
    }
}
