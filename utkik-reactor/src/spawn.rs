//! ## utkik-reactor::spawn
//! **Reactor thread lifecycle: create, hand off, join**
//!
//! [`spawn_reactor_thread`] wraps `std::thread` with the two things reactor
//! threads need beyond it: an optional scheduling class applied before any
//! user code runs, and a [`StartGate`] handshake so the spawner only
//! resumes once the new thread has built its reactor and can receive.
//! Without the gate there is a window where a `send_vsignal` to the fresh
//! thread fails with `UnknownThread`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nix::sys::pthread::{pthread_self, Pthread};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::directory::ReactorThreadId;
use crate::os;

/// Scheduling class for a reactor thread.
///
/// The real-time classes need `CAP_SYS_NICE` or an `RLIMIT_RTPRIO`
/// allowance; a rejected class aborts the process instead of running in
/// the wrong one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// Keep whatever the spawning thread has.
    #[default]
    Inherit,
    /// `SCHED_FIFO` at the given priority.
    Fifo(i32),
    /// `SCHED_RR` at the given priority.
    RoundRobin(i32),
}

#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Thread name, visible in `ps -L` and panic messages.
    pub name: String,
    pub policy: SchedPolicy,
    /// `None` keeps the platform default stack.
    pub stack_size: Option<usize>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            name: "utkik-reactor".into(),
            policy: SchedPolicy::Inherit,
            stack_size: None,
        }
    }
}

impl SpawnOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct GateInner {
    ready: Mutex<bool>,
    cv: Condvar,
    thread: AtomicU64,
}

impl GateInner {
    fn open(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.cv.notify_all();
    }
}

/// Held by the entry function of a spawned reactor thread; the spawner
/// stays blocked until it is released.
pub struct StartGate {
    inner: Arc<GateInner>,
    released: bool,
}

impl StartGate {
    /// Unblocks the spawner. Call once the thread can receive traffic,
    /// typically right after building its [`crate::Reactor`] and
    /// registering the initial watches.
    pub fn release(mut self) {
        self.released = true;
        self.inner.open();
    }
}

impl Drop for StartGate {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if !thread::panicking() {
            warn!("start gate dropped without release");
        }
        // Either way the spawner must not stay blocked.
        self.inner.open();
    }
}

/// A running reactor thread, addressable immediately.
pub struct SpawnedThread {
    id: ReactorThreadId,
    join: JoinHandle<i32>,
}

impl SpawnedThread {
    pub fn thread_id(&self) -> ReactorThreadId {
        self.id
    }

    /// Waits for the entry function to return and yields its exit code,
    /// or `Err` if the thread panicked.
    pub fn join(self) -> thread::Result<i32> {
        self.join.join()
    }
}

/// Spawns a thread that runs `entry` under `options`, blocking the caller
/// until `entry` releases its [`StartGate`].
///
/// Thread creation or scheduling failures are unrecoverable and abort the
/// process after logging.
pub fn spawn_reactor_thread<F>(options: SpawnOptions, entry: F) -> SpawnedThread
where
    F: FnOnce(StartGate) -> i32 + Send + 'static,
{
    let inner = Arc::new(GateInner::default());
    let gate_inner = Arc::clone(&inner);
    let policy = options.policy;
    let name = options.name.clone();

    let mut builder = thread::Builder::new().name(options.name);
    if let Some(bytes) = options.stack_size {
        builder = builder.stack_size(bytes);
    }

    let result = builder.spawn(move || {
        gate_inner
            .thread
            .store(pthread_self() as u64, Ordering::Release);
        apply_sched_policy(policy);
        entry(StartGate {
            inner: gate_inner,
            released: false,
        })
    });

    let join = match result {
        Ok(handle) => handle,
        Err(err) => {
            error!(%err, thread = %name, "thread creation failed");
            std::process::abort();
        }
    };

    let mut ready = inner.ready.lock();
    while !*ready {
        inner.cv.wait(&mut ready);
    }
    drop(ready);

    let id = ReactorThreadId(inner.thread.load(Ordering::Acquire) as Pthread);
    debug!(%id, thread = %name, "reactor thread started");
    SpawnedThread { id, join }
}

fn apply_sched_policy(policy: SchedPolicy) {
    let (class, priority) = match policy {
        SchedPolicy::Inherit => return,
        SchedPolicy::Fifo(priority) => (libc::SCHED_FIFO, priority),
        SchedPolicy::RoundRobin(priority) => (libc::SCHED_RR, priority),
    };
    if let Err(errno) = os::set_thread_sched(pthread_self(), class, priority) {
        // A rejected class must not run degraded.
        error!(%errno, ?policy, "failed to apply scheduling policy");
        std::process::abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::Reactor;
    use crate::vsignal::{send_vsignal, VirtualSignal};
    use crate::watch::Verdict;

    #[test]
    fn spawned_thread_is_addressable_before_spawn_returns() {
        let spawned = spawn_reactor_thread(SpawnOptions::named("gate-test"), |gate| {
            let mut reactor = Reactor::new().unwrap();
            reactor.watch_vsignal(VirtualSignal(3), |_| Verdict::Stop(11));
            gate.release();
            reactor.run()
        });

        // The gate guarantees the directory entry exists by now.
        assert!(spawned.thread_id().is_registered());
        send_vsignal(spawned.thread_id(), VirtualSignal(3)).unwrap();
        assert_eq!(spawned.join().unwrap(), 11);
    }

    #[test]
    fn join_returns_the_entry_exit_code() {
        let spawned = spawn_reactor_thread(SpawnOptions::default(), |gate| {
            gate.release();
            55
        });
        assert_eq!(spawned.join().unwrap(), 55);
    }

    #[test]
    fn panicking_entry_still_releases_the_gate() {
        let spawned = spawn_reactor_thread(SpawnOptions::named("panics"), |_gate| {
            panic!("entry failed before releasing");
        });
        // Must not deadlock here; unwinding opens the gate.
        assert!(spawned.join().is_err());
    }
}
