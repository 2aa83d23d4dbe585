//! ## utkik-reactor::reactor
//! **Per-thread callback registry and wait loop**
//!
//! A `Reactor` owns every callback registered by its thread and multiplexes
//! all four watch kinds over one blocking `poll(2)`. Nothing in here is
//! shared: cross-thread traffic arrives through the wake eventfd and the
//! virtual-signal inbox, both drained inside the loop.
//!
//! ### Key Design Features
//! 1. **Single wait** - descriptors poll directly; timers bound the poll
//!    timeout; signals interrupt it via the wake channel. One syscall parks
//!    the whole thread.
//! 2. **Deterministic dispatch order** - within an iteration: pending
//!    signals, then due timers (ascending deadline), then ready descriptors
//!    (ascending time-since-last-service, so the longest-idle goes first).
//! 3. **Uniform termination** - every handler returns a [`Verdict`];
//!    `Stop(code)` anywhere makes `run()` return `code` immediately.
//!
//! A `Reactor` is deliberately `!Send` (handlers are not required to be
//! `Send`), which pins the registry to its owning thread at compile time.

use std::collections::HashMap;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::Signal;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use utkik_core::handle::{HandleAllocator, WatchHandle};
use utkik_core::mailbox::{Mailbox, MailboxError};

use crate::directory::{self, ReactorThreadId};
use crate::os::{self, SlotClaim, WakeChannel};
use crate::vsignal::{VirtualSignal, WAKE_SIGNAL};
use crate::watch::{Interest, ReadyEvents, TimerTick, Verdict};

/// Inbox slots for [`Reactor::new`]; enough for a few dozen peers with
/// outstanding wakeups.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Timers within this much of their deadline fire now rather than forcing
/// one more near-zero poll.
const TIMER_EPSILON: Duration = Duration::from_millis(1);

/// One allocator for the whole process so handles are unique across threads.
static HANDLES: HandleAllocator = HandleAllocator::new();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReactorError {
    /// The handle was never issued by this reactor or is already gone.
    #[error("no registration found for {0}")]
    NotFound(WatchHandle),
    /// The wake signal's delivery belongs to the reactor itself.
    #[error("signal {0:?} is reserved for reactor wakeups")]
    ReservedSignal(Signal),
    /// Each thread may own at most one live reactor.
    #[error("this thread already owns a reactor")]
    AlreadyRegistered,
    /// All routing slots are claimed; more reactor threads than supported.
    #[error("signal routing slots exhausted")]
    SlotsExhausted,
    #[error(transparent)]
    Inbox(#[from] MailboxError),
    #[error("os primitive failed: {0}")]
    Os(#[from] Errno),
}

type FdHandler = Box<dyn FnMut(ReadyEvents) -> Verdict>;
type SignalHandler = Box<dyn FnMut(Signal) -> Verdict>;
type VsignalHandler = Box<dyn FnMut(VirtualSignal) -> Verdict>;
type TimerHandler = Box<dyn FnMut(TimerTick) -> Verdict>;

struct FdWatch {
    handle: WatchHandle,
    fd: RawFd,
    interest: Interest,
    /// Fair-queue key: watches are polled and dispatched in ascending order
    /// of this stamp.
    last_served: Instant,
    handler: FdHandler,
}

struct SignalWatch {
    handle: WatchHandle,
    handler: SignalHandler,
}

struct VsignalWatch {
    handle: WatchHandle,
    handler: VsignalHandler,
}

struct TimerWatch {
    handle: WatchHandle,
    registered_at: Instant,
    delay: Duration,
    /// `Duration::ZERO` means one-shot.
    interval: Duration,
    fires: u64,
    handler: TimerHandler,
}

impl TimerWatch {
    fn next_deadline(&self) -> Instant {
        self.registered_at + self.delay + self.interval * self.fires as u32
    }
}

/// Where a handle's record lives, for O(1) unregistration.
#[derive(Debug, Clone, Copy)]
enum WatchKind {
    Fd,
    Signal(Signal),
    Vsignal(u32),
    Timer,
}

/// The per-thread event loop state owner.
///
/// Created with [`Reactor::new`], which also publishes this thread in the
/// process-wide directory so peers can [`crate::send_vsignal`] to it.
/// Destroyed with [`Reactor::shutdown`] (also run from `Drop` as a
/// backstop), which withdraws the directory entry and restores any signal
/// dispositions this thread still holds watches for.
pub struct Reactor {
    id: ReactorThreadId,
    wake: WakeChannel,
    slot: Option<SlotClaim>,
    inbox: Mailbox<u32>,
    fd_watches: Vec<FdWatch>,
    signal_watches: HashMap<i32, Vec<SignalWatch>>,
    vsignal_watches: HashMap<u32, Vec<VsignalWatch>>,
    timers: Vec<TimerWatch>,
    index: HashMap<WatchHandle, WatchKind>,
    down: bool,
}

impl Reactor {
    pub fn new() -> Result<Self, ReactorError> {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }

    /// Like [`Reactor::new`] with an explicit virtual-signal inbox capacity.
    pub fn with_inbox_capacity(capacity: usize) -> Result<Self, ReactorError> {
        let id = ReactorThreadId::current();
        let inbox = Mailbox::with_capacity(capacity)?;
        let wake = WakeChannel::create()?;
        let slot = os::claim_slot(id.raw(), wake.fd()).ok_or(ReactorError::SlotsExhausted)?;
        // The wake disposition stays installed as long as any reactor lives.
        if let Err(errno) = os::claim_signal(WAKE_SIGNAL) {
            slot.release();
            return Err(errno.into());
        }
        // Publish last: once the directory names this thread, peers may
        // signal it, so slot and disposition must already be in place.
        if !directory::register_thread(id, inbox.share()) {
            os::release_signal(WAKE_SIGNAL);
            slot.release();
            return Err(ReactorError::AlreadyRegistered);
        }
        debug!(%id, "reactor registered");
        Ok(Self {
            id,
            wake,
            slot: Some(slot),
            inbox,
            fd_watches: Vec::new(),
            signal_watches: HashMap::new(),
            vsignal_watches: HashMap::new(),
            timers: Vec::new(),
            index: HashMap::new(),
            down: false,
        })
    }

    pub fn thread_id(&self) -> ReactorThreadId {
        self.id
    }

    /// Live registrations of every kind.
    pub fn watch_count(&self) -> usize {
        self.index.len()
    }

    /// Watches `fd` for the given readiness. The descriptor must stay open
    /// while watched; a closed one surfaces as an error event.
    pub fn watch_fd(
        &mut self,
        fd: RawFd,
        interest: Interest,
        handler: impl FnMut(ReadyEvents) -> Verdict + 'static,
    ) -> WatchHandle {
        let handle = HANDLES.allocate();
        self.fd_watches.push(FdWatch {
            handle,
            fd,
            interest,
            last_served: Instant::now(),
            handler: Box::new(handler),
        });
        self.index.insert(handle, WatchKind::Fd);
        trace!(%handle, fd, "descriptor watch registered");
        handle
    }

    /// Watches a real OS signal. Any number of watches may share one signal
    /// number; process-wide, the first watch installs the two-phase handler
    /// and the last unregistration restores what was there before.
    pub fn watch_signal(
        &mut self,
        signal: Signal,
        handler: impl FnMut(Signal) -> Verdict + 'static,
    ) -> Result<WatchHandle, ReactorError> {
        if signal == WAKE_SIGNAL {
            return Err(ReactorError::ReservedSignal(signal));
        }
        os::claim_signal(signal)?;
        let handle = HANDLES.allocate();
        self.signal_watches
            .entry(signal as i32)
            .or_default()
            .push(SignalWatch {
                handle,
                handler: Box::new(handler),
            });
        self.index.insert(handle, WatchKind::Signal(signal));
        trace!(%handle, ?signal, "signal watch registered");
        Ok(handle)
    }

    /// Watches a virtual signal number, independent of the OS namespace.
    pub fn watch_vsignal(
        &mut self,
        vsig: VirtualSignal,
        handler: impl FnMut(VirtualSignal) -> Verdict + 'static,
    ) -> WatchHandle {
        let handle = HANDLES.allocate();
        self.vsignal_watches
            .entry(vsig.0)
            .or_default()
            .push(VsignalWatch {
                handle,
                handler: Box::new(handler),
            });
        self.index.insert(handle, WatchKind::Vsignal(vsig.0));
        trace!(%handle, %vsig, "virtual-signal watch registered");
        handle
    }

    /// Arms a timer firing `delay` from now, then every `interval`;
    /// `Duration::ZERO` as the interval makes it one-shot, unregistered
    /// automatically after it fires.
    pub fn watch_timer(
        &mut self,
        delay: Duration,
        interval: Duration,
        handler: impl FnMut(TimerTick) -> Verdict + 'static,
    ) -> WatchHandle {
        let handle = HANDLES.allocate();
        self.timers.push(TimerWatch {
            handle,
            registered_at: Instant::now(),
            delay,
            interval,
            fires: 0,
            handler: Box::new(handler),
        });
        self.index.insert(handle, WatchKind::Timer);
        trace!(%handle, ?delay, ?interval, "timer watch registered");
        handle
    }

    /// Removes a registration of any kind. The handle is invalid afterwards;
    /// a second removal reports `NotFound`.
    pub fn unregister(&mut self, handle: WatchHandle) -> Result<(), ReactorError> {
        let kind = self
            .index
            .remove(&handle)
            .ok_or(ReactorError::NotFound(handle))?;
        match kind {
            WatchKind::Fd => self.fd_watches.retain(|w| w.handle != handle),
            WatchKind::Timer => self.timers.retain(|t| t.handle != handle),
            WatchKind::Signal(signal) => {
                let signo = signal as i32;
                if let Some(watches) = self.signal_watches.get_mut(&signo) {
                    watches.retain(|w| w.handle != handle);
                    if watches.is_empty() {
                        self.signal_watches.remove(&signo);
                    }
                }
                os::release_signal(signal);
            }
            WatchKind::Vsignal(number) => {
                if let Some(watches) = self.vsignal_watches.get_mut(&number) {
                    watches.retain(|w| w.handle != handle);
                    if watches.is_empty() {
                        self.vsignal_watches.remove(&number);
                    }
                }
            }
        }
        trace!(%handle, "watch unregistered");
        Ok(())
    }

    /// Blocks dispatching events until a handler returns
    /// [`Verdict::Stop`], whose code becomes the return value. May be
    /// called again afterwards; undispatched signals and queued virtual
    /// signals survive between calls.
    pub fn run(&mut self) -> i32 {
        if self.down {
            warn!(id = %self.id, "run() called on a shut-down reactor");
            return 0;
        }
        trace!(watches = self.index.len(), "entering reactor loop");
        loop {
            // Fair queuing: longest-idle descriptors first.
            self.fd_watches.sort_by_key(|w| w.last_served);

            let poll_timeout = match self.next_timer_gap() {
                None => PollTimeout::NONE,
                // Capped at u16::MAX ms; the loop recomputes after every
                // wakeup, so a capped wait just iterates once more.
                Some(gap) => PollTimeout::from(gap.as_millis().min(u16::MAX as u128) as u16),
            };

            let mut pollfds = Vec::with_capacity(1 + self.fd_watches.len());
            // SAFETY: the wake fd stays open until shutdown, after this call.
            pollfds.push(PollFd::new(
                unsafe { BorrowedFd::borrow_raw(self.wake.fd()) },
                PollFlags::POLLIN,
            ));
            for watch in &self.fd_watches {
                // SAFETY: registered fds are required to outlive their
                // watch; one closed early is reported as POLLNVAL.
                pollfds.push(PollFd::new(
                    unsafe { BorrowedFd::borrow_raw(watch.fd) },
                    watch.interest.poll_flags(),
                ));
            }

            let interrupted = match poll(&mut pollfds, poll_timeout) {
                Ok(_) => false,
                // Expected transient: the interrupting signal may have set
                // pending bits, so fall through to dispatch.
                Err(Errno::EINTR) => true,
                Err(errno) => {
                    error!(%errno, "poll(2) failed");
                    panic!("poll(2) failed: {errno}");
                }
            };

            let mut wake_ready = false;
            let mut ready = Vec::new();
            if !interrupted {
                wake_ready = pollfds[0]
                    .revents()
                    .is_some_and(|r| r.contains(PollFlags::POLLIN));
                for (pollfd, watch) in pollfds[1..].iter().zip(&self.fd_watches) {
                    if let Some(revents) = pollfd.revents() {
                        let events = ReadyEvents::from_poll(revents);
                        if events.any() {
                            ready.push((watch.handle, events));
                        }
                    }
                }
            }
            drop(pollfds);

            if wake_ready {
                self.wake.drain();
            }

            // Signals before timers before descriptors.
            if let Some(code) = self.dispatch_signals() {
                return code;
            }
            if let Some(code) = self.dispatch_timers() {
                return code;
            }
            for (handle, events) in ready {
                let Some(watch) = self.fd_watches.iter_mut().find(|w| w.handle == handle) else {
                    continue;
                };
                watch.last_served = Instant::now();
                if let Verdict::Stop(code) = (watch.handler)(events) {
                    return code;
                }
            }
        }
    }

    /// Withdraws this thread from the directory, releases its routing slot
    /// and gives back every signal disposition it still holds. Idempotent.
    pub fn shutdown(&mut self) {
        if self.down {
            return;
        }
        self.down = true;
        directory::deregister_thread(self.id);
        for (signo, watches) in self.signal_watches.drain() {
            if let Ok(signal) = Signal::try_from(signo) {
                for _ in 0..watches.len() {
                    os::release_signal(signal);
                }
            }
        }
        os::release_signal(WAKE_SIGNAL);
        if let Some(slot) = self.slot.take() {
            slot.release();
        }
        self.fd_watches.clear();
        self.vsignal_watches.clear();
        self.timers.clear();
        self.index.clear();
        debug!(id = %self.id, "reactor shut down");
    }

    fn next_timer_gap(&self) -> Option<Duration> {
        let now = Instant::now();
        self.timers
            .iter()
            .map(|t| t.next_deadline().saturating_duration_since(now))
            .min()
    }

    /// Pending real signals in ascending-number order, then the virtual
    /// inbox in FIFO order. A `Stop` mid-way reposts the untouched real
    /// bits and leaves the rest of the inbox queued.
    fn dispatch_signals(&mut self) -> Option<i32> {
        let mut bits = match &self.slot {
            Some(claim) => claim.take_pending(),
            None => 0,
        };
        while bits != 0 {
            let signo = bits.trailing_zeros() as i32;
            bits &= bits - 1;
            let Ok(signal) = Signal::try_from(signo) else {
                continue;
            };
            if signal == WAKE_SIGNAL {
                // Carries no payload of its own; the inbox drain below is
                // the second half of its delivery.
                continue;
            }
            if let Some(code) = self.dispatch_one_signal(signal) {
                if bits != 0 {
                    if let Some(claim) = &self.slot {
                        claim.repost(bits);
                    }
                }
                return Some(code);
            }
        }
        self.drain_vsignals()
    }

    fn dispatch_one_signal(&mut self, signal: Signal) -> Option<i32> {
        let Some(watches) = self.signal_watches.get_mut(&(signal as i32)) else {
            debug!(?signal, "signal arrived with no local watcher");
            return None;
        };
        for watch in watches.iter_mut() {
            if let Verdict::Stop(code) = (watch.handler)(signal) {
                return Some(code);
            }
        }
        None
    }

    fn drain_vsignals(&mut self) -> Option<i32> {
        while let Some(number) = self.inbox.extract() {
            let Some(watches) = self.vsignal_watches.get_mut(&number) else {
                debug!(vsignal = number, "virtual signal with no watcher dropped");
                continue;
            };
            for watch in watches.iter_mut() {
                if let Verdict::Stop(code) = (watch.handler)(VirtualSignal(number)) {
                    return Some(code);
                }
            }
        }
        None
    }

    fn dispatch_timers(&mut self) -> Option<i32> {
        let now = Instant::now();
        let mut due: Vec<(WatchHandle, Instant)> = self
            .timers
            .iter()
            .filter(|t| t.next_deadline() <= now + TIMER_EPSILON)
            .map(|t| (t.handle, t.next_deadline()))
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);

        for (handle, _) in due {
            let Some(pos) = self.timers.iter().position(|t| t.handle == handle) else {
                continue;
            };
            let (verdict, one_shot) = {
                let timer = &mut self.timers[pos];
                timer.fires += 1;
                let tick = TimerTick { fires: timer.fires };
                ((timer.handler)(tick), timer.interval.is_zero())
            };
            if one_shot {
                self.timers.remove(pos);
                self.index.remove(&handle);
            }
            if let Verdict::Stop(code) = verdict {
                return Some(code);
            }
        }
        None
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vsignal::send_vsignal;
    use nix::sys::signal::raise;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct TestPipe {
        read: RawFd,
        write: RawFd,
    }

    impl TestPipe {
        fn new() -> Self {
            let mut fds = [0i32; 2];
            // SAFETY: fds points at a live two-slot array.
            let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
            assert_eq!(rc, 0);
            Self {
                read: fds[0],
                write: fds[1],
            }
        }

        fn preload(&self) {
            let byte = [1u8];
            // SAFETY: writes one byte from a live buffer.
            let rc = unsafe { libc::write(self.write, byte.as_ptr() as *const libc::c_void, 1) };
            assert_eq!(rc, 1);
        }
    }

    impl Drop for TestPipe {
        fn drop(&mut self) {
            // SAFETY: both fds are owned by this pipe.
            unsafe {
                libc::close(self.read);
                libc::close(self.write);
            }
        }
    }

    #[test]
    fn timers_fire_in_ascending_deadline_order() {
        let mut reactor = Reactor::new().unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));

        for delay in [50u64, 10, 30] {
            let order = Rc::clone(&order);
            reactor.watch_timer(Duration::from_millis(delay), Duration::ZERO, move |_| {
                order.borrow_mut().push(delay);
                if order.borrow().len() == 3 {
                    Verdict::Stop(0)
                } else {
                    Verdict::Continue
                }
            });
        }

        assert_eq!(reactor.run(), 0);
        assert_eq!(*order.borrow(), vec![10, 30, 50]);
        // One-shot timers removed themselves after firing.
        assert_eq!(reactor.watch_count(), 0);
    }

    #[test]
    fn periodic_timer_rearms_until_stopped() {
        let mut reactor = Reactor::new().unwrap();
        let started = Instant::now();

        reactor.watch_timer(
            Duration::from_millis(10),
            Duration::from_millis(10),
            |tick| {
                if tick.fires == 3 {
                    Verdict::Stop(7)
                } else {
                    Verdict::Continue
                }
            },
        );

        assert_eq!(reactor.run(), 7);
        assert!(started.elapsed() >= Duration::from_millis(25));
        // Periodic timers stay registered.
        assert_eq!(reactor.watch_count(), 1);
    }

    #[test]
    fn zero_delay_one_shot_fires_immediately() {
        let mut reactor = Reactor::new().unwrap();
        reactor.watch_timer(Duration::ZERO, Duration::ZERO, |tick| {
            assert_eq!(tick.fires, 1);
            Verdict::Stop(5)
        });
        assert_eq!(reactor.run(), 5);
    }

    #[test]
    fn ready_descriptors_are_served_fairly() {
        let first = TestPipe::new();
        let second = TestPipe::new();
        first.preload();
        second.preload();

        let counts = Rc::new(RefCell::new((0usize, 0usize)));
        let mut reactor = Reactor::new().unwrap();

        {
            let counts = Rc::clone(&counts);
            reactor.watch_fd(first.read, Interest::Readable, move |_| {
                let mut c = counts.borrow_mut();
                c.0 += 1;
                if c.0 + c.1 >= 20 {
                    Verdict::Stop(0)
                } else {
                    Verdict::Continue
                }
            });
        }
        {
            let counts = Rc::clone(&counts);
            reactor.watch_fd(second.read, Interest::Readable, move |_| {
                let mut c = counts.borrow_mut();
                c.1 += 1;
                if c.0 + c.1 >= 20 {
                    Verdict::Stop(0)
                } else {
                    Verdict::Continue
                }
            });
        }

        assert_eq!(reactor.run(), 0);
        let (served_first, served_second) = *counts.borrow();
        assert!(served_first + served_second >= 20);
        let gap = served_first.abs_diff(served_second);
        assert!(gap <= 1, "service counts diverged: {served_first} vs {served_second}");
    }

    #[test]
    fn vsignal_round_trip_invokes_exactly_once() {
        let mut reactor = Reactor::new().unwrap();
        let hits = Rc::new(RefCell::new(0u32));

        {
            let hits = Rc::clone(&hits);
            reactor.watch_vsignal(VirtualSignal(7), move |vsig| {
                assert_eq!(vsig, VirtualSignal(7));
                *hits.borrow_mut() += 1;
                Verdict::Stop(42)
            });
        }

        send_vsignal(reactor.thread_id(), VirtualSignal(7)).unwrap();
        assert_eq!(reactor.run(), 42);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn vsignal_wakes_a_blocked_reactor() {
        let mut reactor = Reactor::new().unwrap();
        reactor.watch_vsignal(VirtualSignal(9), |_| Verdict::Stop(9));

        let target = reactor.thread_id();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            send_vsignal(target, VirtualSignal(9)).unwrap();
        });

        // No timers registered: without the wake the poll would never return.
        let started = Instant::now();
        assert_eq!(reactor.run(), 9);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(started.elapsed() < Duration::from_secs(5));
        sender.join().unwrap();
    }

    #[test]
    fn real_signal_watch_stops_the_loop() {
        let mut reactor = Reactor::new().unwrap();
        reactor
            .watch_signal(Signal::SIGUSR1, |signal| {
                assert_eq!(signal, Signal::SIGUSR1);
                Verdict::Stop(3)
            })
            .unwrap();

        raise(Signal::SIGUSR1).unwrap();
        assert_eq!(reactor.run(), 3);
    }

    #[test]
    fn shared_signal_watches_run_in_registration_order() {
        let mut reactor = Reactor::new().unwrap();
        let order = Rc::new(RefCell::new(Vec::new()));

        {
            let order = Rc::clone(&order);
            reactor
                .watch_signal(Signal::SIGUSR2, move |_| {
                    order.borrow_mut().push(1);
                    Verdict::Continue
                })
                .unwrap();
        }
        {
            let order = Rc::clone(&order);
            reactor
                .watch_signal(Signal::SIGUSR2, move |_| {
                    order.borrow_mut().push(2);
                    Verdict::Stop(0)
                })
                .unwrap();
        }

        raise(Signal::SIGUSR2).unwrap();
        assert_eq!(reactor.run(), 0);
        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn wake_signal_cannot_be_watched() {
        let mut reactor = Reactor::new().unwrap();
        assert!(matches!(
            reactor.watch_signal(WAKE_SIGNAL, |_| Verdict::Continue),
            Err(ReactorError::ReservedSignal(_))
        ));
    }

    #[test]
    fn unregistering_unknown_handle_is_not_fatal() {
        let mut reactor = Reactor::new().unwrap();
        let handle = reactor.watch_timer(Duration::from_secs(3600), Duration::ZERO, |_| {
            Verdict::Continue
        });

        reactor.unregister(handle).unwrap();
        assert_eq!(
            reactor.unregister(handle),
            Err(ReactorError::NotFound(handle))
        );
    }

    #[test]
    fn one_reactor_per_thread() {
        let reactor = Reactor::new().unwrap();
        assert!(matches!(
            Reactor::new(),
            Err(ReactorError::AlreadyRegistered)
        ));
        drop(reactor);
        // Shutdown released the directory entry and routing slot.
        let again = Reactor::new().unwrap();
        drop(again);
    }

    #[test]
    fn inbox_backpressure_reaches_the_sender() {
        let reactor = Reactor::with_inbox_capacity(1).unwrap();
        let id = reactor.thread_id();

        send_vsignal(id, VirtualSignal(1)).unwrap();
        assert_eq!(
            send_vsignal(id, VirtualSignal(2)),
            Err(crate::vsignal::VsignalError::InboxFull(id))
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            /// Handles stay unique across arbitrary register/unregister
            /// interleavings, and a removed handle never works twice.
            #[test]
            fn handles_never_repeat(ops in prop::collection::vec(any::<bool>(), 1..60)) {
                let mut reactor = Reactor::new().unwrap();
                let mut live: Vec<WatchHandle> = Vec::new();
                let mut seen: HashSet<WatchHandle> = HashSet::new();

                for register in ops {
                    if register || live.is_empty() {
                        let handle = reactor.watch_timer(
                            Duration::from_secs(3600),
                            Duration::ZERO,
                            |_| Verdict::Continue,
                        );
                        prop_assert!(seen.insert(handle), "handle reused: {handle}");
                        live.push(handle);
                    } else {
                        let handle = live.swap_remove(live.len() / 2);
                        prop_assert!(reactor.unregister(handle).is_ok());
                        prop_assert!(reactor.unregister(handle).is_err());
                    }
                }
            }
        }
    }
}
