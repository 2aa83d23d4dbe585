//! ## utkik-resolver::engine
//! **Bounded worker pool racing blocking lookups against a deadline**
//!
//! ### Key Design Features:
//! 1. **Pull-based handout** - a worker owns at most one task; finishing
//!    it, the worker pushes its index into the coordinator's report inbox
//!    and is handed the next task or retired.
//! 2. **Deadline enforcement** - a one-shot timer on the coordinating
//!    reactor flips the shared cutoff flag and nudges every live worker
//!    with the exit signal; a second, pre-armed grace timer bounds how
//!    long stragglers may delay the final join.
//! 3. **Outcome cells** - workers write results into mutex-guarded
//!    per-target cells, so a lookup that outlives the deadline finishes
//!    its write without racing the caller.
//!
//! ### Expectations:
//! - `resolve_all` returns within `timeout + grace` of being called
//! - A worker stuck in an uninterruptible lookup is logged and detached,
//!   never waited for indefinitely

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use utkik_core::mailbox::{Mailbox, MailboxError};
use utkik_reactor::reactor::DEFAULT_INBOX_CAPACITY;
use utkik_reactor::{
    send_vsignal, spawn_reactor_thread, Reactor, ReactorError, ReactorThreadId, SchedPolicy,
    SpawnOptions, SpawnedThread, StartGate, Verdict, VirtualSignal,
};
use utkik_telemetry::MetricsRecorder;

use crate::lookup::{LookupOutcome, LookupTarget, NameResolver, SystemResolver};

/// Ceiling on pool size regardless of configuration or target count.
pub const MAX_WORKERS: usize = 64;

/// Worker-side: a task is waiting in the task inbox.
const VSIG_TASK: VirtualSignal = VirtualSignal(1);
/// Coordinator-side: some worker pushed its index into the report inbox.
const VSIG_REPORT: VirtualSignal = VirtualSignal(2);
/// Coordinator-side: worker `i` left its run loop (number = base + i).
const VSIG_EXITED_BASE: u32 = 0x100;

/// Watched by every worker so it can be pulled out of a blocked wait.
const EXIT_SIGNAL: Signal = Signal::SIGTERM;

/// Worker exit codes, visible in logs only.
const WORKER_DONE: i32 = 1;
const WORKER_CUT_OFF: i32 = 2;

/// Coordinator exit codes.
const ALL_JOINED: i32 = 1;
const GRACE_EXPIRED: i32 = 2;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Reactor(#[from] ReactorError),
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Pool sizing and deadline knobs.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on concurrent workers; the pool never exceeds the
    /// number of targets either.
    pub workers: usize,
    /// Wall-clock budget for the whole batch.
    pub timeout: Duration,
    /// Extra wait after the deadline for workers stuck in a blocking call.
    pub grace: Duration,
    /// Scheduling class applied to worker threads.
    pub policy: SchedPolicy,
    /// Virtual-signal inbox slots on each worker reactor.
    pub inbox_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            timeout: Duration::from_secs(5),
            grace: Duration::from_secs(2),
            policy: SchedPolicy::Inherit,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// What [`ResolverEngine::resolve_all`] hands back.
#[derive(Debug)]
pub struct ResolveReport {
    /// Tasks fully processed before the cutoff.
    pub completed: usize,
    /// Per-target outcome, index-aligned with the input; `None` when the
    /// deadline arrived first.
    pub outcomes: Vec<Option<LookupOutcome>>,
}

struct TargetCell {
    target: LookupTarget,
    outcome: Mutex<Option<LookupOutcome>>,
}

struct WorkerSlot {
    thread: ReactorThreadId,
    task_inbox: Mailbox<usize>,
    join: Option<SpawnedThread>,
    /// Task index currently out with this worker.
    assigned: Option<usize>,
}

struct PoolState {
    slots: Vec<WorkerSlot>,
    /// Next task index to hand out.
    cursor: usize,
    completed: usize,
    joined: usize,
    total: usize,
}

impl PoolState {
    /// Worker `index` has no task in flight: count what it just finished,
    /// then hand it the next task or retire it.
    fn worker_ready(&mut self, index: usize, cutoff: &AtomicBool) {
        if let Some(task) = self.slots[index].assigned.take() {
            self.completed += 1;
            debug!(worker = index, task, completed = self.completed, "task completed");
        }
        if !cutoff.load(Ordering::Relaxed) && self.cursor < self.total {
            let task = self.cursor;
            self.cursor += 1;
            if let Err(err) = self.slots[index].task_inbox.submit(task) {
                // Capacity is one and the worker just reported idle; give
                // the task back so another report can pick it up.
                warn!(worker = index, task, %err, "task inbox refused handout");
                self.cursor = task;
                return;
            }
            self.slots[index].assigned = Some(task);
            if let Err(err) = send_vsignal(self.slots[index].thread, VSIG_TASK) {
                warn!(worker = index, %err, "worker unreachable for task nudge");
            }
        } else if let Err(err) = self.slots[index].thread.signal(EXIT_SIGNAL) {
            debug!(worker = index, %err, "worker already gone at retire time");
        }
    }

    fn join_worker(&mut self, index: usize) -> Verdict {
        // Workers deregister their reactor before sending the exit notice,
        // so a notice naming a still-registered thread is stale traffic
        // (a recycled thread id from an earlier batch), not a real exit.
        if self.slots[index].thread.is_registered() {
            debug!(worker = index, "exit notice for a live worker ignored");
            return Verdict::Continue;
        }
        if let Some(thread) = self.slots[index].join.take() {
            match thread.join() {
                Ok(code) => debug!(worker = index, code, "worker joined"),
                Err(_) => warn!(worker = index, "worker panicked"),
            }
            self.joined += 1;
        }
        if self.joined == self.slots.len() {
            Verdict::Stop(ALL_JOINED)
        } else {
            Verdict::Continue
        }
    }
}

/// Resolves batches of targets in parallel under a hard deadline.
///
/// The engine owns no threads between batches; each [`resolve_all`] call
/// builds a fresh pool sized to the batch and tears it down before
/// returning. The calling thread hosts the coordinating reactor, so it
/// must not already own one.
///
/// [`resolve_all`]: ResolverEngine::resolve_all
pub struct ResolverEngine {
    options: EngineOptions,
    resolver: Arc<dyn NameResolver>,
    metrics: MetricsRecorder,
}

impl ResolverEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self::with_resolver(options, Arc::new(SystemResolver))
    }

    /// Injection point for tests and alternative lookup backends.
    pub fn with_resolver(options: EngineOptions, resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            options,
            resolver,
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Resolves every target, stopping at the configured deadline. Returns
    /// once all workers have exited or the grace period has expired;
    /// `completed` may be less than the target count in the latter cases.
    pub fn resolve_all(&self, targets: &[LookupTarget]) -> Result<ResolveReport, EngineError> {
        if targets.is_empty() {
            return Ok(ResolveReport {
                completed: 0,
                outcomes: Vec::new(),
            });
        }

        let worker_count = targets
            .len()
            .min(self.options.workers)
            .min(MAX_WORKERS)
            .max(1);
        info!(
            targets = targets.len(),
            workers = worker_count,
            timeout = ?self.options.timeout,
            "starting resolution batch"
        );

        let cells: Arc<Vec<TargetCell>> = Arc::new(
            targets
                .iter()
                .cloned()
                .map(|target| TargetCell {
                    target,
                    outcome: Mutex::new(None),
                })
                .collect(),
        );
        let cutoff = Arc::new(AtomicBool::new(false));

        // The coordinating reactor must exist before the first worker
        // spawns: workers address their reports to this thread.
        let mut reactor = Reactor::with_inbox_capacity(worker_count * 4 + 8)?;
        let coordinator = reactor.thread_id();
        let reports: Mailbox<usize> = Mailbox::with_capacity(worker_count)?;

        let mut slots = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let task_inbox: Mailbox<usize> = Mailbox::with_capacity(1)?;
            let spawned = self.spawn_worker(index, &task_inbox, &cells, &reports, &cutoff, coordinator);
            slots.push(WorkerSlot {
                thread: spawned.thread_id(),
                task_inbox,
                join: Some(spawned),
                assigned: None,
            });
        }

        let shared = Rc::new(RefCell::new(PoolState {
            slots,
            cursor: 0,
            completed: 0,
            joined: 0,
            total: targets.len(),
        }));

        {
            let shared = Rc::clone(&shared);
            let reports = reports.share();
            let cutoff = Arc::clone(&cutoff);
            reactor.watch_vsignal(VSIG_REPORT, move |_| {
                while let Some(index) = reports.extract() {
                    shared.borrow_mut().worker_ready(index, &cutoff);
                }
                Verdict::Continue
            });
        }

        for index in 0..worker_count {
            let shared = Rc::clone(&shared);
            reactor.watch_vsignal(VirtualSignal(VSIG_EXITED_BASE + index as u32), move |_| {
                shared.borrow_mut().join_worker(index)
            });
        }

        {
            let shared = Rc::clone(&shared);
            let cutoff = Arc::clone(&cutoff);
            let metrics = self.metrics.clone();
            reactor.watch_timer(self.options.timeout, Duration::ZERO, move |_| {
                cutoff.store(true, Ordering::Relaxed);
                metrics.inc_deadline_expirations();
                let pool = shared.borrow();
                warn!(
                    completed = pool.completed,
                    total = pool.total,
                    "deadline reached, cutting off workers"
                );
                for slot in pool.slots.iter().filter(|s| s.join.is_some()) {
                    if let Err(err) = slot.thread.signal(EXIT_SIGNAL) {
                        debug!(%err, "worker already gone at cutoff");
                    }
                }
                Verdict::Continue
            });
        }
        {
            // Pre-armed: watches cannot be added from inside a handler.
            let shared = Rc::clone(&shared);
            let grace_deadline = self.options.timeout + self.options.grace;
            reactor.watch_timer(grace_deadline, Duration::ZERO, move |_| {
                let pool = shared.borrow();
                warn!(
                    missing = pool.slots.len() - pool.joined,
                    completed = pool.completed,
                    "grace period expired with workers still out"
                );
                Verdict::Stop(GRACE_EXPIRED)
            });
        }

        // Seed the pool: every worker starts idle with nothing assigned.
        for index in 0..worker_count {
            shared.borrow_mut().worker_ready(index, &cutoff);
        }

        let code = reactor.run();
        // Free the directory entry and routing slot before returning so
        // the caller can run another batch on this thread.
        drop(reactor);

        let state = Rc::try_unwrap(shared)
            .ok()
            .expect("reactor handlers still hold pool state")
            .into_inner();
        for (index, slot) in state.slots.iter().enumerate() {
            if slot.join.is_some() {
                warn!(worker = index, "worker left detached after grace period");
            }
        }

        let outcomes: Vec<Option<LookupOutcome>> =
            cells.iter().map(|cell| cell.outcome.lock().take()).collect();
        debug!(code, completed = state.completed, "resolution batch finished");
        Ok(ResolveReport {
            completed: state.completed,
            outcomes,
        })
    }

    fn spawn_worker(
        &self,
        index: usize,
        tasks: &Mailbox<usize>,
        cells: &Arc<Vec<TargetCell>>,
        reports: &Mailbox<usize>,
        cutoff: &Arc<AtomicBool>,
        coordinator: ReactorThreadId,
    ) -> SpawnedThread {
        let ctx = WorkerContext {
            index,
            tasks: tasks.share(),
            cells: Arc::clone(cells),
            reports: reports.share(),
            cutoff: Arc::clone(cutoff),
            coordinator,
            resolver: Arc::clone(&self.resolver),
            metrics: self.metrics.clone(),
            inbox_capacity: self.options.inbox_capacity,
        };
        let options = SpawnOptions {
            name: format!("utkik-worker-{index}"),
            policy: self.options.policy,
            stack_size: None,
        };
        spawn_reactor_thread(options, move |gate| worker_entry(gate, ctx))
    }
}

struct WorkerContext {
    index: usize,
    tasks: Mailbox<usize>,
    cells: Arc<Vec<TargetCell>>,
    reports: Mailbox<usize>,
    cutoff: Arc<AtomicBool>,
    coordinator: ReactorThreadId,
    resolver: Arc<dyn NameResolver>,
    metrics: MetricsRecorder,
    inbox_capacity: usize,
}

fn worker_entry(gate: StartGate, ctx: WorkerContext) -> i32 {
    let WorkerContext {
        index,
        tasks,
        cells,
        reports,
        cutoff,
        coordinator,
        resolver,
        metrics,
        inbox_capacity,
    } = ctx;

    let mut reactor = match Reactor::with_inbox_capacity(inbox_capacity) {
        Ok(reactor) => reactor,
        Err(err) => {
            error!(worker = index, %err, "worker reactor setup failed");
            std::process::abort();
        }
    };
    if let Err(err) = reactor.watch_signal(EXIT_SIGNAL, |_| Verdict::Stop(WORKER_DONE)) {
        error!(worker = index, %err, "worker exit watch failed");
        std::process::abort();
    }

    reactor.watch_vsignal(VSIG_TASK, move |_| {
        if cutoff.load(Ordering::Relaxed) {
            return Verdict::Stop(WORKER_CUT_OFF);
        }
        let Some(task) = tasks.extract() else {
            return Verdict::Continue;
        };
        let cell = &cells[task];
        let started = Instant::now();
        let outcome = resolver.resolve(&cell.target);
        metrics.observe_lookup_latency(started.elapsed().as_secs_f64());
        metrics.inc_lookups();
        if outcome.is_err() {
            metrics.inc_lookup_failures();
        }
        debug!(
            worker = index,
            task,
            target = %cell.target,
            ok = outcome.is_ok(),
            "lookup finished"
        );
        *cell.outcome.lock() = Some(outcome);
        ask_for_more(index, &reports, coordinator);
        Verdict::Continue
    });

    gate.release();
    let code = reactor.run();
    drop(reactor);
    notify_exit(index, coordinator);
    code
}

fn ask_for_more(index: usize, reports: &Mailbox<usize>, coordinator: ReactorThreadId) {
    if let Err(err) = reports.submit(index) {
        warn!(worker = index, %err, "report inbox rejected completion notice");
        return;
    }
    if let Err(err) = send_vsignal(coordinator, VSIG_REPORT) {
        debug!(worker = index, %err, "coordinator unreachable for completion notice");
    }
}

fn notify_exit(index: usize, coordinator: ReactorThreadId) {
    if let Err(err) = send_vsignal(coordinator, VirtualSignal(VSIG_EXITED_BASE + index as u32)) {
        debug!(worker = index, %err, "coordinator unreachable for exit notice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeResolver {
        delay: Duration,
        log: Mutex<Vec<String>>,
    }

    impl FakeResolver {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                log: Mutex::new(Vec::new()),
            })
        }
    }

    impl NameResolver for FakeResolver {
        fn resolve(&self, target: &LookupTarget) -> LookupOutcome {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.log.lock().push(target.to_string());
            Ok(format!("name-{target}"))
        }
    }

    fn hosts(n: usize) -> Vec<LookupTarget> {
        (0..n)
            .map(|i| LookupTarget::Host(format!("host-{i}.example")))
            .collect()
    }

    fn options(workers: usize, timeout: Duration, grace: Duration) -> EngineOptions {
        EngineOptions {
            workers,
            timeout,
            grace,
            ..EngineOptions::default()
        }
    }

    #[test]
    fn resolves_every_target_under_a_generous_deadline() {
        let engine = ResolverEngine::with_resolver(
            options(3, Duration::from_secs(10), Duration::from_secs(2)),
            FakeResolver::new(Duration::ZERO),
        );

        let targets = hosts(10);
        let report = engine.resolve_all(&targets).unwrap();

        assert_eq!(report.completed, 10);
        for (i, outcome) in report.outcomes.iter().enumerate() {
            assert_eq!(
                outcome.as_ref().unwrap().as_ref().unwrap(),
                &format!("name-host-{i}.example")
            );
        }
    }

    #[test]
    fn deadline_cuts_a_slow_batch_short() {
        let engine = ResolverEngine::with_resolver(
            options(2, Duration::from_millis(100), Duration::from_millis(1200)),
            FakeResolver::new(Duration::from_millis(30)),
        );

        let targets = hosts(10);
        let started = Instant::now();
        let report = engine.resolve_all(&targets).unwrap();
        let elapsed = started.elapsed();

        assert!(report.completed > 0, "nothing completed");
        assert!(report.completed < 10, "deadline had no effect");
        assert!(elapsed < Duration::from_millis(2500), "took {elapsed:?}");
    }

    #[test]
    fn stuck_worker_is_detached_after_grace() {
        let engine = ResolverEngine::with_resolver(
            options(1, Duration::from_millis(80), Duration::from_millis(150)),
            FakeResolver::new(Duration::from_secs(5)),
        );

        let targets = hosts(1);
        let started = Instant::now();
        let report = engine.resolve_all(&targets).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.completed, 0);
        assert_eq!(report.outcomes, vec![None]);
        assert!(elapsed >= Duration::from_millis(200), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "waited for straggler: {elapsed:?}");

        let text = engine.metrics().gather_metrics().unwrap();
        assert!(text.contains("utkik_deadline_expirations_total 1"));
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let engine = ResolverEngine::with_resolver(
            EngineOptions::default(),
            FakeResolver::new(Duration::ZERO),
        );
        let report = engine.resolve_all(&[]).unwrap();
        assert_eq!(report.completed, 0);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn single_worker_processes_in_submission_order() {
        let resolver = FakeResolver::new(Duration::ZERO);
        let engine = ResolverEngine::with_resolver(
            options(1, Duration::from_secs(10), Duration::from_secs(2)),
            Arc::clone(&resolver) as Arc<dyn NameResolver>,
        );

        let targets = hosts(5);
        let report = engine.resolve_all(&targets).unwrap();

        assert_eq!(report.completed, 5);
        let log = resolver.log.lock();
        let expected: Vec<String> = (0..5).map(|i| format!("host-{i}.example")).collect();
        assert_eq!(*log, expected);
    }

    #[test]
    fn engine_is_reusable_on_one_thread() {
        let engine = ResolverEngine::with_resolver(
            options(2, Duration::from_secs(10), Duration::from_secs(2)),
            FakeResolver::new(Duration::ZERO),
        );

        let first = engine.resolve_all(&hosts(4)).unwrap();
        let second = engine.resolve_all(&hosts(4)).unwrap();
        assert_eq!(first.completed, 4);
        assert_eq!(second.completed, 4);
    }

    #[test]
    fn metrics_count_the_batch() {
        let engine = ResolverEngine::with_resolver(
            options(3, Duration::from_secs(10), Duration::from_secs(2)),
            FakeResolver::new(Duration::ZERO),
        );

        engine.resolve_all(&hosts(10)).unwrap();
        let text = engine.metrics().gather_metrics().unwrap();
        assert!(text.contains("utkik_lookups_total 10"), "metrics were:\n{text}");
    }
}
