//! # utkik-reactor
//!
//! Per-thread event reactor multiplexing file descriptors, OS signals,
//! virtual signals and timers into one blocking `poll(2)` wait. Linux-only:
//! the wakeup path is an eventfd and signal routing uses pthread identities.
//!
//! ### Key Submodules:
//! - `reactor`: the per-thread callback registry and its `run()` loop
//! - `vsignal`: software-defined signals multiplexed over one real signal
//! - `spawn`: thread creation with scheduling policy + startup handshake
//! - `watch`: the handler vocabulary (`Verdict`, interest masks, timer ticks)
//!
//! ### Expectations (Production):
//! - One reactor per thread, enforced at registration time
//! - Handlers never observe a torn registry: dispatch is single-threaded
//! - A full wait iteration services signals, then timers, then descriptors

mod directory;
mod os;

pub mod reactor;
pub mod spawn;
pub mod vsignal;
pub mod watch;

pub mod prelude {
    pub use crate::reactor::*;
    pub use crate::spawn::*;
    pub use crate::vsignal::*;
    pub use crate::watch::*;
    pub use crate::ReactorThreadId;
}

pub use directory::ReactorThreadId;
pub use os::unrouted_signal_count;
pub use reactor::{Reactor, ReactorError};
pub use spawn::{spawn_reactor_thread, SchedPolicy, SpawnOptions, SpawnedThread, StartGate};
pub use utkik_core::handle::WatchHandle;
pub use vsignal::{send_vsignal, VirtualSignal, VsignalError, WAKE_SIGNAL};
pub use watch::{Interest, ReadyEvents, TimerTick, Verdict};
