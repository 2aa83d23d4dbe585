//! # utkik-core
//!
//! Foundation layer for the utkik reactor stack: the bounded mailbox every
//! thread pair communicates through, and the process-wide handle allocator
//! that names callback registrations.
//!
//! ### Key Submodules:
//! - `mailbox`: fixed-capacity, mutex-protected message queue with explicit
//!   back-pressure
//! - `handle`: process-wide unique watch handles, never reused while live

pub mod handle;
pub mod mailbox;

pub mod prelude {
    pub use crate::handle::*;
    pub use crate::mailbox::*;
}

pub use handle::{HandleAllocator, WatchHandle};
pub use mailbox::{Mailbox, MailboxError};
