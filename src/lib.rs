#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Portable OS thread creation, lifecycle and join primitive.
//!
//! This library is the concurrency building block underneath a logging
//! framework's asynchronous facilities: run one unit of work on a new OS
//! thread and let callers observe completion. The guiding principle is
//! that a logging subsystem must never crash the host process, so any
//! failure inside a running unit of work is absorbed at the thread
//! boundary and logged instead of propagated.
//!
//! # Quick Start
//!
//! ```
//! use osthread::{Runnable, Thread};
//!
//! struct Flusher;
//!
//! impl Runnable for Flusher {
//!     fn run(&self) -> anyhow::Result<()> {
//!         // flush buffered records here
//!         Ok(())
//!     }
//! }
//!
//! let thread = Thread::new(Flusher);
//! thread.start()?;
//! thread.join()?;
//! assert!(!thread.is_running());
//! # Ok::<(), osthread::ThreadError>(())
//! ```
//!
//! # Architecture
//!
//! The library is organized around a few small abstractions:
//! - [`Thread`], a shared-ownership handle over one unit of work bound to
//!   one OS thread, with a `Created -> Running -> Finished` lifecycle
//! - [`Runnable`], the trait a concrete unit of work implements
//! - [`os::OsThread`], the per-platform capability trait behind thread
//!   creation, join, signal masking and yielding
//! - [`ndc`], the per-thread diagnostic context consumed by logging calls

pub mod errors;
pub mod ndc;
pub mod os;
pub mod thread;

// Errors
pub use errors::{JoinError, SpawnError, ThreadError, ThreadResult};

// Platform abstraction
pub use os::{DefaultOs, OsThread, OsThreadId};

// Threads
pub use thread::{Runnable, Thread, ThreadState};

/// Yield the current OS thread's time slice.
#[inline]
pub fn yield_now() {
    <os::DefaultOs as os::OsThread>::yield_now();
}

/// Identifier of the calling OS thread.
#[inline]
pub fn current_thread_id() -> os::OsThreadId {
    <os::DefaultOs as os::OsThread>::current_id()
}

/// Render the calling OS thread's identifier as text, for log formatting.
pub fn current_thread_name() -> String {
    current_thread_id().to_string()
}
