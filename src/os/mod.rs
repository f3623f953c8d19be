//! Platform abstraction for native thread operations.
//!
//! This module provides a unified interface over the native threading APIs
//! of each supported platform. The lifecycle core never branches on the
//! target OS itself; it is generic over an [`OsThread`] implementation and
//! the right backend is selected at build time through [`DefaultOs`].

use core::ffi::c_void;
use core::fmt::Debug;

/// Platform-specific thread identifier, widened to a common type.
///
/// `0` is never a valid identifier for a started thread.
pub type OsThreadId = u64;

/// Signature-neutral thread entry point.
///
/// Native creation APIs disagree on the entry signature (`extern "C"`
/// returning a pointer for pthreads, `extern "system"` returning a `u32`
/// for Win32), so each backend owns a tiny adapter that unpacks an
/// [`EntryPack`] and calls this common signature.
pub type ThreadEntry = unsafe extern "C" fn(*mut c_void);

/// Carries an entry point and its argument across the native spawn call.
pub(crate) struct EntryPack {
    pub(crate) entry: ThreadEntry,
    pub(crate) arg: *mut c_void,
}

/// Native threading capability trait.
///
/// One implementation exists per target OS. All operations map 1:1 onto
/// native threading calls; there is no retry or policy in this layer.
pub trait OsThread {
    /// Owned handle to a spawned native thread.
    ///
    /// The handle owns the right to join or release the thread; consuming
    /// operations take it by value so it cannot be used twice.
    type Handle: Send + Debug;

    /// Spawn a native thread running `entry(arg)`.
    ///
    /// On failure returns the raw OS error code and the thread never
    /// existed, so `arg` remains owned by the caller.
    fn spawn(entry: ThreadEntry, arg: *mut c_void) -> Result<(Self::Handle, OsThreadId), i32>;

    /// Block until the thread behind `handle` terminates, releasing the
    /// handle afterwards.
    fn join(handle: Self::Handle);

    /// Release the handle without waiting for the thread to terminate.
    fn release(handle: Self::Handle);

    /// Mask delivery of all asynchronous signals to the calling thread.
    ///
    /// No-op on platforms without a signal concept.
    fn block_all_signals();

    /// Give up the calling thread's time slice.
    fn yield_now();

    /// Identifier of the calling thread.
    fn current_id() -> OsThreadId;
}

#[cfg(unix)]
pub mod posix;
#[cfg(unix)]
pub use posix::{create_raw_mutex, create_tls_key, delete_raw_mutex, Posix as DefaultOs};

#[cfg(windows)]
pub mod windows;
#[cfg(windows)]
pub use windows::{create_raw_mutex, delete_raw_mutex, Win32 as DefaultOs};
