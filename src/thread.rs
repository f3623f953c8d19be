//! Thread entity, trampoline and lifecycle state machine.
//!
//! The hard problem this module solves is the startup/teardown boundary:
//! the spawning caller and the spawned execution context both need the
//! thread entity to stay alive, and they lose interest in it at
//! independent, unpredictable times. Shared ownership through [`Arc`]
//! covers both ends: [`Thread::start`] grants the spawned context its own
//! reference by leaking a clone into the raw trampoline argument, and the
//! trampoline takes that reference back with [`Arc::from_raw`]. Whichever
//! side drops the last reference destroys the entity, possibly on the
//! spawned thread as it tears itself down.

use core::any::Any;
use core::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use portable_atomic::{AtomicU64, AtomicU8, Ordering};

use crate::errors::{JoinError, SpawnError};
use crate::ndc;
use crate::os::{DefaultOs, OsThread, OsThreadId};

/// A unit of work executable on its own OS thread.
pub trait Runnable: Send + Sync + 'static {
    /// The work the thread performs.
    ///
    /// Runs concurrently with the caller's continuation after
    /// [`Thread::start`] returns. An `Err` is absorbed at the thread
    /// boundary and logged as a warning; it never reaches `start` or
    /// `join` and never crashes the host process.
    ///
    /// Implementations are responsible for synchronizing anything they
    /// touch that is also touched elsewhere.
    fn run(&self) -> anyhow::Result<()>;
}

/// Lifecycle state of a [`Thread`].
///
/// `Created -> Running -> Finished`, with no way back; a fresh entity is
/// required for a new run. A failed [`Thread::start`] rolls back to
/// `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Constructed, not started yet.
    Created = 0,
    /// `start` was invoked and `run` has not returned yet.
    Running = 1,
    /// `run` returned and the trampoline cleared the running flag.
    Finished = 2,
}

/// Shared-ownership handle to a unit of work bound to one OS thread.
///
/// Cloning is cheap and shares the same entity. Immediately after a
/// successful [`start`](Self::start) exactly two references exist: the
/// caller's and the spawned context's. Dropping every caller-side handle
/// while `run` is still executing is fine; the entity survives until the
/// trampoline releases its own reference.
///
/// The backend parameter `O` is selected at build time through
/// [`DefaultOs`] and only varies in tests.
pub struct Thread<R: Runnable, O: OsThread = DefaultOs> {
    inner: Arc<ThreadInner<R, O>>,
}

struct ThreadInner<R, O: OsThread> {
    work: R,
    state: AtomicU8,
    /// 0 until a successful `start` records the real identifier.
    os_id: AtomicU64,
    /// Owned OS handle; taken by `join`, released by the destructor if
    /// still present.
    handle: Mutex<Option<O::Handle>>,
}

impl<R: Runnable> Thread<R> {
    /// Create a new, not yet started entity around `work`.
    pub fn new(work: R) -> Self {
        Self::with_backend(work)
    }
}

impl<R: Runnable, O: OsThread> Thread<R, O> {
    /// Like [`Thread::new`] but for an explicit backend.
    pub fn with_backend(work: R) -> Self {
        Self {
            inner: Arc::new(ThreadInner {
                work,
                state: AtomicU8::new(ThreadState::Created as u8),
                os_id: AtomicU64::new(0),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Spawn an OS thread running the entity's unit of work.
    ///
    /// On success the entity is `Running` and holds the new OS handle and
    /// identifier. On failure the speculative ownership grant and the
    /// running flag are rolled back, so the entity is exactly as it was
    /// before the call.
    ///
    /// Calling `start` again on an already started entity is a misuse;
    /// it will not corrupt the reference count or leak the prior handle,
    /// but which thread `join` then waits for is unspecified.
    pub fn start(&self) -> Result<(), SpawnError> {
        self.inner.state.store(ThreadState::Running as u8, Ordering::Release);

        // The spawned context's share of ownership. The trampoline takes
        // it back with Arc::from_raw.
        let arg = Arc::into_raw(Arc::clone(&self.inner)) as *mut c_void;

        match O::spawn(trampoline::<R, O>, arg) {
            Ok((handle, os_id)) => {
                self.inner.os_id.store(os_id, Ordering::Release);
                let stale = lock_handle(&self.inner.handle).replace(handle);
                if let Some(stale) = stale {
                    O::release(stale);
                }
                Ok(())
            }
            Err(code) => {
                // The thread never existed; reclaim the granted reference
                // and restore the not-running state.
                drop(unsafe { Arc::from_raw(arg.cast_const().cast::<ThreadInner<R, O>>()) });
                self.inner.state.store(ThreadState::Created as u8, Ordering::Release);
                Err(SpawnError::CreationFailed { code })
            }
        }
    }

    /// Block until the spawned thread has fully terminated.
    ///
    /// Purely a wait: joining does not affect ownership of the entity.
    /// Joining an already finished thread returns immediately.
    pub fn join(&self) -> Result<(), JoinError> {
        if self.state() == ThreadState::Created {
            return Err(JoinError::NotStarted);
        }
        let handle = lock_handle(&self.inner.handle).take();
        match handle {
            Some(handle) => O::join(handle),
            // The handle was already consumed by another join; fall back
            // to waiting on the state flag.
            None => {
                while self.state() != ThreadState::Finished {
                    O::yield_now();
                }
            }
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ThreadState {
        match self.inner.state.load(Ordering::Acquire) {
            1 => ThreadState::Running,
            2 => ThreadState::Finished,
            _ => ThreadState::Created,
        }
    }

    /// Whether the unit of work is currently considered running.
    ///
    /// True from right before the spawn attempt until `run` has returned.
    pub fn is_running(&self) -> bool {
        self.state() == ThreadState::Running
    }

    /// OS identifier of the spawned thread, once `start` has succeeded.
    pub fn os_id(&self) -> Option<OsThreadId> {
        match self.inner.os_id.load(Ordering::Acquire) {
            0 => None,
            os_id => Some(os_id),
        }
    }
}

impl<R: Runnable, O: OsThread> Clone for Thread<R, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, O: OsThread> Drop for ThreadInner<R, O> {
    fn drop(&mut self) {
        // May run on the spawned thread as it tears itself down; only
        // releases the OS resource, never blocks.
        let slot = match self.handle.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = slot.take() {
            O::release(handle);
        }
    }
}

fn lock_handle<H>(handle: &Mutex<Option<H>>) -> MutexGuard<'_, Option<H>> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Common entry point every spawned OS thread begins in.
///
/// Adapts the native threading API to the entity model: takes over the
/// reference granted by `start`, runs the unit of work behind a
/// catch-everything boundary, clears the running flag and the thread's
/// diagnostic context, then lets its reference go.
unsafe extern "C" fn trampoline<R: Runnable, O: OsThread>(arg: *mut c_void) {
    // Only a designated thread of the host process should handle signals;
    // the unit of work must never race a signal handler.
    O::block_all_signals();

    if arg.is_null() {
        // Creation-API contract violation, not a runtime failure.
        log::error!("thread trampoline invoked with a null argument");
        return;
    }

    let inner = unsafe { Arc::from_raw(arg.cast_const().cast::<ThreadInner<R, O>>()) };

    match panic::catch_unwind(AssertUnwindSafe(|| inner.work.run())) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::warn!("thread run() terminated with an error: {err:#}"),
        Err(payload) => log::warn!("thread run() panicked: {}", panic_message(&*payload)),
    }

    inner.state.store(ThreadState::Finished as u8, Ordering::Release);
    ndc::remove();

    // If this was the last reference, the entity is destroyed here, on
    // the terminating thread.
    drop(inner);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os::ThreadEntry;
    use portable_atomic::{AtomicBool, AtomicUsize};
    use std::time::{Duration, Instant};

    /// Spin until `condition` holds, failing the test after ten seconds.
    fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            crate::yield_now();
        }
    }

    mod capture {
        use std::sync::{Mutex, Once};

        struct CaptureLogger;

        static RECORDS: Mutex<Vec<String>> = Mutex::new(Vec::new());
        static LOGGER: CaptureLogger = CaptureLogger;

        impl log::Log for CaptureLogger {
            fn enabled(&self, _: &log::Metadata<'_>) -> bool {
                true
            }

            fn log(&self, record: &log::Record<'_>) {
                RECORDS
                    .lock()
                    .unwrap()
                    .push(format!("{} {}", record.level(), record.args()));
            }

            fn flush(&self) {}
        }

        pub(super) fn init() {
            static INIT: Once = Once::new();
            INIT.call_once(|| {
                let _ = log::set_logger(&LOGGER);
                log::set_max_level(log::LevelFilter::Trace);
            });
        }

        pub(super) fn logged(level: &str, needle: &str) -> bool {
            RECORDS
                .lock()
                .unwrap()
                .iter()
                .any(|record| record.starts_with(level) && record.contains(needle))
        }
    }

    struct CountingWork {
        counter: Arc<AtomicUsize>,
    }

    impl Runnable for CountingWork {
        fn run(&self) -> anyhow::Result<()> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingWork {
        marker: &'static str,
    }

    impl Runnable for FailingWork {
        fn run(&self) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("{} hit an unrecoverable condition", self.marker))
        }
    }

    struct PanickingWork;

    impl Runnable for PanickingWork {
        fn run(&self) -> anyhow::Result<()> {
            panic!("panicking-work-marker");
        }
    }

    /// Loops until `gate` opens; `dropped` records entity destruction.
    struct GatedWork {
        gate: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl Runnable for GatedWork {
        fn run(&self) -> anyhow::Result<()> {
            while !self.gate.load(Ordering::Acquire) {
                crate::yield_now();
            }
            Ok(())
        }
    }

    impl Drop for GatedWork {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    /// Backend whose spawn always fails, for rollback tests.
    struct FailingOs;

    impl OsThread for FailingOs {
        type Handle = ();

        fn spawn(_: ThreadEntry, _: *mut c_void) -> Result<((), OsThreadId), i32> {
            Err(11)
        }

        fn join(_: ()) {}

        fn release(_: ()) {}

        fn block_all_signals() {}

        fn yield_now() {}

        fn current_id() -> OsThreadId {
            0
        }
    }

    #[test]
    fn run_increments_counter_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let thread = Thread::new(CountingWork {
            counter: Arc::clone(&counter),
        });

        assert_eq!(thread.state(), ThreadState::Created);
        assert!(!thread.is_running());
        assert_eq!(thread.os_id(), None);

        thread.start().unwrap();
        thread.join().unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!thread.is_running());
        assert_eq!(thread.state(), ThreadState::Finished);
        assert!(thread.os_id().is_some());
    }

    #[test]
    fn running_flag_follows_the_lifecycle_without_join() {
        let gate = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let thread = Thread::new(GatedWork {
            gate: Arc::clone(&gate),
            dropped: Arc::clone(&dropped),
        });

        assert!(!thread.is_running());
        thread.start().unwrap();
        assert!(thread.is_running());

        gate.store(true, Ordering::Release);
        // The flag clears deterministically once run() returns, with no
        // join involved.
        wait_until("running flag to clear", || !thread.is_running());

        // Joining an already finished thread returns immediately.
        thread.join().unwrap();
        thread.join().unwrap();
    }

    #[test]
    fn entity_has_two_owners_while_spawned_thread_lives() {
        let gate = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let thread = Thread::new(GatedWork {
            gate: Arc::clone(&gate),
            dropped: Arc::clone(&dropped),
        });

        assert_eq!(Arc::strong_count(&thread.inner), 1);
        thread.start().unwrap();
        assert_eq!(Arc::strong_count(&thread.inner), 2);

        gate.store(true, Ordering::Release);
        thread.join().unwrap();
        wait_until("trampoline to release its reference", || {
            Arc::strong_count(&thread.inner) == 1
        });
        assert!(!dropped.load(Ordering::Acquire));
    }

    #[test]
    fn dropping_caller_handle_mid_run_defers_destruction() {
        let gate = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let thread = Thread::new(GatedWork {
            gate: Arc::clone(&gate),
            dropped: Arc::clone(&dropped),
        });

        thread.start().unwrap();
        drop(thread);

        // The spawned context still holds its reference; the entity must
        // not be destroyed while run() is looping on the gate.
        for _ in 0..100 {
            crate::yield_now();
        }
        assert!(!dropped.load(Ordering::Acquire));

        gate.store(true, Ordering::Release);
        wait_until("entity destruction on the spawned thread", || {
            dropped.load(Ordering::Acquire)
        });
    }

    #[test]
    fn error_from_run_is_absorbed_and_logged() {
        capture::init();
        let thread = Thread::new(FailingWork {
            marker: "failing-work-marker",
        });

        thread.start().unwrap();
        thread.join().unwrap();

        assert!(!thread.is_running());
        wait_until("warning to be logged", || {
            capture::logged("WARN", "failing-work-marker")
        });
    }

    #[test]
    fn panic_from_run_is_absorbed_and_logged() {
        capture::init();
        let thread = Thread::new(PanickingWork);

        thread.start().unwrap();
        thread.join().unwrap();

        assert!(!thread.is_running());
        wait_until("warning to be logged", || {
            capture::logged("WARN", "panicking-work-marker")
        });
    }

    #[test]
    fn failed_spawn_rolls_back_state_and_ownership() {
        let counter = Arc::new(AtomicUsize::new(0));
        let thread = Thread::<_, FailingOs>::with_backend(CountingWork {
            counter: Arc::clone(&counter),
        });

        let err = thread.start().unwrap_err();
        assert_eq!(err, SpawnError::CreationFailed { code: 11 });

        assert_eq!(thread.state(), ThreadState::Created);
        assert!(!thread.is_running());
        assert_eq!(thread.os_id(), None);
        assert_eq!(Arc::strong_count(&thread.inner), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(thread.join(), Err(JoinError::NotStarted));
    }

    #[test]
    fn join_before_start_is_rejected() {
        let thread = Thread::new(CountingWork {
            counter: Arc::new(AtomicUsize::new(0)),
        });
        assert_eq!(thread.join(), Err(JoinError::NotStarted));
    }
}
