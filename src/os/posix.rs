//! POSIX (`pthread`) backend.

use core::ffi::c_void;
use core::mem;
use core::ptr;

use super::{EntryPack, OsThread, OsThreadId, ThreadEntry};

/// POSIX implementation of [`OsThread`].
pub struct Posix;

/// Owned `pthread_t` of a joinable thread.
///
/// `pthread_t` is a raw pointer on some targets, so the wrapper carries the
/// `Send` promise: the identity of a joinable thread may be moved between
/// threads.
#[derive(Debug)]
pub struct PosixHandle(libc::pthread_t);

unsafe impl Send for PosixHandle {}

// pthread_create wants `extern "C" fn(*mut c_void) -> *mut c_void`; unpack
// the signature-neutral entry here.
extern "C" fn thread_start(arg: *mut c_void) -> *mut c_void {
    let pack = unsafe { Box::from_raw(arg.cast::<EntryPack>()) };
    unsafe { (pack.entry)(pack.arg) };
    ptr::null_mut()
}

impl OsThread for Posix {
    type Handle = PosixHandle;

    #[allow(clippy::unnecessary_cast)]
    fn spawn(entry: ThreadEntry, arg: *mut c_void) -> Result<(Self::Handle, OsThreadId), i32> {
        let pack = Box::into_raw(Box::new(EntryPack { entry, arg }));
        let mut handle: libc::pthread_t = unsafe { mem::zeroed() };
        let rc = unsafe { libc::pthread_create(&mut handle, ptr::null(), thread_start, pack.cast()) };
        if rc != 0 {
            // The thread never existed; the pack is still ours to free.
            drop(unsafe { Box::from_raw(pack) });
            return Err(rc);
        }
        Ok((PosixHandle(handle), handle as OsThreadId))
    }

    fn join(handle: Self::Handle) {
        let _ = unsafe { libc::pthread_join(handle.0, ptr::null_mut()) };
    }

    fn release(handle: Self::Handle) {
        let _ = unsafe { libc::pthread_detach(handle.0) };
    }

    fn block_all_signals() {
        let mut signal_set: libc::sigset_t = unsafe { mem::zeroed() };
        unsafe {
            libc::sigfillset(&mut signal_set);
            libc::pthread_sigmask(libc::SIG_BLOCK, &signal_set, ptr::null_mut());
        }
    }

    fn yield_now() {
        unsafe {
            libc::sched_yield();
        }
    }

    #[allow(clippy::unnecessary_cast)]
    fn current_id() -> OsThreadId {
        unsafe { libc::pthread_self() as OsThreadId }
    }
}

/// Allocate and initialise a raw `pthread_mutex_t`.
///
/// The mutex lives until passed to [`delete_raw_mutex`].
pub fn create_raw_mutex() -> *mut libc::pthread_mutex_t {
    let mutex = Box::into_raw(Box::new(unsafe { mem::zeroed::<libc::pthread_mutex_t>() }));
    unsafe { libc::pthread_mutex_init(mutex, ptr::null()) };
    mutex
}

/// Destroy and free a mutex obtained from [`create_raw_mutex`].
///
/// # Safety
///
/// `mutex` must have been returned by [`create_raw_mutex`], must be
/// unlocked, and must not be used afterwards.
pub unsafe fn delete_raw_mutex(mutex: *mut libc::pthread_mutex_t) {
    unsafe {
        libc::pthread_mutex_destroy(mutex);
        drop(Box::from_raw(mutex));
    }
}

/// Create a thread-local storage key with an optional per-thread cleanup
/// function, run at thread exit for threads that stored a non-null value.
pub fn create_tls_key(cleanup: Option<unsafe extern "C" fn(*mut c_void)>) -> libc::pthread_key_t {
    let mut key: libc::pthread_key_t = 0;
    unsafe { libc::pthread_key_create(&mut key, cleanup) };
    key
}
