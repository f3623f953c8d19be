//! Win32 backend.

use core::ffi::c_void;
use core::fmt;
use core::mem;
use core::ptr;

use winapi::shared::minwindef::{DWORD, LPVOID};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::CloseHandle;
use winapi::um::minwinbase::CRITICAL_SECTION;
use winapi::um::processthreadsapi::{CreateThread, GetCurrentThreadId};
use winapi::um::synchapi::{
    DeleteCriticalSection, InitializeCriticalSection, Sleep, WaitForSingleObject,
};
use winapi::um::winbase::INFINITE;
use winapi::um::winnt::HANDLE;

use super::{EntryPack, OsThread, OsThreadId, ThreadEntry};

/// Win32 implementation of [`OsThread`].
pub struct Win32;

/// Owned `HANDLE` to a spawned thread.
pub struct Win32Handle(HANDLE);

// A thread HANDLE is process-wide; ownership may move between threads.
unsafe impl Send for Win32Handle {}

impl fmt::Debug for Win32Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Win32Handle({:p})", self.0)
    }
}

unsafe extern "system" fn thread_start(arg: LPVOID) -> DWORD {
    let pack = unsafe { Box::from_raw(arg.cast::<EntryPack>()) };
    unsafe { (pack.entry)(pack.arg) };
    0
}

impl OsThread for Win32 {
    type Handle = Win32Handle;

    fn spawn(entry: ThreadEntry, arg: *mut c_void) -> Result<(Self::Handle, OsThreadId), i32> {
        let pack = Box::into_raw(Box::new(EntryPack { entry, arg }));
        let mut thread_id: DWORD = 0;
        let handle = unsafe {
            CreateThread(
                ptr::null_mut(),
                0,
                Some(thread_start),
                pack.cast(),
                0,
                &mut thread_id,
            )
        };
        if handle.is_null() {
            // The thread never existed; the pack is still ours to free.
            drop(unsafe { Box::from_raw(pack) });
            return Err(unsafe { GetLastError() } as i32);
        }
        Ok((Win32Handle(handle), OsThreadId::from(thread_id)))
    }

    fn join(handle: Self::Handle) {
        unsafe {
            WaitForSingleObject(handle.0, INFINITE);
            CloseHandle(handle.0);
        }
    }

    fn release(handle: Self::Handle) {
        unsafe {
            CloseHandle(handle.0);
        }
    }

    fn block_all_signals() {
        // Win32 has no asynchronous signal concept.
    }

    fn yield_now() {
        unsafe {
            Sleep(0);
        }
    }

    fn current_id() -> OsThreadId {
        OsThreadId::from(unsafe { GetCurrentThreadId() })
    }
}

/// Allocate and initialise a raw `CRITICAL_SECTION`.
///
/// The section lives until passed to [`delete_raw_mutex`].
pub fn create_raw_mutex() -> *mut CRITICAL_SECTION {
    let section = Box::into_raw(Box::new(unsafe { mem::zeroed::<CRITICAL_SECTION>() }));
    unsafe { InitializeCriticalSection(section) };
    section
}

/// Destroy and free a critical section obtained from [`create_raw_mutex`].
///
/// # Safety
///
/// `section` must have been returned by [`create_raw_mutex`], must not be
/// owned by any thread, and must not be used afterwards.
pub unsafe fn delete_raw_mutex(section: *mut CRITICAL_SECTION) {
    unsafe {
        DeleteCriticalSection(section);
        drop(Box::from_raw(section));
    }
}
