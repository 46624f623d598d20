//! Win32 threads adapter
//!
//! Win32 has no attribute object for priority or affinity, so threads are
//! created running and configured through their handle. Scheduling classes
//! are process-wide on Windows; a per-thread policy is accepted and ignored.

use super::{Entry, Platform};
use crate::core::{CoreSet, Policy, Result, SchedulingProperties, ThreadError};
use std::ffi::c_void;
use std::io;
use std::ops::RangeInclusive;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows_sys::Win32::System::Threading::{
    CreateThread, GetCurrentProcess, GetCurrentThread, GetCurrentThreadId,
    GetProcessAffinityMask, SetThreadAffinityMask, SetThreadDescription, SetThreadPriority,
    WaitForSingleObject, INFINITE, THREAD_PRIORITY_IDLE, THREAD_PRIORITY_TIME_CRITICAL,
};

/// Create-then-configure Win32 threads
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32;

/// Owned Win32 thread handle and its thread id
#[derive(Debug)]
pub struct Win32Handle {
    raw: HANDLE,
    id: u32,
}

impl Platform for Win32 {
    type Handle = Win32Handle;

    const CONFIGURES_BEFORE_START: bool = false;

    fn spawn(&self, properties: &SchedulingProperties, entry: Entry) -> Result<Self::Handle> {
        let payload = Box::into_raw(Box::new(entry));
        let mut id = 0u32;
        let raw = unsafe {
            CreateThread(
                ptr::null(),
                properties.stack_size().unwrap_or(0),
                Some(trampoline),
                payload.cast::<c_void>(),
                0,
                &mut id,
            )
        };
        if raw == 0 {
            let err = io::Error::last_os_error();
            // SAFETY: the thread was not created, so the payload is still ours
            drop(unsafe { Box::from_raw(payload) });
            return Err(ThreadError::CreationFailed {
                message: "CreateThread failed".to_string(),
                source: Some(err),
            });
        }
        Ok(Win32Handle { raw, id })
    }

    fn apply_policy(
        &self,
        handle: &Self::Handle,
        policy: Policy,
        priority: Option<i32>,
    ) -> Result<()> {
        log::debug!("scheduling policy {} has no per-thread effect on Windows", policy);
        match priority {
            Some(priority) => self.apply_priority(handle, priority),
            None => Ok(()),
        }
    }

    fn apply_priority(&self, handle: &Self::Handle, priority: i32) -> Result<()> {
        if unsafe { SetThreadPriority(handle.raw, priority) } == 0 {
            return Err(ThreadError::PriorityRejected {
                priority,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn apply_affinity(&self, handle: &Self::Handle, cores: &CoreSet) -> Result<()> {
        let mask = affinity_mask(cores)?;
        if unsafe { SetThreadAffinityMask(handle.raw, mask) } == 0 {
            return Err(ThreadError::affinity_rejected(
                cores.to_vec(),
                io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }

    fn join(&self, handle: &Self::Handle) -> Result<()> {
        if handle.id == unsafe { GetCurrentThreadId() } {
            return Err(ThreadError::join("a thread cannot join itself"));
        }
        if unsafe { WaitForSingleObject(handle.raw, INFINITE) } != WAIT_OBJECT_0 {
            return Err(ThreadError::join(format!(
                "WaitForSingleObject: {}",
                io::Error::last_os_error()
            )));
        }
        // The thread is gone once the wait succeeds, whatever CloseHandle says.
        close_after_wait(handle);
        Ok(())
    }

    fn detach(&self, handle: &Self::Handle) -> Result<()> {
        if unsafe { CloseHandle(handle.raw) } == 0 {
            return Err(ThreadError::detach(format!(
                "CloseHandle: {}",
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn native_id(&self, handle: &Self::Handle) -> u64 {
        u64::from(handle.id)
    }
}

fn close_after_wait(handle: &Win32Handle) -> bool {
    if unsafe { CloseHandle(handle.raw) } == 0 {
        log::warn!(
            "thread {}: CloseHandle after join: {}",
            handle.id,
            io::Error::last_os_error()
        );
        return false;
    }
    true
}

unsafe extern "system" fn trampoline(arg: *mut c_void) -> u32 {
    // SAFETY: `arg` is the boxed entry leaked by `spawn`, received exactly once
    let entry = unsafe { Box::from_raw(arg.cast::<Entry>()) };
    if catch_unwind(AssertUnwindSafe(move || entry())).is_err() {
        log::error!("thread body unwound past its entry point");
    }
    0
}

fn affinity_mask(cores: &CoreSet) -> Result<usize> {
    let limit = usize::BITS as usize;
    if let Some(max) = cores.max_core() {
        if max >= limit {
            return Err(ThreadError::affinity_rejected(
                cores.to_vec(),
                format!("core {} is beyond the {} cores of one processor group", max, limit),
            ));
        }
    }
    Ok(cores.iter().fold(0usize, |mask, core| mask | (1usize << core)))
}

pub(super) fn raw_policy(policy: Policy) -> i32 {
    match policy {
        Policy::Other => 0,
        Policy::Fifo => 1,
        Policy::RoundRobin => 2,
        Policy::Batch => 3,
        Policy::Idle => 5,
    }
}

pub(super) fn priority_range(_policy: Policy) -> Option<RangeInclusive<i32>> {
    Some(THREAD_PRIORITY_IDLE..=THREAD_PRIORITY_TIME_CRITICAL)
}

pub(super) fn allowed_cores() -> Result<CoreSet> {
    let mut process = 0usize;
    let mut system = 0usize;
    if unsafe { GetProcessAffinityMask(GetCurrentProcess(), &mut process, &mut system) } == 0 {
        return Err(ThreadError::other(format!(
            "GetProcessAffinityMask: {}",
            io::Error::last_os_error()
        )));
    }
    Ok((0..usize::BITS as usize)
        .filter(|core| process & (1usize << core) != 0)
        .collect())
}

pub(super) fn online_cores() -> usize {
    let mut process = 0usize;
    let mut system = 0usize;
    if unsafe { GetProcessAffinityMask(GetCurrentProcess(), &mut process, &mut system) } == 0 {
        return 1;
    }
    (system.count_ones() as usize).max(1)
}

pub(super) fn name_current_thread(name: &str) {
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let hr = unsafe { SetThreadDescription(GetCurrentThread(), wide.as_ptr()) };
    if hr < 0 {
        log::debug!("SetThreadDescription({:?}) failed: {:#x}", name, hr);
    }
}
