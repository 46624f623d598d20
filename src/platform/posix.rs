//! Linux pthreads adapter
//!
//! [`Posix`] configures a `pthread_attr_t` before calling `pthread_create`,
//! so a thread is never observable with the wrong scheduling. [`PosixLive`]
//! creates the thread first and reconfigures the running thread, which is the
//! model platforms without attribute objects are forced into.
//!
//! The attribute object only holds `SCHED_OTHER`, `SCHED_FIFO`, and
//! `SCHED_RR`. For `SCHED_BATCH` and `SCHED_IDLE` [`Posix`] falls back to the
//! live model, so both adapters accept the same properties.

use super::{Entry, Platform};
use crate::core::{CoreSet, Policy, Result, SchedulingProperties, ThreadError};
use libc::c_void;
use std::ffi::CString;
use std::io;
use std::mem::{self, MaybeUninit};
use std::ops::RangeInclusive;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

// Not exported by libc for every Linux target, so declared here.
const PTHREAD_EXPLICIT_SCHED: libc::c_int = 1;

extern "C" {
    fn pthread_attr_setinheritsched(
        attr: *mut libc::pthread_attr_t,
        inherit: libc::c_int,
    ) -> libc::c_int;
    fn pthread_attr_setschedpolicy(
        attr: *mut libc::pthread_attr_t,
        policy: libc::c_int,
    ) -> libc::c_int;
    fn pthread_attr_setschedparam(
        attr: *mut libc::pthread_attr_t,
        param: *const libc::sched_param,
    ) -> libc::c_int;
    fn pthread_attr_setaffinity_np(
        attr: *mut libc::pthread_attr_t,
        cpusetsize: libc::size_t,
        cpuset: *const libc::cpu_set_t,
    ) -> libc::c_int;
}

/// Attribute-first pthreads: properties are applied before the thread exists
#[derive(Debug, Clone, Copy, Default)]
pub struct Posix;

/// Create-then-configure pthreads: properties are applied to the running thread
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixLive;

impl Platform for Posix {
    type Handle = libc::pthread_t;

    const CONFIGURES_BEFORE_START: bool = true;

    fn configures_before_start(&self, properties: &SchedulingProperties) -> bool {
        properties.policy().map_or(true, attribute_policy)
    }

    fn spawn(&self, properties: &SchedulingProperties, entry: Entry) -> Result<Self::Handle> {
        if !self.configures_before_start(properties) {
            return spawn_unconfigured(properties, entry);
        }
        let mut attr = Attributes::new()?;
        if let Some(bytes) = properties.stack_size() {
            attr.set_stack_size(bytes)?;
        }
        if let Some(policy) = properties.policy() {
            attr.set_policy(policy)?;
        }
        // Explicit scheduling without a policy runs under SCHED_OTHER.
        let policy = properties.policy().unwrap_or(Policy::Other);
        match (properties.policy(), properties.priority()) {
            (_, Some(priority)) => attr.set_priority(policy, priority)?,
            (Some(_), None) => attr.set_priority(policy, lowest_priority(raw_policy(policy)))?,
            (None, None) => {}
        }
        let affinity = properties.effective_affinity();
        if let Some(cores) = affinity {
            attr.set_affinity(cores)?;
        }

        start(&attr, entry).map_err(|rc| creation_error(properties, affinity, rc))
    }

    fn apply_policy(
        &self,
        handle: &Self::Handle,
        policy: Policy,
        priority: Option<i32>,
    ) -> Result<()> {
        set_live_policy(*handle, policy, priority)
    }

    fn apply_priority(&self, handle: &Self::Handle, priority: i32) -> Result<()> {
        set_live_priority(*handle, priority)
    }

    fn apply_affinity(&self, handle: &Self::Handle, cores: &CoreSet) -> Result<()> {
        set_live_affinity(*handle, cores)
    }

    fn join(&self, handle: &Self::Handle) -> Result<()> {
        join_thread(*handle)
    }

    fn detach(&self, handle: &Self::Handle) -> Result<()> {
        detach_thread(*handle)
    }

    fn native_id(&self, handle: &Self::Handle) -> u64 {
        *handle as u64
    }
}

impl Platform for PosixLive {
    type Handle = libc::pthread_t;

    const CONFIGURES_BEFORE_START: bool = false;

    fn spawn(&self, properties: &SchedulingProperties, entry: Entry) -> Result<Self::Handle> {
        spawn_unconfigured(properties, entry)
    }

    fn apply_policy(
        &self,
        handle: &Self::Handle,
        policy: Policy,
        priority: Option<i32>,
    ) -> Result<()> {
        set_live_policy(*handle, policy, priority)
    }

    fn apply_priority(&self, handle: &Self::Handle, priority: i32) -> Result<()> {
        set_live_priority(*handle, priority)
    }

    fn apply_affinity(&self, handle: &Self::Handle, cores: &CoreSet) -> Result<()> {
        set_live_affinity(*handle, cores)
    }

    fn join(&self, handle: &Self::Handle) -> Result<()> {
        join_thread(*handle)
    }

    fn detach(&self, handle: &Self::Handle) -> Result<()> {
        detach_thread(*handle)
    }

    fn native_id(&self, handle: &Self::Handle) -> u64 {
        *handle as u64
    }
}

/// Policies `pthread_attr_setschedpolicy` accepts. The others can only be
/// set on a running thread.
fn attribute_policy(policy: Policy) -> bool {
    matches!(policy, Policy::Other | Policy::Fifo | Policy::RoundRobin)
}

/// Start a thread with only its stack size set
fn spawn_unconfigured(
    properties: &SchedulingProperties,
    entry: Entry,
) -> Result<libc::pthread_t> {
    let mut attr = Attributes::new()?;
    if let Some(bytes) = properties.stack_size() {
        attr.set_stack_size(bytes)?;
    }
    start(&attr, entry).map_err(|rc| ThreadError::creation_os("pthread_create failed", rc))
}

/// Owned `pthread_attr_t`, destroyed on drop
struct Attributes {
    raw: libc::pthread_attr_t,
}

impl Attributes {
    fn new() -> Result<Self> {
        let mut raw = MaybeUninit::<libc::pthread_attr_t>::uninit();
        let rc = unsafe { libc::pthread_attr_init(raw.as_mut_ptr()) };
        if rc != 0 {
            return Err(ThreadError::creation_os(
                "failed to initialise thread attributes",
                rc,
            ));
        }
        Ok(Self {
            // SAFETY: pthread_attr_init succeeded
            raw: unsafe { raw.assume_init() },
        })
    }

    fn set_stack_size(&mut self, bytes: usize) -> Result<()> {
        let rc = unsafe { libc::pthread_attr_setstacksize(&mut self.raw, bytes) };
        if rc != 0 {
            return Err(ThreadError::CreationFailed {
                message: format!("stack size of {} bytes rejected", bytes),
                source: Some(io::Error::from_raw_os_error(rc)),
            });
        }
        Ok(())
    }

    fn set_policy(&mut self, policy: Policy) -> Result<()> {
        let raw = raw_policy(policy);
        let rc = unsafe { pthread_attr_setinheritsched(&mut self.raw, PTHREAD_EXPLICIT_SCHED) };
        if rc != 0 {
            return Err(ThreadError::policy_rejected(raw, rc));
        }
        let rc = unsafe { pthread_attr_setschedpolicy(&mut self.raw, raw) };
        if rc != 0 {
            return Err(ThreadError::policy_rejected(raw, rc));
        }
        Ok(())
    }

    fn set_priority(&mut self, policy: Policy, priority: i32) -> Result<()> {
        check_priority(raw_policy(policy), priority)?;
        let rc = unsafe { pthread_attr_setinheritsched(&mut self.raw, PTHREAD_EXPLICIT_SCHED) };
        if rc != 0 {
            return Err(ThreadError::priority_rejected(priority, rc));
        }
        let param = sched_param(priority);
        let rc = unsafe { pthread_attr_setschedparam(&mut self.raw, &param) };
        if rc != 0 {
            return Err(ThreadError::priority_rejected(priority, rc));
        }
        Ok(())
    }

    fn set_affinity(&mut self, cores: &CoreSet) -> Result<()> {
        let set = cpu_set(cores)?;
        let rc = unsafe {
            pthread_attr_setaffinity_np(&mut self.raw, mem::size_of::<libc::cpu_set_t>(), &set)
        };
        if rc != 0 {
            return Err(ThreadError::affinity_rejected(
                cores.to_vec(),
                io::Error::from_raw_os_error(rc).to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for Attributes {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_attr_destroy(&mut self.raw);
        }
    }
}

fn start(attr: &Attributes, entry: Entry) -> std::result::Result<libc::pthread_t, i32> {
    let payload = Box::into_raw(Box::new(entry));
    let mut thread = MaybeUninit::<libc::pthread_t>::uninit();
    let rc = unsafe { libc::pthread_create(thread.as_mut_ptr(), &attr.raw, trampoline, payload.cast()) };
    if rc != 0 {
        // SAFETY: the thread was not created, so the payload is still ours
        drop(unsafe { Box::from_raw(payload) });
        return Err(rc);
    }
    // SAFETY: pthread_create succeeded
    Ok(unsafe { thread.assume_init() })
}

extern "C" fn trampoline(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `arg` is the boxed entry leaked by `start`, received exactly once
    let entry = unsafe { Box::from_raw(arg.cast::<Entry>()) };
    if catch_unwind(AssertUnwindSafe(move || entry())).is_err() {
        log::error!("thread body unwound past its entry point");
    }
    ptr::null_mut()
}

fn creation_error(
    properties: &SchedulingProperties,
    affinity: Option<&CoreSet>,
    rc: i32,
) -> ThreadError {
    match (rc, properties.policy(), properties.priority(), affinity) {
        // Explicit scheduling is checked for privilege only at creation.
        (libc::EPERM, Some(policy), _, _) => ThreadError::policy_rejected(policy.as_raw(), rc),
        (libc::EPERM, None, Some(priority), _) => ThreadError::priority_rejected(priority, rc),
        (libc::EINVAL, _, _, Some(cores)) => ThreadError::affinity_rejected(
            cores.to_vec(),
            io::Error::from_raw_os_error(rc).to_string(),
        ),
        _ => ThreadError::creation_os("pthread_create failed", rc),
    }
}

fn set_live_policy(handle: libc::pthread_t, policy: Policy, priority: Option<i32>) -> Result<()> {
    let raw = raw_policy(policy);
    let priority = match priority {
        Some(priority) => {
            check_priority(raw, priority)?;
            priority
        }
        None => lowest_priority(raw),
    };
    let param = sched_param(priority);
    let rc = unsafe { libc::pthread_setschedparam(handle, raw, &param) };
    if rc != 0 {
        return Err(ThreadError::policy_rejected(raw, rc));
    }
    Ok(())
}

fn set_live_priority(handle: libc::pthread_t, priority: i32) -> Result<()> {
    let mut raw: libc::c_int = 0;
    let mut param = sched_param(0);
    let rc = unsafe { libc::pthread_getschedparam(handle, &mut raw, &mut param) };
    if rc != 0 {
        return Err(ThreadError::priority_rejected(priority, rc));
    }
    check_priority(raw, priority)?;
    param.sched_priority = priority;
    let rc = unsafe { libc::pthread_setschedparam(handle, raw, &param) };
    if rc != 0 {
        return Err(ThreadError::priority_rejected(priority, rc));
    }
    Ok(())
}

fn set_live_affinity(handle: libc::pthread_t, cores: &CoreSet) -> Result<()> {
    let set = cpu_set(cores)?;
    let rc =
        unsafe { libc::pthread_setaffinity_np(handle, mem::size_of::<libc::cpu_set_t>(), &set) };
    if rc != 0 {
        return Err(ThreadError::affinity_rejected(
            cores.to_vec(),
            io::Error::from_raw_os_error(rc).to_string(),
        ));
    }
    Ok(())
}

fn join_thread(handle: libc::pthread_t) -> Result<()> {
    let rc = unsafe { libc::pthread_join(handle, ptr::null_mut()) };
    if rc != 0 {
        return Err(ThreadError::join(format!(
            "pthread_join: {}",
            io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

fn detach_thread(handle: libc::pthread_t) -> Result<()> {
    let rc = unsafe { libc::pthread_detach(handle) };
    if rc != 0 {
        return Err(ThreadError::detach(format!(
            "pthread_detach: {}",
            io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

fn sched_param(priority: i32) -> libc::sched_param {
    // musl carries extra reserved fields, so start from zeroes.
    let mut param: libc::sched_param = unsafe { mem::zeroed() };
    param.sched_priority = priority;
    param
}

fn cpu_set(cores: &CoreSet) -> Result<libc::cpu_set_t> {
    let limit = libc::CPU_SETSIZE as usize;
    if let Some(max) = cores.max_core() {
        if max >= limit {
            return Err(ThreadError::affinity_rejected(
                cores.to_vec(),
                format!("core {} is beyond the {} cores a cpu_set_t holds", max, limit),
            ));
        }
    }
    let mut set: libc::cpu_set_t = unsafe { mem::zeroed() };
    for core in cores.iter() {
        unsafe { libc::CPU_SET(core, &mut set) };
    }
    Ok(set)
}

fn check_priority(raw_policy: i32, priority: i32) -> Result<()> {
    match raw_priority_range(raw_policy) {
        Some(range) if !range.contains(&priority) => {
            Err(ThreadError::priority_rejected(priority, libc::EINVAL))
        }
        _ => Ok(()),
    }
}

fn lowest_priority(raw_policy: i32) -> i32 {
    raw_priority_range(raw_policy).map_or(0, |range| *range.start())
}

fn raw_priority_range(raw_policy: i32) -> Option<RangeInclusive<i32>> {
    let min = unsafe { libc::sched_get_priority_min(raw_policy) };
    let max = unsafe { libc::sched_get_priority_max(raw_policy) };
    (min >= 0 && max >= min).then(|| min..=max)
}

pub(super) fn raw_policy(policy: Policy) -> i32 {
    match policy {
        Policy::Other => libc::SCHED_OTHER,
        Policy::Fifo => libc::SCHED_FIFO,
        Policy::RoundRobin => libc::SCHED_RR,
        Policy::Batch => libc::SCHED_BATCH,
        Policy::Idle => libc::SCHED_IDLE,
    }
}

pub(super) fn priority_range(policy: Policy) -> Option<RangeInclusive<i32>> {
    raw_priority_range(raw_policy(policy))
}

pub(super) fn allowed_cores() -> Result<CoreSet> {
    let mut set: libc::cpu_set_t = unsafe { mem::zeroed() };
    let rc = unsafe { libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) };
    if rc != 0 {
        return Err(ThreadError::other(format!(
            "sched_getaffinity: {}",
            io::Error::last_os_error()
        )));
    }
    Ok((0..libc::CPU_SETSIZE as usize)
        .filter(|&core| unsafe { libc::CPU_ISSET(core, &set) })
        .collect())
}

pub(super) fn online_cores() -> usize {
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    usize::try_from(count).unwrap_or(1).max(1)
}

pub(super) fn name_current_thread(name: &str) {
    // 16 bytes including the terminator.
    let mut end = name.len().min(15);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let Ok(cname) = CString::new(&name[..end]) else {
        log::debug!("thread name {:?} contains a NUL byte, not applied", name);
        return;
    };
    let rc = unsafe { libc::pthread_setname_np(libc::pthread_self(), cname.as_ptr()) };
    if rc != 0 {
        log::debug!(
            "pthread_setname_np({:?}): {}",
            cname,
            io::Error::from_raw_os_error(rc)
        );
    }
}
