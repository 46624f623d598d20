//! Native thread boundary
//!
//! [`Platform`] is the set of native operations a [`Thread`](crate::Thread)
//! needs: start a thread running a closure, apply policy, priority, and
//! affinity, wait for the thread, and give it up. Each OS family provides
//! one implementation and [`NativePlatform`] picks it at build time.
//!
//! Platforms differ in *when* scheduling properties can be applied. Those
//! with thread attribute objects set [`Platform::CONFIGURES_BEFORE_START`]
//! and apply everything inside [`Platform::spawn`]. The others start the
//! thread unconfigured and the handle applies each property to the live
//! thread while the thread body waits on a [`StartGate`](crate::core::StartGate).

use crate::core::{CoreSet, Policy, Result, SchedulingProperties};
use std::ops::RangeInclusive;

#[cfg(target_os = "linux")]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use posix::{Posix, PosixLive};
#[cfg(windows)]
pub use windows::{Win32, Win32Handle};

/// Adapter selected for the build target
#[cfg(target_os = "linux")]
pub type NativePlatform = Posix;

/// Adapter selected for the build target
#[cfg(windows)]
pub type NativePlatform = Win32;

#[cfg(not(any(target_os = "linux", windows)))]
compile_error!("os_compat_thread supports Linux and Windows targets only");

/// Thread body handed to a platform
pub type Entry = Box<dyn FnOnce() + Send + 'static>;

/// Native thread operations for one OS family
pub trait Platform: Send + Sync + 'static {
    /// Owned native handle of a started thread
    type Handle: Send + 'static;

    /// Whether [`spawn`](Self::spawn) applies policy, priority, and affinity
    /// itself. When `false` the caller applies them to the live thread.
    const CONFIGURES_BEFORE_START: bool;

    /// Whether [`spawn`](Self::spawn) applies the scheduling fields of these
    /// particular `properties`.
    ///
    /// Defaults to [`CONFIGURES_BEFORE_START`](Self::CONFIGURES_BEFORE_START).
    /// An attribute-first platform returns `false` for properties its
    /// attribute object cannot hold; the handle then configures the live
    /// thread behind the start gate instead.
    fn configures_before_start(&self, properties: &SchedulingProperties) -> bool {
        let _ = properties;
        Self::CONFIGURES_BEFORE_START
    }

    /// Start a native thread running `entry`.
    ///
    /// Stack size is always honoured. Scheduling fields of `properties` are
    /// honoured only when [`configures_before_start`](Self::configures_before_start)
    /// is `true` for them; in that case policy, priority, and affinity are
    /// applied in that order and the thread is never created if any is
    /// rejected.
    fn spawn(&self, properties: &SchedulingProperties, entry: Entry) -> Result<Self::Handle>;

    /// Switch a live thread to `policy`, at `priority` if given or the
    /// lowest priority the policy accepts otherwise.
    ///
    /// Platforms without scheduling classes only apply the priority.
    fn apply_policy(
        &self,
        handle: &Self::Handle,
        policy: Policy,
        priority: Option<i32>,
    ) -> Result<()>;

    /// Change the priority of a live thread, keeping its policy
    fn apply_priority(&self, handle: &Self::Handle, priority: i32) -> Result<()>;

    /// Restrict a live thread to `cores`
    fn apply_affinity(&self, handle: &Self::Handle, cores: &CoreSet) -> Result<()>;

    /// Block until the thread terminates and release it.
    ///
    /// On success the handle is dead and must not be used again; on error it
    /// is still owned by the caller.
    fn join(&self, handle: &Self::Handle) -> Result<()>;

    /// Release the thread without waiting. Same handle contract as `join`.
    fn detach(&self, handle: &Self::Handle) -> Result<()>;

    /// OS identifier of the thread
    fn native_id(&self, handle: &Self::Handle) -> u64;
}

/// Raw OS value for a policy
pub fn raw_policy(policy: Policy) -> i32 {
    #[cfg(target_os = "linux")]
    {
        posix::raw_policy(policy)
    }
    #[cfg(windows)]
    {
        windows::raw_policy(policy)
    }
}

/// Priorities the OS accepts under `policy`
pub fn priority_range(policy: Policy) -> Option<RangeInclusive<i32>> {
    #[cfg(target_os = "linux")]
    {
        posix::priority_range(policy)
    }
    #[cfg(windows)]
    {
        windows::priority_range(policy)
    }
}

/// Cores this process is currently allowed to run on
pub fn allowed_cores() -> Result<CoreSet> {
    #[cfg(target_os = "linux")]
    {
        posix::allowed_cores()
    }
    #[cfg(windows)]
    {
        windows::allowed_cores()
    }
}

/// Number of cores the system has online, whether or not this process may
/// use them
pub fn online_cores() -> usize {
    #[cfg(target_os = "linux")]
    {
        posix::online_cores()
    }
    #[cfg(windows)]
    {
        windows::online_cores()
    }
}

/// Name the calling thread. Failures are logged and otherwise ignored.
pub(crate) fn name_current_thread(name: &str) {
    #[cfg(target_os = "linux")]
    posix::name_current_thread(name);
    #[cfg(windows)]
    windows::name_current_thread(name);
}
