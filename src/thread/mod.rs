//! Owned native thread handle
//!
//! A [`Thread`] owns exactly one OS thread from creation until it is joined
//! or detached. It moves freely but cannot be cloned, and it carries the
//! receiving end of the thread's result channel.
//!
//! # State machine
//!
//! ```text
//! Unstarted ──spawn──▶ Running ──join───▶ Joined
//!                              └─detach─▶ Detached
//! ```
//!
//! Only `Running` is joinable. There is no way back from `Joined` or
//! `Detached`; start a new handle to run more work.
//!
//! # Example
//!
//! ```rust
//! use os_compat_thread::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let base = 40;
//! let mut thread = Thread::spawn(move || base + 2)?;
//! assert!(thread.joinable());
//!
//! thread.join()?;
//! assert_eq!(thread.get_result()?, 42);
//! # Ok(())
//! # }
//! ```

use crate::core::gate::CompletionGuard;
use crate::core::{
    channel, Completion, Outcome, Result, ResultReceiver, ResultSender, SchedulingProperties,
    StartGate, ThreadError,
};
use crate::platform::{self, Entry, NativePlatform, Platform};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Handle to one native thread producing a `T`
pub struct Thread<T, P: Platform = NativePlatform> {
    platform: P,
    handle: Option<P::Handle>,
    result: ResultReceiver<T>,
    completion: Option<Arc<Completion>>,
    properties: SchedulingProperties,
}

impl<T: Send + 'static> Thread<T> {
    /// Start a thread running `f` with OS default scheduling.
    ///
    /// Arguments are captured by the `move` closure, so nothing borrowed
    /// from the caller's stack has to outlive this call.
    ///
    /// # Errors
    ///
    /// [`ThreadError::CreationFailed`] if the OS refuses to create the thread.
    pub fn spawn<F>(f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::spawn_on(NativePlatform::default(), SchedulingProperties::default(), f)
    }

    /// Start a thread running `f` with the given scheduling properties.
    ///
    /// # Errors
    ///
    /// - [`ThreadError::CreationFailed`] if the OS refuses to create the thread
    /// - [`ThreadError::PriorityRejected`], [`ThreadError::PolicyRejected`], or
    ///   [`ThreadError::AffinityRejected`] if a property is refused before start
    /// - [`ThreadError::PropertyApplicationFailed`] if a property is refused
    ///   after start; the thread has been joined and `f` never ran
    pub fn with_properties<F>(properties: SchedulingProperties, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::spawn_on(NativePlatform::default(), properties, f)
    }
}

impl<T: Send + 'static, P: Platform> Thread<T, P> {
    /// Start a thread through an explicit platform adapter.
    ///
    /// Errors are the same as for [`Thread::with_properties`].
    pub fn spawn_on<F>(platform: P, properties: SchedulingProperties, f: F) -> Result<Self>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        properties.validate()?;

        let (sender, receiver) = channel();
        let completion = Arc::new(Completion::new());
        let configure_live_thread =
            !platform.configures_before_start(&properties) && properties.has_scheduling();
        let gate = configure_live_thread.then(|| Arc::new(StartGate::new()));

        let entry = body(
            f,
            sender,
            Arc::clone(&completion),
            gate.clone(),
            properties.name().map(str::to_owned),
        );
        let handle = platform.spawn(&properties, entry)?;
        let id = platform.native_id(&handle);

        if let Some(gate) = gate {
            if let Err(err) = configure_live(&platform, &handle, &properties) {
                log::error!("thread {}: configuration failed, not running: {}", id, err);
                gate.cancel();
                if let Err(join_err) = platform.join(&handle) {
                    log::error!("thread {}: join after failed configuration: {}", id, join_err);
                }
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_rejection(&err);
                return Err(ThreadError::property_application(err));
            }
            gate.open();
        }

        log::debug!(
            "thread {} started{}",
            id,
            properties
                .name()
                .map(|name| format!(" as {:?}", name))
                .unwrap_or_default()
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_spawn(id, properties.has_scheduling());

        Ok(Self {
            platform,
            handle: Some(handle),
            result: receiver,
            completion: Some(completion),
            properties,
        })
    }
}

impl<T, P: Platform> Thread<T, P> {
    /// Whether this handle owns a running (or finished but unjoined) thread
    pub fn joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// Block until the thread terminates, then release it.
    ///
    /// A panic in the thread body does not surface here; read it from
    /// [`get_result`](Self::get_result).
    ///
    /// # Errors
    ///
    /// [`ThreadError::JoinFailed`] if the handle is not joinable or the OS
    /// join fails (for example a thread joining itself). On an OS failure the
    /// handle stays joinable.
    pub fn join(&mut self) -> Result<()> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| ThreadError::join("thread is not joinable"))?;
        let id = self.platform.native_id(handle);
        self.platform.join(handle)?;
        self.handle = None;

        log::debug!("thread {} joined", id);
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_join(id);
        Ok(())
    }

    /// Wait at most `timeout` for the thread to finish, then join it.
    ///
    /// On timeout the thread keeps running and the handle stays joinable.
    ///
    /// # Errors
    ///
    /// [`ThreadError::JoinTimeout`] on timeout, otherwise as [`join`](Self::join).
    pub fn join_timeout(&mut self, timeout: Duration) -> Result<()> {
        if !self.joinable() {
            return Err(ThreadError::join("thread is not joinable"));
        }
        let finished = self
            .completion
            .as_ref()
            .map_or(true, |completion| completion.wait_timeout(timeout));
        if !finished {
            return Err(ThreadError::join_timeout(millis(timeout)));
        }
        self.join()
    }

    /// Let the thread run on independently. Its result can still be read.
    ///
    /// # Errors
    ///
    /// [`ThreadError::DetachFailed`] if the handle is not joinable or the OS
    /// call fails.
    pub fn detach(&mut self) -> Result<()> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| ThreadError::detach("thread is not joinable"))?;
        let id = self.platform.native_id(handle);
        self.platform.detach(handle)?;
        self.handle = None;

        log::debug!("thread {} detached", id);
        Ok(())
    }

    /// Take the thread's result, blocking until it is available.
    ///
    /// Call after [`join`](Self::join) in normal use. The result can be read
    /// once; later calls return [`ThreadError::ResultUnavailable`].
    ///
    /// # Errors
    ///
    /// [`ThreadError::WorkerPanic`] if the thread body panicked.
    pub fn get_result(&mut self) -> Result<T> {
        self.result.await_result()
    }

    /// Take the result if the thread body has already produced it
    pub fn try_result(&mut self) -> Option<Result<T>> {
        self.result.try_result()
    }

    /// Whether the thread body has returned (or panicked)
    pub fn is_finished(&self) -> bool {
        self.completion
            .as_ref()
            .map_or(false, |completion| completion.is_finished())
    }

    /// OS identifier of the thread while it is joinable
    pub fn id(&self) -> Option<u64> {
        self.handle
            .as_ref()
            .map(|handle| self.platform.native_id(handle))
    }

    /// Properties the thread was started with
    pub fn properties(&self) -> &SchedulingProperties {
        &self.properties
    }

    /// Move-assign `other` into this handle.
    ///
    /// A running thread owned by `self` is joined first. If that join fails
    /// the error is returned, `self` is unchanged, and `other` is dropped.
    pub fn replace(&mut self, other: Self) -> Result<()> {
        if self.joinable() {
            self.join()?;
        }
        *self = other;
        Ok(())
    }
}

impl<T, P: Platform + Default> Thread<T, P> {
    /// Move the thread out, leaving an unstarted handle behind
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl<T, P: Platform + Default> Default for Thread<T, P> {
    /// An unstarted, non-joinable handle
    fn default() -> Self {
        Self {
            platform: P::default(),
            handle: None,
            result: ResultReceiver::default(),
            completion: None,
            properties: SchedulingProperties::default(),
        }
    }
}

impl<T, P: Platform> Drop for Thread<T, P> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let id = self.platform.native_id(&handle);
        log::warn!("thread {} dropped while joinable, joining it", id);
        if let Err(err) = self.platform.join(&handle) {
            log::error!("thread {}: join on drop failed: {}", id, err);
        }
    }
}

impl<T, P: Platform> fmt::Debug for Thread<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id())
            .field("joinable", &self.joinable())
            .field("finished", &self.is_finished())
            .field("properties", &self.properties)
            .finish()
    }
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Wrap the user closure into what the native thread runs
fn body<T, F>(
    f: F,
    sender: ResultSender<T>,
    completion: Arc<Completion>,
    gate: Option<Arc<StartGate>>,
    name: Option<String>,
) -> Entry
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Box::new(move || {
        let _finished = CompletionGuard(completion);
        if let Some(gate) = gate {
            if !gate.wait() {
                return;
            }
        }
        if let Some(name) = name.as_deref() {
            platform::name_current_thread(name);
        }

        let outcome = Outcome::capture(f);
        if let Outcome::Panicked(message) = &outcome {
            log::debug!("thread body panicked: {}", message);
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_panic(message);
        }
        sender.fulfill(outcome);
    })
}

/// Apply policy, priority, then affinity to a started thread
fn configure_live<P: Platform>(
    platform: &P,
    handle: &P::Handle,
    properties: &SchedulingProperties,
) -> Result<()> {
    match (properties.policy(), properties.priority()) {
        (Some(policy), priority) => platform.apply_policy(handle, policy, priority)?,
        (None, Some(priority)) => platform.apply_priority(handle, priority)?,
        (None, None) => {}
    }
    if let Some(cores) = properties.effective_affinity() {
        platform.apply_affinity(handle, cores)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreSet, Policy};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::thread as std_thread;

    /// Create-then-configure adapter over std threads that rejects affinity
    #[derive(Debug, Default)]
    struct RejectingAffinity {
        applied: Arc<Mutex<Vec<&'static str>>>,
    }

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    impl Platform for RejectingAffinity {
        type Handle = (u64, Mutex<Option<std_thread::JoinHandle<()>>>);

        const CONFIGURES_BEFORE_START: bool = false;

        fn spawn(&self, _properties: &SchedulingProperties, entry: Entry) -> Result<Self::Handle> {
            let handle = std_thread::spawn(entry);
            Ok((NEXT_ID.fetch_add(1, Ordering::Relaxed), Mutex::new(Some(handle))))
        }

        fn apply_policy(&self, _: &Self::Handle, _: Policy, _: Option<i32>) -> Result<()> {
            self.applied.lock().push("policy");
            Ok(())
        }

        fn apply_priority(&self, _: &Self::Handle, _: i32) -> Result<()> {
            self.applied.lock().push("priority");
            Ok(())
        }

        fn apply_affinity(&self, _: &Self::Handle, cores: &CoreSet) -> Result<()> {
            self.applied.lock().push("affinity");
            Err(ThreadError::affinity_rejected(cores.to_vec(), "rejected for test"))
        }

        fn join(&self, handle: &Self::Handle) -> Result<()> {
            let inner = handle.1.lock().take();
            match inner {
                Some(inner) => inner.join().map_err(|_| ThreadError::join("panicked")),
                None => Err(ThreadError::join("already joined")),
            }
        }

        fn detach(&self, handle: &Self::Handle) -> Result<()> {
            handle.1.lock().take();
            Ok(())
        }

        fn native_id(&self, handle: &Self::Handle) -> u64 {
            handle.0
        }
    }

    fn unpinned_core() -> usize {
        // One past the online count is never elided as "all cores".
        platform::online_cores()
    }

    #[test]
    fn test_default_handle_is_not_joinable() {
        let mut thread = Thread::<i32>::default();
        assert!(!thread.joinable());
        assert!(thread.id().is_none());
        assert!(!thread.is_finished());
        assert!(matches!(thread.join(), Err(ThreadError::JoinFailed { .. })));
        assert!(matches!(thread.detach(), Err(ThreadError::DetachFailed { .. })));
        assert!(matches!(
            thread.get_result(),
            Err(ThreadError::ResultUnavailable { .. })
        ));
    }

    #[test]
    fn test_spawn_join_result() {
        let mut thread = Thread::spawn(|| "done".to_string()).unwrap();
        assert!(thread.joinable());
        assert!(thread.id().is_some());

        thread.join().unwrap();
        assert!(!thread.joinable());
        assert!(thread.is_finished());
        assert_eq!(thread.get_result().unwrap(), "done");
    }

    #[test]
    fn test_rejected_live_configuration_never_runs_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let platform = RejectingAffinity::default();
        let applied = Arc::clone(&platform.applied);

        let props = SchedulingProperties::new()
            .with_policy(Policy::Other)
            .with_priority(0)
            .with_affinity(CoreSet::single(unpinned_core()));
        let err = Thread::spawn_on(platform, props, move || {
            ran_clone.store(true, Ordering::SeqCst);
        })
        .unwrap_err();

        match err {
            ThreadError::PropertyApplicationFailed { source } => {
                assert!(matches!(*source, ThreadError::AffinityRejected { .. }))
            }
            other => panic!("expected property application failure, got {:?}", other),
        }
        // The thread was joined before the error was returned.
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(*applied.lock(), vec!["policy", "affinity"]);
    }

    #[test]
    fn test_live_platform_without_scheduling_skips_gate() {
        let platform = RejectingAffinity::default();
        let applied = Arc::clone(&platform.applied);
        let props = SchedulingProperties::new().with_name("plain");

        let mut thread = Thread::spawn_on(platform, props, || 7).unwrap();
        thread.join().unwrap();

        assert_eq!(thread.get_result().unwrap(), 7);
        assert!(applied.lock().is_empty());
    }

    #[test]
    fn test_priority_only_uses_apply_priority() {
        let platform = RejectingAffinity::default();
        let applied = Arc::clone(&platform.applied);
        let props = SchedulingProperties::new().with_priority(3);

        let mut thread = Thread::spawn_on(platform, props, || ()).unwrap();
        thread.join().unwrap();

        assert_eq!(*applied.lock(), vec!["priority"]);
        assert!(thread.get_result().is_ok());
    }

    #[test]
    fn test_panic_deferred_to_result() {
        let mut thread = Thread::spawn(|| -> u8 { panic!("worker exploded") }).unwrap();
        thread.join().expect("join must not surface the panic");
        match thread.get_result() {
            Err(ThreadError::WorkerPanic { message }) => assert_eq!(message, "worker exploded"),
            other => panic!("expected worker panic, got {:?}", other),
        }
    }

    #[test]
    fn test_take_leaves_unstarted() {
        let mut original = Thread::spawn(|| 1).unwrap();
        let mut moved = original.take();

        assert!(!original.joinable());
        assert!(moved.joinable());
        moved.join().unwrap();
        assert_eq!(moved.get_result().unwrap(), 1);
    }

    #[test]
    fn test_timeout_millis_saturate() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_debug_output() {
        let thread = Thread::<()>::default();
        let rendered = format!("{:?}", thread);
        assert!(rendered.contains("joinable: false"));
    }
}
