//! Tracing integration for observability.
//!
//! With the `tracing` feature enabled, thread lifecycle events are emitted as
//! `tracing` events and [`in_current_span`] carries the caller's span into
//! the new thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use os_compat_thread::prelude::*;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env()
//!         .add_directive("os_compat_thread=trace".parse().unwrap()))
//!     .init();
//!
//! let _span = tracing::info_span!("ingest").entered();
//! let mut thread = Thread::spawn(os_compat_thread::tracing::in_current_span(|| {
//!     tracing::info!("runs inside the ingest span");
//! }))?;
//! thread.join()?;
//! ```

/// Wrap `f` so that it runs inside the span that is current right now.
///
/// Without the `tracing` feature this returns `f` unchanged in behaviour.
pub fn in_current_span<F, T>(f: F) -> impl FnOnce() -> T + Send + 'static
where
    F: FnOnce() -> T + Send + 'static,
{
    #[cfg(feature = "tracing")]
    let span = tracing::Span::current();

    move || {
        #[cfg(feature = "tracing")]
        let _guard = span.enter();
        f()
    }
}

/// Event recording functions for thread lifecycle observability.
#[cfg(feature = "tracing")]
pub mod metrics {
    use crate::core::ThreadError;

    /// Records a thread start.
    #[inline]
    pub fn record_spawn(thread_id: u64, configured: bool) {
        tracing::trace!(
            counter.threads_started = 1,
            thread_id = thread_id,
            configured = configured,
            "thread started"
        );
    }

    /// Records a successful join.
    #[inline]
    pub fn record_join(thread_id: u64) {
        tracing::trace!(
            counter.threads_joined = 1,
            thread_id = thread_id,
            "thread joined"
        );
    }

    /// Records a panic in a thread body.
    #[inline]
    pub fn record_panic(message: &str) {
        tracing::error!(
            counter.threads_panicked = 1,
            panic_message = %message,
            "thread body panicked"
        );
    }

    /// Records a scheduling property the OS refused on a started thread.
    #[inline]
    pub fn record_rejection(error: &ThreadError) {
        tracing::warn!(
            counter.configuration_rejected = 1,
            error = %error,
            "scheduling properties rejected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_wrapped_closure_executes() {
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = Arc::clone(&executed);

        let wrapped = in_current_span(move || {
            executed_clone.store(true, Ordering::SeqCst);
            5
        });

        assert_eq!(wrapped(), 5);
        assert!(executed.load(Ordering::SeqCst));
    }
}
