//! # OS Compat Thread
//!
//! Native OS threads with control over scheduling priority, scheduling
//! policy, and CPU affinity, and a typed result handed back to the owner.
//!
//! ## Features
//!
//! - **One handle, one thread**: [`Thread`] owns a single native thread; it
//!   can be moved but never copied, and is joined or detached exactly once
//! - **Typed results**: the closure's return value (or its panic) is read
//!   back through [`Thread::get_result`]
//! - **Scheduling properties**: priority, policy, affinity, name, and stack
//!   size through [`SchedulingProperties`]
//! - **Two OS models, one contract**: attribute-first creation where the OS
//!   supports it, create-then-configure behind a start gate where it does not
//!
//! ## Quick Start
//!
//! ```rust
//! use os_compat_thread::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let mut thread = Thread::spawn(|| (1..=10).sum::<u32>())?;
//! thread.join()?;
//! assert_eq!(thread.get_result()?, 55);
//! # Ok(())
//! # }
//! ```
//!
//! ## Scheduling Properties
//!
//! ```rust
//! use os_compat_thread::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let core = os_compat_thread::platform::allowed_cores()?
//!     .iter()
//!     .next()
//!     .unwrap_or(0);
//! let props = SchedulingProperties::new()
//!     .with_affinity(CoreSet::single(core))
//!     .with_name("pinned");
//!
//! let mut thread = Thread::with_properties(props, || "pinned work")?;
//! thread.join()?;
//! assert_eq!(thread.get_result()?, "pinned work");
//! # Ok(())
//! # }
//! ```
//!
//! ## Rejected Properties
//!
//! ```rust
//! use os_compat_thread::prelude::*;
//!
//! let props = SchedulingProperties::new().with_affinity_mask(&[false, false, false, false]);
//! let err = Thread::with_properties(props, || ()).unwrap_err();
//! assert!(matches!(err, ThreadError::AffinityRejected { .. }));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod platform;
pub mod prelude;
pub mod thread;
pub mod tracing;

pub use core::{CoreSet, Outcome, Policy, Result, SchedulingProperties, ThreadError};
pub use platform::{NativePlatform, Platform};
pub use thread::Thread;
