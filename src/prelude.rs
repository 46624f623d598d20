//! Convenient re-exports for common types and traits

pub use crate::core::{CoreSet, Policy, Result, SchedulingProperties, ThreadError};
pub use crate::platform::{NativePlatform, Platform};
pub use crate::thread::Thread;
