//! Core types for native thread management

pub mod error;
pub mod gate;
pub mod properties;
pub mod result;

pub use error::{Result, ThreadError};
pub use gate::{Completion, StartGate};
pub use properties::{CoreSet, Policy, SchedulingProperties};
pub use result::{channel, Outcome, ResultReceiver, ResultSender};
