//! Scheduling properties applied when a thread is created
//!
//! [`SchedulingProperties`] is a plain value. Every field is optional and
//! `None` means "leave the OS default alone", so the default value requests
//! nothing and costs no system calls.
//!
//! # Example
//!
//! ```rust
//! use os_compat_thread::{CoreSet, Policy, SchedulingProperties};
//!
//! let props = SchedulingProperties::new()
//!     .with_policy(Policy::Other)
//!     .with_priority(0)
//!     .with_affinity(CoreSet::single(0))
//!     .with_name("sampler");
//!
//! assert_eq!(props.priority(), Some(0));
//! assert!(props.has_scheduling());
//! ```

use crate::core::{Result, ThreadError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;

/// OS scheduling class a thread competes under.
///
/// Platforms without scheduling classes ignore the policy and only apply
/// the priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Normal time-sharing scheduling
    Other,
    /// Real-time first-in first-out
    Fifo,
    /// Real-time round-robin
    RoundRobin,
    /// Throughput-oriented batch scheduling
    Batch,
    /// Runs only when nothing else wants the CPU
    Idle,
}

impl Policy {
    /// Raw value passed to the OS for this policy
    pub fn as_raw(self) -> i32 {
        crate::platform::raw_policy(self)
    }

    /// Whether this is a real-time class (usually requires privileges)
    pub fn is_realtime(self) -> bool {
        matches!(self, Policy::Fifo | Policy::RoundRobin)
    }

    /// Priorities the OS accepts for this policy, if it can report them
    pub fn priority_range(self) -> Option<RangeInclusive<i32>> {
        crate::platform::priority_range(self)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Other => "other",
            Policy::Fifo => "fifo",
            Policy::RoundRobin => "round_robin",
            Policy::Batch => "batch",
            Policy::Idle => "idle",
        };
        f.write_str(name)
    }
}

/// Ordered set of CPU core indices a thread may run on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoreSet {
    cores: BTreeSet<usize>,
}

impl CoreSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set containing exactly one core
    pub fn single(core: usize) -> Self {
        std::iter::once(core).collect()
    }

    /// Build a set from a per-core flag mask, where `mask[i]` selects core `i`
    pub fn from_mask(mask: &[bool]) -> Self {
        mask.iter()
            .enumerate()
            .filter_map(|(core, &flagged)| flagged.then_some(core))
            .collect()
    }

    /// Set of cores `0..count`
    pub fn first(count: usize) -> Self {
        (0..count).collect()
    }

    /// Add a core, returning whether it was newly inserted
    pub fn insert(&mut self, core: usize) -> bool {
        self.cores.insert(core)
    }

    /// Whether the set contains `core`
    pub fn contains(&self, core: usize) -> bool {
        self.cores.contains(&core)
    }

    /// Number of cores in the set
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    /// Highest core index in the set
    pub fn max_core(&self) -> Option<usize> {
        self.cores.iter().next_back().copied()
    }

    /// Iterate over the core indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.cores.iter().copied()
    }

    /// Core indices as a vector
    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    /// Whether the set names every core in `0..online`
    pub fn covers_all(&self, online: usize) -> bool {
        online > 0 && (0..online).all(|core| self.contains(core))
    }
}

impl FromIterator<usize> for CoreSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            cores: iter.into_iter().collect(),
        }
    }
}

/// Priority, policy, affinity, and creation options for one thread.
///
/// Copied into the thread handle at construction; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingProperties {
    priority: Option<i32>,
    policy: Option<Policy>,
    affinity: Option<CoreSet>,
    name: Option<String>,
    stack_size: Option<usize>,
}

impl SchedulingProperties {
    /// Properties that change nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduling priority
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the scheduling policy
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Restrict the thread to the given cores
    ///
    /// An empty set is rejected when the thread is created.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_affinity(mut self, cores: CoreSet) -> Self {
        self.affinity = Some(cores);
        self
    }

    /// Restrict the thread to the cores flagged in `mask`
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_affinity_mask(self, mask: &[bool]) -> Self {
        self.with_affinity(CoreSet::from_mask(mask))
    }

    /// Name the thread
    ///
    /// Linux truncates names to 15 bytes.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the stack size in bytes
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Requested priority
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Requested policy
    pub fn policy(&self) -> Option<Policy> {
        self.policy
    }

    /// Requested affinity (`None` = all cores)
    pub fn affinity(&self) -> Option<&CoreSet> {
        self.affinity.as_ref()
    }

    /// Requested thread name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Requested stack size
    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }

    /// Whether any of priority, policy, or affinity is set
    pub fn has_scheduling(&self) -> bool {
        self.priority.is_some() || self.policy.is_some() || self.affinity.is_some()
    }

    /// Whether nothing at all is requested
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Reject configurations no OS could honour
    pub fn validate(&self) -> Result<()> {
        if let Some(cores) = &self.affinity {
            if cores.is_empty() {
                return Err(ThreadError::affinity_rejected(
                    Vec::new(),
                    "no CPU cores flagged",
                ));
            }
        }
        if self.stack_size == Some(0) {
            return Err(ThreadError::invalid_stack_size(0));
        }
        Ok(())
    }

    /// Affinity that actually needs a system call.
    ///
    /// A set naming every online core is the same as no restriction, so it
    /// is elided.
    pub fn effective_affinity(&self) -> Option<&CoreSet> {
        let cores = self.affinity.as_ref()?;
        if cores.covers_all(crate::platform::online_cores()) {
            log::debug!("affinity {:?} covers every online core, not pinning", cores);
            return None;
        }
        Some(cores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_changes_nothing() {
        let props = SchedulingProperties::default();
        assert!(props.is_default());
        assert!(!props.has_scheduling());
        assert_eq!(props.priority(), None);
        assert_eq!(props.policy(), None);
        assert!(props.affinity().is_none());
        assert!(props.validate().is_ok());
    }

    #[test]
    fn test_builder_sets_fields() {
        let props = SchedulingProperties::new()
            .with_priority(10)
            .with_policy(Policy::RoundRobin)
            .with_affinity(CoreSet::single(1))
            .with_name("io")
            .with_stack_size(1 << 20);

        assert_eq!(props.priority(), Some(10));
        assert_eq!(props.policy(), Some(Policy::RoundRobin));
        assert_eq!(props.affinity().map(CoreSet::to_vec), Some(vec![1]));
        assert_eq!(props.name(), Some("io"));
        assert_eq!(props.stack_size(), Some(1 << 20));
        assert!(props.has_scheduling());
    }

    #[test]
    fn test_name_alone_is_not_scheduling() {
        let props = SchedulingProperties::new().with_name("quiet");
        assert!(!props.has_scheduling());
        assert!(!props.is_default());
    }

    #[test]
    fn test_core_set_from_mask() {
        let cores = CoreSet::from_mask(&[true, false, true, false]);
        assert_eq!(cores.to_vec(), vec![0, 2]);
        assert_eq!(cores.max_core(), Some(2));
        assert!(CoreSet::from_mask(&[false, false, false, false]).is_empty());
    }

    #[test]
    fn test_empty_affinity_rejected() {
        let props = SchedulingProperties::new().with_affinity_mask(&[false, false, false, false]);
        let err = props.validate().unwrap_err();
        assert!(matches!(err, ThreadError::AffinityRejected { .. }));
    }

    #[test]
    fn test_zero_stack_rejected() {
        let props = SchedulingProperties::new().with_stack_size(0);
        assert!(matches!(
            props.validate(),
            Err(ThreadError::CreationFailed { .. })
        ));
    }

    #[test]
    fn test_covers_all() {
        assert!(CoreSet::first(4).covers_all(4));
        assert!(CoreSet::first(8).covers_all(4));
        assert!(!CoreSet::from_mask(&[true, true, false, true]).covers_all(4));
        assert!(!CoreSet::new().covers_all(0));
    }

    #[test]
    fn test_all_cores_affinity_is_elided() {
        let online = crate::platform::online_cores();
        let props = SchedulingProperties::new().with_affinity(CoreSet::first(online));
        assert!(props.effective_affinity().is_none());

        let props = SchedulingProperties::new().with_affinity(CoreSet::single(online));
        assert!(props.effective_affinity().is_some());
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(Policy::RoundRobin.to_string(), "round_robin");
        assert!(Policy::Fifo.is_realtime());
        assert!(!Policy::Batch.is_realtime());
    }
}
