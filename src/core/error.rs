//! Error types for native thread management

/// Result type for thread operations
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Errors that can occur while creating, configuring, or tearing down a thread
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ThreadError {
    /// The OS refused to create the thread
    #[error("Failed to create thread: {message}")]
    CreationFailed {
        /// Error message
        message: String,
        /// Source OS error
        #[source]
        source: Option<std::io::Error>,
    },

    /// The OS rejected the requested scheduling priority
    #[error("Scheduling priority {priority} rejected: {source}")]
    PriorityRejected {
        /// Requested priority
        priority: i32,
        /// Source OS error
        #[source]
        source: std::io::Error,
    },

    /// The OS rejected the requested scheduling policy
    #[error("Scheduling policy {policy} rejected: {source}")]
    PolicyRejected {
        /// Requested policy, as the raw OS value
        policy: i32,
        /// Source OS error
        #[source]
        source: std::io::Error,
    },

    /// The requested CPU affinity is empty or was rejected by the OS
    #[error("CPU affinity {cores:?} rejected: {message}")]
    AffinityRejected {
        /// Requested core indices
        cores: Vec<usize>,
        /// Error message
        message: String,
    },

    /// Scheduling properties could not be applied to the live thread.
    ///
    /// The thread has already been joined when this is returned.
    #[error("Failed to apply scheduling properties to started thread: {source}")]
    PropertyApplicationFailed {
        /// The rejection that aborted configuration
        #[source]
        source: Box<ThreadError>,
    },

    /// Joining the thread failed
    #[error("Failed to join thread: {message}")]
    JoinFailed {
        /// Error message
        message: String,
    },

    /// Detaching the thread failed
    #[error("Failed to detach thread: {message}")]
    DetachFailed {
        /// Error message
        message: String,
    },

    /// Bounded join gave up before the thread finished
    #[error("Thread did not finish within {timeout_ms}ms")]
    JoinTimeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The thread body panicked
    #[error("Thread panicked: {message}")]
    WorkerPanic {
        /// Panic message
        message: String,
    },

    /// No result can be read from the channel
    #[error("Thread result unavailable: {message}")]
    ResultUnavailable {
        /// Error message
        message: String,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl ThreadError {
    /// Create a creation error
    pub fn creation(message: impl Into<String>) -> Self {
        ThreadError::CreationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a creation error from an OS error code
    pub fn creation_os(message: impl Into<String>, code: i32) -> Self {
        ThreadError::CreationFailed {
            message: message.into(),
            source: Some(std::io::Error::from_raw_os_error(code)),
        }
    }

    /// Create a creation error for an unusable stack size
    pub fn invalid_stack_size(bytes: usize) -> Self {
        ThreadError::creation(format!("invalid stack size of {} bytes", bytes))
    }

    /// Create a priority rejection from an OS error code
    pub fn priority_rejected(priority: i32, code: i32) -> Self {
        ThreadError::PriorityRejected {
            priority,
            source: std::io::Error::from_raw_os_error(code),
        }
    }

    /// Create a policy rejection from an OS error code
    pub fn policy_rejected(policy: i32, code: i32) -> Self {
        ThreadError::PolicyRejected {
            policy,
            source: std::io::Error::from_raw_os_error(code),
        }
    }

    /// Create an affinity rejection
    pub fn affinity_rejected(cores: Vec<usize>, message: impl Into<String>) -> Self {
        ThreadError::AffinityRejected {
            cores,
            message: message.into(),
        }
    }

    /// Wrap a rejection raised while configuring a live thread
    pub fn property_application(source: ThreadError) -> Self {
        ThreadError::PropertyApplicationFailed {
            source: Box::new(source),
        }
    }

    /// Create a join error
    pub fn join(message: impl Into<String>) -> Self {
        ThreadError::JoinFailed {
            message: message.into(),
        }
    }

    /// Create a detach error
    pub fn detach(message: impl Into<String>) -> Self {
        ThreadError::DetachFailed {
            message: message.into(),
        }
    }

    /// Create a join timeout error
    pub fn join_timeout(timeout_ms: u64) -> Self {
        ThreadError::JoinTimeout { timeout_ms }
    }

    /// Create a worker panic error
    pub fn worker_panic(message: impl Into<String>) -> Self {
        ThreadError::WorkerPanic {
            message: message.into(),
        }
    }

    /// Create a result unavailable error
    pub fn result_unavailable(message: impl Into<String>) -> Self {
        ThreadError::ResultUnavailable {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ThreadError::Other(msg.into())
    }

    /// Whether this error came from the OS rejecting a scheduling attribute,
    /// either directly or while configuring a started thread
    pub fn is_scheduling_rejection(&self) -> bool {
        match self {
            ThreadError::PriorityRejected { .. }
            | ThreadError::PolicyRejected { .. }
            | ThreadError::AffinityRejected { .. } => true,
            ThreadError::PropertyApplicationFailed { source } => source.is_scheduling_rejection(),
            _ => false,
        }
    }
}
