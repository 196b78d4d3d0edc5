use crate::types::Pe;

pub type Result<T> = std::result::Result<T, ShmemError>;

#[derive(Debug, thiserror::Error)]
pub enum ShmemError {
    #[error(
        "cannot resolve group (start={pe_start}, log_stride={log_pe_stride}, size={pe_size}): {reason}"
    )]
    GroupResolution {
        pe_start: Pe,
        log_pe_stride: u32,
        pe_size: u32,
        reason: String,
    },

    #[error("{op} to PE {pe} failed: {reason}")]
    TransportOperation {
        op: &'static str,
        pe: Pe,
        reason: String,
    },

    #[error("communication context creation failed: {message}")]
    ContextCreation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid PE {pe}: job has {n_pes} PEs")]
    InvalidPe { pe: Pe, n_pes: u32 },

    #[error("symmetric access out of bounds: offset {offset} + {len} bytes exceeds {limit}")]
    OutOfBounds { offset: usize, len: usize, limit: usize },

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("buffer too small: need {required} bytes, have {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("symmetric heap exhausted: requested {requested} bytes, {available} available")]
    HeapExhausted { requested: usize, available: usize },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("{operation} failed at PE {pe}: {reason}")]
    CollectiveFailed {
        operation: &'static str,
        pe: Pe,
        reason: String,
    },

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl ShmemError {
    /// Create a `TransportOperation` error for `op` targeting `pe`.
    pub fn transport_op(op: &'static str, pe: Pe, reason: impl Into<String>) -> Self {
        Self::TransportOperation {
            op,
            pe,
            reason: reason.into(),
        }
    }

    /// Create a `ContextCreation` error with just a message.
    pub fn context_creation(msg: impl Into<String>) -> Self {
        Self::ContextCreation {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a `ContextCreation` error with a message and a source error.
    pub fn context_creation_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ContextCreation {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True for failures of an individual put, fence or atomic.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportOperation { .. })
    }
}
