//! Error types for netlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Header, length or alignment violation in a netlink message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// TLV length violation or wrongly sized attribute payload.
    #[error("malformed attribute: {0}")]
    MalformedAttribute(String),

    /// A reply did not belong to the request it was read for.
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch {
        /// Header field that failed validation ("sequence" or "pid").
        field: &'static str,
        /// Value carried by the request.
        expected: u32,
        /// Value carried by the reply.
        actual: u32,
    },

    /// Kernel returned an error code.
    #[error("kernel error: {}", describe_kernel(.errno, .message, .offset))]
    Protocol {
        /// Positive errno value.
        errno: i32,
        /// Extended acknowledgement message, if the kernel sent one.
        message: Option<String>,
        /// Byte offset of the offending attribute in the original request.
        offset: Option<u32>,
    },

    /// Family or device does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Operation not supported by this socket or platform.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Caller-supplied value rejected before anything was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A multi-message configuration failed after some messages were applied.
    #[error("configuration batch failed after {applied} of {total} messages: {source}")]
    BatchPartialFailure {
        /// Number of messages the kernel acknowledged.
        applied: usize,
        /// Number of messages in the batch.
        total: usize,
        /// The failure that stopped the batch.
        #[source]
        source: Box<Error>,
    },

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// Failure tagged with the connection step that produced it.
    #[error("{op}: {source}")]
    Op {
        /// Step name, e.g. "send", "receive" or "validate".
        op: &'static str,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

fn describe_kernel(errno: &i32, message: &Option<String>, offset: &Option<u32>) -> String {
    let mut out = io::Error::from_raw_os_error(*errno).to_string();
    if let Some(msg) = message {
        out.push_str(": ");
        out.push_str(msg);
    }
    if let Some(off) = offset {
        out.push_str(&format!(" (offset {off})"));
    }
    format!("{out} (errno {errno})")
}

impl Error {
    /// Create a kernel error from a raw netlink error code (negative errno).
    pub fn from_errno(code: i32) -> Self {
        Self::Protocol {
            errno: code.wrapping_neg(),
            message: None,
            offset: None,
        }
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an Unsupported error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Tag this error with a step name.
    ///
    /// Already tagged errors keep their innermost step.
    pub fn with_op(self, op: &'static str) -> Self {
        match self {
            tagged @ Self::Op { .. } => tagged,
            other => Self::Op {
                op,
                source: Box::new(other),
            },
        }
    }

    /// The error with any step tags stripped.
    pub fn root(&self) -> &Error {
        match self {
            Self::Op { source, .. } => source.root(),
            other => other,
        }
    }

    /// Consume the error, stripping any step tags.
    pub fn into_root(self) -> Error {
        match self {
            Self::Op { source, .. } => source.into_root(),
            other => other,
        }
    }

    /// The step name, if the error was tagged.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Self::Op { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Check if this is a "not found" error (NotFound, ENOENT, ENODEV).
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Self::NotFound { .. } => true,
            Self::Protocol { errno, .. } => matches!(*errno, libc::ENOENT | libc::ENODEV),
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }

    /// Check if the operation is unsupported here.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), Self::Unsupported { .. })
    }

    /// Check if a reply failed sequence or pid validation.
    pub fn is_correlation_mismatch(&self) -> bool {
        matches!(self.root(), Self::CorrelationMismatch { .. })
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self.root() {
            Self::Protocol { errno, .. } => Some(*errno),
            Self::Io(e) => e.raw_os_error(),
            Self::BatchPartialFailure { source, .. } => source.errno(),
            _ => None,
        }
    }

    /// Get the extended acknowledgement offset if the kernel reported one.
    pub fn offset(&self) -> Option<u32> {
        match self.root() {
            Self::Protocol { offset, .. } => *offset,
            Self::BatchPartialFailure { source, .. } => source.offset(),
            _ => None,
        }
    }
}
