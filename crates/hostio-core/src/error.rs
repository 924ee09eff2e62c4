//! Bridge error types.

use std::fmt;

/// Failure reported to the POSIX-emulation callers of the bridge.
///
/// The variants follow the bridge's failure taxonomy: resolution, open and
/// metadata failures all surface as [`BridgeError::NotFound`] or
/// [`BridgeError::Io`] depending on origin; short writes and host I/O errors
/// are [`BridgeError::Io`]; operations the stream cannot perform are
/// [`BridgeError::Unsupported`] / [`BridgeError::PermissionDenied`]; a
/// missing host capability is [`BridgeError::Unavailable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// Path could not be resolved to a host handle (includes non-200 fetch).
    NotFound,
    /// Host I/O call failed, or a flush wrote fewer bytes than buffered.
    Io,
    /// Invalid argument (unknown seek whence, unknown fcntl command).
    InvalidArgument,
    /// Operation not implemented for this stream (dup, directory read).
    Unsupported,
    /// Operation forbidden for this stream (directory write).
    PermissionDenied,
    /// Host API for this capability is absent (datagram sockets).
    Unavailable,
    /// Socket address family is not supported by the translation layer.
    AddrNotSupported,
}

impl BridgeError {
    /// errno-style code for the POSIX-emulation layer.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::Io => libc::EIO,
            Self::InvalidArgument => libc::EINVAL,
            Self::Unsupported => libc::ENOSYS,
            Self::PermissionDenied => libc::EPERM,
            Self::Unavailable => libc::EPROTONOSUPPORT,
            Self::AddrNotSupported => libc::EAFNOSUPPORT,
        }
    }

    /// Map a negative errno-style slot value back to an error.
    pub fn from_code(code: i64) -> Self {
        match -code as i32 {
            libc::ENOENT => Self::NotFound,
            libc::EINVAL => Self::InvalidArgument,
            libc::ENOSYS => Self::Unsupported,
            libc::EPERM => Self::PermissionDenied,
            libc::EPROTONOSUPPORT => Self::Unavailable,
            libc::EAFNOSUPPORT => Self::AddrNotSupported,
            _ => Self::Io,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Io => write!(f, "I/O error"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Unsupported => write!(f, "operation not supported"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::Unavailable => write!(f, "host capability unavailable"),
            Self::AddrNotSupported => write!(f, "address family not supported"),
        }
    }
}

impl std::error::Error for BridgeError {}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure carried by a host completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    /// Resource does not exist.
    NotFound,
    /// Host does not provide this capability.
    NotSupported,
    /// Generic host-side failure.
    Failed,
    /// OS error with errno.
    Os(i32),
}

impl HostError {
    /// Negative errno-style code for result slots.
    pub fn code(&self) -> i64 {
        match self {
            Self::NotFound => -(libc::ENOENT as i64),
            Self::NotSupported => -(libc::EPROTONOSUPPORT as i64),
            Self::Failed => -(libc::EIO as i64),
            Self::Os(e) => -(*e as i64),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "host: not found"),
            Self::NotSupported => write!(f, "host: not supported"),
            Self::Failed => write!(f, "host: failed"),
            Self::Os(e) => write!(f, "host: errno {}", e),
        }
    }
}

impl std::error::Error for HostError {}

pub type HostResult<T> = std::result::Result<T, HostError>;
