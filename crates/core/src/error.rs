//! Error types for padscope-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID device communication failure.
    #[error("HID error: {0}")]
    Hid(String),

    /// Device not found during enumeration.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Report descriptor could not be parsed.
    #[error("report descriptor error: {0}")]
    Descriptor(String),

    /// Permission denied (likely exclusive access held elsewhere).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation timed out.
    #[error("timeout: {0}")]
    Timeout(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of read-loop errors.
///
/// The pump uses this to decide whether a failed read is worth re-arming
/// (transient) or means the stream is gone (everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient errors that may succeed on the next read (timeout, busy).
    Transient,
    /// Device is disconnected — stop the pump.
    Disconnected,
    /// Permission denied — another process holds the device.
    PermissionDenied,
    /// Malformed descriptor or unexpected data.
    InvalidData,
}

impl ErrorClass {
    /// Classify an error for the pump's re-arm decision.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Timeout(_) => Self::Transient,
            Error::PermissionDenied(_) => Self::PermissionDenied,
            Error::DeviceNotFound(_) => Self::Disconnected,
            Error::Descriptor(_) => Self::InvalidData,
            Error::Hid(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("disconnect")
                    || lower.contains("not found")
                    || lower.contains("no such device")
                {
                    Self::Disconnected
                } else if lower.contains("permission")
                    || lower.contains("access denied")
                    || lower.contains("access is denied")
                {
                    Self::PermissionDenied
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    Self::Transient
                } else {
                    // Unidentified stream failure: treat like a torn-down device.
                    Self::Disconnected
                }
            }
        }
    }

    /// Whether the pump should issue another read after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_timeout_as_transient() {
        let err = Error::Timeout("250ms elapsed".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Transient);
        assert!(ErrorClass::classify(&err).is_retryable());
    }

    #[test]
    fn classify_permission_denied() {
        let err = Error::PermissionDenied("access denied".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::PermissionDenied);
        assert!(!ErrorClass::classify(&err).is_retryable());
    }

    #[test]
    fn classify_disconnect() {
        let err = Error::DeviceNotFound("gamepad".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Disconnected);
        assert!(!ErrorClass::classify(&err).is_retryable());
    }

    #[test]
    fn classify_hid_disconnect_message() {
        let err = Error::Hid("device disconnect detected".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Disconnected);
    }

    #[test]
    fn classify_hid_permission_message() {
        let err = Error::Hid("Access is denied".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::PermissionDenied);
    }

    #[test]
    fn classify_hid_timeout_message() {
        let err = Error::Hid("timed out waiting for report".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Transient);
    }

    #[test]
    fn classify_unknown_hid_failure_stops_pump() {
        let err = Error::Hid("ioctl failed".into());
        assert!(!ErrorClass::classify(&err).is_retryable());
    }

    #[test]
    fn classify_descriptor_error() {
        let err = Error::Descriptor("truncated item".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::InvalidData);
    }
}
