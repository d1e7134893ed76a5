//! Status codes returned by the core and the class layers

use usb_device::UsbError;

/// Errors reported by the USB core and class drivers
///
/// Every public entry point validates its arguments and the device / class
/// state locally, and reports failures with one of these values. A transfer
/// that fails reports no transferred bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Error {
    /// An index or argument is out of range, or malformed.
    InvalidParameter,
    /// The operation isn't allowed in the current device or class state.
    ///
    /// For instance, a data transfer before the host selects a configuration.
    InvalidState,
    /// A fixed-size table or buffer is exhausted.
    AllocationFailed,
    /// A conflicting asynchronous transfer is already in flight.
    ///
    /// Retry once the in-flight transfer completes.
    NotReady,
    /// The requested feature isn't supported (isochronous CDC data, for instance).
    NotSupported,
    /// A synchronous transfer didn't complete before its timeout.
    Timeout,
    /// The transfer was cancelled by an abort, a bus reset, or a configuration change.
    Aborted,
    /// The USB bus reported an error.
    Bus(UsbError),
}

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        Error::Bus(err)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidParameter => f.write_str("invalid parameter"),
            Error::InvalidState => f.write_str("invalid state"),
            Error::AllocationFailed => f.write_str("allocation failed"),
            Error::NotReady => f.write_str("not ready"),
            Error::NotSupported => f.write_str("not supported"),
            Error::Timeout => f.write_str("timeout"),
            Error::Aborted => f.write_str("aborted"),
            Error::Bus(err) => write!(f, "bus error: {:?}", err),
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;
