//! Error types.

use std::fmt::Display;
use std::io;

use thiserror::Error;

use crate::color::SUPPORTED_FORMATS;

/// Error type shared by the device, protocol and CLI layers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no ite8291r3 device found{}", cause_suffix(.cause))]
    NoDeviceFound {
        /// Last error which prevented a candidate from being checked.
        #[source]
        cause: Option<Box<Error>>,
    },

    #[error("device (bus={bus}, address={address}) is not an ite8291r3 device")]
    UnsupportedDevice { bus: u8, address: u8 },

    #[error("no output endpoint found")]
    NoOutEndpoint,

    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("short reply from controller: expected {expected} bytes, received {actual}")]
    ShortReply { expected: usize, actual: usize },

    #[error(
        "invalid color format {value:?}: expected one of {formats}",
        formats = SUPPORTED_FORMATS.join(", ")
    )]
    InvalidColor { value: String },

    #[error("invalid option value {value:?} for {name:?}: {expected}")]
    InvalidOption { name: &'static str, value: String, expected: String },

    #[error("device is already closed")]
    Closed,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// No matching device, optionally caused by a device which couldn't be checked.
    pub fn not_found(cause: Option<Error>) -> Self {
        Error::NoDeviceFound { cause: cause.map(Box::new) }
    }

    /// Value outside of its inclusive `min..=max` range.
    pub fn out_of_range(name: &'static str, value: impl Display, min: u64, max: u64) -> Self {
        Error::InvalidOption {
            name,
            value: value.to_string(),
            expected: format!("expected [{min},{max}]"),
        }
    }

    /// Whether the poll loop may retry after this error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoDeviceFound { .. })
    }
}

fn cause_suffix(cause: &Option<Box<Error>>) -> String {
    cause.as_ref().map(|err| format!(": {err}")).unwrap_or_default()
}

/// Result type for itectl operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn not_found_reports_cause() {
        assert_eq!(Error::not_found(None).to_string(), "no ite8291r3 device found");
        assert!(Error::not_found(None).source().is_none());

        let err = Error::not_found(Some(Error::Usb(rusb::Error::Access)));
        let expected = format!("no ite8291r3 device found: usb error: {}", rusb::Error::Access);
        assert_eq!(err.to_string(), expected);
        assert!(err.source().is_some());
        assert!(err.is_not_found());
    }
}
