//! ITE 8291 device lookup.

use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};

/// ITE Tech vendor ID.
pub const VENDOR_ID: u16 = 0x048d;

/// Known ITE 8291 rev 0.03 product IDs.
pub const PRODUCT_IDS: [u16; 3] = [0x6004, 0x6006, 0xce00];

/// Check if a vendor/product pair belongs to a supported controller.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == VENDOR_ID && PRODUCT_IDS.contains(&product_id)
}

/// Enumerated USB device which might be a supported controller.
pub trait Candidate {
    /// USB bus number.
    fn bus(&self) -> u8;

    /// Device address on its bus.
    fn device_address(&self) -> u8;

    /// Vendor and product ID from the device descriptor.
    fn ids(&self) -> Result<(u16, u16)>;
}

/// Device the command should be sent to.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
pub enum Target {
    /// First device with a supported vendor/product ID.
    #[default]
    Auto,
    /// Device at an explicit bus and address.
    Address { bus: u8, address: u8 },
}

impl Target {
    /// Check whether the candidate is the requested device.
    ///
    /// A device at the requested address which isn't a supported controller
    /// is an error rather than a mismatch.
    pub fn matches<C: Candidate>(&self, candidate: &C) -> Result<bool> {
        match *self {
            Target::Auto => {
                let (vid, pid) = candidate.ids()?;
                Ok(is_supported(vid, pid))
            },
            Target::Address { bus, address } => {
                if candidate.bus() != bus || candidate.device_address() != address {
                    return Ok(false);
                }

                let (vid, pid) = candidate.ids()?;
                if !is_supported(vid, pid) {
                    return Err(Error::UnsupportedDevice { bus, address });
                }

                Ok(true)
            },
        }
    }
}

/// Return the first candidate matching the target.
///
/// Automatic lookup skips devices which can't be checked and reports the last
/// such error as the cause if no device matches.
pub fn find<C, I>(target: Target, candidates: I) -> Result<C>
where
    C: Candidate,
    I: IntoIterator<Item = C>,
{
    let mut skipped = None;

    for candidate in candidates {
        match target.matches(&candidate) {
            Ok(true) => {
                debug!(bus = candidate.bus(), address = candidate.device_address(), "Found device");
                return Ok(candidate);
            },
            Ok(false) => (),
            Err(err) if target == Target::Auto => {
                let (bus, address) = (candidate.bus(), candidate.device_address());
                debug!(bus, address, "Skipping device: {err}");
                skipped = Some(err);
            },
            Err(err) => return Err(err),
        }
    }

    Err(Error::not_found(skipped))
}

/// Device lookup retry settings.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct Poll {
    /// Delay between two lookup attempts.
    pub interval: Duration,
    /// Maximum time to wait for a device, zero searches only once.
    pub timeout: Duration,
}

impl Default for Poll {
    fn default() -> Self {
        Self { interval: Duration::from_millis(200), timeout: Duration::ZERO }
    }
}

/// Run `search` until it finds a device or the poll timeout elapses.
///
/// Only [`Error::NoDeviceFound`] is retried, every other error is returned
/// immediately.
pub fn poll<T, F>(poll: Poll, mut search: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let give_up_at = Instant::now() + poll.timeout;

    loop {
        let next_retry_at = Instant::now() + poll.interval;

        let err = match search() {
            Err(err) if err.is_not_found() => err,
            result => return result,
        };

        let now = Instant::now();
        if poll.timeout.is_zero() || now >= give_up_at {
            return Err(err);
        }

        // Wake up for the next attempt, or for the timeout if it comes first.
        let wake_at = next_retry_at.min(give_up_at);
        thread::sleep(wake_at.saturating_duration_since(now));

        if wake_at == give_up_at {
            return Err(err);
        }

        debug!("No device found, retrying");
    }
}
