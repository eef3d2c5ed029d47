//! libusb backed ITE 8291 device.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, UsbContext};
use tracing::{debug, info};

use crate::controller::{BulkEndpoint, ControlRequest, Device};
use crate::error::{Error, Result};
use crate::locator::{self, Candidate, Poll, Target};

/// Interface carrying the controller's HID reports.
pub const TARGET_INTERFACE: u8 = 1;

/// Timeout for a single USB transfer.
const TIMEOUT: Duration = Duration::from_secs(1);

impl<T: UsbContext> Candidate for rusb::Device<T> {
    fn bus(&self) -> u8 {
        self.bus_number()
    }

    fn device_address(&self) -> u8 {
        self.address()
    }

    fn ids(&self) -> Result<(u16, u16)> {
        let descriptor = self.device_descriptor()?;
        Ok((descriptor.vendor_id(), descriptor.product_id()))
    }
}

/// Open ITE 8291 USB device.
///
/// The handle keeps its libusb context alive, both are released together on
/// [`Device::close`] or when the device is dropped.
pub struct UsbDevice {
    device: rusb::Device<Context>,
    handle: Option<DeviceHandle<Context>>,
}

impl UsbDevice {
    /// Find and open the target device, polling for it if requested.
    pub fn open(target: Target, poll: Poll) -> Result<Self> {
        let context = Context::new()?;

        locator::poll(poll, || {
            let devices = context.devices()?;
            let device = locator::find(target, devices.iter())?;
            Self::open_device(device)
        })
    }

    /// Open a matched device, detaching the kernel driver from its interface.
    fn open_device(device: rusb::Device<Context>) -> Result<Self> {
        let handle = device.open()?;

        if handle.kernel_driver_active(TARGET_INTERFACE)? {
            handle.detach_kernel_driver(TARGET_INTERFACE)?;
            debug!(interface = TARGET_INTERFACE, "Detached kernel driver");
        }

        info!(bus = device.bus_number(), address = device.address(), "Opened ITE 8291 device");

        Ok(Self { device, handle: Some(handle) })
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>> {
        self.handle.as_ref().ok_or(Error::Closed)
    }
}

impl Device for UsbDevice {
    fn write_control(&mut self, request: ControlRequest, data: &[u8]) -> Result<usize> {
        let ControlRequest { request_type, request, value, index } = request;
        let written =
            self.handle()?.write_control(request_type, request, value, index, data, TIMEOUT)?;
        debug!(len = data.len(), written, "Control transfer out");
        Ok(written)
    }

    fn read_control(&mut self, request: ControlRequest, buf: &mut [u8]) -> Result<usize> {
        let ControlRequest { request_type, request, value, index } = request;
        let read = self.handle()?.read_control(request_type, request, value, index, buf, TIMEOUT)?;
        debug!(len = buf.len(), read, "Control transfer in");
        Ok(read)
    }

    fn bulk_endpoint(&mut self) -> Result<BulkEndpoint> {
        self.handle()?;

        let config = self.device.active_config_descriptor()?;
        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.direction() == Direction::Out {
                        debug!(endpoint = endpoint.address(), "Found output endpoint");
                        return Ok(BulkEndpoint(endpoint.address()));
                    }
                }
            }
        }

        Err(Error::NoOutEndpoint)
    }

    fn write_bulk(&mut self, endpoint: BulkEndpoint, data: &[u8]) -> Result<usize> {
        Ok(self.handle()?.write_bulk(endpoint.0, data, TIMEOUT)?)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes it and releases its context reference.
        self.handle.take().map(drop).ok_or(Error::Closed)?;
        debug!("Closed ITE 8291 device");
        Ok(())
    }
}

/// Supported device found on the bus.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct DeviceSummary {
    pub bus: u8,
    pub address: u8,
    pub port: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub version: (u8, u8, u8),
}

impl Display for DeviceSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (major, minor, sub_minor) = self.version;
        write!(f, "Bus:{:03} Device:{:03} Port:{:03} ", self.bus, self.address, self.port)?;
        write!(f, "Vendor:{:04x} Product:{:04x} ", self.vendor_id, self.product_id)?;
        write!(f, "Rev:{major}.{minor}.{sub_minor}")
    }
}

/// List all connected supported devices.
pub fn list_devices() -> Result<Vec<DeviceSummary>> {
    let context = Context::new()?;

    let mut found = Vec::new();
    for device in context.devices()?.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };

        if !locator::is_supported(descriptor.vendor_id(), descriptor.product_id()) {
            continue;
        }

        let version = descriptor.device_version();
        found.push(DeviceSummary {
            bus: device.bus_number(),
            address: device.address(),
            port: device.port_number(),
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            version: (version.major(), version.minor(), version.sub_minor()),
        });
    }

    Ok(found)
}
