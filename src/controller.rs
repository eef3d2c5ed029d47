//! ITE 8291 controller protocol.

use std::fmt::{self, Display, Formatter};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::color::Rgb;
use crate::effect::{Brightness, ColorSlot, Effect, SET_EFFECT_COMMAND};
use crate::error::{Error, Result};

// Controller commands.
const GET_EFFECT_COMMAND: u8 = 0x88;
const SET_BRIGHTNESS_COMMAND: u8 = 0x09;
const SET_COLOR_COMMAND: u8 = 0x14;
const SET_ROW_INDEX_COMMAND: u8 = 0x16;
const GET_FIRMWARE_VERSION_COMMAND: u8 = 0x80;

/// Brightness control operation, shared with the effect commands.
const SET_BRIGHTNESS_OP: u8 = 0x02;

/// State byte reported while the backlight is off.
const OFF_STATE: u8 = 0x01;

/// Length of every reply read from the controller.
pub const REPLY_LEN: usize = 8;

/// Keyboard matrix size.
pub const ROWS: usize = 6;
pub const COLUMNS: usize = 21;

/// Length of a single bulk row write: padding, blue, green, red, padding.
pub const ROW_BUFFER_LEN: usize = 3 * COLUMNS + 2;

/// HID SET_REPORT to the feature report of interface 1.
pub const SEND_REQUEST: ControlRequest =
    ControlRequest { request_type: 0x21, request: 0x09, value: 0x0300, index: 0x0001 };

/// HID GET_REPORT from the feature report of interface 1.
pub const RECEIVE_REQUEST: ControlRequest =
    ControlRequest { request_type: 0xa1, request: 0x01, value: 0x0300, index: 0x0001 };

/// USB control transfer setup fields.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

/// Bulk OUT endpoint used for per-key colors.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct BulkEndpoint(pub u8);

/// USB device capabilities required by the controller.
pub trait Device {
    /// Host to device control transfer.
    fn write_control(&mut self, request: ControlRequest, data: &[u8]) -> Result<usize>;

    /// Device to host control transfer.
    fn read_control(&mut self, request: ControlRequest, buf: &mut [u8]) -> Result<usize>;

    /// Resolve the endpoint accepting bulk writes.
    fn bulk_endpoint(&mut self) -> Result<BulkEndpoint>;

    /// Bulk transfer to a previously resolved endpoint.
    fn write_bulk(&mut self, endpoint: BulkEndpoint, data: &[u8]) -> Result<usize>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;
}

impl<D: Device + ?Sized> Device for &mut D {
    fn write_control(&mut self, request: ControlRequest, data: &[u8]) -> Result<usize> {
        (**self).write_control(request, data)
    }

    fn read_control(&mut self, request: ControlRequest, buf: &mut [u8]) -> Result<usize> {
        (**self).read_control(request, buf)
    }

    fn bulk_endpoint(&mut self) -> Result<BulkEndpoint> {
        (**self).bulk_endpoint()
    }

    fn write_bulk(&mut self, endpoint: BulkEndpoint, data: &[u8]) -> Result<usize> {
        (**self).write_bulk(endpoint, data)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Controller firmware version.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub build: u8,
}

impl Display for FirmwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

/// ITE 8291 keyboard backlight controller.
///
/// Owns the device until [`Controller::close`] releases it.
pub struct Controller<D: Device> {
    device: D,
}

impl<D: Device> Controller<D> {
    /// Take ownership of an open device.
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Release the underlying device.
    pub fn close(mut self) -> Result<()> {
        self.device.close()
    }

    /// Run `f` and release the device afterwards, even if `f` failed.
    ///
    /// Errors from `f` take precedence over errors while closing the device.
    pub fn run_and_close<T, F>(mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let result = f(&mut self);
        let closed = self.close();

        let value = result?;
        closed?;

        Ok(value)
    }

    /// Switch the backlight off.
    pub fn set_off_mode(&mut self) -> Result<()> {
        self.set_mode(&Effect::Off, false)
    }

    /// Activate a lighting effect, optionally persisting it in the controller.
    pub fn set_mode(&mut self, effect: &Effect, save: bool) -> Result<()> {
        debug!(?effect, save, "Setting effect");
        self.send(&effect.command(save))
    }

    /// Check whether the backlight is on.
    pub fn state(&mut self) -> Result<bool> {
        let reply = self.query(GET_EFFECT_COMMAND)?;
        Ok(reply[1] != OFF_STATE)
    }

    /// Current backlight brightness.
    pub fn brightness(&mut self) -> Result<u8> {
        let reply = self.query(GET_EFFECT_COMMAND)?;
        Ok(reply[4])
    }

    /// Change brightness without changing the effect.
    pub fn set_brightness(&mut self, brightness: Brightness) -> Result<()> {
        self.send(&[SET_BRIGHTNESS_COMMAND, SET_BRIGHTNESS_OP, brightness.value()])
    }

    /// Read the controller firmware version.
    pub fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        let reply = self.query(GET_FIRMWARE_VERSION_COMMAND)?;
        Ok(FirmwareVersion { major: reply[1], minor: reply[2], patch: reply[3], build: reply[4] })
    }

    /// Change one of the customizable predefined colors.
    pub fn set_color(&mut self, slot: ColorSlot, color: Rgb) -> Result<()> {
        self.send(&color_command(slot, color))
    }

    /// Change all customizable predefined colors, in slot order.
    ///
    /// Stops at the first failure, slots written before it keep their new color.
    pub fn set_colors(&mut self, colors: &[Rgb; ColorSlot::COUNT]) -> Result<()> {
        for (slot, color) in ColorSlot::all().zip(colors) {
            self.set_color(slot, *color)?;
        }

        Ok(())
    }

    /// Set every key to the same color.
    ///
    /// Stops at the first failure, rows written before it are not restored.
    pub fn set_single_color_mode(
        &mut self,
        brightness: Brightness,
        color: Rgb,
        save: bool,
    ) -> Result<()> {
        self.set_mode(&Effect::User { brightness }, save)?;

        let endpoint = self.device.bulk_endpoint()?;
        let row = row_buffer(color);

        for index in 0..ROWS as u8 {
            self.send(&[SET_ROW_INDEX_COMMAND, 0x00, index])?;
            self.device.write_bulk(endpoint, &row)?;
        }

        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.device.write_control(SEND_REQUEST, data)?;
        Ok(())
    }

    /// Send a single byte query and read its reply.
    fn query(&mut self, command: u8) -> Result<[u8; REPLY_LEN]> {
        self.send(&[command])?;

        let mut reply = [0; REPLY_LEN];
        reply[0] = SET_EFFECT_COMMAND;

        let read = self.device.read_control(RECEIVE_REQUEST, &mut reply)?;
        if read < REPLY_LEN {
            return Err(Error::ShortReply { expected: REPLY_LEN, actual: read });
        }

        Ok(reply)
    }
}

/// Convert a predefined color to the controller format.
fn color_command(slot: ColorSlot, color: Rgb) -> Bytes {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_slice(&[SET_COLOR_COMMAND, 0x00, slot.value()]);
    buf.put_u8(color.r);
    buf.put_u8(color.g);
    buf.put_u8(color.b);
    buf.freeze()
}

/// Build one keyboard row where every key has the same color.
fn row_buffer(color: Rgb) -> Bytes {
    let mut buf = BytesMut::with_capacity(ROW_BUFFER_LEN);

    // Padding.
    buf.put_u8(0);

    // Key colors, one channel at a time.
    buf.put_bytes(color.b, COLUMNS);
    buf.put_bytes(color.g, COLUMNS);
    buf.put_bytes(color.r, COLUMNS);

    // Padding.
    buf.put_u8(0);

    buf.freeze()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::effect::{ColorNum, Speed};

    #[derive(PartialEq, Eq, Debug)]
    enum Transfer {
        Send(Vec<u8>),
        Receive(usize),
        Bulk(u8, Vec<u8>),
    }

    /// Device double recording every transfer.
    #[derive(Default)]
    struct RecordingDevice {
        transfers: Vec<Transfer>,
        replies: VecDeque<Vec<u8>>,
        fail_send_at: Option<usize>,
        fail_bulk_at: Option<usize>,
        no_endpoint: bool,
        fail_close: bool,
        sends: usize,
        bulk_writes: usize,
        closed: usize,
    }

    impl RecordingDevice {
        fn with_reply(reply: &[u8]) -> Self {
            Self { replies: VecDeque::from([reply.to_vec()]), ..Default::default() }
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.transfers
                .iter()
                .filter_map(|transfer| match transfer {
                    Transfer::Send(data) => Some(data.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Device for RecordingDevice {
        fn write_control(&mut self, request: ControlRequest, data: &[u8]) -> Result<usize> {
            assert_eq!(request, SEND_REQUEST);

            let call = self.sends;
            self.sends += 1;
            if self.fail_send_at == Some(call) {
                return Err(Error::Usb(rusb::Error::Pipe));
            }

            self.transfers.push(Transfer::Send(data.to_vec()));
            Ok(data.len())
        }

        fn read_control(&mut self, request: ControlRequest, buf: &mut [u8]) -> Result<usize> {
            assert_eq!(request, RECEIVE_REQUEST);
            assert_eq!(buf[0], 0x08);

            self.transfers.push(Transfer::Receive(buf.len()));
            let reply = self.replies.pop_front().unwrap_or_default();
            buf[..reply.len()].copy_from_slice(&reply);
            Ok(reply.len())
        }

        fn bulk_endpoint(&mut self) -> Result<BulkEndpoint> {
            if self.no_endpoint {
                return Err(Error::NoOutEndpoint);
            }

            Ok(BulkEndpoint(0x02))
        }

        fn write_bulk(&mut self, endpoint: BulkEndpoint, data: &[u8]) -> Result<usize> {
            let call = self.bulk_writes;
            self.bulk_writes += 1;
            if self.fail_bulk_at == Some(call) {
                return Err(Error::Usb(rusb::Error::NoDevice));
            }

            self.transfers.push(Transfer::Bulk(endpoint.0, data.to_vec()));
            Ok(data.len())
        }

        fn close(&mut self) -> Result<()> {
            self.closed += 1;
            if self.fail_close {
                return Err(Error::Usb(rusb::Error::NoDevice));
            }

            Ok(())
        }
    }

    fn brightness(value: u8) -> Brightness {
        Brightness::new(value).unwrap()
    }

    #[test]
    fn breathing_mode_sends_one_command() {
        let mut device = RecordingDevice::default();
        let mut controller = Controller::new(&mut device);

        let effect = Effect::Breathing {
            speed: Speed::new(8).unwrap(),
            brightness: brightness(40),
            color: ColorNum::new(3).unwrap(),
        };
        controller.set_mode(&effect, true).unwrap();
        controller.close().unwrap();

        assert_eq!(device.transfers, [Transfer::Send(vec![0x08, 0x02, 0x02, 2, 40, 3, 0, 1])]);
        assert_eq!(device.closed, 1);
    }

    #[test]
    fn run_and_close_returns_value() {
        let mut device = RecordingDevice::with_reply(&[8, 2, 0x33, 5, 42, 8, 0, 0]);
        let controller = Controller::new(&mut device);
        let brightness = controller.run_and_close(Controller::brightness).unwrap();

        assert_eq!(brightness, 42);
        assert_eq!(device.closed, 1);
    }

    #[test]
    fn run_and_close_closes_after_failure() {
        let mut device =
            RecordingDevice { fail_send_at: Some(0), fail_close: true, ..Default::default() };
        let result = Controller::new(&mut device).run_and_close(Controller::set_off_mode);

        // The operation error wins over the close error.
        assert!(matches!(result, Err(Error::Usb(rusb::Error::Pipe))));
        assert_eq!(device.closed, 1);
    }

    #[test]
    fn run_and_close_reports_close_failure() {
        let mut device = RecordingDevice { fail_close: true, ..Default::default() };
        let result = Controller::new(&mut device).run_and_close(Controller::set_off_mode);

        assert!(matches!(result, Err(Error::Usb(rusb::Error::NoDevice))));
        assert_eq!(device.sent().len(), 1);
        assert_eq!(device.closed, 1);
    }

    #[test]
    fn off_mode() {
        let mut device = RecordingDevice::default();
        Controller::new(&mut device).set_off_mode().unwrap();

        assert_eq!(device.sent(), vec![vec![0x08, 0x01, 0, 0, 0, 0, 0, 0]]);
    }

    #[test]
    fn state_on_and_off() {
        let mut device = RecordingDevice::with_reply(&[8, 2, 0, 0, 0, 0, 0, 0]);
        assert!(Controller::new(&mut device).state().unwrap());
        assert_eq!(device.transfers, [Transfer::Send(vec![0x88]), Transfer::Receive(8)]);

        let mut device = RecordingDevice::with_reply(&[8, 1, 0, 0, 0, 0, 0, 0]);
        assert!(!Controller::new(&mut device).state().unwrap());
    }

    #[test]
    fn reads_brightness() {
        let mut device = RecordingDevice::with_reply(&[8, 2, 0x33, 5, 42, 8, 0, 0]);
        assert_eq!(Controller::new(&mut device).brightness().unwrap(), 42);
        assert_eq!(device.sent(), vec![vec![0x88]]);
    }

    #[test]
    fn short_reply_is_rejected() {
        let mut device = RecordingDevice::with_reply(&[8, 2, 0, 0]);
        assert!(matches!(
            Controller::new(&mut device).brightness(),
            Err(Error::ShortReply { expected: 8, actual: 4 })
        ));
    }

    #[test]
    fn query_stops_when_send_fails() {
        let mut device = RecordingDevice { fail_send_at: Some(0), ..Default::default() };
        assert!(matches!(Controller::new(&mut device).state(), Err(Error::Usb(rusb::Error::Pipe))));
        assert!(device.transfers.is_empty());
    }

    #[test]
    fn sets_brightness() {
        let mut device = RecordingDevice::default();
        Controller::new(&mut device).set_brightness(brightness(33)).unwrap();

        assert_eq!(device.sent(), vec![vec![0x09, 0x02, 33]]);
    }

    #[test]
    fn reads_firmware_version() {
        let mut device = RecordingDevice::with_reply(&[8, 0, 3, 2, 1, 0, 0, 0]);
        let version = Controller::new(&mut device).firmware_version().unwrap();

        assert_eq!(version.to_string(), "0.3.2.1");
        assert_eq!(device.sent(), vec![vec![0x80]]);
    }

    #[test]
    fn sets_predefined_color() {
        let mut device = RecordingDevice::default();
        let slot = ColorSlot::new(4).unwrap();
        Controller::new(&mut device).set_color(slot, Rgb::new(1, 2, 3)).unwrap();

        assert_eq!(device.sent(), vec![vec![0x14, 0x00, 4, 1, 2, 3]]);
    }

    #[test]
    fn sets_all_colors_in_order() {
        let colors: [Rgb; 7] = std::array::from_fn(|i| {
            let i = i as u8;
            Rgb::new(i, 10 + i, 20 + i)
        });

        let mut device = RecordingDevice::default();
        Controller::new(&mut device).set_colors(&colors).unwrap();

        let sent = device.sent();
        assert_eq!(sent.len(), 7);
        for (i, data) in sent.iter().enumerate() {
            let i = i as u8;
            assert_eq!(*data, [0x14, 0x00, i + 1, i, 10 + i, 20 + i]);
        }
    }

    #[test]
    fn set_colors_stops_at_first_failure() {
        let colors = [Rgb::WHITE; 7];

        let mut device = RecordingDevice { fail_send_at: Some(3), ..Default::default() };
        let result = Controller::new(&mut device).set_colors(&colors);

        assert!(matches!(result, Err(Error::Usb(rusb::Error::Pipe))));
        assert_eq!(device.sends, 4);
        let slots: Vec<u8> = device.sent().iter().map(|data| data[2]).collect();
        assert_eq!(slots, [1, 2, 3]);
    }

    #[test]
    fn single_color_mode_sequence() {
        let color = Rgb::new(0x11, 0x22, 0x33);

        let mut device = RecordingDevice::default();
        Controller::new(&mut device).set_single_color_mode(brightness(20), color, true).unwrap();

        assert_eq!(device.transfers.len(), 1 + 2 * ROWS);
        assert_eq!(device.transfers[0], Transfer::Send(vec![0x08, 0x02, 0x33, 0, 20, 0, 0, 1]));

        for row in 0..ROWS {
            let select = &device.transfers[1 + 2 * row];
            assert_eq!(*select, Transfer::Send(vec![0x16, 0x00, row as u8]));

            let Transfer::Bulk(endpoint, data) = &device.transfers[2 + 2 * row] else {
                panic!("expected bulk write after row {row} selection");
            };
            assert_eq!(*endpoint, 0x02);
            assert_eq!(data.len(), ROW_BUFFER_LEN);
            assert_eq!(data[0], 0);
            assert_eq!(data[64], 0);
            assert!(data[1..22].iter().all(|b| *b == 0x33));
            assert!(data[22..43].iter().all(|b| *b == 0x22));
            assert!(data[43..64].iter().all(|b| *b == 0x11));
        }
    }

    #[test]
    fn single_color_mode_aborts_on_bulk_failure() {
        let mut device = RecordingDevice { fail_bulk_at: Some(2), ..Default::default() };
        let mut controller = Controller::new(&mut device);
        let result = controller.set_single_color_mode(brightness(20), Rgb::WHITE, false);

        assert!(matches!(result, Err(Error::Usb(rusb::Error::NoDevice))));
        // User effect, then three row selections with two successful writes.
        assert_eq!(device.sent().len(), 4);
        assert_eq!(device.bulk_writes, 3);
    }

    #[test]
    fn single_color_mode_without_endpoint() {
        let mut device = RecordingDevice { no_endpoint: true, ..Default::default() };
        let mut controller = Controller::new(&mut device);
        let result = controller.set_single_color_mode(brightness(20), Rgb::WHITE, false);

        assert!(matches!(result, Err(Error::NoOutEndpoint)));
        assert_eq!(device.sent().len(), 1);
    }

    #[test]
    fn fixed_buffer_lengths() {
        assert_eq!(row_buffer(Rgb::WHITE).len(), 65);
        assert_eq!(color_command(ColorSlot::new(1).unwrap(), Rgb::WHITE).len(), 6);
    }
}
