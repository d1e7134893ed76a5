//! CDC Abstract Control Model (ACM) subclass: virtual serial ports
//!
//! [`AcmSerial`] is the class driver. It answers the PSTN management
//! requests (line coding, control line state, break, and the abstract
//! state feature), and reports serial line state changes to the host with
//! `SERIAL_STATE` notifications. Each port has one data interface; use
//! [`read`](AcmSerial::read) and [`write`](AcmSerial::write) to move data.

use bitflags::bitflags;
use heapless::Vec;
use usb_device::bus::UsbBus;

use super::{functional, protocol, subclass, Cdc, CdcControl, CdcInstance, Subclass};
use crate::{
    class::{ClassDriver, ClassState, DriverId, TransferComplete},
    control::SetupPacket,
    descriptor::{descriptor_type, DescriptorWriter},
    usbcore::{Core, DeviceState},
    Error, Result,
};

/// PSTN management request codes
pub mod request {
    pub const SEND_ENCAPSULATED_COMMAND: u8 = 0x00;
    pub const GET_ENCAPSULATED_RESPONSE: u8 = 0x01;
    pub const SET_COMM_FEATURE: u8 = 0x02;
    pub const GET_COMM_FEATURE: u8 = 0x03;
    pub const CLEAR_COMM_FEATURE: u8 = 0x04;
    pub const SET_LINE_CODING: u8 = 0x20;
    pub const GET_LINE_CODING: u8 = 0x21;
    pub const SET_CONTROL_LINE_STATE: u8 = 0x22;
    pub const SEND_BREAK: u8 = 0x23;
}

/// `SERIAL_STATE` notification code
const SERIAL_STATE: u8 = 0x20;

/// Communication feature selector for the abstract state bitmap
const ABSTRACT_STATE: u16 = 0x01;
const ABSTRACT_STATE_IDLE: u16 = 1 << 0;
const ABSTRACT_STATE_MULTIPLEXED: u16 = 1 << 1;

/// bmCapabilities of the ACM functional descriptor: comm features, line
/// coding and serial state, and send break.
const ACM_CAPABILITIES: u8 = 0x07;

/// Data stage timeout for management requests
const REQUEST_TIMEOUT_MS: u32 = 500;

/// Number of stop bits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
#[repr(u8)]
pub enum StopBits {
    #[default]
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

impl StopBits {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(StopBits::One),
            1 => Some(StopBits::OnePointFive),
            2 => Some(StopBits::Two),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

impl Parity {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Parity::None),
            1 => Some(Parity::Odd),
            2 => Some(Parity::Even),
            3 => Some(Parity::Mark),
            4 => Some(Parity::Space),
            _ => None,
        }
    }
}

/// Serial port settings requested by the host
///
/// Defaults to 9600 baud, 8 data bits, no parity, one stop bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct LineCoding {
    pub baud_rate: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// 5, 6, 7, 8, or 16
    pub data_bits: u8,
}

impl Default for LineCoding {
    fn default() -> Self {
        LineCoding {
            baud_rate: 9600,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: 8,
        }
    }
}

impl LineCoding {
    /// Size of the line coding structure on the wire
    pub const SIZE: usize = 7;

    /// Parse the `SET_LINE_CODING` data stage
    ///
    /// Returns `None` if a field holds an unknown value.
    pub fn parse(buf: &[u8; Self::SIZE]) -> Option<Self> {
        let coding = LineCoding {
            baud_rate: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            stop_bits: StopBits::from_u8(buf[4])?,
            parity: Parity::from_u8(buf[5])?,
            data_bits: buf[6],
        };
        coding.is_valid().then_some(coding)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let [b0, b1, b2, b3] = self.baud_rate.to_le_bytes();
        [
            b0,
            b1,
            b2,
            b3,
            self.stop_bits as u8,
            self.parity as u8,
            self.data_bits,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.baud_rate != 0 && matches!(self.data_bits, 5 | 6 | 7 | 8 | 16)
    }
}

bitflags! {
    /// Control signals driven by the host
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct LineControl : u8 {
        const BREAK = 1 << 0;
        const RTS = 1 << 1;
        const DTR = 1 << 2;
    }
}

bitflags! {
    /// Serial line state reported to the host
    ///
    /// `DCD` and `DSR` are consistent signals, and stay set until cleared.
    /// The other signals are irregular events, and clear once the host is
    /// notified.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct LineState : u8 {
        const DCD = 1 << 0;
        const DSR = 1 << 1;
        const BREAK = 1 << 2;
        const RING = 1 << 3;
        const FRAMING = 1 << 4;
        const PARITY = 1 << 5;
        const OVERRUN = 1 << 6;

        const CONSISTENT = Self::DCD.bits() | Self::DSR.bits();
    }
}

bitflags! {
    /// Capabilities reported in the call management functional descriptor
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CallManagement : u8 {
        /// The device handles call management itself.
        const DEVICE = 1 << 0;
        /// The device sends call management over the data interface.
        const DATA_OVER_DCI = 1 << 1;
    }
}

/// Application callbacks for ACM ports
///
/// Every method has a default. `()` implements the trait with the
/// defaults.
pub trait AcmHandler {
    /// The host selected a configuration that contains the port.
    fn enable(&mut self, port: u8) {
        let _ = port;
    }

    fn disable(&mut self, port: u8) {
        let _ = port;
    }

    /// The host requested a new line coding
    ///
    /// Return `false` to reject the coding; the port keeps its current
    /// coding, and the request stalls.
    fn line_coding_changed(&mut self, port: u8, coding: &LineCoding) -> bool {
        let _ = (port, coding);
        true
    }

    /// The host changed control signals. `changed` has the signals that
    /// differ from the previous `state`.
    fn line_control_changed(&mut self, port: u8, state: LineControl, changed: LineControl) {
        let _ = (port, state, changed);
    }
}

impl AcmHandler for () {}

/// Per-port ACM state
#[derive(Debug)]
struct Port {
    idle: bool,
    line_coding: LineCoding,
    line_control: LineControl,
    line_state: LineState,
    /// The line state changed since the last notification
    line_state_changed: bool,
    /// A notification is waiting for the host
    line_state_sent: bool,
    call_management: CallManagement,
}

impl Port {
    fn new(call_management: CallManagement) -> Self {
        Port {
            idle: false,
            line_coding: LineCoding::default(),
            line_control: LineControl::empty(),
            line_state: LineState::empty(),
            line_state_changed: false,
            line_state_sent: false,
            call_management,
        }
    }

    /// Notify the host of a pending line state change, if nothing is in flight
    ///
    /// Changes stay pending while the port isn't configured.
    fn send_line_state<B: UsbBus>(
        &mut self,
        instance: &mut CdcInstance,
        usb: &mut Core<B>,
    ) -> Result<()> {
        if !self.line_state_changed || self.line_state_sent {
            return Ok(());
        }
        if instance.state() != ClassState::Configured || usb.state() != DeviceState::Configured {
            return Ok(());
        }
        instance.notify(usb, SERIAL_STATE, 0, &[self.line_state.bits(), 0])?;
        self.line_state_sent = true;
        self.line_state_changed = false;
        self.line_state &= LineState::CONSISTENT;
        Ok(())
    }
}

/// The ACM subclass of the CDC base class
///
/// Use it through [`AcmSerial`].
pub struct Acm<H, const N: usize> {
    handler: H,
    ports: Vec<Port, N>,
}

impl<H: AcmHandler, const N: usize> Acm<H, N> {
    fn comm_feature<B: UsbBus>(&mut self, ctl: CdcControl<'_, B>, req: &SetupPacket) -> bool {
        let Some(port) = self.ports.get_mut(ctl.class_nbr as usize) else {
            return false;
        };
        if req.value != ABSTRACT_STATE {
            return false;
        }
        match req.request {
            request::SET_COMM_FEATURE => {
                let mut buf = [0; 2];
                if ctl.usb.read_control_sync(&mut buf, REQUEST_TIMEOUT_MS) != Ok(2) {
                    return false;
                }
                let bitmap = u16::from_le_bytes(buf);
                if bitmap & ABSTRACT_STATE_MULTIPLEXED != 0 {
                    return false;
                }
                port.idle = bitmap & ABSTRACT_STATE_IDLE != 0;
                true
            }
            request::GET_COMM_FEATURE => {
                let bitmap = if port.idle { ABSTRACT_STATE_IDLE } else { 0 };
                ctl.usb
                    .write_control_sync(&bitmap.to_le_bytes(), REQUEST_TIMEOUT_MS, true)
                    .is_ok()
            }
            request::CLEAR_COMM_FEATURE => {
                port.idle = false;
                true
            }
            _ => false,
        }
    }
}

impl<B: UsbBus, H: AcmHandler, const N: usize> Subclass<B> for Acm<H, N> {
    fn enable(&mut self, ctl: CdcControl<'_, B>) {
        if let Some(port) = self.ports.get_mut(ctl.class_nbr as usize) {
            port.line_state_sent = false;
        }
        self.handler.enable(ctl.class_nbr);
    }

    fn disable(&mut self, ctl: CdcControl<'_, B>) {
        let nbr = ctl.class_nbr;
        if let Some(port) = self.ports.get_mut(nbr as usize) {
            port.line_state_sent = false;
            // The host's signals drop with the configuration.
            let dropped = core::mem::take(&mut port.line_control);
            if !dropped.is_empty() {
                self.handler
                    .line_control_changed(nbr, LineControl::empty(), dropped);
            }
        }
        self.handler.disable(nbr);
    }

    fn management_request(&mut self, ctl: CdcControl<'_, B>, req: &SetupPacket) -> bool {
        let nbr = ctl.class_nbr;
        match req.request {
            request::SET_COMM_FEATURE | request::GET_COMM_FEATURE | request::CLEAR_COMM_FEATURE => {
                self.comm_feature(ctl, req)
            }
            request::SET_LINE_CODING => {
                let Some(port) = self.ports.get_mut(nbr as usize) else {
                    return false;
                };
                let mut buf = [0; LineCoding::SIZE];
                if ctl.usb.read_control_sync(&mut buf, REQUEST_TIMEOUT_MS) != Ok(LineCoding::SIZE) {
                    return false;
                }
                let Some(coding) = LineCoding::parse(&buf) else {
                    return false;
                };
                if !self.handler.line_coding_changed(nbr, &coding) {
                    debug!("ACM {} LINE CODING VETOED", nbr);
                    return false;
                }
                port.line_coding = coding;
                true
            }
            request::GET_LINE_CODING => {
                let Some(port) = self.ports.get(nbr as usize) else {
                    return false;
                };
                ctl.usb
                    .write_control_sync(&port.line_coding.to_bytes(), REQUEST_TIMEOUT_MS, true)
                    .is_ok()
            }
            request::SET_CONTROL_LINE_STATE => {
                let Some(port) = self.ports.get_mut(nbr as usize) else {
                    return false;
                };
                let old = port.line_control;
                let mut new = old & LineControl::BREAK;
                new.set(LineControl::DTR, req.value & 0x01 != 0);
                new.set(LineControl::RTS, req.value & 0x02 != 0);
                port.line_control = new;

                if new.contains(LineControl::DTR) && !old.contains(LineControl::DTR) {
                    if let Err(err) = port.send_line_state(ctl.instance, ctl.usb) {
                        warn!("ACM {} SERIAL STATE {:?}", nbr, err);
                    }
                }
                let changed = old ^ new;
                if !changed.is_empty() {
                    self.handler.line_control_changed(nbr, new, changed);
                }
                true
            }
            request::SEND_BREAK => {
                let Some(port) = self.ports.get_mut(nbr as usize) else {
                    return false;
                };
                let old = port.line_control;
                let mut new = old;
                new.set(LineControl::BREAK, req.value != 0);
                port.line_control = new;
                if old != new {
                    self.handler
                        .line_control_changed(nbr, new, LineControl::BREAK);
                }
                true
            }
            _ => false,
        }
    }

    fn notification_complete(&mut self, ctl: CdcControl<'_, B>, status: Result<()>) {
        let Some(port) = self.ports.get_mut(ctl.class_nbr as usize) else {
            return;
        };
        port.line_state_sent = false;
        if status.is_err() {
            return;
        }
        if let Err(err) = port.send_line_state(ctl.instance, ctl.usb) {
            warn!("ACM {} SERIAL STATE {:?}", ctl.class_nbr, err);
        }
    }

    fn functional_descriptors(
        &self,
        w: &mut DescriptorWriter,
        class_nbr: u8,
        first_data_if: Option<u8>,
    ) -> Result<()> {
        let call_management = self
            .ports
            .get(class_nbr as usize)
            .map(|port| port.call_management)
            .unwrap_or_default();
        w.write_descriptor(
            descriptor_type::CS_INTERFACE,
            &[
                functional::CALL_MANAGEMENT,
                call_management.bits(),
                first_data_if.unwrap_or(0),
            ],
        )?;
        w.write_descriptor(
            descriptor_type::CS_INTERFACE,
            &[functional::ABSTRACT_CONTROL_MANAGEMENT, ACM_CAPABILITIES],
        )
    }
}

/// Virtual serial ports
///
/// Manages up to `N` ports. `H` receives the port callbacks.
pub struct AcmSerial<H, const N: usize> {
    cdc: Cdc<Acm<H, N>, N>,
}

impl<H: AcmHandler, const N: usize> AcmSerial<H, N> {
    pub const fn new(id: DriverId, handler: H) -> Self {
        AcmSerial {
            cdc: Cdc::new(
                id,
                Acm {
                    handler,
                    ports: Vec::new(),
                },
            ),
        }
    }

    pub fn handler(&self) -> &H {
        &self.cdc.subclass.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.cdc.subclass.handler
    }

    /// Allocate a serial port with one data interface
    ///
    /// `line_state_interval` is the notification interval, in frames.
    /// Returns the port number.
    pub fn create_instance(
        &mut self,
        line_state_interval: u16,
        call_management: CallManagement,
    ) -> Result<u8> {
        if self.cdc.instances.is_full() {
            return Err(Error::AllocationFailed);
        }
        let nbr = self.cdc.create_instance(
            subclass::ABSTRACT_CONTROL,
            protocol::AT_V250,
            true,
            line_state_interval,
        )?;
        self.cdc.add_data_interface(nbr, false, protocol::NONE)?;
        // Same capacity as the instance table.
        let _ = self.cdc.subclass.ports.push(Port::new(call_management));
        Ok(nbr)
    }

    /// Register the port's interfaces and endpoints in a configuration
    pub fn add_to_configuration<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        port: u8,
        config_nbr: u8,
    ) -> Result<()> {
        self.cdc.add_to_configuration(usb, port, config_nbr)
    }

    /// Indicates if the host selected a configuration that contains the port
    pub fn is_enabled<B: UsbBus>(&self, usb: &Core<B>, port: u8) -> bool {
        self.cdc.is_enabled(usb, port)
    }

    /// Receive data from the host
    ///
    /// See [`Cdc::read_data`].
    pub fn read<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        port: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        self.cdc.read_data(usb, port, 0, buf, timeout_ms)
    }

    /// Send data to the host
    pub fn write<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        port: u8,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        self.cdc.write_data(usb, port, 0, data, timeout_ms)
    }

    fn port(&self, port: u8) -> Result<&Port> {
        self.cdc
            .subclass
            .ports
            .get(port as usize)
            .ok_or(Error::InvalidParameter)
    }

    fn port_mut(&mut self, port: u8) -> Result<&mut Port> {
        self.cdc
            .subclass
            .ports
            .get_mut(port as usize)
            .ok_or(Error::InvalidParameter)
    }

    pub fn line_coding(&self, port: u8) -> Result<LineCoding> {
        Ok(self.port(port)?.line_coding)
    }

    /// Change the line coding from the device side
    pub fn set_line_coding(&mut self, port: u8, coding: LineCoding) -> Result<()> {
        if !coding.is_valid() {
            return Err(Error::InvalidParameter);
        }
        self.port_mut(port)?.line_coding = coding;
        Ok(())
    }

    /// The control signals last set by the host
    pub fn line_control(&self, port: u8) -> Result<LineControl> {
        Ok(self.port(port)?.line_control)
    }

    pub fn line_state(&self, port: u8) -> Result<LineState> {
        Ok(self.port(port)?.line_state)
    }

    /// Set line state signals, and notify the host
    ///
    /// The notification waits if another one is in flight, or until the
    /// port is configured.
    pub fn set_line_state_event<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        port: u8,
        events: LineState,
    ) -> Result<()> {
        self.update_line_state(usb, port, |state| state | events)
    }

    /// Clear line state signals, and notify the host
    ///
    /// Clearing signals that aren't set does nothing.
    pub fn clear_line_state_event<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        port: u8,
        events: LineState,
    ) -> Result<()> {
        self.update_line_state(usb, port, |state| state - events)
    }

    fn update_line_state<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        port: u8,
        update: impl FnOnce(LineState) -> LineState,
    ) -> Result<()> {
        let Cdc {
            instances, subclass, ..
        } = &mut self.cdc;
        let instance = instances
            .get_mut(port as usize)
            .ok_or(Error::InvalidParameter)?;
        let port = subclass
            .ports
            .get_mut(port as usize)
            .ok_or(Error::InvalidParameter)?;

        let state = update(port.line_state);
        if state == port.line_state {
            return Ok(());
        }
        port.line_state = state;
        port.line_state_changed = true;
        port.send_line_state(instance, usb)
    }

    /// Notification interval, in frames
    pub fn line_state_interval(&self, port: u8) -> Result<u16> {
        Ok(self.cdc.instance(port)?.notify_interval())
    }

    /// Change the notification interval before the port joins a
    /// configuration
    pub fn set_line_state_interval(&mut self, port: u8, interval: u16) -> Result<()> {
        self.cdc.set_notify_interval(port, interval)
    }

    pub fn call_management(&self, port: u8) -> Result<CallManagement> {
        Ok(self.port(port)?.call_management)
    }

    /// Change the call management capabilities
    ///
    /// The host sees the change the next time it reads the configuration
    /// descriptor.
    pub fn set_call_management(&mut self, port: u8, call_management: CallManagement) -> Result<()> {
        self.port_mut(port)?.call_management = call_management;
        Ok(())
    }
}

impl<B: UsbBus, H: AcmHandler, const N: usize> ClassDriver<B> for AcmSerial<H, N> {
    fn id(&self) -> DriverId {
        ClassDriver::<B>::id(&self.cdc)
    }

    fn enable(&mut self, usb: &mut Core<B>, config_nbr: u8, class_arg: usize) {
        self.cdc.enable(usb, config_nbr, class_arg);
    }

    fn disable(&mut self, usb: &mut Core<B>, config_nbr: u8, class_arg: usize) {
        self.cdc.disable(usb, config_nbr, class_arg);
    }

    fn interface_descriptor(
        &self,
        w: &mut DescriptorWriter,
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u8,
        class_arg: usize,
    ) -> Result<()> {
        ClassDriver::<B>::interface_descriptor(&self.cdc, w, config_nbr, if_nbr, alt_nbr, class_arg)
    }

    fn class_request(&mut self, usb: &mut Core<B>, req: &SetupPacket, class_arg: usize) -> bool {
        self.cdc.class_request(usb, req, class_arg)
    }

    fn transfer_complete(&mut self, usb: &mut Core<B>, class_arg: usize, xfer: &TransferComplete) {
        self.cdc.transfer_complete(usb, class_arg, xfer);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec as StdVec;

    use super::*;
    use crate::{
        mock::{self, control, enumerate, poll_all, stalled, MockBus},
        ConfigAttributes, Speed,
    };

    const SET_LINE_CODING: [u8; 8] = [0x21, 0x20, 0, 0, 0, 0, 7, 0];
    const GET_LINE_CODING: [u8; 8] = [0xA1, 0x21, 0, 0, 0, 0, 7, 0];
    const SET_ABSTRACT_STATE: [u8; 8] = [0x21, 0x02, 1, 0, 0, 0, 2, 0];
    const DECONFIGURE: [u8; 8] = [0x00, 0x09, 0, 0, 0, 0, 0, 0];

    fn set_control_line_state(value: u8) -> [u8; 8] {
        [0x21, 0x22, value, 0, 0, 0, 0, 0]
    }

    fn send_break_request(value: u16) -> [u8; 8] {
        let [lo, hi] = value.to_le_bytes();
        [0x21, 0x23, lo, hi, 0, 0, 0, 0]
    }

    #[derive(Default)]
    struct Log {
        veto: bool,
        enabled: StdVec<u8>,
        codings: StdVec<LineCoding>,
        controls: StdVec<(u8, LineControl, LineControl)>,
    }

    impl AcmHandler for Log {
        fn enable(&mut self, port: u8) {
            self.enabled.push(port);
        }

        fn line_coding_changed(&mut self, _: u8, coding: &LineCoding) -> bool {
            self.codings.push(*coding);
            !self.veto
        }

        fn line_control_changed(&mut self, port: u8, state: LineControl, changed: LineControl) {
            self.controls.push((port, state, changed));
        }
    }

    type Serial = AcmSerial<Log, 2>;

    fn setup() -> (Core<MockBus>, Serial, u8) {
        let mut usb = mock::core();
        let config = usb
            .add_configuration(ConfigAttributes::empty(), 100, Speed::LowFull)
            .unwrap();
        let mut serial = Serial::new(DriverId(5), Log::default());
        let port = serial
            .create_instance(16, CallManagement::DATA_OVER_DCI)
            .unwrap();
        serial.add_to_configuration(&mut usb, port, config).unwrap();
        usb.start().unwrap();
        (usb, serial, port)
    }

    /// Run a control transfer against `serial` alone
    fn request(
        usb: &mut Core<MockBus>,
        serial: &mut Serial,
        setup: [u8; 8],
        data: &[u8],
    ) -> StdVec<u8> {
        control(usb, &mut [serial], setup, data)
    }

    /// Payloads of the SERIAL_STATE notifications sent so far
    fn notifications(usb: &Core<MockBus>) -> StdVec<u8> {
        usb.bus()
            .take_written(1)
            .into_iter()
            .map(|packet| {
                assert_eq!(&packet[..8], &[0xA1, 0x20, 0, 0, 0, 0, 2, 0]);
                packet[8]
            })
            .collect()
    }

    #[test]
    fn line_coding_wire_format() {
        let coding = LineCoding {
            baud_rate: 115_200,
            ..LineCoding::default()
        };
        let bytes = [0x00, 0xC2, 0x01, 0x00, 0x00, 0x00, 0x08];
        assert_eq!(coding.to_bytes(), bytes);
        assert_eq!(LineCoding::parse(&bytes), Some(coding));
        assert_eq!(LineCoding::parse(&[0x80, 0x25, 0, 0, 3, 0, 8]), None);
        assert_eq!(LineCoding::parse(&[0x80, 0x25, 0, 0, 0, 5, 8]), None);
        assert_eq!(LineCoding::parse(&[0x80, 0x25, 0, 0, 0, 0, 9]), None);
        assert_eq!(
            LineCoding::default().to_bytes(),
            [0x80, 0x25, 0, 0, 0, 0, 8]
        );
    }

    #[test]
    fn host_sets_line_coding() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        assert_eq!(serial.handler().enabled, [port]);

        let bytes = [0x00, 0xC2, 0x01, 0x00, 0x00, 0x00, 0x08];
        request(&mut usb, &mut serial, SET_LINE_CODING, &bytes);
        assert!(!stalled(&usb));
        let coding = serial.line_coding(port).unwrap();
        assert_eq!(coding.baud_rate, 115_200);
        assert_eq!(serial.handler().codings, [coding]);

        let read = request(&mut usb, &mut serial, GET_LINE_CODING, &[]);
        assert_eq!(read, bytes);
    }

    #[test]
    fn vetoed_line_coding_stalls() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        serial.handler_mut().veto = true;

        let bytes = [0, 0xC2, 1, 0, 0, 0, 8];
        request(&mut usb, &mut serial, SET_LINE_CODING, &bytes);
        assert!(stalled(&usb));
        assert_eq!(serial.line_coding(port), Ok(LineCoding::default()));

        // Malformed codings don't reach the handler.
        serial.handler_mut().veto = false;
        let bytes = [0, 0xC2, 1, 0, 0, 0, 9];
        request(&mut usb, &mut serial, SET_LINE_CODING, &bytes);
        assert!(stalled(&usb));
        assert_eq!(serial.handler().codings.len(), 1);
    }

    #[test]
    fn device_sets_line_coding() {
        let (_, mut serial, port) = setup();
        let coding = LineCoding {
            baud_rate: 57_600,
            stop_bits: StopBits::Two,
            parity: Parity::Even,
            data_bits: 7,
        };
        serial.set_line_coding(port, coding).unwrap();
        assert_eq!(serial.line_coding(port), Ok(coding));
        assert_eq!(
            serial.set_line_coding(port, LineCoding { data_bits: 4, ..coding }),
            Err(Error::InvalidParameter)
        );
        assert_eq!(serial.line_coding(port + 1), Err(Error::InvalidParameter));
    }

    #[test]
    fn control_line_state_bits() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        let both = LineControl::DTR | LineControl::RTS;

        request(&mut usb, &mut serial, set_control_line_state(0x03), &[]);
        assert_eq!(serial.line_control(port), Ok(both));
        request(&mut usb, &mut serial, set_control_line_state(0x02), &[]);
        assert_eq!(serial.line_control(port), Ok(LineControl::RTS));
        // No change, no callback
        request(&mut usb, &mut serial, set_control_line_state(0x02), &[]);

        assert_eq!(
            serial.handler().controls,
            [
                (port, both, both),
                (port, LineControl::RTS, LineControl::DTR),
            ]
        );
    }

    #[test]
    fn deconfigure_drops_control_lines() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        let both = LineControl::DTR | LineControl::RTS;
        request(&mut usb, &mut serial, set_control_line_state(0x03), &[]);

        request(&mut usb, &mut serial, DECONFIGURE, &[]);
        assert!(!serial.is_enabled(&usb, port));
        assert_eq!(serial.line_control(port), Ok(LineControl::empty()));
        assert_eq!(
            serial.handler().controls,
            [(port, both, both), (port, LineControl::empty(), both)]
        );

        // Nothing to drop the second time around.
        enumerate(&mut usb, &mut [&mut serial], 1);
        request(&mut usb, &mut serial, DECONFIGURE, &[]);
        assert_eq!(serial.handler().controls.len(), 2);
    }

    #[test]
    fn dtr_sends_pending_line_state() {
        let (mut usb, mut serial, port) = setup();
        // Not configured; the change waits.
        serial
            .set_line_state_event(&mut usb, port, LineState::DCD)
            .unwrap();
        enumerate(&mut usb, &mut [&mut serial], 1);
        assert!(notifications(&usb).is_empty());

        request(&mut usb, &mut serial, set_control_line_state(0x01), &[]);
        assert_eq!(notifications(&usb), [LineState::DCD.bits()]);
        assert_eq!(
            serial.handler().controls,
            [(port, LineControl::DTR, LineControl::DTR)]
        );
    }

    #[test]
    fn send_break() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);

        request(&mut usb, &mut serial, send_break_request(0xFFFF), &[]);
        assert_eq!(serial.line_control(port), Ok(LineControl::BREAK));
        request(&mut usb, &mut serial, send_break_request(0), &[]);
        assert_eq!(serial.line_control(port), Ok(LineControl::empty()));
        assert!(!stalled(&usb));

        assert_eq!(
            serial.handler().controls,
            [
                (port, LineControl::BREAK, LineControl::BREAK),
                (port, LineControl::empty(), LineControl::BREAK),
            ]
        );
    }

    #[test]
    fn line_state_notifications_are_serialized() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        usb.bus().hold_in(1, true);

        serial
            .set_line_state_event(&mut usb, port, LineState::DSR)
            .unwrap();
        // Merged into the next notification
        serial
            .set_line_state_event(&mut usb, port, LineState::RING)
            .unwrap();
        assert_eq!(notifications(&usb), [LineState::DSR.bits()]);

        usb.bus().hold_in(1, false);
        poll_all(&mut usb, &mut [&mut serial]);
        assert_eq!(
            notifications(&usb),
            [(LineState::DSR | LineState::RING).bits()]
        );
        // RING is an event; DSR stays.
        assert_eq!(serial.line_state(port), Ok(LineState::DSR));
    }

    #[test]
    fn clear_line_state() {
        let (mut usb, mut serial, port) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);

        serial
            .clear_line_state_event(&mut usb, port, LineState::DCD)
            .unwrap();
        assert!(notifications(&usb).is_empty());

        let both = LineState::DCD | LineState::DSR;
        serial.set_line_state_event(&mut usb, port, both).unwrap();
        poll_all(&mut usb, &mut [&mut serial]);
        serial
            .clear_line_state_event(&mut usb, port, LineState::DCD)
            .unwrap();
        assert_eq!(notifications(&usb), [both.bits(), LineState::DSR.bits()]);
        assert_eq!(
            serial.clear_line_state_event(&mut usb, port + 1, LineState::DCD),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn abstract_state_feature() {
        let (mut usb, mut serial, _) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        let get = [0xA1, 0x03, 1, 0, 0, 0, 2, 0];

        request(&mut usb, &mut serial, SET_ABSTRACT_STATE, &[0x01, 0x00]);
        assert!(!stalled(&usb));
        assert_eq!(request(&mut usb, &mut serial, get, &[]), [1, 0]);

        // Data multiplexing isn't supported.
        request(&mut usb, &mut serial, SET_ABSTRACT_STATE, &[0x02, 0x00]);
        assert!(stalled(&usb));

        let clear = [0x21, 0x04, 1, 0, 0, 0, 0, 0];
        request(&mut usb, &mut serial, clear, &[]);
        assert_eq!(request(&mut usb, &mut serial, get, &[]), [0, 0]);

        // Country setting
        let get_country = [0xA1, 0x03, 2, 0, 0, 0, 2, 0];
        request(&mut usb, &mut serial, get_country, &[]);
        assert!(stalled(&usb));
    }

    #[test]
    fn unsupported_requests_stall() {
        let (mut usb, mut serial, _) = setup();
        enumerate(&mut usb, &mut [&mut serial], 1);
        let send_encapsulated = [0x21, 0x00, 0, 0, 0, 0, 0, 0];
        request(&mut usb, &mut serial, send_encapsulated, &[]);
        assert!(stalled(&usb));
    }

    #[test]
    fn functional_descriptors() {
        let (mut usb, mut serial, _) = setup();
        let get_configuration = [0x80, 0x06, 0, 2, 0, 0, 0xFF, 0];
        let desc = request(&mut usb, &mut serial, get_configuration, &[]);
        // Header, union, call management, ACM
        assert_eq!(&desc[26..31], &[5, 0x24, 0x00, 0x20, 0x01]);
        assert_eq!(&desc[31..36], &[5, 0x24, 0x06, 0, 1]);
        assert_eq!(&desc[36..41], &[5, 0x24, 0x01, 0x02, 1]);
        assert_eq!(&desc[41..45], &[4, 0x24, 0x02, 0x07]);
    }

    #[test]
    fn data_needs_configuration() {
        let (mut usb, mut serial, port) = setup();
        let mut buf = [0; 8];
        assert_eq!(
            serial.write(&mut usb, port, b"x", 10),
            Err(Error::InvalidState)
        );
        assert_eq!(
            serial.read(&mut usb, port, &mut buf, 10),
            Err(Error::InvalidState)
        );
        assert_eq!(
            serial.read(&mut usb, 1, &mut buf, 10),
            Err(Error::InvalidParameter)
        );

        enumerate(&mut usb, &mut [&mut serial], 1);
        assert!(serial.is_enabled(&usb, port));
        assert_eq!(serial.write(&mut usb, port, b"x", 10), Ok(1));
        usb.bus().push_out(1, b"yz");
        assert_eq!(serial.read(&mut usb, port, &mut buf, 10), Ok(2));
    }

    #[test]
    fn settings_before_configuration() {
        let mut usb = mock::core();
        let config = usb
            .add_configuration(ConfigAttributes::empty(), 100, Speed::LowFull)
            .unwrap();
        let mut serial = Serial::new(DriverId(5), Log::default());
        let port = serial.create_instance(16, CallManagement::empty()).unwrap();
        assert_eq!(serial.line_state_interval(port), Ok(16));
        serial.set_line_state_interval(port, 8).unwrap();
        let management = CallManagement::DEVICE | CallManagement::DATA_OVER_DCI;
        serial.set_call_management(port, management).unwrap();
        serial.add_to_configuration(&mut usb, port, config).unwrap();

        assert_eq!(
            serial.set_line_state_interval(port, 4),
            Err(Error::InvalidState)
        );
        assert_eq!(serial.line_state_interval(port), Ok(8));
        assert_eq!(usb.bus().allocations()[2].interval, 8);
        assert_eq!(serial.call_management(port), Ok(management));

        serial.create_instance(1, CallManagement::empty()).unwrap();
        assert_eq!(
            serial.create_instance(1, CallManagement::empty()),
            Err(Error::AllocationFailed)
        );
    }
}
