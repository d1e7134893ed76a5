//! Communications Device Class (CDC) base
//!
//! A CDC instance is one control interface, with an optional interrupt IN
//! notification endpoint, followed by zero or more data interfaces. Each
//! data interface owns a bulk IN / bulk OUT pair. An interface association
//! groups the control and data interfaces into one function.
//!
//! The base class handles the plumbing: interface and endpoint
//! registration, the header and union functional descriptors, data
//! transfers, and host notifications. A [`Subclass`] supplies the
//! management requests and the remaining functional descriptors. See
//! [`acm`] for the virtual serial port subclass.

pub mod acm;

use heapless::Vec;
use usb_device::{bus::UsbBus, endpoint::EndpointAddress, UsbDirection};

use super::{ClassDriver, ClassState, DriverId, InterfaceClass, TransferComplete};
use crate::{
    control::SetupPacket,
    descriptor::{descriptor_type, DescriptorWriter},
    usbcore::{Capacity, Core, DeviceState},
    Error, Result, Speed, TransferType, MAX_CONFIGURATIONS,
};

/// Communications interface class code
pub const COMMUNICATIONS_CLASS: u8 = 0x02;
/// Data interface class code
pub const DATA_CLASS: u8 = 0x0A;

/// Communications subclass codes
pub mod subclass {
    pub const DIRECT_LINE: u8 = 0x01;
    pub const ABSTRACT_CONTROL: u8 = 0x02;
    pub const TELEPHONE_CONTROL: u8 = 0x03;
    pub const MULTI_CHANNEL: u8 = 0x04;
    pub const CAPI_CONTROL: u8 = 0x05;
    pub const ETHERNET_NETWORKING: u8 = 0x06;
    pub const ATM_NETWORKING: u8 = 0x07;
}

/// Communications protocol codes
pub mod protocol {
    pub const NONE: u8 = 0x00;
    /// AT commands, ITU-T V.250
    pub const AT_V250: u8 = 0x01;
    pub const VENDOR: u8 = 0xFF;
}

/// Functional descriptor subtypes
pub mod functional {
    pub const HEADER: u8 = 0x00;
    pub const CALL_MANAGEMENT: u8 = 0x01;
    pub const ABSTRACT_CONTROL_MANAGEMENT: u8 = 0x02;
    pub const UNION: u8 = 0x06;
}

/// bcdCDC reported in the header functional descriptor
const CDC_RELEASE: u16 = 0x0120;

/// Data interfaces per CDC instance
pub const MAX_DATA_INTERFACES: usize = 2;

/// Largest payload that follows a notification header
pub const MAX_NOTIFICATION_DATA: usize = 8;

const NOTIFICATION_HEADER_SIZE: usize = 8;

/// Notification endpoint packet size
const NOTIFICATION_PACKET_SIZE: u16 = 16;

/// A data interface requested by [`Cdc::add_data_interface`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DataInterface {
    protocol: u8,
    isochronous: bool,
}

/// Endpoints of one data interface in one configuration
#[derive(Clone, Copy, Debug)]
struct DataEndpoints {
    bulk_in: EndpointAddress,
    bulk_out: EndpointAddress,
}

/// An instance's interfaces and endpoints in one configuration
#[derive(Debug)]
struct Comm {
    config_nbr: u8,
    ctrl_if: u8,
    first_data_if: u8,
    notify_ep: Option<EndpointAddress>,
    data: Vec<DataEndpoints, MAX_DATA_INTERFACES>,
}

/// One CDC function
#[derive(Debug)]
pub struct CdcInstance {
    state: ClassState,
    subclass_code: u8,
    protocol: u8,
    notify_enabled: bool,
    notify_interval: u16,
    data_interfaces: Vec<DataInterface, MAX_DATA_INTERFACES>,
    comms: Vec<Comm, MAX_CONFIGURATIONS>,
    /// Index into `comms` while a configuration is active
    active: Option<usize>,
    notify_in_flight: bool,
}

impl CdcInstance {
    pub fn state(&self) -> ClassState {
        self.state
    }

    pub fn subclass_code(&self) -> u8 {
        self.subclass_code
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    /// Notification endpoint interval, in frames
    pub fn notify_interval(&self) -> u16 {
        self.notify_interval
    }

    /// Indicates if a notification is waiting for the host
    pub fn is_notifying(&self) -> bool {
        self.notify_in_flight
    }

    fn active_comm(&self) -> Result<&Comm> {
        self.active
            .and_then(|idx| self.comms.get(idx))
            .ok_or(Error::InvalidState)
    }

    fn comm_for(&self, config_nbr: u8) -> Option<usize> {
        self.comms
            .iter()
            .position(|comm| comm.config_nbr == config_nbr)
    }

    /// The active data endpoints of data interface `data_if`
    ///
    /// Checks parameters before state.
    fn data_endpoints<B: UsbBus>(&self, usb: &Core<B>, data_if: u8) -> Result<DataEndpoints> {
        let data = self
            .data_interfaces
            .get(data_if as usize)
            .ok_or(Error::InvalidParameter)?;
        if data.isochronous {
            return Err(Error::NotSupported);
        }
        if self.state != ClassState::Configured || usb.state() != DeviceState::Configured {
            return Err(Error::InvalidState);
        }
        self.active_comm()?
            .data
            .get(data_if as usize)
            .copied()
            .ok_or(Error::InvalidState)
    }

    /// Send a notification on the instance's notification endpoint
    ///
    /// `payload` follows the 8 byte notification header. Only one
    /// notification may wait for the host at a time.
    pub fn notify<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        code: u8,
        value: u16,
        payload: &[u8],
    ) -> Result<()> {
        if !self.notify_enabled {
            return Err(Error::NotSupported);
        }
        if payload.len() > MAX_NOTIFICATION_DATA {
            return Err(Error::InvalidParameter);
        }
        if self.state != ClassState::Configured || usb.state() != DeviceState::Configured {
            return Err(Error::InvalidState);
        }
        let comm = self.active_comm()?;
        let ep = comm.notify_ep.ok_or(Error::NotSupported)?;
        if self.notify_in_flight {
            return Err(Error::NotReady);
        }

        let mut buf = [0; NOTIFICATION_HEADER_SIZE + MAX_NOTIFICATION_DATA];
        buf[0] = 0xA1;
        buf[1] = code;
        buf[2..4].copy_from_slice(&value.to_le_bytes());
        buf[4..6].copy_from_slice(&u16::from(comm.ctrl_if).to_le_bytes());
        buf[6..8].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        let len = NOTIFICATION_HEADER_SIZE + payload.len();
        buf[NOTIFICATION_HEADER_SIZE..len].copy_from_slice(payload);

        usb.write_interrupt_async(ep, &buf[..len], 0, false)?;
        self.notify_in_flight = true;
        trace!("CDC NOTIFY {} LEN {}", code, payload.len());
        Ok(())
    }
}

/// What a subclass sees when the base class calls it
pub struct CdcControl<'a, B: UsbBus> {
    pub usb: &'a mut Core<B>,
    pub instance: &'a mut CdcInstance,
    /// The instance number, as returned by [`Cdc::create_instance`]
    pub class_nbr: u8,
}

impl<B: UsbBus> CdcControl<'_, B> {
    /// Send a notification to the host
    ///
    /// See [`CdcInstance::notify`].
    pub fn notify_host(&mut self, code: u8, value: u16, payload: &[u8]) -> Result<()> {
        self.instance.notify(self.usb, code, value, payload)
    }
}

/// A CDC subclass
///
/// The base class forwards every management request addressed to the
/// control interface. The subclass returns `true` when it claims the
/// request.
pub trait Subclass<B: UsbBus> {
    fn enable(&mut self, ctl: CdcControl<'_, B>) {
        let _ = ctl;
    }

    fn disable(&mut self, ctl: CdcControl<'_, B>) {
        let _ = ctl;
    }

    fn management_request(&mut self, ctl: CdcControl<'_, B>, req: &SetupPacket) -> bool;

    /// A notification sent with [`CdcControl::notify_host`] finished.
    fn notification_complete(&mut self, ctl: CdcControl<'_, B>, status: Result<()>) {
        let _ = (ctl, status);
    }

    /// Write the subclass functional descriptors
    ///
    /// These follow the header and union descriptors. `first_data_if` is the
    /// first data interface of the instance, if it has one.
    fn functional_descriptors(
        &self,
        w: &mut DescriptorWriter,
        class_nbr: u8,
        first_data_if: Option<u8>,
    ) -> Result<()> {
        let _ = (w, class_nbr, first_data_if);
        Ok(())
    }
}

/// The CDC base class driver
///
/// Manages up to `N` instances of one subclass.
pub struct Cdc<S, const N: usize> {
    id: DriverId,
    instances: Vec<CdcInstance, N>,
    subclass: S,
}

impl<S, const N: usize> Cdc<S, N> {
    pub const fn new(id: DriverId, subclass: S) -> Self {
        Cdc {
            id,
            instances: Vec::new(),
            subclass,
        }
    }

    pub fn subclass(&self) -> &S {
        &self.subclass
    }

    pub fn subclass_mut(&mut self) -> &mut S {
        &mut self.subclass
    }

    pub fn instance(&self, class_nbr: u8) -> Result<&CdcInstance> {
        self.instances
            .get(class_nbr as usize)
            .ok_or(Error::InvalidParameter)
    }

    fn instance_mut(&mut self, class_nbr: u8) -> Result<&mut CdcInstance> {
        self.instances
            .get_mut(class_nbr as usize)
            .ok_or(Error::InvalidParameter)
    }

    /// Allocate a CDC instance
    ///
    /// `notify_interval` is the notification endpoint's polling interval in
    /// frames. Returns the class number.
    pub fn create_instance(
        &mut self,
        subclass_code: u8,
        protocol: u8,
        notify_enabled: bool,
        notify_interval: u16,
    ) -> Result<u8> {
        if notify_enabled && notify_interval == 0 {
            return Err(Error::InvalidParameter);
        }
        let class_nbr = self.instances.len() as u8;
        self.instances
            .push(CdcInstance {
                state: ClassState::None,
                subclass_code,
                protocol,
                notify_enabled,
                notify_interval,
                data_interfaces: Vec::new(),
                comms: Vec::new(),
                active: None,
                notify_in_flight: false,
            })
            .map_err(|_| Error::AllocationFailed)?;
        debug!("CDC CREATE {}", class_nbr);
        Ok(class_nbr)
    }

    /// Add a data interface to an instance
    ///
    /// Returns the data interface index within the instance. Data
    /// interfaces can't be added once the instance joined a configuration.
    pub fn add_data_interface(
        &mut self,
        class_nbr: u8,
        isochronous: bool,
        protocol: u8,
    ) -> Result<u8> {
        let instance = self.instance_mut(class_nbr)?;
        if isochronous {
            return Err(Error::NotSupported);
        }
        if instance.state != ClassState::None {
            return Err(Error::InvalidState);
        }
        let data_if = instance.data_interfaces.len() as u8;
        instance
            .data_interfaces
            .push(DataInterface {
                protocol,
                isochronous,
            })
            .map_err(|_| Error::AllocationFailed)?;
        Ok(data_if)
    }

    /// Change the notification interval of an instance that hasn't joined a
    /// configuration
    pub(crate) fn set_notify_interval(&mut self, class_nbr: u8, interval: u16) -> Result<()> {
        let instance = self.instance_mut(class_nbr)?;
        if interval == 0 {
            return Err(Error::InvalidParameter);
        }
        if instance.state != ClassState::None {
            return Err(Error::InvalidState);
        }
        instance.notify_interval = interval;
        Ok(())
    }

    /// Register an instance's interfaces and endpoints in a configuration
    ///
    /// Nothing is registered if the configuration lacks room for the whole
    /// instance.
    pub fn add_to_configuration<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        config_nbr: u8,
    ) -> Result<()> {
        let id = self.id;
        let instance = self.instance_mut(class_nbr)?;
        if instance.comm_for(config_nbr).is_some() || instance.comms.is_full() {
            return Err(Error::InvalidParameter);
        }
        let notify_interval = if instance.notify_enabled {
            let interval = match usb.configuration_speed(config_nbr)? {
                Speed::LowFull => instance.notify_interval,
                Speed::High => instance
                    .notify_interval
                    .checked_mul(8)
                    .ok_or(Error::InvalidParameter)?,
            };
            usb.check_endpoint(
                config_nbr,
                TransferType::Interrupt,
                NOTIFICATION_PACKET_SIZE,
                1,
                interval,
            )?;
            Some(interval)
        } else {
            None
        };
        let data_count = instance.data_interfaces.len();
        usb.check_capacity(
            config_nbr,
            Capacity {
                interfaces: 1 + data_count,
                groups: 1,
                endpoints_in: data_count + notify_interval.is_some() as usize,
                endpoints_out: data_count,
            },
        )?;

        let class = InterfaceClass::new(
            COMMUNICATIONS_CLASS,
            instance.subclass_code,
            instance.protocol,
        );
        let ctrl_if = usb.add_interface(config_nbr, Some(id), class_nbr as usize, 0, class)?;
        let notify_ep = match notify_interval {
            Some(interval) => Some(usb.add_interrupt_endpoint(
                config_nbr,
                ctrl_if,
                0,
                UsbDirection::In,
                NOTIFICATION_PACKET_SIZE,
                interval,
            )?),
            None => None,
        };

        let mut data = Vec::new();
        for data_interface in &instance.data_interfaces {
            let if_nbr = usb.add_interface(
                config_nbr,
                None,
                class_nbr as usize,
                0,
                InterfaceClass::new(DATA_CLASS, 0, data_interface.protocol),
            )?;
            let bulk_in = usb.add_bulk_endpoint(config_nbr, if_nbr, 0, UsbDirection::In, 0)?;
            let bulk_out = usb.add_bulk_endpoint(config_nbr, if_nbr, 0, UsbDirection::Out, 0)?;
            // Capacity matches the data interface list.
            let _ = data.push(DataEndpoints { bulk_in, bulk_out });
        }

        usb.add_interface_group(config_nbr, class, ctrl_if, 1 + data_count as u8)?;

        // Capacity checked above.
        let _ = instance.comms.push(Comm {
            config_nbr,
            ctrl_if,
            first_data_if: ctrl_if + 1,
            notify_ep,
            data,
        });
        instance.state = ClassState::Init;
        debug!("CDC {} CONFIG {} IF {}", class_nbr, config_nbr, ctrl_if);
        Ok(())
    }

    /// Indicates if the host selected a configuration that contains the
    /// instance
    pub fn is_enabled<B: UsbBus>(&self, usb: &Core<B>, class_nbr: u8) -> bool {
        usb.state() == DeviceState::Configured
            && self
                .instance(class_nbr)
                .is_ok_and(|instance| instance.state == ClassState::Configured)
    }

    pub fn data_interface_count(&self, class_nbr: u8) -> Result<u8> {
        Ok(self.instance(class_nbr)?.data_interfaces.len() as u8)
    }

    pub fn notification_enabled(&self, class_nbr: u8) -> Result<bool> {
        Ok(self.instance(class_nbr)?.notify_enabled)
    }

    /// Receive data on a data interface
    ///
    /// Blocks until the host sends a short packet, `buf` is full, or the
    /// timeout elapses. A timeout of 0 waits forever.
    pub fn read_data<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        data_if: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let eps = self.instance(class_nbr)?.data_endpoints(usb, data_if)?;
        usb.read_bulk_sync(eps.bulk_out, buf, timeout_ms)
    }

    /// Send data on a data interface
    ///
    /// Ends the transfer with a zero length packet when needed.
    pub fn write_data<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        data_if: u8,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let eps = self.instance(class_nbr)?.data_endpoints(usb, data_if)?;
        usb.write_bulk_sync(eps.bulk_in, data, timeout_ms, true)
    }

    /// Send a notification to the host
    ///
    /// Fails with [`Error::NotReady`] while the previous notification is in
    /// flight.
    pub fn notify_host<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        code: u8,
        value: u16,
        payload: &[u8],
    ) -> Result<()> {
        self.instance_mut(class_nbr)?
            .notify(usb, code, value, payload)
    }

    /// Split the driver into the subclass and an instance's control context
    fn control<'a, B: UsbBus>(
        &'a mut self,
        usb: &'a mut Core<B>,
        class_arg: usize,
    ) -> Option<(&'a mut S, CdcControl<'a, B>)> {
        let instance = self.instances.get_mut(class_arg)?;
        Some((
            &mut self.subclass,
            CdcControl {
                usb,
                instance,
                class_nbr: class_arg as u8,
            },
        ))
    }
}

impl<B: UsbBus, S: Subclass<B>, const N: usize> ClassDriver<B> for Cdc<S, N> {
    fn id(&self) -> DriverId {
        self.id
    }

    fn enable(&mut self, usb: &mut Core<B>, config_nbr: u8, class_arg: usize) {
        let Some((subclass, ctl)) = self.control(usb, class_arg) else {
            return;
        };
        ctl.instance.active = ctl.instance.comm_for(config_nbr);
        ctl.instance.state = ClassState::Configured;
        ctl.instance.notify_in_flight = false;
        debug!("CDC {} ENABLE", class_arg);
        subclass.enable(ctl);
    }

    fn disable(&mut self, usb: &mut Core<B>, _: u8, class_arg: usize) {
        let Some((subclass, ctl)) = self.control(usb, class_arg) else {
            return;
        };
        ctl.instance.active = None;
        ctl.instance.state = ClassState::Init;
        ctl.instance.notify_in_flight = false;
        debug!("CDC {} DISABLE", class_arg);
        subclass.disable(ctl);
    }

    fn interface_descriptor(
        &self,
        w: &mut DescriptorWriter,
        config_nbr: u8,
        if_nbr: u8,
        _: u8,
        class_arg: usize,
    ) -> Result<()> {
        let Some(instance) = self.instances.get(class_arg) else {
            return Ok(());
        };
        let Some(idx) = instance.comm_for(config_nbr) else {
            return Ok(());
        };
        let comm = &instance.comms[idx];
        if comm.ctrl_if != if_nbr {
            return Ok(());
        }

        let [lo, hi] = CDC_RELEASE.to_le_bytes();
        w.write_descriptor(descriptor_type::CS_INTERFACE, &[functional::HEADER, lo, hi])?;

        let data_count = instance.data_interfaces.len() as u8;
        if data_count > 0 {
            let mut union = [0u8; 2 + MAX_DATA_INTERFACES];
            union[0] = functional::UNION;
            union[1] = comm.ctrl_if;
            let len = 2 + data_count as usize;
            for (idx, slot) in union[2..len].iter_mut().enumerate() {
                *slot = comm.first_data_if + idx as u8;
            }
            w.write_descriptor(descriptor_type::CS_INTERFACE, &union[..len])?;
        }

        let first_data_if = (data_count > 0).then_some(comm.first_data_if);
        self.subclass
            .functional_descriptors(w, class_arg as u8, first_data_if)
    }

    fn class_request(&mut self, usb: &mut Core<B>, req: &SetupPacket, class_arg: usize) -> bool {
        let Some((subclass, ctl)) = self.control(usb, class_arg) else {
            return false;
        };
        let addressed = ctl
            .instance
            .active_comm()
            .is_ok_and(|comm| comm.ctrl_if == req.interface_number());
        if !addressed {
            return false;
        }
        subclass.management_request(ctl, req)
    }

    fn transfer_complete(&mut self, usb: &mut Core<B>, class_arg: usize, xfer: &TransferComplete) {
        let Some((subclass, ctl)) = self.control(usb, class_arg) else {
            return;
        };
        let is_notification = ctl
            .instance
            .comms
            .iter()
            .any(|comm| comm.notify_ep == Some(xfer.endpoint));
        if !is_notification {
            return;
        }
        ctl.instance.notify_in_flight = false;
        subclass.notification_complete(ctl, xfer.status);
    }
}
