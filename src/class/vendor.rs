//! Vendor-specific class
//!
//! Each instance is one vendor-specific interface with a bulk IN / bulk OUT
//! pair, and optionally an interrupt IN / interrupt OUT pair. The class has
//! no protocol of its own: the application handles vendor requests with a
//! [`VendorHandler`], and moves data with the transfer methods.
//!
//! Every instance reports the `WINUSB` compatible ID in the Microsoft OS
//! descriptors, so that Windows binds the WinUSB driver without an INF
//! file. Enable the Microsoft OS descriptors with
//! [`DeviceConfig::ms_os_vendor_code`](crate::DeviceConfig::ms_os_vendor_code).

use heapless::Vec;
use usb_device::{bus::UsbBus, endpoint::EndpointAddress, UsbDirection};

use super::{ClassDriver, ClassState, DriverId, InterfaceClass, TransferComplete};
use crate::{
    control::SetupPacket,
    descriptor::{MsCompatId, MsExtProperty, MsPropertyType},
    usbcore::{Capacity, Core, DeviceState},
    Error, Result, Speed, TransferType, MAX_CONFIGURATIONS,
};

/// Vendor-specific interface class code
pub const VENDOR_CLASS: u8 = 0xFF;

/// Microsoft OS extended properties per instance
pub const MAX_MS_EXT_PROPERTIES: usize = 4;

/// Called when an asynchronous transfer finishes
///
/// Receives the handler, the class number, the transfer buffer, the number
/// of bytes transferred, the argument supplied when the transfer started,
/// and the transfer status.
pub type VendorCallback<H> = fn(&mut H, u8, &[u8], usize, usize, Result<()>);

/// Application side of the vendor class
pub trait VendorHandler<B: UsbBus> {
    /// The host selected a configuration that contains the instance.
    fn enable(&mut self, usb: &mut Core<B>, class_nbr: u8) {
        let _ = (usb, class_nbr);
    }

    fn disable(&mut self, usb: &mut Core<B>, class_nbr: u8) {
        let _ = (usb, class_nbr);
    }

    /// Handle a vendor request addressed to the instance's interface
    ///
    /// Use the control transfer methods of `usb` for the data stage.
    /// Return `false` to stall the request.
    fn setup_request(&mut self, usb: &mut Core<B>, class_nbr: u8, req: &SetupPacket) -> bool {
        let _ = (usb, class_nbr, req);
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pipe {
    BulkIn,
    BulkOut,
    InterruptIn,
    InterruptOut,
}

const PIPES: usize = 4;

struct Pending<H> {
    callback: VendorCallback<H>,
    arg: usize,
}

impl<H> Clone for Pending<H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H> Copy for Pending<H> {}

/// An instance's endpoints in one configuration
#[derive(Debug)]
struct Comm {
    config_nbr: u8,
    bulk_in: EndpointAddress,
    bulk_out: EndpointAddress,
    interrupt_in: Option<EndpointAddress>,
    interrupt_out: Option<EndpointAddress>,
}

impl Comm {
    fn endpoint(&self, pipe: Pipe) -> Option<EndpointAddress> {
        match pipe {
            Pipe::BulkIn => Some(self.bulk_in),
            Pipe::BulkOut => Some(self.bulk_out),
            Pipe::InterruptIn => self.interrupt_in,
            Pipe::InterruptOut => self.interrupt_out,
        }
    }
}

struct VendorInstance<H> {
    state: ClassState,
    interrupt_enabled: bool,
    interval: u16,
    comms: Vec<Comm, MAX_CONFIGURATIONS>,
    active: Option<usize>,
    pending: [Option<Pending<H>>; PIPES],
    properties: Vec<MsExtProperty, MAX_MS_EXT_PROPERTIES>,
}

/// The vendor-specific class driver
///
/// Manages up to `N` instances. `H` handles vendor requests and receives
/// asynchronous transfer completions.
pub struct Vendor<H, const N: usize> {
    id: DriverId,
    handler: H,
    instances: Vec<VendorInstance<H>, N>,
}

impl<H, const N: usize> Vendor<H, N> {
    pub const fn new(id: DriverId, handler: H) -> Self {
        Vendor {
            id,
            handler,
            instances: Vec::new(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    fn instance(&self, class_nbr: u8) -> Result<&VendorInstance<H>> {
        self.instances
            .get(class_nbr as usize)
            .ok_or(Error::InvalidParameter)
    }

    fn instance_mut(&mut self, class_nbr: u8) -> Result<&mut VendorInstance<H>> {
        self.instances
            .get_mut(class_nbr as usize)
            .ok_or(Error::InvalidParameter)
    }

    /// Allocate a vendor instance
    ///
    /// With `interrupt_enabled`, the instance also has an interrupt pipe
    /// pair, polled every `interval` frames. Returns the class number.
    pub fn create_instance(&mut self, interrupt_enabled: bool, interval: u16) -> Result<u8> {
        if interrupt_enabled && interval == 0 {
            return Err(Error::InvalidParameter);
        }
        let class_nbr = self.instances.len() as u8;
        self.instances
            .push(VendorInstance {
                state: ClassState::None,
                interrupt_enabled,
                interval,
                comms: Vec::new(),
                active: None,
                pending: [None; PIPES],
                properties: Vec::new(),
            })
            .map_err(|_| Error::AllocationFailed)?;
        debug!("VENDOR CREATE {}", class_nbr);
        Ok(class_nbr)
    }

    /// Register an instance's interface and endpoints in a configuration
    ///
    /// Nothing is registered if the configuration lacks room for the
    /// instance.
    pub fn add_to_configuration<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        config_nbr: u8,
    ) -> Result<()> {
        let id = self.id;
        let instance = self.instance_mut(class_nbr)?;
        let known = instance
            .comms
            .iter()
            .any(|comm| comm.config_nbr == config_nbr);
        if known || instance.comms.is_full() {
            return Err(Error::InvalidParameter);
        }
        let interval = if instance.interrupt_enabled {
            let interval = match usb.configuration_speed(config_nbr)? {
                Speed::LowFull => instance.interval,
                Speed::High => instance
                    .interval
                    .checked_mul(8)
                    .ok_or(Error::InvalidParameter)?,
            };
            usb.check_endpoint(config_nbr, TransferType::Interrupt, 0, 1, interval)?;
            Some(interval)
        } else {
            None
        };
        let pipes = 1 + interval.is_some() as usize;
        usb.check_capacity(
            config_nbr,
            Capacity {
                interfaces: 1,
                groups: 0,
                endpoints_in: pipes,
                endpoints_out: pipes,
            },
        )?;

        let class = InterfaceClass::new(VENDOR_CLASS, 0, 0);
        let if_nbr = usb.add_interface(config_nbr, Some(id), class_nbr as usize, 0, class)?;
        let bulk_in = usb.add_bulk_endpoint(config_nbr, if_nbr, 0, UsbDirection::In, 0)?;
        let bulk_out = usb.add_bulk_endpoint(config_nbr, if_nbr, 0, UsbDirection::Out, 0)?;
        let (interrupt_in, interrupt_out) = match interval {
            Some(interval) => {
                let ep_in = usb.add_interrupt_endpoint(
                    config_nbr,
                    if_nbr,
                    0,
                    UsbDirection::In,
                    0,
                    interval,
                )?;
                let ep_out = usb.add_interrupt_endpoint(
                    config_nbr,
                    if_nbr,
                    0,
                    UsbDirection::Out,
                    0,
                    interval,
                )?;
                (Some(ep_in), Some(ep_out))
            }
            None => (None, None),
        };

        // Capacity checked above.
        let _ = instance.comms.push(Comm {
            config_nbr,
            bulk_in,
            bulk_out,
            interrupt_in,
            interrupt_out,
        });
        instance.state = ClassState::Init;
        debug!("VENDOR {} CONFIG {} IF {}", class_nbr, config_nbr, if_nbr);
        Ok(())
    }

    /// Add a Microsoft OS extended property to an instance
    pub fn add_ms_ext_property(
        &mut self,
        class_nbr: u8,
        property_type: MsPropertyType,
        name: &'static str,
        data: &'static [u8],
    ) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidParameter);
        }
        self.instance_mut(class_nbr)?
            .properties
            .push(MsExtProperty {
                property_type,
                name,
                data,
            })
            .map_err(|_| Error::AllocationFailed)
    }

    /// Indicates if the host selected a configuration that contains the
    /// instance
    pub fn is_enabled<B: UsbBus>(&self, usb: &Core<B>, class_nbr: u8) -> bool {
        usb.state() == DeviceState::Configured
            && self
                .instance(class_nbr)
                .is_ok_and(|instance| instance.state == ClassState::Configured)
    }

    fn endpoint<B: UsbBus>(
        &self,
        usb: &Core<B>,
        class_nbr: u8,
        pipe: Pipe,
    ) -> Result<EndpointAddress> {
        let instance = self.instance(class_nbr)?;
        if matches!(pipe, Pipe::InterruptIn | Pipe::InterruptOut) && !instance.interrupt_enabled {
            return Err(Error::NotSupported);
        }
        if !self.is_enabled(usb, class_nbr) {
            return Err(Error::InvalidState);
        }
        instance
            .active
            .and_then(|idx| instance.comms.get(idx))
            .and_then(|comm| comm.endpoint(pipe))
            .ok_or(Error::InvalidState)
    }

    /// Start an asynchronous transfer on a pipe without one in flight
    fn start<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        pipe: Pipe,
        callback: VendorCallback<H>,
        arg: usize,
        transfer: impl FnOnce(&mut Core<B>, EndpointAddress, usize) -> Result<()>,
    ) -> Result<()> {
        let ep = self.endpoint(usb, class_nbr, pipe)?;
        let slot = &mut self.instances[class_nbr as usize].pending[pipe as usize];
        if slot.is_some() {
            return Err(Error::NotReady);
        }
        transfer(usb, ep, pipe as usize)?;
        *slot = Some(Pending { callback, arg });
        Ok(())
    }

    /// Receive on the bulk OUT pipe
    ///
    /// Blocks until the host sends a short packet, `buf` is full, or the
    /// timeout elapses. A timeout of 0 waits forever.
    pub fn read_bulk_sync<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let ep = self.endpoint(usb, class_nbr, Pipe::BulkOut)?;
        usb.read_bulk_sync(ep, buf, timeout_ms)
    }

    /// Send on the bulk IN pipe
    ///
    /// With `end`, a zero length packet follows data that fills the last
    /// packet.
    pub fn write_bulk_sync<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        data: &[u8],
        timeout_ms: u32,
        end: bool,
    ) -> Result<usize> {
        let ep = self.endpoint(usb, class_nbr, Pipe::BulkIn)?;
        usb.write_bulk_sync(ep, data, timeout_ms, end)
    }

    /// Receive up to `len` bytes on the bulk OUT pipe, then call `callback`
    pub fn read_bulk_async<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        len: usize,
        callback: VendorCallback<H>,
        arg: usize,
    ) -> Result<()> {
        self.start(usb, class_nbr, Pipe::BulkOut, callback, arg, |usb, ep, pipe| {
            usb.read_bulk_async(ep, len, pipe)
        })
    }

    /// Send `data` on the bulk IN pipe, then call `callback`
    pub fn write_bulk_async<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        data: &[u8],
        callback: VendorCallback<H>,
        arg: usize,
        end: bool,
    ) -> Result<()> {
        self.start(usb, class_nbr, Pipe::BulkIn, callback, arg, |usb, ep, pipe| {
            usb.write_bulk_async(ep, data, pipe, end)
        })
    }

    pub fn read_interrupt_sync<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let ep = self.endpoint(usb, class_nbr, Pipe::InterruptOut)?;
        usb.read_interrupt_sync(ep, buf, timeout_ms)
    }

    pub fn write_interrupt_sync<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        data: &[u8],
        timeout_ms: u32,
        end: bool,
    ) -> Result<usize> {
        let ep = self.endpoint(usb, class_nbr, Pipe::InterruptIn)?;
        usb.write_interrupt_sync(ep, data, timeout_ms, end)
    }

    pub fn read_interrupt_async<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        len: usize,
        callback: VendorCallback<H>,
        arg: usize,
    ) -> Result<()> {
        self.start(usb, class_nbr, Pipe::InterruptOut, callback, arg, |usb, ep, pipe| {
            usb.read_interrupt_async(ep, len, pipe)
        })
    }

    pub fn write_interrupt_async<B: UsbBus>(
        &mut self,
        usb: &mut Core<B>,
        class_nbr: u8,
        data: &[u8],
        callback: VendorCallback<H>,
        arg: usize,
        end: bool,
    ) -> Result<()> {
        self.start(usb, class_nbr, Pipe::InterruptIn, callback, arg, |usb, ep, pipe| {
            usb.write_interrupt_async(ep, data, pipe, end)
        })
    }
}

impl<B: UsbBus, H: VendorHandler<B>, const N: usize> ClassDriver<B> for Vendor<H, N> {
    fn id(&self) -> DriverId {
        self.id
    }

    fn enable(&mut self, usb: &mut Core<B>, config_nbr: u8, class_arg: usize) {
        let Some(instance) = self.instances.get_mut(class_arg) else {
            return;
        };
        instance.active = instance
            .comms
            .iter()
            .position(|comm| comm.config_nbr == config_nbr);
        instance.state = ClassState::Configured;
        instance.pending = [None; PIPES];
        debug!("VENDOR {} ENABLE", class_arg);
        self.handler.enable(usb, class_arg as u8);
    }

    fn disable(&mut self, usb: &mut Core<B>, _: u8, class_arg: usize) {
        let Some(instance) = self.instances.get_mut(class_arg) else {
            return;
        };
        instance.active = None;
        instance.state = ClassState::Init;
        debug!("VENDOR {} DISABLE", class_arg);
        self.handler.disable(usb, class_arg as u8);
    }

    fn vendor_request(&mut self, usb: &mut Core<B>, req: &SetupPacket, class_arg: usize) -> bool {
        if class_arg >= self.instances.len() {
            return false;
        }
        self.handler.setup_request(usb, class_arg as u8, req)
    }

    fn transfer_complete(&mut self, _: &mut Core<B>, class_arg: usize, xfer: &TransferComplete) {
        let pending = self
            .instances
            .get_mut(class_arg)
            .and_then(|instance| instance.pending.get_mut(xfer.arg))
            .and_then(Option::take);
        let Some(pending) = pending else {
            trace!("VENDOR {} UNEXPECTED COMPLETION", class_arg);
            return;
        };
        (pending.callback)(
            &mut self.handler,
            class_arg as u8,
            &xfer.buf[..xfer.transferred],
            xfer.transferred,
            pending.arg,
            xfer.status,
        );
    }

    fn ms_compat_id(&self, _: usize) -> Option<MsCompatId> {
        Some(MsCompatId::WINUSB)
    }

    fn ms_ext_properties(&self, class_arg: usize) -> &[MsExtProperty] {
        self.instances
            .get(class_arg)
            .map(|instance| instance.properties.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::{vec, vec::Vec as StdVec};

    use super::*;
    use crate::{
        mock::{self, control, enumerate, poll_all, stalled, MockBus},
        ConfigAttributes, DeviceConfig,
    };

    const VENDOR_CODE: u8 = 0x20;
    const GET_CONFIGURATION_DESCRIPTOR: [u8; 8] = [0x80, 0x06, 0, 2, 0, 0, 0xFF, 0];

    const GUID: &[u8] = &[b'{', 0, b'}', 0, 0, 0];

    #[derive(Debug, PartialEq)]
    struct Completion {
        class_nbr: u8,
        data: StdVec<u8>,
        len: usize,
        arg: usize,
        status: Result<()>,
    }

    #[derive(Default)]
    struct App {
        enabled: StdVec<u8>,
        disabled: StdVec<u8>,
        requests: StdVec<u8>,
        completions: StdVec<Completion>,
    }

    impl VendorHandler<MockBus> for App {
        fn enable(&mut self, _: &mut Core<MockBus>, class_nbr: u8) {
            self.enabled.push(class_nbr);
        }

        fn disable(&mut self, _: &mut Core<MockBus>, class_nbr: u8) {
            self.disabled.push(class_nbr);
        }

        fn setup_request(&mut self, usb: &mut Core<MockBus>, _: u8, req: &SetupPacket) -> bool {
            self.requests.push(req.request);
            match req.request {
                0x10 => usb.write_control_sync(b"ok", 100, true).is_ok(),
                0x11 => true,
                _ => false,
            }
        }
    }

    fn record(
        app: &mut App,
        class_nbr: u8,
        buf: &[u8],
        len: usize,
        arg: usize,
        status: Result<()>,
    ) {
        app.completions.push(Completion {
            class_nbr,
            data: buf.to_vec(),
            len,
            arg,
            status,
        });
    }

    type Driver = Vendor<App, 2>;

    fn request(usb: &mut Core<MockBus>, vendor: &mut Driver, setup: [u8; 8]) -> StdVec<u8> {
        control(usb, &mut [vendor], setup, &[])
    }

    fn setup(interrupt: bool) -> (Core<MockBus>, Driver, u8) {
        let config = DeviceConfig::new(0x1209, 0x0002)
            .speed(Speed::LowFull)
            .ms_os_vendor_code(VENDOR_CODE);
        let mut usb = Core::new(MockBus::new(), config, mock::clock).unwrap();
        let config = usb
            .add_configuration(ConfigAttributes::empty(), 100, Speed::LowFull)
            .unwrap();
        let mut vendor = Driver::new(DriverId(7), App::default());
        let nbr = vendor.create_instance(interrupt, 4).unwrap();
        vendor.add_to_configuration(&mut usb, nbr, config).unwrap();
        usb.start().unwrap();
        (usb, vendor, nbr)
    }

    #[test]
    fn interface_and_endpoints() {
        let (mut usb, mut vendor, _) = setup(true);
        let desc = request(&mut usb, &mut vendor, GET_CONFIGURATION_DESCRIPTOR);
        assert_eq!(&desc[9..18], &[9, 0x04, 0, 0, 4, 0xFF, 0, 0, 0]);
        // Bulk IN, bulk OUT, interrupt IN, interrupt OUT
        assert_eq!(&desc[18..21], &[7, 0x05, 0x81]);
        assert_eq!(&desc[25..28], &[7, 0x05, 0x01]);
        assert_eq!(&desc[32..35], &[7, 0x05, 0x82]);
        assert_eq!(&desc[39..42], &[7, 0x05, 0x02]);
        assert_eq!(desc[38], 4);
        assert_eq!(desc.len(), 46);
    }

    #[test]
    fn instance_parameters() {
        let mut vendor = Driver::new(DriverId(7), App::default());
        assert_eq!(
            vendor.create_instance(true, 0),
            Err(Error::InvalidParameter)
        );
        assert_eq!(vendor.create_instance(false, 0), Ok(0));
        assert_eq!(vendor.create_instance(true, 1), Ok(1));
        assert_eq!(
            vendor.create_instance(false, 0),
            Err(Error::AllocationFailed)
        );
    }

    #[test]
    fn rejected_interval_registers_nothing() {
        let config = DeviceConfig::new(0x1209, 0x0002).speed(Speed::High);
        let mut usb = Core::new(MockBus::new(), config, mock::clock).unwrap();
        let config = usb
            .add_configuration(ConfigAttributes::empty(), 100, Speed::High)
            .unwrap();
        let mut vendor = Driver::new(DriverId(7), App::default());

        // 24 microframes isn't a power of two.
        let nbr = vendor.create_instance(true, 3).unwrap();
        assert_eq!(
            vendor.add_to_configuration(&mut usb, nbr, config),
            Err(Error::InvalidParameter)
        );
        assert_eq!(usb.bus().allocations().len(), 2);

        let nbr = vendor.create_instance(true, 4).unwrap();
        vendor.add_to_configuration(&mut usb, nbr, config).unwrap();
        let allocs = usb.bus().allocations();
        assert_eq!(allocs.len(), 6);
        assert_eq!(
            allocs[2].addr,
            EndpointAddress::from_parts(1, UsbDirection::In)
        );
    }

    #[test]
    fn transfers_need_configuration() {
        let (mut usb, mut vendor, nbr) = setup(false);
        let mut buf = [0; 8];
        assert!(!vendor.is_enabled(&usb, nbr));
        assert_eq!(
            vendor.write_bulk_sync(&mut usb, nbr, b"x", 10, true),
            Err(Error::InvalidState)
        );
        assert_eq!(
            vendor.read_bulk_async(&mut usb, nbr, 8, record, 0),
            Err(Error::InvalidState)
        );
        assert_eq!(
            vendor.read_bulk_sync(&mut usb, nbr + 1, &mut buf, 10),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            vendor.read_interrupt_sync(&mut usb, nbr, &mut buf, 10),
            Err(Error::NotSupported)
        );

        enumerate(&mut usb, &mut [&mut vendor], 1);
        assert!(vendor.is_enabled(&usb, nbr));
        assert_eq!(vendor.handler().enabled, [nbr]);
        assert_eq!(
            vendor.write_interrupt_async(&mut usb, nbr, b"x", record, 0, false),
            Err(Error::NotSupported)
        );
    }

    #[test]
    fn sync_bulk() {
        let (mut usb, mut vendor, nbr) = setup(false);
        enumerate(&mut usb, &mut [&mut vendor], 1);

        let data = [0xA5; 64];
        assert_eq!(
            vendor.write_bulk_sync(&mut usb, nbr, &data, 100, true),
            Ok(64)
        );
        assert_eq!(usb.bus().take_written(1), [data.to_vec(), vec![]]);

        usb.bus().push_out(1, b"pong");
        let mut buf = [0; 64];
        assert_eq!(vendor.read_bulk_sync(&mut usb, nbr, &mut buf, 100), Ok(4));
        assert_eq!(&buf[..4], b"pong");
    }

    #[test]
    fn one_async_transfer_per_pipe() {
        let (mut usb, mut vendor, nbr) = setup(false);
        enumerate(&mut usb, &mut [&mut vendor], 1);

        vendor
            .write_bulk_async(&mut usb, nbr, b"hello", record, 7, true)
            .unwrap();
        assert_eq!(
            vendor.write_bulk_async(&mut usb, nbr, b"again", record, 8, true),
            Err(Error::NotReady)
        );
        // The OUT pipe is independent.
        vendor
            .read_bulk_async(&mut usb, nbr, 64, record, 9)
            .unwrap();

        usb.bus().push_out(1, b"ping");
        poll_all(&mut usb, &mut [&mut vendor]);
        assert_eq!(usb.bus().take_written(1), [b"hello".to_vec()]);

        let completions = &vendor.handler().completions;
        assert_eq!(completions.len(), 2);
        assert!(completions.contains(&Completion {
            class_nbr: nbr,
            data: b"hello".to_vec(),
            len: 5,
            arg: 7,
            status: Ok(()),
        }));
        assert!(completions.contains(&Completion {
            class_nbr: nbr,
            data: b"ping".to_vec(),
            len: 4,
            arg: 9,
            status: Ok(()),
        }));

        vendor
            .write_bulk_async(&mut usb, nbr, b"again", record, 8, true)
            .unwrap();
    }

    #[test]
    fn interrupt_pipes() {
        let (mut usb, mut vendor, nbr) = setup(true);
        enumerate(&mut usb, &mut [&mut vendor], 1);

        vendor
            .write_interrupt_async(&mut usb, nbr, &[1, 2, 3], record, 1, false)
            .unwrap();
        poll_all(&mut usb, &mut [&mut vendor]);
        assert_eq!(usb.bus().take_written(2), [vec![1, 2, 3]]);
        assert_eq!(vendor.handler().completions[0].arg, 1);

        assert_eq!(
            vendor.write_interrupt_sync(&mut usb, nbr, &[4], 100, false),
            Ok(1)
        );
        usb.bus().push_out(2, &[5, 6]);
        let mut buf = [0; 8];
        assert_eq!(
            vendor.read_interrupt_sync(&mut usb, nbr, &mut buf, 100),
            Ok(2)
        );
        assert_eq!(&buf[..2], &[5, 6]);
    }

    #[test]
    fn reset_aborts_async_transfers() {
        let (mut usb, mut vendor, nbr) = setup(false);
        enumerate(&mut usb, &mut [&mut vendor], 1);
        usb.bus().hold_in(1, true);
        vendor
            .write_bulk_async(&mut usb, nbr, b"stuck", record, 3, true)
            .unwrap();

        usb.bus().bus_reset();
        poll_all(&mut usb, &mut [&mut vendor]);
        let completion = &vendor.handler().completions[0];
        assert_eq!(completion.status, Err(Error::Aborted));
        assert_eq!(completion.arg, 3);
        assert_eq!(vendor.handler().disabled, [nbr]);
        assert!(!vendor.is_enabled(&usb, nbr));
    }

    #[test]
    fn vendor_requests() {
        let (mut usb, mut vendor, _) = setup(false);
        enumerate(&mut usb, &mut [&mut vendor], 1);

        let data = request(&mut usb, &mut vendor, [0xC1, 0x10, 0, 0, 0, 0, 8, 0]);
        assert_eq!(data, b"ok");
        request(&mut usb, &mut vendor, [0x41, 0x11, 0, 0, 0, 0, 0, 0]);
        assert!(!stalled(&usb));
        request(&mut usb, &mut vendor, [0x41, 0x12, 0, 0, 0, 0, 0, 0]);
        assert!(stalled(&usb));
        assert_eq!(vendor.handler().requests, [0x10, 0x11, 0x12]);
    }

    #[test]
    fn microsoft_os_descriptors() {
        let (mut usb, mut vendor, nbr) = setup(false);
        vendor
            .add_ms_ext_property(nbr, MsPropertyType::Sz, "DeviceInterfaceGUID", GUID)
            .unwrap();

        let get_compat_id = [0xC0, VENDOR_CODE, 0, 0, 4, 0, 0xFF, 0];
        let compat = request(&mut usb, &mut vendor, get_compat_id);
        assert_eq!(compat.len(), 40);
        assert_eq!(compat[16], 0);
        assert_eq!(&compat[18..26], b"WINUSB\0\0");

        let get_properties = [0xC1, VENDOR_CODE, 0, 0, 5, 0, 0xFF, 0];
        let props = request(&mut usb, &mut vendor, get_properties);
        assert_eq!(&props[8..10], &[1, 0]);
        assert_eq!(&props[14..18], &1u32.to_le_bytes());
        assert_eq!(&props[20..24], &[b'D', 0, b'e', 0]);
    }

    #[test]
    fn ext_properties_are_capped() {
        let mut vendor = Driver::new(DriverId(7), App::default());
        let nbr = vendor.create_instance(false, 0).unwrap();
        let dword = MsPropertyType::DwordLittleEndian;
        for _ in 0..MAX_MS_EXT_PROPERTIES {
            vendor
                .add_ms_ext_property(nbr, dword, "Value", &[1, 0, 0, 0])
                .unwrap();
        }
        assert_eq!(
            vendor.add_ms_ext_property(nbr, dword, "Value", &[1, 0, 0, 0]),
            Err(Error::AllocationFailed)
        );
        assert_eq!(
            vendor.add_ms_ext_property(nbr, MsPropertyType::Sz, "", GUID),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            vendor.add_ms_ext_property(nbr + 1, MsPropertyType::Sz, "Name", GUID),
            Err(Error::InvalidParameter)
        );
        let properties = ClassDriver::<MockBus>::ms_ext_properties(&vendor, 0);
        assert_eq!(properties.len(), MAX_MS_EXT_PROPERTIES);
    }
}
