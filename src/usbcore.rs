//! USB device core
//!
//! The [`Core`] owns the `usb-device` bus, the device state machine, and the
//! configuration / interface / endpoint object graph. Classes register their
//! interfaces and endpoints before the device starts. Once started, the
//! application calls [`poll()`](Core::poll) with every class driver; the core
//! processes bus events, answers standard requests, dispatches class and
//! vendor requests to the owning [`ClassDriver`], and completes
//! asynchronous transfers.
//!
//! # Design
//!
//! The bus only knows about packets. The core builds transfers on top of
//! packets:
//!
//! - synchronous transfers poll the bus until the transfer finishes, or
//!   until the timeout elapses. Bus events that concern other endpoints are
//!   kept, and processed by the next `poll()` call. Never call a synchronous
//!   transfer from an interrupt handler that also polls the core.
//! - asynchronous transfers are copied into a per-endpoint buffer, and
//!   advanced by `poll()`. `poll()` reports the completion to the driver that
//!   owns the endpoint.
//!
//! Each endpoint has at most one transfer in flight. Requests for a busy
//! endpoint fail with [`Error::NotReady`].

mod allocator;
mod endpoint;
mod graph;
mod standard;

pub use endpoint::TransferType;
pub use graph::ConfigAttributes;

use heapless::Vec;
use usb_device::{
    bus::{PollResult, UsbBus},
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

use crate::{
    class::{ClassDriver, DriverId, InterfaceClass},
    control::{Recipient, RequestKind, SetupPacket},
    descriptor::{MS_OS_COMPAT_ID_INDEX, MS_OS_EXT_PROPERTIES_INDEX},
    Clock, DeviceConfig, Error, Result, Speed, MAX_CONFIGURATIONS, MAX_ENDPOINTS, MAX_INTERFACES,
    MAX_INTERFACE_GROUPS,
};
use allocator::{index, AddressAllocator, ENDPOINT_NUMBERS};
use endpoint::{EndpointInfo, EndpointSlot, Owner};
use graph::{AltSetting, Configuration, Interface, InterfaceGroup};

/// Timeout for data stages that the core answers itself
const CONTROL_TIMEOUT_MS: u32 = 500;

/// USB device states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum DeviceState {
    /// The device isn't started. Configurations can still be added.
    Init,
    /// Started and attached, but without an address.
    Default,
    /// The host assigned an address.
    Addressed,
    /// The host selected a configuration.
    Configured,
    /// The bus is suspended.
    Suspended,
}

/// What a class is about to add to a configuration
///
/// See [`Core::check_capacity`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capacity {
    pub interfaces: usize,
    pub groups: usize,
    pub endpoints_in: usize,
    pub endpoints_out: usize,
}

/// Bus events collected from `UsbBus::poll()` that haven't been handled yet
#[derive(Debug, Default)]
struct Events {
    out: u16,
    in_complete: u16,
    setup: u16,
    reset: bool,
    suspend: bool,
    resume: bool,
}

/// The control transfer being handled
#[derive(Debug)]
struct ControlRequest {
    setup: SetupPacket,
    /// The driver handling the request, if any
    owner: Option<Owner>,
    /// Bytes moved in the data stage so far
    transferred: usize,
}

/// Where an interface lives in the object graph
#[derive(Clone, Copy, Debug)]
struct InterfaceRef {
    config: u8,
    interface: u8,
    driver: Option<DriverId>,
    class_arg: usize,
}

/// Looks up a driver among the drivers supplied to `poll()`
fn find_driver<'d, 'c, B: UsbBus>(
    drivers: &'d mut [&'c mut dyn ClassDriver<B>],
    id: DriverId,
) -> Option<&'d mut (dyn ClassDriver<B> + 'c)> {
    drivers
        .iter_mut()
        .find(|driver| driver.id() == id)
        .map(|driver| &mut **driver)
}

/// Immutable version of [`find_driver`]
fn find_driver_ref<'d, 'c, B: UsbBus>(
    drivers: &'d [&'c mut dyn ClassDriver<B>],
    id: DriverId,
) -> Option<&'d (dyn ClassDriver<B> + 'c)> {
    drivers
        .iter()
        .find(|driver| driver.id() == id)
        .map(|driver| &**driver)
}

/// The USB device core
pub struct Core<B: UsbBus> {
    bus: B,
    config: DeviceConfig,
    clock: Clock,
    state: DeviceState,
    /// State to restore when the bus resumes
    pre_suspend: DeviceState,
    address: u8,
    /// Address to apply once the SET_ADDRESS status stage completes
    pending_address: Option<u8>,
    active_config: Option<u8>,
    remote_wakeup: bool,
    configurations: Vec<Configuration, MAX_CONFIGURATIONS>,
    addresses: AddressAllocator,
    endpoints: [EndpointSlot; MAX_ENDPOINTS],
    events: Events,
    control: Option<ControlRequest>,
}

impl<B: UsbBus> Core<B> {
    /// Create a device core that uses `bus`
    ///
    /// Allocates the control endpoints from the bus. `clock` times out
    /// synchronous transfers.
    pub fn new(mut bus: B, config: DeviceConfig, clock: Clock) -> Result<Self> {
        config.validate()?;
        let mut addresses = AddressAllocator::new();
        let mut endpoints: [EndpointSlot; MAX_ENDPOINTS] =
            core::array::from_fn(|_| EndpointSlot::default());

        for dir in [UsbDirection::Out, UsbDirection::In] {
            let addr = EndpointAddress::from_parts(0, dir);
            bus.alloc_ep(
                dir,
                Some(addr),
                EndpointType::Control,
                config.max_packet_size_0.into(),
                0,
            )?;
            addresses.reserve(0, dir);
            endpoints[index(addr)].info = Some(EndpointInfo {
                kind: TransferType::Control,
                max_packet_size: config.max_packet_size_0.into(),
                transactions: 1,
                interval: 0,
                config: 0,
                interface: 0,
                alt: 0,
            });
        }

        Ok(Core {
            bus,
            config,
            clock,
            state: DeviceState::Init,
            pre_suspend: DeviceState::Init,
            address: 0,
            pending_address: None,
            active_config: None,
            remote_wakeup: false,
            configurations: Vec::new(),
            addresses,
            endpoints,
            events: Events::default(),
            control: None,
        })
    }

    /// Access the USB bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The device speed
    pub fn speed(&self) -> Speed {
        self.config.speed
    }

    /// The address assigned by the host; 0 if none.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The active configuration number, if the device is configured
    pub fn active_configuration(&self) -> Option<u8> {
        self.active_config
    }

    /// Indicates if the host enabled remote wakeup
    pub fn remote_wakeup_enabled(&self) -> bool {
        self.remote_wakeup
    }

    pub fn configuration_count(&self) -> usize {
        self.configurations.len()
    }

    /// The speed of configuration `config_nbr`
    pub fn configuration_speed(&self, config_nbr: u8) -> Result<Speed> {
        self.configurations
            .get(config_nbr as usize)
            .map(|config| config.speed)
            .ok_or(Error::InvalidParameter)
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.state == DeviceState::Init {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    fn configuration_mut(&mut self, config_nbr: u8) -> Result<&mut Configuration> {
        self.configurations
            .get_mut(config_nbr as usize)
            .ok_or(Error::InvalidParameter)
    }

    /// Add a configuration
    ///
    /// Returns the configuration number. The host selects the configuration
    /// with value `config_nbr + 1`.
    pub fn add_configuration(
        &mut self,
        attributes: ConfigAttributes,
        max_power_ma: u16,
        speed: Speed,
    ) -> Result<u8> {
        self.ensure_not_started()?;
        if max_power_ma > 500 || (speed == Speed::High && self.config.speed == Speed::LowFull) {
            return Err(Error::InvalidParameter);
        }
        let config_nbr = self.configurations.len() as u8;
        self.configurations
            .push(Configuration::new(attributes, max_power_ma, speed))
            .map_err(|_| Error::AllocationFailed)?;
        debug!("ADD CONFIG {}", config_nbr);
        Ok(config_nbr)
    }

    /// Add an interface to a configuration
    ///
    /// `driver` handles the interface's requests; `None` means that nothing
    /// handles them. The driver receives `class_arg` in all of its callbacks,
    /// and `alt_arg` when the host selects the default alternate setting.
    ///
    /// Returns the interface number.
    pub fn add_interface(
        &mut self,
        config_nbr: u8,
        driver: Option<DriverId>,
        class_arg: usize,
        alt_arg: usize,
        class: InterfaceClass,
    ) -> Result<u8> {
        self.ensure_not_started()?;
        let config = self.configuration_mut(config_nbr)?;
        let if_nbr = config.interfaces.len() as u8;
        let mut alts = Vec::new();
        alts.push(AltSetting {
            class,
            alt_arg,
            endpoints: Vec::new(),
        })
        .map_err(|_| Error::AllocationFailed)?;
        config
            .interfaces
            .push(Interface {
                driver,
                class_arg,
                alts,
                active_alt: 0,
            })
            .map_err(|_| Error::AllocationFailed)?;
        debug!("ADD IF {} CONFIG {}", if_nbr, config_nbr);
        Ok(if_nbr)
    }

    /// Add an alternate setting to an interface
    ///
    /// The alternate setting shares the interface's class codes. Returns the
    /// alternate setting number.
    pub fn add_alt_interface(&mut self, config_nbr: u8, if_nbr: u8, alt_arg: usize) -> Result<u8> {
        self.ensure_not_started()?;
        let config = self.configuration_mut(config_nbr)?;
        let interface = config
            .interfaces
            .get_mut(if_nbr as usize)
            .ok_or(Error::InvalidParameter)?;
        let class = interface.alts[0].class;
        let alt_nbr = interface.alts.len() as u8;
        interface
            .alts
            .push(AltSetting {
                class,
                alt_arg,
                endpoints: Vec::new(),
            })
            .map_err(|_| Error::AllocationFailed)?;
        Ok(alt_nbr)
    }

    /// Group `count` consecutive interfaces, starting at `first_if`, into one
    /// function with an interface association descriptor
    pub fn add_interface_group(
        &mut self,
        config_nbr: u8,
        class: InterfaceClass,
        first_if: u8,
        count: u8,
    ) -> Result<u8> {
        self.ensure_not_started()?;
        let config = self.configuration_mut(config_nbr)?;
        let last = first_if as usize + count as usize;
        if count == 0 || last > config.interfaces.len() {
            return Err(Error::InvalidParameter);
        }
        if (first_if..first_if + count).any(|if_nbr| config.is_grouped(if_nbr)) {
            return Err(Error::InvalidParameter);
        }
        let group_nbr = config.groups.len() as u8;
        config
            .groups
            .push(InterfaceGroup {
                class,
                first: first_if,
                count,
            })
            .map_err(|_| Error::AllocationFailed)?;
        Ok(group_nbr)
    }

    /// Add a bulk endpoint to an interface's alternate setting
    ///
    /// A `max_packet_size` of 0 selects the largest size allowed for the
    /// configuration's speed.
    pub fn add_bulk_endpoint(
        &mut self,
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u8,
        dir: UsbDirection,
        max_packet_size: u16,
    ) -> Result<EndpointAddress> {
        self.add_endpoint(
            config_nbr,
            if_nbr,
            alt_nbr,
            dir,
            TransferType::Bulk,
            max_packet_size,
            1,
            0,
        )
    }

    /// Add an interrupt endpoint to an interface's alternate setting
    ///
    /// `interval` is in frames (full speed) or microframes (high speed).
    /// High speed intervals must be a power of two.
    pub fn add_interrupt_endpoint(
        &mut self,
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u8,
        dir: UsbDirection,
        max_packet_size: u16,
        interval: u16,
    ) -> Result<EndpointAddress> {
        self.add_endpoint(
            config_nbr,
            if_nbr,
            alt_nbr,
            dir,
            TransferType::Interrupt,
            max_packet_size,
            1,
            interval,
        )
    }

    /// Add an isochronous endpoint to an interface's alternate setting
    ///
    /// `transactions_per_frame` (1 to 3) is only meaningful for high speed
    /// configurations. `interval` must be a power of two.
    #[allow(clippy::too_many_arguments)]
    pub fn add_isochronous_endpoint(
        &mut self,
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u8,
        dir: UsbDirection,
        max_packet_size: u16,
        transactions_per_frame: u8,
        interval: u16,
    ) -> Result<EndpointAddress> {
        self.add_endpoint(
            config_nbr,
            if_nbr,
            alt_nbr,
            dir,
            TransferType::Isochronous,
            max_packet_size,
            transactions_per_frame,
            interval,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn add_endpoint(
        &mut self,
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u8,
        dir: UsbDirection,
        kind: TransferType,
        max_packet_size: u16,
        transactions: u8,
        interval: u16,
    ) -> Result<EndpointAddress> {
        self.ensure_not_started()?;
        let speed = self
            .configurations
            .get(config_nbr as usize)
            .ok_or(Error::InvalidParameter)?
            .speed;
        let max_packet_size =
            endpoint::validate(kind, speed, max_packet_size, transactions, interval)?;

        {
            let alt = self
                .configuration_mut(config_nbr)?
                .interfaces
                .get(if_nbr as usize)
                .and_then(|interface| interface.alts.get(alt_nbr as usize))
                .ok_or(Error::InvalidParameter)?;
            if alt.endpoints.is_full() {
                return Err(Error::AllocationFailed);
            }
        }

        let addr = self.addresses.allocate(dir)?;
        let bus_interval = match kind {
            TransferType::Bulk | TransferType::Control => 0,
            TransferType::Interrupt if speed == Speed::LowFull => interval as u8,
            _ => crate::descriptor::exponent_interval(interval),
        };
        self.bus.alloc_ep(
            dir,
            Some(addr),
            kind.endpoint_type(),
            max_packet_size,
            bus_interval,
        )?;

        self.endpoints[index(addr)].info = Some(EndpointInfo {
            kind,
            max_packet_size,
            transactions: transactions.max(1),
            interval,
            config: config_nbr,
            interface: if_nbr,
            alt: alt_nbr,
        });
        let config = &mut self.configurations[config_nbr as usize];
        let alt = &mut config.interfaces[if_nbr as usize].alts[alt_nbr as usize];
        // Capacity checked above.
        let _ = alt.endpoints.push(addr);
        debug!(
            "ADD EP{} {:?} {:?} MPS {}",
            addr.index(),
            addr.direction(),
            kind,
            max_packet_size
        );
        Ok(addr)
    }

    /// Check that a configuration has room for `need`, without adding
    /// anything
    ///
    /// Classes call this before they register, so that a failure leaves the
    /// configuration as it was. New interfaces start with empty alternate
    /// settings. The bus may still refuse an endpoint.
    pub fn check_capacity(&self, config_nbr: u8, need: Capacity) -> Result<()> {
        self.ensure_not_started()?;
        let config = self
            .configurations
            .get(config_nbr as usize)
            .ok_or(Error::InvalidParameter)?;
        let room = MAX_INTERFACES - config.interfaces.len() >= need.interfaces
            && MAX_INTERFACE_GROUPS - config.groups.len() >= need.groups
            && self.addresses.free(UsbDirection::In) >= need.endpoints_in
            && self.addresses.free(UsbDirection::Out) >= need.endpoints_out;
        if room {
            Ok(())
        } else {
            Err(Error::AllocationFailed)
        }
    }

    /// Check endpoint parameters against a configuration's speed
    ///
    /// Returns the max packet size the endpoint would get.
    pub fn check_endpoint(
        &self,
        config_nbr: u8,
        kind: TransferType,
        max_packet_size: u16,
        transactions: u8,
        interval: u16,
    ) -> Result<u16> {
        let speed = self.configuration_speed(config_nbr)?;
        endpoint::validate(kind, speed, max_packet_size, transactions, interval)
    }

    /// Start the device
    ///
    /// Enables the bus. Configurations, interfaces, and endpoints can't be
    /// added after this call.
    pub fn start(&mut self) -> Result<()> {
        self.ensure_not_started()?;
        if self.configurations.is_empty() {
            return Err(Error::InvalidState);
        }
        self.bus.enable();
        self.state = DeviceState::Default;
        debug!("START");
        Ok(())
    }

    /// Collect the next bus event
    fn pump(&mut self) {
        match self.bus.poll() {
            PollResult::None => {}
            PollResult::Reset => self.events.reset = true,
            PollResult::Data {
                ep_out,
                ep_in_complete,
                ep_setup,
            } => {
                self.events.out |= ep_out;
                self.events.in_complete |= ep_in_complete;
                self.events.setup |= ep_setup;
            }
            PollResult::Suspend => self.events.suspend = true,
            PollResult::Resume => self.events.resume = true,
        }
    }

    /// Poll the bus, and handle USB events
    ///
    /// `drivers` must contain every class driver that registered interfaces.
    /// Returns `true` if there was USB activity.
    pub fn poll(&mut self, drivers: &mut [&mut dyn ClassDriver<B>]) -> bool {
        if self.state == DeviceState::Init {
            return false;
        }
        self.pump();

        if core::mem::take(&mut self.events.reset) {
            self.handle_reset(drivers);
            return true;
        }

        let mut activity = false;
        if core::mem::take(&mut self.events.suspend) {
            if self.state != DeviceState::Suspended {
                self.pre_suspend = self.state;
                self.state = DeviceState::Suspended;
                self.bus.suspend();
                debug!("SUSPEND");
            }
            activity = true;
        }
        if core::mem::take(&mut self.events.resume) {
            if self.state == DeviceState::Suspended {
                self.state = self.pre_suspend;
                self.bus.resume();
                debug!("RESUME");
            }
            activity = true;
        }

        // The previous request's status stage completes before the next
        // SETUP is handled. Its data stage may clear the completion.
        if self.events.in_complete & 1 != 0 {
            self.ep0_in_complete();
            activity = true;
        }
        if self.events.setup & 1 != 0 {
            self.handle_setup(drivers);
            activity = true;
        }

        for number in 0..ENDPOINT_NUMBERS {
            let bit = 1u16 << number;
            if self.events.in_complete & bit != 0 {
                activity = true;
                if number == 0 {
                    self.ep0_in_complete();
                } else {
                    self.events.in_complete &= !bit;
                    let addr = EndpointAddress::from_parts(number as usize, UsbDirection::In);
                    self.advance_in(addr);
                }
            }
            if self.events.out & bit != 0 {
                let addr = EndpointAddress::from_parts(number as usize, UsbDirection::Out);
                if self.endpoints[index(addr)].transfer.is_some() {
                    self.advance_out(addr);
                    activity = true;
                } else if number == 0 {
                    self.discard_control_out();
                    activity = true;
                }
            }
        }

        self.retry_in_transfers();
        self.deliver_completions(drivers);
        activity
    }

    fn handle_reset(&mut self, drivers: &mut [&mut dyn ClassDriver<B>]) {
        debug!("RESET");
        self.abort_all();
        self.deactivate_configuration(drivers);
        self.deliver_completions(drivers);
        self.bus.reset();
        self.address = 0;
        self.pending_address = None;
        self.remote_wakeup = false;
        self.control = None;
        self.events = Events::default();
        self.state = DeviceState::Default;
    }

    /// An IN packet on EP0 finished
    ///
    /// Latches the address once the SET_ADDRESS status stage completes.
    fn ep0_in_complete(&mut self) {
        self.events.in_complete &= !1;
        if let Some(address) = self.pending_address.take() {
            self.bus.set_device_address(address);
            self.address = address;
            debug!("ADDRESS {}", address);
        }
        self.advance_in(EndpointAddress::from_parts(0, UsbDirection::In));
    }

    /// Drop an OUT packet on EP0 that nobody asked for
    ///
    /// This is usually the status stage of a control read.
    fn discard_control_out(&mut self) {
        let mut buf = [0; 64];
        let _ = self
            .bus
            .read(EndpointAddress::from_parts(0, UsbDirection::Out), &mut buf);
        self.events.out &= !1;
    }

    fn stall_control(&mut self) {
        self.bus
            .set_stalled(EndpointAddress::from_parts(0, UsbDirection::In), true);
        self.bus
            .set_stalled(EndpointAddress::from_parts(0, UsbDirection::Out), true);
        debug!("EP0 STALL");
    }

    /// Complete a control transfer without data, or a control write, with a
    /// zero length IN packet
    fn send_control_status(&mut self) {
        if let Err(status) = self
            .bus
            .write(EndpointAddress::from_parts(0, UsbDirection::In), &[])
        {
            warn!("EP0 STATUS {:?}", status);
        }
    }

    fn handle_setup(&mut self, drivers: &mut [&mut dyn ClassDriver<B>]) {
        self.events.setup &= !1;
        let mut buf = [0; SetupPacket::SIZE];
        match self
            .bus
            .read(EndpointAddress::from_parts(0, UsbDirection::Out), &mut buf)
        {
            Ok(SetupPacket::SIZE) => {}
            _ => {
                warn!("EP0 SETUP READ FAILED");
                return;
            }
        }
        let setup = SetupPacket::parse(&buf);
        trace!(
            "SETUP {:X} {:X} {:X} {:X} {:X}",
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            setup.length
        );

        // A new SETUP ends whatever control transfer was in progress.
        for dir in [UsbDirection::Out, UsbDirection::In] {
            let _ = self.abort_endpoint(EndpointAddress::from_parts(0, dir));
        }
        self.deliver_completions(drivers);
        self.control = Some(ControlRequest {
            setup,
            owner: None,
            transferred: 0,
        });

        let claimed = self.dispatch_setup(drivers, &setup);
        self.control = None;

        if !claimed {
            self.stall_control();
        } else if setup.direction() == UsbDirection::Out
            && self.endpoints[index(EndpointAddress::from_parts(0, UsbDirection::Out))]
                .transfer
                .is_none()
        {
            self.send_control_status();
        }
    }

    fn dispatch_setup(
        &mut self,
        drivers: &mut [&mut dyn ClassDriver<B>],
        setup: &SetupPacket,
    ) -> bool {
        match (setup.kind(), setup.recipient()) {
            (RequestKind::Vendor, Recipient::Device | Recipient::Interface)
                if self.is_ms_os_request(setup) =>
            {
                self.ms_os_request(drivers, setup)
            }
            (RequestKind::Standard, Recipient::Device) => {
                self.standard_device_request(drivers, setup)
            }
            (RequestKind::Standard, Recipient::Interface) => {
                self.standard_interface_request(drivers, setup)
            }
            (RequestKind::Standard, Recipient::Endpoint) => self.standard_endpoint_request(setup),
            (
                RequestKind::Class | RequestKind::Vendor,
                Recipient::Interface | Recipient::Endpoint,
            ) => self.class_request(drivers, setup),
            _ => false,
        }
    }

    fn is_ms_os_request(&self, setup: &SetupPacket) -> bool {
        self.config.ms_os_vendor_code == Some(setup.request)
            && setup.direction() == UsbDirection::In
            && (setup.index == MS_OS_COMPAT_ID_INDEX || setup.index == MS_OS_EXT_PROPERTIES_INDEX)
    }

    /// Find an interface of the active configuration
    fn locate_interface(&self, if_nbr: u8) -> Option<InterfaceRef> {
        let config = self.active_config?;
        let interface = self.configurations[config as usize]
            .interfaces
            .get(if_nbr as usize)?;
        Some(InterfaceRef {
            config,
            interface: if_nbr,
            driver: interface.driver,
            class_arg: interface.class_arg,
        })
    }

    /// Find the interface that owns an endpoint of the active configuration
    fn locate_endpoint_owner(&self, addr: EndpointAddress) -> Option<InterfaceRef> {
        let info = self.endpoints.get(index(addr))?.info.as_ref()?;
        if addr.index() == 0 || Some(info.config) != self.active_config {
            return None;
        }
        self.locate_interface(info.interface)
    }

    /// Class and vendor requests to an interface or endpoint
    fn class_request(
        &mut self,
        drivers: &mut [&mut dyn ClassDriver<B>],
        setup: &SetupPacket,
    ) -> bool {
        let located = match setup.recipient() {
            Recipient::Interface => self.locate_interface(setup.interface_number()),
            _ => self.locate_endpoint_owner(EndpointAddress::from(setup.index as u8)),
        };
        let Some(InterfaceRef {
            driver: Some(id),
            class_arg,
            ..
        }) = located
        else {
            return false;
        };
        self.set_control_owner(id, class_arg);
        let Some(driver) = find_driver(drivers, id) else {
            warn!("DRIVER {} MISSING", id.0);
            return false;
        };
        match setup.kind() {
            RequestKind::Class => driver.class_request(self, setup, class_arg),
            _ => driver.vendor_request(self, setup, class_arg),
        }
    }

    fn set_control_owner(&mut self, driver: DriverId, class_arg: usize) {
        if let Some(control) = self.control.as_mut() {
            control.owner = Some(Owner { driver, class_arg });
        }
    }

    /// Disable the active configuration, if any
    fn deactivate_configuration(&mut self, drivers: &mut [&mut dyn ClassDriver<B>]) {
        let Some(config_nbr) = self.active_config.take() else {
            return;
        };
        debug!("DISABLE CONFIG {}", config_nbr);
        // EP0 belongs to every configuration.
        for idx in 2..MAX_ENDPOINTS {
            let config = self.endpoints[idx].info.as_ref().map(|info| info.config);
            if config == Some(config_nbr) {
                self.abort_index(idx);
            }
        }
        self.deliver_completions(drivers);

        let count = self.configurations[config_nbr as usize].interfaces.len();
        for if_nbr in 0..count {
            let interface = &mut self.configurations[config_nbr as usize].interfaces[if_nbr];
            interface.active_alt = 0;
            let (driver, class_arg) = (interface.driver, interface.class_arg);
            if let Some(driver) = driver.and_then(|id| find_driver(drivers, id)) {
                driver.disable(self, config_nbr, class_arg);
            }
        }
    }

    /// Make `config_nbr` the active configuration
    fn activate_configuration(&mut self, drivers: &mut [&mut dyn ClassDriver<B>], config_nbr: u8) {
        self.active_config = Some(config_nbr);
        self.state = DeviceState::Configured;
        debug!("ENABLE CONFIG {}", config_nbr);
        let count = self.configurations[config_nbr as usize].interfaces.len();
        for if_nbr in 0..count {
            let interface = &mut self.configurations[config_nbr as usize].interfaces[if_nbr];
            interface.active_alt = 0;
            let (driver, class_arg) = (interface.driver, interface.class_arg);
            if let Some(driver) = driver.and_then(|id| find_driver(drivers, id)) {
                driver.enable(self, config_nbr, class_arg);
            }
        }
    }
}
