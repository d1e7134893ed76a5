//! A simulated USB bus, and host-side helpers for tests

extern crate std;

use std::{collections::VecDeque, vec::Vec};

use core::{
    cell::RefCell,
    sync::atomic::{AtomicU32, Ordering},
};
use critical_section::Mutex;
use usb_device::{
    bus::{PollResult, UsbBus},
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection, UsbError,
};

use crate::{class::ClassDriver, usbcore::Core, DeviceConfig, Speed};

const NUMBERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    pub(crate) addr: EndpointAddress,
    pub(crate) ep_type: EndpointType,
    pub(crate) max_packet_size: u16,
    pub(crate) interval: u8,
}

#[derive(Default)]
struct Inner {
    allocations: Vec<Allocation>,
    enabled: bool,
    address: u8,
    setups: VecDeque<[u8; 8]>,
    out: [VecDeque<Vec<u8>>; NUMBERS],
    written: [Vec<Vec<u8>>; NUMBERS],
    in_complete: u16,
    held: u16,
    held_complete: u16,
    stalled: u32,
    reset: bool,
    suspend: bool,
    resume: bool,
}

impl Inner {
    fn allocation(&self, addr: EndpointAddress) -> Option<&Allocation> {
        self.allocations.iter().find(|alloc| alloc.addr == addr)
    }
}

fn stall_bit(addr: EndpointAddress) -> u32 {
    1 << (addr.index() * 2 + (addr.direction() == UsbDirection::In) as usize)
}

/// A bus that records IN packets, and replays queued SETUP and OUT packets
///
/// IN packets complete immediately, unless the endpoint is held.
pub(crate) struct MockBus {
    inner: Mutex<RefCell<Inner>>,
}

impl MockBus {
    pub(crate) fn new() -> Self {
        MockBus {
            inner: Mutex::new(RefCell::new(Inner::default())),
        }
    }

    fn with_inner<R>(&self, func: impl FnOnce(&mut Inner) -> R) -> R {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            func(&mut inner)
        })
    }

    /// Queue a SETUP packet on EP0
    pub(crate) fn setup(&self, setup: [u8; 8]) {
        self.with_inner(|inner| inner.setups.push_back(setup));
    }

    /// Queue an OUT packet
    pub(crate) fn push_out(&self, number: usize, data: &[u8]) {
        self.with_inner(|inner| inner.out[number].push_back(data.to_vec()));
    }

    /// Remove and return the IN packets written to an endpoint
    pub(crate) fn take_written(&self, number: usize) -> Vec<Vec<u8>> {
        self.with_inner(|inner| core::mem::take(&mut inner.written[number]))
    }

    /// Keep IN completions on an endpoint pending until released
    pub(crate) fn hold_in(&self, number: usize, hold: bool) {
        self.with_inner(|inner| {
            let bit = 1 << number;
            if hold {
                inner.held |= bit;
            } else {
                inner.held &= !bit;
                if inner.held_complete & bit != 0 {
                    inner.held_complete &= !bit;
                    inner.in_complete |= bit;
                }
            }
        });
    }

    pub(crate) fn bus_reset(&self) {
        self.with_inner(|inner| inner.reset = true);
    }

    pub(crate) fn bus_suspend(&self) {
        self.with_inner(|inner| inner.suspend = true);
    }

    pub(crate) fn bus_resume(&self) {
        self.with_inner(|inner| inner.resume = true);
    }

    pub(crate) fn address(&self) -> u8 {
        self.with_inner(|inner| inner.address)
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.with_inner(|inner| inner.enabled)
    }

    pub(crate) fn allocations(&self) -> Vec<Allocation> {
        self.with_inner(|inner| inner.allocations.clone())
    }
}

impl UsbBus for MockBus {
    fn alloc_ep(
        &mut self,
        _: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        ep_type: EndpointType,
        max_packet_size: u16,
        interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        self.with_inner(|inner| {
            let addr = ep_addr.ok_or(UsbError::EndpointOverflow)?;
            if inner.allocation(addr).is_some() {
                return Err(UsbError::InvalidEndpoint);
            }
            inner.allocations.push(Allocation {
                addr,
                ep_type,
                max_packet_size,
                interval,
            });
            Ok(addr)
        })
    }

    fn enable(&mut self) {
        self.with_inner(|inner| inner.enabled = true);
    }

    fn reset(&self) {
        self.with_inner(|inner| {
            inner.address = 0;
            inner.stalled = 0;
            inner.in_complete = 0;
        });
    }

    fn set_device_address(&self, addr: u8) {
        self.with_inner(|inner| inner.address = addr);
    }

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        self.with_inner(|inner| {
            let alloc = inner
                .allocation(ep_addr)
                .ok_or(UsbError::InvalidEndpoint)?;
            if ep_addr.direction() != UsbDirection::In {
                return Err(UsbError::InvalidEndpoint);
            }
            if buf.len() > alloc.max_packet_size as usize {
                return Err(UsbError::BufferOverflow);
            }
            let number = ep_addr.index();
            let bit = 1 << number;
            if (inner.held_complete | inner.in_complete) & bit != 0 && number != 0 {
                return Err(UsbError::WouldBlock);
            }
            inner.written[number].push(buf.to_vec());
            if inner.held & bit != 0 {
                inner.held_complete |= bit;
            } else {
                inner.in_complete |= bit;
            }
            Ok(buf.len())
        })
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> usb_device::Result<usize> {
        self.with_inner(|inner| {
            inner
                .allocation(ep_addr)
                .ok_or(UsbError::InvalidEndpoint)?;
            if ep_addr.direction() != UsbDirection::Out {
                return Err(UsbError::InvalidEndpoint);
            }
            let number = ep_addr.index();
            if number == 0 {
                if let Some(setup) = inner.setups.pop_front() {
                    // Hardware clears an EP0 stall when a SETUP arrives.
                    inner.stalled &= !0b11;
                    buf.get_mut(..8)
                        .ok_or(UsbError::BufferOverflow)?
                        .copy_from_slice(&setup);
                    return Ok(8);
                }
            }
            let packet = inner.out[number]
                .front()
                .ok_or(UsbError::WouldBlock)?;
            if packet.len() > buf.len() {
                return Err(UsbError::BufferOverflow);
            }
            let len = packet.len();
            buf[..len].copy_from_slice(packet);
            inner.out[number].pop_front();
            Ok(len)
        })
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        self.with_inner(|inner| {
            if stalled {
                inner.stalled |= stall_bit(ep_addr);
            } else {
                inner.stalled &= !stall_bit(ep_addr);
            }
        });
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        self.with_inner(|inner| inner.stalled & stall_bit(ep_addr) != 0)
    }

    fn suspend(&self) {}

    fn resume(&self) {}

    fn poll(&self) -> PollResult {
        self.with_inner(|inner| {
            if core::mem::take(&mut inner.reset) {
                return PollResult::Reset;
            }
            if core::mem::take(&mut inner.suspend) {
                return PollResult::Suspend;
            }
            if core::mem::take(&mut inner.resume) {
                return PollResult::Resume;
            }
            let ep_setup = !inner.setups.is_empty() as u16;
            let ep_out = inner
                .out
                .iter()
                .enumerate()
                .filter(|(_, packets)| !packets.is_empty())
                .fold(0, |mask, (number, _)| mask | 1 << number);
            let ep_in_complete = core::mem::take(&mut inner.in_complete);
            if ep_setup | ep_out | ep_in_complete == 0 {
                PollResult::None
            } else {
                PollResult::Data {
                    ep_out,
                    ep_in_complete,
                    ep_setup,
                }
            }
        })
    }
}

/// A millisecond clock that advances on every reading
pub(crate) fn clock() -> u32 {
    static NOW: AtomicU32 = AtomicU32::new(0);
    NOW.fetch_add(1, Ordering::Relaxed)
}

/// A full speed device on a mock bus
pub(crate) fn core() -> Core<MockBus> {
    let config = DeviceConfig::new(0x1209, 0x0001)
        .manufacturer("Acme")
        .product("Widget")
        .speed(Speed::LowFull);
    Core::new(MockBus::new(), config, clock).unwrap()
}

pub(crate) fn poll_all(core: &mut Core<MockBus>, drivers: &mut [&mut dyn ClassDriver<MockBus>]) {
    for _ in 0..8 {
        core.poll(drivers);
    }
}

/// Run a control transfer, and return the IN data stage
///
/// `data` is the OUT data stage, if any. Zero length IN packets aren't
/// returned.
pub(crate) fn control(
    core: &mut Core<MockBus>,
    drivers: &mut [&mut dyn ClassDriver<MockBus>],
    setup: [u8; 8],
    data: &[u8],
) -> Vec<u8> {
    core.bus().take_written(0);
    core.bus().setup(setup);
    for chunk in data.chunks(core.config().max_packet_size_0 as usize) {
        core.bus().push_out(0, chunk);
    }
    poll_all(core, drivers);
    core.bus()
        .take_written(0)
        .into_iter()
        .flatten()
        .collect()
}

/// Indicates if the last control transfer stalled
pub(crate) fn stalled(core: &Core<MockBus>) -> bool {
    core.bus()
        .is_stalled(EndpointAddress::from_parts(0, UsbDirection::In))
}

/// SET_ADDRESS, then SET_CONFIGURATION
pub(crate) fn enumerate(
    core: &mut Core<MockBus>,
    drivers: &mut [&mut dyn ClassDriver<MockBus>],
    configuration: u8,
) {
    let set_configuration = [0x00, 0x09, configuration, 0, 0, 0, 0, 0];
    control(core, drivers, [0x00, 0x05, 0x07, 0, 0, 0, 0, 0], &[]);
    control(core, drivers, set_configuration, &[]);
}
