//! USB device classes on top of `usb-device` buses
//!
//! `usbd-classes` is a small USB device stack. It takes any [`usb-device`]
//! [`UsbBus`](usb_device::bus::UsbBus) implementation, and provides
//!
//! - a device [core](usbcore) that enumerates the device, answers standard
//!   requests, and dispatches class requests and transfer completions to
//!   class drivers.
//! - a CDC base class, with an ACM (virtual serial port) subclass.
//! - a vendor-specific class, with Microsoft OS descriptors for driverless
//!   WinUSB binding.
//!
//! Classes register their interfaces and endpoints with the core before the
//! device starts. After the device starts, supply every class driver to each
//! [`Core::poll`] call.
//!
//! # Example
//!
//! A serial port that echoes what it receives. `bus` is your `UsbBus`
//! implementation, and `millis` is a millisecond counter.
//!
//! ```ignore
//! use usbd_classes::{
//!     class::{cdc::acm::{AcmSerial, CallManagement}, DriverId},
//!     ConfigAttributes, Core, DeviceConfig, Speed,
//! };
//!
//! const CONFIG: DeviceConfig = DeviceConfig::new(0x5824, 0x27dd)
//!     .product("echo")
//!     .speed(Speed::LowFull);
//!
//! let mut usb = Core::new(bus, CONFIG, millis)?;
//! let config = usb.add_configuration(ConfigAttributes::SELF_POWERED, 100, Speed::LowFull)?;
//!
//! let mut serial: AcmSerial<(), 1> = AcmSerial::new(DriverId(0), ());
//! let port = serial.create_instance(16, CallManagement::empty())?;
//! serial.add_to_configuration(&mut usb, port, config)?;
//! usb.start()?;
//!
//! let mut buf = [0; 64];
//! loop {
//!     usb.poll(&mut [&mut serial]);
//!     if serial.is_enabled(&usb, port) {
//!         if let Ok(len) = serial.read(&mut usb, port, &mut buf, 10) {
//!             serial.write(&mut usb, port, &buf[..len], 10)?;
//!         }
//!     }
//! }
//! ```
//!
//! [`usb-device`]: https://crates.io/crates/usb-device

#![no_std]

#[macro_use]
mod log;

pub mod class;
mod config;
pub mod control;
pub mod descriptor;
mod error;
mod shared;
pub mod usbcore;

#[cfg(test)]
mod mock;

pub use config::{Clock, DeviceConfig, Speed, LANGUAGE_ID_EN_US};
pub use error::{Error, Result};
pub use shared::Shared;
pub use usbcore::{ConfigAttributes, Core, DeviceState, TransferType};

/// Configurations per device
pub const MAX_CONFIGURATIONS: usize = 2;
/// Interfaces per configuration
pub const MAX_INTERFACES: usize = 8;
/// Alternate settings per interface, including the default setting
pub const MAX_ALT_SETTINGS: usize = 2;
/// Interface associations per configuration
pub const MAX_INTERFACE_GROUPS: usize = 4;
/// Endpoints per alternate setting
pub const MAX_ENDPOINTS_PER_ALT: usize = 4;
/// Eight endpoint numbers, two directions
pub const MAX_ENDPOINTS: usize = 8 * 2;
/// Largest asynchronous transfer
pub const ASYNC_BUFFER_SIZE: usize = 512;
/// Largest descriptor the core can build, including the configuration
/// descriptor and everything that follows it
pub const CONFIG_DESCRIPTOR_SIZE: usize = 512;
/// Largest packet on any endpoint
pub const MAX_PACKET_SIZE: usize = 1024;
