//! Class driver interface
//!
//! The core owns the configuration / interface / endpoint object graph.
//! When a class registers an interface, it names the [`ClassDriver`] that
//! handles the interface with a [`DriverId`], and supplies a class argument
//! that identifies the class instance. The core then calls back into that
//! driver for
//!
//! - configuration activation and deactivation,
//! - class-specific descriptors,
//! - class, vendor, and non-standard interface requests,
//! - asynchronous transfer completions on the interface's endpoints.
//!
//! Drivers aren't stored in the core. Supply all of them to every
//! [`Core::poll`](crate::usbcore::Core::poll) call.

pub mod cdc;
pub mod vendor;

use crate::{
    control::SetupPacket,
    descriptor::{DescriptorWriter, MsCompatId, MsExtProperty},
    usbcore::Core,
    Result,
};
use usb_device::{bus::UsbBus, endpoint::EndpointAddress};

/// Identifies a class driver among the drivers handed to `poll()`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct DriverId(pub u8);

/// Lifecycle of a class instance
///
/// `None` until the instance joins a configuration, `Init` while its
/// configuration isn't active, and `Configured` while the host has it
/// selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum ClassState {
    #[default]
    None,
    Init,
    Configured,
}

/// Class, subclass, and protocol codes of an interface or interface group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct InterfaceClass {
    pub code: u8,
    pub subclass: u8,
    pub protocol: u8,
}

impl InterfaceClass {
    pub const fn new(code: u8, subclass: u8, protocol: u8) -> Self {
        InterfaceClass {
            code,
            subclass,
            protocol,
        }
    }
}

/// Outcome of an asynchronous transfer
#[derive(Debug)]
pub struct TransferComplete<'a> {
    pub endpoint: EndpointAddress,
    /// For IN transfers, the data that was queued. For OUT transfers, the
    /// data that was received.
    pub buf: &'a [u8],
    /// Number of bytes requested when the transfer was armed
    pub requested: usize,
    /// Number of bytes actually transferred
    pub transferred: usize,
    /// The argument supplied when the transfer was armed
    pub arg: usize,
    pub status: Result<()>,
}

/// A USB class driver
///
/// All methods except [`id`](ClassDriver::id) have no-op defaults. Request
/// handlers return `true` when they claim the request; the core stalls the
/// control endpoint when no handler claims a request.
///
/// Handlers run from `poll()`, so they may use the synchronous control
/// transfers ([`Core::read_control_sync`], [`Core::write_control_sync`])
/// to complete a data stage.
pub trait ClassDriver<B: UsbBus> {
    /// This driver's identifier
    fn id(&self) -> DriverId;

    /// The configuration that contains one of this driver's interfaces
    /// became active.
    fn enable(&mut self, usb: &mut Core<B>, config_nbr: u8, class_arg: usize) {
        let _ = (usb, config_nbr, class_arg);
    }

    /// The configuration that contains one of this driver's interfaces
    /// was deactivated, either by the host or by a bus reset.
    fn disable(&mut self, usb: &mut Core<B>, config_nbr: u8, class_arg: usize) {
        let _ = (usb, config_nbr, class_arg);
    }

    /// The host selected a new alternate setting.
    fn alt_setting_update(
        &mut self,
        usb: &mut Core<B>,
        config_nbr: u8,
        if_nbr: u8,
        class_arg: usize,
        alt_arg: usize,
    ) {
        let _ = (usb, config_nbr, if_nbr, class_arg, alt_arg);
    }

    /// Append class-specific descriptors after an interface descriptor.
    fn interface_descriptor(
        &self,
        w: &mut DescriptorWriter,
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u8,
        class_arg: usize,
    ) -> Result<()> {
        let _ = (w, config_nbr, if_nbr, alt_nbr, class_arg);
        Ok(())
    }

    /// Standard requests to an interface that the core doesn't handle.
    fn interface_request(
        &mut self,
        usb: &mut Core<B>,
        req: &SetupPacket,
        class_arg: usize,
    ) -> bool {
        let _ = (usb, req, class_arg);
        false
    }

    /// Class-specific requests to one of this driver's interfaces or endpoints.
    fn class_request(&mut self, usb: &mut Core<B>, req: &SetupPacket, class_arg: usize) -> bool {
        let _ = (usb, req, class_arg);
        false
    }

    /// Vendor-specific requests to one of this driver's interfaces or endpoints.
    fn vendor_request(&mut self, usb: &mut Core<B>, req: &SetupPacket, class_arg: usize) -> bool {
        let _ = (usb, req, class_arg);
        false
    }

    /// An asynchronous transfer on one of this driver's endpoints finished.
    fn transfer_complete(&mut self, usb: &mut Core<B>, class_arg: usize, xfer: &TransferComplete) {
        let _ = (usb, class_arg, xfer);
    }

    /// The Microsoft OS compat ID of the function that starts at this interface.
    fn ms_compat_id(&self, class_arg: usize) -> Option<MsCompatId> {
        let _ = class_arg;
        None
    }

    /// The Microsoft OS extended properties of this interface.
    fn ms_ext_properties(&self, class_arg: usize) -> &[MsExtProperty] {
        let _ = class_arg;
        &[]
    }
}
