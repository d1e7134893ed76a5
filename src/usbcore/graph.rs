//! Configuration / interface / alternate setting tables

use heapless::Vec;
use usb_device::endpoint::EndpointAddress;

use crate::{
    class::{DriverId, InterfaceClass},
    Speed, MAX_ALT_SETTINGS, MAX_ENDPOINTS_PER_ALT, MAX_INTERFACES, MAX_INTERFACE_GROUPS,
};

bitflags::bitflags! {
    /// Configuration descriptor `bmAttributes`
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ConfigAttributes: u8 {
        const SELF_POWERED = 0x40;
        const REMOTE_WAKEUP = 0x20;
    }
}

#[derive(Debug)]
pub(crate) struct AltSetting {
    pub(crate) class: InterfaceClass,
    pub(crate) alt_arg: usize,
    pub(crate) endpoints: Vec<EndpointAddress, MAX_ENDPOINTS_PER_ALT>,
}

#[derive(Debug)]
pub(crate) struct Interface {
    pub(crate) driver: Option<DriverId>,
    pub(crate) class_arg: usize,
    pub(crate) alts: Vec<AltSetting, MAX_ALT_SETTINGS>,
    pub(crate) active_alt: u8,
}

/// An interface association
#[derive(Debug, Clone, Copy)]
pub(crate) struct InterfaceGroup {
    pub(crate) class: InterfaceClass,
    pub(crate) first: u8,
    pub(crate) count: u8,
}

impl InterfaceGroup {
    fn contains(&self, if_nbr: u8) -> bool {
        (self.first..self.first + self.count).contains(&if_nbr)
    }
}

#[derive(Debug)]
pub(crate) struct Configuration {
    pub(crate) attributes: ConfigAttributes,
    pub(crate) max_power_ma: u16,
    pub(crate) speed: Speed,
    pub(crate) interfaces: Vec<Interface, MAX_INTERFACES>,
    pub(crate) groups: Vec<InterfaceGroup, MAX_INTERFACE_GROUPS>,
}

impl Configuration {
    pub(crate) fn new(attributes: ConfigAttributes, max_power_ma: u16, speed: Speed) -> Self {
        Configuration {
            attributes,
            max_power_ma,
            speed,
            interfaces: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// The group that starts at interface `if_nbr`, if any
    pub(crate) fn group_starting_at(&self, if_nbr: u8) -> Option<&InterfaceGroup> {
        self.groups.iter().find(|group| group.first == if_nbr)
    }

    /// Returns `true` if `if_nbr` already belongs to a group
    pub(crate) fn is_grouped(&self, if_nbr: u8) -> bool {
        self.groups
            .iter()
            .any(|group| group.contains(if_nbr))
    }
}
