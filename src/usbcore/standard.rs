//! Standard requests, and the descriptors the core builds
//!
//! The core answers standard device and endpoint requests itself. Standard
//! interface requests that the core doesn't understand go to the interface's
//! driver.

use usb_device::{bus::UsbBus, endpoint::EndpointAddress, UsbDirection};

use super::{
    allocator::index, find_driver, find_driver_ref, Core, DeviceState, TransferType,
    CONTROL_TIMEOUT_MS,
};
use crate::{
    class::{ClassDriver, InterfaceClass},
    control::{feature, standard_request, SetupPacket},
    descriptor::{
        descriptor_type, write_ms_compat_id, write_ms_ext_properties, write_ms_os_string,
        DescriptorWriter, MANUFACTURER_STRING, MS_OS_COMPAT_ID_INDEX, MS_OS_STRING,
        PRODUCT_STRING, SERIAL_NUMBER_STRING,
    },
    Result, Speed, CONFIG_DESCRIPTOR_SIZE, LANGUAGE_ID_EN_US,
};

use super::graph::ConfigAttributes;

/// Device class codes when the device contains interface associations
const IAD_DEVICE_CLASS: InterfaceClass = InterfaceClass::new(0xEF, 0x02, 0x01);

/// Descriptor index of a device string; 0 when the string isn't set.
fn string_index(index: u8, string: Option<&'static str>) -> u8 {
    if string.is_some() {
        index
    } else {
        0
    }
}

impl<B: UsbBus> Core<B> {
    /// Answer the IN data stage with `data`
    ///
    /// Returns `false` if the transfer failed, so the request stalls.
    fn respond(&mut self, data: &[u8]) -> bool {
        match self.write_control_sync(data, CONTROL_TIMEOUT_MS, true) {
            Ok(_) => true,
            Err(err) => {
                warn!("EP0 RESPONSE {:?}", err);
                false
            }
        }
    }

    /// Build a descriptor in a scratch buffer, then send it
    fn respond_with(
        &mut self,
        build: impl FnOnce(&Self, &mut DescriptorWriter) -> Result<bool>,
    ) -> bool {
        let mut buf = [0; CONFIG_DESCRIPTOR_SIZE];
        let mut w = DescriptorWriter::new(&mut buf);
        let len = match build(self, &mut w) {
            Ok(true) => w.position(),
            Ok(false) => return false,
            Err(err) => {
                warn!("DESCRIPTOR {:?}", err);
                return false;
            }
        };
        self.respond(&buf[..len])
    }

    fn device_class(&self) -> InterfaceClass {
        if self
            .configurations
            .iter()
            .any(|config| !config.groups.is_empty())
        {
            IAD_DEVICE_CLASS
        } else {
            InterfaceClass::new(0, 0, 0)
        }
    }

    pub(super) fn write_device_descriptor(&self, w: &mut DescriptorWriter) -> Result<()> {
        let class = self.device_class();
        let [vid0, vid1] = self.config.vendor_id.to_le_bytes();
        let [pid0, pid1] = self.config.product_id.to_le_bytes();
        let [rel0, rel1] = self.config.device_release.to_le_bytes();
        w.write_descriptor(
            descriptor_type::DEVICE,
            &[
                0x00,
                0x02,
                class.code,
                class.subclass,
                class.protocol,
                self.config.max_packet_size_0,
                vid0,
                vid1,
                pid0,
                pid1,
                rel0,
                rel1,
                string_index(MANUFACTURER_STRING, self.config.manufacturer),
                string_index(PRODUCT_STRING, self.config.product),
                string_index(SERIAL_NUMBER_STRING, self.config.serial_number),
                self.configurations.len() as u8,
            ],
        )
    }

    fn write_device_qualifier(&self, w: &mut DescriptorWriter) -> Result<()> {
        let class = self.device_class();
        w.write_descriptor(
            descriptor_type::DEVICE_QUALIFIER,
            &[
                0x00,
                0x02,
                class.code,
                class.subclass,
                class.protocol,
                self.config.max_packet_size_0,
                self.configurations.len() as u8,
                0,
            ],
        )
    }

    fn write_endpoint_descriptor(
        &self,
        w: &mut DescriptorWriter,
        addr: EndpointAddress,
        speed: Speed,
    ) -> Result<()> {
        let Some(info) = self.endpoints[index(addr)].info else {
            return Ok(());
        };
        let max_packet_size = info.max_packet_size | ((info.transactions.max(1) as u16 - 1) << 11);
        let interval = match (info.kind, speed) {
            (TransferType::Bulk | TransferType::Control, _) => 0,
            (TransferType::Interrupt, Speed::LowFull) => info.interval as u8,
            _ => crate::descriptor::exponent_interval(info.interval),
        };
        let [mps0, mps1] = max_packet_size.to_le_bytes();
        w.write_descriptor(
            descriptor_type::ENDPOINT,
            &[
                u8::from(addr),
                info.kind.attributes(),
                mps0,
                mps1,
                interval,
            ],
        )
    }

    /// Build the full configuration descriptor for `config_nbr`
    pub(super) fn write_configuration_descriptor(
        &self,
        drivers: &[&mut dyn ClassDriver<B>],
        config_nbr: u8,
        w: &mut DescriptorWriter,
    ) -> Result<()> {
        let config = &self.configurations[config_nbr as usize];
        let start = w.position();
        w.write_descriptor(
            descriptor_type::CONFIGURATION,
            &[
                0,
                0,
                config.interfaces.len() as u8,
                config_nbr + 1,
                0,
                0x80 | config.attributes.bits(),
                (config.max_power_ma / 2) as u8,
            ],
        )?;

        for (if_nbr, interface) in config.interfaces.iter().enumerate() {
            let if_nbr = if_nbr as u8;
            if let Some(group) = config.group_starting_at(if_nbr) {
                w.write_descriptor(
                    descriptor_type::INTERFACE_ASSOCIATION,
                    &[
                        group.first,
                        group.count,
                        group.class.code,
                        group.class.subclass,
                        group.class.protocol,
                        0,
                    ],
                )?;
            }
            let driver = interface.driver.and_then(|id| find_driver_ref(drivers, id));
            for (alt_nbr, alt) in interface.alts.iter().enumerate() {
                let alt_nbr = alt_nbr as u8;
                w.write_descriptor(
                    descriptor_type::INTERFACE,
                    &[
                        if_nbr,
                        alt_nbr,
                        alt.endpoints.len() as u8,
                        alt.class.code,
                        alt.class.subclass,
                        alt.class.protocol,
                        0,
                    ],
                )?;
                if let Some(driver) = driver {
                    driver.interface_descriptor(
                        w,
                        config_nbr,
                        if_nbr,
                        alt_nbr,
                        interface.class_arg,
                    )?;
                }
                for &addr in &alt.endpoints {
                    self.write_endpoint_descriptor(w, addr, config.speed)?;
                }
            }
        }

        let total = w.position() - start;
        w.patch_u16(start + 2, total as u16)
    }

    fn write_string_descriptor(&self, string_index: u8, w: &mut DescriptorWriter) -> Result<bool> {
        if string_index == 0 {
            let [lang0, lang1] = LANGUAGE_ID_EN_US.to_le_bytes();
            w.write_descriptor(descriptor_type::STRING, &[lang0, lang1])?;
            return Ok(true);
        }
        if string_index == MS_OS_STRING {
            return match self.config.ms_os_vendor_code {
                Some(vendor_code) => write_ms_os_string(w, vendor_code).map(|_| true),
                None => Ok(false),
            };
        }
        match self.config.string(string_index) {
            Some(string) => w.write_string(string).map(|_| true),
            None => Ok(false),
        }
    }

    fn get_descriptor(&mut self, drivers: &[&mut dyn ClassDriver<B>], setup: &SetupPacket) -> bool {
        let (kind, desc_index) = setup.descriptor();
        match kind {
            descriptor_type::DEVICE => {
                self.respond_with(|usb, w| usb.write_device_descriptor(w).map(|_| true))
            }
            descriptor_type::CONFIGURATION => {
                if desc_index as usize >= self.configurations.len() {
                    return false;
                }
                self.respond_with(|usb, w| {
                    usb.write_configuration_descriptor(drivers, desc_index, w)
                        .map(|_| true)
                })
            }
            descriptor_type::STRING => {
                self.respond_with(|usb, w| usb.write_string_descriptor(desc_index, w))
            }
            descriptor_type::DEVICE_QUALIFIER if self.config.speed == Speed::High => {
                self.respond_with(|usb, w| usb.write_device_qualifier(w).map(|_| true))
            }
            _ => false,
        }
    }

    /// The configuration whose attributes describe the device right now
    fn current_attributes(&self) -> ConfigAttributes {
        let config_nbr = self.active_config.unwrap_or(0) as usize;
        self.configurations
            .get(config_nbr)
            .map(|config| config.attributes)
            .unwrap_or(ConfigAttributes::empty())
    }

    pub(super) fn standard_device_request(
        &mut self,
        drivers: &mut [&mut dyn ClassDriver<B>],
        setup: &SetupPacket,
    ) -> bool {
        match (setup.direction(), setup.request) {
            (UsbDirection::In, standard_request::GET_STATUS) => {
                let mut status = 0;
                let attributes = self.current_attributes();
                if attributes.contains(ConfigAttributes::SELF_POWERED) {
                    status |= 1;
                }
                if self.remote_wakeup {
                    status |= 2;
                }
                self.respond(&[status, 0])
            }
            (UsbDirection::Out, standard_request::CLEAR_FEATURE)
                if setup.value == feature::DEVICE_REMOTE_WAKEUP =>
            {
                self.remote_wakeup = false;
                true
            }
            (UsbDirection::Out, standard_request::SET_FEATURE)
                if setup.value == feature::DEVICE_REMOTE_WAKEUP =>
            {
                let attributes = self.current_attributes();
                if !attributes.contains(ConfigAttributes::REMOTE_WAKEUP) {
                    return false;
                }
                self.remote_wakeup = true;
                true
            }
            (UsbDirection::Out, standard_request::SET_ADDRESS) => self.set_address(setup),
            (UsbDirection::In, standard_request::GET_DESCRIPTOR) => {
                self.get_descriptor(drivers, setup)
            }
            (UsbDirection::In, standard_request::GET_CONFIGURATION) => {
                let value = self.active_config.map(|config| config + 1).unwrap_or(0);
                self.respond(&[value])
            }
            (UsbDirection::Out, standard_request::SET_CONFIGURATION) => {
                self.set_configuration(drivers, setup.value)
            }
            _ => false,
        }
    }

    fn set_address(&mut self, setup: &SetupPacket) -> bool {
        let address = setup.value;
        if address > 127 || setup.index != 0 || setup.length != 0 {
            return false;
        }
        if self.state == DeviceState::Configured {
            return false;
        }
        let address = address as u8;
        if B::QUIRK_SET_ADDRESS_BEFORE_STATUS {
            self.bus.set_device_address(address);
            self.address = address;
            debug!("ADDRESS {}", address);
        } else {
            self.pending_address = Some(address);
        }
        self.state = if address == 0 {
            DeviceState::Default
        } else {
            DeviceState::Addressed
        };
        true
    }

    fn set_configuration(&mut self, drivers: &mut [&mut dyn ClassDriver<B>], value: u16) -> bool {
        if !matches!(self.state, DeviceState::Addressed | DeviceState::Configured) {
            return false;
        }
        if value as usize > self.configurations.len() {
            return false;
        }
        self.deactivate_configuration(drivers);
        if value == 0 {
            self.state = DeviceState::Addressed;
        } else {
            self.activate_configuration(drivers, value as u8 - 1);
        }
        true
    }

    pub(super) fn standard_interface_request(
        &mut self,
        drivers: &mut [&mut dyn ClassDriver<B>],
        setup: &SetupPacket,
    ) -> bool {
        let Some(located) = self.locate_interface(setup.interface_number()) else {
            return false;
        };
        match (setup.direction(), setup.request) {
            (UsbDirection::In, standard_request::GET_STATUS) => self.respond(&[0, 0]),
            (UsbDirection::In, standard_request::GET_INTERFACE) => {
                let alt = self.configurations[located.config as usize].interfaces
                    [located.interface as usize]
                    .active_alt;
                self.respond(&[alt])
            }
            (UsbDirection::Out, standard_request::SET_INTERFACE) => {
                self.set_interface(drivers, located.config, located.interface, setup.value)
            }
            _ => {
                let Some(id) = located.driver else {
                    return false;
                };
                self.set_control_owner(id, located.class_arg);
                match find_driver(drivers, id) {
                    Some(driver) => driver.interface_request(self, setup, located.class_arg),
                    None => false,
                }
            }
        }
    }

    fn set_interface(
        &mut self,
        drivers: &mut [&mut dyn ClassDriver<B>],
        config_nbr: u8,
        if_nbr: u8,
        alt_nbr: u16,
    ) -> bool {
        let config = &self.configurations[config_nbr as usize];
        let interface = &config.interfaces[if_nbr as usize];
        let Some(alt) = interface.alts.get(alt_nbr as usize) else {
            return false;
        };
        let alt_arg = alt.alt_arg;
        let (driver, class_arg) = (interface.driver, interface.class_arg);

        // Endpoints of the old alternate setting go away.
        let old = interface.active_alt as usize;
        let old_endpoints = interface.alts[old].endpoints.clone();
        for addr in old_endpoints {
            self.abort_index(index(addr));
        }
        self.deliver_completions(drivers);

        let interfaces = &mut self.configurations[config_nbr as usize].interfaces;
        interfaces[if_nbr as usize].active_alt = alt_nbr as u8;
        debug!("IF {} ALT {}", if_nbr, alt_nbr);
        if let Some(driver) = driver.and_then(|id| find_driver(drivers, id)) {
            driver.alt_setting_update(self, config_nbr, if_nbr, class_arg, alt_arg);
        }
        true
    }

    pub(super) fn standard_endpoint_request(&mut self, setup: &SetupPacket) -> bool {
        let addr = EndpointAddress::from(setup.index as u8);
        if addr.index() != 0 && self.locate_endpoint_owner(addr).is_none() {
            return false;
        }
        match (setup.direction(), setup.request) {
            (UsbDirection::In, standard_request::GET_STATUS) => {
                let halted = self.bus.is_stalled(addr) as u8;
                self.respond(&[halted, 0])
            }
            (UsbDirection::Out, standard_request::CLEAR_FEATURE)
                if setup.value == feature::ENDPOINT_HALT =>
            {
                self.bus.set_stalled(addr, false);
                true
            }
            (UsbDirection::Out, standard_request::SET_FEATURE)
                if setup.value == feature::ENDPOINT_HALT =>
            {
                self.abort_index(index(addr));
                self.bus.set_stalled(addr, true);
                true
            }
            _ => false,
        }
    }

    /// Microsoft OS feature descriptors
    pub(super) fn ms_os_request(
        &mut self,
        drivers: &mut [&mut dyn ClassDriver<B>],
        setup: &SetupPacket,
    ) -> bool {
        let config_nbr = self.active_config.unwrap_or(0);
        if self.configurations.get(config_nbr as usize).is_none() {
            return false;
        }
        let drivers: &[&mut dyn ClassDriver<B>] = drivers;
        if setup.index == MS_OS_COMPAT_ID_INDEX {
            self.respond_with(|usb, w| {
                let config = &usb.configurations[config_nbr as usize];
                let functions = config
                    .interfaces
                    .iter()
                    .enumerate()
                    .filter_map(|(if_nbr, interface)| {
                        let driver = find_driver_ref(drivers, interface.driver?)?;
                        let id = driver.ms_compat_id(interface.class_arg)?;
                        Some((if_nbr as u8, id))
                    });
                write_ms_compat_id(w, functions).map(|_| true)
            })
        } else {
            let if_nbr = setup.value as u8;
            self.respond_with(|usb, w| {
                let config = &usb.configurations[config_nbr as usize];
                let Some(interface) = config.interfaces.get(if_nbr as usize) else {
                    return Ok(false);
                };
                let properties = interface
                    .driver
                    .and_then(|id| find_driver_ref(drivers, id))
                    .map(|driver| driver.ms_ext_properties(interface.class_arg))
                    .unwrap_or(&[]);
                write_ms_ext_properties(w, properties).map(|_| true)
            })
        }
    }
}
