//! Device-level configuration

use crate::{Error, Result};

/// USB low / full / high speed setting.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Speed {
    /// Low / full speed.
    ///
    /// Endpoint sizes and intervals are expressed in full-speed
    /// terms: 64 byte bulk packets, intervals in frames.
    LowFull,
    /// High speed.
    ///
    /// Intervals are expressed in microframes, and bulk endpoints
    /// default to 512 byte packets.
    #[default]
    High,
}

/// A millisecond counter used to time out synchronous transfers.
///
/// The counter may wrap; only differences between two readings are
/// meaningful.
pub type Clock = fn() -> u32;

/// The language ID reported in string descriptor zero (English, United States).
pub const LANGUAGE_ID_EN_US: u16 = 0x0409;

/// Static device information and descriptor strings
///
/// Build a configuration with the chained setters, then hand it to
/// [`Core::new`](crate::usbcore::Core::new).
///
/// ```
/// use usbd_classes::{DeviceConfig, Speed};
///
/// const CONFIG: DeviceConfig = DeviceConfig::new(0x5824, 0x27dd)
///     .manufacturer("imxrt-rs")
///     .product("usbd-classes")
///     .serial_number("0001")
///     .max_packet_size_0(64)
///     .speed(Speed::LowFull);
/// assert_eq!(CONFIG.vendor_id, 0x5824);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Device release number, BCD encoded.
    pub device_release: u16,
    pub manufacturer: Option<&'static str>,
    pub product: Option<&'static str>,
    pub serial_number: Option<&'static str>,
    /// Control endpoint max packet size. One of 8, 16, 32, or 64.
    pub max_packet_size_0: u8,
    pub speed: Speed,
    /// When set, the device answers the Microsoft OS string descriptor
    /// request, and treats vendor requests with this code as Microsoft OS
    /// descriptor requests.
    pub ms_os_vendor_code: Option<u8>,
}

impl DeviceConfig {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        DeviceConfig {
            vendor_id,
            product_id,
            device_release: 0x0100,
            manufacturer: None,
            product: None,
            serial_number: None,
            max_packet_size_0: 64,
            speed: Speed::High,
            ms_os_vendor_code: None,
        }
    }

    pub const fn device_release(mut self, bcd: u16) -> Self {
        self.device_release = bcd;
        self
    }

    pub const fn manufacturer(mut self, manufacturer: &'static str) -> Self {
        self.manufacturer = Some(manufacturer);
        self
    }

    pub const fn product(mut self, product: &'static str) -> Self {
        self.product = Some(product);
        self
    }

    pub const fn serial_number(mut self, serial_number: &'static str) -> Self {
        self.serial_number = Some(serial_number);
        self
    }

    pub const fn max_packet_size_0(mut self, max_packet_size: u8) -> Self {
        self.max_packet_size_0 = max_packet_size;
        self
    }

    pub const fn speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub const fn ms_os_vendor_code(mut self, vendor_code: u8) -> Self {
        self.ms_os_vendor_code = Some(vendor_code);
        self
    }

    /// Check the configuration for values the USB specification forbids.
    pub(crate) fn validate(&self) -> Result<()> {
        if !matches!(self.max_packet_size_0, 8 | 16 | 32 | 64) {
            return Err(Error::InvalidParameter);
        }
        if self.speed == Speed::High && self.max_packet_size_0 != 64 {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }

    /// Returns the string for a descriptor index, if the index names one
    /// of the device strings.
    pub(crate) fn string(&self, index: u8) -> Option<&'static str> {
        match index {
            crate::descriptor::MANUFACTURER_STRING => self.manufacturer,
            crate::descriptor::PRODUCT_STRING => self.product,
            crate::descriptor::SERIAL_NUMBER_STRING => self.serial_number,
            _ => None,
        }
    }
}
