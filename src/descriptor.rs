//! Descriptor buffer writer and standard descriptor layouts

use crate::{Error, Result};

/// Descriptor type codes
pub mod descriptor_type {
    pub const DEVICE: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const INTERFACE: u8 = 0x04;
    pub const ENDPOINT: u8 = 0x05;
    pub const DEVICE_QUALIFIER: u8 = 0x06;
    pub const OTHER_SPEED_CONFIGURATION: u8 = 0x07;
    pub const INTERFACE_ASSOCIATION: u8 = 0x0B;
    /// Class-specific interface descriptor.
    pub const CS_INTERFACE: u8 = 0x24;
    /// Class-specific endpoint descriptor.
    pub const CS_ENDPOINT: u8 = 0x25;
}

pub(crate) const MANUFACTURER_STRING: u8 = 1;
pub(crate) const PRODUCT_STRING: u8 = 2;
pub(crate) const SERIAL_NUMBER_STRING: u8 = 3;
/// String index reserved for the Microsoft OS string descriptor.
pub(crate) const MS_OS_STRING: u8 = 0xEE;

/// Microsoft OS descriptor index for the extended compat ID descriptor.
pub const MS_OS_COMPAT_ID_INDEX: u16 = 0x0004;
/// Microsoft OS descriptor index for the extended properties descriptor.
pub const MS_OS_EXT_PROPERTIES_INDEX: u16 = 0x0005;

/// Sequential, little-endian writer over a descriptor buffer
///
/// Class drivers receive a writer while the core builds a configuration
/// descriptor, and append their class-specific descriptors with it.
/// Writes that don't fit fail with [`Error::AllocationFailed`] and leave
/// the buffer untouched.
pub struct DescriptorWriter<'a> {
    buf: &'a mut [u8],
    position: usize,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        DescriptorWriter { buf, position: 0 }
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write the low 24 bits of `value`
    pub fn write_u24(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes()[..3])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.position + bytes.len();
        let dst = self
            .buf
            .get_mut(self.position..end)
            .ok_or(Error::AllocationFailed)?;
        dst.copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    /// Write a complete descriptor, prefixed with its length and type
    pub fn write_descriptor(&mut self, descriptor_type: u8, body: &[u8]) -> Result<()> {
        let length = body.len() + 2;
        if length > u8::MAX as usize {
            return Err(Error::InvalidParameter);
        }
        if self.position + length > self.buf.len() {
            return Err(Error::AllocationFailed);
        }
        self.write_u8(length as u8)?;
        self.write_u8(descriptor_type)?;
        self.write_bytes(body)
    }

    /// Overwrite a `u16` that was already written at `offset`
    pub(crate) fn patch_u16(&mut self, offset: usize, value: u16) -> Result<()> {
        if offset + 2 > self.position {
            return Err(Error::InvalidParameter);
        }
        let bytes = value.to_le_bytes();
        self.buf[offset..offset + 2].copy_from_slice(&bytes);
        Ok(())
    }

    /// Write a string descriptor, encoding `string` as UTF-16LE
    pub fn write_string(&mut self, string: &str) -> Result<()> {
        let length = 2 + 2 * string.encode_utf16().count();
        if length > u8::MAX as usize {
            return Err(Error::InvalidParameter);
        }
        if self.position + length > self.buf.len() {
            return Err(Error::AllocationFailed);
        }
        self.write_u8(length as u8)?;
        self.write_u8(descriptor_type::STRING)?;
        for unit in string.encode_utf16() {
            self.write_u16(unit)?;
        }
        Ok(())
    }
}

/// Encode an interval in the `log2(interval) + 1` form
///
/// `interval` must be a power of two.
pub(crate) fn exponent_interval(interval: u16) -> u8 {
    interval.trailing_zeros() as u8 + 1
}

/// The extended compat ID section for one function
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsCompatId {
    pub compatible_id: [u8; 8],
    pub sub_compatible_id: [u8; 8],
}

impl MsCompatId {
    /// Bind the function to the WinUSB driver
    pub const WINUSB: MsCompatId = MsCompatId {
        compatible_id: *b"WINUSB\0\0",
        sub_compatible_id: [0; 8],
    };
}

/// Registry value types for Microsoft OS extended properties
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
#[repr(u32)]
pub enum MsPropertyType {
    /// NULL-terminated Unicode string
    Sz = 1,
    /// NULL-terminated Unicode string with environment variables
    ExpandSz = 2,
    /// Free-form binary
    Binary = 3,
    /// Little-endian 32-bit integer
    DwordLittleEndian = 4,
    /// Big-endian 32-bit integer
    DwordBigEndian = 5,
    /// NULL-terminated Unicode symbolic link
    Link = 6,
    /// Multiple NULL-terminated Unicode strings
    MultiSz = 7,
}

/// One Microsoft OS extended property
///
/// `name` is encoded as a NULL-terminated UTF-16LE string. `data` is copied
/// as-is; for string types, supply the UTF-16LE encoded value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsExtProperty {
    pub property_type: MsPropertyType,
    pub name: &'static str,
    pub data: &'static [u8],
}

impl MsExtProperty {
    fn name_length(&self) -> usize {
        2 * (self.name.encode_utf16().count() + 1)
    }

    fn section_length(&self) -> usize {
        4 + 4 + 2 + self.name_length() + 4 + self.data.len()
    }
}

/// Write the "MSFT100" OS string descriptor
pub(crate) fn write_ms_os_string(w: &mut DescriptorWriter, vendor_code: u8) -> Result<()> {
    let start = w.position();
    w.write_string("MSFT100")?;
    // The string length byte accounts for the two extra bytes.
    w.write_u8(vendor_code)?;
    w.write_u8(0)?;
    let length = (w.position() - start) as u8;
    w.buf[start] = length;
    Ok(())
}

/// Write an extended compat ID descriptor
///
/// `functions` yields the first interface number of each function, and its
/// compat ID.
pub(crate) fn write_ms_compat_id(
    w: &mut DescriptorWriter,
    functions: impl Iterator<Item = (u8, MsCompatId)> + Clone,
) -> Result<()> {
    let count = functions.clone().count();
    let length = 16 + 24 * count;
    w.write_u32(length as u32)?;
    w.write_u16(0x0100)?;
    w.write_u16(MS_OS_COMPAT_ID_INDEX)?;
    w.write_u8(count as u8)?;
    w.write_bytes(&[0; 7])?;
    for (interface, id) in functions {
        w.write_u8(interface)?;
        w.write_u8(0x01)?;
        w.write_bytes(&id.compatible_id)?;
        w.write_bytes(&id.sub_compatible_id)?;
        w.write_bytes(&[0; 6])?;
    }
    Ok(())
}

/// Write an extended properties descriptor
pub(crate) fn write_ms_ext_properties(
    w: &mut DescriptorWriter,
    properties: &[MsExtProperty],
) -> Result<()> {
    let length = 10 + properties
        .iter()
        .map(MsExtProperty::section_length)
        .sum::<usize>();
    w.write_u32(length as u32)?;
    w.write_u16(0x0100)?;
    w.write_u16(MS_OS_EXT_PROPERTIES_INDEX)?;
    w.write_u16(properties.len() as u16)?;
    for property in properties {
        w.write_u32(property.section_length() as u32)?;
        w.write_u32(property.property_type as u32)?;
        w.write_u16(property.name_length() as u16)?;
        for unit in property.name.encode_utf16() {
            w.write_u16(unit)?;
        }
        w.write_u16(0)?;
        w.write_u32(property.data.len() as u32)?;
        w.write_bytes(property.data)?;
    }
    Ok(())
}
