//! Control transfer SETUP packets

use usb_device::UsbDirection;

/// Standard request codes (USB 2.0, table 9-4)
pub mod standard_request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_DESCRIPTOR: u8 = 0x07;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const GET_INTERFACE: u8 = 0x0A;
    pub const SET_INTERFACE: u8 = 0x0B;
    pub const SYNCH_FRAME: u8 = 0x0C;
}

/// Standard feature selectors
pub mod feature {
    pub const ENDPOINT_HALT: u16 = 0x0000;
    pub const DEVICE_REMOTE_WAKEUP: u16 = 0x0001;
    pub const TEST_MODE: u16 = 0x0002;
}

/// The `bmRequestType` type field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// The `bmRequestType` recipient field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
    Reserved,
}

/// An 8 byte SETUP packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct SetupPacket {
    /// Raw `bmRequestType`
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub const SIZE: usize = 8;

    pub fn parse(buf: &[u8; Self::SIZE]) -> Self {
        SetupPacket {
            request_type: buf[0],
            request: buf[1],
            value: u16::from_le_bytes([buf[2], buf[3]]),
            index: u16::from_le_bytes([buf[4], buf[5]]),
            length: u16::from_le_bytes([buf[6], buf[7]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let [v0, v1] = self.value.to_le_bytes();
        let [i0, i1] = self.index.to_le_bytes();
        let [l0, l1] = self.length.to_le_bytes();
        [self.request_type, self.request, v0, v1, i0, i1, l0, l1]
    }

    /// Direction of the data stage; `Out` for requests without data.
    pub fn direction(&self) -> UsbDirection {
        if self.request_type & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    pub fn kind(&self) -> RequestKind {
        match (self.request_type >> 5) & 0b11 {
            0 => RequestKind::Standard,
            1 => RequestKind::Class,
            2 => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0b1_1111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }

    /// The interface number addressed by an interface-recipient request
    pub fn interface_number(&self) -> u8 {
        self.index as u8
    }

    /// The descriptor type and index of a `GET_DESCRIPTOR` request
    pub fn descriptor(&self) -> (u8, u8) {
        ((self.value >> 8) as u8, self.value as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::{Recipient, RequestKind, SetupPacket};
    use usb_device::UsbDirection;

    #[test]
    fn parse_class_interface_request() {
        // SET_LINE_CODING to interface 2, 7 bytes
        let setup = SetupPacket::parse(&[0x21, 0x20, 0x00, 0x00, 0x02, 0x00, 0x07, 0x00]);
        assert_eq!(setup.direction(), UsbDirection::Out);
        assert_eq!(setup.kind(), RequestKind::Class);
        assert_eq!(setup.recipient(), Recipient::Interface);
        assert_eq!(setup.request, 0x20);
        assert_eq!(setup.interface_number(), 2);
        assert_eq!(setup.length, 7);
    }

    #[test]
    fn parse_standard_device_request() {
        // GET_DESCRIPTOR(CONFIGURATION, 0), 255 bytes
        let bytes = [0x80, 0x06, 0x00, 0x02, 0x00, 0x00, 0xFF, 0x00];
        let setup = SetupPacket::parse(&bytes);
        assert_eq!(setup.direction(), UsbDirection::In);
        assert_eq!(setup.kind(), RequestKind::Standard);
        assert_eq!(setup.recipient(), Recipient::Device);
        assert_eq!(setup.descriptor(), (0x02, 0x00));
        assert_eq!(setup.to_bytes(), bytes);
    }

    #[test]
    fn vendor_and_reserved() {
        let setup = SetupPacket::parse(&[0xC1, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(setup.kind(), RequestKind::Vendor);
        assert_eq!(setup.recipient(), Recipient::Interface);
        let setup = SetupPacket::parse(&[0x64, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(setup.kind(), RequestKind::Reserved);
        assert_eq!(setup.recipient(), Recipient::Reserved);
    }
}
