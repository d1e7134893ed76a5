//! Endpoint number allocation

use usb_device::{endpoint::EndpointAddress, UsbDirection};

use crate::{Error, Result};

/// Number of endpoint numbers, per direction, the core manages
pub(crate) const ENDPOINT_NUMBERS: u8 = (crate::MAX_ENDPOINTS / 2) as u8;

/// Helper type to allocate endpoint numbers
///
/// Endpoint numbers are handed out in increasing order, separately for
/// each direction. EP0 is never handed out by [`next`](AddressAllocator::next);
/// the control endpoints are reserved explicitly.
#[derive(Debug)]
pub(crate) struct AddressAllocator {
    mask_out: u8,
    mask_in: u8,
}

impl AddressAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            mask_out: 0,
            mask_in: 0,
        }
    }

    fn mask(&self, dir: UsbDirection) -> u8 {
        match dir {
            UsbDirection::In => self.mask_in,
            UsbDirection::Out => self.mask_out,
        }
    }

    fn mask_mut(&mut self, dir: UsbDirection) -> &mut u8 {
        match dir {
            UsbDirection::In => &mut self.mask_in,
            UsbDirection::Out => &mut self.mask_out,
        }
    }

    pub(crate) fn is_available(&self, number: u8, dir: UsbDirection) -> bool {
        number < ENDPOINT_NUMBERS && self.mask(dir) & (1 << number) == 0
    }

    /// Allocate the next free endpoint number for `dir`
    pub(crate) fn next(&mut self, dir: UsbDirection) -> Option<u8> {
        let mask = self.mask_mut(dir);
        // EP0 can only be reserved
        let number = (*mask | 1).trailing_ones();
        if number >= ENDPOINT_NUMBERS as u32 {
            return None;
        }
        *mask |= 1 << number;
        Some(number as u8)
    }

    pub(crate) fn reserve(&mut self, number: u8, dir: UsbDirection) {
        *self.mask_mut(dir) |= 1 << number;
    }

    /// Number of endpoint numbers [`next`](AddressAllocator::next) can still
    /// hand out for `dir`
    pub(crate) fn free(&self, dir: UsbDirection) -> usize {
        (1..ENDPOINT_NUMBERS)
            .filter(|&number| self.is_available(number, dir))
            .count()
    }

    /// Allocate an endpoint address in the given direction
    pub(crate) fn allocate(&mut self, dir: UsbDirection) -> Result<EndpointAddress> {
        let number = self.next(dir).ok_or(Error::AllocationFailed)?;
        Ok(EndpointAddress::from_parts(number as usize, dir))
    }
}

/// Produces an index into the endpoint table
pub(crate) fn index(ep_addr: EndpointAddress) -> usize {
    (ep_addr.index() * 2) + (UsbDirection::In == ep_addr.direction()) as usize
}

#[cfg(test)]
mod tests {
    use super::{index, AddressAllocator, ENDPOINT_NUMBERS};
    use crate::Error;
    use usb_device::{endpoint::EndpointAddress, UsbDirection};

    const OUT: UsbDirection = UsbDirection::Out;
    const IN: UsbDirection = UsbDirection::In;

    #[test]
    fn address_allocator() {
        let mut addr = AddressAllocator::new();
        for number in 1..ENDPOINT_NUMBERS {
            assert!(addr.is_available(number, OUT));
            assert_eq!(addr.next(OUT).unwrap(), number);
            assert!(!addr.is_available(number, OUT));
        }
        for number in 1..ENDPOINT_NUMBERS {
            assert!(addr.is_available(number, IN));
            assert_eq!(addr.next(IN).unwrap(), number);
            assert!(!addr.is_available(number, IN));
        }

        assert!(addr.next(OUT).is_none());
        assert!(addr.next(IN).is_none());

        assert!(addr.is_available(0, OUT));
        addr.reserve(0, OUT);
        assert!(!addr.is_available(0, OUT));

        assert!(addr.is_available(0, IN));
        addr.reserve(0, IN);
        assert!(!addr.is_available(0, IN));

        assert!(addr.next(OUT).is_none());
        assert!(addr.next(IN).is_none());
        assert_eq!(addr.allocate(IN), Err(Error::AllocationFailed));
    }

    #[test]
    fn allocate_addresses() {
        let mut addr = AddressAllocator::new();
        let ep = addr.allocate(IN).unwrap();
        assert_eq!(ep, EndpointAddress::from_parts(1, IN));
        let ep = addr.allocate(OUT).unwrap();
        assert_eq!(ep, EndpointAddress::from_parts(1, OUT));
        let ep = addr.allocate(IN).unwrap();
        assert_eq!(ep, EndpointAddress::from_parts(2, IN));

        // EP0 doesn't count.
        addr.reserve(0, OUT);
        assert_eq!(addr.free(IN), ENDPOINT_NUMBERS as usize - 3);
        assert_eq!(addr.free(OUT), ENDPOINT_NUMBERS as usize - 2);
    }

    #[test]
    fn endpoint_index() {
        assert_eq!(index(EndpointAddress::from_parts(0, OUT)), 0);
        assert_eq!(index(EndpointAddress::from_parts(0, IN)), 1);
        assert_eq!(index(EndpointAddress::from_parts(3, OUT)), 6);
        assert_eq!(index(EndpointAddress::from_parts(3, IN)), 7);
    }
}
