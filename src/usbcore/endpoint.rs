//! Endpoint transfers
//!
//! Synchronous and asynchronous transfers for all four transfer types.
//! The bus moves single packets; this module splits and joins packets, adds
//! zero length packets, tracks timeouts, and completes asynchronous
//! transfers.

use heapless::Vec;
use usb_device::{
    bus::UsbBus,
    endpoint::{EndpointAddress, EndpointType, IsochronousSynchronizationType, IsochronousUsageType},
    UsbDirection, UsbError,
};

use super::{allocator::index, find_driver, Core};
use crate::{
    class::{ClassDriver, DriverId, TransferComplete},
    Error, Result, Speed, ASYNC_BUFFER_SIZE, MAX_ENDPOINTS, MAX_PACKET_SIZE,
};

/// USB transfer types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl TransferType {
    pub(crate) fn endpoint_type(self) -> EndpointType {
        match self {
            TransferType::Control => EndpointType::Control,
            TransferType::Isochronous => EndpointType::Isochronous {
                synchronization: IsochronousSynchronizationType::NoSynchronization,
                usage: IsochronousUsageType::Data,
            },
            TransferType::Bulk => EndpointType::Bulk,
            TransferType::Interrupt => EndpointType::Interrupt,
        }
    }

    /// Endpoint descriptor `bmAttributes`
    pub(crate) fn attributes(self) -> u8 {
        match self {
            TransferType::Control => 0b00,
            TransferType::Isochronous => 0b01,
            TransferType::Bulk => 0b10,
            TransferType::Interrupt => 0b11,
        }
    }
}

/// Check endpoint parameters against the configuration speed
///
/// Returns the max packet size, replacing 0 with the largest legal size.
pub(crate) fn validate(
    kind: TransferType,
    speed: Speed,
    max_packet_size: u16,
    transactions: u8,
    interval: u16,
) -> Result<u16> {
    let largest = match (kind, speed) {
        (TransferType::Control, _) => return Err(Error::InvalidParameter),
        (TransferType::Bulk, Speed::LowFull) => 64,
        (TransferType::Bulk, Speed::High) => 512,
        (TransferType::Interrupt, Speed::LowFull) => 64,
        (TransferType::Interrupt, Speed::High) => 1024,
        (TransferType::Isochronous, Speed::LowFull) => 1023,
        (TransferType::Isochronous, Speed::High) => 1024,
    };
    let max_packet_size = match max_packet_size {
        0 => largest,
        mps if mps > largest => return Err(Error::InvalidParameter),
        mps => mps,
    };
    if kind == TransferType::Bulk && speed == Speed::High && max_packet_size != 512 {
        return Err(Error::InvalidParameter);
    }
    if kind == TransferType::Bulk && !matches!(max_packet_size, 8 | 16 | 32 | 64 | 512) {
        return Err(Error::InvalidParameter);
    }

    match kind {
        TransferType::Isochronous => {
            let transactions_ok = match speed {
                Speed::High => (1..=3).contains(&transactions),
                Speed::LowFull => transactions <= 1,
            };
            if !transactions_ok || !interval.is_power_of_two() {
                return Err(Error::InvalidParameter);
            }
        }
        TransferType::Interrupt => {
            let interval_ok = match speed {
                Speed::LowFull => (1..=255).contains(&interval),
                Speed::High => interval.is_power_of_two(),
            };
            if !interval_ok {
                return Err(Error::InvalidParameter);
            }
        }
        _ => {}
    }
    Ok(max_packet_size)
}

/// Static information about an allocated endpoint
#[derive(Clone, Copy, Debug)]
pub(crate) struct EndpointInfo {
    pub(crate) kind: TransferType,
    pub(crate) max_packet_size: u16,
    pub(crate) transactions: u8,
    /// Interval in frames or microframes
    pub(crate) interval: u16,
    pub(crate) config: u8,
    pub(crate) interface: u8,
    pub(crate) alt: u8,
}

/// The driver that receives a transfer's completion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Owner {
    pub(crate) driver: DriverId,
    pub(crate) class_arg: usize,
}

/// An asynchronous transfer
#[derive(Debug)]
pub(crate) struct Transfer {
    owner: Option<Owner>,
    arg: usize,
    /// IN: the data to send. OUT: the data received so far.
    buf: Vec<u8, ASYNC_BUFFER_SIZE>,
    /// OUT: the number of bytes the reader asked for
    requested: usize,
    /// IN: bytes acknowledged by the host
    progress: usize,
    /// IN: a zero length packet is still owed
    zlp: bool,
    /// IN: length of the packet handed to the bus
    in_flight: Option<usize>,
    status: Option<Result<()>>,
}

#[derive(Debug, Default)]
pub(crate) struct EndpointSlot {
    pub(crate) info: Option<EndpointInfo>,
    pub(crate) transfer: Option<Transfer>,
}

/// Timeout tracking for synchronous transfers
#[derive(Clone, Copy)]
struct Deadline {
    start: u32,
    timeout_ms: u32,
}

impl Deadline {
    fn expired(&self, now: u32) -> bool {
        self.timeout_ms != 0 && now.wrapping_sub(self.start) >= self.timeout_ms
    }
}

fn address_of(idx: usize) -> EndpointAddress {
    let dir = if idx % 2 == 1 {
        UsbDirection::In
    } else {
        UsbDirection::Out
    };
    EndpointAddress::from_parts(idx / 2, dir)
}

impl<B: UsbBus> Core<B> {
    fn deadline(&self, timeout_ms: u32) -> Deadline {
        Deadline {
            start: (self.clock)(),
            timeout_ms,
        }
    }

    /// Poll the bus while waiting on a synchronous transfer
    ///
    /// Fails if the device reset, if a new SETUP interrupts a control
    /// transfer, or if the deadline passed.
    fn wait(&mut self, ep: EndpointAddress, deadline: Deadline) -> Result<()> {
        if self.events.reset {
            return Err(Error::Aborted);
        }
        if ep.index() == 0 && self.events.setup & 1 != 0 {
            return Err(Error::Aborted);
        }
        if deadline.expired((self.clock)()) {
            return Err(Error::Timeout);
        }
        self.pump();
        Ok(())
    }

    fn write_packet(
        &mut self,
        ep: EndpointAddress,
        packet: &[u8],
        deadline: Deadline,
    ) -> Result<()> {
        loop {
            match self.bus.write(ep, packet) {
                Ok(_) => break,
                Err(UsbError::WouldBlock) => self.wait(ep, deadline)?,
                Err(err) => {
                    warn!("EP{} WRITE {:?}", ep.index(), err);
                    return Err(err.into());
                }
            }
        }
        let bit = 1u16 << ep.index();
        loop {
            if self.events.in_complete & bit != 0 {
                self.events.in_complete &= !bit;
                return Ok(());
            }
            self.wait(ep, deadline)?;
        }
    }

    fn read_packet(
        &mut self,
        ep: EndpointAddress,
        packet: &mut [u8],
        deadline: Deadline,
    ) -> Result<usize> {
        let bit = 1u16 << ep.index();
        loop {
            if ep.index() == 0 && self.events.setup & 1 != 0 {
                return Err(Error::Aborted);
            }
            if self.events.out & bit != 0 {
                let result = self.bus.read(ep, packet);
                self.events.out &= !bit;
                match result {
                    Ok(len) => return Ok(len),
                    Err(UsbError::WouldBlock) => {}
                    Err(err) => {
                        warn!("EP{} READ {:?}", ep.index(), err);
                        return Err(err.into());
                    }
                }
            }
            self.wait(ep, deadline)?;
        }
    }

    /// Send `data` as max packet size chunks, then an optional zero length
    /// packet. Empty `data` is sent as one zero length packet.
    fn write_sync(
        &mut self,
        ep: EndpointAddress,
        mps: usize,
        data: &[u8],
        zlp: bool,
        timeout_ms: u32,
    ) -> Result<usize> {
        let deadline = self.deadline(timeout_ms);
        // Forget completions left over from earlier transfers.
        self.events.in_complete &= !(1u16 << ep.index());

        let mut sent = 0;
        loop {
            let end = data.len().min(sent + mps);
            self.write_packet(ep, &data[sent..end], deadline)?;
            sent = end;
            if sent == data.len() {
                break;
            }
        }
        if zlp && !data.is_empty() {
            self.write_packet(ep, &[], deadline)?;
        }
        Ok(sent)
    }

    /// Receive into `buf` until the buffer is full, or until a short packet
    fn read_sync(
        &mut self,
        ep: EndpointAddress,
        mps: usize,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let deadline = self.deadline(timeout_ms);
        let mut packet = [0; MAX_PACKET_SIZE];
        let mut received = 0;
        loop {
            let len = self.read_packet(ep, &mut packet[..mps], deadline)?;
            let remaining = buf.len() - received;
            if len > remaining {
                buf[received..].copy_from_slice(&packet[..remaining]);
                return Err(Error::Bus(UsbError::BufferOverflow));
            }
            buf[received..received + len].copy_from_slice(&packet[..len]);
            received += len;
            if len < mps || received == buf.len() {
                return Ok(received);
            }
        }
    }

    /// Validate a transfer request, returning the endpoint's max packet size
    fn check_transfer(
        &self,
        ep: EndpointAddress,
        kind: TransferType,
        dir: UsbDirection,
    ) -> Result<usize> {
        if ep.direction() != dir {
            return Err(Error::InvalidParameter);
        }
        let info = self
            .endpoints
            .get(index(ep))
            .and_then(|slot| slot.info.as_ref())
            .ok_or(Error::InvalidParameter)?;
        if info.kind != kind {
            return Err(Error::InvalidParameter);
        }
        if kind != TransferType::Control {
            if self.active_config != Some(info.config) {
                return Err(Error::InvalidState);
            }
            let config = &self.configurations[info.config as usize];
            if config.interfaces[info.interface as usize].active_alt != info.alt {
                return Err(Error::InvalidState);
            }
        }
        Ok(info.max_packet_size as usize)
    }

    fn owner_of(&self, ep: EndpointAddress) -> Option<Owner> {
        if ep.index() == 0 {
            return self.control.as_ref().and_then(|control| control.owner);
        }
        let info = self.endpoints[index(ep)].info.as_ref()?;
        let config = &self.configurations[info.config as usize];
        let interface = &config.interfaces[info.interface as usize];
        interface.driver.map(|driver| Owner {
            driver,
            class_arg: interface.class_arg,
        })
    }

    fn arm_write(
        &mut self,
        ep: EndpointAddress,
        kind: TransferType,
        data: &[u8],
        arg: usize,
        zlp: bool,
    ) -> Result<()> {
        let mps = self.check_transfer(ep, kind, UsbDirection::In)?;
        if self.endpoints[index(ep)].transfer.is_some() {
            return Err(Error::NotReady);
        }
        let buf = Vec::from_slice(data).map_err(|_| Error::InvalidParameter)?;
        let transfer = Transfer {
            owner: self.owner_of(ep),
            arg,
            buf,
            requested: data.len(),
            progress: 0,
            zlp: data.is_empty() || (zlp && data.len() % mps == 0),
            in_flight: None,
            status: None,
        };
        self.endpoints[index(ep)].transfer = Some(transfer);
        self.events.in_complete &= !(1u16 << ep.index());
        self.kick_in(ep);
        Ok(())
    }

    fn arm_read(
        &mut self,
        ep: EndpointAddress,
        kind: TransferType,
        len: usize,
        arg: usize,
    ) -> Result<()> {
        self.check_transfer(ep, kind, UsbDirection::Out)?;
        if len > ASYNC_BUFFER_SIZE {
            return Err(Error::InvalidParameter);
        }
        if self.endpoints[index(ep)].transfer.is_some() {
            return Err(Error::NotReady);
        }
        self.endpoints[index(ep)].transfer = Some(Transfer {
            owner: self.owner_of(ep),
            arg,
            buf: Vec::new(),
            requested: len,
            progress: 0,
            zlp: false,
            in_flight: None,
            status: None,
        });
        Ok(())
    }

    /// Hand the next packet of an IN transfer to the bus
    fn kick_in(&mut self, ep: EndpointAddress) {
        let idx = index(ep);
        let mps = match self.endpoints[idx].info {
            Some(info) => info.max_packet_size as usize,
            None => return,
        };
        let Some(xfer) = self.endpoints[idx].transfer.as_mut() else {
            return;
        };
        if xfer.status.is_some() || xfer.in_flight.is_some() {
            return;
        }
        let (start, end) = if xfer.progress < xfer.buf.len() {
            (xfer.progress, xfer.buf.len().min(xfer.progress + mps))
        } else if xfer.zlp {
            (xfer.progress, xfer.progress)
        } else {
            xfer.status = Some(Ok(()));
            return;
        };
        match self.bus.write(ep, &xfer.buf[start..end]) {
            Ok(_) => xfer.in_flight = Some(end - start),
            Err(UsbError::WouldBlock) => {}
            Err(err) => {
                warn!("EP{} WRITE {:?}", ep.index(), err);
                xfer.status = Some(Err(err.into()));
            }
        }
    }

    /// The host acknowledged an IN packet
    pub(super) fn advance_in(&mut self, ep: EndpointAddress) {
        if let Some(xfer) = self.endpoints[index(ep)].transfer.as_mut() {
            if let Some(len) = xfer.in_flight.take() {
                if len == 0 {
                    xfer.zlp = false;
                }
                xfer.progress += len;
            }
        }
        self.kick_in(ep);
    }

    /// An OUT packet arrived for an armed transfer
    pub(super) fn advance_out(&mut self, ep: EndpointAddress) {
        let idx = index(ep);
        let mps = match self.endpoints[idx].info {
            Some(info) => info.max_packet_size as usize,
            None => return,
        };
        let Some(xfer) = self.endpoints[idx].transfer.as_mut() else {
            return;
        };
        if xfer.status.is_some() {
            return;
        }
        let mut packet = [0; MAX_PACKET_SIZE];
        let result = self.bus.read(ep, &mut packet[..mps]);
        self.events.out &= !(1u16 << ep.index());
        match result {
            Ok(len) => {
                let remaining = xfer.requested - xfer.buf.len();
                let take = len.min(remaining);
                if xfer.buf.extend_from_slice(&packet[..take]).is_err() {
                    xfer.status = Some(Err(Error::AllocationFailed));
                } else if len > remaining {
                    xfer.status = Some(Err(Error::Bus(UsbError::BufferOverflow)));
                } else if len < mps || xfer.buf.len() == xfer.requested {
                    xfer.status = Some(Ok(()));
                }
            }
            Err(UsbError::WouldBlock) => {}
            Err(err) => {
                warn!("EP{} READ {:?}", ep.index(), err);
                xfer.status = Some(Err(err.into()));
            }
        }
    }

    /// Retry IN transfers that the bus couldn't accept earlier
    pub(super) fn retry_in_transfers(&mut self) {
        for idx in (1..MAX_ENDPOINTS).step_by(2) {
            let waiting = matches!(&self.endpoints[idx].transfer,
                Some(xfer) if xfer.status.is_none() && xfer.in_flight.is_none());
            if waiting {
                self.kick_in(address_of(idx));
            }
        }
    }

    /// Report finished transfers to their drivers
    pub(super) fn deliver_completions(&mut self, drivers: &mut [&mut dyn ClassDriver<B>]) {
        for idx in 0..MAX_ENDPOINTS {
            let status = match &self.endpoints[idx].transfer {
                Some(Transfer {
                    status: Some(status),
                    ..
                }) => *status,
                _ => continue,
            };
            let Some(xfer) = self.endpoints[idx].transfer.take() else {
                continue;
            };
            let endpoint = address_of(idx);

            // The status stage of a class control write follows its data.
            if idx == 0 && status.is_ok() {
                self.send_control_status();
            }

            let Some(owner) = xfer.owner else {
                trace!("EP{} COMPLETE, NO OWNER", endpoint.index());
                continue;
            };
            let (requested, transferred) = match endpoint.direction() {
                UsbDirection::In => (xfer.buf.len(), xfer.progress.min(xfer.buf.len())),
                UsbDirection::Out => (xfer.requested, xfer.buf.len()),
            };
            let complete = TransferComplete {
                endpoint,
                buf: &xfer.buf,
                requested,
                transferred,
                arg: xfer.arg,
                status,
            };
            match find_driver(drivers, owner.driver) {
                Some(driver) => driver.transfer_complete(self, owner.class_arg, &complete),
                None => warn!("DRIVER {} MISSING", owner.driver.0),
            }
        }
    }

    /// Mark the transfer on an endpoint table index as aborted
    pub(super) fn abort_index(&mut self, idx: usize) {
        if let Some(xfer) = self.endpoints[idx].transfer.as_mut() {
            if xfer.status.is_none() {
                xfer.status = Some(Err(Error::Aborted));
                xfer.in_flight = None;
            }
        }
    }

    pub(super) fn abort_all(&mut self) {
        for idx in 0..MAX_ENDPOINTS {
            self.abort_index(idx);
        }
    }

    fn endpoint_info(&self, ep: EndpointAddress) -> Result<&EndpointInfo> {
        self.endpoints
            .get(index(ep))
            .and_then(|slot| slot.info.as_ref())
            .ok_or(Error::InvalidParameter)
    }

    /// Abort the asynchronous transfer on an endpoint
    ///
    /// The owner sees the transfer complete with [`Error::Aborted`] on the
    /// next `poll()`. Succeeds if there's nothing to abort.
    pub fn abort_endpoint(&mut self, ep: EndpointAddress) -> Result<()> {
        self.endpoint_info(ep)?;
        self.abort_index(index(ep));
        Ok(())
    }

    /// Indicates if an asynchronous transfer is pending on the endpoint
    pub fn is_endpoint_busy(&self, ep: EndpointAddress) -> Result<bool> {
        self.endpoint_info(ep)?;
        Ok(self.endpoints[index(ep)].transfer.is_some())
    }

    /// Set or clear the endpoint's halt condition
    pub fn stall_endpoint(&mut self, ep: EndpointAddress, stall: bool) -> Result<()> {
        self.endpoint_info(ep)?;
        if stall {
            self.abort_index(index(ep));
        }
        self.bus.set_stalled(ep, stall);
        Ok(())
    }

    pub fn is_endpoint_stalled(&self, ep: EndpointAddress) -> Result<bool> {
        self.endpoint_info(ep)?;
        Ok(self.bus.is_stalled(ep))
    }

    /// Checks the control data stage, and returns how many bytes it still
    /// allows
    fn control_stage(&self, dir: UsbDirection) -> Result<usize> {
        let control = self.control.as_ref().ok_or(Error::InvalidState)?;
        if control.setup.direction() != dir || control.setup.length == 0 {
            return Err(Error::InvalidState);
        }
        Ok(control.setup.length as usize - control.transferred)
    }

    fn control_moved(&mut self, len: usize) {
        if let Some(control) = self.control.as_mut() {
            control.transferred += len;
        }
    }

    /// Send data in the IN data stage of the control request being handled
    ///
    /// Data past the host's `wLength` is dropped. When `end` is set and the
    /// data stage ends short of `wLength` on a packet boundary, a zero length
    /// packet follows.
    pub fn write_control_sync(&mut self, data: &[u8], timeout_ms: u32, end: bool) -> Result<usize> {
        let allowed = self.control_stage(UsbDirection::In)?;
        let data = &data[..data.len().min(allowed)];
        let mps = self.config.max_packet_size_0 as usize;
        let zlp = end && data.len() < allowed && data.len() % mps == 0;
        let sent = self.write_sync(
            EndpointAddress::from_parts(0, UsbDirection::In),
            mps,
            data,
            zlp,
            timeout_ms,
        )?;
        self.control_moved(sent);
        Ok(sent)
    }

    /// Receive the OUT data stage of the control request being handled
    pub fn read_control_sync(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
        let allowed = self.control_stage(UsbDirection::Out)?;
        let len = buf.len().min(allowed);
        if len == 0 {
            return Ok(0);
        }
        let mps = self.config.max_packet_size_0 as usize;
        let received = self.read_sync(
            EndpointAddress::from_parts(0, UsbDirection::Out),
            mps,
            &mut buf[..len],
            timeout_ms,
        )?;
        self.control_moved(received);
        Ok(received)
    }

    /// Start the IN data stage of the control request being handled, and
    /// complete it from `poll()`
    pub fn write_control_async(&mut self, data: &[u8], arg: usize, end: bool) -> Result<()> {
        let allowed = self.control_stage(UsbDirection::In)?;
        let data = &data[..data.len().min(allowed)];
        let zlp = end && data.len() < allowed;
        self.arm_write(
            EndpointAddress::from_parts(0, UsbDirection::In),
            TransferType::Control,
            data,
            arg,
            zlp,
        )?;
        self.control_moved(data.len());
        Ok(())
    }

    /// Receive the OUT data stage of the control request being handled
    /// from `poll()`
    ///
    /// The status stage follows the transfer's completion.
    pub fn read_control_async(&mut self, len: usize, arg: usize) -> Result<()> {
        let allowed = self.control_stage(UsbDirection::Out)?;
        let len = len.min(allowed);
        self.arm_read(
            EndpointAddress::from_parts(0, UsbDirection::Out),
            TransferType::Control,
            len,
            arg,
        )?;
        self.control_moved(len);
        Ok(())
    }

    fn data_write_sync(
        &mut self,
        ep: EndpointAddress,
        kind: TransferType,
        data: &[u8],
        timeout_ms: u32,
        end: bool,
    ) -> Result<usize> {
        let mps = self.check_transfer(ep, kind, UsbDirection::In)?;
        if self.endpoints[index(ep)].transfer.is_some() {
            return Err(Error::NotReady);
        }
        let zlp = end && data.len() % mps == 0;
        self.write_sync(ep, mps, data, zlp, timeout_ms)
    }

    fn data_read_sync(
        &mut self,
        ep: EndpointAddress,
        kind: TransferType,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let mps = self.check_transfer(ep, kind, UsbDirection::Out)?;
        if self.endpoints[index(ep)].transfer.is_some() {
            return Err(Error::NotReady);
        }
        self.read_sync(ep, mps, buf, timeout_ms)
    }

    /// Write to a bulk IN endpoint, blocking until the host took the data
    ///
    /// A `timeout_ms` of 0 waits forever. When `end` is set, and the data
    /// fills the last packet, a zero length packet terminates the transfer.
    pub fn write_bulk_sync(
        &mut self,
        ep: EndpointAddress,
        data: &[u8],
        timeout_ms: u32,
        end: bool,
    ) -> Result<usize> {
        self.data_write_sync(ep, TransferType::Bulk, data, timeout_ms, end)
    }

    /// Read from a bulk OUT endpoint, blocking until `buf` is full or the host
    /// sends a short packet
    pub fn read_bulk_sync(
        &mut self,
        ep: EndpointAddress,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        self.data_read_sync(ep, TransferType::Bulk, buf, timeout_ms)
    }

    /// Queue a bulk IN transfer
    ///
    /// `data` is copied; it can't exceed the endpoint buffer size. The
    /// endpoint's driver receives `arg` with the completion.
    pub fn write_bulk_async(
        &mut self,
        ep: EndpointAddress,
        data: &[u8],
        arg: usize,
        end: bool,
    ) -> Result<()> {
        self.arm_write(ep, TransferType::Bulk, data, arg, end)
    }

    /// Queue a bulk OUT transfer of up to `len` bytes
    pub fn read_bulk_async(&mut self, ep: EndpointAddress, len: usize, arg: usize) -> Result<()> {
        self.arm_read(ep, TransferType::Bulk, len, arg)
    }

    pub fn write_interrupt_sync(
        &mut self,
        ep: EndpointAddress,
        data: &[u8],
        timeout_ms: u32,
        end: bool,
    ) -> Result<usize> {
        self.data_write_sync(ep, TransferType::Interrupt, data, timeout_ms, end)
    }

    pub fn read_interrupt_sync(
        &mut self,
        ep: EndpointAddress,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        self.data_read_sync(ep, TransferType::Interrupt, buf, timeout_ms)
    }

    pub fn write_interrupt_async(
        &mut self,
        ep: EndpointAddress,
        data: &[u8],
        arg: usize,
        end: bool,
    ) -> Result<()> {
        self.arm_write(ep, TransferType::Interrupt, data, arg, end)
    }

    pub fn read_interrupt_async(
        &mut self,
        ep: EndpointAddress,
        len: usize,
        arg: usize,
    ) -> Result<()> {
        self.arm_read(ep, TransferType::Interrupt, len, arg)
    }

    /// Isochronous transfers never add zero length packets.
    pub fn write_isochronous_sync(
        &mut self,
        ep: EndpointAddress,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        self.data_write_sync(ep, TransferType::Isochronous, data, timeout_ms, false)
    }

    pub fn read_isochronous_sync(
        &mut self,
        ep: EndpointAddress,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        self.data_read_sync(ep, TransferType::Isochronous, buf, timeout_ms)
    }

    pub fn write_isochronous_async(
        &mut self,
        ep: EndpointAddress,
        data: &[u8],
        arg: usize,
    ) -> Result<()> {
        self.arm_write(ep, TransferType::Isochronous, data, arg, false)
    }

    pub fn read_isochronous_async(
        &mut self,
        ep: EndpointAddress,
        len: usize,
        arg: usize,
    ) -> Result<()> {
        self.arm_read(ep, TransferType::Isochronous, len, arg)
    }
}
