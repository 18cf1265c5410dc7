//! ATA/IDE disk driver (PIO mode)
//!
//! Polled sector reads from an ATA drive, one sector per command.
//!
//! **Supported:**
//! - Any bus base (primary 0x1F0 by default)
//! - Master drive
//! - 28-bit LBA addressing
//! - Read operations
//!
//! There are no timeouts and no error-bit checks: a drive that never reports
//! ready hangs the boot, which is all the reporting a first-stage loader can do.

use crate::block_device::{BlockDevice, Sector};
use crate::config::{ATA_PRIMARY_BASE, SECTOR_SIZE};
use x86_64::instructions::port::Port;

/// ATA command codes
const ATA_CMD_READ_SECTORS: u8 = 0x20;

/// LBA mode, master drive (bits 7 and 5 are obsolete and kept set)
const ATA_DRIVE_LBA_MASTER: u8 = 0xE0;

/// Words moved per sector through the 32-bit data port
const DWORDS_PER_SECTOR: usize = SECTOR_SIZE / 4;

bitflags::bitflags! {
    /// ATA status register bits
    pub struct AtaStatus: u8 {
        /// Busy
        const BSY  = 0x80;
        /// Drive ready
        const DRDY = 0x40;
        /// Drive fault
        const DF   = 0x20;
        /// Data request ready
        const DRQ  = 0x08;
        /// Error
        const ERR  = 0x01;
    }
}

impl AtaStatus {
    /// Ready means DRDY set and BSY clear; the other bits are ignored
    pub fn is_ready(&self) -> bool {
        (*self & (Self::BSY | Self::DRDY)) == Self::DRDY
    }
}

/// Task-file registers the loader writes, as offsets from the bus base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AtaRegister {
    SectorCount = 2,
    LbaLow = 3,
    LbaMid = 4,
    LbaHigh = 5,
    Drive = 6,
    Command = 7,
}

/// Register-level access to one ATA bus
///
/// Real hardware goes through I/O ports; tests plug in an emulated register
/// file so the protocol itself can be checked.
pub trait AtaBus {
    /// Read the status register (base + 7)
    fn status(&mut self) -> AtaStatus;

    /// Write one task-file register
    fn write_register(&mut self, register: AtaRegister, value: u8);

    /// Read the next 32-bit word from the data register (base + 0)
    fn read_data(&mut self) -> u32;
}

/// ATA bus reached through x86 I/O ports
pub struct PortBus {
    data: Port<u32>,
    sector_count: Port<u8>,
    lba_low: Port<u8>,
    lba_mid: Port<u8>,
    lba_high: Port<u8>,
    drive: Port<u8>,
    status_command: Port<u8>,
}

impl PortBus {
    /// Create a bus handle (doesn't touch the hardware)
    pub const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            sector_count: Port::new(base + AtaRegister::SectorCount as u16),
            lba_low: Port::new(base + AtaRegister::LbaLow as u16),
            lba_mid: Port::new(base + AtaRegister::LbaMid as u16),
            lba_high: Port::new(base + AtaRegister::LbaHigh as u16),
            drive: Port::new(base + AtaRegister::Drive as u16),
            status_command: Port::new(base + AtaRegister::Command as u16),
        }
    }

    pub const fn primary() -> Self {
        Self::new(ATA_PRIMARY_BASE)
    }
}

impl AtaBus for PortBus {
    fn status(&mut self) -> AtaStatus {
        // SAFETY: reading the status register has no side effects beyond
        // acknowledging a pending interrupt, and interrupts are off.
        AtaStatus::from_bits_truncate(unsafe { self.status_command.read() })
    }

    fn write_register(&mut self, register: AtaRegister, value: u8) {
        let port = match register {
            AtaRegister::SectorCount => &mut self.sector_count,
            AtaRegister::LbaLow => &mut self.lba_low,
            AtaRegister::LbaMid => &mut self.lba_mid,
            AtaRegister::LbaHigh => &mut self.lba_high,
            AtaRegister::Drive => &mut self.drive,
            AtaRegister::Command => &mut self.status_command,
        };
        // SAFETY: the loader is the only user of the ATA bus at this stage.
        unsafe { port.write(value) }
    }

    fn read_data(&mut self) -> u32 {
        // SAFETY: only called after the drive has raised DRQ for a read.
        unsafe { self.data.read() }
    }
}

/// ATA disk drive driven by polled PIO
pub struct AtaPio<B: AtaBus> {
    bus: B,
}

impl AtaPio<PortBus> {
    /// Primary master drive on the standard I/O ports
    pub const fn primary_master() -> Self {
        Self::new(PortBus::primary())
    }
}

impl<B: AtaBus> AtaPio<B> {
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Give back the underlying bus
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Program the task file for a one-sector read of `lba`
    fn issue_read(&mut self, lba: u32) {
        self.bus.write_register(AtaRegister::SectorCount, 1);
        self.bus.write_register(AtaRegister::LbaLow, lba as u8);
        self.bus.write_register(AtaRegister::LbaMid, (lba >> 8) as u8);
        self.bus.write_register(AtaRegister::LbaHigh, (lba >> 16) as u8);
        self.bus.write_register(
            AtaRegister::Drive,
            ATA_DRIVE_LBA_MASTER | ((lba >> 24) & 0x0F) as u8,
        );
        self.bus.write_register(AtaRegister::Command, ATA_CMD_READ_SECTORS);
    }
}

impl<B: AtaBus> BlockDevice for AtaPio<B> {
    fn wait_ready(&mut self) {
        while !self.bus.status().is_ready() {
            core::hint::spin_loop();
        }
    }

    fn read_sector(&mut self, sector: u32, buf: &mut Sector) {
        self.wait_ready();
        self.issue_read(sector);
        self.wait_ready();

        for chunk in buf.chunks_exact_mut(4) {
            chunk.copy_from_slice(&self.bus.read_data().to_le_bytes());
        }
    }
}

// The data loop above relies on this
const _: () = assert!(DWORDS_PER_SECTOR * 4 == SECTOR_SIZE);
