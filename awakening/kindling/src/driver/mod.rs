//! # Boot Driver
//!
//! Walks the loader through its one-way state machine:
//!
//! ```text
//! Start -> Validate -> LoadSegments -> Transfer
//!             |             |
//!             +-> HaltBad <-+
//! ```
//!
//! - **Start**: stage the first sectors of the image in the scratch buffer.
//! - **Validate**: check the ELF magic at the scratch address.
//! - **LoadSegments**: place every `PT_LOAD` segment and clear its tail.
//! - **Transfer**: jump to the entry point. Never returns.
//! - **HaltBad**: idle forever.
//!
//! Everything up to Transfer only touches the disk and memory through
//! [`BlockDevice`] and [`PhysicalMemory`], so [`BootDriver::prepare`] can run
//! against an image and a RAM window. [`BootDriver::boot`] adds the two
//! irreversible endings.

use core::fmt;

use crate::block_device::BlockDevice;
use crate::config::{BootConfig, SECTOR_SIZE};
use crate::elf::{ElfError, ElfHeader, ProgramHeader, EHDR_SIZE, PHDR_MAX_SIZE};
use crate::memory::{MemoryError, PhysicalMemory};
use crate::segment::{zero_fill, SegmentLoader};
use crate::serial_println;
use crate::vga_buffer::HexDump;


/// Byte painted on the first screen row when the driver starts
const START_MARKER: u8 = 0xCC;

/// Debug screen rows
const MARKER_ROW: usize = 0;
const HEADER_ROW: usize = 1;
const MAGIC_ROW: usize = 1;
const FIRST_SEGMENT_ROW: usize = 2;
/// Each program header owns two rows (destination, sector-adjusted destination)
const ROWS_PER_SEGMENT: usize = 2;

/// Address execution continues at once loading is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint(u64);

impl EntryPoint {
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    pub const fn address(&self) -> u64 {
        self.0
    }
}

/// Why the loader gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// The image is not ELF
    InvalidImage(ElfError),
    /// A header or segment points outside usable physical memory
    Memory(MemoryError),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::InvalidImage(e) => write!(f, "Invalid kernel image: {}", e),
            BootError::Memory(e) => write!(f, "Memory error: {}", e),
        }
    }
}

impl From<ElfError> for BootError {
    fn from(error: ElfError) -> Self {
        BootError::InvalidImage(error)
    }
}

impl From<MemoryError> for BootError {
    fn from(error: MemoryError) -> Self {
        BootError::Memory(error)
    }
}

/// Boot driver states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Validate,
    LoadSegments(ElfHeader),
    Transfer(EntryPoint),
    HaltBad(BootError),
}

impl Stage {
    /// Transfer and HaltBad never advance
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Transfer(_) | Stage::HaltBad(_))
    }
}

/// What the loader has done so far
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    /// PT_LOAD segments placed
    pub segments: u32,
    /// Sector reads issued, including the header read
    pub sectors_read: u32,
    /// Bytes cleared past the file image of the segments
    pub bytes_zeroed: u64,
}

/// Drives one boot from a disk into physical memory
pub struct BootDriver<D, M> {
    disk: D,
    memory: M,
    config: BootConfig,
    loader: SegmentLoader,
    screen: HexDump,
    summary: LoadSummary,
}

impl<D: BlockDevice, M: PhysicalMemory> BootDriver<D, M> {
    pub fn new(disk: D, memory: M, config: BootConfig) -> Self {
        Self {
            disk,
            memory,
            config,
            loader: SegmentLoader::new(config.image_start_sector),
            screen: HexDump::new(config.vga_base),
            summary: LoadSummary::default(),
        }
    }

    pub fn summary(&self) -> LoadSummary {
        self.summary
    }

    pub fn into_parts(self) -> (D, M) {
        (self.disk, self.memory)
    }

    /// Advance the state machine by one stage
    pub fn step(&mut self, stage: Stage) -> Stage {
        let next = match stage {
            Stage::Start => self.stage_header().map(|()| Stage::Validate),
            Stage::Validate => self.validate().map(Stage::LoadSegments),
            Stage::LoadSegments(header) => self.load_segments(&header).map(Stage::Transfer),
            terminal => return terminal,
        };
        next.unwrap_or_else(Stage::HaltBad)
    }

    /// Run every stage short of the jump
    ///
    /// Returns the kernel entry point once all segments are in place.
    pub fn prepare(&mut self) -> Result<EntryPoint, BootError> {
        let mut stage = Stage::Start;
        loop {
            stage = self.step(stage);
            match stage {
                Stage::Transfer(entry) => return Ok(entry),
                Stage::HaltBad(error) => return Err(error),
                _ => {}
            }
        }
    }

    /// Load the kernel and jump into it, or halt trying
    pub fn boot(mut self) -> ! {
        match self.prepare() {
            Ok(entry) => {
                let summary = self.summary;
                serial_println!(
                    "[o] Loaded {} segments ({} sectors read, {:#x} bytes zeroed)",
                    summary.segments,
                    summary.sectors_read,
                    summary.bytes_zeroed
                );
                serial_println!("[i] Jumping to kernel at {:#x}", entry.address());
                // SAFETY: the image said its code starts here, and all of its
                // loadable segments have been placed.
                unsafe { transfer(entry) }
            }
            Err(error) => {
                serial_println!("[x] Boot failed: {}", error);
                halt()
            }
        }
    }

    /// START: read the first sectors of the image into the scratch buffer
    fn stage_header(&mut self) -> Result<(), BootError> {
        self.screen.dump(&mut self.memory, &[START_MARKER], MARKER_ROW);

        let scratch = self.config.scratch_base;
        let len = self.config.scratch_len();
        serial_println!("[i] Reading image header into {:#x} ({} bytes)", scratch, len);

        let reads = self.traced_read_segment(scratch, len, 0, HEADER_ROW)?;
        self.summary.sectors_read += reads;
        Ok(())
    }

    /// VALIDATE: the scratch buffer must start with the ELF magic
    fn validate(&mut self) -> Result<ElfHeader, BootError> {
        let mut raw = [0u8; EHDR_SIZE];
        self.memory.read(self.config.scratch_base, &mut raw)?;

        match ElfHeader::parse(&raw) {
            Ok(header) => {
                serial_println!(
                    "[o] ELF image: {:?}, entry {:#x}, {} program headers at {:#x}",
                    header.class,
                    header.entry,
                    header.phnum,
                    header.phoff
                );
                Ok(header)
            }
            Err(error) => {
                self.screen.dump(&mut self.memory, &raw[..4], MAGIC_ROW);
                serial_println!("[x] {}", error);
                Err(error.into())
            }
        }
    }

    /// LOAD_SEGMENTS: place every loadable segment in file order
    fn load_segments(&mut self, header: &ElfHeader) -> Result<EntryPoint, BootError> {
        let scratch = self.config.scratch_base;
        let table = scratch
            .checked_add(header.phoff)
            .ok_or(MemoryError::Overflow { addr: scratch, len: header.phoff })?;
        let stride = header.phdr_stride();
        let size = header.class.phdr_size();
        let mut raw = [0u8; PHDR_MAX_SIZE];
        let mut row = FIRST_SEGMENT_ROW;

        for index in 0..header.phnum {
            let offset = index as u64 * stride;
            let at = table
                .checked_add(offset)
                .ok_or(MemoryError::Overflow { addr: table, len: offset })?;
            self.memory.read(at, &mut raw[..size])?;
            let ph = ProgramHeader::parse(header.class, &raw[..size]);

            if ph.is_loadable() {
                serial_println!(
                    "[i] Segment {}: {:#x} <- file {:#x}, {:#x} bytes ({:#x} in memory) {}",
                    index,
                    ph.paddr,
                    ph.offset,
                    ph.filesz,
                    ph.memsz,
                    ph.flags
                );
                self.place_segment(&ph, row)?;
            }

            row += ROWS_PER_SEGMENT;
        }

        Ok(EntryPoint::new(header.entry))
    }

    /// Copy one segment's file bytes and clear the rest of its memory image
    fn place_segment(&mut self, ph: &ProgramHeader, row: usize) -> Result<(), BootError> {
        let reads = self.traced_read_segment(ph.paddr, ph.filesz, ph.offset, row)?;

        let bss = ph.bss_len();
        let bss_start = ph
            .paddr
            .checked_add(ph.filesz)
            .ok_or(MemoryError::Overflow { addr: ph.paddr, len: ph.filesz })?;
        zero_fill(&mut self.memory, bss_start, bss)?;

        self.summary.segments += 1;
        self.summary.sectors_read += reads;
        self.summary.bytes_zeroed += bss;
        Ok(())
    }

    /// Segment read that leaves the destination on the debug screen first
    fn traced_read_segment(
        &mut self,
        dest: u64,
        count: u64,
        file_offset: u64,
        row: usize,
    ) -> Result<u32, MemoryError> {
        let sector_start = dest.wrapping_sub(file_offset % SECTOR_SIZE as u64);
        self.screen.dump(&mut self.memory, &dest.to_le_bytes(), row);
        self.screen.dump(&mut self.memory, &sector_start.to_le_bytes(), row + 1);

        self.loader
            .read_segment(&mut self.disk, &mut self.memory, dest, count, file_offset)
    }
}

/// TRANSFER: call the kernel entry point
///
/// # Safety
///
/// `entry` must be the address of code that takes no arguments and never
/// returns, already present in memory.
pub unsafe fn transfer(entry: EntryPoint) -> ! {
    let kernel_main: extern "C" fn() -> ! = core::mem::transmute(entry.address() as usize);
    kernel_main()
}

/// HALT_BAD: stop here for good
pub fn halt() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}
