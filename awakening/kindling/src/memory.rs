//! Physical Memory Access
//!
//! The loader writes segments to absolute physical addresses. All of those
//! accesses go through [`PhysicalMemory`], which checks every offset+length
//! against a window fixed when the memory handle is created.
//!
//! - [`IdentityMapped`]: raw pointer access, for the real machine where
//!   physical addresses are identity mapped.
//! - [`RamWindow`]: a byte slice standing in for a range of physical memory,
//!   for tests and hosted tooling.

use core::fmt;

/// Memory access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// Range falls (partly) outside the accessible window
    OutOfBounds { addr: u64, len: u64 },
    /// addr + len wraps around the address space
    Overflow { addr: u64, len: u64 },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfBounds { addr, len } => {
                write!(f, "Range {:#x}+{:#x} outside physical window", addr, len)
            }
            MemoryError::Overflow { addr, len } => {
                write!(f, "Range {:#x}+{:#x} overflows address space", addr, len)
            }
        }
    }
}

/// Half-open physical address range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
}

impl Region {
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that `[addr, addr + len)` lies inside this region
    pub fn check(&self, addr: u64, len: u64) -> Result<(), MemoryError> {
        let end = addr
            .checked_add(len)
            .ok_or(MemoryError::Overflow { addr, len })?;
        if addr < self.start || end > self.end {
            return Err(MemoryError::OutOfBounds { addr, len });
        }
        Ok(())
    }
}

/// Checked access to physical memory
pub trait PhysicalMemory {
    /// The window this handle may touch
    fn region(&self) -> Region;

    /// Copy `bytes` to physical address `addr`
    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Set `len` bytes starting at `addr` to `value`
    fn fill(&mut self, addr: u64, len: u64, value: u8) -> Result<(), MemoryError>;

    /// Copy bytes at `addr` into `buf`
    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Check a range without touching it
    fn check(&self, addr: u64, len: u64) -> Result<(), MemoryError> {
        self.region().check(addr, len)
    }
}

impl<M: PhysicalMemory + ?Sized> PhysicalMemory for &mut M {
    fn region(&self) -> Region {
        (**self).region()
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        (**self).write(addr, bytes)
    }

    fn fill(&mut self, addr: u64, len: u64, value: u8) -> Result<(), MemoryError> {
        (**self).fill(addr, len, value)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read(addr, buf)
    }
}

/// Physical memory addressed directly through identity-mapped pointers
pub struct IdentityMapped {
    region: Region,
}

impl IdentityMapped {
    /// # Safety
    ///
    /// Every address in `region` must be identity mapped, writable, and not
    /// in use by the running loader (code, stack, page tables). Address 0
    /// must not be part of the window.
    pub const unsafe fn new(region: Region) -> Self {
        Self { region }
    }
}

impl PhysicalMemory for IdentityMapped {
    fn region(&self) -> Region {
        self.region
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check(addr, bytes.len() as u64)?;
        // SAFETY: range checked against the window promised valid in new().
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), addr as usize as *mut u8, bytes.len());
        }
        Ok(())
    }

    fn fill(&mut self, addr: u64, len: u64, value: u8) -> Result<(), MemoryError> {
        self.check(addr, len)?;
        // SAFETY: as in write().
        unsafe {
            core::ptr::write_bytes(addr as usize as *mut u8, value, len as usize);
        }
        Ok(())
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check(addr, buf.len() as u64)?;
        // SAFETY: as in write().
        unsafe {
            core::ptr::copy_nonoverlapping(addr as usize as *const u8, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }
}

/// A byte slice posing as physical memory starting at `base`
pub struct RamWindow<'a> {
    base: u64,
    bytes: &'a mut [u8],
}

impl<'a> RamWindow<'a> {
    pub fn new(base: u64, bytes: &'a mut [u8]) -> Self {
        Self { base, bytes }
    }

    /// Borrow the bytes behind `[addr, addr + len)`
    pub fn slice(&self, addr: u64, len: u64) -> Result<&[u8], MemoryError> {
        self.check(addr, len)?;
        let start = (addr - self.base) as usize;
        Ok(&self.bytes[start..start + len as usize])
    }

    fn slice_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8], MemoryError> {
        self.check(addr, len)?;
        let start = (addr - self.base) as usize;
        Ok(&mut self.bytes[start..start + len as usize])
    }
}

impl PhysicalMemory for RamWindow<'_> {
    fn region(&self) -> Region {
        Region::new(self.base, self.base + self.bytes.len() as u64)
    }

    fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        self.slice_mut(addr, bytes.len() as u64)?.copy_from_slice(bytes);
        Ok(())
    }

    fn fill(&mut self, addr: u64, len: u64, value: u8) -> Result<(), MemoryError> {
        self.slice_mut(addr, len)?.fill(value);
        Ok(())
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        buf.copy_from_slice(self.slice(addr, buf.len() as u64)?);
        Ok(())
    }
}
