//! Block Device Abstraction
//!
//! The loader only ever needs two things from a disk: wait until it is
//! ready, and pull one 512-byte sector into a buffer. Both are infallible
//! from the caller's point of view. A device that never becomes ready simply
//! never returns, which is the accepted failure mode this early in boot.

use crate::config::SECTOR_SIZE;

/// One sector worth of bytes
pub type Sector = [u8; SECTOR_SIZE];

/// Block Device trait
///
/// Represents a read-only storage device addressed in 512-byte sectors by a
/// zero-based index.
///
/// # Example
///
/// ```
/// use kindling::block_device::{BlockDevice, ImageDisk};
///
/// let image = [0x42u8; 1024];
/// let mut disk = ImageDisk::new(&image);
/// let mut sector = [0u8; 512];
/// disk.read_sector(1, &mut sector);
/// assert_eq!(sector[0], 0x42);
/// ```
pub trait BlockDevice {
    /// Busy-wait until the device can accept a command
    fn wait_ready(&mut self);

    /// Read a single sector into `buf`
    ///
    /// # Arguments
    ///
    /// * `sector` - Sector number (0-indexed, 28 bits on ATA)
    /// * `buf` - Destination, fully overwritten
    fn read_sector(&mut self, sector: u32, buf: &mut Sector);
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn wait_ready(&mut self) {
        (**self).wait_ready()
    }

    fn read_sector(&mut self, sector: u32, buf: &mut Sector) {
        (**self).read_sector(sector, buf)
    }
}

/// Disk backed by an in-memory copy of the whole device
///
/// Used on hosted builds and in tests. Sectors past the end of the image
/// read as zeros, the same as an unwritten region of a real disk.
pub struct ImageDisk<'a> {
    image: &'a [u8],
}

impl<'a> ImageDisk<'a> {
    pub fn new(image: &'a [u8]) -> Self {
        Self { image }
    }

    /// Number of sectors covered by the image, counting a partial tail
    pub fn sector_count(&self) -> u64 {
        (self.image.len() as u64).div_ceil(SECTOR_SIZE as u64)
    }
}

impl BlockDevice for ImageDisk<'_> {
    fn wait_ready(&mut self) {}

    fn read_sector(&mut self, sector: u32, buf: &mut Sector) {
        buf.fill(0);

        let start = sector as usize * SECTOR_SIZE;
        if start >= self.image.len() {
            return;
        }
        let end = (start + SECTOR_SIZE).min(self.image.len());
        buf[..end - start].copy_from_slice(&self.image[start..end]);
    }
}
