//! Segment Loader
//!
//! Copies an arbitrary byte range of the image, not necessarily sector
//! aligned, to a physical address by reading every sector that overlaps the
//! range.
//!
//! Each sector lands in a bounce buffer first and only the bytes inside the
//! requested range are copied out. The sector sequence is the same as
//! reading whole sectors back-to-back from the one holding `file_offset`,
//! but nothing before `dest` or after `dest + count` is written, so segment
//! placement needs no alignment between `file_offset % 512` and `dest`.

use crate::block_device::{BlockDevice, Sector};
use crate::config::SECTOR_SIZE;
use crate::memory::{MemoryError, PhysicalMemory};

const SECTOR_BYTES: u64 = SECTOR_SIZE as u64;

/// Reads image byte ranges from a disk where the image starts at a fixed sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLoader {
    image_start_sector: u32,
}

impl SegmentLoader {
    pub const fn new(image_start_sector: u32) -> Self {
        Self { image_start_sector }
    }

    /// Device sector holding byte `file_offset` of the image
    pub fn sector_of(&self, file_offset: u64) -> u32 {
        // 28-bit LBA drives cannot address past this anyway
        self.image_start_sector
            .wrapping_add((file_offset / SECTOR_BYTES) as u32)
    }

    /// Number of sector reads needed for `count` bytes at `file_offset`
    pub fn sectors_spanned(file_offset: u64, count: u64) -> u64 {
        if count == 0 {
            return 0;
        }
        (file_offset % SECTOR_BYTES + count).div_ceil(SECTOR_BYTES)
    }

    /// Copy image bytes `[file_offset, file_offset + count)` to `dest`
    ///
    /// Returns the number of sectors read. The destination range is checked
    /// before the first read, so a range outside physical memory is
    /// rejected with nothing written. `count == 0` reads nothing.
    pub fn read_segment<D, M>(
        &self,
        disk: &mut D,
        memory: &mut M,
        dest: u64,
        count: u64,
        file_offset: u64,
    ) -> Result<u32, MemoryError>
    where
        D: BlockDevice + ?Sized,
        M: PhysicalMemory + ?Sized,
    {
        if count == 0 {
            return Ok(0);
        }
        memory.check(dest, count)?;

        let mut sector = self.sector_of(file_offset);
        let mut skip = (file_offset % SECTOR_BYTES) as usize;
        let mut cursor = dest;
        let end = dest + count;
        let mut reads = 0;
        let mut buf: Sector = [0; SECTOR_SIZE];

        while cursor < end {
            disk.read_sector(sector, &mut buf);

            let take = (SECTOR_SIZE - skip).min((end - cursor) as usize);
            memory.write(cursor, &buf[skip..skip + take])?;

            cursor += take as u64;
            skip = 0;
            sector = sector.wrapping_add(1);
            reads += 1;
        }

        Ok(reads)
    }
}

/// Clear `[addr, addr + len)`; the .bss tail of a segment
pub fn zero_fill<M>(memory: &mut M, addr: u64, len: u64) -> Result<(), MemoryError>
where
    M: PhysicalMemory + ?Sized,
{
    if len == 0 {
        return Ok(());
    }
    memory.fill(addr, len, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_device::ImageDisk;
    use crate::memory::RamWindow;

    /// Disk wrapper that remembers which sectors were read
    struct Recording<'a> {
        inner: ImageDisk<'a>,
        sectors: Vec<u32>,
    }

    impl<'a> Recording<'a> {
        fn new(image: &'a [u8]) -> Self {
            Self { inner: ImageDisk::new(image), sectors: Vec::new() }
        }
    }

    impl BlockDevice for Recording<'_> {
        fn wait_ready(&mut self) {
            self.inner.wait_ready()
        }

        fn read_sector(&mut self, sector: u32, buf: &mut Sector) {
            self.sectors.push(sector);
            self.inner.read_sector(sector, buf)
        }
    }

    /// Disk image with two reserved sectors followed by `image`
    fn disk_with(image: &[u8]) -> Vec<u8> {
        let mut disk = vec![0xB0u8; 2 * SECTOR_SIZE];
        disk.extend_from_slice(image);
        disk
    }

    fn numbered_image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn test_sector_of_skips_reserved_sectors() {
        let loader = SegmentLoader::new(2);
        assert_eq!(loader.sector_of(0), 2);
        assert_eq!(loader.sector_of(511), 2);
        assert_eq!(loader.sector_of(512), 3);
        assert_eq!(loader.sector_of(0x1234), 2 + 9);
    }

    #[test]
    fn test_sectors_spanned() {
        assert_eq!(SegmentLoader::sectors_spanned(0, 0), 0);
        assert_eq!(SegmentLoader::sectors_spanned(0, 1), 1);
        assert_eq!(SegmentLoader::sectors_spanned(0, 512), 1);
        assert_eq!(SegmentLoader::sectors_spanned(0, 513), 2);
        assert_eq!(SegmentLoader::sectors_spanned(511, 2), 2);
        assert_eq!(SegmentLoader::sectors_spanned(1000, 4096), 9);
    }

    #[test]
    fn test_aligned_segment() {
        let image = numbered_image(4 * SECTOR_SIZE);
        let disk_bytes = disk_with(&image);
        let mut disk = Recording::new(&disk_bytes);
        let mut backing = vec![0u8; 0x1000];
        let mut ram = RamWindow::new(0x10000, &mut backing);

        let reads = SegmentLoader::new(2)
            .read_segment(&mut disk, &mut ram, 0x10000, 1024, 512)
            .unwrap();

        assert_eq!(reads, 2);
        assert_eq!(disk.sectors, [3, 4]);
        assert_eq!(ram.slice(0x10000, 1024).unwrap(), &image[512..1536]);
        assert!(ram.slice(0x10400, 0xC00).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unaligned_segment_touches_only_requested_range() {
        let image = numbered_image(4 * SECTOR_SIZE);
        let disk_bytes = disk_with(&image);
        let mut disk = Recording::new(&disk_bytes);
        let mut backing = vec![0xEEu8; 0x1000];
        let mut ram = RamWindow::new(0x20000, &mut backing);

        // Offset 700 sits 188 bytes into the second image sector
        let reads = SegmentLoader::new(2)
            .read_segment(&mut disk, &mut ram, 0x20100, 900, 700)
            .unwrap();

        assert_eq!(reads as u64, SegmentLoader::sectors_spanned(700, 900));
        assert_eq!(disk.sectors, [3, 4, 5]);
        assert_eq!(ram.slice(0x20100, 900).unwrap(), &image[700..1600]);
        assert!(ram.slice(0x20000, 0x100).unwrap().iter().all(|&b| b == 0xEE));
        assert!(ram
            .slice(0x20100 + 900, 0x1000 - 0x100 - 900)
            .unwrap()
            .iter()
            .all(|&b| b == 0xEE));
    }

    #[test]
    fn test_read_count_matches_span_and_never_below_image() {
        let image = numbered_image(8 * SECTOR_SIZE);
        let disk_bytes = disk_with(&image);
        let mut backing = vec![0u8; 0x2000];

        for &(offset, count) in &[(0u64, 100u64), (511, 1), (511, 2), (3, 1534), (1024, 2048)] {
            let mut disk = Recording::new(&disk_bytes);
            let mut ram = RamWindow::new(0, &mut backing);
            let reads = SegmentLoader::new(2)
                .read_segment(&mut disk, &mut ram, 0x100, count, offset)
                .unwrap();

            assert_eq!(reads as u64, SegmentLoader::sectors_spanned(offset, count));
            assert_eq!(disk.sectors.len() as u64, reads as u64);
            assert!(disk.sectors.iter().all(|&s| s >= 2));
        }
    }

    #[test]
    fn test_zero_count_reads_nothing() {
        let disk_bytes = disk_with(&numbered_image(SECTOR_SIZE));
        let mut disk = Recording::new(&disk_bytes);
        let mut backing = vec![0x33u8; 0x100];
        let mut ram = RamWindow::new(0, &mut backing);

        let reads = SegmentLoader::new(2)
            .read_segment(&mut disk, &mut ram, 0x10, 0, 300)
            .unwrap();

        assert_eq!(reads, 0);
        assert!(disk.sectors.is_empty());
        assert!(backing.iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_out_of_range_destination_reads_nothing() {
        let disk_bytes = disk_with(&numbered_image(SECTOR_SIZE));
        let mut disk = Recording::new(&disk_bytes);
        let mut backing = vec![0u8; 0x100];
        let mut ram = RamWindow::new(0x1000, &mut backing);

        let result = SegmentLoader::new(2).read_segment(&mut disk, &mut ram, 0x10F0, 0x20, 0);

        assert_eq!(result, Err(MemoryError::OutOfBounds { addr: 0x10F0, len: 0x20 }));
        assert!(disk.sectors.is_empty());
    }

    #[test]
    fn test_zero_fill() {
        let mut backing = vec![0xFFu8; 0x40];
        let mut ram = RamWindow::new(0x400, &mut backing);

        zero_fill(&mut ram, 0x410, 0x20).unwrap();
        zero_fill(&mut ram, 0x500, 0).unwrap();

        assert!(backing[..0x10].iter().all(|&b| b == 0xFF));
        assert!(backing[0x10..0x30].iter().all(|&b| b == 0));
        assert!(backing[0x30..].iter().all(|&b| b == 0xFF));
    }
}
