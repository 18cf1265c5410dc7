//! Boot Configuration
//!
//! Every address and sector number the loader relies on is fixed at build
//! time. They are gathered here so the driver can be pointed at a different
//! layout (tests relocate the scratch buffer into a small RAM window).

/// Size of one device sector in bytes
pub const SECTOR_SIZE: usize = 512;

/// Primary ATA bus base I/O port
pub const ATA_PRIMARY_BASE: u16 = 0x1F0;

/// Physical address of the VGA text buffer
pub const VGA_BUFFER_PHYS: u64 = 0xB8000;

/// Layout the boot driver works against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// First sector of the kernel image (0 and 1 belong to earlier stages)
    pub image_start_sector: u32,
    /// Sectors staged into the scratch buffer before validation
    pub header_sectors: u32,
    /// Physical address of the scratch buffer
    pub scratch_base: u64,
    /// Base I/O port of the ATA bus holding the image
    pub ata_base: u16,
    /// Lowest physical address the loader may touch
    pub memory_start: u64,
    /// One past the highest physical address the loader may touch
    pub memory_end: u64,
    /// Physical address of the debug screen
    pub vga_base: u64,
}

impl BootConfig {
    pub const DEFAULT: BootConfig = BootConfig {
        image_start_sector: 2,
        header_sectors: 8,
        scratch_base: 0x10_0000, // 1MiB
        ata_base: ATA_PRIMARY_BASE,
        // Real-mode IVT and BIOS data live in the first page
        memory_start: 0x1000,
        memory_end: 0x1_0000_0000,
        vga_base: VGA_BUFFER_PHYS,
    };

    /// Size of the scratch buffer in bytes
    pub const fn scratch_len(&self) -> u64 {
        self.header_sectors as u64 * SECTOR_SIZE as u64
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
