//! # Kindling - AethelOS First-Stage Kernel Loader
//!
//! Kindling runs right after the boot sector has switched the CPU into a
//! flat protected/long mode with identity-mapped memory. It pulls the kernel
//! ELF image off the primary ATA disk (starting at sector 2), places every
//! loadable segment at its physical address, and jumps to the entry point.
//!
//! There is no allocator, no interrupts and no error recovery: an image
//! without the ELF magic stops the machine with the rejected bytes left on
//! the VGA screen.
//!
//! Hardware access sits behind two traits so the whole load path runs in
//! host tests:
//! - [`BlockDevice`]: sector reads ([`AtaPio`] on the machine, [`ImageDisk`]
//!   over a byte slice)
//! - [`PhysicalMemory`]: checked physical writes ([`IdentityMapped`] on the
//!   machine, [`RamWindow`] over a byte slice)

#![cfg_attr(not(test), no_std)]

pub mod block_device;
pub mod config;
pub mod driver;
pub mod drivers;
pub mod elf;
pub mod memory;
pub mod segment;
pub mod vga_buffer;

pub use block_device::{BlockDevice, ImageDisk};
pub use config::BootConfig;
pub use driver::{BootDriver, BootError, EntryPoint, LoadSummary, Stage};
pub use drivers::{AtaPio, PortBus};
pub use memory::{IdentityMapped, PhysicalMemory, RamWindow, Region};

/// Load the kernel from the primary ATA disk and jump into it
///
/// Never returns: either the kernel is running or the machine is halted.
pub fn boot() -> ! {
    let config = BootConfig::DEFAULT;

    // SAFETY: single-threaded, nothing else owns COM1 this early.
    unsafe { drivers::serial::init() };
    serial_println!("[i] Kindling: loading kernel from sector {}", config.image_start_sector);

    let disk = AtaPio::new(PortBus::new(config.ata_base));
    // SAFETY: the boot sector left the low 4GiB identity mapped, and the
    // window starts above the real-mode IVT and BIOS data area.
    let memory = unsafe { IdentityMapped::new(Region::new(config.memory_start, config.memory_end)) };

    BootDriver::new(disk, memory, config).boot()
}
