#![no_std]
#![no_main]

//! # Kindling
//!
//! Entry point called by the boot sector once it has loaded this stage.

use core::panic::PanicInfo;

use kindling::serial_println;

/// Called by the boot sector with a flat, identity-mapped address space
#[no_mangle]
pub extern "C" fn bootmain() -> ! {
    kindling::boot()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[x] PANIC: {}", info);
    kindling::driver::halt()
}
