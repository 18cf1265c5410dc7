//! VGA Buffer - Hex Dump Debug Channel
//!
//! Before anything else works, the loader can still paint raw bytes as hex
//! digits onto the text screen. Each byte becomes two cells (high nibble,
//! low nibble) in green on black, starting at column 0 of the given row.
//!
//! Cells are written through [`PhysicalMemory`] so the same code draws on
//! the real screen at 0xB8000 and into a test RAM window.

use crate::memory::PhysicalMemory;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct ColorCode(u8);

impl ColorCode {
    const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

impl ScreenChar {
    /// In-memory form of the cell: character byte, then attribute byte
    fn to_bytes(self) -> [u8; 2] {
        [self.ascii_character, self.color_code.0]
    }
}

/// Uppercase hex digit for the low four bits of `nibble`
pub fn hex_digit(nibble: u8) -> u8 {
    match nibble & 0xF {
        n @ 0..=9 => b'0' + n,
        n => b'A' + (n - 10),
    }
}

/// Paints hex dumps onto a VGA text screen
pub struct HexDump {
    base: u64,
    color_code: ColorCode,
}

impl HexDump {
    pub const fn new(base: u64) -> Self {
        Self {
            base,
            color_code: ColorCode::new(Color::Green, Color::Black),
        }
    }

    /// Render `bytes` as hex starting at the first column of `row`
    ///
    /// Long dumps run on into the following rows; anything past the bottom
    /// of the screen is dropped. Write failures are ignored since there is
    /// nowhere left to report them.
    pub fn dump<M: PhysicalMemory + ?Sized>(&self, memory: &mut M, bytes: &[u8], row: usize) {
        if !cfg!(feature = "hexdump") || row >= BUFFER_HEIGHT {
            return;
        }

        let first_cell = row * BUFFER_WIDTH;
        let cells_left = BUFFER_WIDTH * BUFFER_HEIGHT - first_cell;

        let digits = bytes
            .iter()
            .flat_map(|&byte| [hex_digit(byte >> 4), hex_digit(byte)])
            .take(cells_left);

        for (i, digit) in digits.enumerate() {
            let cell = ScreenChar {
                ascii_character: digit,
                color_code: self.color_code,
            };
            let addr = self.base + ((first_cell + i) * 2) as u64;
            let _ = memory.write(addr, &cell.to_bytes());
        }
    }
}
