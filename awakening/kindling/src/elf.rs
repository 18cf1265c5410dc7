//! # ELF Headers
//!
//! Just enough of the ELF format to place a kernel: the file header (magic,
//! class, entry point, program-header table) and program headers.
//!
//! Both ELF32 and ELF64 little-endian layouts are understood; the class byte
//! picks the layout, and anything other than ELF32 is read as ELF64. The
//! magic number is the only thing validated. Everything else is trusted to
//! the tool that produced the image.

use bitflags::bitflags;
use core::fmt;

/// ELF magic number: \x7fELF
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// ELF class: 32-bit
const ELFCLASS32: u8 = 1;

/// Offset of the class byte in e_ident
const EI_CLASS: usize = 4;

/// Program header type: loadable segment
pub const PT_LOAD: u32 = 1;

/// Bytes of file header that cover both layouts
pub const EHDR_SIZE: usize = 64;

/// Largest program header of either layout
pub const PHDR_MAX_SIZE: usize = 56;

bitflags! {
    /// Program header permission flags
    pub struct SegmentFlags: u32 {
        const EXECUTE = 1;
        const WRITE   = 2;
        const READ    = 4;
    }
}

impl fmt::Display for SegmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.contains(Self::READ), 'R'),
            flag(self.contains(Self::WRITE), 'W'),
            flag(self.contains(Self::EXECUTE), 'X'),
        )
    }
}

/// Errors found while reading ELF headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfError {
    /// First four bytes are not \x7fELF (carries what was found)
    BadMagic([u8; 4]),
}

impl fmt::Display for ElfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfError::BadMagic(found) => write!(
                f,
                "Invalid ELF magic {:02X} {:02X} {:02X} {:02X}",
                found[0], found[1], found[2], found[3]
            ),
        }
    }
}

/// Field layout selected by e_ident[EI_CLASS]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

impl ElfClass {
    fn from_ident(class: u8) -> Self {
        if class == ELFCLASS32 {
            ElfClass::Elf32
        } else {
            ElfClass::Elf64
        }
    }

    /// Size of one program header in this layout
    pub const fn phdr_size(&self) -> usize {
        match self {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }
}

fn le_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([raw[at], raw[at + 1]])
}

fn le_u32(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn le_u64(raw: &[u8], at: usize) -> u64 {
    le_u32(raw, at) as u64 | (le_u32(raw, at + 4) as u64) << 32
}

/// The parts of the ELF file header the loader uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    pub class: ElfClass,
    /// Entry point address
    pub entry: u64,
    /// Program header table file offset
    pub phoff: u64,
    /// Program header entry size
    pub phentsize: u16,
    /// Program header entry count
    pub phnum: u16,
}

impl ElfHeader {
    /// Whether the first four bytes carry the ELF magic
    pub fn has_magic(raw: &[u8; EHDR_SIZE]) -> bool {
        raw[..4] == ELF_MAGIC
    }

    /// Parse the file header, rejecting anything without the ELF magic
    pub fn parse(raw: &[u8; EHDR_SIZE]) -> Result<Self, ElfError> {
        if !Self::has_magic(raw) {
            return Err(ElfError::BadMagic([raw[0], raw[1], raw[2], raw[3]]));
        }

        let class = ElfClass::from_ident(raw[EI_CLASS]);
        let header = match class {
            ElfClass::Elf32 => ElfHeader {
                class,
                entry: le_u32(raw, 24) as u64,
                phoff: le_u32(raw, 28) as u64,
                phentsize: le_u16(raw, 42),
                phnum: le_u16(raw, 44),
            },
            ElfClass::Elf64 => ElfHeader {
                class,
                entry: le_u64(raw, 24),
                phoff: le_u64(raw, 32),
                phentsize: le_u16(raw, 54),
                phnum: le_u16(raw, 56),
            },
        };
        Ok(header)
    }

    /// Distance between program headers in the table
    ///
    /// A zero e_phentsize falls back to the layout's natural size.
    pub fn phdr_stride(&self) -> u64 {
        if self.phentsize == 0 {
            self.class.phdr_size() as u64
        } else {
            self.phentsize as u64
        }
    }
}

/// One program header, widened to 64-bit fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub flags: SegmentFlags,
    /// Segment file offset
    pub offset: u64,
    /// Physical load address
    pub paddr: u64,
    /// Segment size in file
    pub filesz: u64,
    /// Segment size in memory
    pub memsz: u64,
}

impl ProgramHeader {
    /// Parse one entry; `raw` must hold at least `class.phdr_size()` bytes
    pub fn parse(class: ElfClass, raw: &[u8]) -> Self {
        match class {
            ElfClass::Elf32 => ProgramHeader {
                p_type: le_u32(raw, 0),
                offset: le_u32(raw, 4) as u64,
                paddr: le_u32(raw, 12) as u64,
                filesz: le_u32(raw, 16) as u64,
                memsz: le_u32(raw, 20) as u64,
                flags: SegmentFlags::from_bits_truncate(le_u32(raw, 24)),
            },
            ElfClass::Elf64 => ProgramHeader {
                p_type: le_u32(raw, 0),
                flags: SegmentFlags::from_bits_truncate(le_u32(raw, 4)),
                offset: le_u64(raw, 8),
                paddr: le_u64(raw, 24),
                filesz: le_u64(raw, 32),
                memsz: le_u64(raw, 40),
            },
        }
    }

    pub fn is_loadable(&self) -> bool {
        self.p_type == PT_LOAD
    }

    /// Bytes past the file image that must be cleared (none if memsz < filesz)
    pub fn bss_len(&self) -> u64 {
        self.memsz.saturating_sub(self.filesz)
    }
}
