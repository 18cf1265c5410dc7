//! Serial Port Driver (UART 16550)
//!
//! Progress log for the loader on COM1, 115200 baud 8N1, transmit only.
//! Host test builds never touch the port: the sink swallows everything under
//! `cfg(test)`.

use core::fmt;
use spin::Mutex;
use x86_64::instructions::port::Port;

/// COM1 base port
const COM1: u16 = 0x3F8;

/// UART input clock divided by 16
const UART_CLOCK: u32 = 115_200;
const BAUD_RATE: u32 = 115_200;
const DIVISOR: u16 = (UART_CLOCK / BAUD_RATE) as u16;

/// Line control: 8 data bits, no parity, 1 stop bit
const LINE_8N1: u8 = 0x03;
/// Line control: divisor latch access
const LINE_DLAB: u8 = 0x80;
/// FIFO on, both queues cleared, 14-byte trigger
const FIFO_ENABLE_CLEAR_14: u8 = 0xC7;
/// DTR, RTS, OUT2
const MODEM_DTR_RTS_OUT2: u8 = 0x0B;

bitflags::bitflags! {
    /// Line status register bits the driver looks at
    pub struct LineStatus: u8 {
        const DATA_READY = 0x01;
        /// Transmit holding register empty
        const THR_EMPTY  = 0x20;
    }
}

/// UART registers as offsets from the base port
///
/// Offsets 0 and 1 double as the divisor latch while DLAB is set.
#[derive(Debug, Clone, Copy)]
#[repr(u16)]
enum UartRegister {
    Data = 0,
    InterruptEnable = 1,
    FifoControl = 2,
    LineControl = 3,
    ModemControl = 4,
    LineStatus = 5,
}

/// One 16550 UART, addressed by its base port
pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    /// Create a handle (doesn't touch the hardware)
    const fn new(base: u16) -> Self {
        Self { base }
    }

    fn port(&self, register: UartRegister) -> Port<u8> {
        Port::new(self.base + register as u16)
    }

    /// Program baud rate, framing and FIFOs; interrupts stay off
    pub unsafe fn init(&mut self) {
        self.port(UartRegister::InterruptEnable).write(0x00);

        self.port(UartRegister::LineControl).write(LINE_DLAB);
        let [low, high] = DIVISOR.to_le_bytes();
        self.port(UartRegister::Data).write(low);
        self.port(UartRegister::InterruptEnable).write(high);
        self.port(UartRegister::LineControl).write(LINE_8N1);

        self.port(UartRegister::FifoControl).write(FIFO_ENABLE_CLEAR_14);
        self.port(UartRegister::ModemControl).write(MODEM_DTR_RTS_OUT2);
    }

    unsafe fn line_status(&self) -> LineStatus {
        LineStatus::from_bits_truncate(self.port(UartRegister::LineStatus).read())
    }

    /// Send one byte once the transmitter has room
    pub unsafe fn write_byte(&mut self, byte: u8) {
        while !self.line_status().contains(LineStatus::THR_EMPTY) {
            core::hint::spin_loop();
        }
        self.port(UartRegister::Data).write(byte);
    }
}

impl fmt::Write for SerialPort {
    /// Newlines go out as CR LF for terminal emulators
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            // SAFETY: COM1 belongs to the logger; callers hold SERIAL1's lock.
            unsafe {
                if byte == b'\n' {
                    self.write_byte(b'\r');
                }
                self.write_byte(byte);
            }
        }
        Ok(())
    }
}

static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Initialize COM1 (call once, before the first log line)
///
/// # Safety
/// Performs raw port I/O on COM1.
pub unsafe fn init() {
    SERIAL1.lock().init();
}

/// Macro for serial output (like print!)
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::_print(format_args!($($arg)*))
    };
}

/// Macro for serial output with newline (like println!)
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
#[cfg(not(test))]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    // Nothing useful can be done with a failed log line
    let _ = SERIAL1.lock().write_fmt(args);
}

#[doc(hidden)]
#[cfg(test)]
pub fn _print(_args: fmt::Arguments) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divisor_for_115200() {
        assert_eq!(DIVISOR, 1);
        assert_eq!(DIVISOR.to_le_bytes(), [0x01, 0x00]);
    }

    #[test]
    fn test_line_status_bits() {
        let status = LineStatus::from_bits_truncate(0x60);
        assert!(status.contains(LineStatus::THR_EMPTY));
        assert!(!status.contains(LineStatus::DATA_READY));
    }

    #[test]
    fn test_log_macros_are_silent_in_tests() {
        crate::serial_println!("[i] {} sectors", 8);
        crate::serial_print!("no newline");
        crate::serial_println!();
    }
}
