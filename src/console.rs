//! Kernel diagnostics: `print!`/`println!`/`uprintln!`
//! macro family: a spin-locked formatted writer for normal console output,
//! and a lock-free `uprint!` path (safe to call with the ptable lock held,
//! or mid-panic) that goes straight to the UART collaborator.
//!
//! The actual byte sink is a collaborator seam: `not(test)` builds hand
//! bytes to an `extern "C"` UART write hook supplied by the platform HAL;
//! `cfg(test)` builds capture them so tests can assert on logged
//! diagnostics (e.g. that a scheduler invariant violation was logged
//! before the panic that halts the machine).

use crate::sync::spinlock::Spinlock;
use core::fmt;

#[cfg(not(test))]
pub mod sink {
    extern "C" {
        fn hal_console_write(bytes: *const u8, len: usize);
    }
    pub fn write_bytes(bytes: &[u8]) {
        unsafe { hal_console_write(bytes.as_ptr(), bytes.len()) }
    }
}


pub static PRINT_LOCK: Spinlock = Spinlock::new();

struct ConsoleWriter;
impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        sink::write_bytes(s.as_bytes());
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    let _guard = PRINT_LOCK.lock();
    let _ = ConsoleWriter.write_fmt(args);
}

/// Formatted console output, serialized by [`PRINT_LOCK`].
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::console::_print(core::format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        $crate::print!($($arg)*);
        $crate::print!("\n");
    }};
}

/// Lock-free formatted output straight to the UART, for panic handlers and
/// invariant-violation logging where acquiring `PRINT_LOCK` could deadlock.
#[macro_export]
macro_rules! uprintln {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        struct Raw;
        impl core::fmt::Write for Raw {
            fn write_str(&mut self, s: &str) -> core::fmt::Result {
                $crate::console::sink::write_bytes(s.as_bytes());
                Ok(())
            }
        }
        let _ = Raw.write_fmt(core::format_args!($($arg)*));
        let _ = Raw.write_str("\n");
    }};
}

/// Logs a scheduler invariant violation before the caller panics. Kept
/// separate from a plain `uprintln!` call so every fatal-invariant site
/// named in §7 is visually and grep-ably distinct from ordinary
/// diagnostics.
#[macro_export]
macro_rules! log_scheduler_violation {
    ($($arg:tt)*) => {{
        $crate::uprintln!("scheduler invariant violated: {}", core::format_args!($($arg)*));
    }};
}
