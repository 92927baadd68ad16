//! Per-CPU state (one hart = one [`Cpu`]).

use super::context::Context;
use super::process::Process;
use crate::arch;
use crate::param::NCPU;
use core::ptr::{addr_of_mut, null_mut};

/// Per-CPU state.
pub struct Cpu {
    /// The process running on this cpu, or null.
    pub proc: *mut Process,
    /// `swtch()` here to enter this cpu's `scheduler()`.
    pub context: Context,
    /// Depth of `push_intr_off()` nesting.
    pub interrupt_disable_layers: i32,
    /// Were interrupts enabled before the outermost `push_intr_off()`?
    pub previous_interrupts_enabled: bool,
}
impl Cpu {
    pub const fn new() -> Cpu {
        Cpu {
            proc: null_mut(),
            context: Context::new(),
            interrupt_disable_layers: 0,
            previous_interrupts_enabled: false,
        }
    }
}
impl Default for Cpu {
    fn default() -> Cpu {
        Cpu::new()
    }
}

pub static mut CPUS: [Cpu; NCPU] = [const { Cpu::new() }; NCPU];

impl Cpu {
    /// Returns a pointer to the calling hart's `Cpu`.
    ///
    /// # Safety
    /// Must be called with interrupts disabled, so the hart cannot be
    /// rescheduled mid-lookup.
    pub unsafe fn current_raw() -> *mut Cpu {
        let id = arch::hart_id();
        addr_of_mut!(CPUS[id])
    }
    pub fn current() -> &'static mut Cpu {
        let _blocker = crate::trap::InterruptBlocker::new();
        unsafe { &mut *Self::current_raw() }
    }
}
