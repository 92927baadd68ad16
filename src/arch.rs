//! Collaborator seam: the hart-identification and interrupt-enable/disable
//! primitives that §5 assumes are available. On the real target these are
//! a handful of RISC-V CSR instructions (`tp`, `sstatus`); here they are
//! declared as an `extern "C"` boundary the platform HAL supplies.
//!
//! The hosted (`cfg(test)`) build swaps in a per-thread simulation so the
//! scheduler's cli-nesting bookkeeping can be exercised without real
//! hardware, while leaving every other line of scheduler code identical
//! between the two targets.

#[cfg(not(test))]
mod target {
    extern "C" {
        /// Returns the id of the hart this code is currently executing on.
        /// Must be called with interrupts disabled, per `cpuid()`'s own
        /// contract.
        fn hal_hart_id() -> u32;
        /// Are interrupts currently enabled on this hart?
        fn hal_interrupts_enabled() -> bool;
        fn hal_disable_interrupts();
        fn hal_enable_interrupts();
    }

    pub unsafe fn hart_id() -> usize {
        hal_hart_id() as usize
    }
    pub unsafe fn interrupts_enabled() -> bool {
        hal_interrupts_enabled()
    }
    pub unsafe fn disable_interrupts() {
        hal_disable_interrupts()
    }
    pub unsafe fn enable_interrupts() {
        hal_enable_interrupts()
    }
}

#[cfg(test)]
mod target {
    use core::cell::Cell;
    std::thread_local! {
        static HART_ID: Cell<usize> = const { Cell::new(0) };
        static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    pub unsafe fn hart_id() -> usize {
        HART_ID.with(|id| id.get())
    }
    pub unsafe fn interrupts_enabled() -> bool {
        INTERRUPTS_ENABLED.with(|e| e.get())
    }
    pub unsafe fn disable_interrupts() {
        INTERRUPTS_ENABLED.with(|e| e.set(false));
    }
    pub unsafe fn enable_interrupts() {
        INTERRUPTS_ENABLED.with(|e| e.set(true));
    }

    /// Test-only: pretend this OS thread is running on hart `id`, so that
    /// per-CPU state (`Cpu::current`) resolves independently per test
    /// thread.
    pub fn set_hart_id_for_test(id: usize) {
        HART_ID.with(|h| h.set(id));
    }
}

pub use target::*;
#[cfg(test)]
pub use target::set_hart_id_for_test;
