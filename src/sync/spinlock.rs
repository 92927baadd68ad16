//! A test-and-set spinlock with cli-nesting discipline:
//! acquiring a spinlock always disables interrupts on the current hart
//! ([`push_intr_off`]), and releasing it restores them once the nesting
//! depth returns to zero ([`pop_intr_off`]).
//!
//! The crate uses exactly one instance of this lock to protect the whole
//! process table (§5): it is coarse on purpose.

use crate::arch;
use crate::trap::{pop_intr_off, push_intr_off};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const NO_HOLDER: usize = usize::MAX;

#[derive(Default)]
pub struct Spinlock {
    locked: AtomicBool,
    /// Hart id of the current holder, for the double-acquire / wrong-cpu-
    /// release debug checks. `NO_HOLDER` when unlocked.
    holder: AtomicUsize,
}
impl Spinlock {
    pub const fn new() -> Spinlock {
        Spinlock {
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(NO_HOLDER),
        }
    }

    /// True if the calling hart currently holds this lock.
    pub fn held_by_current_cpu(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
            && self.holder.load(Ordering::Relaxed) == unsafe { arch::hart_id() }
    }

    /// # Safety
    /// Caller must pair this with exactly one [`Spinlock::unlock`].
    pub unsafe fn lock_unguarded(&self) {
        push_intr_off();

        if self.held_by_current_cpu() {
            panic!("spinlock: attempt to reacquire held by this cpu");
        }

        while self.locked.swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }
        self.holder.store(arch::hart_id(), Ordering::Relaxed);
    }

    pub fn lock(&self) -> SpinlockGuard<'_> {
        unsafe { self.lock_unguarded() };
        SpinlockGuard { lock: self }
    }

    /// # Safety
    /// Caller must currently hold the lock on this hart.
    pub unsafe fn unlock(&self) {
        if !self.held_by_current_cpu() {
            panic!("spinlock: release from non-holding cpu");
        }
        self.holder.store(NO_HOLDER, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);

        pop_intr_off();
    }
}

pub struct SpinlockGuard<'l> {
    pub lock: &'l Spinlock,
}
impl<'l> Drop for SpinlockGuard<'l> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock() }
    }
}
