//! Collaborator seam (§4.7, §1 "Deliberately out of scope"). Address-space
//! construction, the context-switch primitive, and the file/inode
//! subsystem are named here only at the shape the scheduler core actually
//! calls them at; a real kernel build supplies its own implementation
//! behind `extern "C"`, and the hosted test build links the trivial
//! stand-ins in this module instead.

use crate::proc::context::Context;
use core::ffi::c_void;

/// Opaque page-table handle. The scheduler core never looks inside it.
pub type Pagetable = *mut c_void;
/// Opaque kernel-stack handle.
pub type KernelStack = usize;

#[cfg(not(test))]
extern "C" {
    pub fn swtch(old: *mut Context, new: *mut Context);

    pub fn proc_pagetable(trapframe: *mut c_void) -> Pagetable;
    pub fn proc_freepagetable(pagetable: Pagetable, size: u64);
    pub fn uvmcopy(old: Pagetable, new: Pagetable, size: u64) -> i32;

    pub fn kstack_alloc() -> KernelStack;
    pub fn kstack_free(stack: KernelStack);

    pub fn copyout(pagetable: Pagetable, dst_addr: u64, src: *mut c_void, len: u64) -> i32;

    pub fn fileclose(file: *mut c_void);
    pub fn filedup(file: *mut c_void) -> *mut c_void;
    pub fn iput(inode: *mut c_void);
    pub fn idup(inode: *mut c_void) -> *mut c_void;
}

/// Hosted stand-ins used only by `#[cfg(test)]`. None of these model real
/// memory or real files; they exist so the lifecycle bookkeeping in
/// `proc::process` (which *is* in scope) can run end to end in a test.
#[cfg(test)]
pub mod hosted {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_FAKE_ADDR: AtomicUsize = AtomicUsize::new(0x1000);

    /// # Safety: no real register state to save; both contexts are
    /// treated as opaque by every caller in this crate.
    pub unsafe extern "C" fn swtch(_old: *mut Context, _new: *mut Context) {}

    pub unsafe extern "C" fn proc_pagetable(_trapframe: *mut c_void) -> Pagetable {
        NEXT_FAKE_ADDR.fetch_add(0x1000, Ordering::Relaxed) as Pagetable
    }
    pub unsafe extern "C" fn proc_freepagetable(_pagetable: Pagetable, _size: u64) {}
    pub unsafe extern "C" fn uvmcopy(_old: Pagetable, _new: Pagetable, _size: u64) -> i32 {
        0
    }

    pub unsafe extern "C" fn kstack_alloc() -> KernelStack {
        NEXT_FAKE_ADDR.fetch_add(0x1000, Ordering::Relaxed)
    }
    pub unsafe extern "C" fn kstack_free(_stack: KernelStack) {}

    /// No real page table to fault against, so this just writes through
    /// `dst_addr` directly; `dst_addr == u64::MAX` fails instead, standing
    /// in for an unmapped user address in negative-path tests.
    pub unsafe extern "C" fn copyout(
        _pagetable: Pagetable,
        dst_addr: u64,
        src: *mut c_void,
        len: u64,
    ) -> i32 {
        if dst_addr == u64::MAX {
            return -1;
        }
        core::ptr::copy_nonoverlapping(src.cast::<u8>(), dst_addr as *mut u8, len as usize);
        0
    }

    pub unsafe extern "C" fn fileclose(_file: *mut c_void) {}
    pub unsafe extern "C" fn filedup(file: *mut c_void) -> *mut c_void {
        file
    }
    pub unsafe extern "C" fn iput(_inode: *mut c_void) {}
    pub unsafe extern "C" fn idup(inode: *mut c_void) -> *mut c_void {
        inode
    }
}
#[cfg(test)]
pub use hosted::*;
