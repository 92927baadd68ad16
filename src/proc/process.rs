//! Per-process state (§3 Data Model).

use super::context::Context;
use super::cpu::Cpu;
use super::trapframe::Trapframe;
use crate::collab::{KernelStack, Pagetable};
use crate::list::{Adapter, Links};
use crate::param::{NOFILE, PROC_NAME_LEN};
use crate::container_of;
use core::ffi::c_void;
use core::ptr::{addr_of_mut, null_mut};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProcessState {
    #[default]
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

/// Which scheduling discipline this process belongs to, with the fields
/// only that discipline needs (§3: `type ∈ {MLFQ, STRIDE}`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SchedKind {
    Mlfq { level: usize, ticks: u32 },
    Stride { tickets: i32, pass: u64 },
}
impl SchedKind {
    pub fn is_stride(&self) -> bool {
        matches!(self, SchedKind::Stride { .. })
    }
}

/// Per-process state.
pub struct Process {
    pub state: ProcessState,
    /// Linkage used, one at a time, by: the free list, an MLFQ level
    /// queue, the stride run-list, or the sleep list.
    pub sched_links: Links,
    /// Linkage in `parent`'s `children` list.
    pub sibling_links: Links,
    /// Head of this process's own children list.
    pub children: crate::list::List<ChildAdapter>,

    pub pid: i32,
    pub name: [u8; PROC_NAME_LEN],
    pub parent: *mut Process,

    /// Non-null while sleeping; cleared on wake (§3 invariant).
    pub chan: *mut c_void,
    pub killed: bool,
    pub exit_status: i32,

    pub kind: SchedKind,

    pub pagetable: Pagetable,
    pub memory_allocated: u64,
    pub kernel_stack: KernelStack,
    pub trapframe: *mut Trapframe,
    pub context: Context,
    pub open_files: [*mut c_void; NOFILE],
    pub current_dir: *mut c_void,
}
unsafe impl Sync for Process {}

impl Process {
    pub const fn new() -> Process {
        Process {
            state: ProcessState::Unused,
            sched_links: Links::new(),
            sibling_links: Links::new(),
            children: crate::list::List::new(),
            pid: 0,
            name: [0u8; PROC_NAME_LEN],
            parent: null_mut(),
            chan: null_mut(),
            killed: false,
            exit_status: 0,
            kind: SchedKind::Mlfq { level: 0, ticks: 0 },
            pagetable: null_mut(),
            memory_allocated: 0,
            kernel_stack: 0,
            trapframe: null_mut(),
            context: Context::new(),
            open_files: [null_mut(); NOFILE],
            current_dir: null_mut(),
        }
    }

    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0u8; PROC_NAME_LEN];
        let n = name.len().min(PROC_NAME_LEN - 1);
        self.name[..n].copy_from_slice(&name[..n]);
    }

    /// Returns the currently running process on this cpu, if any.
    pub fn current() -> Option<&'static mut Process> {
        let p = Cpu::current().proc;
        if p.is_null() {
            None
        } else {
            Some(unsafe { &mut *p })
        }
    }

    pub fn is_current(&self) -> bool {
        core::ptr::eq(self, Cpu::current().proc)
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }
    pub fn set_killed(&mut self, killed: bool) {
        self.killed = killed;
    }
}
impl Default for Process {
    fn default() -> Process {
        Process::new()
    }
}

/// Adapter recovering a `Process` from its `sched_links` node: used by the
/// free list, every MLFQ level queue, the stride run-list, and the sleep
/// list (never more than one at a time, per the ownership invariant).
pub struct SchedAdapter;
unsafe impl Adapter for SchedAdapter {
    type Entry = Process;
    unsafe fn links_of(entry: *mut Process) -> *mut Links {
        addr_of_mut!((*entry).sched_links)
    }
    unsafe fn entry_of(links: *mut Links) -> *mut Process {
        container_of!(links, Process, sched_links)
    }
}

/// Adapter recovering a `Process` from its `sibling_links` node: used by a
/// parent's `children` list.
pub struct ChildAdapter;
unsafe impl Adapter for ChildAdapter {
    type Entry = Process;
    unsafe fn links_of(entry: *mut Process) -> *mut Links {
        addr_of_mut!((*entry).sibling_links)
    }
    unsafe fn entry_of(links: *mut Links) -> *mut Process {
        container_of!(links, Process, sibling_links)
    }
}
