//! The process table: one fixed array of slots, a free list, a sleep list,
//! the MLFQ and stride structures, and the single spinlock protecting all
//! of it (§3 "Process table", §5 "Scheduling model").

use super::context::Context;
use super::mlfq::Mlfq;
use super::process::{ChildAdapter, Process, ProcessState, SchedAdapter, SchedKind};
use super::stride::Stride;
use crate::collab;
use crate::error::{ProcessError, ShareError};
use crate::list::List;
use crate::param::NPROC;
use crate::sync::spinlock::Spinlock;
use core::ptr::{addr_of_mut, null_mut};

/// Bundles every piece of scheduler state behind one lock (§5: "a single
/// global spinlock"). A deliberate simplification relative to a per-
/// process-lock design: see DESIGN.md.
pub struct ProcTable {
    lock: Spinlock,
    procs: [Process; NPROC],
    free_list: List<SchedAdapter>,
    sleep_list: List<SchedAdapter>,
    mlfq: Mlfq,
    stride: Stride,
    next_pid: i32,
    initproc: *mut Process,
}
unsafe impl Sync for ProcTable {}

pub static PROC_TABLE: ProcTable = ProcTable {
    lock: Spinlock::new(),
    procs: [const { Process::new() }; NPROC],
    free_list: List::new(),
    sleep_list: List::new(),
    mlfq: Mlfq::new(),
    stride: Stride::new(),
    next_pid: 1,
    initproc: null_mut(),
};

impl ProcTable {
    /// §4.7 "`ProcTable::init()`": zero every slot, build the free list (all
    /// `NPROC` slots, in order), reset MLFQ, reset stride. Must be called
    /// exactly once, at boot, before any other operation.
    ///
    /// # Safety
    /// Must run before any other thread touches [`PROC_TABLE`], and the
    /// table's final address must already be fixed (true for a `'static`).
    pub unsafe fn init(&self) {
        let this = self.mut_ref();
        this.free_list.init();
        this.sleep_list.init();
        this.mlfq = Mlfq::new();
        this.mlfq.init();
        this.stride = Stride::new();
        this.stride.init();
        this.next_pid = 1;
        this.initproc = null_mut();
        for p in this.procs.iter_mut() {
            *p = Process::new();
            p.children.init();
            this.free_list.push_back(p);
        }
    }

    #[allow(clippy::mut_from_ref)]
    #[allow(invalid_reference_casting)]
    pub(super) unsafe fn mut_ref(&self) -> &mut ProcTable {
        &mut *(self as *const ProcTable as *mut ProcTable)
    }

    /// §4.7 `allocproc`: pops a slot from the free list, assigns a fresh
    /// pid, sets EMBRYO, allocates a kernel stack, reserves trap-frame
    /// space, and sets up a context that resumes at `forkret`. On kstack
    /// allocation failure the slot is returned to the free list.
    fn alloc(&self) -> Result<*mut Process, ProcessError> {
        let this = unsafe { self.mut_ref() };
        let p = this.free_list.pop_front().ok_or(ProcessError::MaxProcesses)?;
        unsafe {
            (*p).pid = this.next_pid;
            this.next_pid += 1;
            (*p).state = ProcessState::Embryo;
            (*p).kind = SchedKind::Mlfq { level: 0, ticks: 0 };

            (*p).kernel_stack = collab::kstack_alloc();
            if (*p).kernel_stack == 0 {
                (*p).state = ProcessState::Unused;
                this.free_list.push_back(p);
                return Err(ProcessError::Allocation);
            }

            (*p).pagetable = collab::proc_pagetable(core::ptr::null_mut());
            if (*p).pagetable.is_null() {
                collab::kstack_free((*p).kernel_stack);
                (*p).kernel_stack = 0;
                (*p).state = ProcessState::Unused;
                this.free_list.push_back(p);
                return Err(ProcessError::Allocation);
            }

            (*p).context = Context::new();
            (*p).context.ra = forkret as usize as u64;
            (*p).context.sp = (*p).kernel_stack as u64;
        }
        Ok(p)
    }

    /// §4.7: builds the first process and hands it to the MLFQ, level 0,
    /// RUNNABLE. Must run exactly once, after [`ProcTable::init`].
    pub fn userinit(&self) {
        let _guard = self.lock.lock();
        let this = unsafe { self.mut_ref() };
        let p = self.alloc().expect("userinit: process table exhausted");
        unsafe {
            (*p).set_name(b"initproc");
            (*p).state = ProcessState::Runnable;
        }
        this.mlfq.enqueue(p);
        this.initproc = p;
    }

    /// §4.7 `fork()`: allocates a child, duplicates the address space, trap
    /// frame, open files, cwd, and name; links it into the parent's
    /// children list; marks it RUNNABLE MLFQ level 0.
    pub fn fork(&self) -> Result<i32, ProcessError> {
        let _guard = self.lock.lock();
        let this = unsafe { self.mut_ref() };
        let parent = Process::current().expect("fork: no current process");
        let child = self.alloc()?;

        unsafe {
            if collab::uvmcopy(parent.pagetable, (*child).pagetable, parent.memory_allocated) < 0 {
                this.freeproc(child);
                return Err(ProcessError::Allocation);
            }
            (*child).memory_allocated = parent.memory_allocated;
            *(*child).trapframe = *parent.trapframe;
            (*(*child).trapframe).a0 = 0;

            for (dst, src) in (*child).open_files.iter_mut().zip(parent.open_files.iter()) {
                *dst = if src.is_null() {
                    null_mut()
                } else {
                    collab::filedup(*src)
                };
            }
            (*child).current_dir = collab::idup(parent.current_dir);
            (*child).set_name(&parent.name);

            let pid = (*child).pid;
            (*child).parent = parent as *mut Process;
            parent.children.push_back(child);

            (*child).state = ProcessState::Runnable;
            this.mlfq.enqueue(child);
            Ok(pid)
        }
    }

    /// §4.7 `exit()`: closes files and cwd, wakes a waiting parent,
    /// reparents children to init, removes itself from whatever runnable
    /// structure it was in, marks ZOMBIE, and calls `sched()`. Never
    /// returns.
    pub fn exit(&self, status: i32) -> ! {
        let p = Process::current().expect("exit: no current process");
        assert!(p as *mut Process != self.initproc, "init exiting");

        unsafe {
            for file in p.open_files.iter_mut() {
                if !file.is_null() {
                    collab::fileclose(*file);
                    *file = null_mut();
                }
            }
            collab::iput(p.current_dir);
            p.current_dir = null_mut();
        }

        {
            let _guard = self.lock.lock();
            let this = unsafe { self.mut_ref() };
            this.reparent(p);
            unsafe {
                if !p.parent.is_null() {
                    this.wakeup1(p.parent as *mut core::ffi::c_void);
                }
            }

            match p.kind {
                SchedKind::Mlfq { .. } => this.mlfq.dequeue(p),
                SchedKind::Stride { tickets, .. } => {
                    unsafe { List::<SchedAdapter>::remove(p) };
                    this.mlfq.tickets += tickets;
                }
            }
            p.exit_status = status;
            p.state = ProcessState::Zombie;

            unsafe { super::scheduler::sched() };
        }
        unreachable!("exit: sched() returned");
    }

    /// §4.7 `wait(addr)`: scan children; reap any ZOMBIE via `freeproc` and
    /// return its pid. No children (dead or alive) or a killed caller
    /// returns an error. Otherwise sleep on the caller's own address until
    /// a child signals via `exit`.
    ///
    /// `addr == 0` means the caller doesn't want the exit status; otherwise
    /// it is copied out to the caller's address space and a copyout failure
    /// reaps nothing and reports `PageError`.
    pub fn wait_for_child(&self, addr: u64) -> Result<i32, ProcessError> {
        let p = Process::current().expect("wait: no current process");
        let _guard = self.lock.lock();
        loop {
            if p.children.iter().next().is_none() {
                return Err(ProcessError::NoChildren);
            }
            for child in p.children.iter() {
                if unsafe { (*child).state } == ProcessState::Zombie {
                    let pid = unsafe { (*child).pid };
                    if addr != 0 {
                        let mut status = unsafe { (*child).exit_status };
                        let ok = unsafe {
                            collab::copyout(
                                p.pagetable,
                                addr,
                                core::ptr::addr_of_mut!(status).cast(),
                                core::mem::size_of::<i32>() as u64,
                            )
                        };
                        if ok < 0 {
                            return Err(ProcessError::PageError);
                        }
                    }
                    let this = unsafe { self.mut_ref() };
                    this.freeproc(child);
                    return Ok(pid);
                }
            }
            if p.is_killed() {
                return Err(ProcessError::Killed);
            }
            unsafe {
                super::scheduler::sleep(p as *mut Process as *mut core::ffi::c_void);
            }
        }
    }

    /// §4.6 `kill(pid)`: scan the table; mark `killed`, and if SLEEPING,
    /// transition to RUNNABLE and re-link per §4.6/§9.
    pub fn kill(&self, pid: i32) -> Result<(), ProcessError> {
        let _guard = self.lock.lock();
        let this = unsafe { self.mut_ref() };
        for i in 0..this.procs.len() {
            let p = addr_of_mut!(this.procs[i]);
            unsafe {
                if (*p).pid == pid && (*p).state != ProcessState::Unused {
                    (*p).set_killed(true);
                    if (*p).state == ProcessState::Sleeping {
                        this.wake_one(p);
                    }
                    return Ok(());
                }
            }
        }
        Err(ProcessError::UnknownPid)
    }

    /// §6 `set_cpu_share(n)`.
    pub fn set_cpu_share(&self, n: i32) -> Result<(), ShareError> {
        let _guard = self.lock.lock();
        let this = unsafe { self.mut_ref() };
        let p = Process::current().expect("set_cpu_share: no current process");
        this.stride.set_cpu_share(&mut this.mlfq, p as *mut Process, n)
    }

    /// §6 `inctick()`: charge the current process one tick, bypassing the
    /// scheduler's own per-iteration accounting (used by timer-driven sleep
    /// syscalls so a process cannot dodge MLFQ demotion by sleeping right
    /// before its quantum expires).
    pub fn inctick(&self) {
        let _guard = self.lock.lock();
        let this = unsafe { self.mut_ref() };
        if let Some(p) = Process::current() {
            if p.kind.is_stride() {
                return;
            }
            if this.mlfq.account(p as *mut Process) {
                this.boost_sleeping();
            }
        }
    }

    /// §4.6 `wakeup(chan)` (public): acquires the ptable lock, calls
    /// `wakeup1`, releases.
    pub fn wakeup(&self, chan: *mut core::ffi::c_void) {
        let _guard = self.lock.lock();
        unsafe { self.mut_ref() }.wakeup1(chan);
    }

    /// `wakeup1`, ptable lock already held. Iterates the sleep list,
    /// re-linking every matching process per §4.6.
    pub(super) fn wakeup1(&mut self, chan: *mut core::ffi::c_void) {
        let matches: arrayvec::ArrayVec<*mut Process, NPROC> =
            self.sleep_list.iter().filter(|&p| unsafe { (*p).chan } == chan).collect();
        for p in matches {
            self.wake_one(p);
        }
    }

    fn wake_one(&mut self, p: *mut Process) {
        unsafe {
            List::<SchedAdapter>::remove(p);
            (*p).state = ProcessState::Runnable;
            (*p).chan = null_mut();
            match (*p).kind {
                SchedKind::Mlfq { .. } => self.mlfq.enqueue(p),
                SchedKind::Stride { .. } => self.stride.wake_into_run_list(p),
            }
        }
    }

    /// §4.6 `sleep`: caller holds the ptable lock (via `SpinlockGuard`,
    /// threaded through [`Spinlock::sleep_on`]). Unlinks `p` from its
    /// current structure, marks SLEEPING, parks it at the head of the
    /// sleep list.
    pub(super) fn park_current(&mut self, p: *mut Process, chan: *mut core::ffi::c_void) {
        unsafe {
            match (*p).kind {
                SchedKind::Mlfq { .. } => self.mlfq.dequeue(p),
                SchedKind::Stride { .. } => {
                    List::<SchedAdapter>::remove(p);
                }
            }
            (*p).chan = chan;
            (*p).state = ProcessState::Sleeping;
            self.sleep_list.push_front(p);
        }
    }

    /// §4.7: passes `p`'s abandoned children to init. Caller holds the
    /// ptable lock.
    fn reparent(&mut self, p: *mut Process) {
        for i in 0..self.procs.len() {
            let pp = addr_of_mut!(self.procs[i]);
            unsafe {
                if core::ptr::eq((*pp).parent, p) {
                    List::<ChildAdapter>::remove(pp);
                    (*pp).parent = self.initproc;
                    (*self.initproc).children.push_back(pp);
                    if (*self.initproc).state != ProcessState::Unused {
                        self.wakeup1(self.initproc as *mut core::ffi::c_void);
                    }
                }
            }
        }
    }

    /// §4.7 `freeproc`: releases the kernel stack, frees the page tables,
    /// drops the child linkage, and returns the slot to the free list.
    fn freeproc(&mut self, p: *mut Process) {
        unsafe {
            if (*p).kernel_stack != 0 {
                collab::kstack_free((*p).kernel_stack);
            }
            (*p).kernel_stack = 0;
            if !(*p).pagetable.is_null() {
                collab::proc_freepagetable((*p).pagetable, (*p).memory_allocated);
            }
            (*p).pagetable = null_mut();
            (*p).memory_allocated = 0;
            (*p).trapframe = null_mut();
            List::<ChildAdapter>::remove(p);
            (*p).parent = null_mut();
            (*p).name = [0u8; crate::param::PROC_NAME_LEN];
            (*p).chan = null_mut();
            (*p).killed = false;
            (*p).exit_status = 0;
            (*p).pid = 0;
            (*p).state = ProcessState::Unused;
        }
        self.free_list.push_back(p);
    }

    pub(super) fn mlfq_mut(&self) -> &mut Mlfq {
        unsafe { &mut self.mut_ref().mlfq }
    }
    pub(super) fn stride_mut(&self) -> &mut Stride {
        unsafe { &mut self.mut_ref().stride }
    }
    pub(super) fn lock(&self) -> &Spinlock {
        &self.lock
    }

    /// §4.3 "priority boost": resets sleeping MLFQ processes' levels to 0
    /// in place, since they are not linked into any `Mlfq` queue.
    pub(super) fn boost_sleeping(&mut self) {
        for p in self.sleep_list.iter() {
            Mlfq::boost_sleeping(p);
        }
    }
}

#[cfg(not(test))]
extern "C" {
    /// The entry point a freshly allocated process's context resumes at on
    /// its first schedule; finishes setup that cannot run with the ptable
    /// lock held and then returns to user space. Supplied by the platform
    /// the scheduler core is linked into.
    fn forkret();
}

/// Hosted stand-in used only by `#[cfg(test)]`, mirroring the `collab`
/// seam: the scheduler core never calls through this pointer itself, it
/// only needs `forkret` to resolve to a linkable symbol.
#[cfg(test)]
unsafe extern "C" fn forkret() {}
