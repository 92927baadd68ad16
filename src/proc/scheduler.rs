//! The per-CPU scheduler loop and the suspension primitives built on it
//! (§4.4 arbitration, §4.5, §4.6, §5).

use super::cpu::Cpu;
use super::process::{Process, ProcessState};
use super::table::PROC_TABLE;
use crate::arch;
use crate::collab;
use crate::trap::intr_off_depth;
use core::ffi::c_void;

/// §5: the only primitive that actually parks a kernel thread. Caller must
/// currently hold the ptable lock, must be at exactly one level of cli
/// nesting, and the caller's state must already be something other than
/// RUNNING.
///
/// # Panics
/// On any violation of the §5 preconditions; these are kernel-fatal.
pub unsafe fn sched() {
    let p = Process::current().expect("sched: no current process");
    let cpu = Cpu::current();

    if !PROC_TABLE.lock().held_by_current_cpu() {
        crate::log_scheduler_violation!("sched called without the ptable lock held");
        panic!("sched: ptable lock not held");
    } else if intr_off_depth() != 1 {
        crate::log_scheduler_violation!("sched called at cli depth {}", intr_off_depth());
        panic!("sched: locks");
    } else if p.state == ProcessState::Running {
        crate::log_scheduler_violation!("sched called with caller still RUNNING");
        panic!("sched: running");
    } else if arch::interrupts_enabled() {
        crate::log_scheduler_violation!("sched called with interrupts enabled");
        panic!("sched: interruptible");
    }

    let previous_interrupts_enabled = cpu.previous_interrupts_enabled;
    collab::swtch(&mut p.context, &mut cpu.context);
    cpu.previous_interrupts_enabled = previous_interrupts_enabled;
}

/// §4.7 `yield()`: give up the CPU for one scheduling round. A stride
/// caller stays on the run-list; `stride_logic` removes it and pushes it
/// back into the heap with an advanced pass once control returns to the
/// scheduler loop.
pub fn r#yield() {
    let _guard = PROC_TABLE.lock().lock();
    let p = Process::current().expect("yield: no current process");
    p.state = ProcessState::Runnable;
    unsafe { sched() };
}

/// §4.6 `sleep(chan, lk)`. In this crate's single-global-lock design `lk`
/// is always the ptable lock, so the caller is simply required to already
/// hold it; the distilled "release lk, reacquire after" dance collapses
/// since there is only ever one lock in play (see DESIGN.md).
///
/// # Safety
/// Caller must already hold the ptable lock.
pub unsafe fn sleep(chan: *mut c_void) {
    let p = Process::current().expect("sleep: no current process");
    PROC_TABLE.mut_ref().park_current(p as *mut Process, chan);
    sched();
}

/// §4.6 `wakeup(chan)` (public).
pub fn wakeup(chan: *mut c_void) {
    PROC_TABLE.wakeup(chan);
}

/// §4.6 `kill(pid)`.
pub fn kill(pid: i32) -> Result<(), crate::error::ProcessError> {
    PROC_TABLE.kill(pid)
}

/// §6 `inctick()`.
pub fn inctick() {
    PROC_TABLE.inctick();
}

/// §4.5: each CPU, after self-setup, clears its current-proc pointer and
/// loops forever: enable interrupts briefly, acquire the ptable lock,
/// choose the next process by the stride-vs-MLFQ rule, dispatch it if
/// RUNNABLE, and on return run MLFQ accounting (if applicable) and stride
/// accounting (always), then release the lock.
pub fn scheduler() -> ! {
    let cpu = Cpu::current();
    cpu.proc = core::ptr::null_mut();

    loop {
        unsafe { arch::enable_interrupts() };

        let _guard = PROC_TABLE.lock().lock();
        let table = unsafe { PROC_TABLE.mut_ref() };

        let chosen = if table
            .stride_mut()
            .should_run_before(table.mlfq_mut().pass)
        {
            table.stride_mut().pop()
        } else {
            table.mlfq_mut().select()
        };

        let mut ran = None;
        if let Some(p) = chosen {
            if unsafe { (*p).state } == ProcessState::Runnable {
                if unsafe { (*p).kind.is_stride() } {
                    table.stride_mut().run_list.push_back(p);
                }
                cpu.proc = p;
                unsafe {
                    (*p).state = ProcessState::Running;
                    collab::swtch(&mut cpu.context, &mut (*p).context);
                }
                cpu.proc = core::ptr::null_mut();
                ran = Some(p);
            }
        }

        if let Some(p) = ran {
            if !unsafe { (*p).kind.is_stride() } && table.mlfq_mut().account(p) {
                table.boost_sleeping();
            }
        }
        table.stride_mut().logic(table.mlfq_mut(), ran);
    }
}
