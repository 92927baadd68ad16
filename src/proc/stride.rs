//! Stride scheduler: min-heap of runnable stride processes plus a run-list
//! for the one (if any) currently dispatched out of the heap (§4.2, §4.4).

use super::process::{Process, ProcessState, SchedAdapter, SchedKind};
use crate::error::ShareError;
use crate::list::List;
use crate::param::{BARRIER, MAXPASS, NPROC, RESERVE, STRIDE_CONST, TOTAL_TICKETS};
use arrayvec::ArrayVec;

use super::mlfq::Mlfq;

/// A fixed-capacity binary min-heap of stride processes keyed by `pass`,
/// plus the run-list holding the (at most one) stride process currently
/// dispatched out of the heap, plus the MLFQ-side aggregate `pass` used for
/// arbitration (§4.4).
pub struct Stride {
    heap: ArrayVec<*mut Process, NPROC>,
    pub run_list: List<SchedAdapter>,
}
impl Stride {
    pub const fn new() -> Stride {
        Stride {
            heap: ArrayVec::new_const(),
            run_list: List::new(),
        }
    }

    /// Must be called exactly once, after `self` has its final `'static`
    /// address, before any other operation.
    pub fn init(&mut self) {
        self.run_list.init();
    }

    fn pass_of(p: *mut Process) -> u64 {
        match unsafe { (*p).kind } {
            SchedKind::Stride { pass, .. } => pass,
            SchedKind::Mlfq { .. } => unreachable!("stride heap holds a non-stride process"),
        }
    }

    /// §4.2 `push`: append and sift up while `p.pass < parent.pass`.
    ///
    /// # Panics
    /// Panics if the heap is already at `NPROC` capacity; the process table
    /// never holds more than `NPROC` live processes, so this cannot happen
    /// in practice.
    pub fn push(&mut self, p: *mut Process) {
        self.heap
            .try_push(p)
            .expect("stride heap: capacity exceeded");
        let mut i = self.heap.len() - 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if Self::pass_of(self.heap[i]) < Self::pass_of(self.heap[parent]) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    /// §4.2 `pop`: remove the minimum, move the last element to the root,
    /// and sift down choosing the smaller child; ties favor the lower index.
    pub fn pop(&mut self) -> Option<*mut Process> {
        if self.heap.is_empty() {
            return None;
        }
        let min = self.heap[0];
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        self.heap.pop();

        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.heap.len()
                && Self::pass_of(self.heap[left]) < Self::pass_of(self.heap[smallest])
            {
                smallest = left;
            }
            if right < self.heap.len()
                && Self::pass_of(self.heap[right]) < Self::pass_of(self.heap[smallest])
            {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(i, smallest);
            i = smallest;
        }
        Some(min)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// §4.2 `min_pass`: the root's pass, or `MAXPASS` if the heap is empty.
    pub fn min_pass(&self) -> u64 {
        self.heap.first().map_or(MAXPASS, |&p| Self::pass_of(p))
    }

    /// §4.4: selection compares `heap.min_pass()` to `mlfq.pass`; strict-less
    /// ties go to MLFQ. Peeks only; does not pop.
    pub fn should_run_before(&self, mlfq_pass: u64) -> bool {
        !self.is_empty() && self.min_pass() < mlfq_pass
    }

    /// §4.4 `stride_logic`, called on every scheduler iteration regardless
    /// of which side was selected. `running` is the process the scheduler
    /// just dispatched, if any.
    ///
    /// If `running` is a stride process and not ZOMBIE, advances its pass
    /// by its stride (`STRIDE_CONST / tickets`); if it is still RUNNABLE
    /// (it called `yield()`), removes it from the run-list and pushes it
    /// back into the heap. A SLEEPING stride process was already moved off
    /// the run-list onto the sleep list by `park_current`, so nothing
    /// further is done with it here; a ZOMBIE one was already removed from
    /// the run-list by `exit()`.
    ///
    /// Every other run-list occupant (a stride process woken while off the
    /// heap entirely, per §4.6's resolution: `wakeup1` parks it on the
    /// run-list rather than the heap directly) is reinserted into the heap
    /// with a freshly computed pass joining the current virtual-time
    /// frontier.
    ///
    /// If MLFQ ran, or nothing did, `mlfq.pass` advances by its own stride
    /// (`STRIDE_CONST / mlfq.tickets`), mirroring a stride process's own
    /// accounting so the two sides share one virtual clock.
    ///
    /// Finally renormalizes every pass (heap, run-list, and `mlfq.pass`) if
    /// the chosen minimum exceeds `BARRIER`.
    pub fn logic(&mut self, mlfq: &mut Mlfq, running: Option<*mut Process>) {
        let running_is_stride = running.is_some_and(|p| unsafe { (*p).kind.is_stride() });

        if let Some(p) = running {
            if let SchedKind::Stride { tickets, pass } = unsafe { (*p).kind } {
                let state = unsafe { (*p).state };
                if state != ProcessState::Zombie {
                    let stride = STRIDE_CONST / tickets.max(1) as u64;
                    unsafe {
                        (*p).kind = SchedKind::Stride {
                            tickets,
                            pass: pass + stride,
                        };
                    }
                }
                if state == ProcessState::Runnable {
                    unsafe { List::<SchedAdapter>::remove(p) };
                    self.push(p);
                }
            }
        }

        let woken: ArrayVec<*mut Process, NPROC> = self
            .run_list
            .iter()
            .filter(|&p| Some(p) != running)
            .collect();
        for p in woken {
            unsafe { List::<SchedAdapter>::remove(p) };
            let pass = self.min_pass().min(mlfq.pass);
            if let SchedKind::Stride { tickets, .. } = unsafe { (*p).kind } {
                unsafe { (*p).kind = SchedKind::Stride { tickets, pass } };
            }
            self.push(p);
        }

        if !running_is_stride {
            let stride = STRIDE_CONST / mlfq.tickets.max(1) as u64;
            mlfq.pass = mlfq.pass.wrapping_add(stride);
        }

        let minpass = match running {
            Some(p) if running_is_stride => Self::pass_of(p),
            _ => mlfq.pass,
        };

        if minpass > BARRIER {
            for slot in self.heap.iter() {
                unsafe {
                    if let SchedKind::Stride { tickets, pass } = (**slot).kind {
                        (**slot).kind = SchedKind::Stride {
                            tickets,
                            pass: pass.saturating_sub(minpass),
                        };
                    }
                }
            }
            for p in self.run_list.iter() {
                unsafe {
                    if let SchedKind::Stride { tickets, pass } = (*p).kind {
                        (*p).kind = SchedKind::Stride {
                            tickets,
                            pass: pass.saturating_sub(minpass),
                        };
                    }
                }
            }
            mlfq.pass = mlfq.pass.saturating_sub(minpass);
        }
    }

    /// §4.4 `set_cpu_share(n)`, `1 ≤ n ≤ 100 - RESERVE`. Succeeds only if,
    /// after reservation, the MLFQ remainder is still `≥ RESERVE`.
    ///
    /// If the caller is already STRIDE, its old tickets are folded back
    /// into the remaining budget before validating, so reassignment is
    /// atomic rather than a reject-then-retry. If the caller was MLFQ,
    /// it is dequeued from its level, its pass is set to
    /// `min(heap.min_pass(), mlfq.pass)`, joining at the current
    /// virtual-time frontier (neither free credit nor starvation), and it
    /// is placed on the run-list (it is the running process, hence not in
    /// the heap).
    pub fn set_cpu_share(&mut self, mlfq: &mut Mlfq, p: *mut Process, n: i32) -> Result<(), ShareError> {
        if !(1..=TOTAL_TICKETS - RESERVE).contains(&n) {
            return Err(ShareError::OutOfRange);
        }

        let old_tickets = match unsafe { (*p).kind } {
            SchedKind::Stride { tickets, .. } => tickets,
            SchedKind::Mlfq { .. } => 0,
        };
        let remainder = mlfq.tickets + old_tickets - n;
        if remainder < RESERVE {
            return Err(ShareError::InsufficientRemainder);
        }

        mlfq.tickets = remainder;

        match unsafe { (*p).kind } {
            SchedKind::Mlfq { .. } => {
                mlfq.dequeue(p);
                let pass = self.min_pass().min(mlfq.pass);
                unsafe {
                    (*p).kind = SchedKind::Stride { tickets: n, pass };
                }
                self.run_list.push_back(p);
            }
            SchedKind::Stride { pass, .. } => unsafe {
                (*p).kind = SchedKind::Stride { tickets: n, pass };
            },
        }

        Ok(())
    }

    /// Woken stride processes (previously parked on the sleep list, hence
    /// absent from both the heap and the run-list) are parked on the
    /// run-list rather than pushed into the heap directly, per §4.6's
    /// resolution of the sleeping-stride-process open question: the next
    /// `logic()` call reinserts them with a freshly computed pass (see
    /// DESIGN.md).
    pub fn wake_into_run_list(&mut self, p: *mut Process) {
        unsafe {
            (*p).state = ProcessState::Runnable;
        }
        self.run_list.push_back(p);
    }
}
impl Default for Stride {
    fn default() -> Stride {
        Stride::new()
    }
}
