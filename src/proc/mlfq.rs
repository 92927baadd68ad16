//! Multi-Level Feedback Queue with rotation pins (§4.3).

use super::process::{Process, ProcessState, SchedAdapter, SchedKind};
use crate::list::{Adapter, Links, List};
use crate::param::{BOOSTINTERVAL, QSIZE, TA, TOTAL_TICKETS, TQ};

/// `QSIZE` FIFO levels (0 = highest priority), each with a rotation pin,
/// plus the global tick counter driving the periodic boost and the
/// not-yet-reserved ticket share.
pub struct Mlfq {
    pub queues: [List<SchedAdapter>; QSIZE],
    /// Cursor into `queues[level]`: either that level's own sentinel, or a
    /// node still linked in it (§3 invariant).
    pub pins: [*mut Links; QSIZE],
    pub ticks: u32,
    pub tickets: i32,
    /// Aggregate virtual-time clock compared against the stride heap's
    /// minimum pass (§4.4).
    pub pass: u64,
}
impl Mlfq {
    pub const fn new() -> Mlfq {
        Mlfq {
            queues: [const { List::new() }; QSIZE],
            pins: [core::ptr::null_mut(); QSIZE],
            ticks: 0,
            tickets: TOTAL_TICKETS,
            pass: 0,
        }
    }

    /// Wires up every level's sentinel and pins every level's cursor at
    /// its own (empty) sentinel. Must run once, after `self` has its final
    /// `'static` address.
    pub fn init(&mut self) {
        for level in 0..QSIZE {
            self.queues[level].init();
            self.pins[level] = self.queues[level].sentinel_ptr();
        }
    }

    /// Enqueue `p` at the tail of its recorded `level`.
    pub fn enqueue(&mut self, p: *mut Process) {
        let level = match unsafe { (*p).kind } {
            SchedKind::Mlfq { level, .. } => level,
            SchedKind::Stride { .. } => unreachable!("enqueue called on a stride process"),
        };
        self.queues[level].push_back(p);
    }

    /// Remove `p` from whichever level it is linked into, advancing that
    /// level's pin past it first if it was pinned there (§9 "Rotation
    /// pins": removal of the pinned node advances the pin to `node.next`).
    pub fn dequeue(&mut self, p: *mut Process) {
        unsafe {
            let node = SchedAdapter::links_of(p);
            for level in 0..QSIZE {
                if self.pins[level] == node {
                    self.pins[level] = (*node).next;
                }
            }
            List::<SchedAdapter>::remove(p);
        }
    }

    /// §4.3 `mlfq_select`: starting at the highest-priority non-empty
    /// level, begin at the pin and look for a RUNNABLE process, advancing
    /// the pin one node at a time. A full lap with nothing RUNNABLE moves
    /// on to the next level. Returns `None` if no MLFQ process is
    /// RUNNABLE.
    pub fn select(&mut self) -> Option<*mut Process> {
        for level in 0..QSIZE {
            if self.queues[level].is_empty() {
                continue;
            }
            let sentinel = self.queues[level].sentinel_ptr();
            let start = if self.pins[level] == sentinel {
                unsafe { (*sentinel).next }
            } else {
                self.pins[level]
            };
            let mut cursor = start;
            loop {
                let p = unsafe { SchedAdapter::entry_of(cursor) };
                if unsafe { (*p).state } == ProcessState::Runnable {
                    return Some(p);
                }
                cursor = unsafe { (*cursor).next };
                if cursor == sentinel {
                    cursor = unsafe { (*sentinel).next };
                }
                if cursor == start {
                    break;
                }
            }
        }
        None
    }

    /// §4.3 `mlfq_logic`: time accounting for the process that just ran,
    /// called only when it is of type MLFQ. Returns whether a priority
    /// boost fired this call, so the caller can also reset sleeping
    /// processes' levels (they are not linked into any `Mlfq` queue, so
    /// `boost()` alone cannot reach them).
    pub fn account(&mut self, p: *mut Process) -> bool {
        self.ticks = self.ticks.wrapping_add(1);

        let (level, ticks) = match unsafe { (*p).kind } {
            SchedKind::Mlfq { level, ticks } => (level, ticks),
            SchedKind::Stride { .. } => unreachable!("account called on a stride process"),
        };

        match unsafe { (*p).state } {
            ProcessState::Runnable => {
                let ticks = ticks + 1;
                if level < QSIZE - 1 && ticks % TA[level] == 0 {
                    self.dequeue(p);
                    unsafe {
                        (*p).kind = SchedKind::Mlfq {
                            level: level + 1,
                            ticks: 0,
                        }
                    };
                    self.enqueue(p);
                } else {
                    unsafe {
                        (*p).kind = SchedKind::Mlfq { level, ticks };
                    }
                    if ticks % TQ[level] == 0 {
                        let node = unsafe { SchedAdapter::links_of(p) };
                        self.pins[level] = unsafe { (*node).next };
                    }
                }
            }
            ProcessState::Sleeping => {
                if level < QSIZE - 1 && ticks >= TA[level] {
                    unsafe {
                        (*p).kind = SchedKind::Mlfq {
                            level: level + 1,
                            ticks: 0,
                        };
                    }
                } else {
                    let rounded = ticks - (ticks % TQ[level]);
                    unsafe {
                        (*p).kind = SchedKind::Mlfq { level, ticks: rounded };
                    }
                }
            }
            ProcessState::Zombie => {}
            other => panic!("mlfq_logic: impossible post-run state {other:?}"),
        }

        if self.ticks % BOOSTINTERVAL == 0 {
            self.boost();
            true
        } else {
            false
        }
    }

    /// §4.3 Priority boost: every non-level-0 MLFQ process (RUNNING,
    /// RUNNABLE, or SLEEPING) resets to level 0 with `ticks = 0`.
    /// RUNNABLE/RUNNING processes move by splicing their queue onto the
    /// tail of level 0 (preserving FIFO order); SLEEPING processes are
    /// reset in place since they are not linked into any MLFQ queue.
    fn boost(&mut self) {
        for level in 1..QSIZE {
            for p in self.queues[level].iter() {
                unsafe { (*p).kind = SchedKind::Mlfq { level: 0, ticks: 0 } };
            }
            let (lo, hi) = self.queues.split_at_mut(level);
            let dst = &mut lo[0];
            let src = &mut hi[0];
            let (new_dst_pin, new_src_pin) =
                src.append_all_with_pin(dst, self.pins[level], self.pins[0]);
            self.pins[0] = new_dst_pin;
            self.pins[level] = new_src_pin;
        }
    }

    /// Resets a process found on the sleep list during a boost. Exposed
    /// separately because sleeping processes are not linked into any
    /// `Mlfq` queue; the caller (`ProcTable::boost_sleeping`) walks the
    /// global sleep list directly.
    pub fn boost_sleeping(p: *mut Process) {
        unsafe {
            if let SchedKind::Mlfq { level, .. } = (*p).kind {
                if level != 0 {
                    (*p).kind = SchedKind::Mlfq { level: 0, ticks: 0 };
                }
            }
        }
    }
}
impl Default for Mlfq {
    fn default() -> Mlfq {
        Mlfq::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    fn leak(level: usize) -> *mut Process {
        let p = Box::leak(Box::new(Process::new()));
        p.state = ProcessState::Runnable;
        p.kind = SchedKind::Mlfq { level, ticks: 0 };
        p
    }

    #[test]
    fn select_returns_none_on_an_empty_mlfq() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        assert!(mlfq.select().is_none());
    }

    #[test]
    fn select_prefers_higher_priority_levels() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let lo = leak(1);
        let hi = leak(0);
        mlfq.enqueue(lo);
        mlfq.enqueue(hi);
        assert_eq!(mlfq.select(), Some(hi));
    }

    #[test]
    fn select_rotates_within_a_level_round_robin() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let a = leak(0);
        let b = leak(0);
        let c = leak(0);
        mlfq.enqueue(a);
        mlfq.enqueue(b);
        mlfq.enqueue(c);
        assert_eq!(mlfq.select(), Some(a));
        mlfq.account(a);
        assert_eq!(mlfq.select(), Some(b));
        mlfq.account(b);
        assert_eq!(mlfq.select(), Some(c));
        mlfq.account(c);
        assert_eq!(mlfq.select(), Some(a));
    }

    #[test]
    fn select_skips_a_non_runnable_process_without_losing_the_pin() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let a = leak(0);
        let b = leak(0);
        mlfq.enqueue(a);
        mlfq.enqueue(b);
        unsafe { (*a).state = ProcessState::Sleeping };
        assert_eq!(mlfq.select(), Some(b));
    }

    /// `TA = [5, 10, MAX]`, `TQ = [1, 2, 4]`: a process that keeps running
    /// demotes from level 0 to level 1 after 5 ticks at level 0.
    #[test]
    fn account_demotes_at_the_level_allotment() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let p = leak(0);
        mlfq.enqueue(p);
        for _ in 0..TA[0] {
            mlfq.account(p);
        }
        assert_eq!(unsafe { (*p).kind }, SchedKind::Mlfq { level: 1, ticks: 0 });
    }

    #[test]
    fn account_does_not_demote_before_the_allotment() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let p = leak(0);
        mlfq.enqueue(p);
        for _ in 0..TA[0] - 1 {
            mlfq.account(p);
        }
        assert_eq!(
            unsafe { (*p).kind },
            SchedKind::Mlfq { level: 0, ticks: TA[0] - 1 }
        );
    }

    #[test]
    fn account_never_demotes_past_the_last_level() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let p = leak(QSIZE - 1);
        mlfq.enqueue(p);
        for _ in 0..1000 {
            mlfq.account(p);
        }
        assert!(matches!(
            unsafe { (*p).kind },
            SchedKind::Mlfq { level, .. } if level == QSIZE - 1
        ));
    }

    #[test]
    fn account_fires_a_boost_every_boostinterval_ticks() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let p = leak(2);
        mlfq.enqueue(p);
        let mut boosted = false;
        for _ in 0..BOOSTINTERVAL {
            boosted = mlfq.account(p);
        }
        assert!(boosted);
        assert!(matches!(unsafe { (*p).kind }, SchedKind::Mlfq { level: 0, .. }));
    }

    /// A sleeping process is never linked into a queue, so `account` still
    /// has to demote it by ticks alone once it reaches the allotment.
    #[test]
    fn account_demotes_a_sleeping_process_at_the_allotment() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let p = leak(0);
        unsafe {
            (*p).state = ProcessState::Sleeping;
            (*p).kind = SchedKind::Mlfq { level: 0, ticks: TA[0] };
        }
        mlfq.account(p);
        assert_eq!(unsafe { (*p).kind }, SchedKind::Mlfq { level: 1, ticks: 0 });
    }

    /// Below the allotment, a sleeping process's ticks just round down to
    /// the nearest `TQ[level]` multiple instead of demoting.
    #[test]
    fn account_rounds_a_sleeping_process_down_to_a_quantum_multiple() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let p = leak(1);
        unsafe {
            (*p).state = ProcessState::Sleeping;
            (*p).kind = SchedKind::Mlfq { level: 1, ticks: 3 };
        }
        mlfq.account(p);
        assert_eq!(unsafe { (*p).kind }, SchedKind::Mlfq { level: 1, ticks: 2 });
    }

    #[test]
    fn boost_resets_every_non_zero_level_process_while_preserving_fifo_order() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let a = leak(1);
        let b = leak(1);
        mlfq.enqueue(a);
        mlfq.enqueue(b);

        // A level-`QSIZE - 1` process never demotes, so driving the global
        // tick counter through it doesn't perturb `a`/`b`'s own levels.
        let runner = leak(QSIZE - 1);
        mlfq.enqueue(runner);
        for _ in 0..BOOSTINTERVAL {
            mlfq.account(runner);
        }

        assert!(matches!(unsafe { (*a).kind }, SchedKind::Mlfq { level: 0, ticks: 0 }));
        assert!(matches!(unsafe { (*b).kind }, SchedKind::Mlfq { level: 0, ticks: 0 }));
        assert_eq!(mlfq.select(), Some(a));
        mlfq.dequeue(a);
        assert_eq!(mlfq.select(), Some(b));
    }

    #[test]
    fn dequeue_advances_a_pin_sitting_on_the_removed_node() {
        let mut mlfq = Mlfq::new();
        mlfq.init();
        let a = leak(0);
        let b = leak(0);
        let c = leak(0);
        mlfq.enqueue(a);
        mlfq.enqueue(b);
        mlfq.enqueue(c);
        assert_eq!(mlfq.select(), Some(a));
        mlfq.account(a); // TQ[0] == 1: the pin now sits on `b`.
        mlfq.dequeue(b);
        assert_eq!(mlfq.select(), Some(c));
    }
}
