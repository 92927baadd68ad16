//! Tunable constants for the scheduler core.
//!
//! Mirrors xv6's `param.h`, extended with the MLFQ/stride knobs this
//! scheduler needs. Values for `TQ`/`TA`/`BOOSTINTERVAL`/`RESERVE` match the
//! canonical MLFQ+stride course assignment this core descends from.

/// Maximum number of processes.
pub const NPROC: usize = 64;
/// Maximum number of CPUs.
pub const NCPU: usize = 8;
/// Maximum number of open files per process.
pub const NOFILE: usize = 16;
/// Maximum length of a process name, including the terminating nul.
pub const PROC_NAME_LEN: usize = 16;

/// Number of MLFQ priority levels. Index 0 is highest priority.
pub const QSIZE: usize = 3;
/// Time quantum per level: forced yield-within-level every `TQ[level]` ticks.
pub const TQ: [u32; QSIZE] = [1, 2, 4];
/// Time allotment per level: demote to `level + 1` after `TA[level]` ticks
/// consumed at this level. The last level never demotes further.
pub const TA: [u32; QSIZE] = [5, 10, u32::MAX];
/// Global MLFQ ticks between priority boosts.
pub const BOOSTINTERVAL: u32 = 100;

/// Total ticket pool shared between MLFQ's aggregate share and all stride
/// processes. Must always equal `mlfq.tickets + sum(stride tickets)`.
pub const TOTAL_TICKETS: i32 = 100;
/// Minimum ticket share `set_cpu_share` must leave for MLFQ.
pub const RESERVE: i32 = 20;

/// Numerator for `stride(tickets) = STRIDE_CONST / tickets`.
pub const STRIDE_CONST: u64 = 10_000;
/// Renormalization threshold: when the minimum pass in play exceeds this,
/// subtract it from every pass in play.
pub const BARRIER: u64 = u64::MAX / 2;
/// Sentinel "no stride process wants the CPU" pass value.
pub const MAXPASS: u64 = u64::MAX;
