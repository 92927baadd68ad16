//! Typed error taxonomy (§7). Every syscall-facing lifecycle operation
//! returns one of these via `Result` instead of a C-style sentinel; kernel-
//! internal invariant breaches still `panic!`, for conditions that should
//! halt the machine rather than fail gracefully.

/// Resource exhaustion and invalid-argument failures from process
/// lifecycle operations (`fork`, `wait`, `kill`, `allocproc`, ...).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessError {
    /// No free slot in the process table.
    MaxProcesses,
    /// A page-table or kernel-stack allocation failed; any partial state
    /// has already been rolled back.
    Allocation,
    /// `wait()` was called with no children, living or zombie.
    NoChildren,
    /// The caller was killed while waiting.
    Killed,
    /// Copying the exit status out to user memory failed.
    PageError,
    /// `kill()` found no process with the given pid.
    UnknownPid,
}

/// `set_cpu_share` failures (§6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShareError {
    /// `n` was not in `1..=(100 - RESERVE)`.
    OutOfRange,
    /// Granting `n` would leave MLFQ's remaining share below `RESERVE`.
    InsufficientRemainder,
}
