//! Structured tracing macros for the Smith runtime.
//!
//! Each subsystem logs under its own target so operators can filter the
//! scheduler, tool dispatch, planning, and agent-tree streams
//! independently (e.g. `RUST_LOG=smith::sched=debug,smith::ops=trace`).

/// Trace scheduler-level events (ready queue, worker lifecycle, commits).
#[macro_export]
macro_rules! smith_sched {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "smith::sched", $($arg)*)
    }
}

/// Trace tool dispatch, retries, and completion.
#[macro_export]
macro_rules! smith_op {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "smith::ops", $($arg)*)
    }
}

/// Trace planner attempts, validation, and repair.
#[macro_export]
macro_rules! smith_plan {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "smith::plan", $($arg)*)
    }
}

/// Trace agent-tree transitions (sub-agents, fleets).
#[macro_export]
macro_rules! smith_agent {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "smith::agent", $($arg)*)
    }
}

/// Trace resource lock ownership transitions.
#[macro_export]
macro_rules! smith_lock {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!(target: "smith::locks", $($arg)*)
    }
}
