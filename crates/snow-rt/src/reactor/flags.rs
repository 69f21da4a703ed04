//! Work-class bitset driving the Loop Policy (§3 of the reactor spec).
//!
//! Mirrors `work_flags_t` from the original `reactor.h` bit for bit: the
//! numeric values don't matter to callers, but the derived masks
//! (`TASKS`/`PENDING`/`BLOCKING_CANDIDATES`/`ASYNC`) must line up exactly
//! with `WORK_TASKS`/`WORK_PENDING`/`WORK_BLOCKING`/`WORK_ASYNC`.

use bitflags::bitflags;

bitflags! {
    /// One bit per task class the reactor knows how to wait on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WorkFlags: u16 {
        const MICROTASKS       = 1 << 0;
        const TIMERS           = 1 << 1;
        const IMMEDIATES       = 1 << 2;
        const COROUTINES       = 1 << 3;
        /// Advisory only: at least one queued coroutine has `ready == true`.
        /// Never folded into `PENDING` -- a reactor with only non-ready
        /// coroutines left must be able to terminate (§4.5 property 3).
        const COROUTINES_READY = 1 << 4;
        const FETCHES           = 1 << 5;
        const FS_OPS            = 1 << 6;
        const CHILD_PROCS       = 1 << 7;
        const READLINE          = 1 << 8;
        const STDIN             = 1 << 9;
    }
}

impl WorkFlags {
    /// Task classes that are driven by `TickDriver::poll_events` itself
    /// (as opposed to only becoming visible through the poller).
    pub const TASKS: WorkFlags = WorkFlags::MICROTASKS
        .union(WorkFlags::TIMERS)
        .union(WorkFlags::IMMEDIATES)
        .union(WorkFlags::COROUTINES)
        .union(WorkFlags::FETCHES);

    /// Everything that keeps the loop alive. Deliberately excludes
    /// `COROUTINES_READY`: that bit is a subset signal of `COROUTINES` and
    /// must never by itself justify another iteration, or a coroutine that
    /// will never be woken again would spin the loop forever.
    pub const PENDING: WorkFlags = WorkFlags::TASKS
        .union(WorkFlags::FS_OPS)
        .union(WorkFlags::CHILD_PROCS)
        .union(WorkFlags::READLINE)
        .union(WorkFlags::STDIN);

    /// Bits whose presence means the reactor must not sleep: there is
    /// synchronous-ish work ready to run right now.
    pub const BLOCKING_CANDIDATES: WorkFlags = WorkFlags::MICROTASKS
        .union(WorkFlags::IMMEDIATES)
        .union(WorkFlags::COROUTINES_READY);

    /// Bits whose presence permits (but does not require) a blocking wait
    /// on the poller.
    pub const ASYNC: WorkFlags = WorkFlags::READLINE
        .union(WorkFlags::STDIN)
        .union(WorkFlags::TIMERS)
        .union(WorkFlags::FETCHES)
        .union(WorkFlags::FS_OPS)
        .union(WorkFlags::CHILD_PROCS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_excludes_coroutines_ready() {
        assert!(!WorkFlags::PENDING.contains(WorkFlags::COROUTINES_READY));
    }

    #[test]
    fn pending_covers_every_other_bit() {
        let all = WorkFlags::all();
        let without_ready = all - WorkFlags::COROUTINES_READY;
        assert_eq!(WorkFlags::PENDING, without_ready);
    }

    #[test]
    fn blocking_candidates_is_subset_of_all() {
        assert!(WorkFlags::all().contains(WorkFlags::BLOCKING_CANDIDATES));
    }

    #[test]
    fn async_and_blocking_candidates_overlap_only_on_coroutines_ready() {
        // TIMERS/FETCHES/FS_OPS/etc. permit blocking; MICROTASKS/IMMEDIATES
        // forbid it. The two masks must not otherwise overlap.
        let overlap = WorkFlags::ASYNC & WorkFlags::BLOCKING_CANDIDATES;
        assert!(overlap.is_empty());
    }
}
