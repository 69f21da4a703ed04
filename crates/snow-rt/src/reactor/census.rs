//! Work Census (§4.1): a cheap, non-allocating snapshot of pending work.

use super::coroutine::CoroutinePool;
use super::flags::WorkFlags;
use super::subsystem::{AsyncSubsystem, Host};

/// Scan every registered subsystem's `has_pending`, the coroutine pool,
/// and the interpreter's own queues. O(subsystem count + 1); must never
/// mutate state or allocate.
pub fn scan<H: Host>(
    host: &H,
    io_subsystems: &[Box<dyn AsyncSubsystem<H>>],
    wait_only_subsystems: &[Box<dyn AsyncSubsystem<H>>],
    coroutines: &CoroutinePool,
) -> WorkFlags {
    let mut flags = WorkFlags::empty();

    flags.set(WorkFlags::MICROTASKS, host.has_pending_microtasks());
    flags.set(WorkFlags::IMMEDIATES, host.has_pending_immediates());
    flags.set(WorkFlags::COROUTINES, coroutines.has_pending());
    flags.set(WorkFlags::COROUTINES_READY, coroutines.has_ready());

    // The original distinguishes FETCHES/FS_OPS/CHILD_PROCS (polled every
    // tick) from READLINE/STDIN (wait-only); both groups are still
    // reported here by index, matching `fetch`/`fs`/`child_process`
    // registration order.
    for (i, s) in io_subsystems.iter().enumerate() {
        if !s.has_pending() {
            continue;
        }
        let bit = match i {
            0 => WorkFlags::FETCHES,
            1 => WorkFlags::FS_OPS,
            _ => WorkFlags::CHILD_PROCS,
        };
        flags |= bit;
    }
    for (i, s) in wait_only_subsystems.iter().enumerate() {
        if !s.has_pending() {
            continue;
        }
        let bit = match i {
            0 => WorkFlags::READLINE,
            _ => WorkFlags::STDIN,
        };
        flags |= bit;
    }

    // TIMERS has no in-process subsystem of its own in this crate -- it is
    // surfaced entirely through the poller's own readiness (see
    // `Reactor::census`, which folds in `Poller::is_alive`-derived state
    // for timers registered with `MioPoller::schedule_timer`). Leaving it
    // unset here keeps this function pure and allocation-free.

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::subsystem::ForwardCtx;

    struct FakeHost {
        microtasks: bool,
        immediates: bool,
    }
    impl Host for FakeHost {
        fn process_immediates(&mut self) {}
        fn process_microtasks(&mut self) {}
        fn has_pending_immediates(&self) -> bool {
            self.immediates
        }
        fn has_pending_microtasks(&self) -> bool {
            self.microtasks
        }
        fn brk(&self) -> u64 {
            0
        }
        fn gc_alloc_since(&self) -> u64 {
            0
        }
        fn needs_gc(&self) -> bool {
            false
        }
        fn gc_compact(&mut self) -> Box<dyn Fn(u64) -> u64 + '_> {
            Box::new(|h| h)
        }
        fn deliver_coroutine_panic(&mut self, _payload: Box<dyn std::any::Any + Send>) {}
    }

    struct Stub(bool);
    impl AsyncSubsystem<FakeHost> for Stub {
        fn has_pending(&self) -> bool {
            self.0
        }
        fn poll_nonblocking(&mut self, _host: &mut FakeHost) {}
        fn forward_roots(&mut self, _ctx: &mut ForwardCtx<'_>) {}
    }

    #[test]
    fn empty_when_nothing_pending() {
        let host = FakeHost { microtasks: false, immediates: false };
        let pool = CoroutinePool::new();
        let flags = scan(&host, &[], &[], &pool);
        assert!(flags.is_empty());
    }

    #[test]
    fn reports_microtasks_and_fetches() {
        let host = FakeHost { microtasks: true, immediates: false };
        let pool = CoroutinePool::new();
        let io: Vec<Box<dyn AsyncSubsystem<FakeHost>>> = vec![Box::new(Stub(true))];
        let flags = scan(&host, &io, &[], &pool);
        assert!(flags.contains(WorkFlags::MICROTASKS));
        assert!(flags.contains(WorkFlags::FETCHES));
        assert!(!flags.contains(WorkFlags::FS_OPS));
    }

    #[test]
    fn reports_readline_from_wait_only_group() {
        let host = FakeHost { microtasks: false, immediates: false };
        let pool = CoroutinePool::new();
        let wait_only: Vec<Box<dyn AsyncSubsystem<FakeHost>>> = vec![Box::new(Stub(true))];
        let flags = scan(&host, &[], &wait_only, &pool);
        assert!(flags.contains(WorkFlags::READLINE));
    }
}
