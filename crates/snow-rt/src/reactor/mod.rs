//! The reactor: the event-loop orchestrator tying the Work Census, Tick
//! Driver, Coroutine Pool, GC Coordinator, and Loop Policy together behind
//! one owned value (§2-§4).
//!
//! `Reactor` is a plain value its embedder owns and threads through every
//! entry point explicitly -- there is no process-wide singleton to reach
//! for, unlike a global scheduler accessed through a `OnceLock`.

pub mod census;
pub mod config;
pub mod coroutine;
pub mod error;
pub mod flags;
pub mod gc;
pub mod poller;
pub mod subsystem;
mod tick;

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

pub use config::ReactorConfig;
pub use coroutine::{CoroutineHandle, CoroutineId, CoroutineStatus, CoroutineWaker};
pub use error::{FailureSink, ReactorError};
pub use flags::WorkFlags;
pub use poller::{MioPoller, NullPoller, Poller};
pub use subsystem::{AsyncSubsystem, Forward, ForwardCtx, Host, RawHandle};

use coroutine::CoroutinePool;

/// The event-loop orchestrator (§2).
///
/// Generic over the interpreter stand-in (`H`) and the OS multiplexer
/// (`P`) so tests can swap in [`NullPoller`] and a scripted `Host` without
/// touching the loop policy itself.
pub struct Reactor<H: Host, P: Poller> {
    poller: P,
    coroutines: Rc<RefCell<CoroutinePool>>,
    /// Polled every tick, in registration order: fetch, then fs, then
    /// child-process, matching the original's fixed ordering.
    io_subsystems: Vec<Box<dyn AsyncSubsystem<H>>>,
    /// Counted in the census and in `WorkFlags::ASYNC`, but only ever make
    /// progress through the poller itself (readline, stdin).
    wait_only_subsystems: Vec<Box<dyn AsyncSubsystem<H>>>,
    poll_hook: Option<Box<dyn FnMut(&mut H)>>,
    config: ReactorConfig,
    failures: FailureSink,
}

impl<H: Host, P: Poller> Reactor<H, P> {
    pub fn new(poller: P, config: ReactorConfig) -> Self {
        Reactor {
            poller,
            coroutines: Rc::new(RefCell::new(CoroutinePool::new())),
            io_subsystems: Vec::new(),
            wait_only_subsystems: Vec::new(),
            poll_hook: None,
            config,
            failures: FailureSink::new(),
        }
    }

    /// A clone of the sink subsystems should report unrecoverable failures
    /// to (§7). Safe to stash inside a subsystem and report from deep
    /// inside an async callback, not just synchronously.
    pub fn failure_sink(&self) -> FailureSink {
        self.failures.clone()
    }

    /// Register a subsystem polled every tick (fetch, fs, child-process).
    /// Order matters: the first three registrations become FETCHES,
    /// FS_OPS, and CHILD_PROCS in the Work Census, in that order.
    pub fn register_io_subsystem(&mut self, subsystem: Box<dyn AsyncSubsystem<H>>) {
        self.io_subsystems.push(subsystem);
    }

    /// Register a subsystem that only ever completes through the poller
    /// itself (readline, stdin). Counted in the census and in
    /// `WorkFlags::ASYNC`, never polled directly by the tick driver.
    pub fn register_wait_only_subsystem(&mut self, subsystem: Box<dyn AsyncSubsystem<H>>) {
        self.wait_only_subsystems.push(subsystem);
    }

    /// Install the embedder's poll hook (§6: "invoked once per
    /// `poll_events` call, after the coroutine walk"). Replaces any
    /// previously installed hook.
    pub fn set_poll_hook(&mut self, hook: impl FnMut(&mut H) + 'static) {
        self.poll_hook = Some(Box::new(hook));
    }

    /// Spawn a coroutine, enqueued `Suspended` and not yet ready. Returns
    /// its id alongside a [`CoroutineWaker`] the caller can hand to
    /// whichever subsystem will eventually wake it.
    pub fn spawn_coroutine(&mut self, body: impl FnOnce() + 'static) -> (CoroutineId, CoroutineWaker) {
        let id = self
            .coroutines
            .borrow_mut()
            .spawn(CoroutineHandle::new(body));
        let waker = CoroutineWaker::new(self.coroutines.clone(), id);
        (id, waker)
    }

    /// Mark an already-spawned coroutine ready without going through a
    /// [`CoroutineWaker`] -- for embedders that keep their own id table.
    pub fn mark_coroutine_ready(&mut self, id: CoroutineId) {
        self.coroutines.borrow_mut().mark_ready(id);
    }

    pub fn coroutine_status(&self, id: CoroutineId) -> Option<CoroutineStatus> {
        self.coroutines.borrow().status(id)
    }

    /// Work Census (§4.1): a cheap, non-allocating snapshot of pending
    /// work, folding in the poller's own liveness as the `TIMERS` bit.
    fn census(&self, host: &H) -> WorkFlags {
        let mut flags = census::scan(
            host,
            &self.io_subsystems,
            &self.wait_only_subsystems,
            &self.coroutines.borrow(),
        );
        flags.set(WorkFlags::TIMERS, self.poller.is_alive());
        flags
    }

    /// Tick Driver (§4.2): exactly one non-blocking pass over ready work,
    /// followed by a flag-only GC check. Does not invoke the poll hook --
    /// that only fires around a poller wait inside [`Self::run_event_loop`]
    /// (see the embedder-hook testable property).
    pub fn poll_events(&mut self, host: &mut H) -> Result<(), ReactorError> {
        tick::poll_events(host, &mut self.io_subsystems, &self.coroutines);

        if let Some(err) = self.failures.take() {
            return Err(err);
        }
        Ok(())
    }

    /// Run the embedder's poll hook, if one is installed.
    fn run_poll_hook(&mut self, host: &mut H) {
        if let Some(hook) = self.poll_hook.as_mut() {
            hook(host);
        }
    }

    /// GC Coordinator's threshold check, run only at the "safe point
    /// before blocking" in the Loop Policy -- never from inside
    /// `poll_events` itself, which only honors the flag-only check (§4.4).
    fn maybe_collect(&mut self, host: &mut H) {
        if gc::should_collect(host, self.config.gc_floor_bytes) {
            trace!("byte-growth threshold or needs_gc flag crossed before blocking wait");
            gc::collect(host, &mut self.io_subsystems);
        }
    }

    /// Loop Policy (§4.5): drive ticks and poller waits until no pending
    /// work remains, ending with the unconditional exit-time drain.
    ///
    /// The poll hook fires immediately before each `run_nonblocking`/
    /// `run_once_blocking` call and nowhere else (§4.5 property 4): zero
    /// times on an iteration that short-circuits via the
    /// `COROUTINES`-only break, and not during the final exit-time drain,
    /// which never reaches the poller at all.
    ///
    /// ```text
    /// loop:
    ///   flags = census()
    ///   if (flags & PENDING) == 0: break
    ///   tick_driver.poll()
    ///   flags = census()
    ///   if flags & BLOCKING_CANDIDATES:
    ///       poll_hook()
    ///       poller.run_nonblocking()
    ///   else if flags & ASYNC:
    ///       gc.maybe_collect()
    ///       poll_hook()
    ///       poller.run_once_blocking()
    ///   else if flags & COROUTINES:
    ///       break
    /// final: tick_driver.poll()
    /// ```
    pub fn run_event_loop(&mut self, host: &mut H) -> Result<(), ReactorError> {
        loop {
            let flags = self.census(host);
            if !flags.intersects(WorkFlags::PENDING) {
                debug!("no pending work, exiting event loop");
                break;
            }

            self.poll_events(host)?;

            let flags = self.census(host);
            if flags.intersects(WorkFlags::BLOCKING_CANDIDATES) {
                self.run_poll_hook(host);
                self.poller.run_nonblocking();
            } else if flags.intersects(WorkFlags::ASYNC) {
                self.maybe_collect(host);
                self.run_poll_hook(host);
                self.poller.run_once_blocking();
            } else if flags.intersects(WorkFlags::COROUTINES) {
                // Only non-ready coroutines remain and nothing can ever
                // wake them again (no ASYNC, no BLOCKING_CANDIDATES) --
                // per §4.5 property 3, the loop must still terminate.
                debug!("only unwakeable coroutines remain, exiting event loop");
                break;
            }
        }

        // Unconditional exit-time drain: the original's trailing
        // `js_poll_events` call is the same function that walks the
        // coroutine queue, so this still runs any coroutine left ready by
        // the final census above.
        self.poll_events(host)
    }
}

impl<H: Host> Reactor<H, MioPoller> {
    /// Convenience constructor wiring up the default `mio`-backed poller.
    pub fn with_default_poller(config: ReactorConfig) -> std::io::Result<Self> {
        Ok(Reactor::new(MioPoller::new()?, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeHost {
        microtasks: Vec<&'static str>,
        order: Rc<RefCell<Vec<&'static str>>>,
        needs_gc: bool,
        panics: u32,
    }

    impl FakeHost {
        fn new() -> Self {
            FakeHost {
                microtasks: Vec::new(),
                order: Rc::new(RefCell::new(Vec::new())),
                needs_gc: false,
                panics: 0,
            }
        }
    }

    impl Host for FakeHost {
        fn process_immediates(&mut self) {}
        fn process_microtasks(&mut self) {
            while let Some(label) = self.microtasks.pop() {
                self.order.borrow_mut().push(label);
            }
        }
        fn has_pending_immediates(&self) -> bool {
            false
        }
        fn has_pending_microtasks(&self) -> bool {
            !self.microtasks.is_empty()
        }
        fn brk(&self) -> u64 {
            0
        }
        fn gc_alloc_since(&self) -> u64 {
            0
        }
        fn needs_gc(&self) -> bool {
            self.needs_gc
        }
        fn gc_compact(&mut self) -> Box<dyn Fn(u64) -> u64 + '_> {
            self.needs_gc = false;
            Box::new(|h| h)
        }
        fn deliver_coroutine_panic(&mut self, _payload: Box<dyn std::any::Any + Send>) {
            self.panics += 1;
        }
    }

    #[test]
    fn empty_reactor_exits_immediately() {
        let mut reactor: Reactor<FakeHost, NullPoller> =
            Reactor::new(NullPoller::default(), ReactorConfig::default());
        let mut host = FakeHost::new();
        reactor.run_event_loop(&mut host).unwrap();
    }

    #[test]
    fn microtask_drains_without_ever_touching_poller() {
        let mut reactor: Reactor<FakeHost, NullPoller> =
            Reactor::new(NullPoller::default(), ReactorConfig::default());
        let mut host = FakeHost::new();
        host.microtasks.push("p1");

        reactor.run_event_loop(&mut host).unwrap();

        assert_eq!(*host.order.borrow(), vec!["p1"]);
        assert_eq!(reactor.poller.nonblocking_calls, 0);
        assert_eq!(reactor.poller.blocking_calls, 0);
    }

    #[test]
    fn coroutine_runs_once_marked_ready() {
        let mut reactor: Reactor<FakeHost, NullPoller> =
            Reactor::new(NullPoller::default(), ReactorConfig::default());
        let mut host = FakeHost::new();
        let order = host.order.clone();

        let (_id, waker) = reactor.spawn_coroutine(move || {
            order.borrow_mut().push("coro");
        });
        waker.wake();

        reactor.run_event_loop(&mut host).unwrap();

        assert_eq!(*host.order.borrow(), vec!["coro"]);
    }

    #[test]
    fn permanently_suspended_coroutine_does_not_spin_forever() {
        let mut reactor: Reactor<FakeHost, NullPoller> =
            Reactor::new(NullPoller::default(), ReactorConfig::default());
        let mut host = FakeHost::new();
        // Spawned but never marked ready and nothing will ever wake it:
        // COROUTINES is set, BLOCKING_CANDIDATES and ASYNC are not.
        let (_id, _waker) = reactor.spawn_coroutine(|| {});

        // Must return instead of looping forever.
        reactor.run_event_loop(&mut host).unwrap();
    }

    #[test]
    fn poll_hook_runs_only_on_iterations_that_touch_the_poller() {
        /// A one-shot "timer": alive until the first blocking wait, then
        /// never again -- enough to force exactly one poller-touching
        /// iteration before the loop has no more pending work.
        struct OneShotPoller {
            alive: bool,
            nonblocking_calls: u32,
            blocking_calls: u32,
        }
        impl Poller for OneShotPoller {
            fn run_nonblocking(&mut self) {
                self.nonblocking_calls += 1;
            }
            fn run_once_blocking(&mut self) {
                self.blocking_calls += 1;
                self.alive = false;
            }
            fn is_alive(&self) -> bool {
                self.alive
            }
        }

        let mut reactor: Reactor<FakeHost, OneShotPoller> = Reactor::new(
            OneShotPoller { alive: true, nonblocking_calls: 0, blocking_calls: 0 },
            ReactorConfig::default(),
        );
        let mut host = FakeHost::new();
        let calls = Rc::new(Cell::new(0u32));
        let calls2 = calls.clone();
        reactor.set_poll_hook(move |_host| {
            calls2.set(calls2.get() + 1);
        });

        reactor.run_event_loop(&mut host).unwrap();

        assert_eq!(calls.get(), 1, "hook must fire exactly once, for the one blocking wait");
        assert_eq!(reactor.poller.blocking_calls, 1);
        assert_eq!(reactor.poller.nonblocking_calls, 0);
    }

    #[test]
    fn subsystem_failure_surfaces_from_poll_events() {
        struct FailingSubsystem(FailureSink);
        impl AsyncSubsystem<FakeHost> for FailingSubsystem {
            fn has_pending(&self) -> bool {
                true
            }
            fn poll_nonblocking(&mut self, _host: &mut FakeHost) {
                self.0.report("connection reset");
            }
            fn forward_roots(&mut self, _ctx: &mut ForwardCtx<'_>) {}
        }

        let mut reactor: Reactor<FakeHost, NullPoller> =
            Reactor::new(NullPoller::default(), ReactorConfig::default());
        let sink = reactor.failure_sink();
        reactor.register_io_subsystem(Box::new(FailingSubsystem(sink)));

        let mut host = FakeHost::new();
        let err = reactor.poll_events(&mut host).unwrap_err();
        assert!(matches!(err, ReactorError::Subsystem(ref msg) if msg == "connection reset"));
    }

    #[test]
    fn coroutine_panic_is_delivered_to_host_not_propagated() {
        let mut reactor: Reactor<FakeHost, NullPoller> =
            Reactor::new(NullPoller::default(), ReactorConfig::default());
        let mut host = FakeHost::new();
        let (_id, waker) = reactor.spawn_coroutine(|| panic!("boom"));
        waker.wake();

        reactor.run_event_loop(&mut host).unwrap();

        assert_eq!(host.panics, 1);
    }
}
