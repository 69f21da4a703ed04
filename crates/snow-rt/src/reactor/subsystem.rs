//! The contract every collaborator implements (§6 of the reactor spec).
//!
//! `Host` stands in for the script interpreter; `AsyncSubsystem` stands in
//! for fetch/fs/child-process/readline/stdin. Both are external
//! collaborators the reactor only ever touches through these traits --
//! this crate never implements a real interpreter or a real fetch module.

/// A pre-collection handle mapped to its post-collection identity.
///
/// Opaque to the reactor: only the `Host` knows how to interpret it.
pub type RawHandle = u64;

/// The forwarding function a moving GC produces for one collection cycle.
pub type Forward<'a> = &'a dyn Fn(RawHandle) -> RawHandle;

/// Handed to every subsystem's `forward_roots` during a collection.
///
/// Wrapping the raw closure in a struct (rather than passing `Forward`
/// directly) leaves room to add bookkeeping -- e.g. counting how many
/// roots were forwarded, for the `forward_roots invoked while GC is not
/// running` invariant check -- without changing the trait signature.
pub struct ForwardCtx<'a> {
    forward: Forward<'a>,
    forwarded: u64,
}

impl<'a> ForwardCtx<'a> {
    pub fn new(forward: Forward<'a>) -> Self {
        ForwardCtx { forward, forwarded: 0 }
    }

    /// Rewrite one handle under the active collection's forwarding map.
    pub fn forward(&mut self, handle: RawHandle) -> RawHandle {
        self.forwarded += 1;
        (self.forward)(handle)
    }

    /// How many handles were routed through this context so far. Exposed
    /// for tests that assert every subsystem actually forwarded its roots.
    pub fn forwarded_count(&self) -> u64 {
        self.forwarded
    }
}

/// The script interpreter, as seen by the reactor.
///
/// Implementors own the microtask/immediate queues, the heap-growth
/// counters, and the moving collector itself. The reactor never inspects
/// script values directly -- it only calls these entry points in the
/// order the tick driver and GC coordinator specify.
pub trait Host {
    /// Run every queued immediate callback to completion (step 3 of
    /// `poll_events`). An immediate that queues another immediate is
    /// *not* required to run within the same drain (unlike microtasks) --
    /// the original only drains one generation per tick.
    fn process_immediates(&mut self);

    /// Run the microtask queue to completion, including microtasks queued
    /// by microtasks that ran during this same drain (step 4).
    fn process_microtasks(&mut self);

    fn has_pending_immediates(&self) -> bool;
    fn has_pending_microtasks(&self) -> bool;

    /// Current heap extent in bytes (`js->brk` in the original). Used as
    /// the basis for the GC threshold: `max(brk / 2, floor)`.
    fn brk(&self) -> u64;

    /// Bytes allocated since the last collection.
    fn gc_alloc_since(&self) -> u64;

    /// The interpreter's own "please collect soon" flag, set independently
    /// of the byte-threshold heuristic (e.g. by an explicit `System.gc()`).
    fn needs_gc(&self) -> bool;

    /// Run one compacting collection and reset `gc_alloc_since` to zero.
    ///
    /// Returns the forwarding function mapping every pre-collection handle
    /// to its new identity. Must be called only between I/O rounds, never
    /// while a coroutine is resumed or microtasks are draining -- the
    /// `GcCoordinator` is the sole caller and upholds that ordering.
    fn gc_compact(&mut self) -> Box<dyn Fn(RawHandle) -> RawHandle + '_>;

    /// A coroutine resume panicked. The reactor caught the unwind; this
    /// hands the captured payload to whichever script value was awaiting
    /// the coroutine. Never called for reactor-internal failures.
    fn deliver_coroutine_panic(&mut self, payload: Box<dyn std::any::Any + Send>);
}

/// One asynchronous subsystem: fetch, filesystem, child process, readline,
/// or stdin.
///
/// `poll_nonblocking` is only ever called for subsystems registered as
/// "I/O subsystems" (see `Reactor::register_io_subsystem`) -- readline and
/// stdin participate in the census and in `WorkFlags::ASYNC` but, per the
/// original source, only ever make progress through the poller itself, so
/// they are registered as "wait-only" and never polled directly.
pub trait AsyncSubsystem<H: Host> {
    /// Cheap, non-allocating check: does this subsystem have outstanding
    /// work? Drives the Work Census -- must never mutate state.
    fn has_pending(&self) -> bool;

    /// Advance this subsystem by one non-blocking step, absorbing whatever
    /// the poller already reported as complete.
    fn poll_nonblocking(&mut self, host: &mut H);

    /// Rewrite every script handle this subsystem retains using `ctx`.
    /// Called exactly once per collection, while the interpreter is
    /// paused. Missing a retained handle here is silently unsafe -- the
    /// handle dangles after the collector moves its target.
    fn forward_roots(&mut self, ctx: &mut ForwardCtx<'_>);
}
