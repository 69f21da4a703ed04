//! Tick Driver (§4.2): exactly one non-blocking pass over ready work.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use super::coroutine::CoroutinePool;
use super::gc;
use super::subsystem::{AsyncSubsystem, Host};

/// Run one tick: fetches -> fs -> child processes, then immediates to
/// completion, then microtasks to completion, then the coroutine walk,
/// then a flag-only (not threshold) GC check.
///
/// Readline/stdin are deliberately not polled here -- per the original
/// source they only ever complete through the poller itself, so they're
/// registered as "wait-only" and never appear in `io_subsystems`.
pub fn poll_events<H: Host>(
    host: &mut H,
    io_subsystems: &mut [Box<dyn AsyncSubsystem<H>>],
    coroutines: &Rc<RefCell<CoroutinePool>>,
) {
    // Step 2: fetches -> fs -> child processes, in registration order.
    for subsystem in io_subsystems.iter_mut() {
        subsystem.poll_nonblocking(host);
    }

    // Step 3: immediates to completion.
    host.process_immediates();

    // Step 4: microtasks to completion (nested microtasks extend the
    // same drain, which `Host::process_microtasks` is responsible for).
    host.process_microtasks();

    // Step 5: walk the coroutine queue, resuming ready entries.
    coroutines.borrow_mut().drive_one_pass(host);

    // Step 6: flag-only GC check (the threshold check lives in the Loop
    // Policy's `maybe_collect`, run only before a blocking wait -- see
    // `reactor::gc` and the original's `js_poll_events` vs. `maybe_gc`).
    if host.needs_gc() {
        trace!("needs_gc flag set during tick, running flag-triggered collection");
        gc::collect(host, io_subsystems);
    }
}
