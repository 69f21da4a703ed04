//! GC Coordinator (§4.4): threshold check plus root forwarding fan-out.
//!
//! The reactor does not implement a collector -- that's the `Host`'s job.
//! This module only decides *when* to collect and makes sure every
//! registered subsystem gets a chance to rewrite its retained handles
//! before the interpreter resumes.

use super::subsystem::{AsyncSubsystem, ForwardCtx, Host};

/// The floor under `brk / 2` used by the byte-growth heuristic.
///
/// 4 MiB, matching `maybe_gc` in the original `reactor.c` exactly.
pub const DEFAULT_GC_FLOOR_BYTES: u64 = 4 * 1024 * 1024;

/// Decide whether a collection is due.
///
/// True if bytes allocated since the last collection exceed
/// `max(host.brk() / 2, floor)`, or if the interpreter's own `needs_gc`
/// flag is set (e.g. from an explicit `System.gc()` call).
pub fn should_collect<H: Host>(host: &H, floor_bytes: u64) -> bool {
    let threshold = (host.brk() / 2).max(floor_bytes);
    host.gc_alloc_since() > threshold || host.needs_gc()
}

/// Run one collection: ask the `Host` to compact, then route the
/// resulting forwarding function through every registered subsystem in
/// registration order.
///
/// Must only be called between two `poll_nonblocking` rounds -- never
/// while a coroutine is resumed, while microtasks are draining, or while
/// the poller is waiting. The `Reactor`'s loop policy is the only caller
/// and upholds that ordering; this function does not itself re-check it
/// (there is nothing to check against once inside the call).
pub fn collect<H: Host>(host: &mut H, subsystems: &mut [Box<dyn AsyncSubsystem<H>>]) {
    let forward = host.gc_compact();
    let mut ctx = ForwardCtx::new(&*forward);
    for subsystem in subsystems.iter_mut() {
        subsystem.forward_roots(&mut ctx);
    }
}
