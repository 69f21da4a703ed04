//! Stackful script coroutines and the reactor's run queue (§3/§4.3).
//!
//! A naive port would link coroutines into a doubly-linked list through
//! raw `prev`/`next` pointers embedded in the coroutine struct itself.
//! This keeps the same O(1) splice but replaces raw pointers with a
//! `slab::Slab` keyed by a stable `CoroutineId`: the intrusive list is
//! still intrusive (the `prev`/`next` fields live inside the slab entry),
//! it just never dangles -- a stale id simply looks up to `None` instead
//! of undefined behavior.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use slab::Slab;

use super::error::ReactorError;
use super::subsystem::Host;

/// 64 KiB, matching the stack size `snow-rt`'s actor coroutines use.
const DEFAULT_STACK_SIZE: usize = 64 * 1024;

thread_local! {
    /// Pointer to the currently-resuming coroutine's `Yielder`, installed
    /// for the duration of one `resume()` call so that script-level
    /// "await" points can call `yield_current()` without threading a
    /// `Yielder` through every frame.
    static CURRENT_YIELDER: Cell<Option<*const ()>> = const { Cell::new(None) };
}

/// Suspend the currently-running coroutine.
///
/// # Panics
///
/// Panics if called outside of a coroutine resume -- there is no yielder
/// to suspend with.
pub fn yield_current() {
    CURRENT_YIELDER.with(|cell| {
        let ptr = cell
            .get()
            .expect("yield_current() called outside of a coroutine resume");
        // Safety: `ptr` was installed from a `&Yielder` borrowed for the
        // duration of the coroutine body currently on the stack below us.
        let yielder: &Yielder<(), ()> = unsafe { &*(ptr as *const Yielder<(), ()>) };
        yielder.suspend(());
        // Another coroutine may have run its own body's setup on this same
        // thread while we were suspended, overwriting the thread-local with
        // its own yielder. Re-install ours so a second `yield_current()`
        // call later in this same resume doesn't suspend with someone
        // else's yielder.
        cell.set(Some(ptr));
    });
}

/// A single stackful coroutine, wrapping `corosensei::Coroutine`.
///
/// `!Send`: corosensei stacks cannot move between threads, which matches
/// the reactor's own single-threaded contract.
pub struct CoroutineHandle {
    coro: Coroutine<(), (), ()>,
}

impl CoroutineHandle {
    /// Wrap `body` as a coroutine. `body` typically re-enters the `Host`
    /// to run script bytecode; it calls [`yield_current`] at await points.
    pub fn new(body: impl FnOnce() + 'static) -> Self {
        let stack = DefaultStack::new(DEFAULT_STACK_SIZE)
            .expect("failed to allocate coroutine stack");
        let coro = Coroutine::with_stack(stack, move |yielder: &Yielder<(), ()>, _: ()| {
            CURRENT_YIELDER.with(|cell| {
                cell.set(Some(yielder as *const Yielder<(), ()> as *const ()));
            });
            body();
        });
        CoroutineHandle { coro }
    }

    /// Resume the coroutine. Returns `true` if it yielded (still has work
    /// left), `false` if it ran to completion.
    fn resume(&mut self) -> bool {
        match self.coro.resume(()) {
            CoroutineResult::Yield(()) => true,
            CoroutineResult::Return(()) => false,
        }
    }
}

/// Status of a queued coroutine.
///
/// "Ready" is not a fourth variant here: it is exactly
/// `status == Suspended && ready`, a single status field plus a separate
/// `ready` bool rather than a combined enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineStatus {
    Suspended,
    Running,
    Dead,
}

pub type CoroutineId = usize;

struct CoroutineEntry {
    handle: CoroutineHandle,
    status: CoroutineStatus,
    ready: bool,
    prev: Option<CoroutineId>,
    next: Option<CoroutineId>,
}

/// The global run queue: a doubly-linked list of suspended coroutines,
/// stored in a slab for O(1) lookup, insertion, and removal by id.
pub struct CoroutinePool {
    entries: Slab<CoroutineEntry>,
    head: Option<CoroutineId>,
    tail: Option<CoroutineId>,
    ready_count: usize,
    /// Reset every tick, incremented per resume. Not read by the reactor
    /// itself today -- reserved for future per-tick fairness caps (§4.3).
    pub resumes_this_tick: u64,
}

impl Default for CoroutinePool {
    fn default() -> Self {
        Self::new()
    }
}

impl CoroutinePool {
    pub fn new() -> Self {
        CoroutinePool {
            entries: Slab::new(),
            head: None,
            tail: None,
            ready_count: 0,
            resumes_this_tick: 0,
        }
    }

    /// Insert a new coroutine, enqueued and `Suspended`, not yet ready.
    pub fn spawn(&mut self, handle: CoroutineHandle) -> CoroutineId {
        let id = self.entries.insert(CoroutineEntry {
            handle,
            status: CoroutineStatus::Suspended,
            ready: false,
            prev: None,
            next: None,
        });
        self.link_at_tail(id);
        id
    }

    /// Append `id` at the tail of the run queue. Requires `Suspended`.
    /// Idempotent if `id` is already linked (a no-op, not a duplicate
    /// insert) -- callers may re-enqueue defensively. A stale (already
    /// destroyed) id is also a no-op -- late-arriving re-enqueue attempts
    /// must not resurrect a freed slot.
    ///
    /// # Panics
    ///
    /// Panics if `id` is still live but not `Suspended` (§3: "a coroutine
    /// is in the global queue iff its status is `SUSPENDED` or `READY`").
    /// Enqueueing a `Running` or `Dead` entry means the caller mismanaged
    /// the status transition itself; this is an
    /// [`InvariantViolation`](ReactorError::Invariant), not a recoverable
    /// condition.
    pub fn enqueue(&mut self, id: CoroutineId) {
        let already_linked = self.is_linked(id);
        match self.entries.get(id) {
            Some(e) if e.status == CoroutineStatus::Suspended => {}
            Some(_) => panic!(
                "{}",
                ReactorError::Invariant("enqueue called on a coroutine that is not Suspended")
            ),
            None => return,
        }
        if already_linked {
            return;
        }
        self.link_at_tail(id);
    }

    fn is_linked(&self, id: CoroutineId) -> bool {
        self.head == Some(id) || self.tail == Some(id) || {
            self.entries
                .get(id)
                .map(|e| e.prev.is_some() || e.next.is_some())
                .unwrap_or(false)
        }
    }

    fn link_at_tail(&mut self, id: CoroutineId) {
        let old_tail = self.tail;
        if let Some(e) = self.entries.get_mut(id) {
            e.prev = old_tail;
            e.next = None;
        }
        if let Some(t) = old_tail {
            if let Some(e) = self.entries.get_mut(t) {
                e.next = Some(id);
            }
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
    }

    /// Unlink `id` from the run queue in O(1). Safe to call on an id that
    /// is the current walk cursor, or on one that is already unlinked.
    pub fn remove(&mut self, id: CoroutineId) {
        let (prev, next) = match self.entries.get(id) {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(e) = self.entries.get_mut(p) {
                    e.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(e) = self.entries.get_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(e) = self.entries.get_mut(id) {
            e.prev = None;
            e.next = None;
        }
    }

    /// Mark `id` ready for resumption. A no-op if `id` has already been
    /// destroyed -- late completions from an external subsystem must not
    /// crash the reactor (§4.3 invariant).
    pub fn mark_ready(&mut self, id: CoroutineId) {
        self.set_ready(id, true);
    }

    fn set_ready(&mut self, id: CoroutineId, ready: bool) {
        if let Some(e) = self.entries.get_mut(id) {
            if e.ready != ready {
                e.ready = ready;
                if ready {
                    self.ready_count += 1;
                } else {
                    self.ready_count -= 1;
                }
            }
        }
    }

    /// Unlink, drop the coroutine's stack, and free its slot.
    pub fn destroy(&mut self, id: CoroutineId) {
        self.remove(id);
        if let Some(e) = self.entries.get(id) {
            if e.ready {
                self.ready_count -= 1;
            }
        }
        self.entries.try_remove(id);
    }

    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn has_ready(&self) -> bool {
        self.ready_count > 0
    }

    /// Status of a still-live coroutine, for tests and diagnostics.
    pub fn status(&self, id: CoroutineId) -> Option<CoroutineStatus> {
        self.entries.get(id).map(|e| e.status)
    }

    /// Step 5 of `poll_events`: one full pass over the queue as it stood
    /// at the start of the pass, resuming every `Suspended` + `ready`
    /// entry exactly once. Entries enqueued *during* this pass (by a
    /// resumed coroutine spawning another) are not visited until the next
    /// tick, matching "walk from head to tail" over a snapshot.
    pub fn drive_one_pass<H: Host>(&mut self, host: &mut H) {
        self.resumes_this_tick = 0;
        let mut cursor = self.head;
        let mut remaining = self.entries.len();

        while let Some(id) = cursor {
            if remaining == 0 {
                break;
            }
            remaining -= 1;

            let next = match self.entries.get(id) {
                Some(e) => e.next,
                None => None,
            };
            cursor = next;

            let should_resume = matches!(
                self.entries.get(id),
                Some(e) if e.status == CoroutineStatus::Suspended && e.ready
            );
            if !should_resume {
                continue;
            }

            self.remove(id);
            self.set_ready(id, false);
            if let Some(e) = self.entries.get_mut(id) {
                e.status = CoroutineStatus::Running;
            }
            self.resumes_this_tick += 1;

            let outcome = {
                let entry = self.entries.get_mut(id).expect("id checked live above");
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| entry.handle.resume()))
            };

            match outcome {
                Ok(still_yielded) => {
                    if still_yielded {
                        if let Some(e) = self.entries.get_mut(id) {
                            e.status = CoroutineStatus::Suspended;
                        }
                        self.enqueue(id);
                    } else {
                        if let Some(e) = self.entries.get_mut(id) {
                            e.status = CoroutineStatus::Dead;
                        }
                        self.entries.try_remove(id);
                    }
                }
                Err(payload) => {
                    self.entries.try_remove(id);
                    host.deliver_coroutine_panic(payload);
                }
            }
        }
    }
}

/// A cheap, cloneable handle a subsystem can hold past the call that
/// created it, to wake one specific coroutine once its async work
/// completes (§6: "to the coroutine pool (mark_ready)").
///
/// Waking is idempotent and safe even after the coroutine has completed
/// or been destroyed -- it goes through the same `mark_ready` a live
/// walk would use, which is itself a no-op on a freed id.
#[derive(Clone)]
pub struct CoroutineWaker {
    pool: Rc<RefCell<CoroutinePool>>,
    id: CoroutineId,
}

impl CoroutineWaker {
    pub fn new(pool: Rc<RefCell<CoroutinePool>>, id: CoroutineId) -> Self {
        CoroutineWaker { pool, id }
    }

    pub fn wake(&self) {
        self.pool.borrow_mut().mark_ready(self.id);
    }
}
