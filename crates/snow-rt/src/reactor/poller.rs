//! The OS I/O multiplexer the reactor drives (§6: "to the poller
//! (consumed)").
//!
//! The reactor only ever calls three things on the poller: run one
//! non-blocking pass, run one blocking pass, and ask whether it still has
//! live work. This module defines that trait plus two implementations:
//! `MioPoller`, a real default backed by `mio` for timers and raw fds, and
//! `NullPoller`, used by tests that don't need real OS readiness.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};
use slab::Slab;

/// What the reactor drives every iteration of the Loop Policy.
pub trait Poller {
    /// Pump the multiplexer without sleeping -- used when synchronous work
    /// is already ready (`WorkFlags::BLOCKING_CANDIDATES`).
    fn run_nonblocking(&mut self);

    /// Sleep until the next event or timer deadline, then pump once --
    /// used as the "safe point before blocking" when only async work
    /// remains.
    fn run_once_blocking(&mut self);

    /// Whether the poller still has live registrations (fds, timers). A
    /// poller with nothing left registered can never wake the loop again.
    fn is_alive(&self) -> bool;
}

struct TimerEntry {
    deadline: Instant,
    id: u64,
    callback: Box<dyn FnOnce()>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; order by deadline so `peek`/`pop`
        // surface the *soonest* entry once wrapped in `Reverse`.
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Default `Poller`: a real `mio::Poll` for registered fds plus an
/// in-process min-heap of timer deadlines.
///
/// Grounded in `r3bl_tui`'s use of `mio = "1.0"` with the `os-poll`
/// feature for cross-platform (epoll/kqueue) readiness polling.
pub struct MioPoller {
    poll: Poll,
    events: Events,
    io_callbacks: Slab<Box<dyn FnMut(&mio::event::Event)>>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    next_timer_id: u64,
}

impl MioPoller {
    pub fn new() -> std::io::Result<Self> {
        Ok(MioPoller {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            io_callbacks: Slab::new(),
            timers: BinaryHeap::new(),
            next_timer_id: 0,
        })
    }

    /// Register an fd-backed source. `on_ready` runs (possibly several
    /// times) whenever the multiplexer reports readiness for it.
    pub fn register_source(
        &mut self,
        source: &mut dyn mio::event::Source,
        interest: Interest,
        on_ready: impl FnMut(&mio::event::Event) + 'static,
    ) -> std::io::Result<Token> {
        let slot = self.io_callbacks.insert(Box::new(on_ready));
        let token = Token(slot);
        self.poll.registry().register(source, token, interest)?;
        Ok(token)
    }

    /// Schedule `callback` to run once, no sooner than `deadline`. Returns
    /// an id that can be used to cancel it (cancellation is not wired up
    /// here -- it's a subsystem concern per §5).
    pub fn schedule_timer(&mut self, deadline: Instant, callback: impl FnOnce() + 'static) -> u64 {
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.timers.push(Reverse(TimerEntry {
            deadline,
            id,
            callback: Box::new(callback),
        }));
        id
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.timers.peek().map(|Reverse(t)| {
            t.deadline.saturating_duration_since(Instant::now())
        })
    }

    fn fire_due_timers(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(entry)) = self.timers.peek() {
            if entry.deadline > now {
                break;
            }
            let Reverse(entry) = self.timers.pop().unwrap();
            (entry.callback)();
        }
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        self.events.clear();
        if self.poll.poll(&mut self.events, timeout).is_ok() {
            for event in self.events.iter() {
                let token = event.token();
                if let Some(cb) = self.io_callbacks.get_mut(token.0) {
                    cb(event);
                }
            }
        }
        self.fire_due_timers();
    }
}

impl Poller for MioPoller {
    fn run_nonblocking(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn run_once_blocking(&mut self) {
        // Cap the sleep at the next timer deadline so a pure-timer
        // workload (no registered fd at all) still wakes up on time.
        let timeout = self.next_timeout();
        self.pump(timeout);
    }

    fn is_alive(&self) -> bool {
        !self.io_callbacks.is_empty() || !self.timers.is_empty()
    }
}

/// Delegating impl so a `Reactor<H, Rc<RefCell<MioPoller>>>` can share its
/// poller with the subsystems it drives: the embedder clones the `Rc` and
/// hands it to each subsystem's constructor, which registers sources or
/// schedules timers directly (`register_source`, `schedule_timer`) while
/// the reactor itself only ever sees the `Poller` trait surface.
impl<T: Poller> Poller for Rc<RefCell<T>> {
    fn run_nonblocking(&mut self) {
        self.borrow_mut().run_nonblocking();
    }

    fn run_once_blocking(&mut self) {
        self.borrow_mut().run_once_blocking();
    }

    fn is_alive(&self) -> bool {
        self.borrow().is_alive()
    }
}

/// A `Poller` that never reports live work and never blocks. Useful for
/// tests that drive the reactor purely through microtasks/immediates and
/// don't need a real multiplexer.
#[derive(Default)]
pub struct NullPoller {
    pub nonblocking_calls: u64,
    pub blocking_calls: u64,
}

impl Poller for NullPoller {
    fn run_nonblocking(&mut self) {
        self.nonblocking_calls += 1;
    }

    fn run_once_blocking(&mut self) {
        self.blocking_calls += 1;
    }

    fn is_alive(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_refcell_poller_delegates_through_shared_handle() {
        let shared = Rc::new(RefCell::new(NullPoller::default()));
        let mut poller = shared.clone();
        Poller::run_nonblocking(&mut poller);
        assert_eq!(shared.borrow().nonblocking_calls, 1);
    }

    #[test]
    fn null_poller_counts_calls_and_reports_dead() {
        let mut p = NullPoller::default();
        assert!(!p.is_alive());
        p.run_nonblocking();
        p.run_once_blocking();
        assert_eq!(p.nonblocking_calls, 1);
        assert_eq!(p.blocking_calls, 1);
    }

    #[test]
    fn mio_poller_reports_alive_once_timer_scheduled() {
        let mut p = MioPoller::new().expect("mio::Poll::new should succeed in tests");
        assert!(!p.is_alive());
        p.schedule_timer(Instant::now(), || {});
        assert!(p.is_alive());
    }

    #[test]
    fn mio_poller_fires_due_timer_on_nonblocking_pump() {
        let mut p = MioPoller::new().expect("mio::Poll::new should succeed in tests");
        let fired = std::rc::Rc::new(std::cell::Cell::new(false));
        let fired2 = fired.clone();
        p.schedule_timer(Instant::now(), move || fired2.set(true));
        p.run_nonblocking();
        assert!(fired.get());
        assert!(!p.is_alive());
    }

    #[test]
    fn mio_poller_does_not_fire_future_timer_early() {
        let mut p = MioPoller::new().expect("mio::Poll::new should succeed in tests");
        let fired = std::rc::Rc::new(std::cell::Cell::new(false));
        let fired2 = fired.clone();
        p.schedule_timer(Instant::now() + Duration::from_secs(60), move || {
            fired2.set(true)
        });
        p.run_nonblocking();
        assert!(!fired.get());
        assert!(p.is_alive());
    }
}
