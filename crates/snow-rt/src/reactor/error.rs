//! Reactor-local error taxonomy (§7).
//!
//! Script-level failures (`ScriptError`) never appear here -- they're
//! caught inside `CoroutinePool::drive_one_pass` and handed to
//! `Host::deliver_coroutine_panic`, never surfaced as a `ReactorError`.
//! Everything in this enum is fatal or loop-terminating.

use std::fmt;

/// An error surfaced by the reactor itself, as opposed to script code
/// running inside it.
#[derive(Debug)]
pub enum ReactorError {
    /// A registered subsystem reported unrecoverable failure (e.g. the
    /// poller died). The reactor drains remaining in-memory work and
    /// returns this from the *next* call rather than unwinding mid-tick.
    Subsystem(String),
    /// A documented invariant was violated (e.g. `CoroutinePool::enqueue`
    /// called on a live entry that isn't `Suspended`). Reported by
    /// `panic!`, never returned as a `Result` -- this variant exists so
    /// the panic message is built from `Display` rather than duplicated
    /// ad hoc at each call site.
    Invariant(&'static str),
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Subsystem(msg) => write!(f, "subsystem failure: {msg}"),
            ReactorError::Invariant(msg) => write!(f, "reactor invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for ReactorError {}

/// A place subsystems report unrecoverable failure to, handed out at
/// registration time (§7: `SubsystemError`).
///
/// Kept separate from `AsyncSubsystem` itself so a subsystem can stash
/// the sink and report failure from deep inside an async callback, not
/// just synchronously from `poll_nonblocking`.
#[derive(Clone, Default)]
pub struct FailureSink {
    pending: std::rc::Rc<std::cell::RefCell<Option<String>>>,
}

impl FailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, message: impl Into<String>) {
        let mut slot = self.pending.borrow_mut();
        if slot.is_none() {
            *slot = Some(message.into());
        }
    }

    /// Take the first reported failure, if any, clearing it.
    pub fn take(&self) -> Option<ReactorError> {
        self.pending.borrow_mut().take().map(ReactorError::Subsystem)
    }
}
