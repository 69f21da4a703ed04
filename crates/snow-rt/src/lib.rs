//! Snow runtime reactor.
//!
//! This crate provides the event-loop orchestrator that drives a
//! single-threaded, cooperative script host: draining microtasks and
//! immediates, resuming ready coroutines, multiplexing OS I/O through a
//! pluggable [`reactor::Poller`], and coordinating a compacting collector's
//! root-forwarding pass with every registered async subsystem.
//!
//! The interpreter, the collector, and every async subsystem (fetch,
//! filesystem, child process, readline, stdin) are external collaborators
//! reached only through the [`reactor::Host`], [`reactor::AsyncSubsystem`],
//! and [`reactor::Poller`] traits -- this crate implements none of them.
//!
//! ## Modules
//!
//! - [`reactor`]: the Work Census, Tick Driver, Coroutine Pool, GC
//!   Coordinator, and Loop Policy that make up the reactor itself.

pub mod reactor;

pub use reactor::{
    AsyncSubsystem, CoroutineHandle, CoroutineId, CoroutineStatus, CoroutineWaker, FailureSink,
    Host, MioPoller, NullPoller, Poller, ReactorConfig, ReactorError, WorkFlags,
};
pub use reactor::Reactor;
