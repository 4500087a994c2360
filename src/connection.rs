//! The Connection capability: the only thing the coordination core
//! needs from a transport in order to drive a request forward.
//!
//! Everything wire-protocol-specific — framing, tuple encoding, operator
//! codes — lives outside this crate. A [`Connection`] is just a pollable
//! byte-level handle; a [`StepFn`] is the caller-supplied closure that
//! knows how to read from one and decide whether the exchange is done.

use std::fmt;
use std::io::{Read, Write};

use mio::event::Source;

/// A byte-level handle to one server, pollable through `mio`.
///
/// Implementors must be registrable with a [`mio::Registry`] (readiness
/// is how the scheduler knows when to call the installed [`StepFn`]),
/// readable and writable as a plain byte stream (a [`StepFn`] reads the
/// reply; `on_retry` typically writes the request before handing the
/// connection back), and must support an idempotent, synchronous close.
pub trait Connection: Source + Read + Write {
    /// Shut the connection down. Must not panic or raise for a
    /// connection that is already closed.
    fn close(&mut self, reason: &str);
}

/// Outcome of advancing one protocol step.
pub enum Step<R> {
    /// The exchange is not finished. If `connection` is `Some`, the
    /// next leg of the exchange happens over a *different* connection
    /// than the one just polled (e.g. a redirect) — the scheduler
    /// re-registers readiness on it under the same token.
    Continuing { connection: Option<Box<dyn Connection>> },
    /// The exchange is finished; this is the final result.
    Done(R),
}

/// A recoverable protocol failure reported by a [`StepFn`].
///
/// This is the result-variant form of what the original design raised
/// as an exception: the scheduler reacts identically either way — close
/// the connection, return the item to *sleeping*, let `send` decide
/// whether to retry.
#[derive(Debug, Clone)]
pub struct StepFailure(pub String);

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol step failed: {}", self.0)
    }
}

impl std::error::Error for StepFailure {}

/// A closure advancing one protocol step against a connection.
///
/// Called only when the connection has reported read readiness. May
/// read zero or more bytes, accumulate them internally (captured state
/// in the closure), and either report [`Step::Continuing`] (more bytes
/// needed, or a connection swap) or [`Step::Done`] with the final
/// result.
pub trait StepFn<R>: FnMut(&mut dyn Connection) -> Result<Step<R>, StepFailure> {}

impl<R, F> StepFn<R> for F where F: FnMut(&mut dyn Connection) -> Result<Step<R>, StepFailure> {}

/// A continuation descriptor: a connection, the closure that knows how
/// to advance it, and an optional one-shot transform applied to the
/// final result before delivery to `on_ok`.
///
/// Handed back from [`PendingCallbacks::on_retry`](crate::PendingCallbacks::on_retry)
/// to start an attempt.
pub struct Continuation<R> {
    /// The connection backing this attempt.
    pub connection: Box<dyn Connection>,
    /// Advances one protocol step; see [`StepFn`].
    pub step: Box<dyn StepFn<R>>,
    /// Applied once to the final result, before `on_ok` sees it.
    pub postprocess: Option<Box<dyn FnOnce(R) -> R>>,
}

impl<R> Continuation<R> {
    /// Build a continuation with no postprocessing step.
    pub fn new(connection: Box<dyn Connection>, step: Box<dyn StepFn<R>>) -> Self {
        Self {
            connection,
            step,
            postprocess: None,
        }
    }

    /// Attach a postprocessing transform applied once to the final result.
    #[must_use]
    pub fn with_postprocess(mut self, postprocess: Box<dyn FnOnce(R) -> R>) -> Self {
        self.postprocess = Some(postprocess);
        self
    }
}
