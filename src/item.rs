//! [`PendingItem`]: the retry/timeout state machine for one request
//! against one shard.

use std::fmt;
use std::time::{Duration, Instant};

use mio::{Interest, Registry, Token};

use crate::callbacks::PendingCallbacks;
use crate::connection::{Connection, Continuation, Step};

/// The three mutually-exclusive states a [`PendingItem`] can be in.
///
/// Modeled as a tagged variant (Design Notes: "invariants become
/// exhaustiveness checks") rather than a pair of booleans — there is no
/// representable state where a connection exists but the item isn't
/// pending, or vice versa.
enum ItemState<R> {
    /// Not done, no connection. Waiting out `retry_delay`.
    Sleeping,
    /// Not done, connection present. An attempt is in flight.
    Pending(Active<R>),
    /// Terminal. `on_ok` or `on_error` has fired.
    Done,
}

struct Active<R> {
    connection: Box<dyn Connection>,
    step: Box<dyn crate::connection::StepFn<R>>,
    postprocess: Option<Box<dyn FnOnce(R) -> R>>,
    token: Token,
}

impl<R> fmt::Debug for ItemState<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleeping => write!(f, "Sleeping"),
            Self::Pending(_) => write!(f, "Pending"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Outcome of [`PendingItem::continue_step`].
pub(crate) enum ContinueResult<R> {
    /// The exchange finished; carries the (postprocessed) final result.
    Done(R),
    /// The exchange is not finished; the item stays pending.
    Continuing,
    /// The installed step reported a recoverable failure.
    Failed,
}

/// One logical request against one shard: a retry/timeout state
/// machine that owns its connection and continuation while an attempt
/// is in flight.
pub struct PendingItem<Id, R> {
    pub(crate) id: Id,
    pub(crate) timeout: Duration,
    pub(crate) retry_delay: Duration,
    pub(crate) retry: u32,
    pub(crate) tries: u32,
    pub(crate) callbacks: Box<dyn PendingCallbacks<Id, R>>,
    state: ItemState<R>,
    time: Instant,
}

impl<Id, R> PendingItem<Id, R> {
    /// Build a new item, starting *sleeping* with zero attempts made.
    ///
    /// The first attempt is always eligible immediately — there is no
    /// "previous attempt" for `retry_delay` to apply against.
    pub fn new(
        id: Id,
        timeout: Duration,
        retry_delay: Duration,
        retry: u32,
        callbacks: Box<dyn PendingCallbacks<Id, R>>,
    ) -> Self {
        Self {
            id,
            timeout,
            retry_delay,
            retry,
            tries: 0,
            callbacks,
            state: ItemState::Sleeping,
            time: Instant::now(),
        }
    }

    /// The shard key this item was created with.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Attempts started so far.
    pub fn tries(&self) -> u32 {
        self.tries
    }

    /// `true` while not done and no connection is installed.
    pub fn is_sleeping(&self) -> bool {
        matches!(self.state, ItemState::Sleeping)
    }

    /// `true` while not done and a connection is installed.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ItemState::Pending(_))
    }

    /// `true` once terminal (`on_ok` or `on_error` has fired).
    pub fn is_done(&self) -> bool {
        matches!(self.state, ItemState::Done)
    }

    /// `now - time > t`, where `t` defaults to `timeout` while pending
    /// and `retry_delay` while sleeping.
    pub fn is_timeout(&self, t: Option<Duration>) -> bool {
        let threshold = t.unwrap_or(if self.is_pending() {
            self.timeout
        } else {
            self.retry_delay
        });
        self.time.elapsed() > threshold
    }

    /// Transition *sleeping → pending*: install the continuation,
    /// register its connection for read readiness, bump `tries`, and
    /// stamp `time`. Called only by the scheduler.
    pub(crate) fn begin_attempt(
        &mut self,
        mut cont: Continuation<R>,
        token: Token,
        registry: &Registry,
    ) -> std::io::Result<()> {
        registry.register(&mut *cont.connection, token, Interest::READABLE)?;
        self.state = ItemState::Pending(Active {
            connection: cont.connection,
            step: cont.step,
            postprocess: cont.postprocess,
            token,
        });
        self.tries += 1;
        self.time = Instant::now();
        Ok(())
    }

    /// Run the installed step once. Only valid while pending; the
    /// scheduler never calls this otherwise.
    ///
    /// Returns the outcome plus, if the attempt ended (success or
    /// failure path not already re-registered), the [`Token`] the
    /// caller must free.
    pub(crate) fn continue_step(&mut self, registry: &Registry) -> (ContinueResult<R>, Option<Token>) {
        let active = match &mut self.state {
            ItemState::Pending(active) => active,
            ItemState::Sleeping | ItemState::Done => {
                debug_assert!(false, "continue_step called while not pending");
                return (ContinueResult::Failed, None);
            }
        };

        match (active.step)(&mut *active.connection) {
            Ok(Step::Done(result)) => {
                let token = active.token;
                let _ = registry.deregister(&mut *active.connection);
                let final_result = match active.postprocess.take() {
                    Some(f) => f(result),
                    None => result,
                };
                self.state = ItemState::Done;
                (ContinueResult::Done(final_result), Some(token))
            }
            Ok(Step::Continuing {
                connection: Some(mut next),
            }) => {
                let _ = registry.deregister(&mut *active.connection);
                if let Err(e) = registry.register(&mut *next, active.token, Interest::READABLE) {
                    log::error!("failed to register replacement connection: {e}");
                }
                active.connection = next;
                self.time = Instant::now();
                (ContinueResult::Continuing, None)
            }
            Ok(Step::Continuing { connection: None }) => {
                self.time = Instant::now();
                (ContinueResult::Continuing, None)
            }
            Err(_failure) => (ContinueResult::Failed, None),
        }
    }

    /// If pending, close the connection with `reason` and drop to
    /// *sleeping*, returning the [`Token`] the caller must free.
    /// No-op on an already-sleeping or done item.
    pub(crate) fn close(&mut self, reason: &str, registry: &Registry) -> Option<Token> {
        match &mut self.state {
            ItemState::Pending(active) => {
                let token = active.token;
                let _ = registry.deregister(&mut *active.connection);
                active.connection.close(reason);
                self.state = ItemState::Sleeping;
                self.time = Instant::now();
                Some(token)
            }
            ItemState::Sleeping | ItemState::Done => None,
        }
    }
}

impl<Id, R> Drop for PendingItem<Id, R> {
    fn drop(&mut self) {
        if self.is_pending() {
            log::error!(
                "PendingItem dropped while pending — a dangling in-flight exchange; \
                 this is a scheduler bug, not a transport error"
            );
            debug_assert!(false, "PendingItem dropped while pending");
        }
    }
}
