//! [`PendingSet`]: drives many [`PendingItem`]s forward as a group,
//! multiplexing readiness across the union of their connections.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::io;
use std::time::{Duration, Instant};

use mio::{Events, Poll, Token};
use slab::Slab;

use crate::callbacks::SetControl;
use crate::error::PendingError;
use crate::item::{ContinueResult, PendingItem};
use crate::PendingSetError;

/// Snapshot of one `wait` outcome: which pending items became readable
/// or reported exceptional readiness, consumed by the following `recv`.
#[derive(Default)]
struct WaitResult<Id> {
    readable: HashSet<Id>,
    errored: HashSet<Id>,
}

/// Outcome of one readiness wait.
enum WaitOutcome {
    /// The OS readiness primitive itself failed.
    Failed,
    /// The wait returned with zero events within `itertime`.
    Idle,
    /// `n` descriptors reported readiness.
    Ready(usize),
}

/// Whether the outer [`PendingSet::work`] loop should keep cycling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep running `cycle`.
    Continue,
    /// The readiness primitive failed; stop this `work` invocation.
    Stop,
}

/// A keyed collection of [`PendingItem`]s, driven forward as a group
/// via readiness multiplexing over the union of their connections'
/// file descriptors.
pub struct PendingSet<Id, R> {
    name: String,
    maxtime: Duration,
    itertime: Duration,
    onidle: Option<Box<dyn FnMut(&mut SetControl<Id, R>)>>,
    items: HashMap<Id, PendingItem<Id, R>>,
    poll: Poll,
    tokens: Slab<Id>,
    waitresult: WaitResult<Id>,
}

impl<Id, R> PendingSet<Id, R>
where
    Id: Clone + Eq + Hash + std::fmt::Debug,
{
    /// Create an empty set.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the OS readiness primitive
    /// cannot be created.
    pub fn new(
        name: impl Into<String>,
        maxtime: Duration,
        itertime: Duration,
        onidle: Option<Box<dyn FnMut(&mut SetControl<Id, R>)>>,
    ) -> io::Result<Self> {
        Ok(Self {
            name: name.into(),
            maxtime,
            itertime,
            onidle,
            items: HashMap::new(),
            poll: Poll::new()?,
            tokens: Slab::new(),
            waitresult: WaitResult::default(),
        })
    }

    /// Diagnostic label this set was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of items currently tracked (any state).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// `true` if no items are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enumerate the items currently tracked, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &PendingItem<Id, R>)> {
        self.items.iter()
    }

    /// Add items to the set.
    ///
    /// # Errors
    ///
    /// Fails, leaving the set unchanged, if any `id` is already present.
    pub fn add(
        &mut self,
        items: impl IntoIterator<Item = PendingItem<Id, R>>,
    ) -> Result<(), PendingSetError<Id>> {
        let items: Vec<_> = items.into_iter().collect();
        for it in &items {
            if self.items.contains_key(it.id()) {
                return Err(PendingSetError::AlreadyPresent(it.id().clone()));
            }
        }
        for it in items {
            self.items.insert(it.id().clone(), it);
        }
        Ok(())
    }

    /// Remove items from the set by id, closing their connections if
    /// they were mid-attempt.
    ///
    /// # Errors
    ///
    /// Fails, leaving the set unchanged, if any `id` is absent.
    pub fn remove(&mut self, ids: impl IntoIterator<Item = Id>) -> Result<(), PendingSetError<Id>> {
        let ids: Vec<_> = ids.into_iter().collect();
        for id in &ids {
            if !self.items.contains_key(id) {
                return Err(PendingSetError::NotPresent(id.clone()));
            }
        }
        for id in ids {
            let mut it = self.items.remove(&id).expect("presence checked above");
            if let Some(token) = it.close("removed", self.poll.registry()) {
                self.tokens.remove(token.0);
            }
        }
        Ok(())
    }

    /// Start-or-retry sweep: for each sleeping item, either begin a new
    /// attempt, leave it sleeping for this tick, or — if its retry
    /// budget is exhausted — remove it and report terminal failure.
    fn send(&mut self, ctl: &mut SetControl<Id, R>) {
        let sleeping_ids: Vec<Id> = self
            .items
            .iter()
            .filter(|(_, it)| it.is_sleeping())
            .map(|(id, _)| id.clone())
            .collect();

        for id in sleeping_ids {
            let Some(it) = self.items.get(&id) else {
                continue; // removed by an earlier callback in this sweep
            };

            if it.tries() >= it.retry {
                let retries = it.retry;
                let mut it = self.items.remove(&id).expect("checked present above");
                it.callbacks.on_error(
                    id.clone(),
                    PendingError::NoSuccessAfterRetries { retries },
                    ctl,
                );
                continue;
            }

            let eligible = it.tries() == 0 || it.is_timeout(Some(it.retry_delay));
            if !eligible {
                continue;
            }

            let cont = {
                let it = self.items.get_mut(&id).expect("checked present above");
                it.callbacks.on_retry(&id, ctl)
            };
            let Some(cont) = cont else { continue };

            let idx = self.tokens.insert(id.clone());
            let token = Token(idx);
            let registry = self.poll.registry();
            let it = self.items.get_mut(&id).expect("checked present above");
            if let Err(e) = it.begin_attempt(cont, token, registry) {
                log::warn!(
                    "set {}: failed to register connection for {id:?}: {e}",
                    self.name
                );
                self.tokens.remove(idx);
            }
        }
    }

    /// Readiness wait: poll the union of pending items' connections,
    /// bounded by `itertime`.
    fn wait(&mut self, ctl: &mut SetControl<Id, R>) -> WaitOutcome {
        let mut events = Events::with_capacity(self.items.len().max(1));
        match self.poll.poll(&mut events, Some(self.itertime)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                self.waitresult = WaitResult::default();
                return WaitOutcome::Idle;
            }
            Err(e) => {
                log::error!("set {}: readiness poll failed: {e}", self.name);
                self.waitresult = WaitResult::default();
                return WaitOutcome::Failed;
            }
        }

        if events.iter().next().is_none() {
            self.waitresult = WaitResult::default();
            if let Some(onidle) = &mut self.onidle {
                onidle(ctl);
            }
            return WaitOutcome::Idle;
        }

        let mut readable = HashSet::new();
        let mut errored = HashSet::new();
        for ev in events.iter() {
            if let Some(id) = self.tokens.get(ev.token().0) {
                if ev.is_readable() {
                    readable.insert(id.clone());
                }
                if ev.is_error() || ev.is_read_closed() {
                    errored.insert(id.clone());
                }
            }
        }
        let n = readable.len() + errored.len();
        self.waitresult = WaitResult { readable, errored };
        WaitOutcome::Ready(n)
    }

    /// Drain ready items: advance readable ones, close reset/timed-out
    /// ones back to sleeping.
    fn recv(&mut self, ctl: &mut SetControl<Id, R>) {
        let pending_ids: Vec<Id> = self
            .items
            .iter()
            .filter(|(_, it)| it.is_pending())
            .map(|(id, _)| id.clone())
            .collect();

        for id in pending_ids {
            let readable = self.waitresult.readable.contains(&id);
            let errored = self.waitresult.errored.contains(&id);

            if readable {
                let (result, freed) = {
                    let registry = self.poll.registry();
                    let it = self
                        .items
                        .get_mut(&id)
                        .expect("pending item vanished mid-sweep");
                    it.continue_step(registry)
                };
                if let Some(t) = freed {
                    self.tokens.remove(t.0);
                }
                match result {
                    ContinueResult::Done(reply) => {
                        let mut it = self
                            .items
                            .remove(&id)
                            .expect("pending item vanished mid-sweep");
                        it.callbacks.on_ok(id.clone(), reply, ctl);
                    }
                    ContinueResult::Continuing => {}
                    ContinueResult::Failed => {
                        let registry = self.poll.registry();
                        let it = self
                            .items
                            .get_mut(&id)
                            .expect("pending item vanished mid-sweep");
                        if let Some(t) = it.close("error while receiving", registry) {
                            self.tokens.remove(t.0);
                        }
                    }
                }
            } else if errored {
                let registry = self.poll.registry();
                let it = self
                    .items
                    .get_mut(&id)
                    .expect("pending item vanished mid-sweep");
                if let Some(t) = it.close("connection reset", registry) {
                    self.tokens.remove(t.0);
                }
            } else {
                let timed_out = self
                    .items
                    .get(&id)
                    .is_some_and(|it| it.is_timeout(None));
                if timed_out {
                    let registry = self.poll.registry();
                    let it = self
                        .items
                        .get_mut(&id)
                        .expect("pending item vanished mid-sweep");
                    if let Some(t) = it.close("timeout", registry) {
                        self.tokens.remove(t.0);
                    }
                }
            }
        }
    }

    /// One scheduling cycle: `send`, then `wait`, then (unless the
    /// wait was idle or failed) `recv`.
    pub fn cycle(&mut self, ctl: &mut SetControl<Id, R>) -> CycleOutcome {
        self.send(ctl);
        self.apply_control(ctl);
        match self.wait(ctl) {
            WaitOutcome::Failed => CycleOutcome::Stop,
            WaitOutcome::Idle => CycleOutcome::Continue,
            WaitOutcome::Ready(_) => {
                self.recv(ctl);
                self.apply_control(ctl);
                CycleOutcome::Continue
            }
        }
    }

    /// Deadline-expiry drain: remove every remaining item, close its
    /// connection if mid-attempt, and report `on_error(Timeout)`.
    fn finish(&mut self, ctl: &mut SetControl<Id, R>) {
        let ids: Vec<Id> = self.items.keys().cloned().collect();
        for id in ids {
            let Some(mut it) = self.items.remove(&id) else {
                continue;
            };
            if let Some(token) = it.close("timeout", self.poll.registry()) {
                self.tokens.remove(token.0);
            }
            it.callbacks.on_error(id.clone(), PendingError::Timeout, ctl);
        }
    }

    fn apply_control(&mut self, ctl: &mut SetControl<Id, R>) {
        for id in ctl.drain_removals() {
            if let Some(mut it) = self.items.remove(&id) {
                if let Some(token) = it.close("removed", self.poll.registry()) {
                    self.tokens.remove(token.0);
                }
            }
        }
        for item in ctl.drain_additions() {
            if self.items.contains_key(item.id()) {
                log::warn!(
                    "set {}: ignoring queued add for already-present id {:?}",
                    self.name,
                    item.id()
                );
                continue;
            }
            self.items.insert(item.id().clone(), item);
        }
    }

    /// Top-level driver: run cycles until the set empties or `maxtime`
    /// elapses, then drain whatever remains via `finish`.
    ///
    /// Never raises for individual item failures — those are surfaced
    /// through that item's `on_ok`/`on_error`. Panics from user
    /// callbacks are not caught and propagate out of this call.
    pub fn work(&mut self) {
        let start = Instant::now();
        let mut ctl = SetControl::default();
        while !self.items.is_empty() && start.elapsed() < self.maxtime {
            if self.cycle(&mut ctl) == CycleOutcome::Stop {
                break;
            }
        }
        self.finish(&mut ctl);
        self.apply_control(&mut ctl);
    }
}
