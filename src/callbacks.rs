//! The typed callback capability a [`PendingItem`](crate::PendingItem)
//! drives, and the scoped handle callbacks use to mutate set membership
//! without aliasing the scheduler mid-sweep.

use crate::connection::Continuation;
use crate::error::PendingError;
use crate::item::PendingItem;

/// Per-request callback capability.
///
/// Replaces the three loosely-typed callback slots of the original
/// design with one small interface, per the Design Notes' suggested
/// redesign. An item is driven by exactly one `on_retry` per attempt
/// and exactly one of `on_ok` / `on_error`, ever, over its lifetime.
pub trait PendingCallbacks<Id, R> {
    /// Build the next attempt. Return `None` to leave the item sleeping
    /// for this tick without consuming a retry.
    fn on_retry(&mut self, id: &Id, ctl: &mut SetControl<Id, R>) -> Option<Continuation<R>>;

    /// Delivered once, on final success.
    fn on_ok(&mut self, id: Id, result: R, ctl: &mut SetControl<Id, R>);

    /// Delivered once, on terminal failure (exhausted retries or the
    /// set-wide deadline).
    fn on_error(&mut self, id: Id, reason: PendingError, ctl: &mut SetControl<Id, R>);
}

/// The scoped, deferred-mutation handle callbacks receive in place of a
/// live `&mut PendingSet`.
///
/// Callbacks run while the scheduler is mid-iteration over its item
/// map; handing them a live set reference would let them alias or
/// invalidate the very iteration driving them. Instead they queue
/// `add`/`remove` requests here, and the scheduler applies the queue
/// once it is safe to do so (end of `send`, `recv`, or `finish`).
pub struct SetControl<Id, R> {
    to_add: Vec<PendingItem<Id, R>>,
    to_remove: Vec<Id>,
}

impl<Id, R> Default for SetControl<Id, R> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
        }
    }
}

impl<Id, R> SetControl<Id, R> {
    /// Queue a new item to be added once the current sweep completes.
    pub fn queue_add(&mut self, item: PendingItem<Id, R>) {
        self.to_add.push(item);
    }

    /// Queue an item id to be removed once the current sweep completes.
    pub fn queue_remove(&mut self, id: Id) {
        self.to_remove.push(id);
    }

    pub(crate) fn drain_removals(&mut self) -> Vec<Id> {
        self.to_remove.drain(..).collect()
    }

    pub(crate) fn drain_additions(&mut self) -> Vec<PendingItem<Id, R>> {
        self.to_add.drain(..).collect()
    }
}

type RetryFn<Id, R> = dyn FnMut(&Id, &mut SetControl<Id, R>) -> Option<Continuation<R>>;
type OkFn<Id, R> = dyn FnMut(Id, R, &mut SetControl<Id, R>);
type ErrorFn<Id, R> = dyn FnMut(Id, PendingError, &mut SetControl<Id, R>);

/// Adapts three plain closures into a [`PendingCallbacks`] implementation.
///
/// Per the Design Notes: "Closures are fine where a variant suffices."
/// Most callers building one request kind at a time want this instead
/// of naming a struct and writing the trait impl by hand.
pub struct FnCallbacks<Id, R> {
    on_retry: Box<RetryFn<Id, R>>,
    on_ok: Box<OkFn<Id, R>>,
    on_error: Box<ErrorFn<Id, R>>,
}

impl<Id, R> FnCallbacks<Id, R> {
    /// Build a callback capability from three closures.
    pub fn new(
        on_retry: impl FnMut(&Id, &mut SetControl<Id, R>) -> Option<Continuation<R>> + 'static,
        on_ok: impl FnMut(Id, R, &mut SetControl<Id, R>) + 'static,
        on_error: impl FnMut(Id, PendingError, &mut SetControl<Id, R>) + 'static,
    ) -> Self {
        Self {
            on_retry: Box::new(on_retry),
            on_ok: Box::new(on_ok),
            on_error: Box::new(on_error),
        }
    }
}

impl<Id, R> PendingCallbacks<Id, R> for FnCallbacks<Id, R> {
    fn on_retry(&mut self, id: &Id, ctl: &mut SetControl<Id, R>) -> Option<Continuation<R>> {
        (self.on_retry)(id, ctl)
    }

    fn on_ok(&mut self, id: Id, result: R, ctl: &mut SetControl<Id, R>) {
        (self.on_ok)(id, result, ctl);
    }

    fn on_error(&mut self, id: Id, reason: PendingError, ctl: &mut SetControl<Id, R>) {
        (self.on_error)(id, reason, ctl);
    }
}
