//! Pending-request coordination core for shard-partitioned key/value
//! store clients.
//!
//! This crate drives many independent, single-connection request flows
//! in parallel, multiplexing their socket readiness through one
//! readiness-polling loop. Each request is a small retry/timeout state
//! machine ([`PendingItem`]) that advances *sleeping → pending → done*
//! while [`PendingSet`] evenly services all outstanding work within an
//! overall deadline.
//!
//! Command shaping, wire-protocol framing, and connection establishment
//! are deliberately out of scope — this crate consumes a caller-built
//! [`Connection`] and [`StepFn`] as opaque capabilities and knows
//! nothing about the bytes they move.

pub mod callbacks;
pub mod connection;
pub mod error;
pub mod item;
pub mod set;

pub use callbacks::{FnCallbacks, PendingCallbacks, SetControl};
pub use connection::{Connection, Continuation, Step, StepFailure, StepFn};
pub use error::{PendingError, PendingSetError};
pub use item::PendingItem;
pub use set::{CycleOutcome, PendingSet};
