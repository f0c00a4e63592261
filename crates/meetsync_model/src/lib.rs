//! # meetsync model
//!
//! Record model and merge rules shared by every meetsync crate.
//!
//! This crate provides:
//! - The three synchronized record kinds ([`Meeting`], [`Stakeholder`],
//!   [`Category`]) and their lifecycle metadata
//! - Millisecond timestamps and injectable clocks
//! - The conflict resolver ([`reconcile`])
//! - The remote store contract ([`RemoteStore`]) and push subscriptions
//!
//! ## Key Invariants
//!
//! - Ids are immutable and are the only join key between replicas
//! - A tombstone (`deleted = true`) always beats a live copy
//! - Binary fields never reach the remote replica
//! - The resolver is pure: same inputs, same output

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod entities;
mod record;
mod remote;
mod time;

pub use conflict::{
    reconcile, resolve_pair, ReconcileOptions, Reconciliation, Resolution, Winner,
    DEFAULT_GRACE_WINDOW,
};
pub use entities::{
    Category, CategoryFields, ExtraFields, Meeting, MeetingFields, Stakeholder, StakeholderFields,
};
pub use record::{Blob, Entity, EntityKind, RecordId, RecordMeta};
pub use remote::{RemoteError, RemoteResult, RemoteStore, Subscription, Unsubscribe};
pub use time::{Clock, ManualClock, SharedClock, SystemClock, Timestamp};
