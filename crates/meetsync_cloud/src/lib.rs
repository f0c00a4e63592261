//! # meetsync cloud
//!
//! Reference implementation of the remote replica: a document store with
//! one collection per entity kind and live push subscriptions.
//!
//! This crate provides:
//! - [`CloudStore`], implementing [`meetsync_model::RemoteStore`] over any
//!   [`meetsync_storage::TableStore`]
//! - Push subscriptions that deliver the complete current set of a kind on
//!   subscribe and after every change
//! - Failure injection (offline, rejected credentials, per-record save
//!   failures, write quota, document size limit)
//!
//! ## Key Invariants
//!
//! - Binary fields are never stored
//! - Every accepted write is followed by a delivery to each live subscriber
//! - Deliveries reach a subscriber in the order the writes were accepted
//! - Documents are only physically removed by the administrative `delete`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod store;
mod subscribers;

pub use config::{CloudConfig, DEFAULT_MAX_DOCUMENT_BYTES};
pub use error::{CloudError, CloudResult};
pub use store::CloudStore;
