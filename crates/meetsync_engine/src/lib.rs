//! # meetsync engine
//!
//! Offline-first synchronization between a local durable record store and a
//! remote cloud replica.
//!
//! This crate provides:
//! - Full bidirectional sync passes ([`SyncOrchestrator`])
//! - Push delivery handling ([`SubscriptionHandler`])
//! - Optimistic add, update and soft-delete ([`Mutations`])
//! - Advisory sync and interaction locks with stale recovery ([`LockManager`])
//! - The UI-visible record sets and their change events ([`ReadModel`])
//! - Optional periodic background sync ([`PeriodicSync`])
//!
//! ## Key Invariants
//!
//! - The local store is written before any remote call
//! - A merge never produces fewer records than either input
//! - Records are never physically deleted by sync; deletion is a flag
//! - Binary fields never leave the local store
//! - At most one sync pass runs at a time
//! - A push delivery never rewrites the read model while a lock is held
//!
//! ## Example
//!
//! ```rust,ignore
//! use meetsync_engine::{SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(SyncConfig::default(), local_tables, remote);
//! engine.load()?;
//! let _subscriptions = engine.start_subscriptions()?;
//! let report = engine.full_sync()?;
//! println!("uploaded {} records", report.uploaded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod local;
mod lock;
mod mutation;
mod orchestrator;
mod read_model;
mod state;
mod subscription;

pub use config::SyncConfig;
pub use engine::{EngineBuilder, PeriodicSync, SyncEngine};
pub use error::{EngineError, EngineResult};
pub use local::{BulkPutOutcome, RecordStore};
pub use lock::{AdvisoryLock, LockGuard, LockManager, LockState, LockToken};
pub use mutation::{MutationReceipt, Mutations};
pub use orchestrator::SyncOrchestrator;
pub use read_model::{Published, ReadModel, ReadModelEvent, Snapshot};
pub use state::{RecordCounts, SyncReport, SyncState, SyncStats, UploadFailure};
pub use subscription::{DeliveryOutcome, SubscriptionHandler, SubscriptionSet};
