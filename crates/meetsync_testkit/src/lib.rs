//! # meetsync testkit
//!
//! Test utilities for meetsync.
//!
//! This crate provides:
//! - Record builders with explicit timestamps ([`RecordBuilder`])
//! - Temporary file-backed table stores ([`TempTables`])
//! - Proptest strategies for records and replica pairs

#![warn(missing_docs)]

mod fixtures;
mod generators;

pub use fixtures::*;
pub use generators::*;
