// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Cross-site version reconciliation for reversion.
//!
//! This crate merges the version histories of one object replicated across
//! two sites, keeps the newest versions, and rebuilds them as a single linear
//! history on the primary site:
//!
//! - [`catalog`]: per-site version enumeration
//! - [`merge`]: cross-site dedup and selection
//! - [`staging`]: local copies of the retained versions
//! - [`orchestrator`]: the run itself, including purge and replay
//! - [`events`]: progress reporting
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use reversion_reconcile::{Migration, MigrationPlan, NoopSink, Sites};
//!
//! let sites = Sites::new(primary, secondary);
//! let plan = MigrationPlan::from_config(&config);
//! let report = Migration::new(sites, plan, Arc::new(NoopSink)).run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod error;
pub mod events;
pub mod merge;
pub mod orchestrator;
pub mod staging;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{build_catalog, Catalog, ScanMode};
pub use error::{MigrationError, MigrationResult};
pub use events::{EventSink, MigrationEvent, NoopSink, RecordingSink};
pub use merge::{merge_catalogs, RetentionSet};
pub use orchestrator::{
    Migration, MigrationOutcome, MigrationPlan, MigrationReport, ReplayedVersion, Sites,
};
pub use staging::{stage_versions, write_manifest};
