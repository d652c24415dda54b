// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Core types for reversion, the cross-site version reconciliation tool.
//!
//! This crate provides the building blocks shared by every reversion component:
//! - Configuration management (TOML file plus validation)
//! - Error types, including S3 error responses returned by a site
//! - The version data model (descriptors, staged versions, migration batches)
//! - The [`SiteClient`] contract each object-storage site must satisfy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod site;
pub mod types;

pub use config::{
    CatalogConfig, Config, LogFormat, LoggingConfig, PurgeMode, SiteConfig, StagingConfig,
    TargetConfig,
};
pub use error::{Error, Result};
pub use site::{
    ListContinuation, ListVersionsRequest, PutVersionOutput, SiteClient, VersionBody,
    VersionEntry, VersionPage, OCTET_STREAM,
};
pub use types::{has_dot_segment, MigrationBatch, SiteId, StagedVersion, VersionDescriptor};
