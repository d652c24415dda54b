// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types for a migration run.

use std::path::PathBuf;

use reversion_core::SiteId;
use thiserror::Error;

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Fatal errors that stop a migration run.
///
/// Everything before [`MigrationError::Purge`] happens before any destructive
/// operation; a run failing with one of those left both sites untouched.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A retained version could not be fetched from its site.
    #[error("failed to fetch version {version_id} from {site}: {source}")]
    Fetch {
        /// Site the version was fetched from.
        site: SiteId,
        /// Version ID.
        version_id: String,
        /// Underlying site error.
        #[source]
        source: reversion_core::Error,
    },

    /// A staged file could not be written.
    #[error("failed to stage version {version_id} to {}: {source}", path.display())]
    Stage {
        /// Version ID.
        version_id: String,
        /// Local file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The version stream ended before its declared size.
    #[error("version {version_id} is truncated: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Version ID.
        version_id: String,
        /// Declared size.
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },

    /// The manifest file could not be written.
    #[error("failed to write manifest {}: {source}", path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Force-deleting the object on a site failed.
    #[error("failed to purge {key} on {site}: {source}")]
    Purge {
        /// Site being purged.
        site: SiteId,
        /// Object key.
        key: String,
        /// Underlying site error.
        #[source]
        source: reversion_core::Error,
    },

    /// Replaying a staged version failed.
    #[error("failed to replay version {position} ({version_id}): {message}")]
    Replay {
        /// 1-based position of the version.
        position: usize,
        /// Original version ID.
        version_id: String,
        /// Error message.
        message: String,
    },
}

impl MigrationError {
    /// Create a fetch error.
    pub fn fetch(site: SiteId, version_id: impl Into<String>, source: reversion_core::Error) -> Self {
        Self::Fetch { site, version_id: version_id.into(), source }
    }

    /// Create a staging error.
    pub fn stage(
        version_id: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Stage { version_id: version_id.into(), path: path.into(), source }
    }

    /// Create a purge error.
    pub fn purge(site: SiteId, key: impl Into<String>, source: reversion_core::Error) -> Self {
        Self::Purge { site, key: key.into(), source }
    }

    /// Create a replay error.
    pub fn replay(
        position: usize,
        version_id: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Replay { position, version_id: version_id.into(), message: message.to_string() }
    }

    /// Returns true if the error happened after a site was modified.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::Purge { .. } | Self::Replay { .. })
    }
}
