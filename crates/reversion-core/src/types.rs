// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Version data model.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::site::VersionEntry;

/// Returns true if a `/`-separated segment of `name` is `.` or `..`.
///
/// URL path normalization collapses such segments (including their `%2E`
/// forms), so these names cannot be addressed path-style.
#[must_use]
pub fn has_dot_segment(name: &str) -> bool {
    name.split('/').any(|segment| segment == "." || segment == "..")
}

/// Identifies one of the two sites taking part in a run.
///
/// Descriptors carry a `SiteId` rather than the client itself; the clients
/// are long-lived and shared for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteId {
    /// Site1: dedup authority and the only site receiving the replay.
    Primary,
    /// Site2.
    Secondary,
}

impl SiteId {
    /// Both sites, in purge order.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Secondary];

    /// Operator-facing name of the site.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Primary => "Site1",
            Self::Secondary => "Site2",
        }
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One historical revision of the object on one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    /// Site the version was read from.
    pub site: SiteId,
    /// Version ID, the dedup key across sites.
    pub version_id: String,
    /// Last modification time, the ordering key.
    pub last_modified: DateTime<Utc>,
    /// ETag as listed by the site. Reported, never compared.
    pub etag: String,
    /// Size in bytes as listed by the site.
    pub size: u64,
    /// Whether the entry is a delete marker.
    pub is_delete_marker: bool,
}

impl VersionDescriptor {
    /// Builds a descriptor from a listing entry read from `site`.
    #[must_use]
    pub fn from_entry(site: SiteId, entry: VersionEntry) -> Self {
        Self {
            site,
            version_id: entry.version_id,
            last_modified: entry.last_modified,
            etag: entry.etag,
            size: entry.size,
            is_delete_marker: entry.is_delete_marker,
        }
    }
}

/// Correlation identifier binding all staged files of one run.
///
/// Two runs sharing a scratch directory never share file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationBatch {
    id: Uuid,
    scratch_dir: PathBuf,
}

impl MigrationBatch {
    /// Creates a batch with a fresh identifier.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self::with_id(Uuid::new_v4(), scratch_dir)
    }

    /// Creates a batch with a known identifier.
    pub fn with_id(id: Uuid, scratch_dir: impl Into<PathBuf>) -> Self {
        Self { id, scratch_dir: scratch_dir.into() }
    }

    /// The batch identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The directory holding this batch's files.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Path of the staged file for the version at 1-based `position`.
    #[must_use]
    pub fn version_path(&self, position: usize) -> PathBuf {
        self.scratch_dir.join(format!("{}-v{}", self.id, position))
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.scratch_dir.join(format!("{}-out", self.id))
    }
}

/// A retained version whose bytes are persisted locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedVersion {
    /// The version as read from its originating site.
    pub descriptor: VersionDescriptor,
    /// 1-based position in chronological order.
    pub position: usize,
    /// Local file holding the bytes.
    pub path: PathBuf,
    /// Number of bytes staged.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_segments() {
        assert!(has_dot_segment("logs/../cat.png"));
        assert!(has_dot_segment("../other/x"));
        assert!(has_dot_segment("a/./b"));
        assert!(has_dot_segment(".."));
        assert!(!has_dot_segment("cat.png"));
        assert!(!has_dot_segment(".hidden/...x/..y"));
    }

    #[test]
    fn test_site_labels() {
        assert_eq!(SiteId::Primary.to_string(), "Site1");
        assert_eq!(SiteId::Secondary.to_string(), "Site2");
        assert_eq!(SiteId::ALL, [SiteId::Primary, SiteId::Secondary]);
    }

    #[test]
    fn test_batch_file_names() {
        let id = Uuid::parse_str("6f1c2a7e-3b7d-4c1e-9a55-0d2b7f1e8c01").unwrap();
        let batch = MigrationBatch::with_id(id, "/scratch");

        assert_eq!(
            batch.version_path(1),
            PathBuf::from("/scratch/6f1c2a7e-3b7d-4c1e-9a55-0d2b7f1e8c01-v1")
        );
        assert_eq!(
            batch.version_path(12),
            PathBuf::from("/scratch/6f1c2a7e-3b7d-4c1e-9a55-0d2b7f1e8c01-v12")
        );
        assert_eq!(
            batch.manifest_path(),
            PathBuf::from("/scratch/6f1c2a7e-3b7d-4c1e-9a55-0d2b7f1e8c01-out")
        );
    }

    #[test]
    fn test_batches_do_not_collide() {
        let a = MigrationBatch::new(".");
        let b = MigrationBatch::new(".");
        assert_ne!(a.id(), b.id());
        assert_ne!(a.version_path(1), b.version_path(1));
    }

    #[test]
    fn test_descriptor_from_entry() {
        let entry = VersionEntry {
            key: "cat.png".to_string(),
            version_id: "v1".to_string(),
            last_modified: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            etag: "\"abc\"".to_string(),
            size: 42,
            is_latest: true,
            is_delete_marker: false,
        };
        let descriptor = VersionDescriptor::from_entry(SiteId::Secondary, entry);
        assert_eq!(descriptor.site, SiteId::Secondary);
        assert_eq!(descriptor.version_id, "v1");
        assert_eq!(descriptor.size, 42);
        assert!(!descriptor.is_delete_marker);
    }
}
