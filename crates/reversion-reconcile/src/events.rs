// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Progress events emitted during a migration run.

use std::fmt;
use std::sync::Mutex;

use reversion_core::SiteId;
use serde::Serialize;

/// A step of a migration run that an operator wants to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MigrationEvent {
    /// A site's catalog is complete.
    CatalogBuilt {
        /// The site.
        site: SiteId,
        /// Live versions collected.
        count: usize,
    },
    /// The retained set was computed.
    Retained {
        /// Number of retained versions.
        count: usize,
    },
    /// Neither site has a live version; the run stops here.
    NoVersions,
    /// Every retained version is staged locally.
    Staged {
        /// Number of staged versions.
        count: usize,
    },
    /// The object was force-deleted on a site.
    Purged {
        /// The site.
        site: SiteId,
        /// Object key.
        key: String,
    },
    /// A staged version was uploaded.
    Uploaded {
        /// Target site.
        site: SiteId,
        /// Object key.
        key: String,
        /// ETag of the original version.
        etag: String,
        /// 1-based position in the replay.
        position: usize,
    },
    /// Dry run; the run stops after selection.
    DryRun {
        /// Number of versions that would be replayed.
        count: usize,
    },
}

impl fmt::Display for MigrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CatalogBuilt { site, count } => write!(f, "Got {count} versions from {site}"),
            Self::Retained { count } => write!(f, "Found {count} unique versions to retain"),
            Self::NoVersions => f.write_str("No versions found"),
            Self::Staged { count } => write!(f, "Downloaded {count} versions"),
            Self::Purged { site, key } => write!(f, "Purged object {key} on {site}"),
            Self::Uploaded { site, key, etag, .. } => {
                write!(f, "Uploaded {key} with ETag {etag} to {site}")
            }
            Self::DryRun { count } => {
                write!(f, "Dry run: {count} versions would be replayed, nothing changed")
            }
        }
    }
}

/// Receives progress events.
pub trait EventSink: Send + Sync {
    /// Handle one event.
    fn emit(&self, event: &MigrationEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: &MigrationEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MigrationEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<MigrationEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &MigrationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_lines() {
        let lines: Vec<String> = [
            MigrationEvent::CatalogBuilt { site: SiteId::Primary, count: 2 },
            MigrationEvent::Retained { count: 2 },
            MigrationEvent::Staged { count: 2 },
            MigrationEvent::Purged { site: SiteId::Secondary, key: "cat.png".to_string() },
            MigrationEvent::Uploaded {
                site: SiteId::Primary,
                key: "cat.png".to_string(),
                etag: "\"abc\"".to_string(),
                position: 1,
            },
            MigrationEvent::NoVersions,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();

        assert_eq!(
            lines,
            vec![
                "Got 2 versions from Site1",
                "Found 2 unique versions to retain",
                "Downloaded 2 versions",
                "Purged object cat.png on Site2",
                "Uploaded cat.png with ETag \"abc\" to Site1",
                "No versions found",
            ]
        );
    }

    #[test]
    fn test_event_json() {
        let event = MigrationEvent::Purged { site: SiteId::Primary, key: "k".to_string() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "purged");
        assert_eq!(json["site"], "primary");
        assert_eq!(json["key"], "k");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.emit(&MigrationEvent::NoVersions);
        sink.emit(&MigrationEvent::DryRun { count: 1 });
        assert_eq!(sink.events(), vec![MigrationEvent::NoVersions, MigrationEvent::DryRun { count: 1 }]);
    }
}
