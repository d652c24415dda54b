// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-site version enumeration.
//!
//! A catalog holds at most `cap` live versions of one key on one site. Delete
//! markers and entries the site failed to describe are skipped; a listing page
//! that cannot be fetched ends enumeration for that site with whatever was
//! collected so far. None of these are errors for the run.

use reversion_core::{ListContinuation, ListVersionsRequest, SiteClient, SiteId, VersionDescriptor};
use tracing::{debug, info, warn};

/// How far a catalog reads into the site's listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Stop as soon as `cap` live versions are collected, in listing order.
    #[default]
    Bounded,
    /// Read the whole listing and keep the `cap` newest live versions.
    Full,
}

impl ScanMode {
    /// Selects the mode from the `catalog.full_scan` setting.
    #[must_use]
    pub const fn from_full_scan(full_scan: bool) -> Self {
        if full_scan {
            Self::Full
        } else {
            Self::Bounded
        }
    }
}

/// Versions of one key collected from one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    /// Site the versions were read from.
    pub site: SiteId,
    /// Live versions, in listing order (newest first under [`ScanMode::Full`]).
    pub versions: Vec<VersionDescriptor>,
    /// Entries for the key that were looked at, including skipped ones.
    pub inspected: usize,
    /// Delete markers skipped.
    pub skipped_delete_markers: usize,
    /// Entries or pages skipped because of an error.
    pub skipped_errors: usize,
}

impl Catalog {
    fn empty(site: SiteId) -> Self {
        Self {
            site,
            versions: Vec::new(),
            inspected: 0,
            skipped_delete_markers: 0,
            skipped_errors: 0,
        }
    }

    /// Number of live versions collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if no live version was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Collects up to `cap` live versions of `bucket/key` from one site.
///
/// Pages are requested lazily; under [`ScanMode::Bounded`] no page is
/// requested once the cap is reached.
pub async fn build_catalog(
    client: &dyn SiteClient,
    site: SiteId,
    bucket: &str,
    key: &str,
    cap: usize,
    mode: ScanMode,
) -> Catalog {
    let request = ListVersionsRequest::for_object(bucket, key);
    let bounded = mode == ScanMode::Bounded;
    let mut catalog = Catalog::empty(site);
    let mut continuation: Option<ListContinuation> = None;

    'pages: loop {
        if bounded && catalog.versions.len() >= cap {
            break;
        }

        let page = match client.list_versions(&request, continuation.as_ref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    %site,
                    endpoint = client.endpoint(),
                    error = %e,
                    "Listing failed, ending enumeration"
                );
                catalog.skipped_errors += 1;
                break;
            }
        };

        for entry in page.entries {
            if bounded && catalog.versions.len() >= cap {
                break 'pages;
            }
            match entry {
                Err(e) => {
                    warn!(%site, error = %e, "Skipping unreadable listing entry");
                    catalog.inspected += 1;
                    catalog.skipped_errors += 1;
                }
                Ok(entry) if entry.key != key => {
                    debug!(%site, key = %entry.key, "Ignoring entry for another key");
                }
                Ok(entry) if entry.is_delete_marker => {
                    catalog.inspected += 1;
                    catalog.skipped_delete_markers += 1;
                }
                Ok(entry) => {
                    catalog.inspected += 1;
                    catalog.versions.push(VersionDescriptor::from_entry(site, entry));
                }
            }
        }

        match page.next {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    if mode == ScanMode::Full {
        catalog.versions.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        catalog.versions.truncate(cap);
    }

    info!(
        %site,
        versions = catalog.versions.len(),
        inspected = catalog.inspected,
        delete_markers = catalog.skipped_delete_markers,
        errors = catalog.skipped_errors,
        "Catalog built"
    );
    catalog
}
