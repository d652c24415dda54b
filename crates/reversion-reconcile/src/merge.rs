// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Cross-site merge of version catalogs.
//!
//! The primary site is the dedup authority: a version ID listed by both sites
//! keeps the primary's descriptor. Selection orders newest first and keeps
//! the `cap` most recent versions; the result is stored oldest first, which is
//! the order versions are replayed in.

use std::collections::HashSet;

use reversion_core::VersionDescriptor;

/// The versions kept by a run, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionSet {
    versions: Vec<VersionDescriptor>,
}

impl RetentionSet {
    /// Retained versions in ascending `last_modified` order.
    #[must_use]
    pub fn versions(&self) -> &[VersionDescriptor] {
        &self.versions
    }

    /// Number of retained versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Iterates over retained versions, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, VersionDescriptor> {
        self.versions.iter()
    }
}

impl<'a> IntoIterator for &'a RetentionSet {
    type Item = &'a VersionDescriptor;
    type IntoIter = std::slice::Iter<'a, VersionDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.iter()
    }
}

/// Merges the primary and secondary catalogs into the retained set.
///
/// Every version ID appears once, from the first list that names it. Ties on
/// `last_modified` keep their merged order during selection. Delete markers
/// are never retained.
#[must_use]
pub fn merge_catalogs(
    primary: &[VersionDescriptor],
    secondary: &[VersionDescriptor],
    cap: usize,
) -> RetentionSet {
    let mut seen: HashSet<&str> = HashSet::with_capacity(primary.len() + secondary.len());
    let mut merged: Vec<VersionDescriptor> = primary
        .iter()
        .chain(secondary)
        .filter(|v| !v.is_delete_marker)
        .filter(|v| seen.insert(v.version_id.as_str()))
        .cloned()
        .collect();

    merged.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    merged.truncate(cap);
    merged.reverse();

    RetentionSet { versions: merged }
}


// =============================================================================
// Property-based Merge Tests (using proptest)
// =============================================================================

#[cfg(test)]
mod proptest_merge {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use reversion_core::SiteId;

    use super::*;
    use crate::testing::at;

    fn arb_catalog(site: SiteId) -> impl Strategy<Value = Vec<VersionDescriptor>> {
        prop::collection::vec((0u8..12, 0i64..30, prop::bool::weighted(0.1)), 0..10).prop_map(
            move |entries| {
                entries
                    .into_iter()
                    .map(|(id, seconds, is_delete_marker)| VersionDescriptor {
                        site,
                        version_id: format!("v{id}"),
                        last_modified: at(seconds),
                        etag: String::new(),
                        size: 0,
                        is_delete_marker,
                    })
                    .collect()
            },
        )
    }

    proptest! {
        /// The retained set is bounded, unique and oldest first.
        #[test]
        fn merged_set_is_bounded_unique_and_ascending(
            a in arb_catalog(SiteId::Primary),
            b in arb_catalog(SiteId::Secondary),
            cap in 1usize..8
        ) {
            let set = merge_catalogs(&a, &b, cap);

            prop_assert!(set.len() <= cap);
            let unique: HashSet<_> = set.iter().map(|v| v.version_id.as_str()).collect();
            prop_assert_eq!(unique.len(), set.len());
            prop_assert!(set.versions().windows(2).all(|w| w[0].last_modified <= w[1].last_modified));
            prop_assert!(set.iter().all(|v| !v.is_delete_marker));
        }

        /// A version listed live by the primary is never taken from the secondary.
        #[test]
        fn primary_is_dedup_authority(
            a in arb_catalog(SiteId::Primary),
            b in arb_catalog(SiteId::Secondary),
            cap in 1usize..8
        ) {
            let primary_ids: HashSet<_> = a
                .iter()
                .filter(|v| !v.is_delete_marker)
                .map(|v| v.version_id.as_str())
                .collect();
            let set = merge_catalogs(&a, &b, cap);

            for retained in &set {
                if primary_ids.contains(retained.version_id.as_str()) {
                    prop_assert_eq!(retained.site, SiteId::Primary);
                }
            }
        }

        /// With fewer unique versions than the cap, all of them are retained.
        #[test]
        fn everything_is_kept_under_the_cap(
            a in arb_catalog(SiteId::Primary),
            b in arb_catalog(SiteId::Secondary)
        ) {
            let live: HashSet<_> = a
                .iter()
                .chain(&b)
                .filter(|v| !v.is_delete_marker)
                .map(|v| v.version_id.as_str())
                .collect();
            let set = merge_catalogs(&a, &b, live.len() + 1);
            prop_assert_eq!(set.len(), live.len());
        }

        /// Merging a retained set again selects the same versions.
        #[test]
        fn merge_is_idempotent(
            a in arb_catalog(SiteId::Primary),
            b in arb_catalog(SiteId::Secondary),
            cap in 1usize..8
        ) {
            let once = merge_catalogs(&a, &b, cap);
            let twice = merge_catalogs(once.versions(), &[], cap);

            let ids = |set: &RetentionSet| -> HashSet<String> {
                set.iter().map(|v| v.version_id.clone()).collect()
            };
            prop_assert_eq!(ids(&once), ids(&twice));
            let times = |set: &RetentionSet| -> Vec<_> {
                set.iter().map(|v| v.last_modified).collect()
            };
            prop_assert_eq!(times(&once), times(&twice));
        }
    }
}
