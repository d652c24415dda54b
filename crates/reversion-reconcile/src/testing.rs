// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! In-memory site client for tests.
//!
//! [`InMemorySite`] keeps a versioned key space in memory, records every call
//! it receives into a [`CallLog`] that can be shared between sites, and can be
//! told to fail individual operations.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use reversion_core::{
    Error, ListContinuation, ListVersionsRequest, PutVersionOutput, Result, SiteClient,
    VersionBody, VersionEntry, VersionPage,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A call received by an [`InMemorySite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteCall {
    /// One listing page was requested.
    ListVersions {
        /// Listing prefix.
        prefix: String,
    },
    /// A version was fetched.
    GetVersion {
        /// Object key.
        key: String,
        /// Version ID.
        version_id: String,
    },
    /// A version was uploaded.
    PutVersion {
        /// Object key.
        key: String,
        /// Uploaded bytes.
        data: Bytes,
        /// Content type.
        content_type: String,
    },
    /// The object was force-deleted.
    DeleteObjectForce {
        /// Object key.
        key: String,
    },
}

/// A call together with the endpoint that received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Endpoint of the receiving site.
    pub endpoint: String,
    /// The call.
    pub call: SiteCall,
}

/// Ordered record of calls, shareable between sites.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl CallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, endpoint: &str, call: SiteCall) {
        lock(&self.calls).push(RecordedCall { endpoint: endpoint.to_string(), call });
    }

    /// Every recorded call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Returns true if no destructive call (put or force-delete) was recorded.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        lock(&self.calls).iter().all(|c| {
            matches!(c.call, SiteCall::ListVersions { .. } | SiteCall::GetVersion { .. })
        })
    }
}

/// An operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// Every listing request.
    ListVersions,
    /// Fetching one version.
    GetVersion(String),
    /// Every upload after this many successful ones.
    PutVersionAfter(usize),
    /// Force-deleting any object.
    DeleteObjectForce,
}

#[derive(Debug, Clone)]
enum StoredEntry {
    Version {
        key: String,
        version_id: String,
        last_modified: DateTime<Utc>,
        etag: String,
        data: Bytes,
        is_delete_marker: bool,
    },
    Broken(String),
}

impl StoredEntry {
    fn key(&self) -> Option<&str> {
        match self {
            Self::Version { key, .. } => Some(key),
            Self::Broken(_) => None,
        }
    }
}

/// A versioned key space held in memory.
#[derive(Debug)]
pub struct InMemorySite {
    endpoint: String,
    entries: Mutex<Vec<StoredEntry>>,
    page_size: Option<usize>,
    failures: Mutex<HashSet<FailPoint>>,
    truncated: Mutex<HashSet<String>>,
    puts: AtomicUsize,
    log: CallLog,
}

impl InMemorySite {
    /// Create an empty site with its own call log.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_log(endpoint, CallLog::new())
    }

    /// Create an empty site recording into `log`.
    pub fn with_log(endpoint: impl Into<String>, log: CallLog) -> Self {
        Self {
            endpoint: endpoint.into(),
            entries: Mutex::new(Vec::new()),
            page_size: None,
            failures: Mutex::new(HashSet::new()),
            truncated: Mutex::new(HashSet::new()),
            puts: AtomicUsize::new(0),
            log,
        }
    }

    /// Serve listings in pages of `size` entries.
    #[must_use]
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Append a version to the listing.
    #[must_use]
    pub fn with_version(
        self,
        key: &str,
        version_id: &str,
        last_modified: DateTime<Utc>,
        data: impl Into<Bytes>,
    ) -> Self {
        lock(&self.entries).push(StoredEntry::Version {
            key: key.to_string(),
            version_id: version_id.to_string(),
            last_modified,
            etag: format!("\"etag-{version_id}\""),
            data: data.into(),
            is_delete_marker: false,
        });
        self
    }

    /// Append a delete marker to the listing.
    #[must_use]
    pub fn with_delete_marker(
        self,
        key: &str,
        version_id: &str,
        last_modified: DateTime<Utc>,
    ) -> Self {
        lock(&self.entries).push(StoredEntry::Version {
            key: key.to_string(),
            version_id: version_id.to_string(),
            last_modified,
            etag: String::new(),
            data: Bytes::new(),
            is_delete_marker: true,
        });
        self
    }

    /// Append a listing entry that fails to decode.
    #[must_use]
    pub fn with_broken_entry(self, reason: &str) -> Self {
        lock(&self.entries).push(StoredEntry::Broken(reason.to_string()));
        self
    }

    /// Make an operation fail.
    #[must_use]
    pub fn failing(self, point: FailPoint) -> Self {
        lock(&self.failures).insert(point);
        self
    }

    /// Serve `version_id` with fewer bytes than its declared size.
    #[must_use]
    pub fn truncating(self, version_id: &str) -> Self {
        lock(&self.truncated).insert(version_id.to_string());
        self
    }

    /// Calls received by this site only.
    #[must_use]
    pub fn calls(&self) -> Vec<SiteCall> {
        self.log
            .calls()
            .into_iter()
            .filter(|c| c.endpoint == self.endpoint)
            .map(|c| c.call)
            .collect()
    }

    /// Bytes of every version of `key` currently stored, in listing order.
    #[must_use]
    pub fn contents(&self, key: &str) -> Vec<Bytes> {
        lock(&self.entries)
            .iter()
            .filter_map(|entry| match entry {
                StoredEntry::Version { key: k, data, is_delete_marker: false, .. } if k == key => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn fails(&self, point: &FailPoint) -> bool {
        lock(&self.failures).contains(point)
    }

    fn injected(&self, operation: &str) -> Error {
        Error::s3(503, "ServiceUnavailable", format!("injected {operation} failure"))
    }
}

/// A fixed timestamp `seconds` after 2024-01-01T00:00:00Z.
#[must_use]
pub fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200 + seconds, 0).unwrap_or_default()
}

#[async_trait]
impl SiteClient for InMemorySite {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_versions(
        &self,
        request: &ListVersionsRequest,
        continuation: Option<&ListContinuation>,
    ) -> Result<VersionPage> {
        self.log.record(&self.endpoint, SiteCall::ListVersions { prefix: request.prefix.clone() });
        if self.fails(&FailPoint::ListVersions) {
            return Err(self.injected("list"));
        }

        let matching: Vec<StoredEntry> = lock(&self.entries)
            .iter()
            .filter(|e| e.key().map_or(true, |k| k.starts_with(&request.prefix)))
            .cloned()
            .collect();

        let start = continuation
            .and_then(|c| c.version_id_marker.as_deref())
            .and_then(|marker| marker.parse::<usize>().ok())
            .unwrap_or(0);
        let end = self.page_size.map_or(matching.len(), |size| (start + size).min(matching.len()));

        let entries = matching[start.min(end)..end]
            .iter()
            .map(|entry| match entry {
                StoredEntry::Version {
                    key,
                    version_id,
                    last_modified,
                    etag,
                    data,
                    is_delete_marker,
                } => Ok(VersionEntry {
                    key: key.clone(),
                    version_id: version_id.clone(),
                    last_modified: *last_modified,
                    etag: etag.clone(),
                    size: data.len() as u64,
                    is_latest: false,
                    is_delete_marker: *is_delete_marker,
                }),
                StoredEntry::Broken(reason) => Err(Error::InvalidEntry(reason.clone())),
            })
            .collect();

        let next = (end < matching.len()).then(|| ListContinuation {
            key_marker: request.prefix.clone(),
            version_id_marker: Some(end.to_string()),
        });

        Ok(VersionPage { entries, next })
    }

    async fn get_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<VersionBody> {
        self.log.record(
            &self.endpoint,
            SiteCall::GetVersion { key: key.to_string(), version_id: version_id.to_string() },
        );
        if self.fails(&FailPoint::GetVersion(version_id.to_string())) {
            return Err(self.injected("get"));
        }

        let data = lock(&self.entries).iter().find_map(|entry| match entry {
            StoredEntry::Version { key: k, version_id: v, data, is_delete_marker: false, .. }
                if k == key && v == version_id =>
            {
                Some(data.clone())
            }
            _ => None,
        });
        let data = data.ok_or_else(|| {
            Error::s3_with_resource(
                404,
                "NoSuchVersion",
                "The specified version does not exist.",
                format!("/{bucket}/{key}"),
            )
        })?;

        if lock(&self.truncated).contains(version_id) {
            let size = data.len() as u64;
            let short = data.slice(..data.len() / 2);
            let stream = stream::once(async move { Ok::<_, std::io::Error>(short) });
            return Ok(VersionBody::new(size, stream.boxed()));
        }
        Ok(VersionBody::from_bytes(data))
    }

    async fn put_version(
        &self,
        _bucket: &str,
        key: &str,
        body: VersionBody,
        content_type: &str,
    ) -> Result<PutVersionOutput> {
        let data = body.collect().await?;
        self.log.record(
            &self.endpoint,
            SiteCall::PutVersion {
                key: key.to_string(),
                data: data.clone(),
                content_type: content_type.to_string(),
            },
        );

        let limit = lock(&self.failures).iter().find_map(|point| match point {
            FailPoint::PutVersionAfter(n) => Some(*n),
            _ => None,
        });
        if limit.is_some_and(|n| self.puts.load(Ordering::SeqCst) >= n) {
            return Err(self.injected("put"));
        }

        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        let version_id = format!("replayed-{n}");
        let etag = format!("\"etag-{version_id}\"");
        lock(&self.entries).push(StoredEntry::Version {
            key: key.to_string(),
            version_id: version_id.clone(),
            last_modified: Utc::now(),
            etag: etag.clone(),
            data,
            is_delete_marker: false,
        });

        Ok(PutVersionOutput { etag: Some(etag), version_id: Some(version_id) })
    }

    async fn delete_object_force(&self, _bucket: &str, key: &str) -> Result<()> {
        self.log.record(&self.endpoint, SiteCall::DeleteObjectForce { key: key.to_string() });
        if self.fails(&FailPoint::DeleteObjectForce) {
            return Err(self.injected("delete"));
        }
        lock(&self.entries).retain(|entry| entry.key() != Some(key));
        Ok(())
    }
}
