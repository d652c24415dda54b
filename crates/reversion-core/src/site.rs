// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! The contract every object-storage site client satisfies.
//!
//! The reconciliation core only ever needs four capabilities from a site:
//! enumerate the versions of a key, fetch one version, upload a new version
//! and purge a key with all of its versions. Anything else (signing, retries,
//! TLS) is the client's business.

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Result;

/// Content type used when replaying versions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Read size used when turning a reader into a body stream.
const CHUNK_SIZE: usize = 64 * 1024;

/// Parameters of a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListVersionsRequest {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix.
    pub prefix: String,
    /// List the whole key space under the prefix instead of one level.
    pub recursive: bool,
    /// Include every version, not only the latest one.
    pub include_versions: bool,
    /// Ask the site for user metadata alongside each entry.
    pub include_metadata: bool,
}

impl ListVersionsRequest {
    /// A recursive, versioned listing of every entry under `key`.
    pub fn for_object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: key.into(),
            recursive: true,
            include_versions: true,
            include_metadata: true,
        }
    }
}

/// Where the next listing page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContinuation {
    /// Key marker.
    pub key_marker: String,
    /// Version ID marker.
    pub version_id_marker: Option<String>,
}

/// One entry of a version listing, as reported by the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Object key.
    pub key: String,
    /// Version ID.
    pub version_id: String,
    /// Last modified timestamp.
    pub last_modified: DateTime<Utc>,
    /// ETag (empty for delete markers).
    pub etag: String,
    /// Size in bytes (0 for delete markers).
    pub size: u64,
    /// Whether this is the latest version.
    pub is_latest: bool,
    /// Whether this is a delete marker.
    pub is_delete_marker: bool,
}

/// One page of a version listing.
///
/// Entries keep the site's native order. An entry the client failed to decode
/// is reported in place as an error so the caller can skip it.
#[derive(Debug, Default)]
pub struct VersionPage {
    /// Entries in listing order.
    pub entries: Vec<Result<VersionEntry>>,
    /// Continuation for the next page, `None` on the last page.
    pub next: Option<ListContinuation>,
}

/// Result of uploading a version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutVersionOutput {
    /// ETag of the new version.
    pub etag: Option<String>,
    /// Version ID assigned by the site.
    pub version_id: Option<String>,
}

/// A stream of object bytes together with its declared size.
pub struct VersionBody {
    size: u64,
    stream: BoxStream<'static, std::io::Result<Bytes>>,
}

impl VersionBody {
    /// Wraps a byte stream whose total length is `size`.
    pub fn new(size: u64, stream: BoxStream<'static, std::io::Result<Bytes>>) -> Self {
        Self { size, stream }
    }

    /// A body backed by an in-memory buffer.
    #[must_use]
    pub fn from_bytes(data: Bytes) -> Self {
        let size = data.len() as u64;
        Self::new(size, stream::once(async move { Ok::<_, std::io::Error>(data) }).boxed())
    }

    /// A body read from `reader`, which must yield `size` bytes.
    ///
    /// The reader is dropped, and therefore closed, when the stream is.
    pub fn from_reader<R>(reader: R, size: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let stream = stream::try_unfold(reader, |mut reader| async move {
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            let read = reader.read_buf(&mut buf).await?;
            let next = if read == 0 { None } else { Some((buf.freeze(), reader)) };
            Ok::<_, std::io::Error>(next)
        });
        Self::new(size, stream.boxed())
    }

    /// The declared size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Consumes the body, returning the byte stream.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, std::io::Result<Bytes>> {
        self.stream
    }

    /// Reads the whole body into memory.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the stream.
    pub async fn collect(self) -> std::io::Result<Bytes> {
        let mut stream = self.stream;
        let capacity = usize::try_from(self.size).unwrap_or(0).min(CHUNK_SIZE);
        let mut buf = BytesMut::with_capacity(capacity);
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for VersionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionBody").field("size", &self.size).finish_non_exhaustive()
    }
}

/// A capability handle to one object-storage site.
#[async_trait]
pub trait SiteClient: Send + Sync {
    /// The endpoint this client talks to, for diagnostics.
    fn endpoint(&self) -> &str;

    /// Fetches one page of a version listing.
    ///
    /// `continuation` is `None` for the first page and the previous page's
    /// `next` afterwards.
    async fn list_versions(
        &self,
        request: &ListVersionsRequest,
        continuation: Option<&ListContinuation>,
    ) -> Result<VersionPage>;

    /// Opens the byte stream of one version.
    async fn get_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<VersionBody>;

    /// Uploads `body` as a new version of `key`.
    async fn put_version(
        &self,
        bucket: &str,
        key: &str,
        body: VersionBody,
        content_type: &str,
    ) -> Result<PutVersionOutput>;

    /// Deletes `key` with all its versions, bypassing retention.
    async fn delete_object_force(&self, bucket: &str, key: &str) -> Result<()>;
}
