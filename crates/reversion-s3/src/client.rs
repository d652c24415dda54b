// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for one S3-compatible site.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, Response, Url};
use reversion_core::{
    has_dot_segment, Error, ListContinuation, ListVersionsRequest, PurgeMode, PutVersionOutput,
    Result, SiteClient, SiteConfig, VersionBody, VersionPage,
};
use tracing::{debug, info, warn};

use crate::sigv4::{SigV4Signer, SignableRequest, EMPTY_PAYLOAD_SHA256, UNSIGNED_PAYLOAD};
use crate::xml;

/// Header asking MinIO to drop every version of a key in one call.
pub const MINIO_FORCE_DELETE_HEADER: &str = "x-minio-force-delete";

/// Header bypassing governance-mode object lock on version deletes.
pub const BYPASS_GOVERNANCE_HEADER: &str = "x-amz-bypass-governance-retention";

const VERSION_ID_HEADER: &str = "x-amz-version-id";

/// A request body together with its length and payload hash.
struct Payload {
    body: reqwest::Body,
    length: u64,
    hash: &'static str,
}

/// One outgoing request before signing.
struct S3Request<'a> {
    method: Method,
    bucket: &'a str,
    key: Option<&'a str>,
    query: BTreeMap<String, String>,
    headers: Vec<(&'static str, String)>,
    payload: Option<Payload>,
}

impl<'a> S3Request<'a> {
    fn new(method: Method, bucket: &'a str, key: Option<&'a str>) -> Self {
        Self { method, bucket, key, query: BTreeMap::new(), headers: Vec::new(), payload: None }
    }

    fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// [`SiteClient`] speaking the S3 REST protocol with path-style addressing.
pub struct S3SiteClient {
    http: reqwest::Client,
    endpoint: String,
    base: Url,
    signer: SigV4Signer,
    purge_mode: PurgeMode,
}

impl std::fmt::Debug for S3SiteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3SiteClient")
            .field("endpoint", &self.endpoint)
            .field("purge_mode", &self.purge_mode)
            .finish_non_exhaustive()
    }
}

impl S3SiteClient {
    /// Creates a client from a site's configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client
    /// cannot be built.
    pub fn new(config: &SiteConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint {}: {e}", config.endpoint)))?;
        if base.host_str().is_none() {
            return Err(Error::config(format!("endpoint {} has no host", config.endpoint)));
        }

        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(config.insecure);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let http = builder.build().map_err(|e| Error::Transport(e.to_string()))?;

        if config.insecure && config.is_secure() {
            warn!(endpoint = %config.endpoint, "TLS certificate verification disabled");
        }

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            base,
            signer: SigV4Signer::new(&config.access_key, &config.secret_key, &config.region),
            purge_mode: config.purge_mode,
        })
    }

    fn host_header(&self) -> String {
        let host = self.base.host_str().unwrap_or_default();
        match self.base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Builds the path-style URL for a request.
    ///
    /// Fails instead of letting dot segments in the key be normalized away,
    /// which would address a different object than the one listed.
    fn request_url(&self, bucket: &str, key: Option<&str>, query: &str) -> Result<Url> {
        let name = key.map_or_else(|| bucket.to_string(), |key| format!("{bucket}/{key}"));
        if has_dot_segment(bucket) || key.is_some_and(has_dot_segment) {
            return Err(Error::InvalidKey(name));
        }

        let prefix = self.base.path().trim_end_matches('/');
        let mut path = format!("{prefix}/{}", SigV4Signer::uri_encode(bucket, true));
        if let Some(key) = key {
            path.push('/');
            path.push_str(&SigV4Signer::uri_encode(key, false));
        }

        let mut url = self.base.clone();
        url.set_path(&path);
        if url.path() != path {
            return Err(Error::InvalidKey(name));
        }
        url.set_query(if query.is_empty() { None } else { Some(query) });
        Ok(url)
    }

    /// Signs and sends a request, turning S3 error documents into errors.
    async fn send(&self, request: S3Request<'_>) -> Result<Response> {
        let query = SigV4Signer::canonical_query(&request.query);
        let url = self.request_url(request.bucket, request.key, &query)?;
        let amz_date = SigV4Signer::amz_date(Utc::now());
        let payload_hash = request.payload.as_ref().map_or(EMPTY_PAYLOAD_SHA256, |p| p.hash);

        let mut signed = BTreeMap::new();
        signed.insert("host".to_string(), self.host_header());
        signed.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());
        signed.insert("x-amz-date".to_string(), amz_date.clone());
        for (name, value) in &request.headers {
            signed.insert((*name).to_string(), value.clone());
        }

        let authorization = self.signer.authorization(
            &SignableRequest {
                method: request.method.as_str(),
                path: url.path(),
                query: &request.query,
                headers: &signed,
                payload_hash,
            },
            &amz_date,
        );

        debug!(method = %request.method, url = %url, "Sending S3 request");

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header("authorization", authorization)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", payload_hash);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(payload) = request.payload {
            builder = builder.header(CONTENT_LENGTH, payload.length).body(payload.body);
        }

        let response = builder.send().await.map_err(|e| Error::Transport(e.to_string()))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    /// Deletes every listed version of `key` one by one.
    async fn delete_all_versions(&self, bucket: &str, key: &str) -> Result<()> {
        let request = ListVersionsRequest::for_object(bucket, key);
        let mut continuation: Option<ListContinuation> = None;
        let mut deleted = 0usize;

        loop {
            let page = self.list_versions(&request, continuation.as_ref()).await?;
            for entry in page.entries {
                let entry = entry?;
                if entry.key != key {
                    continue;
                }
                self.send(
                    S3Request::new(Method::DELETE, bucket, Some(key))
                        .query("versionId", entry.version_id.as_str())
                        .header(BYPASS_GOVERNANCE_HEADER, "true"),
                )
                .await?;
                deleted += 1;
            }
            match page.next {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(bucket, key, deleted, "Deleted all versions");
        Ok(())
    }
}

/// Builds an error from a non-success response.
async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match xml::parse_error(&body) {
        Ok(doc) => Error::S3 {
            status: status.as_u16(),
            code: doc.code,
            message: doc.message,
            resource: doc.resource,
        },
        Err(_) => Error::s3(
            status.as_u16(),
            status.canonical_reason().unwrap_or("UnknownError").replace(' ', ""),
            format!("HTTP {status}"),
        ),
    }
}

#[async_trait]
impl SiteClient for S3SiteClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_versions(
        &self,
        request: &ListVersionsRequest,
        continuation: Option<&ListContinuation>,
    ) -> Result<VersionPage> {
        let mut s3 = S3Request::new(Method::GET, &request.bucket, None)
            .query("versions", "")
            .query("prefix", request.prefix.as_str());
        if !request.recursive {
            s3 = s3.query("delimiter", "/");
        }
        if request.include_metadata {
            s3 = s3.query("metadata", "true");
        }
        if let Some(continuation) = continuation {
            s3 = s3.query("key-marker", continuation.key_marker.as_str());
            if let Some(marker) = &continuation.version_id_marker {
                s3 = s3.query("version-id-marker", marker.as_str());
            }
        }

        let body = self
            .send(s3)
            .await?
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let result = xml::parse_list_versions(&body)?;

        let next = if result.is_truncated {
            let key_marker = result.next_key_marker.ok_or_else(|| {
                Error::InvalidResponse("truncated listing without NextKeyMarker".to_string())
            })?;
            Some(ListContinuation {
                key_marker,
                version_id_marker: result.next_version_id_marker,
            })
        } else {
            None
        };

        Ok(VersionPage { entries: result.entries, next })
    }

    async fn get_version(&self, bucket: &str, key: &str, version_id: &str) -> Result<VersionBody> {
        let response = self
            .send(S3Request::new(Method::GET, bucket, Some(key)).query("versionId", version_id))
            .await?;

        let size = response.content_length().ok_or_else(|| {
            Error::InvalidResponse(format!("no Content-Length for {key} version {version_id}"))
        })?;
        let stream = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));

        Ok(VersionBody::new(size, stream.boxed()))
    }

    async fn put_version(
        &self,
        bucket: &str,
        key: &str,
        body: VersionBody,
        content_type: &str,
    ) -> Result<PutVersionOutput> {
        let length = body.size();
        let mut request =
            S3Request::new(Method::PUT, bucket, Some(key)).header("content-type", content_type);
        request.payload = Some(Payload {
            body: reqwest::Body::wrap_stream(body.into_stream()),
            length,
            hash: UNSIGNED_PAYLOAD,
        });

        let response = self.send(request).await?;
        let header = |name: &str| {
            response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
        };

        Ok(PutVersionOutput { etag: header("etag"), version_id: header(VERSION_ID_HEADER) })
    }

    async fn delete_object_force(&self, bucket: &str, key: &str) -> Result<()> {
        match self.purge_mode {
            PurgeMode::Minio => {
                self.send(
                    S3Request::new(Method::DELETE, bucket, Some(key))
                        .header(MINIO_FORCE_DELETE_HEADER, "true"),
                )
                .await?;
            }
            PurgeMode::Versions => self.delete_all_versions(bucket, key).await?,
        }
        info!(endpoint = %self.endpoint, bucket, key, "Force-deleted object");
        Ok(())
    }
}
