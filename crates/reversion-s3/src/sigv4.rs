// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! AWS Signature Version 4 request signing.
//!
//! Only header-based signing is supported. Callers build the canonical pieces
//! (encoded path, decoded query parameters, headers to sign) and receive the
//! `Authorization` header value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of an empty payload.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Payload hash for bodies streamed without hashing.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// A request as seen by the signer.
#[derive(Debug)]
pub struct SignableRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Already URI-encoded path, exactly as sent.
    pub path: &'a str,
    /// Decoded query parameters.
    pub query: &'a BTreeMap<String, String>,
    /// Headers to sign, keyed by lowercase name.
    pub headers: &'a BTreeMap<String, String>,
    /// Hex SHA-256 of the payload, or [`UNSIGNED_PAYLOAD`].
    pub payload_hash: &'a str,
}

/// AWS Signature V4 signer.
#[derive(Clone)]
pub struct SigV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    /// Create a new signer for the S3 service.
    #[must_use]
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service: "s3".to_string(),
        }
    }

    /// Formats a timestamp as an `x-amz-date` value.
    #[must_use]
    pub fn amz_date(time: DateTime<Utc>) -> String {
        time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    /// Computes the `Authorization` header for `request`.
    ///
    /// `amz_date` must be the same value sent in the `x-amz-date` header.
    #[must_use]
    pub fn authorization(&self, request: &SignableRequest<'_>, amz_date: &str) -> String {
        let signed_headers = request.headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical_request = self.create_canonical_request(request, &signed_headers);
        let credential_scope = self.credential_scope(amz_date);
        let string_to_sign =
            self.create_string_to_sign(&canonical_request, amz_date, &credential_scope);
        let signature = self.calculate_signature(&string_to_sign, amz_date);

        format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.access_key
        )
    }

    /// URI-encode a string according to AWS SigV4 requirements.
    /// Unreserved characters (A-Z, a-z, 0-9, hyphen, underscore, period, tilde) are not encoded.
    #[must_use]
    pub fn uri_encode(input: &str, encode_slash: bool) -> String {
        let mut result = String::with_capacity(input.len());
        for byte in input.bytes() {
            let c = byte as char;
            let is_unreserved =
                c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '~' || c == '.';
            let is_unencoded_slash = c == '/' && !encode_slash;

            if is_unreserved || is_unencoded_slash {
                result.push(c);
            } else {
                result.push_str(&format!("%{byte:02X}"));
            }
        }
        result
    }

    /// Encodes query parameters in canonical (sorted, fully encoded) form.
    ///
    /// The same string is used for the request URL so the signed and the sent
    /// query can never disagree.
    #[must_use]
    pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
        let mut encoded: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (Self::uri_encode(k, true), Self::uri_encode(v, true)))
            .collect();
        encoded.sort();
        encoded.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
    }

    fn credential_scope(&self, amz_date: &str) -> String {
        format!("{}/{}/{}/aws4_request", &amz_date[..8], self.region, self.service)
    }

    fn create_canonical_request(
        &self,
        request: &SignableRequest<'_>,
        signed_headers: &str,
    ) -> String {
        let canonical_uri = if request.path.is_empty() { "/" } else { request.path };
        let canonical_query = Self::canonical_query(request.query);

        let mut canonical_headers = String::new();
        for (name, value) in request.headers {
            canonical_headers.push_str(&format!("{}:{}\n", name, value.trim()));
        }

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            canonical_uri,
            canonical_query,
            canonical_headers,
            signed_headers,
            request.payload_hash
        )
    }

    fn create_string_to_sign(
        &self,
        canonical_request: &str,
        amz_date: &str,
        credential_scope: &str,
    ) -> String {
        let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

        format!("{ALGORITHM}\n{amz_date}\n{credential_scope}\n{hash}")
    }

    fn calculate_signature(&self, string_to_sign: &str, amz_date: &str) -> String {
        let date = &amz_date[..8]; // YYYYMMDD

        // Derive signing key
        let k_date =
            self.hmac_sha256(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes());
        let k_region = self.hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = self.hmac_sha256(&k_region, self.service.as_bytes());
        let k_signing = self.hmac_sha256(&k_service, b"aws4_request");

        let signature = self.hmac_sha256(&k_signing, string_to_sign.as_bytes());

        hex::encode(signature)
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}
