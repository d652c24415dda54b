// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! S3 site client for reversion.
//!
//! [`S3SiteClient`] implements [`reversion_core::SiteClient`] over plain
//! HTTP(S) with AWS Signature V4 authentication and path-style addressing,
//! which is what MinIO and most self-hosted S3 implementations expect.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod sigv4;
pub mod xml;

pub use client::{S3SiteClient, BYPASS_GOVERNANCE_HEADER, MINIO_FORCE_DELETE_HEADER};
pub use sigv4::SigV4Signer;
