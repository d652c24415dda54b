// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by reversion components.

use thiserror::Error;

/// A specialized `Result` type for reversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a site or preparing a run.
#[derive(Debug, Error)]
pub enum Error {
    /// An error response returned by the object store.
    #[error("{code}: {message}")]
    S3 {
        /// HTTP status of the response.
        status: u16,
        /// The S3 error code (e.g. `NoSuchKey`).
        code: String,
        /// A human-readable error message.
        message: String,
        /// The resource that caused the error (bucket name, key, etc.).
        resource: Option<String>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request never produced a response (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The site answered with something that is not a valid S3 response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A single listing entry could not be decoded.
    #[error("invalid listing entry: {0}")]
    InvalidEntry(String),

    /// A bucket or key that cannot be addressed without the URL path changing.
    #[error("invalid object name: {0}")]
    InvalidKey(String),
}

impl Error {
    /// Creates a new S3 error.
    #[must_use]
    pub fn s3(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::S3 { status, code: code.into(), message: message.into(), resource: None }
    }

    /// Creates a new S3 error with a resource.
    #[must_use]
    pub fn s3_with_resource(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self::S3 {
            status,
            code: code.into(),
            message: message.into(),
            resource: Some(resource.into()),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the HTTP status for errors that came back from a site.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::S3 { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the S3 error code, if this is an S3 error.
    #[must_use]
    pub fn s3_error_code(&self) -> Option<&str> {
        match self {
            Self::S3 { code, .. } => Some(code),
            _ => None,
        }
    }
}
