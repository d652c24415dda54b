// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Local staging of retained versions.
//!
//! Every retained version is copied to `{scratch}/{batch}-v{position}` before
//! anything is deleted. Each remote stream and local file is opened and closed
//! within its own iteration, so a failure never leaves more than one handle
//! behind.

use std::path::PathBuf;

use futures_util::StreamExt;
use reversion_core::{MigrationBatch, SiteClient, StagedVersion, VersionDescriptor};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{MigrationError, MigrationResult};
use crate::merge::RetentionSet;
use crate::orchestrator::Sites;

/// Stages every retained version, oldest first, with 1-based positions.
///
/// # Errors
///
/// Returns the first fetch, write or size error; versions staged before it
/// stay on disk.
pub async fn stage_versions(
    sites: &Sites,
    batch: &MigrationBatch,
    bucket: &str,
    key: &str,
    retained: &RetentionSet,
) -> MigrationResult<Vec<StagedVersion>> {
    let mut staged = Vec::with_capacity(retained.len());
    for (index, descriptor) in retained.iter().enumerate() {
        let client = sites.get(descriptor.site);
        let version =
            stage_version(client.as_ref(), batch, bucket, key, descriptor, index + 1).await?;
        staged.push(version);
    }

    info!(batch = %batch.id(), count = staged.len(), "Staged versions");
    Ok(staged)
}

/// Copies exactly the declared size of one version to its staging file.
async fn stage_version(
    client: &dyn SiteClient,
    batch: &MigrationBatch,
    bucket: &str,
    key: &str,
    descriptor: &VersionDescriptor,
    position: usize,
) -> MigrationResult<StagedVersion> {
    let version_id = descriptor.version_id.as_str();
    let body = client
        .get_version(bucket, key, version_id)
        .await
        .map_err(|e| MigrationError::fetch(descriptor.site, version_id, e))?;
    let expected = body.size();

    let path = batch.version_path(position);
    let mut file =
        File::create(&path).await.map_err(|e| MigrationError::stage(version_id, &path, e))?;

    let mut stream = body.into_stream();
    let mut written = 0u64;
    while written < expected {
        let Some(chunk) = stream.next().await else {
            break;
        };
        let chunk =
            chunk.map_err(|e| MigrationError::fetch(descriptor.site, version_id, e.into()))?;
        let remaining = usize::try_from(expected - written).unwrap_or(usize::MAX);
        let take = chunk.len().min(remaining);
        file.write_all(&chunk[..take])
            .await
            .map_err(|e| MigrationError::stage(version_id, &path, e))?;
        written += take as u64;
    }

    if written < expected {
        return Err(MigrationError::SizeMismatch {
            version_id: version_id.to_string(),
            expected,
            actual: written,
        });
    }

    file.flush().await.map_err(|e| MigrationError::stage(version_id, &path, e))?;
    file.sync_all().await.map_err(|e| MigrationError::stage(version_id, &path, e))?;

    debug!(
        position,
        version_id,
        site = %descriptor.site,
        bytes = written,
        path = %path.display(),
        "Staged version"
    );

    Ok(StagedVersion { descriptor: descriptor.clone(), position, path, size: written })
}

/// Writes the `{batch}-out` manifest naming the object being migrated.
///
/// # Errors
///
/// Returns [`MigrationError::Manifest`] if the file cannot be written.
pub async fn write_manifest(
    batch: &MigrationBatch,
    bucket: &str,
    key: &str,
) -> MigrationResult<PathBuf> {
    let path = batch.manifest_path();
    let write = async {
        let mut file = File::create(&path).await?;
        file.write_all(format!("{bucket}/{key}").as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await
    };
    write.await.map_err(|source| MigrationError::Manifest { path: path.clone(), source })?;

    debug!(path = %path.display(), "Wrote manifest");
    Ok(path)
}
