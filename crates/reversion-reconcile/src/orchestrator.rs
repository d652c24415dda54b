// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! The migration run.
//!
//! A run goes through its phases strictly in order:
//!
//! 1. **Catalog**: enumerate the object's versions on the primary, then the
//!    secondary site.
//! 2. **Merge**: keep the `versions` newest unique versions, oldest first.
//! 3. **Stage**: copy every retained version and the manifest to the scratch
//!    directory.
//! 4. **Purge**: force-delete the object on the primary, then the secondary.
//! 5. **Replay**: upload the staged versions to the primary, oldest first.
//!
//! Nothing destructive happens before phase 4. From phase 4 on, a failure
//! stops the run where it is; there is no rollback.

use std::path::PathBuf;
use std::sync::Arc;

use reversion_core::{
    Config, MigrationBatch, SiteClient, SiteId, StagedVersion, VersionBody, VersionDescriptor,
    OCTET_STREAM,
};
use serde::Serialize;
use tokio::fs::File;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{build_catalog, Catalog, ScanMode};
use crate::error::{MigrationError, MigrationResult};
use crate::events::{EventSink, MigrationEvent};
use crate::merge::merge_catalogs;
use crate::staging::{stage_versions, write_manifest};

/// The two sites taking part in a run.
#[derive(Clone)]
pub struct Sites {
    primary: Arc<dyn SiteClient>,
    secondary: Arc<dyn SiteClient>,
}

impl std::fmt::Debug for Sites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sites")
            .field("primary", &self.primary.endpoint())
            .field("secondary", &self.secondary.endpoint())
            .finish()
    }
}

impl Sites {
    /// Pairs the primary and secondary clients.
    pub fn new(primary: Arc<dyn SiteClient>, secondary: Arc<dyn SiteClient>) -> Self {
        Self { primary, secondary }
    }

    /// The client of one site.
    #[must_use]
    pub fn get(&self, site: SiteId) -> &Arc<dyn SiteClient> {
        match site {
            SiteId::Primary => &self.primary,
            SiteId::Secondary => &self.secondary,
        }
    }
}

/// What a run does, independent of the sites it runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Bucket holding the object on both sites.
    pub bucket: String,
    /// Object key.
    pub object: String,
    /// Number of versions to retain.
    pub versions: usize,
    /// How far catalogs read into each listing.
    pub scan: ScanMode,
    /// Directory receiving staged files.
    pub scratch_dir: PathBuf,
    /// Remove staged files after a successful replay.
    pub cleanup: bool,
    /// Stop after selection.
    pub dry_run: bool,
}

impl MigrationPlan {
    /// Builds the plan described by a validated configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket: config.target.bucket.clone(),
            object: config.target.object.clone(),
            versions: config.target.versions,
            scan: ScanMode::from_full_scan(config.catalog.full_scan),
            scratch_dir: config.staging.scratch_dir.clone(),
            cleanup: config.staging.cleanup,
            dry_run: false,
        }
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// Versions were purged and replayed.
    Completed,
    /// Neither site had a live version; nothing was changed.
    NoVersions,
    /// Dry run; nothing was changed.
    DryRun,
}

/// A version uploaded during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayedVersion {
    /// 1-based position in the replay.
    pub position: usize,
    /// The version as originally listed.
    pub original: VersionDescriptor,
    /// Version ID assigned by the primary site.
    pub new_version_id: Option<String>,
    /// ETag returned by the primary site.
    pub new_etag: Option<String>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Batch identifier naming the staged files.
    pub batch_id: Uuid,
    /// Bucket.
    pub bucket: String,
    /// Object key.
    pub object: String,
    /// How the run ended.
    pub outcome: MigrationOutcome,
    /// Live versions found on the primary site.
    pub primary_versions: usize,
    /// Live versions found on the secondary site.
    pub secondary_versions: usize,
    /// Retained versions, oldest first.
    pub retained: Vec<VersionDescriptor>,
    /// Staged files still on disk.
    pub staged_files: Vec<PathBuf>,
    /// Manifest path, if it is still on disk.
    pub manifest: Option<PathBuf>,
    /// Uploaded versions, in replay order.
    pub replayed: Vec<ReplayedVersion>,
}

/// A migration run over a pair of sites.
pub struct Migration {
    sites: Sites,
    plan: MigrationPlan,
    events: Arc<dyn EventSink>,
    batch: MigrationBatch,
}

impl Migration {
    /// Prepares a run with a fresh batch identifier.
    pub fn new(sites: Sites, plan: MigrationPlan, events: Arc<dyn EventSink>) -> Self {
        let batch = MigrationBatch::new(plan.scratch_dir.clone());
        Self { sites, plan, events, batch }
    }

    /// Replaces the batch identifier.
    #[must_use]
    pub fn with_batch_id(mut self, id: Uuid) -> Self {
        self.batch = MigrationBatch::with_id(id, self.plan.scratch_dir.clone());
        self
    }

    /// The batch naming this run's files.
    #[must_use]
    pub fn batch(&self) -> &MigrationBatch {
        &self.batch
    }

    /// Executes the run.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error. Errors for which
    /// [`MigrationError::is_destructive`] is false left both sites untouched.
    pub async fn run(&self) -> MigrationResult<MigrationReport> {
        let plan = &self.plan;
        info!(
            batch = %self.batch.id(),
            bucket = %plan.bucket,
            object = %plan.object,
            versions = plan.versions,
            dry_run = plan.dry_run,
            "Starting migration"
        );

        let primary = self.catalog(SiteId::Primary).await;
        let secondary = self.catalog(SiteId::Secondary).await;

        let retained = merge_catalogs(&primary.versions, &secondary.versions, plan.versions);
        let mut report = MigrationReport {
            batch_id: self.batch.id(),
            bucket: plan.bucket.clone(),
            object: plan.object.clone(),
            outcome: MigrationOutcome::Completed,
            primary_versions: primary.len(),
            secondary_versions: secondary.len(),
            retained: retained.versions().to_vec(),
            staged_files: Vec::new(),
            manifest: None,
            replayed: Vec::new(),
        };

        if retained.is_empty() {
            self.events.emit(&MigrationEvent::NoVersions);
            report.outcome = MigrationOutcome::NoVersions;
            return Ok(report);
        }
        self.events.emit(&MigrationEvent::Retained { count: retained.len() });

        if plan.dry_run {
            self.events.emit(&MigrationEvent::DryRun { count: retained.len() });
            report.outcome = MigrationOutcome::DryRun;
            return Ok(report);
        }

        let staged =
            stage_versions(&self.sites, &self.batch, &plan.bucket, &plan.object, &retained)
                .await?;
        let manifest = write_manifest(&self.batch, &plan.bucket, &plan.object).await?;
        self.events.emit(&MigrationEvent::Staged { count: staged.len() });

        self.purge().await?;

        for version in &staged {
            let replayed = self.replay(version).await?;
            report.replayed.push(replayed);
            if plan.cleanup {
                remove_staged(&version.path).await;
            } else {
                report.staged_files.push(version.path.clone());
            }
        }

        if plan.cleanup {
            remove_staged(&manifest).await;
        } else {
            report.manifest = Some(manifest);
        }

        info!(
            batch = %self.batch.id(),
            replayed = report.replayed.len(),
            "Migration complete"
        );
        Ok(report)
    }

    async fn catalog(&self, site: SiteId) -> Catalog {
        let plan = &self.plan;
        let catalog = build_catalog(
            self.sites.get(site).as_ref(),
            site,
            &plan.bucket,
            &plan.object,
            plan.versions,
            plan.scan,
        )
        .await;
        self.events.emit(&MigrationEvent::CatalogBuilt { site, count: catalog.len() });
        catalog
    }

    /// Force-deletes the object on the primary, then the secondary site.
    async fn purge(&self) -> MigrationResult<()> {
        let plan = &self.plan;
        for site in SiteId::ALL {
            self.sites
                .get(site)
                .delete_object_force(&plan.bucket, &plan.object)
                .await
                .map_err(|e| MigrationError::purge(site, plan.object.as_str(), e))?;
            self.events.emit(&MigrationEvent::Purged { site, key: plan.object.clone() });
        }
        Ok(())
    }

    /// Uploads one staged version to the primary site.
    async fn replay(&self, version: &StagedVersion) -> MigrationResult<ReplayedVersion> {
        let plan = &self.plan;
        let original = &version.descriptor;
        let fail = |e: &dyn std::fmt::Display| {
            MigrationError::replay(version.position, original.version_id.as_str(), e)
        };

        let file = File::open(&version.path).await.map_err(|e| fail(&e))?;
        let size = file.metadata().await.map_err(|e| fail(&e))?.len();
        let body = VersionBody::from_reader(file, size);

        let output = self
            .sites
            .get(SiteId::Primary)
            .put_version(&plan.bucket, &plan.object, body, OCTET_STREAM)
            .await
            .map_err(|e| fail(&e))?;

        self.events.emit(&MigrationEvent::Uploaded {
            site: SiteId::Primary,
            key: plan.object.clone(),
            etag: original.etag.clone(),
            position: version.position,
        });

        Ok(ReplayedVersion {
            position: version.position,
            original: original.clone(),
            new_version_id: output.version_id,
            new_etag: output.etag,
        })
    }
}

/// Removes a staged file, logging instead of failing.
async fn remove_staged(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove staged file");
    }
}
