//! Command line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use reversion_core::{Config, PurgeMode};

/// Reversion: rebuild an object's version history across two S3-compatible sites.
#[derive(Parser)]
#[command(name = "reversion")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Merge both sites' versions of an object and replay them on Site1.
    ///
    /// This deletes the object with all its versions on both sites before
    /// replaying the retained versions. Use --dry-run first.
    Migrate(Box<MigrateArgs>),
    /// Print version information.
    Version,
}

/// Output format for CLI commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress lines.
    #[default]
    Text,
    /// A JSON report on completion.
    Json,
}

/// How a site purges every version of the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum PurgeModeArg {
    /// One DELETE with the MinIO force-delete header.
    Minio,
    /// Delete each listed version individually.
    Versions,
}

impl From<PurgeModeArg> for PurgeMode {
    fn from(arg: PurgeModeArg) -> Self {
        match arg {
            PurgeModeArg::Minio => Self::Minio,
            PurgeModeArg::Versions => Self::Versions,
        }
    }
}

/// Arguments for the migrate command.
#[derive(Args)]
pub struct MigrateArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    // ========================================================================
    // Site1
    // ========================================================================
    /// Site1 endpoint URL (overrides config).
    #[arg(long)]
    pub s1_endpoint: Option<String>,

    /// Site1 access key (overrides config).
    #[arg(long)]
    pub s1_access_key: Option<String>,

    /// Site1 secret key (overrides config).
    #[arg(long, env = "REVERSION_S1_SECRET_KEY", hide_env_values = true)]
    pub s1_secret_key: Option<String>,

    // ========================================================================
    // Site2
    // ========================================================================
    /// Site2 endpoint URL (overrides config).
    #[arg(long)]
    pub s2_endpoint: Option<String>,

    /// Site2 access key (overrides config).
    #[arg(long)]
    pub s2_access_key: Option<String>,

    /// Site2 secret key (overrides config).
    #[arg(long, env = "REVERSION_S2_SECRET_KEY", hide_env_values = true)]
    pub s2_secret_key: Option<String>,

    // ========================================================================
    // Target
    // ========================================================================
    /// Bucket holding the object on both sites.
    #[arg(short, long)]
    pub bucket: Option<String>,

    /// Object key.
    #[arg(short, long)]
    pub object: Option<String>,

    /// Number of most recent versions to keep.
    #[arg(short = 'n', long)]
    pub versions: Option<usize>,

    // ========================================================================
    // Behaviour
    // ========================================================================
    /// Skip TLS certificate verification on both sites.
    #[arg(long)]
    pub insecure: bool,

    /// Signing region for both sites.
    #[arg(long)]
    pub region: Option<String>,

    /// How both sites purge the object.
    #[arg(long)]
    pub purge_mode: Option<PurgeModeArg>,

    /// Directory for staged versions and the manifest.
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    /// Read each site's full listing instead of stopping at --versions entries.
    #[arg(long)]
    pub full_scan: bool,

    /// Show what would be kept without staging, purging or uploading.
    #[arg(long)]
    pub dry_run: bool,

    /// Delete staged files once they are replayed.
    #[arg(long)]
    pub cleanup: bool,

    /// Output format (text, json).
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

impl MigrateArgs {
    /// Applies the command line on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        override_with(&mut config.site1.endpoint, &self.s1_endpoint);
        override_with(&mut config.site1.access_key, &self.s1_access_key);
        override_with(&mut config.site1.secret_key, &self.s1_secret_key);
        override_with(&mut config.site2.endpoint, &self.s2_endpoint);
        override_with(&mut config.site2.access_key, &self.s2_access_key);
        override_with(&mut config.site2.secret_key, &self.s2_secret_key);
        override_with(&mut config.target.bucket, &self.bucket);
        override_with(&mut config.target.object, &self.object);

        for site in [&mut config.site1, &mut config.site2] {
            if self.insecure {
                site.insecure = true;
            }
            override_with(&mut site.region, &self.region);
            if let Some(mode) = self.purge_mode {
                site.purge_mode = mode.into();
            }
        }

        if let Some(versions) = self.versions {
            config.target.versions = versions;
        }
        if let Some(dir) = &self.scratch_dir {
            config.staging.scratch_dir.clone_from(dir);
        }
        if self.cleanup {
            config.staging.cleanup = true;
        }
        if self.full_scan {
            config.catalog.full_scan = true;
        }
    }
}

fn override_with(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        target.clone_from(value);
    }
}
