// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management for reversion.
//!
//! A [`Config`] is built once per run, from an optional TOML file with CLI
//! overrides applied on top, validated, and then only ever borrowed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{has_dot_segment, SiteId};

/// Main configuration for a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// The primary site (dedup authority and replay target).
    pub site1: SiteConfig,
    /// The secondary site.
    pub site2: SiteConfig,
    /// The object being reconciled.
    pub target: TargetConfig,
    /// Local staging configuration.
    pub staging: StagingConfig,
    /// Version enumeration configuration.
    pub catalog: CatalogConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::Error::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed.
    pub fn parse(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Load configuration from an optional file, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a file was given and cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Checks that every required parameter is present.
    ///
    /// The first missing parameter is reported, in the order an operator
    /// would fill them in.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] naming the missing or invalid parameter.
    pub fn validate(&self) -> crate::Result<()> {
        self.site1.validate(SiteId::Primary)?;
        self.site2.validate(SiteId::Secondary)?;
        self.target.validate()
    }
}

/// How a site removes every version of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMode {
    /// A single DELETE carrying the MinIO force-delete header.
    #[default]
    Minio,
    /// List every version and delete each one, bypassing governance retention.
    Versions,
}

/// Connection settings for one object-storage site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Endpoint URL (`http://` or `https://`).
    pub endpoint: String,
    /// Access key.
    pub access_key: String,
    /// Secret key.
    pub secret_key: String,
    /// Signing region.
    pub region: String,
    /// Disable TLS certificate verification.
    pub insecure: bool,
    /// Per-request timeout in seconds. Set to 0 to disable.
    pub timeout_secs: u64,
    /// How force-deletes are issued.
    pub purge_mode: PurgeMode,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            insecure: false,
            timeout_secs: 300,
            purge_mode: PurgeMode::Minio,
        }
    }
}

impl SiteConfig {
    fn validate(&self, site: SiteId) -> crate::Result<()> {
        if self.endpoint.is_empty() {
            return Err(crate::Error::config(format!("{site} Endpoint is not provided")));
        }
        if self.access_key.is_empty() {
            return Err(crate::Error::config(format!("{site} Access key is not provided")));
        }
        if self.secret_key.is_empty() {
            return Err(crate::Error::config(format!("{site} Secret key is not provided")));
        }
        let scheme = self.endpoint.split_once("://").map_or("", |(scheme, _)| scheme);
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(crate::Error::config(format!(
                "{site} Endpoint must be an http:// or https:// URL: {}",
                self.endpoint
            )));
        }
        Ok(())
    }

    /// Returns true if the endpoint uses TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.endpoint.get(..8).is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"))
    }
}

/// The object being reconciled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TargetConfig {
    /// Bucket holding the object on both sites.
    pub bucket: String,
    /// Object key.
    pub object: String,
    /// Number of versions to retain.
    pub versions: usize,
}

impl TargetConfig {
    fn validate(&self) -> crate::Result<()> {
        if self.bucket.is_empty() {
            return Err(crate::Error::config("Bucket is not provided"));
        }
        if self.object.is_empty() {
            return Err(crate::Error::config("Object is not provided"));
        }
        if has_dot_segment(&self.bucket) || has_dot_segment(&self.object) {
            return Err(crate::Error::config(format!(
                "Object {}/{} has a '.' or '..' path segment and cannot be addressed",
                self.bucket, self.object
            )));
        }
        if self.versions == 0 {
            return Err(crate::Error::config("Version count is not provided"));
        }
        Ok(())
    }
}

/// Local staging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory receiving staged version files and the manifest.
    pub scratch_dir: PathBuf,
    /// Delete staged files once their replay upload succeeded.
    pub cleanup: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self { scratch_dir: PathBuf::from("."), cleanup: false }
    }
}

/// Version enumeration configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CatalogConfig {
    /// Read the whole listing instead of stopping after `versions` entries.
    ///
    /// Sites whose listing is not ordered newest-first can otherwise hide a
    /// recent version behind the early stop.
    pub full_scan: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let site = |endpoint: &str| SiteConfig {
            endpoint: endpoint.to_string(),
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            ..Default::default()
        };
        Config {
            site1: site("http://site1:9000"),
            site2: site("https://site2:9000"),
            target: TargetConfig {
                bucket: "photos".to_string(),
                object: "cat.png".to_string(),
                versions: 3,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site1.region, "us-east-1");
        assert_eq!(config.site1.purge_mode, PurgeMode::Minio);
        assert_eq!(config.staging.scratch_dir, PathBuf::from("."));
        assert!(!config.staging.cleanup);
        assert!(!config.catalog.full_scan);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[site1]
endpoint = "https://east.example.com"
access_key = "ak1"
secret_key = "sk1"
insecure = true

[site2]
endpoint = "http://west.example.com:9000"
access_key = "ak2"
secret_key = "sk2"
purge_mode = "versions"

[target]
bucket = "backups"
object = "db/dump.sql"
versions = 5

[staging]
scratch_dir = "/var/tmp/reversion"
cleanup = true

[catalog]
full_scan = true

[logging]
level = "debug"
format = "json"
"#;
        let config = Config::parse(toml).unwrap();
        assert!(config.site1.insecure);
        assert!(config.site1.is_secure());
        assert!(!config.site2.is_secure());
        assert_eq!(config.site2.purge_mode, PurgeMode::Versions);
        assert_eq!(config.target.versions, 5);
        assert_eq!(config.staging.scratch_dir, PathBuf::from("/var/tmp/reversion"));
        assert!(config.catalog.full_scan);
        assert_eq!(config.logging.format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.target.versions, 0);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reversion.toml");
        std::fs::write(&path, "[target]\nbucket = \"b\"\nobject = \"o\"\nversions = 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.target.bucket, "b");
        assert_eq!(config.target.versions, 2);
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn test_validate_reports_first_missing_parameter() {
        let mut config = valid_config();
        config.site2.secret_key.clear();
        config.target.bucket.clear();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "configuration error: Site2 Secret key is not provided");

        let err = Config::default().validate().unwrap_err();
        assert_eq!(err.to_string(), "configuration error: Site1 Endpoint is not provided");
    }

    #[test]
    fn test_validate_rejects_zero_versions() {
        let mut config = valid_config();
        config.target.versions = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Version count is not provided"));
    }

    #[test]
    fn test_validate_rejects_endpoint_without_scheme() {
        let mut config = valid_config();
        config.site1.endpoint = "site1:9000".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Site1 Endpoint must be an http:// or https:// URL"));
    }

    #[test]
    fn test_validate_rejects_dot_segments_in_object() {
        let mut config = valid_config();
        config.target.object = "logs/../cat.png".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'.' or '..' path segment"));

        config.target.object = "logs/./cat.png".to_string();
        assert!(config.validate().is_err());

        config.target.object = "logs/..cat.png".to_string();
        config.validate().unwrap();
    }
}
