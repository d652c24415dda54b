// Copyright 2024 The Rucket Authors
// SPDX-License-Identifier: Apache-2.0

//! S3 XML response parsing.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reversion_core::{Error, Result, VersionEntry};
use serde::Deserialize;

/// A parsed `ListVersionsResult` document.
#[derive(Debug, Default)]
pub struct ListVersionsResult {
    /// `Version` and `DeleteMarker` entries, in document order.
    pub entries: Vec<Result<VersionEntry>>,
    /// Whether more pages follow.
    pub is_truncated: bool,
    /// Key marker for the next page.
    pub next_key_marker: Option<String>,
    /// Version ID marker for the next page.
    pub next_version_id_marker: Option<String>,
}

/// An S3 `Error` document.
#[derive(Debug, Deserialize)]
#[serde(rename = "Error")]
pub struct ErrorDocument {
    /// Error code.
    #[serde(rename = "Code")]
    pub code: String,
    /// Error message.
    #[serde(rename = "Message", default)]
    pub message: String,
    /// Resource the error refers to.
    #[serde(rename = "Resource", default)]
    pub resource: Option<String>,
}

/// Parses an S3 error document.
///
/// # Errors
///
/// Returns an error if the body is not an S3 error document.
pub fn parse_error(body: &str) -> Result<ErrorDocument> {
    quick_xml::de::from_str(body).map_err(|e| Error::InvalidResponse(e.to_string()))
}

#[derive(Debug, Default)]
struct PartialEntry {
    is_delete_marker: bool,
    key: Option<String>,
    version_id: Option<String>,
    is_latest: Option<String>,
    last_modified: Option<String>,
    etag: Option<String>,
    size: Option<String>,
}

impl PartialEntry {
    fn finish(self) -> Result<VersionEntry> {
        let key = self.key.ok_or_else(|| Error::InvalidEntry("missing Key".to_string()))?;
        let version_id = self
            .version_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidEntry(format!("missing VersionId for {key}")))?;
        let last_modified = self
            .last_modified
            .as_deref()
            .ok_or_else(|| Error::InvalidEntry(format!("missing LastModified for {key}")))
            .and_then(|raw| parse_timestamp(raw).map_err(Error::InvalidEntry))?;
        let size = match self.size.as_deref() {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| Error::InvalidEntry(format!("invalid Size {raw:?} for {key}")))?,
            None => 0,
        };

        Ok(VersionEntry {
            key,
            version_id,
            last_modified,
            etag: self.etag.unwrap_or_default(),
            size,
            is_latest: self.is_latest.as_deref() == Some("true"),
            is_delete_marker: self.is_delete_marker,
        })
    }

    fn set(&mut self, field: &str, text: String) {
        match field {
            "Key" => self.key = Some(text),
            "VersionId" => self.version_id = Some(text),
            "IsLatest" => self.is_latest = Some(text),
            "LastModified" => self.last_modified = Some(text),
            "ETag" => self.etag = Some(text),
            "Size" => self.size = Some(text),
            _ => {}
        }
    }
}

/// Parses an S3 timestamp such as `2024-01-01T00:00:00.000Z`.
fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid LastModified {raw:?}: {e}"))
}

/// Parses a `ListVersionsResult` document.
///
/// Entries are returned in document order with delete markers interleaved,
/// the way the site listed them. A malformed entry is returned as an error in
/// its slot; a malformed document fails as a whole.
///
/// # Errors
///
/// Returns an error if the document is not well-formed XML.
pub fn parse_list_versions(body: &str) -> Result<ListVersionsResult> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut result = ListVersionsResult::default();
    let mut path: Vec<String> = Vec::new();
    let mut entry: Option<PartialEntry> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if path.len() == 1 && (name == "Version" || name == "DeleteMarker") {
                    entry = Some(PartialEntry {
                        is_delete_marker: name == "DeleteMarker",
                        ..Default::default()
                    });
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                let closed = path.pop();
                if path.len() == 1 && matches!(closed.as_deref(), Some("Version" | "DeleteMarker"))
                {
                    if let Some(partial) = entry.take() {
                        result.entries.push(partial.finish());
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::InvalidResponse(err.to_string()))?
                    .into_owned();
                match (path.len(), path.last().map(String::as_str)) {
                    (2, Some("IsTruncated")) => result.is_truncated = text == "true",
                    (2, Some("NextKeyMarker")) => result.next_key_marker = Some(text),
                    (2, Some("NextVersionIdMarker")) => {
                        result.next_version_id_marker = Some(text);
                    }
                    (3, Some(field)) => {
                        if let Some(partial) = entry.as_mut() {
                            partial.set(field, text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::InvalidResponse(format!(
                    "malformed ListVersionsResult at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(result)
}
