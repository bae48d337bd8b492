//! Media reference resolution.
//!
//! Rows name media files loosely; any archive entry under `media/` whose base
//! name contains the referenced name is uploaded and recorded on the row.

use aml_common::MediaFile;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::archive::ArchiveEntry;
use super::validation::{RowFailure, RowIssue};
use crate::error::Result;
use crate::models::{EntryKind, ErrorStatus, Failure, StagedRow};
use crate::storage::{object_key, BlobTransport, ObjectStore};

/// Outcome of resolving the media of a batch of rows.
#[derive(Debug, Default)]
pub struct MediaResolution {
    /// Rows that referenced at least one name with no matching entry.
    pub failures: Vec<RowFailure>,
    pub uploaded: usize,
}

impl MediaResolution {
    pub fn failure(&self) -> Option<Failure> {
        let first = self.failures.first()?;
        let issue = first.issues.first()?;
        Some(Failure::new(
            issue.status,
            format!("Row {}: {}", first.row_index, issue.message),
        ))
    }
}

pub struct MediaResolver<'a> {
    store: &'a dyn ObjectStore,
    transport: &'a dyn BlobTransport,
    media: &'a [ArchiveEntry],
    prefix: &'a str,
    ttl: Duration,
    uploaded: HashMap<String, MediaFile>,
}

impl<'a> MediaResolver<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        transport: &'a dyn BlobTransport,
        media: &'a [ArchiveEntry],
        prefix: &'a str,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            media,
            prefix,
            ttl,
            uploaded: HashMap::new(),
        }
    }

    fn matches(&self, name: &str) -> Vec<&'a ArchiveEntry> {
        let name = name.trim();
        if name.is_empty() {
            return Vec::new();
        }
        let media: &'a [ArchiveEntry] = self.media;
        media
            .iter()
            .filter(|entry| !entry.is_dir() && entry.base_name().contains(name))
            .collect()
    }

    async fn upload(&mut self, category: &str, entry: &ArchiveEntry) -> Result<MediaFile> {
        let key = object_key(&format!("{}/{}", self.prefix, category), entry.base_name());
        if let Some(existing) = self.uploaded.get(&key) {
            return Ok(existing.clone());
        }

        let content_type = mime_guess::from_path(entry.base_name()).first_or_octet_stream();
        let url = self.store.signed_upload_url(&key, self.ttl).await?;
        self.transport
            .put(&url, entry.data().to_vec(), content_type.essence_str())
            .await?;
        debug!(key = %key, bytes = entry.data().len(), "Uploaded media file");

        let media = MediaFile::new(key.clone(), entry.base_name());
        self.uploaded.insert(key, media.clone());
        Ok(media)
    }

    /// Upload every media file referenced by one row, in reference order.
    ///
    /// Returns the descriptors and the names that matched nothing.
    pub async fn resolve(&mut self, kind: EntryKind, names: &[String]) -> Result<(Vec<MediaFile>, Vec<String>)> {
        let mut files = Vec::new();
        let mut missing = Vec::new();

        for name in names {
            let matches = self.matches(name);
            if matches.is_empty() {
                missing.push(name.clone());
                continue;
            }
            for entry in matches {
                let file = self.upload(kind.media_category(), entry).await?;
                if !files.contains(&file) {
                    files.push(file);
                }
            }
        }

        Ok((files, missing))
    }

    /// Resolve media for every row, filling `media_files` in place.
    pub async fn resolve_rows(&mut self, kind: EntryKind, rows: &mut [StagedRow]) -> Result<MediaResolution> {
        let mut resolution = MediaResolution::default();

        for row in rows.iter_mut() {
            if row.media_names.is_empty() {
                continue;
            }

            let (files, missing) = self.resolve(kind, &row.media_names).await?;
            resolution.uploaded += files.len();
            row.media_files = files;

            if !missing.is_empty() {
                warn!(
                    process_id = %row.process_id,
                    row_index = row.row_index,
                    missing = ?missing,
                    "Referenced media not found in archive"
                );
                resolution.failures.push(RowFailure {
                    row_id: row.id,
                    row_index: row.row_index,
                    issues: vec![RowIssue {
                        status: ErrorStatus::MediaFileMissing,
                        message: format!(
                            "Media file not found for {}: {}",
                            row.key,
                            missing.join(", ")
                        ),
                    }],
                });
            }
        }

        info!(
            kind = %kind,
            uploaded = resolution.uploaded,
            missing_rows = resolution.failures.len(),
            "Resolved media references"
        );
        Ok(resolution)
    }
}
