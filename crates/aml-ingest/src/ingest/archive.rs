//! Archive fetching and decompression
//!
//! An archive is downloaded through a signed retrieval URL and expanded into
//! in-memory [`ArchiveEntry`] values, in archive order.

use std::io::{Cursor, Read};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestError, Result};
use crate::storage::{object_key, BlobTransport, ObjectStore};

/// One entry of an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    name: String,
    data: Option<Vec<u8>>,
}

impl ArchiveEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
        }
    }

    pub fn file(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Some(data),
        }
    }

    /// Full path inside the archive, e.g. `media/q1.png`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.data.is_none()
    }

    /// Last path segment, e.g. `q1.png` for `media/q1.png`.
    pub fn base_name(&self) -> &str {
        self.name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.name)
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Entry contents as UTF-8 text, without a leading byte-order mark.
    pub fn text(&self) -> Result<String> {
        let text = String::from_utf8(self.data().to_vec()).map_err(|e| {
            IngestError::Decode(format!("{} is not valid UTF-8: {}", self.name, e))
        })?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

/// Expand a ZIP archive held in memory.
pub fn read_zip(data: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();

        if file.is_dir() {
            entries.push(ArchiveEntry::directory(name));
            continue;
        }

        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)?;
        debug!(entry = %name, bytes = contents.len(), "Extracted archive entry");
        entries.push(ArchiveEntry::file(name, contents));
    }

    Ok(entries)
}

/// Download `folder/file_name` and expand it.
///
/// Every failure (signing, HTTP, decompression) is logged and yields an empty
/// list; callers treat an empty archive as a rejected upload.
#[instrument(skip(store, transport))]
pub async fn fetch_entries(
    store: &dyn ObjectStore,
    transport: &dyn BlobTransport,
    folder: &str,
    file_name: &str,
    ttl: Duration,
) -> Vec<ArchiveEntry> {
    match try_fetch(store, transport, folder, file_name, ttl).await {
        Ok(entries) => {
            info!(entries = entries.len(), "Fetched archive");
            entries
        },
        Err(e) => {
            warn!(error = %e, "Failed to fetch archive");
            Vec::new()
        },
    }
}

async fn try_fetch(
    store: &dyn ObjectStore,
    transport: &dyn BlobTransport,
    folder: &str,
    file_name: &str,
    ttl: Duration,
) -> Result<Vec<ArchiveEntry>> {
    let key = object_key(folder, file_name);
    let url = store.signed_retrieval_url(&key, ttl).await?;
    let data = transport.get(&url).await?;
    read_zip(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            match body {
                Some(body) => {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(body.as_bytes()).unwrap();
                },
                None => writer.add_directory(*name, options).unwrap(),
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_read_zip_keeps_order_and_directories() {
        let data = build_zip(&[
            ("questions.csv", Some("QID\nq1\n")),
            ("media/", None),
            ("media/q1.png", Some("png")),
        ]);

        let entries = read_zip(&data).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name(), "questions.csv");
        assert_eq!(entries[0].text().unwrap(), "QID\nq1\n");
        assert!(entries[1].is_dir());
        assert_eq!(entries[2].base_name(), "q1.png");
        assert_eq!(entries[2].data(), b"png");
    }

    #[test]
    fn test_read_zip_rejects_garbage() {
        assert!(matches!(read_zip(b"not a zip"), Err(IngestError::Archive(_))));
    }

    #[test]
    fn test_text_strips_byte_order_mark() {
        let entry = ArchiveEntry::file("contents.csv", "\u{feff}content_id\n".as_bytes().to_vec());
        assert_eq!(entry.text().unwrap(), "content_id\n");
    }

    #[test]
    fn test_base_name_of_directory() {
        assert_eq!(ArchiveEntry::directory("media/").base_name(), "media");
    }
}
