//! Archive structure checks.
//!
//! Runs before any CSV is parsed. The first failing check rejects the whole
//! upload with its own error code.

use tracing::debug;

use super::archive::ArchiveEntry;
use crate::error::{IngestError, Result};
use crate::models::ErrorStatus;

/// The only directory allowed inside an upload.
pub const MEDIA_FOLDER: &str = "media/";

pub const ARCHIVE_EXTENSION: &str = ".zip";

/// A structurally valid archive, split into sheets and media.
#[derive(Debug, Clone, Default)]
pub struct ArchiveLayout {
    /// Root-level CSV entries, in archive order.
    pub sheets: Vec<ArchiveEntry>,
    /// Files under `media/`.
    pub media: Vec<ArchiveEntry>,
}

pub fn is_media_entry(entry: &ArchiveEntry) -> bool {
    entry.name().starts_with(MEDIA_FOLDER)
}

/// An empty storage listing for the upload folder means nothing was uploaded.
pub fn check_listing(folder: &str, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Err(IngestError::rejected(
            ErrorStatus::IsEmpty,
            format!("No uploaded files found under {}", folder),
        ));
    }
    Ok(())
}

pub fn check_extension(file_name: &str) -> Result<()> {
    if !file_name.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
        return Err(IngestError::rejected(
            ErrorStatus::IsUnsupportedFormat,
            format!("{} is not a zip archive", file_name),
        ));
    }
    Ok(())
}

/// Validate the archive and split it into sheets and media.
pub fn validate_archive(
    entries: Vec<ArchiveEntry>,
    file_name: &str,
    expected_names: &[String],
) -> Result<ArchiveLayout> {
    if entries.is_empty() {
        return Err(IngestError::rejected(
            ErrorStatus::IsEmpty,
            format!("{} is empty or could not be read", file_name),
        ));
    }

    check_extension(file_name)?;

    let mut layout = ArchiveLayout::default();
    let mut has_media_folder = false;

    for entry in entries {
        if entry.is_dir() {
            if entry.name() != MEDIA_FOLDER {
                return Err(IngestError::rejected(
                    ErrorStatus::IsUnsupportedFolderType,
                    format!("Unsupported folder {} in {}", entry.name(), file_name),
                ));
            }
            has_media_folder = true;
            continue;
        }

        if is_media_entry(&entry) {
            has_media_folder = true;
            layout.media.push(entry);
            continue;
        }

        if !expected_names.iter().any(|name| name == entry.name()) {
            return Err(IngestError::rejected(
                ErrorStatus::IsUnsupportedFileName,
                format!("Unsupported file {} in {}", entry.name(), file_name),
            ));
        }

        layout.sheets.push(entry);
    }

    if !has_media_folder {
        return Err(IngestError::rejected(
            ErrorStatus::IsMediaFolderMissing,
            format!("{} has no {} folder", file_name, MEDIA_FOLDER.trim_end_matches('/')),
        ));
    }

    debug!(
        sheets = layout.sheets.len(),
        media = layout.media.len(),
        "Archive layout accepted"
    );
    Ok(layout)
}
