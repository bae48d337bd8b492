//! Value types shared between the ingest pipeline and the content tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Locale code to text, stored as a JSON object such as `{"en": "Addition"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub const DEFAULT_LOCALE: &'static str = "en";

    /// Text in the default locale only.
    pub fn en(value: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(Self::DEFAULT_LOCALE.to_string(), value.into());
        Self(map)
    }

    pub fn get(&self, locale: &str) -> Option<&str> {
        self.0.get(locale).map(String::as_str)
    }

    pub fn english(&self) -> Option<&str> {
        self.get(Self::DEFAULT_LOCALE)
    }

    pub fn insert(&mut self, locale: impl Into<String>, value: impl Into<String>) {
        self.0.insert(locale.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A media object uploaded to storage and referenced by a content row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaFile {
    /// Storage key of the uploaded object.
    pub src: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

impl MediaFile {
    pub fn new(src: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            file_name: file_name.into(),
        }
    }
}
