use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column names recognized in the import file header
pub mod columns {
    pub const NAME: &str = "Perfume";
    pub const BRAND: &str = "Brand";
    pub const URL: &str = "url";
    pub const COUNTRY: &str = "Country";
    pub const GENDER: &str = "Gender";
    pub const RATING_VALUE: &str = "Rating Value";
    pub const RATING_COUNT: &str = "Rating Count";
    pub const YEAR: &str = "Year";
    pub const TOP: &str = "Top";
    pub const MIDDLE: &str = "Middle";
    pub const BASE: &str = "Base";
    pub const PERFUMER1: &str = "Perfumer1";
    pub const PERFUMER2: &str = "Perfumer2";
    pub const MAIN_ACCORDS: [&str; 5] = [
        "mainaccord1",
        "mainaccord2",
        "mainaccord3",
        "mainaccord4",
        "mainaccord5",
    ];
}

/// Errors raised while normalizing one source row into an [`ImportRecord`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Row is missing its natural key (name: '{name}', brand: '{brand}')")]
    MalformedRow { name: String, brand: String },

    #[error("Invalid numeric value for '{field}': '{value}'")]
    InvalidNumber { field: String, value: String },
}

/// (name, brand) pair identifying a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub name: String,
    pub brand: String,
}

impl NaturalKey {
    pub fn new(name: impl Into<String>, brand: impl Into<String>) -> Self {
        Self { name: name.into(), brand: brand.into() }
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.brand)
    }
}

/// Descriptive attributes shared by import rows and persisted entries.
///
/// `None` means the column was absent from the file; `Some("")` means the
/// column was present but the cell was blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfumeAttributes {
    pub country: Option<String>,
    pub gender: Option<String>,
    pub rating_value: Option<f64>,
    pub rating_count: Option<u32>,
    pub year: Option<String>,
    pub top_notes: Option<String>,
    pub middle_notes: Option<String>,
    pub base_notes: Option<String>,
    pub perfumer1: Option<String>,
    pub perfumer2: Option<String>,
    pub main_accords: [Option<String>; 5],
}

impl PerfumeAttributes {
    pub fn top_notes(&self) -> Vec<&str> {
        split_notes(self.top_notes.as_deref())
    }

    pub fn middle_notes(&self) -> Vec<&str> {
        split_notes(self.middle_notes.as_deref())
    }

    pub fn base_notes(&self) -> Vec<&str> {
        split_notes(self.base_notes.as_deref())
    }

    /// Ranked accords, skipping blank slots
    pub fn accords(&self) -> Vec<&str> {
        self.main_accords
            .iter()
            .filter_map(|a| a.as_deref())
            .filter(|a| !a.is_empty())
            .collect()
    }
}

fn split_notes(raw: Option<&str>) -> Vec<&str> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// One normalized row of the import file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub key: NaturalKey,
    pub url: Option<String>,
    pub attributes: PerfumeAttributes,
}

impl ImportRecord {
    /// Build a record from a header→value map. Values are trimmed here
    /// regardless of what the reader already did.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, RecordError> {
        let text = |column: &str| fields.get(column).map(|v| v.trim().to_string());

        let name = text(columns::NAME).unwrap_or_default();
        let brand = text(columns::BRAND).unwrap_or_default();
        if name.is_empty() || brand.is_empty() {
            return Err(RecordError::MalformedRow { name, brand });
        }

        let url = text(columns::URL).filter(|u| !u.is_empty());

        let rating_value = match text(columns::RATING_VALUE).filter(|v| !v.is_empty()) {
            Some(raw) => Some(parse_decimal(&raw).ok_or_else(|| RecordError::InvalidNumber {
                field: columns::RATING_VALUE.to_string(),
                value: raw.clone(),
            })?),
            None => None,
        };

        let rating_count = match text(columns::RATING_COUNT).filter(|v| !v.is_empty()) {
            Some(raw) => Some(parse_count(&raw).ok_or_else(|| RecordError::InvalidNumber {
                field: columns::RATING_COUNT.to_string(),
                value: raw.clone(),
            })?),
            None => None,
        };

        let attributes = PerfumeAttributes {
            country: text(columns::COUNTRY),
            gender: text(columns::GENDER),
            rating_value,
            rating_count,
            year: text(columns::YEAR),
            top_notes: text(columns::TOP),
            middle_notes: text(columns::MIDDLE),
            base_notes: text(columns::BASE),
            perfumer1: text(columns::PERFUMER1),
            perfumer2: text(columns::PERFUMER2),
            main_accords: columns::MAIN_ACCORDS.map(text),
        };

        Ok(Self { key: NaturalKey { name, brand }, url, attributes })
    }
}

/// Decimal comma is accepted as decimal point ("4,36" -> 4.36)
fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Counts may carry thousands separators or a trailing ".0" from spreadsheet exports
fn parse_count(raw: &str) -> Option<u32> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ' ' | '\u{a0}')).collect();
    if let Ok(v) = cleaned.parse::<u32>() {
        return Some(v);
    }
    let as_float = parse_decimal(&cleaned)?;
    (as_float >= 0.0 && as_float.fract() == 0.0 && as_float <= f64::from(u32::MAX))
        .then(|| as_float as u32)
}

/// Persisted catalog entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Surrogate identifier assigned by the store
    pub id: String,
    pub key: NaturalKey,
    pub url: Option<String>,
    pub attributes: PerfumeAttributes,
    pub description: Option<String>,
    /// Relative path of the owned image file under the media root
    pub image: Option<String>,
    /// Where the image was downloaded from
    pub image_url: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    pub fn has_description(&self) -> bool {
        self.description.as_deref().is_some_and(|d| !d.is_empty())
    }

    pub fn has_image(&self) -> bool {
        self.image.as_deref().is_some_and(|i| !i.is_empty())
    }

    /// Complete entries are never fetched again
    pub fn is_complete(&self) -> bool {
        self.has_description() && self.has_image()
    }
}

/// Downloaded image waiting to be attached to an entry
#[derive(Clone, PartialEq, Eq)]
pub struct PendingAsset {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PendingAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAsset")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Enrichment fields changed by one row; applied in a single save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryChanges {
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub image: Option<PendingAsset>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.image_url.is_none() && self.image.is_none()
    }

    /// Names of the changed columns, for logging
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.image.is_some() {
            fields.push("image");
        }
        if self.image_url.is_some() {
            fields.push("image_url");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        fields
    }
}
