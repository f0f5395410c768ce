//! Standards document model.
//!
//! # Responsibility
//! - Describe the metadata of one curriculum standards document.
//! - Validate caller-supplied metadata before persistence.
//!
//! # Invariants
//! - `name` is unique across the store (enforced by the repository).
//! - `date_retired` is not earlier than `date_valid` when both are set.
//! - `tree_version` only changes through structural tree mutations.

use crate::error::{StoreError, StoreResult};
use crate::ids::DocumentId;
use crate::model::refs::{
    check_iso_date, check_language, check_max_chars, check_not_blank, check_optional_max_chars,
    ExtraFields, JurisdictionRef, TermRef,
};
use serde::{Deserialize, Serialize};

/// How the document content was digitized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitizationMethod {
    /// Manual data entry.
    ManualEntry,
    /// Manual data entry based on OCR.
    ManualScan,
    /// Semi-automated structure extraction through OCR.
    AutomatedScan,
    /// Scraped from a website.
    WebsiteScrape,
    HackathonImport,
    /// Achievement Standards Network import.
    AsnImport,
    /// CASE registry import.
    CaseImport,
}

impl DigitizationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManualEntry => "manual_entry",
            Self::ManualScan => "manual_scan",
            Self::AutomatedScan => "automated_scan",
            Self::WebsiteScrape => "website_scrape",
            Self::HackathonImport => "hackathon_import",
            Self::AsnImport => "asn_import",
            Self::CaseImport => "case_import",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "manual_entry" => Some(Self::ManualEntry),
            "manual_scan" => Some(Self::ManualScan),
            "automated_scan" => Some(Self::AutomatedScan),
            "website_scrape" => Some(Self::WebsiteScrape),
            "hackathon_import" => Some(Self::HackathonImport),
            "asn_import" => Some(Self::AsnImport),
            "case_import" => Some(Self::CaseImport),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationStatus {
    #[default]
    Draft,
    /// Published and active.
    Published,
    /// Retired, deprecated, or superseded.
    Retired,
}

impl PublicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Retired => "retired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "retired" => Some(Self::Retired),
            _ => None,
        }
    }
}

/// Caller-owned document fields. Replaced as a whole on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Short unique handle, e.g. `CCSSM`.
    pub name: String,
    pub jurisdiction: JurisdictionRef,
    /// Official title.
    pub title: String,
    pub description: Option<String>,
    /// BCP47 code like `en`, `es`, `fr-CA`.
    pub language: Option<String>,
    pub publisher: Option<String>,
    /// Document version or edition.
    pub version: Option<String>,
    pub license: Option<TermRef>,
    pub license_description: Option<String>,
    pub copyright_holder: Option<String>,
    pub subjects: Vec<TermRef>,
    pub education_levels: Vec<TermRef>,
    /// `YYYY-MM-DD`.
    pub date_valid: Option<String>,
    /// `YYYY-MM-DD`.
    pub date_retired: Option<String>,
    pub digitization_method: DigitizationMethod,
    pub publication_status: PublicationStatus,
    /// Where the data was imported from.
    pub source_doc: Option<String>,
    pub canonical_uri: Option<String>,
    pub source_uri: Option<String>,
    pub source_id: Option<String>,
    pub notes: Option<String>,
    pub extra_fields: ExtraFields,
}

impl DocumentMetadata {
    /// Minimal metadata; every optional field starts empty.
    pub fn new(
        name: impl Into<String>,
        jurisdiction: JurisdictionRef,
        title: impl Into<String>,
        digitization_method: DigitizationMethod,
    ) -> Self {
        Self {
            name: name.into(),
            jurisdiction,
            title: title.into(),
            description: None,
            language: None,
            publisher: None,
            version: None,
            license: None,
            license_description: None,
            copyright_holder: None,
            subjects: Vec::new(),
            education_levels: Vec::new(),
            date_valid: None,
            date_retired: None,
            digitization_method,
            publication_status: PublicationStatus::Draft,
            source_doc: None,
            canonical_uri: None,
            source_uri: None,
            source_id: None,
            notes: None,
            extra_fields: ExtraFields::new(),
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        check_not_blank("name", &self.name)?;
        check_max_chars("name", &self.name, 200)?;
        check_not_blank("title", &self.title)?;
        check_max_chars("title", &self.title, 200)?;
        check_language(self.language.as_deref())?;
        check_optional_max_chars("publisher", self.publisher.as_deref(), 200)?;
        check_optional_max_chars("version", self.version.as_deref(), 50)?;
        check_optional_max_chars("copyright_holder", self.copyright_holder.as_deref(), 200)?;
        check_optional_max_chars("source_doc", self.source_doc.as_deref(), 512)?;
        check_optional_max_chars("canonical_uri", self.canonical_uri.as_deref(), 512)?;
        check_optional_max_chars("source_uri", self.source_uri.as_deref(), 512)?;
        check_optional_max_chars("source_id", self.source_id.as_deref(), 100)?;
        check_iso_date("date_valid", self.date_valid.as_deref())?;
        check_iso_date("date_retired", self.date_retired.as_deref())?;
        if let (Some(valid), Some(retired)) = (&self.date_valid, &self.date_retired) {
            // ISO dates order lexicographically.
            if retired < valid {
                return Err(StoreError::validation(format!(
                    "date_retired {retired} is earlier than date_valid {valid}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub metadata: DocumentMetadata,
    /// Bumped by every structural mutation of the document's tree.
    pub tree_version: i64,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::{DigitizationMethod, DocumentMetadata, PublicationStatus};
    use crate::model::refs::JurisdictionRef;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata::new(
            "CCSSM",
            JurisdictionRef::new("US").unwrap(),
            "Common Core State Standards for Mathematics",
            DigitizationMethod::ManualEntry,
        )
    }

    #[test]
    fn minimal_metadata_is_valid_draft() {
        let metadata = metadata();
        metadata.validate().unwrap();
        assert_eq!(metadata.publication_status, PublicationStatus::Draft);
    }

    #[test]
    fn retired_before_valid_is_rejected() {
        let mut metadata = metadata();
        metadata.date_valid = Some("2012-01-01".to_string());
        metadata.date_retired = Some("2011-12-31".to_string());
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut metadata = metadata();
        metadata.title = "   ".to_string();
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn enum_db_names_round_trip() {
        for method in [
            DigitizationMethod::ManualEntry,
            DigitizationMethod::AsnImport,
            DigitizationMethod::CaseImport,
        ] {
            assert_eq!(DigitizationMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(PublicationStatus::parse("retired"), Some(PublicationStatus::Retired));
        assert_eq!(PublicationStatus::parse("archived"), None);
    }
}
