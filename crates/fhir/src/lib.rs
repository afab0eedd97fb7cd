//! FHIR R4 mapping support for HealthBridge.
//!
//! This crate turns application-local health data into FHIR resources ready for submission:
//! - the static code mapping table for supported measurement kinds ([`codes`])
//! - domain records for patients and observations, with their builders
//! - JSON wire models and translation helpers in both directions
//! - interpretation of repository responses (created resources, search bundles, outcomes)
//!
//! It performs no I/O. Transport and orchestration live in `hb-core`.

pub mod codes;
pub mod observation;
pub mod patient;
pub mod resource;
pub mod response;

// Re-export facades
pub use observation::Observation;
pub use patient::Patient;

// Re-export public domain-level types
pub use codes::{CodeMappingEntry, MeasurementKind, TimeShape};
pub use observation::{Coding, Effective, MeasurementRecord, ObservationStatus, Quantity, RequestedKind};
pub use patient::{Address, AddressUse, Gender, Identifier, NameUse, PatientRecord};
pub use resource::{ResourceType, ServerId};
pub use response::{CreatedResource, PatientSearchBundle};

pub use hb_types::NonEmptyText;

/// Errors returned by the `fhir` mapping crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("patient has no server-assigned id; submit the patient first")]
    MissingSubjectReference,

    #[error("patient already has server-assigned id {0}")]
    AlreadySubmitted(String),

    #[error("unmapped measurement kind: {0}")]
    UnmappedMeasurementKind(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<hb_types::TextError> for FhirError {
    fn from(err: hb_types::TextError) -> Self {
        FhirError::InvalidInput(err.to_string())
    }
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialise JSON, reporting the path of the failing field on mismatch.
pub(crate) fn parse_json_with_path<T>(json_text: &str, what: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut deserializer = serde_json::Deserializer::from_str(json_text);

    match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            Err(FhirError::Translation(format!(
                "{what} schema mismatch at {path}: {source}"
            )))
        }
    }
}
