use crate::transport::TransportError;
use fhir::{FhirError, ResourceType};

/// Why a request to the repository did not produce a usable result.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionFailure {
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
    #[error(
        "server rejected request with HTTP {status}: {}",
        .diagnostics.as_deref().unwrap_or("no diagnostics")
    )]
    Rejected {
        status: u16,
        diagnostics: Option<String>,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A create or search request that failed, tagged with the resource type attempted.
#[derive(Debug, thiserror::Error)]
#[error("{resource_type} request failed: {failure}")]
pub struct SubmissionError {
    pub resource_type: ResourceType,
    #[source]
    pub failure: SubmissionFailure,
}

impl SubmissionError {
    pub(crate) fn transport(resource_type: ResourceType, err: TransportError) -> Self {
        Self {
            resource_type,
            failure: SubmissionFailure::Transport(err),
        }
    }

    pub(crate) fn rejected(
        resource_type: ResourceType,
        status: u16,
        diagnostics: Option<String>,
    ) -> Self {
        Self {
            resource_type,
            failure: SubmissionFailure::Rejected {
                status,
                diagnostics,
            },
        }
    }

    pub(crate) fn malformed(resource_type: ResourceType, detail: impl Into<String>) -> Self {
        Self {
            resource_type,
            failure: SubmissionFailure::MalformedResponse(detail.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("patient has no server-assigned id; register the patient first")]
    MissingSubjectReference,
    #[error("unmapped measurement kind: {0}")]
    UnmappedMeasurementKind(String),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("mapping error")]
    Fhir(#[source] FhirError),
}

impl From<FhirError> for GatewayError {
    fn from(err: FhirError) -> Self {
        match err {
            FhirError::MissingSubjectReference => GatewayError::MissingSubjectReference,
            FhirError::UnmappedMeasurementKind(label) => {
                GatewayError::UnmappedMeasurementKind(label)
            }
            other => GatewayError::Fhir(other),
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
