//! # HealthBridge Core
//!
//! Submission core for the HealthBridge gateway:
//! - runtime configuration resolved once at startup ([`GatewayConfig`])
//! - the HTTP transport seam and its `reqwest` implementation ([`transport`])
//! - the remote repository client: create and search ([`FhirClient`])
//! - the submission orchestrator exposing the caller-facing operations ([`SubmissionService`])
//!
//! Mapping from domain inputs to FHIR resources lives in the `fhir` crate. Nothing here prints;
//! reporting is left to the caller.

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod submission;
pub mod transport;

pub use client::FhirClient;
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, SubmissionError, SubmissionFailure};
pub use submission::SubmissionService;
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};

pub use fhir::{MeasurementKind, PatientRecord, RequestedKind, ServerId};
