//! Submission orchestration.
//!
//! A patient moves through `New → PatientSubmitted → MeasurementsSubmitted*`:
//! - `New`: built locally, no server id
//! - `PatientSubmitted`: the repository accepted the create and the record carries its id
//! - measurements may then be recorded any number of times, in any order, from any thread
//!
//! The state lives in the [`PatientRecord`] itself (its server id), so a measurement recorded
//! against a `New` patient fails with [`GatewayError::MissingSubjectReference`] before any
//! request is sent.

use crate::client::FhirClient;
use crate::config::GatewayConfig;
use crate::transport::Transport;
use crate::{GatewayError, GatewayResult};
use chrono::{DateTime, Utc};
use fhir::{MeasurementRecord, PatientRecord, RequestedKind, ServerId};
use std::sync::Arc;

/// Caller-facing entry points of the gateway.
pub struct SubmissionService<T: Transport> {
    cfg: Arc<GatewayConfig>,
    client: FhirClient<T>,
}

impl<T: Transport> SubmissionService<T> {
    pub fn new(cfg: Arc<GatewayConfig>, transport: T) -> Self {
        let client = FhirClient::new(cfg.clone(), transport);
        Self { cfg, client }
    }

    pub fn client(&self) -> &FhirClient<T> {
        &self.client
    }

    /// Build a patient with an official name and create it in the repository.
    ///
    /// Returns the record with its server id attached.
    pub fn register_patient(&self, given: &str, family: &str) -> GatewayResult<PatientRecord> {
        let record = PatientRecord::build(given, family)?;
        self.submit_patient(record)
    }

    /// Build a patient with an official name and home address and create it.
    pub fn register_patient_with_address(
        &self,
        given: &str,
        family: &str,
        country: &str,
        city: &str,
        address_line: &str,
        postal_code: &str,
    ) -> GatewayResult<PatientRecord> {
        let record = PatientRecord::build_with_address(
            given,
            family,
            country,
            city,
            address_line,
            postal_code,
        )?;
        self.submit_patient(record)
    }

    /// Create an already-built patient (e.g. one carrying identifiers or gender).
    ///
    /// # Errors
    ///
    /// Fails without contacting the repository if the record already has a server id.
    pub fn submit_patient(&self, record: PatientRecord) -> GatewayResult<PatientRecord> {
        let id = self.client.create_patient(&record)?;
        Ok(record.mark_created(id)?)
    }

    /// Map a measurement for a registered patient and create it as an observation.
    ///
    /// `end` is required for period kinds (steps, calories burned) and ignored for weight.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::MissingSubjectReference`] if `patient` has not been registered
    /// - [`GatewayError::UnmappedMeasurementKind`] if strict kinds are configured and the kind
    ///   has no code mapping
    /// - [`GatewayError::Submission`] if the repository or transport fails
    pub fn record_measurement(
        &self,
        kind: impl Into<RequestedKind>,
        value: f64,
        patient: &PatientRecord,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> GatewayResult<ServerId> {
        let kind = kind.into();
        if patient.server_id().is_none() {
            return Err(GatewayError::MissingSubjectReference);
        }

        if let RequestedKind::Unmapped(label) = &kind {
            if self.cfg.strict_kinds() {
                return Err(GatewayError::UnmappedMeasurementKind(label.clone()));
            }
        }

        let record = MeasurementRecord::build(kind, value, patient, start, end)?;
        self.client.create_observation(&record)
    }

    /// Number of patients in the repository whose family name equals `family`.
    pub fn count_patients_by_family_name(&self, family: &str) -> GatewayResult<u64> {
        self.client.count_patients_by_family_name(family)
    }
}
