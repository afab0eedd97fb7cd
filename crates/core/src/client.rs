//! Remote repository client.
//!
//! [`FhirClient`] performs the two exchanges the gateway needs, create and search, and turns
//! raw transport responses into ids, counts or typed errors. It keeps no state between calls
//! beyond its configuration and transport; results are never cached.

use crate::config::GatewayConfig;
use crate::constants::{FAMILY_EXACT_PARAM, MAX_SEARCH_PAGES, TOTAL_ACCURATE, TOTAL_PARAM};
use crate::error::SubmissionError;
use crate::transport::{Transport, TransportResponse};
use crate::{GatewayError, GatewayResult};
use fhir::response::operation_outcome_message;
use fhir::{
    CreatedResource, FhirError, MeasurementRecord, Observation, Patient, PatientRecord,
    PatientSearchBundle, ResourceType, ServerId,
};
use hb_types::NonEmptyText;
use reqwest::Url;
use std::collections::HashSet;
use std::sync::Arc;

pub struct FhirClient<T: Transport> {
    cfg: Arc<GatewayConfig>,
    transport: T,
}

impl<T: Transport> FhirClient<T> {
    pub fn new(cfg: Arc<GatewayConfig>, transport: T) -> Self {
        Self { cfg, transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Create a patient and return the id the repository assigned.
    ///
    /// # Errors
    ///
    /// A record that already carries a server id is refused before any request is sent.
    pub fn create_patient(&self, record: &PatientRecord) -> GatewayResult<ServerId> {
        if let Some(existing) = record.server_id() {
            return Err(FhirError::AlreadySubmitted(existing.to_string()).into());
        }

        let body = Patient::render_json(record)?;
        Ok(self.create(ResourceType::Patient, body)?)
    }

    /// Create an observation and return the id the repository assigned.
    pub fn create_observation(&self, record: &MeasurementRecord) -> GatewayResult<ServerId> {
        let body = Observation::render_json(record)?;
        Ok(self.create(ResourceType::Observation, body)?)
    }

    /// POST a rendered resource and recover the assigned id.
    ///
    /// The id is taken from the echoed resource in the body when there is one, otherwise from
    /// the `Location` header. A success status with neither is reported as a malformed response;
    /// no partial id is ever returned.
    pub fn create(
        &self,
        resource_type: ResourceType,
        body: String,
    ) -> Result<ServerId, SubmissionError> {
        let url = self.resource_url(resource_type);
        tracing::debug!(%resource_type, %url, "creating resource");

        let response = self
            .transport
            .post_json(&url, body)
            .map_err(|e| SubmissionError::transport(resource_type, e))?;
        ensure_success(resource_type, &response)?;

        let created = CreatedResource::from_body(resource_type, &response.body)
            .or_else(|| {
                response
                    .location
                    .as_deref()
                    .and_then(|location| CreatedResource::from_location(resource_type, location))
            })
            .ok_or_else(|| {
                SubmissionError::malformed(
                    resource_type,
                    "response carried no resource id in its body or Location header",
                )
            })?;

        tracing::info!(
            resource_type = %created.resource_type,
            id = %created.id,
            version = created.id.version_id().unwrap_or("-"),
            "resource created"
        );
        Ok(created.id)
    }

    /// Search patients whose family name equals `family`.
    ///
    /// The server is asked for an accurate `total`. When it does not report one, every page is
    /// read through the bundle's `next` links so the count covers the whole result set.
    pub fn search_patients_by_family_name(&self, family: &str) -> GatewayResult<PatientSearchBundle> {
        let family = NonEmptyText::new(family)
            .map_err(|_| GatewayError::InvalidInput("family name is required".into()))?;
        let url = self.resource_url(ResourceType::Patient);
        tracing::debug!(%url, family = %family, "searching patients");

        let mut bundle = self.search_page(
            &url,
            &[
                (FAMILY_EXACT_PARAM, family.as_str()),
                (TOTAL_PARAM, TOTAL_ACCURATE),
            ],
        )?;

        let mut visited = HashSet::new();
        while bundle.total.is_none() {
            let Some(next) = bundle.next.take() else {
                break;
            };
            let next = resolve_link(&url, &next)?;
            if visited.len() >= MAX_SEARCH_PAGES || !visited.insert(next.clone()) {
                return Err(SubmissionError::malformed(
                    ResourceType::Patient,
                    format!("search paging did not terminate (next link {next})"),
                )
                .into());
            }

            tracing::debug!(url = %next, page = visited.len() + 1, "following search page");
            let page = self.search_page(&next, &[])?;
            bundle.append_page(page);
        }

        tracing::debug!(family = %family, count = bundle.count(), "patient search complete");
        Ok(bundle)
    }

    /// Number of patients whose family name equals `family`.
    pub fn count_patients_by_family_name(&self, family: &str) -> GatewayResult<u64> {
        Ok(self.search_patients_by_family_name(family)?.count())
    }

    fn resource_url(&self, resource_type: ResourceType) -> String {
        format!("{}/{}", self.cfg.server_base(), resource_type.as_str())
    }

    fn search_page(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<PatientSearchBundle, SubmissionError> {
        let resource_type = ResourceType::Patient;
        let response = self
            .transport
            .get(url, query)
            .map_err(|e| SubmissionError::transport(resource_type, e))?;
        ensure_success(resource_type, &response)?;

        PatientSearchBundle::parse(&response.body)
            .map_err(|e| SubmissionError::malformed(resource_type, e.to_string()))
    }
}

/// Resolve a bundle link against the search URL; servers may send relative links.
fn resolve_link(search_url: &str, link: &str) -> Result<String, SubmissionError> {
    Url::parse(search_url)
        .and_then(|base| base.join(link))
        .map(String::from)
        .map_err(|e| {
            SubmissionError::malformed(
                ResourceType::Patient,
                format!("unusable next link '{link}': {e}"),
            )
        })
}

fn ensure_success(
    resource_type: ResourceType,
    response: &TransportResponse,
) -> Result<(), SubmissionError> {
    if response.is_success() {
        return Ok(());
    }

    let diagnostics = operation_outcome_message(&response.body);
    tracing::warn!(
        %resource_type,
        status = response.status,
        diagnostics = diagnostics.as_deref().unwrap_or("-"),
        "repository rejected request"
    );
    Err(SubmissionError::rejected(
        resource_type,
        response.status,
        diagnostics,
    ))
}
