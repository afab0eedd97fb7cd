//! Interpretation of repository responses.
//!
//! Servers differ in how they acknowledge a create: some echo the stored resource, some return
//! an `OperationOutcome`, some return an empty body and rely on the `Location` header. The
//! helpers here pull the assigned id out of whichever of those is present, and decode search
//! bundles and error outcomes.

use crate::patient::{Patient, PatientRecord};
use crate::resource::{ResourceType, ServerId};
use crate::{parse_json_with_path, FhirError, FhirResult};
use serde::Deserialize;
use serde_json::Value;

/// The id (and version, when reported) of a resource the server created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedResource {
    pub resource_type: ResourceType,
    pub id: ServerId,
}

impl CreatedResource {
    /// Extract the created id from a response body that echoes the resource.
    ///
    /// Returns `None` when the body is empty, is not JSON, is a different resource type (for
    /// example an `OperationOutcome`), or carries no usable `id`.
    pub fn from_body(resource_type: ResourceType, body: &str) -> Option<Self> {
        if body.trim().is_empty() {
            return None;
        }

        let echoed: EchoedResourceWire = serde_json::from_str(body).ok()?;
        if echoed.resource_type.as_deref() != Some(resource_type.as_str()) {
            return None;
        }

        let mut id = ServerId::new(echoed.id?).ok()?;
        if let Some(version) = echoed.meta.and_then(|m| m.version_id) {
            id = id.with_version(version);
        }

        Some(Self { resource_type, id })
    }

    /// Extract the created id from a `Location`/`Content-Location` header.
    ///
    /// Accepts absolute or relative forms, with or without a `_history` suffix:
    /// `https://host/baseR4/Patient/123/_history/1`, `Patient/123`.
    pub fn from_location(resource_type: ResourceType, location: &str) -> Option<Self> {
        let path = location.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let type_pos = segments
            .iter()
            .rposition(|s| *s == resource_type.as_str())?;
        let id = segments.get(type_pos + 1)?;
        if *id == "_history" {
            return None;
        }

        let mut id = ServerId::new(id).ok()?;
        if segments.get(type_pos + 2) == Some(&"_history") {
            if let Some(version) = segments.get(type_pos + 3) {
                id = id.with_version(version);
            }
        }

        Some(Self { resource_type, id })
    }
}

/// Decode the first diagnostic message from an `OperationOutcome` body.
///
/// Falls back to the issue's `details.text` or `code` when no `diagnostics` are present.
pub fn operation_outcome_message(body: &str) -> Option<String> {
    let outcome: OperationOutcomeWire = serde_json::from_str(body).ok()?;
    if outcome.resource_type != "OperationOutcome" {
        return None;
    }

    outcome.issue.into_iter().find_map(|issue| {
        issue
            .diagnostics
            .or(issue.details.and_then(|d| d.text))
            .or(issue.code)
            .filter(|msg| !msg.trim().is_empty())
    })
}

/// Result of a patient search, possibly accumulated over several pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientSearchBundle {
    /// Total number of matches reported by the server, when it reports one.
    pub total: Option<u64>,
    /// Patient entries seen on the pages read so far, including ones that could not be decoded.
    pub matched: u64,
    /// Matching patients that decoded cleanly.
    pub patients: Vec<PatientRecord>,
    /// `next` link of the last page read, when the server has more results.
    pub next: Option<String>,
}

impl PatientSearchBundle {
    /// Parse one page of a `searchset` bundle.
    ///
    /// Entries included only as supporting resources (`search.mode = include`) and entries that
    /// are not patients are skipped. A patient entry that does not decode is still counted
    /// towards [`matched`](Self::matched) but left out of [`patients`](Self::patients).
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the body is not a bundle.
    pub fn parse(body: &str) -> FhirResult<Self> {
        let bundle: BundleWire = parse_json_with_path(body, "Bundle")?;
        if bundle.resource_type != "Bundle" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Bundle', got '{}'",
                bundle.resource_type
            )));
        }

        let mut matched = 0;
        let mut patients = Vec::new();
        for resource in bundle
            .entry
            .into_iter()
            .filter(|e| e.search.as_ref().and_then(|s| s.mode.as_deref()) != Some("include"))
            .filter_map(|e| e.resource)
            .filter(|r| r.get("resourceType").and_then(Value::as_str) == Some("Patient"))
        {
            matched += 1;
            let id = resource
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string();
            match Patient::from_value(resource) {
                Ok(patient) => patients.push(patient),
                Err(e) => tracing::warn!(%id, error = %e, "skipping undecodable patient entry"),
            }
        }

        let next = bundle
            .link
            .into_iter()
            .find(|l| l.relation.as_deref() == Some("next"))
            .and_then(|l| l.url)
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            total: bundle.total,
            matched,
            patients,
            next,
        })
    }

    /// Fold a following page into this result.
    ///
    /// The `next` link is replaced by the page's own, so repeated calls walk the result set.
    pub fn append_page(&mut self, page: PatientSearchBundle) {
        self.total = self.total.or(page.total);
        self.matched += page.matched;
        self.patients.extend(page.patients);
        self.next = page.next;
    }

    /// Number of matches: the server's `total` when given, else the patient entries read.
    pub fn count(&self) -> u64 {
        self.total.unwrap_or(self.matched)
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct EchoedResourceWire {
    #[serde(rename = "resourceType")]
    resource_type: Option<String>,
    id: Option<String>,
    meta: Option<MetaWire>,
}

#[derive(Debug, Deserialize)]
struct MetaWire {
    #[serde(rename = "versionId")]
    version_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationOutcomeWire {
    #[serde(rename = "resourceType")]
    resource_type: String,
    #[serde(default)]
    issue: Vec<IssueWire>,
}

#[derive(Debug, Deserialize)]
struct IssueWire {
    code: Option<String>,
    diagnostics: Option<String>,
    details: Option<IssueDetailsWire>,
}

#[derive(Debug, Deserialize)]
struct IssueDetailsWire {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BundleWire {
    #[serde(rename = "resourceType")]
    resource_type: String,
    total: Option<u64>,
    #[serde(default)]
    link: Vec<BundleLinkWire>,
    #[serde(default)]
    entry: Vec<BundleEntryWire>,
}

#[derive(Debug, Deserialize)]
struct BundleLinkWire {
    relation: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BundleEntryWire {
    resource: Option<Value>,
    search: Option<BundleEntrySearchWire>,
}

#[derive(Debug, Deserialize)]
struct BundleEntrySearchWire {
    mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_echoed_resource() {
        let body = r#"{"resourceType":"Patient","id":"123","meta":{"versionId":"1"}}"#;
        let created = CreatedResource::from_body(ResourceType::Patient, body).expect("id found");
        assert_eq!(created.resource_type, ResourceType::Patient);
        assert_eq!(created.id.as_str(), "123");
        assert_eq!(created.id.version_id(), Some("1"));
    }

    #[test]
    fn body_of_other_type_is_ignored() {
        let body = r#"{"resourceType":"OperationOutcome","issue":[{"severity":"information","code":"informational"}]}"#;
        assert!(CreatedResource::from_body(ResourceType::Patient, body).is_none());
        assert!(CreatedResource::from_body(ResourceType::Patient, "").is_none());
        assert!(CreatedResource::from_body(ResourceType::Patient, "<html/>").is_none());
        assert!(CreatedResource::from_body(
            ResourceType::Observation,
            r#"{"resourceType":"Observation","id":"  "}"#
        )
        .is_none());
    }

    #[test]
    fn id_from_absolute_location() {
        let created = CreatedResource::from_location(
            ResourceType::Observation,
            "https://hapi.fhir.org/baseR4/Observation/8812/_history/3",
        )
        .expect("id found");
        assert_eq!(created.resource_type, ResourceType::Observation);
        assert_eq!(created.id.as_str(), "8812");
        assert_eq!(created.id.version_id(), Some("3"));
    }

    #[test]
    fn id_from_relative_location() {
        let created =
            CreatedResource::from_location(ResourceType::Patient, "Patient/abc").expect("id found");
        assert_eq!(created.id.as_str(), "abc");
        assert_eq!(created.id.version_id(), None);
    }

    #[test]
    fn location_for_other_type_is_ignored() {
        assert!(CreatedResource::from_location(ResourceType::Patient, "Observation/1").is_none());
        assert!(CreatedResource::from_location(ResourceType::Patient, "Patient/").is_none());
        assert!(
            CreatedResource::from_location(ResourceType::Patient, "Patient/_history/1").is_none()
        );
    }

    #[test]
    fn outcome_diagnostics_are_extracted() {
        let body = r#"{
            "resourceType": "OperationOutcome",
            "issue": [ { "severity": "error", "code": "processing", "diagnostics": "HAPI-0450: bad code" } ]
        }"#;
        assert_eq!(
            operation_outcome_message(body).as_deref(),
            Some("HAPI-0450: bad code")
        );

        let body = r#"{"resourceType":"OperationOutcome","issue":[{"code":"invalid","details":{"text":"nope"}}]}"#;
        assert_eq!(operation_outcome_message(body).as_deref(), Some("nope"));

        assert!(operation_outcome_message("not json").is_none());
    }

    #[test]
    fn search_uses_server_total() {
        let body = r#"{
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 57,
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "1", "name": [ { "family": "James" } ] }, "search": { "mode": "match" } }
            ]
        }"#;

        let bundle = PatientSearchBundle::parse(body).expect("valid bundle");
        assert_eq!(bundle.total, Some(57));
        assert_eq!(bundle.patients.len(), 1);
        assert_eq!(bundle.count(), 57);
    }

    #[test]
    fn search_without_total_counts_matching_entries() {
        let body = r#"{
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "1" }, "search": { "mode": "match" } },
                { "resource": { "resourceType": "Patient", "id": "2" } },
                { "resource": { "resourceType": "Organization", "id": "9" }, "search": { "mode": "include" } },
                { "resource": { "resourceType": "OperationOutcome" }, "search": { "mode": "outcome" } }
            ]
        }"#;

        let bundle = PatientSearchBundle::parse(body).expect("valid bundle");
        assert_eq!(bundle.total, None);
        assert_eq!(bundle.next, None);
        assert_eq!(bundle.count(), 2);
    }

    #[test]
    fn undecodable_patient_does_not_fail_the_search() {
        let body = r#"{
            "resourceType": "Bundle",
            "type": "searchset",
            "total": 2,
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "1", "gender": "female" } },
                { "resource": { "resourceType": "Patient", "id": "2", "gender": 5 } }
            ]
        }"#;

        let bundle = PatientSearchBundle::parse(body).expect("bundle still parses");
        assert_eq!(bundle.count(), 2);
        assert_eq!(bundle.matched, 2);
        assert_eq!(bundle.patients.len(), 1);

        let without_total = body.replace(r#""total": 2,"#, "");
        let bundle = PatientSearchBundle::parse(&without_total).expect("bundle still parses");
        assert_eq!(bundle.total, None);
        assert_eq!(bundle.count(), 2);
    }

    #[test]
    fn pages_accumulate_until_next_link_runs_out() {
        let first = r#"{
            "resourceType": "Bundle",
            "type": "searchset",
            "link": [
                { "relation": "self", "url": "http://fhir.test/baseR4/Patient?family:exact=James" },
                { "relation": "next", "url": "http://fhir.test/baseR4?_getpages=abc&_getpagesoffset=2" }
            ],
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "1" }, "search": { "mode": "match" } },
                { "resource": { "resourceType": "Patient", "id": "2" }, "search": { "mode": "match" } }
            ]
        }"#;
        let last = r#"{
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [ { "resource": { "resourceType": "Patient", "id": "3" } } ]
        }"#;

        let mut bundle = PatientSearchBundle::parse(first).expect("first page");
        assert_eq!(
            bundle.next.as_deref(),
            Some("http://fhir.test/baseR4?_getpages=abc&_getpagesoffset=2")
        );
        assert_eq!(bundle.count(), 2);

        bundle.append_page(PatientSearchBundle::parse(last).expect("last page"));
        assert_eq!(bundle.next, None);
        assert_eq!(bundle.count(), 3);
        assert_eq!(bundle.patients.len(), 3);
    }

    #[test]
    fn empty_search_counts_zero() {
        let body = r#"{"resourceType":"Bundle","type":"searchset","total":0}"#;
        let bundle = PatientSearchBundle::parse(body).expect("valid bundle");
        assert_eq!(bundle.count(), 0);
        assert!(bundle.patients.is_empty());
    }

    #[test]
    fn search_rejects_non_bundle() {
        let err = PatientSearchBundle::parse(r#"{"resourceType":"Patient"}"#)
            .expect_err("not a bundle");
        assert!(matches!(err, FhirError::InvalidInput(_)));
    }
}
