//! Measurement observations: mapping from domain measurements to FHIR `Observation` JSON.
//!
//! A measurement is a kind, a magnitude and a time window, taken for a patient that the
//! repository already knows. [`MeasurementRecord::build`] looks the kind up in the code mapping
//! table and derives everything else (coding, unit, effective time shape) from the row.
//!
//! Kinds outside the table produce a degenerate record: status and subject only, with no coding,
//! value or effective time. Callers that would rather refuse such records check
//! [`RequestedKind::is_mapped`] first.

use crate::codes::{CodeMappingEntry, MeasurementKind, TimeShape};
use crate::resource::{ResourceType, ServerId};
use crate::{FhirError, FhirResult, PatientRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Public domain-level types
// ============================================================================

/// A measurement kind as requested by a caller.
///
/// Labels coming from a health data source are not guaranteed to name a supported kind, so the
/// unmapped label is carried along rather than rejected at parse time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestedKind {
    Mapped(MeasurementKind),
    Unmapped(String),
}

impl RequestedKind {
    /// Resolve a label against the mapping table.
    pub fn parse(label: &str) -> Self {
        match MeasurementKind::from_label(label) {
            Some(kind) => RequestedKind::Mapped(kind),
            None => RequestedKind::Unmapped(label.trim().to_string()),
        }
    }

    pub fn mapping(&self) -> Option<&'static CodeMappingEntry> {
        match self {
            RequestedKind::Mapped(kind) => Some(kind.mapping()),
            RequestedKind::Unmapped(_) => None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, RequestedKind::Mapped(_))
    }
}

impl From<MeasurementKind> for RequestedKind {
    fn from(kind: MeasurementKind) -> Self {
        RequestedKind::Mapped(kind)
    }
}

impl FromStr for RequestedKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestedKind::parse(s))
    }
}

impl fmt::Display for RequestedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedKind::Mapped(kind) => write!(f, "{kind}"),
            RequestedKind::Unmapped(label) => write!(f, "{label} (unmapped)"),
        }
    }
}

/// Observation status. Everything this gateway produces is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationStatus {
    Final,
}

impl ObservationStatus {
    fn to_wire(self) -> &'static str {
        match self {
            ObservationStatus::Final => "final",
        }
    }
}

/// Terminology coding taken from the mapping table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coding {
    pub system: &'static str,
    pub code: &'static str,
    pub display: &'static str,
}

/// Measured magnitude with its UCUM unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub system: &'static str,
    pub code: &'static str,
}

/// Effective time of an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effective {
    Instant(DateTime<Utc>),
    Period {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Domain-level observation ready for submission.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementRecord {
    pub kind: RequestedKind,
    pub status: ObservationStatus,
    pub subject: ServerId,
    pub coding: Option<Coding>,
    pub value: Option<Quantity>,
    pub effective: Option<Effective>,
}

impl MeasurementRecord {
    /// Build an observation for a patient the repository has already created.
    ///
    /// For mapped kinds the coding and unit come from the table row, and the effective time
    /// follows the row's [`TimeShape`]: an instant at `start`, or a period from `start` to `end`.
    /// `end` is ignored for instant kinds.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - `subject` has no server-assigned id ([`FhirError::MissingSubjectReference`]),
    /// - the kind is a period kind and `end` is missing or earlier than `start`,
    /// - `value` is not a finite number.
    pub fn build(
        kind: impl Into<RequestedKind>,
        value: f64,
        subject: &PatientRecord,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> FhirResult<Self> {
        let kind = kind.into();
        let subject = subject
            .server_id()
            .cloned()
            .ok_or(FhirError::MissingSubjectReference)?;

        let Some(entry) = kind.mapping() else {
            tracing::warn!(kind = %kind, subject = %subject, "no code mapping; building uncoded observation");
            return Ok(Self {
                kind,
                status: ObservationStatus::Final,
                subject,
                coding: None,
                value: None,
                effective: None,
            });
        };

        if !value.is_finite() {
            return Err(FhirError::InvalidInput(format!(
                "{kind} value must be a finite number, got {value}"
            )));
        }

        let effective = match entry.time_shape {
            TimeShape::Instant => Effective::Instant(start),
            TimeShape::Period => {
                let end = end.ok_or_else(|| {
                    FhirError::InvalidInput(format!("{kind} requires an end time"))
                })?;
                if end < start {
                    return Err(FhirError::InvalidInput(format!(
                        "{kind} period ends ({end}) before it starts ({start})"
                    )));
                }
                Effective::Period { start, end }
            }
        };

        Ok(Self {
            kind,
            status: ObservationStatus::Final,
            subject,
            coding: Some(Coding {
                system: entry.coding_system,
                code: entry.code,
                display: entry.display,
            }),
            value: Some(Quantity {
                value,
                system: entry.unit_system,
                code: entry.unit_code,
            }),
            effective: Some(effective),
        })
    }

    /// `Patient/<id>` reference to the subject.
    pub fn subject_reference(&self) -> String {
        self.subject.reference(ResourceType::Patient)
    }
}

// ============================================================================
// Public Observation operations
// ============================================================================

/// Observation resource operations.
pub struct Observation;

impl Observation {
    /// Render an observation as pretty-printed FHIR JSON.
    pub fn render_json(record: &MeasurementRecord) -> FhirResult<String> {
        let wire = domain_to_wire(record);
        serde_json::to_string_pretty(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise observation: {e}")))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Serialize)]
struct ObservationWire {
    #[serde(rename = "resourceType")]
    resource_type: &'static str,

    status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConceptWire>,

    subject: ReferenceWire,

    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    value_quantity: Option<QuantityWire>,

    #[serde(rename = "effectiveInstant", skip_serializing_if = "Option::is_none")]
    effective_instant: Option<String>,

    #[serde(rename = "effectivePeriod", skip_serializing_if = "Option::is_none")]
    effective_period: Option<PeriodWire>,
}

#[derive(Debug, Serialize)]
struct CodeableConceptWire {
    coding: Vec<CodingWire>,
}

#[derive(Debug, Serialize)]
struct CodingWire {
    system: &'static str,
    code: &'static str,
    display: &'static str,
}

#[derive(Debug, Serialize)]
struct ReferenceWire {
    reference: String,
}

#[derive(Debug, Serialize)]
struct QuantityWire {
    value: f64,
    system: &'static str,
    code: &'static str,
}

#[derive(Debug, Serialize)]
struct PeriodWire {
    start: String,
    end: String,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn domain_to_wire(record: &MeasurementRecord) -> ObservationWire {
    let (effective_instant, effective_period) = match &record.effective {
        Some(Effective::Instant(at)) => (Some(timestamp(at)), None),
        Some(Effective::Period { start, end }) => (
            None,
            Some(PeriodWire {
                start: timestamp(start),
                end: timestamp(end),
            }),
        ),
        None => (None, None),
    };

    ObservationWire {
        resource_type: ResourceType::Observation.as_str(),
        status: record.status.to_wire(),
        code: record.coding.map(|c| CodeableConceptWire {
            coding: vec![CodingWire {
                system: c.system,
                code: c.code,
                display: c.display,
            }],
        }),
        subject: ReferenceWire {
            reference: record.subject_reference(),
        },
        value_quantity: record.value.map(|q| QuantityWire {
            value: q.value,
            system: q.system,
            code: q.code,
        }),
        effective_instant,
        effective_period,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{LOINC_SYSTEM, UCUM_SYSTEM};
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap()
    }

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap()
    }

    fn submitted_patient(id: &str) -> PatientRecord {
        PatientRecord::build("John", "Q")
            .and_then(|p| p.mark_created(ServerId::new(id)?))
            .expect("submitted patient")
    }

    fn render_value(record: &MeasurementRecord) -> Value {
        let text = Observation::render_json(record).expect("render observation");
        serde_json::from_str(&text).expect("valid JSON")
    }

    #[test]
    fn weight_maps_to_instant_observation() {
        let patient = submitted_patient("123");
        let record = MeasurementRecord::build(MeasurementKind::Weight, 82.5, &patient, t0(), None)
            .expect("weight builds");

        assert_eq!(record.status, ObservationStatus::Final);
        assert_eq!(record.subject.as_str(), "123");
        assert_eq!(
            record.coding,
            Some(Coding {
                system: LOINC_SYSTEM,
                code: "29463-7",
                display: "Body Weight",
            })
        );
        assert_eq!(
            record.value,
            Some(Quantity {
                value: 82.5,
                system: UCUM_SYSTEM,
                code: "kg",
            })
        );
        assert_eq!(record.effective, Some(Effective::Instant(t0())));
    }

    #[test]
    fn weight_ignores_end_time() {
        let patient = submitted_patient("123");
        let record =
            MeasurementRecord::build(MeasurementKind::Weight, 70.0, &patient, t0(), Some(t1()))
                .expect("weight builds");
        assert_eq!(record.effective, Some(Effective::Instant(t0())));
    }

    #[test]
    fn steps_map_to_period_observation() {
        let patient = submitted_patient("123");
        let record =
            MeasurementRecord::build(MeasurementKind::Steps, 4200.0, &patient, t0(), Some(t1()))
                .expect("steps build");

        let coding = record.coding.expect("coded");
        assert_eq!(coding.system, LOINC_SYSTEM);
        assert_eq!(coding.code, "66334-4");
        assert_eq!(coding.display, "Steps taken");
        assert_eq!(record.value.map(|q| q.code), Some("steps"));
        assert_eq!(
            record.effective,
            Some(Effective::Period {
                start: t0(),
                end: t1()
            })
        );
    }

    #[test]
    fn calories_map_to_period_observation() {
        let patient = submitted_patient("123");
        let record = MeasurementRecord::build(
            MeasurementKind::CaloriesBurned,
            350.0,
            &patient,
            t0(),
            Some(t1()),
        )
        .expect("calories build");

        let coding = record.coding.expect("coded");
        assert_eq!(coding.system, LOINC_SYSTEM);
        assert_eq!(coding.code, "41981-2");
        assert_eq!(coding.display, "Calories burned");
        assert_eq!(record.value.map(|q| q.code), Some("kcal"));
        assert!(matches!(record.effective, Some(Effective::Period { .. })));
    }

    #[test]
    fn period_kind_requires_end() {
        let patient = submitted_patient("123");
        let err = MeasurementRecord::build(MeasurementKind::Steps, 10.0, &patient, t0(), None)
            .expect_err("end required");
        assert!(matches!(err, FhirError::InvalidInput(msg) if msg.contains("end time")));
    }

    #[test]
    fn period_must_not_run_backwards() {
        let patient = submitted_patient("123");
        let err =
            MeasurementRecord::build(MeasurementKind::Steps, 10.0, &patient, t1(), Some(t0()))
                .expect_err("backwards period");
        assert!(matches!(err, FhirError::InvalidInput(_)));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let patient = submitted_patient("123");
        let err = MeasurementRecord::build(MeasurementKind::Weight, f64::NAN, &patient, t0(), None)
            .expect_err("NaN rejected");
        assert!(matches!(err, FhirError::InvalidInput(_)));
    }

    #[test]
    fn unsubmitted_patient_is_missing_subject() {
        let patient = PatientRecord::build("John", "Q").expect("valid");
        let err = MeasurementRecord::build(MeasurementKind::Weight, 82.5, &patient, t0(), None)
            .expect_err("no server id");
        assert!(matches!(err, FhirError::MissingSubjectReference));
    }

    #[test]
    fn unmapped_kind_builds_degenerate_record() {
        let patient = submitted_patient("123");
        let record = MeasurementRecord::build(
            RequestedKind::parse("Heart rate"),
            61.0,
            &patient,
            t0(),
            Some(t1()),
        )
        .expect("degenerate record still builds");

        assert_eq!(record.kind, RequestedKind::Unmapped("Heart rate".into()));
        assert_eq!(record.status, ObservationStatus::Final);
        assert_eq!(record.subject.as_str(), "123");
        assert!(record.coding.is_none());
        assert!(record.value.is_none());
        assert!(record.effective.is_none());

        assert_eq!(
            render_value(&record),
            json!({
                "resourceType": "Observation",
                "status": "final",
                "subject": { "reference": "Patient/123" }
            })
        );
    }

    #[test]
    fn renders_weight_payload() {
        let patient = submitted_patient("123");
        let record = MeasurementRecord::build(MeasurementKind::Weight, 82.5, &patient, t0(), None)
            .expect("weight builds");

        assert_eq!(
            render_value(&record),
            json!({
                "resourceType": "Observation",
                "status": "final",
                "code": {
                    "coding": [
                        { "system": "http://loinc.org", "code": "29463-7", "display": "Body Weight" }
                    ]
                },
                "subject": { "reference": "Patient/123" },
                "valueQuantity": { "value": 82.5, "system": "http://unitsofmeasure.org", "code": "kg" },
                "effectiveInstant": "2024-03-01T07:30:00Z"
            })
        );
    }

    #[test]
    fn renders_period_payload() {
        let patient = submitted_patient("abc");
        let record =
            MeasurementRecord::build(MeasurementKind::Steps, 4200.0, &patient, t0(), Some(t1()))
                .expect("steps build");

        let value = render_value(&record);
        assert_eq!(
            value["effectivePeriod"],
            json!({ "start": "2024-03-01T07:30:00Z", "end": "2024-03-01T21:00:00Z" })
        );
        assert!(value.get("effectiveInstant").is_none());
        assert_eq!(value["valueQuantity"]["value"], json!(4200.0));
        assert_eq!(value["subject"]["reference"], "Patient/abc");
    }

    #[test]
    fn requested_kind_parses_labels() {
        assert_eq!(
            "Calories burned".parse::<RequestedKind>(),
            Ok(RequestedKind::Mapped(MeasurementKind::CaloriesBurned))
        );
        assert!(!RequestedKind::parse("Blood pressure").is_mapped());
    }
}
