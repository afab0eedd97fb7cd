//! FHIR-aligned patient records, builders and JSON wire models.
//!
//! Responsibilities:
//! - Define the domain-level [`PatientRecord`] carried through the submission core
//! - Build records from caller inputs (name, optional address) and populate optional fields
//! - Translate between the domain record and FHIR R4 `Patient` JSON
//!
//! Notes:
//! - The server-assigned id is write-once: a record starts without one and receives it when the
//!   repository accepts the create request
//! - Parsing is lenient about unknown keys, since repositories add narrative, meta and
//!   extensions of their own

use crate::resource::{ResourceType, ServerId};
use crate::{parse_json_with_path, FhirError, FhirResult};
use hb_types::NonEmptyText;
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Purpose of a human name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameUse {
    /// Official name.
    Official,
    /// Usual/preferred name.
    Usual,
    /// Temporary name.
    Temp,
    /// Nickname or informal name.
    Nickname,
    /// Anonymous name.
    Anonymous,
    /// Old name (no longer in use).
    Old,
    /// Maiden name.
    Maiden,
}

impl NameUse {
    fn to_wire(self) -> &'static str {
        match self {
            NameUse::Official => "official",
            NameUse::Usual => "usual",
            NameUse::Temp => "temp",
            NameUse::Nickname => "nickname",
            NameUse::Anonymous => "anonymous",
            NameUse::Old => "old",
            NameUse::Maiden => "maiden",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "official" => Some(NameUse::Official),
            "usual" => Some(NameUse::Usual),
            "temp" => Some(NameUse::Temp),
            "nickname" => Some(NameUse::Nickname),
            "anonymous" => Some(NameUse::Anonymous),
            "old" => Some(NameUse::Old),
            "maiden" => Some(NameUse::Maiden),
            _ => None,
        }
    }
}

/// Purpose of an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressUse {
    Home,
    Work,
    Temp,
    Old,
    Billing,
}

impl AddressUse {
    fn to_wire(self) -> &'static str {
        match self {
            AddressUse::Home => "home",
            AddressUse::Work => "work",
            AddressUse::Temp => "temp",
            AddressUse::Old => "old",
            AddressUse::Billing => "billing",
        }
    }

    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "home" => Some(AddressUse::Home),
            "work" => Some(AddressUse::Work),
            "temp" => Some(AddressUse::Temp),
            "old" => Some(AddressUse::Old),
            "billing" => Some(AddressUse::Billing),
            _ => None,
        }
    }
}

/// Administrative gender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn to_wire(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            "unknown" => Some(Gender::Unknown),
            _ => None,
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gender::from_wire(&s.trim().to_ascii_lowercase())
            .ok_or_else(|| FhirError::InvalidInput(format!("unknown gender '{s}'")))
    }
}

/// External, system-scoped identifier such as a medical record number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identifier {
    /// Namespace URI of the identifier, e.g. `http://example.com/fictitious-mrns`.
    pub system: Option<NonEmptyText>,
    pub value: NonEmptyText,
}

/// Structured postal address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub use_type: Option<AddressUse>,
    /// Free-text rendering of the address line.
    pub text: Option<NonEmptyText>,
    pub city: Option<NonEmptyText>,
    pub postal_code: Option<NonEmptyText>,
    pub country: Option<NonEmptyText>,
}

/// Domain-level patient record (flat structure).
///
/// The wire format supports multiple names and addresses; this record carries the primary one
/// of each, which is all the gateway produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientRecord {
    pub identifiers: Vec<Identifier>,
    pub name_use: Option<NameUse>,
    pub given: Vec<NonEmptyText>,
    pub family: Option<NonEmptyText>,
    pub address: Option<Address>,
    pub gender: Option<Gender>,
    server_id: Option<ServerId>,
}

impl PatientRecord {
    /// Build an unsubmitted patient with an official name.
    ///
    /// No identifier, address or gender is set; use the `with_*` methods to populate them.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if either name part is blank.
    pub fn build(given: &str, family: &str) -> FhirResult<Self> {
        let given = NonEmptyText::new(given)
            .map_err(|_| FhirError::InvalidInput("given name is required".into()))?;
        let family = NonEmptyText::new(family)
            .map_err(|_| FhirError::InvalidInput("family name is required".into()))?;

        Ok(Self {
            identifiers: Vec::new(),
            name_use: Some(NameUse::Official),
            given: vec![given],
            family: Some(family),
            address: None,
            gender: None,
            server_id: None,
        })
    }

    /// Build an unsubmitted patient with an official name and a home address.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if a name part or any address field is blank.
    pub fn build_with_address(
        given: &str,
        family: &str,
        country: &str,
        city: &str,
        address_line: &str,
        postal_code: &str,
    ) -> FhirResult<Self> {
        fn required(value: &str, field: &str) -> FhirResult<NonEmptyText> {
            NonEmptyText::new(value)
                .map_err(|_| FhirError::InvalidInput(format!("address {field} is required")))
        }

        let address = Address {
            use_type: Some(AddressUse::Home),
            text: Some(required(address_line, "line")?),
            city: Some(required(city, "city")?),
            postal_code: Some(required(postal_code, "postal code")?),
            country: Some(required(country, "country")?),
        };

        let mut record = Self::build(given, family)?;
        record.address = Some(address);
        Ok(record)
    }

    /// A stand-in for a patient the repository already holds, known only by its id.
    ///
    /// Enough to record measurements against without fetching the full resource.
    pub fn existing(server_id: ServerId) -> Self {
        Self {
            identifiers: Vec::new(),
            name_use: None,
            given: Vec::new(),
            family: None,
            address: None,
            gender: None,
            server_id: Some(server_id),
        }
    }

    /// Add an external identifier.
    pub fn with_identifier(mut self, system: Option<&str>, value: &str) -> FhirResult<Self> {
        let value = NonEmptyText::new(value)
            .map_err(|_| FhirError::InvalidInput("identifier value is required".into()))?;
        self.identifiers.push(Identifier {
            system: system.and_then(NonEmptyText::optional),
            value,
        });
        Ok(self)
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    /// Append an additional given name (e.g. a middle name or initial).
    pub fn with_given(mut self, given: &str) -> FhirResult<Self> {
        self.given.push(NonEmptyText::new(given)?);
        Ok(self)
    }

    /// Record the id the repository assigned on creation.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::AlreadySubmitted`] if the record already carries an id.
    pub fn mark_created(mut self, server_id: ServerId) -> FhirResult<Self> {
        if let Some(existing) = &self.server_id {
            return Err(FhirError::AlreadySubmitted(existing.to_string()));
        }
        self.server_id = Some(server_id);
        Ok(self)
    }

    pub fn server_id(&self) -> Option<&ServerId> {
        self.server_id.as_ref()
    }

    /// `Patient/<id>` reference, once the patient has been created.
    pub fn reference(&self) -> Option<String> {
        self.server_id
            .as_ref()
            .map(|id| id.reference(ResourceType::Patient))
    }

    pub fn primary_identifier(&self) -> Option<&str> {
        self.identifiers.first().map(|i| i.value.as_str())
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_ref().map(NonEmptyText::as_str)
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl Patient {
    /// Parse a FHIR `Patient` resource from JSON text.
    ///
    /// The resource `id`, when present, becomes the record's server id.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the JSON does not match the patient wire schema (the message names the failing path),
    /// - `resourceType` is not `"Patient"`.
    pub fn parse_json(json_text: &str) -> FhirResult<PatientRecord> {
        let wire: PatientWire = parse_json_with_path(json_text, "Patient")?;
        wire_to_domain(wire)
    }

    /// Convert an already-decoded JSON value (e.g. a bundle entry) to a patient record.
    pub fn from_value(value: serde_json::Value) -> FhirResult<PatientRecord> {
        let wire: PatientWire = serde_json::from_value(value)?;
        wire_to_domain(wire)
    }

    /// Render a patient record as pretty-printed FHIR JSON.
    pub fn render_json(record: &PatientRecord) -> FhirResult<String> {
        let wire = domain_to_wire(record);
        serde_json::to_string_pretty(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise patient: {e}")))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct PatientWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    gender: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    address: Vec<AddressWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct IdentifierWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct HumanNameWire {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    family: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    given: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct AddressWire {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    city: Option<String>,

    #[serde(rename = "postalCode", default, skip_serializing_if = "Option::is_none")]
    postal_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: PatientWire) -> FhirResult<PatientRecord> {
    if wire.resource_type != ResourceType::Patient.as_str() {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType 'Patient', got '{}'",
            wire.resource_type
        )));
    }

    let server_id = wire
        .id
        .as_deref()
        .and_then(NonEmptyText::optional)
        .map(|id| ServerId::new(id.as_str()))
        .transpose()?;

    // Identifiers without a value carry nothing we can use.
    let identifiers = wire
        .identifier
        .into_iter()
        .filter_map(|i| {
            let value = i.value.as_deref().and_then(NonEmptyText::optional)?;
            Some(Identifier {
                system: i.system.as_deref().and_then(NonEmptyText::optional),
                value,
            })
        })
        .collect();

    let first_name = wire.name.into_iter().next();
    let (name_use, given, family) = match first_name {
        Some(n) => (
            n.use_type.as_deref().and_then(NameUse::from_wire),
            n.given
                .iter()
                .filter_map(NonEmptyText::optional)
                .collect(),
            n.family.as_deref().and_then(NonEmptyText::optional),
        ),
        None => (None, Vec::new(), None),
    };

    let address = wire.address.into_iter().next().map(|a| Address {
        use_type: a.use_type.as_deref().and_then(AddressUse::from_wire),
        text: a.text.as_deref().and_then(NonEmptyText::optional),
        city: a.city.as_deref().and_then(NonEmptyText::optional),
        postal_code: a.postal_code.as_deref().and_then(NonEmptyText::optional),
        country: a.country.as_deref().and_then(NonEmptyText::optional),
    });

    Ok(PatientRecord {
        identifiers,
        name_use,
        given,
        family,
        address,
        gender: wire.gender.as_deref().and_then(Gender::from_wire),
        server_id,
    })
}

fn domain_to_wire(record: &PatientRecord) -> PatientWire {
    let text = |t: &Option<NonEmptyText>| t.as_ref().map(|v| v.as_str().to_string());

    let name = if record.name_use.is_some() || record.family.is_some() || !record.given.is_empty()
    {
        vec![HumanNameWire {
            use_type: record.name_use.map(|u| u.to_wire().to_string()),
            family: text(&record.family),
            given: record.given.iter().map(|g| g.as_str().to_string()).collect(),
        }]
    } else {
        vec![]
    };

    PatientWire {
        resource_type: ResourceType::Patient.as_str().to_string(),
        id: record.server_id.as_ref().map(|id| id.as_str().to_string()),
        identifier: record
            .identifiers
            .iter()
            .map(|i| IdentifierWire {
                system: text(&i.system),
                value: Some(i.value.as_str().to_string()),
            })
            .collect(),
        name,
        gender: record.gender.map(|g| g.to_wire().to_string()),
        address: record
            .address
            .iter()
            .map(|a| AddressWire {
                use_type: a.use_type.map(|u| u.to_wire().to_string()),
                text: text(&a.text),
                city: text(&a.city),
                postal_code: text(&a.postal_code),
                country: text(&a.country),
            })
            .collect(),
    }
}
