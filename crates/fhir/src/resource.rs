//! Resource types and server-assigned identifiers.

use crate::FhirResult;
use hb_types::NonEmptyText;
use std::fmt;

/// Resource types this crate can submit or search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Patient,
    Observation,
}

impl ResourceType {
    /// The FHIR `resourceType` value, also the REST path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Observation => "Observation",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier assigned by the remote repository when a resource is created.
///
/// Always non-empty. The optional version is whatever the server reported for the created
/// version (`meta.versionId` or the `_history` segment of the location header).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerId {
    id: NonEmptyText,
    version_id: Option<NonEmptyText>,
}

impl ServerId {
    /// Create a server id from its logical id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError::InvalidInput`] if `id` is blank.
    pub fn new(id: impl AsRef<str>) -> FhirResult<Self> {
        Ok(Self {
            id: NonEmptyText::new(id)?,
            version_id: None,
        })
    }

    /// Attach the version the server reported. Blank versions are ignored.
    pub fn with_version(mut self, version_id: impl AsRef<str>) -> Self {
        self.version_id = NonEmptyText::optional(version_id);
        self
    }

    pub fn as_str(&self) -> &str {
        self.id.as_str()
    }

    pub fn version_id(&self) -> Option<&str> {
        self.version_id.as_ref().map(NonEmptyText::as_str)
    }

    /// Relative literal reference, e.g. `Patient/123`.
    pub fn reference(&self, resource_type: ResourceType) -> String {
        format!("{}/{}", resource_type.as_str(), self.id)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_relative_reference() {
        let id = ServerId::new("123").expect("valid id");
        assert_eq!(id.reference(ResourceType::Patient), "Patient/123");
        assert_eq!(id.to_string(), "123");
    }

    #[test]
    fn rejects_blank_id() {
        assert!(ServerId::new(" ").is_err());
    }

    #[test]
    fn blank_version_is_dropped() {
        let id = ServerId::new("9").expect("valid").with_version("");
        assert_eq!(id.version_id(), None);

        let id = ServerId::new("9").expect("valid").with_version("2");
        assert_eq!(id.version_id(), Some("2"));
    }
}
