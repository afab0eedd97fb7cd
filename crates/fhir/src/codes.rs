//! Code mapping table for supported measurement kinds.
//!
//! Each supported kind maps to exactly one row holding its LOINC coding, its UCUM unit and the
//! shape of its effective time. The rows are part of the wire contract with the remote
//! repository and must not change without coordinating with consumers of the stored records.
//!
//! The table is `static` data: lookups are pure, need no initialisation and are safe to run
//! concurrently from any thread.

use crate::FhirError;
use std::fmt;
use std::str::FromStr;

/// Coding system for LOINC observation codes.
pub const LOINC_SYSTEM: &str = "http://loinc.org";

/// Coding system for UCUM units of measure.
pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// Supported measurement kinds.
///
/// This enum is deliberately closed: every variant has a row in the mapping table, so
/// [`MeasurementKind::mapping`] is total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    /// Body weight in kilograms, measured at a single instant.
    Weight,
    /// Step count over an interval.
    Steps,
    /// Energy burned over an interval, in kilocalories.
    CaloriesBurned,
}

/// Shape of an observation's effective time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeShape {
    /// A single point in time (`effectiveInstant`).
    Instant,
    /// A start/end interval (`effectivePeriod`).
    Period,
}

/// One row of the code mapping table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeMappingEntry {
    pub coding_system: &'static str,
    pub code: &'static str,
    pub display: &'static str,
    pub unit_system: &'static str,
    pub unit_code: &'static str,
    pub time_shape: TimeShape,
}

static WEIGHT: CodeMappingEntry = CodeMappingEntry {
    coding_system: LOINC_SYSTEM,
    code: "29463-7",
    display: "Body Weight",
    unit_system: UCUM_SYSTEM,
    unit_code: "kg",
    time_shape: TimeShape::Instant,
};

static STEPS: CodeMappingEntry = CodeMappingEntry {
    coding_system: LOINC_SYSTEM,
    code: "66334-4",
    display: "Steps taken",
    unit_system: UCUM_SYSTEM,
    unit_code: "steps",
    time_shape: TimeShape::Period,
};

static CALORIES_BURNED: CodeMappingEntry = CodeMappingEntry {
    coding_system: LOINC_SYSTEM,
    code: "41981-2",
    display: "Calories burned",
    unit_system: UCUM_SYSTEM,
    unit_code: "kcal",
    time_shape: TimeShape::Period,
};

impl MeasurementKind {
    /// All supported kinds, in table order.
    pub const ALL: [MeasurementKind; 3] = [
        MeasurementKind::Weight,
        MeasurementKind::Steps,
        MeasurementKind::CaloriesBurned,
    ];

    /// Look up the mapping row for this kind.
    pub fn mapping(self) -> &'static CodeMappingEntry {
        match self {
            MeasurementKind::Weight => &WEIGHT,
            MeasurementKind::Steps => &STEPS,
            MeasurementKind::CaloriesBurned => &CALORIES_BURNED,
        }
    }

    /// Human-readable label, as used by the health data source.
    pub fn label(self) -> &'static str {
        match self {
            MeasurementKind::Weight => "Weight",
            MeasurementKind::Steps => "Steps",
            MeasurementKind::CaloriesBurned => "Calories burned",
        }
    }

    /// Parse a caller-supplied label.
    ///
    /// Matching ignores case and treats spaces, `-` and `_` as equivalent, so `"Calories burned"`,
    /// `"calories-burned"` and `"CALORIES_BURNED"` all resolve to [`MeasurementKind::CaloriesBurned`].
    pub fn from_label(label: &str) -> Option<Self> {
        let normalised: String = label
            .trim()
            .chars()
            .map(|c| match c {
                '-' | '_' => ' ',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        match normalised.as_str() {
            "weight" | "body weight" => Some(MeasurementKind::Weight),
            "steps" => Some(MeasurementKind::Steps),
            "calories burned" | "caloriesburned" => Some(MeasurementKind::CaloriesBurned),
            _ => None,
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MeasurementKind {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementKind::from_label(s)
            .ok_or_else(|| FhirError::UnmappedMeasurementKind(s.trim().to_string()))
    }
}
