//! The signed value-sets bundle and the official set identifiers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Value set id for targeted diseases.
pub const DISEASE_AGENT_TARGETED: &str = "disease-agent-targeted";
/// Value set id for vaccine prophylaxis codes.
pub const VACCINE_PROPHYLAXIS: &str = "sct-vaccines-covid-19";
/// Value set id for vaccine medicinal products.
pub const VACCINE_MEDICINAL_PRODUCT: &str = "vaccines-covid-19-names";
/// Value set id for vaccine marketing authorization holders.
pub const VACCINE_MANUFACTURER: &str = "vaccines-covid-19-auth-holders";
/// Value set id for laboratory test types.
pub const TEST_TYPE: &str = "covid-19-lab-test-type";
/// Value set id for rapid test devices and manufacturers.
pub const TEST_MANUFACTURER: &str = "covid-19-lab-test-manufacturer-and-name";
/// Value set id for laboratory test results.
pub const TEST_RESULT: &str = "covid-19-lab-result";
/// Value set id for ISO 3166 country codes.
pub const COUNTRY_CODES: &str = "country-2-codes";

/// One coded value inside a value set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueSetValue {
    /// Human readable name of the coded value.
    pub display: String,
    /// BCP 47 language tag of the display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Whether the value may still appear in newly issued certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Version marker of the defining code system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// One named value set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueSet {
    /// Identifier of the set, e.g. `country-2-codes`.
    #[serde(rename = "valueSetId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The coded values, keyed by their code.
    #[serde(rename = "valueSetValues")]
    pub values: HashMap<String, ValueSetValue>,
}

/// The signed value-sets bundle: a window plus the sets keyed by name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueSets {
    /// POSIX seconds from which the bundle may be used.
    #[serde(rename = "f")]
    pub valid_from: u64,
    /// POSIX seconds up to which the bundle may be used.
    #[serde(rename = "u")]
    pub valid_until: u64,
    /// The sets, keyed by value set name.
    #[serde(rename = "s")]
    pub sets: HashMap<String, ValueSet>,
}

impl ValueSets {
    /// An empty bundle with an unbounded window. Mostly useful in tests and
    /// for embedders that do not distribute value sets.
    pub fn empty() -> Self {
        Self {
            valid_from: 0,
            valid_until: u64::MAX,
            sets: HashMap::new(),
        }
    }

    /// Flattens the bundle to `set name -> sorted codes`, the shape the
    /// business-rules engine consumes.
    pub fn flatten(&self) -> HashMap<String, Vec<String>> {
        self.sets
            .iter()
            .map(|(name, set)| {
                let mut keys: Vec<String> = set.values.keys().cloned().collect();
                keys.sort();
                (name.clone(), keys)
            })
            .collect()
    }

    /// Looks up the display name of `code` inside the set called `name`.
    pub fn display(&self, name: &str, code: &str) -> Option<&str> {
        self.sets
            .get(name)?
            .values
            .get(code)
            .map(|v| v.display.as_str())
    }

    /// Rewrites `field` to its display name when the set knows the code.
    pub(crate) fn expand(&self, name: &str, field: &mut String) {
        if let Some(display) = self.display(name, field) {
            *field = display.to_string();
        }
    }
}
