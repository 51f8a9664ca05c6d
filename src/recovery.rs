use std::fmt;

use serde::{Deserialize, Serialize};

use crate::valuesets::{self, ValueSets};

/// A recovery entry.
///
/// It provides all the necessary detail regarding the recovery from a given
/// disease.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recovery {
    /// Disease or agent targeted
    #[serde(rename = "tg")]
    pub targeted_disease: String,
    /// ISO 8601 complete date of first positive NAA test result
    #[serde(rename = "fr")]
    pub result_date: String,
    /// Country of test
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate Issuer
    #[serde(rename = "is")]
    pub issuer: String,
    /// ISO 8601 complete date: certificate valid from
    #[serde(rename = "df")]
    pub valid_from: String,
    /// ISO 8601 complete date: certificate valid until
    #[serde(rename = "du")]
    pub valid_until: String,
    /// Unique Certificate Identifier: UVCI
    #[serde(rename = "ci")]
    pub id: String,
}

impl Recovery {
    /// Rewrites the coded fields with their descriptive counterparts from
    /// the given value sets.
    pub fn expand_values(&mut self, sets: &ValueSets) {
        sets.expand(valuesets::DISEASE_AGENT_TARGETED, &mut self.targeted_disease);
        sets.expand(valuesets::COUNTRY_CODES, &mut self.country);
    }
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RECOVERY: {} positive on {}, valid {} to {}. Issued by {}",
            self.targeted_disease, self.result_date, self.valid_from, self.valid_until, self.issuer
        )
    }
}
