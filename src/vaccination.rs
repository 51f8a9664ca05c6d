use std::fmt;

use serde::{Deserialize, Serialize};

use crate::valuesets::{self, ValueSets};

/// A vaccination entry.
///
/// It provides all the necessary detail regarding a vaccination record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vaccination {
    /// Disease or agent targeted
    #[serde(rename = "tg")]
    pub targeted_disease: String,
    /// Vaccine or prophylaxis
    #[serde(rename = "vp")]
    pub vaccine_prophylaxis: String,
    /// Vaccine medicinal product
    #[serde(rename = "mp")]
    pub medicinal_product: String,
    /// Marketing Authorization Holder - if no MAH present, then manufacturer
    #[serde(rename = "ma")]
    pub manufacturer: String,
    /// Dose Number
    #[serde(rename = "dn")]
    pub dose_number: usize,
    /// Total Series of Doses
    #[serde(rename = "sd")]
    pub total_doses: usize,
    /// ISO8601 complete date: Date of Vaccination
    #[serde(rename = "dt")]
    pub date: String,
    /// Country of Vaccination
    #[serde(rename = "co")]
    pub country: String,
    /// Certificate Issuer
    #[serde(rename = "is")]
    pub issuer: String,
    /// Unique Certificate Identifier: UVCI
    #[serde(rename = "ci")]
    pub id: String,
}

impl Vaccination {
    /// Rewrites the coded fields with their descriptive counterparts from
    /// the given value sets.
    pub fn expand_values(&mut self, sets: &ValueSets) {
        sets.expand(valuesets::DISEASE_AGENT_TARGETED, &mut self.targeted_disease);
        sets.expand(valuesets::VACCINE_PROPHYLAXIS, &mut self.vaccine_prophylaxis);
        sets.expand(valuesets::VACCINE_MEDICINAL_PRODUCT, &mut self.medicinal_product);
        sets.expand(valuesets::VACCINE_MANUFACTURER, &mut self.manufacturer);
        sets.expand(valuesets::COUNTRY_CODES, &mut self.country);
    }
}

impl fmt::Display for Vaccination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VACCINATION: {} dose {}/{} ({}) on {}. Issued by {}",
            self.targeted_disease,
            self.dose_number,
            self.total_doses,
            self.medicinal_product,
            self.date,
            self.issuer
        )
    }
}
