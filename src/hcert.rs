use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::{Recovery, Test, Vaccination, ValueSets};

/// The kind of attestation a certificate carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateType {
    /// A vaccination certificate.
    Vaccination,
    /// A test certificate.
    Test,
    /// A recovery certificate.
    Recovery,
}

impl CertificateType {
    /// The lowercase name used in rule filters and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateType::Vaccination => "vaccination",
            CertificateType::Test => "test",
            CertificateType::Recovery => "recovery",
        }
    }
}

impl fmt::Display for CertificateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contains all the info related to the subject name (forename, surname,
/// etc.).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PersonName {
    /// The forename(s) of the person addressed in the certificate
    #[serde(rename = "gn", default, skip_serializing_if = "Option::is_none")]
    pub forename: Option<String>,
    /// The surname or primary name(s) of the person addressed in the certificate
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    /// The forename(s) of the person, transliterated ICAO 9303
    #[serde(rename = "gnt", default, skip_serializing_if = "Option::is_none")]
    pub forename_standard: Option<String>,
    /// The surname(s) of the person, transliterated ICAO 9303
    #[serde(rename = "fnt", default, skip_serializing_if = "Option::is_none")]
    pub surname_standard: Option<String>,
}

impl PersonName {
    fn has_surname(&self) -> bool {
        self.surname.is_some() || self.surname_standard.is_some()
    }

    fn has_forename(&self) -> bool {
        self.forename.is_some() || self.forename_standard.is_some()
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let forename = self.forename.as_ref().or(self.forename_standard.as_ref());
        let surname = self.surname.as_ref().or(self.surname_standard.as_ref());
        match (forename, surname) {
            (Some(forename), Some(surname)) => write!(f, "{} {}", forename, surname),
            (Some(forename), None) => write!(f, "{}", forename),
            (None, Some(surname)) => write!(f, "{}", surname),
            (None, None) => Ok(()),
        }
    }
}

/// The entry group of a certificate: exactly one of the vaccination, test or
/// recovery groups, always non-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum CertificateEntries {
    /// One or more vaccination entries.
    Vaccination(Vec<Vaccination>),
    /// One or more test entries.
    Test(Vec<Test>),
    /// One or more recovery entries.
    Recovery(Vec<Recovery>),
}

impl CertificateEntries {
    /// The certificate type implied by the entry group.
    pub fn certificate_type(&self) -> CertificateType {
        match self {
            CertificateEntries::Vaccination(_) => CertificateType::Vaccination,
            CertificateEntries::Test(_) => CertificateType::Test,
            CertificateEntries::Recovery(_) => CertificateType::Recovery,
        }
    }
}

/// Why a raw certificate map could not be projected to an [`EuHealthCert`].
#[derive(Error, Debug)]
pub enum HcertProjectionError {
    /// Zero or more than one of the `v`, `t`, `r` groups is present and
    /// non-empty.
    #[error("expected exactly one of the 'v', 't' or 'r' entry groups")]
    EntryGroups,
    /// None of `fn`, `gn`, `fnt`, `gnt` identify the subject.
    #[error("certificate carries no usable person name")]
    MissingName,
}

fn empty_if_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Mirror of the wire shape: three optional groups. Only used as a serde
/// bridge; the public type keeps the exactly-one invariant.
#[derive(Serialize, Deserialize, Clone)]
struct RawHealthCert {
    #[serde(rename = "ver")]
    version: String,
    #[serde(rename = "nam")]
    name: PersonName,
    #[serde(rename = "dob")]
    date_of_birth: String,
    #[serde(
        rename = "v",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "empty_if_null"
    )]
    vaccinations: Vec<Vaccination>,
    #[serde(
        rename = "t",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "empty_if_null"
    )]
    tests: Vec<Test>,
    #[serde(
        rename = "r",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "empty_if_null"
    )]
    recoveries: Vec<Recovery>,
}

/// The main certificate.
///
/// Projection from the raw map enforces the schema: `ver`, `nam`, `dob`
/// present, at least one name component, and exactly one non-empty entry
/// group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawHealthCert", into = "RawHealthCert")]
pub struct EuHealthCert {
    /// The certificate version as per the published
    /// [schemas](https://github.com/ehn-dcc-development/ehn-dcc-schema).
    pub version: String,
    /// The name of the person addressed in the certificate.
    pub name: PersonName,
    /// Date of birth, ISO 8601 date restricted to range 1900-2099 or empty.
    pub date_of_birth: String,
    /// The single entry group.
    pub entries: CertificateEntries,
}

impl EuHealthCert {
    /// The certificate type implied by the entry group.
    pub fn certificate_type(&self) -> CertificateType {
        self.entries.certificate_type()
    }

    /// Rewrites all coded entry fields with their descriptive counterparts
    /// using the given value sets.
    ///
    /// Useful shortcut to print all the details in a more descriptive way.
    pub fn expand_values(&mut self, sets: &ValueSets) {
        match &mut self.entries {
            CertificateEntries::Vaccination(entries) => {
                entries.iter_mut().for_each(|v| v.expand_values(sets))
            }
            CertificateEntries::Test(entries) => {
                entries.iter_mut().for_each(|t| t.expand_values(sets))
            }
            CertificateEntries::Recovery(entries) => {
                entries.iter_mut().for_each(|r| r.expand_values(sets))
            }
        }
    }
}

impl fmt::Display for EuHealthCert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.name, self.date_of_birth)?;
        match &self.entries {
            CertificateEntries::Vaccination(entries) => {
                for entry in entries {
                    writeln!(f, "{}", entry)?;
                }
            }
            CertificateEntries::Test(entries) => {
                for entry in entries {
                    writeln!(f, "{}", entry)?;
                }
            }
            CertificateEntries::Recovery(entries) => {
                for entry in entries {
                    writeln!(f, "{}", entry)?;
                }
            }
        }
        Ok(())
    }
}

impl TryFrom<RawHealthCert> for EuHealthCert {
    type Error = HcertProjectionError;

    fn try_from(raw: RawHealthCert) -> Result<Self, Self::Error> {
        if !raw.name.has_surname() && !raw.name.has_forename() {
            return Err(HcertProjectionError::MissingName);
        }
        let entries = match (
            raw.vaccinations.is_empty(),
            raw.tests.is_empty(),
            raw.recoveries.is_empty(),
        ) {
            (false, true, true) => CertificateEntries::Vaccination(raw.vaccinations),
            (true, false, true) => CertificateEntries::Test(raw.tests),
            (true, true, false) => CertificateEntries::Recovery(raw.recoveries),
            _ => return Err(HcertProjectionError::EntryGroups),
        };
        Ok(EuHealthCert {
            version: raw.version,
            name: raw.name,
            date_of_birth: raw.date_of_birth,
            entries,
        })
    }
}

impl From<EuHealthCert> for RawHealthCert {
    fn from(cert: EuHealthCert) -> Self {
        let mut raw = RawHealthCert {
            version: cert.version,
            name: cert.name,
            date_of_birth: cert.date_of_birth,
            vaccinations: Vec::new(),
            tests: Vec::new(),
            recoveries: Vec::new(),
        };
        match cert.entries {
            CertificateEntries::Vaccination(entries) => raw.vaccinations = entries,
            CertificateEntries::Test(entries) => raw.tests = entries,
            CertificateEntries::Recovery(entries) => raw.recoveries = entries,
        }
        raw
    }
}
