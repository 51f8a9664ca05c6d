use std::collections::HashMap;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EuHealthCert;

const ISSUER: i64 = 1;
const EXPIRATION_TIME: i64 = 4;
const ISSUED_AT: i64 = 6;
const HCERT_CONTAINER: i64 = -260;

/// The health certificate lives under key `1` of the `-260` container.
const EU_DGC_V1: i64 = 1;

/// Why a COSE payload could not be read as a CWT.
#[derive(Error, Debug)]
pub enum CwtParseError {
    /// The payload is not a CBOR map with the expected claims, or the
    /// embedded health certificate fails its schema.
    #[error("cannot deserialize the CWT payload: {0}")]
    Cbor(#[from] ciborium::de::Error<std::io::Error>),
}

/// A unix timestamp, stored as integer or float (some issuers emit floats).
///
/// The integer variant must come first: untagged deserialization tries the
/// variants in order and floats accept integer input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericDate {
    /// A unix timestamp as integer value.
    Integer(u64),
    /// A unix timestamp as float value.
    Float(f64),
}

impl NumericDate {
    /// The timestamp as whole POSIX seconds, clamped at zero.
    pub fn seconds(&self) -> u64 {
        match self {
            NumericDate::Integer(seconds) => *seconds,
            NumericDate::Float(s) => {
                if s.is_finite() && *s > 0.0 {
                    *s as u64
                } else {
                    0
                }
            }
        }
    }
}

/// The CBOR Web Token wrapping one or more health certificates.
///
/// Claims use the integer keys of RFC 8392: `1` issuer, `4` expiration,
/// `6` issued-at, `-260` the health certificate container. Unknown keys are
/// ignored; the container is the only required claim.
#[derive(Debug, Clone, PartialEq)]
pub struct Cwt {
    /// The issuer country of the data in the container.
    pub issuer: Option<String>,
    /// When the container data was issued.
    pub issued_at: Option<NumericDate>,
    /// When the container data expires.
    pub expires_at: Option<NumericDate>,
    /// The embedded certificates, keyed by container slot.
    pub certs: HashMap<i64, EuHealthCert>,
}

impl Cwt {
    /// Parses a CWT from raw payload bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CwtParseError> {
        Ok(ciborium::de::from_reader(data)?)
    }

    /// The health certificate in the standard container slot, if any.
    pub fn health_cert(&self) -> Option<&EuHealthCert> {
        self.certs.get(&EU_DGC_V1)
    }

    /// Whether the token is temporally valid at `now`.
    ///
    /// A missing expiration claim never validates. A missing issued-at
    /// claim is treated as zero; `require_issued_at` controls whether
    /// `now` must not precede it.
    pub fn is_valid_at(&self, now: u64, require_issued_at: bool) -> bool {
        let expires_at = match &self.expires_at {
            Some(expires_at) => expires_at.seconds(),
            None => return false,
        };
        if now > expires_at {
            return false;
        }
        let issued_at = self.issued_at.map(|d| d.seconds()).unwrap_or(0);
        if require_issued_at && now < issued_at {
            return false;
        }
        true
    }
}

struct CwtVisitor;

impl<'de> Visitor<'de> for CwtVisitor {
    type Value = Cwt;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a CWT claims map with integer keys")
    }

    fn visit_map<V>(self, mut map: V) -> Result<Cwt, V::Error>
    where
        V: MapAccess<'de>,
    {
        let mut issuer = None;
        let mut issued_at = None;
        let mut expires_at = None;
        let mut certs = None;

        while let Some(key) = map.next_key::<i64>()? {
            match key {
                ISSUER => {
                    if issuer.is_some() {
                        return Err(serde::de::Error::duplicate_field("issuer"));
                    }
                    issuer = Some(map.next_value()?);
                }
                EXPIRATION_TIME => {
                    if expires_at.is_some() {
                        return Err(serde::de::Error::duplicate_field("expiration time"));
                    }
                    expires_at = Some(map.next_value()?);
                }
                ISSUED_AT => {
                    if issued_at.is_some() {
                        return Err(serde::de::Error::duplicate_field("issued at"));
                    }
                    issued_at = Some(map.next_value()?);
                }
                HCERT_CONTAINER => {
                    if certs.is_some() {
                        return Err(serde::de::Error::duplicate_field("hcert container"));
                    }
                    certs = Some(map.next_value()?);
                }
                _ => {
                    let _: IgnoredAny = map.next_value()?;
                }
            }
        }

        let certs = certs.ok_or_else(|| serde::de::Error::missing_field("hcert container"))?;

        Ok(Cwt {
            issuer,
            issued_at,
            expires_at,
            certs,
        })
    }
}

/// Needs a specialized deserializer to be able to deal with integer keys.
impl<'de> Deserialize<'de> for Cwt {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(CwtVisitor)
    }
}
