use std::iter::FromIterator;

use ciborium::ser::into_writer;
use ciborium::value::{Integer, Value};
use thiserror::Error;

const COSE_SIGN1_CBOR_TAG: u64 = 18;
const COSE_HEADER_KEY_ALG: i128 = 1;
const COSE_HEADER_KEY_KID: i128 = 4;
const COSE_ES256: i128 = -7;
const COSE_PS256: i128 = -37;

/// Represents all the possible types of failures that can occur when
/// parsing a COSE_Sign1 structure.
#[derive(Error, Debug)]
pub enum CoseParseError {
    /// The data is not valid CBOR.
    #[error("cannot parse the data as CBOR: {0}")]
    Cbor(#[from] ciborium::de::Error<std::io::Error>),
    /// The root value carries a tag other than COSE_Sign1 (18).
    #[error("expected COSE_Sign1 tag ({COSE_SIGN1_CBOR_TAG}), found {0}")]
    InvalidTag(u64),
    /// The main CBOR object is not an array.
    #[error("the main CBOR object is not an array")]
    NotAnArray,
    /// The main CBOR array does not have the four COSE_Sign1 parts.
    #[error("the main CBOR array does not contain 4 parts, {0} parts found")]
    InvalidPartCount(usize),
    /// The protected header section is not a binary string.
    #[error("the protected header section is not a binary string")]
    ProtectedHeaderNotBinary,
    /// The protected header bytes do not decode as CBOR.
    #[error("the protected header section is not valid CBOR-encoded data")]
    ProtectedHeaderNotValidCbor,
    /// The protected header decodes to something other than a map.
    #[error("the protected header section does not contain key-value pairs")]
    ProtectedHeaderNotMap,
    /// The unprotected header section is neither a map nor empty bytes.
    #[error("the unprotected header section is not a CBOR map or an empty sequence of bytes")]
    MalformedUnprotectedHeader,
    /// The payload section is not a byte string, a map or null.
    #[error("the payload section is not a binary string, a map or null")]
    MalformedPayload,
    /// The signature section is not a binary string.
    #[error("the signature section is not a binary string")]
    SignatureNotBinary,
}

/// COSE signing algorithm, read from the `alg` (1) header label.
///
/// Only ES256 and PS256 are honored by the verifier; everything else is
/// carried as `Unknown` and fails signature verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// ECDSA with P-256 and SHA-256 (-7); raw `r||s` signatures only.
    Es256,
    /// RSASSA-PSS with SHA-256 (-37).
    Ps256,
    /// Any other label.
    Unknown(i128),
}

impl From<Integer> for SignatureAlgorithm {
    fn from(i: Integer) -> Self {
        let label: i128 = i.into();
        match label {
            COSE_ES256 => SignatureAlgorithm::Es256,
            COSE_PS256 => SignatureAlgorithm::Ps256,
            _ => SignatureAlgorithm::Unknown(label),
        }
    }
}

/// The subset of the COSE headers the pipeline consumes.
#[derive(Debug, Default)]
pub struct CoseHeader {
    /// Key id (label 4), from either header; protected takes precedence.
    pub kid: Option<Vec<u8>>,
    /// Signing algorithm (label 1).
    pub alg: Option<SignatureAlgorithm>,
}

impl<'a> FromIterator<&'a (Value, Value)> for CoseHeader {
    fn from_iter<T: IntoIterator<Item = &'a (Value, Value)>>(iter: T) -> Self {
        // permissive parsing, unknown labels are ignored; later occurrences
        // win, so chain the unprotected header before the protected one
        let mut header = CoseHeader::default();
        for (key, val) in iter {
            if let Some(k) = key.as_integer() {
                let k: i128 = k.into();
                if k == COSE_HEADER_KEY_KID {
                    if let Some(kid) = val.as_bytes() {
                        header.kid = Some(kid.clone());
                    }
                } else if k == COSE_HEADER_KEY_ALG {
                    if let Some(alg) = val.as_integer() {
                        header.alg = Some(alg.into());
                    }
                }
            }
        }
        header
    }
}

/// A parsed COSE_Sign1 structure.
///
/// Accepts both the tag-18-wrapped form and the bare 4-array. The payload
/// may be a byte string, a direct CBOR map (re-encoded to bytes with
/// definite lengths) or null for detached content.
#[derive(Debug)]
pub struct CoseSign1 {
    protected_raw: Vec<u8>,
    /// The merged view of the protected and unprotected headers.
    pub header: CoseHeader,
    /// The payload bytes; `None` when the content is detached.
    pub payload: Option<Vec<u8>>,
    /// The signature bytes.
    pub signature: Vec<u8>,
}

impl CoseSign1 {
    /// Parses a COSE_Sign1 structure from raw CBOR bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CoseParseError> {
        use CoseParseError::*;

        let content = match ciborium::de::from_reader(data)? {
            Value::Tag(COSE_SIGN1_CBOR_TAG, content) => *content,
            Value::Tag(tag_id, _) => return Err(InvalidTag(tag_id)),
            content => content,
        };
        let parts = match content {
            Value::Array(parts) => parts,
            _ => return Err(NotAnArray),
        };
        if parts.len() != 4 {
            return Err(InvalidPartCount(parts.len()));
        }

        let protected_raw = parts[0]
            .as_bytes()
            .ok_or(ProtectedHeaderNotBinary)?
            .clone();

        // the payload is usually a bstr-wrapped CBOR item; some issuers
        // inline the map directly and the trust list signature object
        // detaches it entirely
        let payload = match &parts[2] {
            Value::Bytes(bytes) => Some(bytes.clone()),
            Value::Null => None,
            map @ Value::Map(_) => {
                let mut encoded = Vec::new();
                into_writer(map, &mut encoded).unwrap();
                Some(encoded)
            }
            _ => return Err(MalformedPayload),
        };

        let signature = parts[3].as_bytes().ok_or(SignatureNotBinary)?.clone();

        // unprotected header must be a cbor map or an empty sequence of bytes
        let unprotected_iter = match parts[1] {
            Value::Map(ref values) => Some(values.iter()),
            Value::Bytes(ref values) if values.is_empty() => Some([].iter()),
            _ => None,
        }
        .ok_or(MalformedUnprotectedHeader)?;

        // protected header is a byte string; zero length stands for an
        // empty map, anything else must decode to a CBOR map
        let protected_values: Vec<(Value, Value)> = if protected_raw.is_empty() {
            vec![]
        } else {
            ciborium::de::from_reader::<Value, _>(protected_raw.as_slice())
                .map_err(|_| ProtectedHeaderNotValidCbor)?
                .as_map()
                .ok_or(ProtectedHeaderNotMap)?
                .clone()
        };

        let header: CoseHeader = unprotected_iter.chain(protected_values.iter()).collect();

        Ok(CoseSign1 {
            protected_raw,
            header,
            payload,
            signature,
        })
    }

    /// Recomputes the canonical `Sig_structure` bytes that the issuer
    /// signed, per [RFC 8152 §4.4](https://datatracker.ietf.org/doc/html/rfc8152#section-4.4).
    ///
    /// The structure is rebuilt with definite lengths rather than trusting
    /// the input framing. `external_payload` completes the structure when
    /// the content is detached.
    pub fn sig_structure(&self, external_payload: Option<&[u8]>) -> Vec<u8> {
        let payload = self
            .payload
            .as_deref()
            .or(external_payload)
            .unwrap_or_default();
        let sig_structure = Value::Array(vec![
            Value::Text(String::from("Signature1")),
            Value::Bytes(self.protected_raw.clone()),
            // external_aad, unused for health certificates
            Value::Bytes(vec![]),
            Value::Bytes(payload.to_vec()),
        ]);
        let mut encoded: Vec<u8> = vec![];
        into_writer(&sig_structure, &mut encoded).unwrap();
        encoded
    }
}
