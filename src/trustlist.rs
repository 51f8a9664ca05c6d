use ciborium::ser::into_writer;
use ciborium::value::Value;
use ring::{digest, signature};
use thiserror::Error;

use crate::{CertificateType, SignatureAlgorithm, VerificationError};

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// Kid equality works on the 8-byte truncation used throughout the DGC
/// ecosystem (the kid is the first 8 bytes of the SHA-256 of the signer
/// certificate).
const KID_TRUNCATION: usize = 8;

/// Error struct that represents all the possible errors that can occur
/// while trying to parse a public key.
#[derive(Error, Debug)]
pub enum KeyParseError {
    /// Failed to decode the string using base64.
    #[error("cannot decode base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),
    /// The encoded data did not contain a valid X509 certificate.
    #[error("failed to parse X509 data: {0}")]
    X509Parse(#[from] x509_parser::nom::Err<x509_parser::error::X509Error>),
    /// The certificate's public key algorithm is not EC or RSA.
    #[error("unsupported public key algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The raw key bytes have no recognizable shape.
    #[error("the key bytes are neither an uncompressed P-256 point nor a DER RSA public key")]
    UnrecognizedKeyMaterial,
}

/// The kind of key material held by a [`PublicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// An EC P-256 public key (SEC1 uncompressed point).
    Ec,
    /// An RSA public key (DER `RSAPublicKey`).
    Rsa,
}

/// An issuer public key, held by value.
///
/// Lookups hand these out as owned values so that a verification keeps
/// using the key it resolved even if a concurrent refresh swaps the cached
/// trust list underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    kind: KeyKind,
    data: Vec<u8>,
}

impl PublicKey {
    /// Builds a key from raw bytes, recognizing the two supported shapes.
    pub fn from_raw(data: Vec<u8>) -> Result<Self, KeyParseError> {
        let kind = if data.len() == 65 && data[0] == 0x04 {
            KeyKind::Ec
        } else if data.first() == Some(&0x30) {
            KeyKind::Rsa
        } else {
            return Err(KeyParseError::UnrecognizedKeyMaterial);
        };
        Ok(Self { kind, data })
    }

    /// Extracts the subject public key from a DER X509 certificate.
    ///
    /// Only the SubjectPublicKeyInfo is consumed; chain validation and the
    /// certificate validity window are deliberately not checked here.
    pub fn from_certificate_der(der: &[u8]) -> Result<Self, KeyParseError> {
        let certificate = x509_parser::parse_x509_certificate(der)?.1;
        let spki = &certificate.tbs_certificate.subject_pki;
        let kind = match spki.algorithm.algorithm.to_id_string().as_str() {
            OID_EC_PUBLIC_KEY => KeyKind::Ec,
            OID_RSA_ENCRYPTION => KeyKind::Rsa,
            other => return Err(KeyParseError::UnsupportedAlgorithm(other.to_string())),
        };
        Ok(Self {
            kind,
            data: spki.subject_public_key.data.to_vec(),
        })
    }

    /// Builds a key from a base64 string holding either a DER X509
    /// certificate or raw key bytes. This is the format of the compiled-in
    /// trust anchors.
    pub fn from_base64(data: &str) -> Result<Self, KeyParseError> {
        let decoded = base64::decode(data)?;
        match Self::from_certificate_der(&decoded) {
            Ok(key) => Ok(key),
            Err(KeyParseError::X509Parse(_)) => Self::from_raw(decoded),
            Err(e) => Err(e),
        }
    }

    /// The kind of key material.
    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Verifies `signature` over `message` under this key.
    ///
    /// ES256 expects the raw 64-byte `r||s` encoding; DER-encoded ECDSA
    /// signatures are rejected. An algorithm/key-kind mismatch never
    /// verifies.
    pub fn verify(
        &self,
        alg: SignatureAlgorithm,
        message: &[u8],
        signature_bytes: &[u8],
    ) -> bool {
        let verifier: &dyn signature::VerificationAlgorithm = match (alg, self.kind) {
            (SignatureAlgorithm::Es256, KeyKind::Ec) => &signature::ECDSA_P256_SHA256_FIXED,
            (SignatureAlgorithm::Ps256, KeyKind::Rsa) => &signature::RSA_PSS_2048_8192_SHA256,
            _ => return false,
        };
        signature::UnparsedPublicKey::new(verifier, &self.data)
            .verify(message, signature_bytes)
            .is_ok()
    }
}

/// Which certificate types an issuer key may attest to.
///
/// An entry with no explicit marker is valid for every type, matching how
/// document signer certificates without extended key usage are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage {
    /// May sign vaccination certificates.
    pub vaccination: bool,
    /// May sign test certificates.
    pub test: bool,
    /// May sign recovery certificates.
    pub recovery: bool,
}

impl KeyUsage {
    /// Usage allowing every certificate type.
    pub fn all() -> Self {
        Self {
            vaccination: true,
            test: true,
            recovery: true,
        }
    }

    /// Usage allowing only the given certificate type.
    pub fn only(certificate_type: CertificateType) -> Self {
        let mut usage = Self {
            vaccination: false,
            test: false,
            recovery: false,
        };
        match certificate_type {
            CertificateType::Vaccination => usage.vaccination = true,
            CertificateType::Test => usage.test = true,
            CertificateType::Recovery => usage.recovery = true,
        }
        usage
    }

    /// Whether this usage covers the given certificate type.
    pub fn allows(&self, certificate_type: CertificateType) -> bool {
        match certificate_type {
            CertificateType::Vaccination => self.vaccination,
            CertificateType::Test => self.test,
            CertificateType::Recovery => self.recovery,
        }
    }

    fn markers(&self) -> Vec<&'static str> {
        let mut markers = Vec::new();
        if self.vaccination {
            markers.push("v");
        }
        if self.test {
            markers.push("t");
        }
        if self.recovery {
            markers.push("r");
        }
        markers
    }
}

impl Default for KeyUsage {
    fn default() -> Self {
        Self::all()
    }
}

/// One issuer key in the trust list.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustEntry {
    /// The issuer-chosen key id.
    pub kid: Vec<u8>,
    /// POSIX seconds from which the key may be used.
    pub not_before: u64,
    /// POSIX seconds up to which the key may be used.
    pub not_after: u64,
    /// Which certificate types the key may attest to.
    pub usage: KeyUsage,
    /// Raw key material, parsed lazily at lookup time.
    pub key: Vec<u8>,
}

impl TrustEntry {
    /// Parses the entry's key material.
    pub fn public_key(&self) -> Result<PublicKey, KeyParseError> {
        PublicKey::from_raw(self.key.clone())
    }

    fn in_window(&self, now: u64) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// Why a key lookup against the trust list failed.
#[derive(Error, Debug)]
pub enum KeyLookupError {
    /// No entry matches the kid.
    #[error("no entry for key id '{}'", base64::encode(.0))]
    NotFound(Vec<u8>),
    /// Matching entries exist, all outside their windows.
    #[error("all matching entries are outside their validity window")]
    Expired,
    /// A matching entry is inside its window but not allowed to sign this
    /// certificate type.
    #[error("the matching entry may not sign this certificate type")]
    UnsuitableType,
    /// A matching entry is usable but its key material is not.
    #[error("cannot construct a public key: {0}")]
    KeyCreation(String),
}

impl From<KeyLookupError> for VerificationError {
    fn from(e: KeyLookupError) -> Self {
        match e {
            KeyLookupError::NotFound(kid) => VerificationError::KeyNotInTrustList(kid),
            KeyLookupError::Expired => VerificationError::PublicKeyExpired,
            KeyLookupError::UnsuitableType => VerificationError::UnsuitablePublicKeyType,
            KeyLookupError::KeyCreation(cause) => VerificationError::KeyCreationError(cause),
        }
    }
}

/// Represents all the possible errors that can occur while decoding a
/// trust list from its CBOR wire format.
#[derive(Error, Debug)]
pub enum TrustListParseError {
    /// The data is not valid CBOR.
    #[error("cannot parse the data as CBOR: {0}")]
    Cbor(#[from] ciborium::de::Error<std::io::Error>),
    /// The root value is not a map.
    #[error("the trust list is not a CBOR map")]
    NotAMap,
    /// A required top-level field is absent.
    #[error("the trust list does not contain '{0}'")]
    MissingField(&'static str),
    /// A top-level field is not a timestamp.
    #[error("'{0}' is not a timestamp")]
    InvalidTimestamp(&'static str),
    /// The entry list is not an array.
    #[error("the entry list is not an array")]
    EntriesNotArray,
    /// An entry is not a map.
    #[error("entry {0} is not a CBOR map")]
    EntryNotMap(usize),
    /// An entry misses a required field.
    #[error("entry {0} does not contain '{1}'")]
    EntryMissingField(usize, &'static str),
    /// An entry field has the wrong shape.
    #[error("'{1}' of entry {0} is malformed")]
    EntryInvalidField(usize, &'static str),
    /// An entry window is inverted.
    #[error("entry {0} has not-before later than not-after")]
    EntryInvalidWindow(usize),
}

/// The signed catalog of currently-authorized issuer public keys.
///
/// Entries keep their document order: when several entries share a kid the
/// first usable one wins.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustList {
    /// POSIX seconds from which the list may be used.
    pub valid_from: u64,
    /// POSIX seconds up to which the list may be used.
    pub valid_until: u64,
    /// The issuer keys, in document order.
    pub entries: Vec<TrustEntry>,
}

impl TrustList {
    /// Creates a new empty trust list with an unbounded window.
    pub fn new() -> Self {
        TrustList {
            valid_from: 0,
            valid_until: u64::MAX,
            entries: Vec::new(),
        }
    }

    /// Whether the list itself may be used at `now`.
    pub fn is_fresh(&self, now: u64) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// Returns the first usable key for `(kid, certificate type)` at `now`.
    ///
    /// Entries are scanned in document order; an entry matches on exact kid
    /// equality or on equality of the 8-byte truncations. When no candidate
    /// is fully usable the most specific failure wins: wrong type over
    /// expired window over unusable key material over absence.
    pub fn lookup(
        &self,
        kid: &[u8],
        certificate_type: CertificateType,
        now: u64,
    ) -> Result<PublicKey, KeyLookupError> {
        let mut saw_expired = false;
        let mut saw_unsuitable = false;
        let mut key_failure: Option<String> = None;

        for entry in &self.entries {
            if !kid_matches(&entry.kid, kid) {
                continue;
            }
            if !entry.in_window(now) {
                saw_expired = true;
                continue;
            }
            if !entry.usage.allows(certificate_type) {
                saw_unsuitable = true;
                continue;
            }
            match entry.public_key() {
                Ok(key) => return Ok(key),
                Err(e) => {
                    key_failure = Some(e.to_string());
                    continue;
                }
            }
        }

        if saw_unsuitable {
            Err(KeyLookupError::UnsuitableType)
        } else if saw_expired {
            Err(KeyLookupError::Expired)
        } else if let Some(cause) = key_failure {
            Err(KeyLookupError::KeyCreation(cause))
        } else {
            Err(KeyLookupError::NotFound(kid.to_vec()))
        }
    }

    /// Adds a public key from a X509 certificate encoded in base64
    /// (certificate data only, without delimiters).
    ///
    /// The kid is derived as the first 8 bytes of the SHA-256 hash of the
    /// certificate data; the entry is valid for all types at all times.
    pub fn add_key_from_certificate(&mut self, base64_cert: &str) -> Result<(), KeyParseError> {
        let decoded = base64::decode(base64_cert)?;
        let kid = kid_from_certificate_der(&decoded);
        let key = PublicKey::from_certificate_der(&decoded)?;
        self.entries.push(TrustEntry {
            kid,
            not_before: 0,
            not_after: u64::MAX,
            usage: KeyUsage::all(),
            key: key.data,
        });
        Ok(())
    }

    /// Adds a base64 encoded raw key with the specified kid.
    pub fn add_key_from_base64(&mut self, kid: &[u8], base64_key: &str) -> Result<(), KeyParseError> {
        let key = base64::decode(base64_key)?;
        self.entries.push(TrustEntry {
            kid: kid.to_vec(),
            not_before: 0,
            not_after: u64::MAX,
            usage: KeyUsage::all(),
            key,
        });
        Ok(())
    }

    /// Decodes a trust list from its CBOR wire format.
    pub fn from_cbor(data: &[u8]) -> Result<Self, TrustListParseError> {
        use TrustListParseError::*;

        let root: Value = ciborium::de::from_reader(data)?;
        let map = root.as_map().ok_or(NotAMap)?;

        let valid_from = seconds(map_get(map, "f").ok_or(MissingField("f"))?)
            .ok_or(InvalidTimestamp("f"))?;
        let valid_until = seconds(map_get(map, "u").ok_or(MissingField("u"))?)
            .ok_or(InvalidTimestamp("u"))?;
        let raw_entries = map_get(map, "e")
            .ok_or(MissingField("e"))?
            .as_array()
            .ok_or(EntriesNotArray)?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, raw) in raw_entries.iter().enumerate() {
            let entry = raw.as_map().ok_or(EntryNotMap(index))?;

            let kid = map_get(entry, "i")
                .ok_or(EntryMissingField(index, "i"))?
                .as_bytes()
                .ok_or(EntryInvalidField(index, "i"))?
                .clone();
            let not_before = seconds(map_get(entry, "f").ok_or(EntryMissingField(index, "f"))?)
                .ok_or(EntryInvalidField(index, "f"))?;
            let not_after = seconds(map_get(entry, "u").ok_or(EntryMissingField(index, "u"))?)
                .ok_or(EntryInvalidField(index, "u"))?;
            if not_before > not_after {
                return Err(EntryInvalidWindow(index));
            }
            let key = map_get(entry, "k")
                .ok_or(EntryMissingField(index, "k"))?
                .as_bytes()
                .ok_or(EntryInvalidField(index, "k"))?
                .clone();
            let usage = match map_get(entry, "t") {
                None => KeyUsage::all(),
                Some(value) => {
                    let markers = value
                        .as_array()
                        .ok_or(EntryInvalidField(index, "t"))?;
                    if markers.is_empty() {
                        KeyUsage::all()
                    } else {
                        let mut usage = KeyUsage {
                            vaccination: false,
                            test: false,
                            recovery: false,
                        };
                        for marker in markers {
                            match marker.as_text() {
                                Some("v") => usage.vaccination = true,
                                Some("t") => usage.test = true,
                                Some("r") => usage.recovery = true,
                                _ => return Err(EntryInvalidField(index, "t")),
                            }
                        }
                        usage
                    }
                }
            };

            entries.push(TrustEntry {
                kid,
                not_before,
                not_after,
                usage,
                key,
            });
        }

        Ok(TrustList {
            valid_from,
            valid_until,
            entries,
        })
    }

    /// Encodes the trust list into its CBOR wire format.
    pub fn to_cbor(&self) -> Vec<u8> {
        let entries: Vec<Value> = self
            .entries
            .iter()
            .map(|entry| {
                Value::Map(vec![
                    (Value::Text("i".into()), Value::Bytes(entry.kid.clone())),
                    (
                        Value::Text("f".into()),
                        Value::Integer(entry.not_before.into()),
                    ),
                    (
                        Value::Text("u".into()),
                        Value::Integer(entry.not_after.into()),
                    ),
                    (
                        Value::Text("t".into()),
                        Value::Array(
                            entry
                                .usage
                                .markers()
                                .into_iter()
                                .map(|m| Value::Text(m.into()))
                                .collect(),
                        ),
                    ),
                    (Value::Text("k".into()), Value::Bytes(entry.key.clone())),
                ])
            })
            .collect();
        let root = Value::Map(vec![
            (
                Value::Text("f".into()),
                Value::Integer(self.valid_from.into()),
            ),
            (
                Value::Text("u".into()),
                Value::Integer(self.valid_until.into()),
            ),
            (Value::Text("e".into()), Value::Array(entries)),
        ]);
        let mut encoded = Vec::new();
        into_writer(&root, &mut encoded).unwrap();
        encoded
    }
}

impl Default for TrustList {
    fn default() -> Self {
        TrustList::new()
    }
}

/// The conventional DGC kid: the first 8 bytes of the SHA-256 of the DER
/// certificate.
pub fn kid_from_certificate_der(der: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, der).as_ref()[..KID_TRUNCATION].to_vec()
}

fn kid_matches(entry_kid: &[u8], kid: &[u8]) -> bool {
    if entry_kid == kid {
        return true;
    }
    entry_kid.len() >= KID_TRUNCATION
        && kid.len() >= KID_TRUNCATION
        && entry_kid[..KID_TRUNCATION] == kid[..KID_TRUNCATION]
}

fn map_get<'a>(map: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

fn seconds(value: &Value) -> Option<u64> {
    if let Some(i) = value.as_integer() {
        let i: i128 = i.into();
        return u64::try_from(i).ok();
    }
    match value.as_float() {
        Some(f) if f.is_finite() && f >= 0.0 => Some(f as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITALY_TEST_CERT: &str = "MIIEHjCCAgagAwIBAgIUM5lJeGCHoRF1raR6cbZqDV4vPA8wDQYJKoZIhvcNAQELBQAwTjELMAkGA1UEBhMCSVQxHzAdBgNVBAoMFk1pbmlzdGVybyBkZWxsYSBTYWx1dGUxHjAcBgNVBAMMFUl0YWx5IERHQyBDU0NBIFRFU1QgMTAeFw0yMTA1MDcxNzAyMTZaFw0yMzA1MDgxNzAyMTZaME0xCzAJBgNVBAYTAklUMR8wHQYDVQQKDBZNaW5pc3Rlcm8gZGVsbGEgU2FsdXRlMR0wGwYDVQQDDBRJdGFseSBER0MgRFNDIFRFU1QgMTBZMBMGByqGSM49AgEGCCqGSM49AwEHA0IABDSp7t86JxAmjZFobmmu0wkii53snRuwqVWe3/g/wVz9i306XA5iXpHkRPZVUkSZmYhutMDrheg6sfwMRdql3aajgb8wgbwwHwYDVR0jBBgwFoAUS2iy4oMAoxUY87nZRidUqYg9yyMwagYDVR0fBGMwYTBfoF2gW4ZZbGRhcDovL2NhZHMuZGdjLmdvdi5pdC9DTj1JdGFseSUyMERHQyUyMENTQ0ElMjBURVNUJTIwMSxPPU1pbmlzdGVybyUyMGRlbGxhJTIwU2FsdXRlLEM9SVQwHQYDVR0OBBYEFNSEwjzu61pAMqliNhS9vzGJFqFFMA4GA1UdDwEB/wQEAwIHgDANBgkqhkiG9w0BAQsFAAOCAgEAIF74yHgzCGdor5MaqYSvkS5aog5+7u52TGggiPl78QAmIpjPO5qcYpJZVf6AoL4MpveEI/iuCUVQxBzYqlLACjSbZEbtTBPSzuhfvsf9T3MUq5cu10lkHKbFgApUDjrMUnG9SMqmQU2Cv5S4t94ec2iLmokXmhYP/JojRXt1ZMZlsw/8/lRJ8vqPUorJ/fMvOLWDE/fDxNhh3uK5UHBhRXCT8MBep4cgt9cuT9O4w1JcejSr5nsEfeo8u9Pb/h6MnmxpBSq3JbnjONVK5ak7iwCkLr5PMk09ncqG+/8Kq+qTjNC76IetS9ST6bWzTZILX4BD1BL8bHsFGgIeeCO0GqalFZAsbapnaB+36HVUZVDYOoA+VraIWECNxXViikZdjQONaeWDVhCxZ/vBl1/KLAdX3OPxRwl/jHLnaSXeqr/zYf9a8UqFrpadT0tQff/q3yH5hJRJM0P6Yp5CPIEArJRW6ovDBbp3DVF2GyAI1lFA2Trs798NN6qf7SkuySz5HSzm53g6JsLY/HLzdwJPYLObD7U+x37n+DDi4Wa6vM5xdC7FZ5IyWXuT1oAa9yM4h6nW3UvC+wNUusW6adqqtdd4F1gHPjCf5lpW5Ye1bdLUmO7TGlePmbOkzEB08Mlc6atl/vkx/crfl4dq1LZivLgPBwDzE8arIk0f2vCx1+4=";

    fn ec_point(tag: u8) -> Vec<u8> {
        let mut point = vec![0x04];
        point.extend(std::iter::repeat(tag).take(64));
        point
    }

    fn entry(kid: &[u8], window: (u64, u64), usage: KeyUsage, key: Vec<u8>) -> TrustEntry {
        TrustEntry {
            kid: kid.to_vec(),
            not_before: window.0,
            not_after: window.1,
            usage,
            key,
        }
    }

    #[test]
    fn it_adds_a_public_key_from_a_certificate() {
        let mut trustlist = TrustList::new();
        trustlist.add_key_from_certificate(ITALY_TEST_CERT).unwrap();

        assert_eq!(trustlist.entries.len(), 1);
        assert_eq!(trustlist.entries[0].kid.len(), 8);

        let key = trustlist
            .lookup(
                &trustlist.entries[0].kid.clone(),
                CertificateType::Vaccination,
                1_624_879_000,
            )
            .unwrap();
        assert_eq!(key.kind(), KeyKind::Ec);
    }

    #[test]
    fn kid_lookup_matches_on_truncation() {
        let mut list = TrustList::new();
        list.entries.push(entry(
            &[1, 2, 3, 4, 5, 6, 7, 8],
            (0, u64::MAX),
            KeyUsage::all(),
            ec_point(0xaa),
        ));

        let long_kid = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert!(list.lookup(&long_kid, CertificateType::Test, 100).is_ok());

        let other_kid = [9, 9, 9, 9, 9, 9, 9, 9];
        assert!(matches!(
            list.lookup(&other_kid, CertificateType::Test, 100),
            Err(KeyLookupError::NotFound(_))
        ));
    }

    #[test]
    fn entries_outside_their_window_report_expired() {
        let kid = [1u8; 8];
        let mut list = TrustList::new();
        list.entries
            .push(entry(&kid, (100, 200), KeyUsage::all(), ec_point(0xaa)));

        assert!(list.lookup(&kid, CertificateType::Test, 150).is_ok());
        assert!(matches!(
            list.lookup(&kid, CertificateType::Test, 50),
            Err(KeyLookupError::Expired)
        ));
        assert!(matches!(
            list.lookup(&kid, CertificateType::Test, 300),
            Err(KeyLookupError::Expired)
        ));
    }

    #[test]
    fn wrong_usage_wins_over_expired_window() {
        let kid = [1u8; 8];
        let mut list = TrustList::new();
        list.entries
            .push(entry(&kid, (0, 100), KeyUsage::all(), ec_point(0xaa)));
        list.entries.push(entry(
            &kid,
            (0, u64::MAX),
            KeyUsage::only(CertificateType::Test),
            ec_point(0xbb),
        ));

        assert!(matches!(
            list.lookup(&kid, CertificateType::Vaccination, 200),
            Err(KeyLookupError::UnsuitableType)
        ));
        // the second entry still serves test certificates
        assert!(list.lookup(&kid, CertificateType::Test, 200).is_ok());
    }

    #[test]
    fn first_usable_entry_wins_in_document_order() {
        let kid = [1u8; 8];
        let mut list = TrustList::new();
        list.entries
            .push(entry(&kid, (0, 100), KeyUsage::all(), ec_point(0xaa)));
        list.entries
            .push(entry(&kid, (0, u64::MAX), KeyUsage::all(), ec_point(0xbb)));
        list.entries
            .push(entry(&kid, (0, u64::MAX), KeyUsage::all(), ec_point(0xcc)));

        // the first entry is expired at 200, the second is the winner
        let key = list.lookup(&kid, CertificateType::Recovery, 200).unwrap();
        assert_eq!(key, PublicKey::from_raw(ec_point(0xbb)).unwrap());
    }

    #[test]
    fn unusable_key_material_reports_key_creation() {
        let kid = [1u8; 8];
        let mut list = TrustList::new();
        list.entries.push(entry(
            &kid,
            (0, u64::MAX),
            KeyUsage::all(),
            vec![0xde, 0xad],
        ));

        assert!(matches!(
            list.lookup(&kid, CertificateType::Test, 100),
            Err(KeyLookupError::KeyCreation(_))
        ));
    }

    #[test]
    fn it_round_trips_through_cbor() {
        let mut list = TrustList {
            valid_from: 1_600_000_000,
            valid_until: 1_700_000_000,
            entries: Vec::new(),
        };
        list.entries.push(entry(
            &[1, 2, 3, 4, 5, 6, 7, 8],
            (1_600_000_000, 1_650_000_000),
            KeyUsage::only(CertificateType::Vaccination),
            ec_point(0xaa),
        ));
        list.entries.push(entry(
            &[8, 7, 6, 5, 4, 3, 2, 1],
            (0, u64::MAX),
            KeyUsage::all(),
            vec![0x30, 0x82, 0x01, 0x0a],
        ));

        let decoded = TrustList::from_cbor(&list.to_cbor()).unwrap();
        assert_eq!(list, decoded);
    }

    #[test]
    fn it_rejects_inverted_entry_windows() {
        let mut list = TrustList::new();
        list.entries
            .push(entry(&[1u8; 8], (0, u64::MAX), KeyUsage::all(), ec_point(1)));
        list.entries[0].not_before = 10;
        list.entries[0].not_after = 5;

        let encoded = list.to_cbor();
        assert!(matches!(
            TrustList::from_cbor(&encoded),
            Err(TrustListParseError::EntryInvalidWindow(0))
        ));
    }

    #[test]
    fn freshness_follows_the_list_window() {
        let list = TrustList {
            valid_from: 100,
            valid_until: 200,
            entries: Vec::new(),
        };
        assert!(!list.is_fresh(99));
        assert!(list.is_fresh(100));
        assert!(list.is_fresh(200));
        assert!(!list.is_fresh(201));
    }
}
