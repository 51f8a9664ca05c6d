use thiserror::Error;

/// The terminal error taxonomy of the verification pipeline.
///
/// Every failed [`VerificationVerdict`](crate::VerificationVerdict) carries
/// exactly one of these tags. Decode-layer variants keep the cause of the
/// underlying failure as a string so that verdicts stay cheap to move around
/// and to log.
#[derive(Error, Debug)]
pub enum VerificationError {
    /// The input does not start with the `HC1:` scheme prefix.
    #[error("certificate data does not carry the 'HC1:' scheme prefix")]
    InvalidSchemePrefix,
    /// The body after the prefix is not valid Base45.
    #[error("cannot base45 decode the data: {0}")]
    Base45DecodingFailed(String),
    /// The Base45-decoded bytes are not a valid gzip member.
    #[error("could not decompress the data: {0}")]
    DecompressionFailed(String),
    /// The inflated bytes are not a usable COSE_Sign1 structure
    /// (malformed CBOR, wrong shape, or missing key id).
    #[error("could not parse the COSE_Sign1 structure: {0}")]
    CoseDeserializationFailed(String),
    /// The COSE payload could not be projected to a CWT carrying a
    /// health certificate.
    #[error("could not decode the certificate payload: {0}")]
    CborDeserializationFailed(String),
    /// The CWT is outside its `issued-at`/`expires-at` window.
    #[error("certificate is outside its validity window")]
    CwtExpired,
    /// No trust list entry matches the certificate's key id.
    #[error("no entry for key id '{}' in the trust list", base64::encode(.0))]
    KeyNotInTrustList(Vec<u8>),
    /// A matching trust list entry exists but is outside its own window.
    #[error("the trust list entry for this key is outside its validity window")]
    PublicKeyExpired,
    /// A matching trust list entry exists but may not sign this
    /// certificate type.
    #[error("the trust list entry for this key may not sign this certificate type")]
    UnsuitablePublicKeyType,
    /// A matching trust list entry exists but its key material is unusable.
    #[error("could not construct a public key from the trust list entry: {0}")]
    KeyCreationError(String),
    /// The COSE signature does not verify under the issuer key, or the
    /// signing algorithm is not one of ES256/PS256.
    #[error("signature verification failed")]
    SignatureInvalid,
    /// A trust, rules or value-set refresh failed.
    #[error("trust service failure: {0}")]
    TrustServiceError(String),
    /// The upstream capture layer could not produce a QR payload.
    /// Never produced by this crate, only passed through.
    #[error("the QR code could not be read: {0}")]
    QrCodeError(String),
    /// The upstream caller cancelled a pending verification.
    /// Never produced by this crate, only passed through.
    #[error("the verification request was cancelled")]
    UserCancelled,
}
