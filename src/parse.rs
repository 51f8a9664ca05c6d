use std::io::Read;

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::cose::{CoseParseError, CoseSign1};
use crate::cwt::{Cwt, CwtParseError};
use crate::VerificationError;

/// Represents all the possible types of failures that can occur when
/// decoding a certificate, one variant per pipeline stage.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Found less than 4 bytes.
    #[error("invalid data, expected more than 4 bytes, found {0} bytes")]
    NotEnoughData(usize),
    /// Invalid prefix.
    #[error("invalid prefix, expected 'HC1:', found '{0}'")]
    InvalidPrefix(String),
    /// Error decoding using base45.
    #[error("cannot base45 decode the data: {0}")]
    Base45(#[from] base45::DecodeError),
    /// Error decompressing the gzip member.
    #[error("could not decompress the data: {0}")]
    Decompression(String),
    /// Error parsing the COSE_Sign1 structure.
    #[error("could not parse COSE data: {0}")]
    Cose(#[from] CoseParseError),
    /// Error decoding the CWT payload.
    #[error("could not decode CWT data: {0}")]
    Cwt(#[from] CwtParseError),
}

impl From<DecodeError> for VerificationError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::NotEnoughData(_) | DecodeError::InvalidPrefix(_) => {
                VerificationError::InvalidSchemePrefix
            }
            DecodeError::Base45(cause) => {
                VerificationError::Base45DecodingFailed(cause.to_string())
            }
            DecodeError::Decompression(cause) => VerificationError::DecompressionFailed(cause),
            DecodeError::Cose(cause) => {
                VerificationError::CoseDeserializationFailed(cause.to_string())
            }
            DecodeError::Cwt(cause) => {
                VerificationError::CborDeserializationFailed(cause.to_string())
            }
        }
    }
}

fn remove_prefix(data: &str) -> Result<&str, DecodeError> {
    // check minimum data length
    if data.len() <= 4 {
        return Err(DecodeError::NotEnoughData(data.len()));
    }

    // check HC1: header
    if !data.starts_with("HC1:") {
        return Err(DecodeError::InvalidPrefix(data.chars().take(4).collect()));
    }

    Ok(&data[4..])
}

fn decode_base45(data: &str) -> Result<Vec<u8>, DecodeError> {
    let decoded = base45::decode(data)?;
    Ok(decoded)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::Decompression(e.to_string()))?;
    Ok(decompressed)
}

/// Decodes a certificate up to the raw COSE_Sign1 view.
///
/// Runs the prefix, Base45 and gzip stages and parses the COSE structure.
/// No signature checking and no payload interpretation happen here.
pub fn decode_cose(data: &str) -> Result<CoseSign1, DecodeError> {
    // remove prefix
    let data = remove_prefix(data)?;

    // base45 decode
    let decoded = decode_base45(data)?;

    // decompress the gzip member
    let decompressed = decompress(&decoded)?;

    // parse the cose envelope
    let cose = CoseSign1::from_bytes(&decompressed)?;

    Ok(cose)
}

/// Decodes a certificate and returns the [`Cwt`] data contained in it.
///
/// This function is recommended when you don't want to validate the
/// signature but you are just interested in reading the content of the
/// certificate.
pub fn decode(data: &str) -> Result<Cwt, DecodeError> {
    let cose = decode_cose(data)?;
    let payload = cose
        .payload
        .as_deref()
        .ok_or(CoseParseError::MalformedPayload)?;
    let cwt = Cwt::from_bytes(payload).map_err(DecodeError::Cwt)?;
    Ok(cwt)
}
