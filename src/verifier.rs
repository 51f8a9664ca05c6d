use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::{ConnectionOptions, ValidationPolicy};
use crate::cose::SignatureAlgorithm;
use crate::cwt::Cwt;
use crate::error::VerificationError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::hcert::EuHealthCert;
use crate::parse;
use crate::rules::{
    BusinessRules, ExternalParameters, RuleEvaluationRequest, RuleFilter, RuleResult, RulesEngine,
};
use crate::storage::{EncryptedStorage, FileStorage};
use crate::store::SignedStore;
use crate::trustlist::TrustList;
use crate::valuesets::ValueSets;

/// The CWT claims surfaced alongside a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMeta {
    /// The issuer country of the certificate container.
    pub issuer: Option<String>,
    /// When the container was issued, POSIX seconds.
    pub issued_at: Option<u64>,
    /// When the container expires, POSIX seconds.
    pub expires_at: Option<u64>,
}

impl From<&Cwt> for VerificationMeta {
    fn from(cwt: &Cwt) -> Self {
        Self {
            issuer: cwt.issuer.clone(),
            issued_at: cwt.issued_at.map(|d| d.seconds()),
            expires_at: cwt.expires_at.map(|d| d.seconds()),
        }
    }
}

/// The outcome of a verification.
///
/// `valid()` holds exactly when `error()` is `None`. From the temporal
/// check onwards a failed verdict still carries the decoded claims and
/// certificate, so callers can display what was scanned; decode-layer
/// failures carry neither.
#[derive(Debug)]
pub struct VerificationVerdict {
    valid: bool,
    meta: Option<VerificationMeta>,
    certificate: Option<EuHealthCert>,
    error: Option<VerificationError>,
}

impl VerificationVerdict {
    /// A passing verdict.
    pub fn success(meta: VerificationMeta, certificate: EuHealthCert) -> Self {
        Self {
            valid: true,
            meta: Some(meta),
            certificate: Some(certificate),
            error: None,
        }
    }

    /// A failing verdict with no decoded data, for decode-layer failures
    /// and for errors passed through from the capture layer.
    pub fn failure(error: VerificationError) -> Self {
        Self {
            valid: false,
            meta: None,
            certificate: None,
            error: Some(error),
        }
    }

    /// A failing verdict that still surfaces the decoded data.
    pub fn failure_with_context(
        error: VerificationError,
        meta: VerificationMeta,
        certificate: EuHealthCert,
    ) -> Self {
        Self {
            valid: false,
            meta: Some(meta),
            certificate: Some(certificate),
            error: Some(error),
        }
    }

    /// Whether the certificate is authentic and valid.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The decoded CWT claims, when decoding got that far.
    pub fn meta(&self) -> Option<&VerificationMeta> {
        self.meta.as_ref()
    }

    /// The decoded certificate, when decoding got that far.
    pub fn certificate(&self) -> Option<&EuHealthCert> {
        self.certificate.as_ref()
    }

    /// The failure tag of a failed verdict.
    pub fn error(&self) -> Option<&VerificationError> {
        self.error.as_ref()
    }
}

/// Builder for [`CertificateVerifier`].
///
/// Every capability has a production default; tests replace them with the
/// in-memory implementations.
pub struct VerifierBuilder {
    trust_list: ConnectionOptions,
    business_rules: ConnectionOptions,
    value_sets: ConnectionOptions,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn Fetcher>,
    persistence: Option<(Arc<dyn FileStorage>, [u8; 32])>,
    rules_engine: Option<Arc<dyn RulesEngine>>,
    policy: ValidationPolicy,
}

impl VerifierBuilder {
    fn new() -> Self {
        Self {
            trust_list: ConnectionOptions::trust_list(),
            business_rules: ConnectionOptions::business_rules(),
            value_sets: ConnectionOptions::value_sets(),
            clock: Arc::new(SystemClock),
            fetcher: Arc::new(HttpFetcher::new()),
            persistence: None,
            rules_engine: None,
            policy: ValidationPolicy::default(),
        }
    }

    /// Overrides the trust list endpoints and anchor.
    pub fn trust_list(mut self, options: ConnectionOptions) -> Self {
        self.trust_list = options;
        self
    }

    /// Overrides the business rules endpoints and anchor.
    pub fn business_rules(mut self, options: ConnectionOptions) -> Self {
        self.business_rules = options;
        self
    }

    /// Overrides the value sets endpoints and anchor.
    pub fn value_sets(mut self, options: ConnectionOptions) -> Self {
        self.value_sets = options;
        self
    }

    /// Overrides the wall clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the network capability.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Enables encrypted persistence of the three bundles.
    ///
    /// `key` is the per-install storage key; the bundles are sealed with
    /// AES-256-GCM before they touch `storage`.
    pub fn persistence(mut self, storage: Arc<dyn FileStorage>, key: [u8; 32]) -> Self {
        self.persistence = Some((storage, key));
        self
    }

    /// Wires the business-rules engine.
    pub fn rules_engine(mut self, engine: Arc<dyn RulesEngine>) -> Self {
        self.rules_engine = Some(engine);
        self
    }

    /// Overrides the validation policy.
    pub fn policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds the verifier.
    pub fn build(self) -> CertificateVerifier {
        let storage: Option<Arc<dyn FileStorage>> = self
            .persistence
            .map(|(inner, key)| Arc::new(EncryptedStorage::new(inner, &key)) as Arc<dyn FileStorage>);

        CertificateVerifier {
            trust_list: SignedStore::new(self.trust_list, self.fetcher.clone(), storage.clone()),
            business_rules: SignedStore::new(
                self.business_rules,
                self.fetcher.clone(),
                storage.clone(),
            ),
            value_sets: SignedStore::new(self.value_sets, self.fetcher, storage),
            clock: self.clock,
            rules_engine: self.rules_engine,
            policy: self.policy,
        }
    }
}

/// The verification pipeline and its three signed-bundle stores.
///
/// One instance is meant to live for the whole process; the stores cache
/// and persist across calls. All capabilities are injected at construction
/// and never change afterwards.
pub struct CertificateVerifier {
    trust_list: SignedStore<TrustList>,
    business_rules: SignedStore<BusinessRules>,
    value_sets: SignedStore<ValueSets>,
    clock: Arc<dyn Clock>,
    rules_engine: Option<Arc<dyn RulesEngine>>,
    policy: ValidationPolicy,
}

impl CertificateVerifier {
    /// Starts building a verifier.
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::new()
    }

    /// Verifies the textual payload of a certificate QR code.
    ///
    /// The stages run in a fixed order and the first failure decides the
    /// verdict: prefix, Base45, gzip, COSE parse, CWT projection, temporal
    /// validity, trust lookup, signature. From the temporal check onwards
    /// the decoded data is surfaced even on failure.
    pub async fn verify(&self, data: &str) -> VerificationVerdict {
        let now = self.clock.now();

        let cose = match parse::decode_cose(data) {
            Ok(cose) => cose,
            Err(e) => {
                tracing::debug!(error = %e, "certificate decode failed");
                return VerificationVerdict::failure(e.into());
            }
        };
        let kid = match &cose.header.kid {
            Some(kid) => kid.clone(),
            None => {
                return VerificationVerdict::failure(
                    VerificationError::CoseDeserializationFailed(
                        "no key id in the COSE headers".to_string(),
                    ),
                )
            }
        };
        let payload = match cose.payload.as_deref() {
            Some(payload) => payload,
            None => {
                return VerificationVerdict::failure(
                    VerificationError::CoseDeserializationFailed(
                        "the payload is detached".to_string(),
                    ),
                )
            }
        };

        let cwt = match Cwt::from_bytes(payload) {
            Ok(cwt) => cwt,
            Err(e) => {
                return VerificationVerdict::failure(VerificationError::CborDeserializationFailed(
                    e.to_string(),
                ))
            }
        };
        let certificate = match cwt.health_cert() {
            Some(certificate) => certificate.clone(),
            None => {
                return VerificationVerdict::failure(VerificationError::CborDeserializationFailed(
                    "no health certificate in the CWT container".to_string(),
                ))
            }
        };
        let meta = VerificationMeta::from(&cwt);

        if !cwt.is_valid_at(now, self.policy.require_issued_at_in_past) {
            return VerificationVerdict::failure_with_context(
                VerificationError::CwtExpired,
                meta,
                certificate,
            );
        }

        let certificate_type = certificate.certificate_type();
        let trust_list = match self.trust_list.bundle(now).await {
            Ok(list) => Some(list),
            Err(e) if self.policy.fail_verification_on_refresh_error => {
                return VerificationVerdict::failure_with_context(
                    VerificationError::TrustServiceError(e.to_string()),
                    meta,
                    certificate,
                )
            }
            Err(_) => None,
        };

        let lookup = match &trust_list {
            Some(list) => list.lookup(&kid, certificate_type, now),
            None => TrustList::new().lookup(&kid, certificate_type, now),
        };
        let key = match lookup {
            Ok(key) => key,
            Err(e) => {
                return VerificationVerdict::failure_with_context(e.into(), meta, certificate)
            }
        };

        let alg = match cose.header.alg {
            Some(alg @ (SignatureAlgorithm::Es256 | SignatureAlgorithm::Ps256)) => alg,
            _ => {
                return VerificationVerdict::failure_with_context(
                    VerificationError::SignatureInvalid,
                    meta,
                    certificate,
                )
            }
        };
        if key.verify(alg, &cose.sig_structure(None), &cose.signature) {
            VerificationVerdict::success(meta, certificate)
        } else {
            VerificationVerdict::failure_with_context(
                VerificationError::SignatureInvalid,
                meta,
                certificate,
            )
        }
    }

    /// Evaluates the destination country's business rules against a
    /// decoded certificate.
    ///
    /// Loads the rules and value-sets bundles, assembles the engine request
    /// and relays the engine's results verbatim. An empty result list turns
    /// into a single synthetic pass; a missing engine or an unavailable
    /// bundle turns into a single synthetic failure.
    pub async fn evaluate_rules(
        &self,
        certificate: &EuHealthCert,
        meta: &VerificationMeta,
        country: &str,
    ) -> Vec<RuleResult> {
        let now = self.clock.now();

        let engine = match &self.rules_engine {
            Some(engine) => engine,
            None => return vec![RuleResult::unavailable()],
        };
        let rules = match self.business_rules.bundle(now).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!(error = %e, "business rules unavailable");
                return vec![RuleResult::unavailable()];
            }
        };
        let value_sets = match self.value_sets.bundle(now).await {
            Ok(value_sets) => value_sets,
            Err(e) => {
                tracing::warn!(error = %e, "value sets unavailable");
                return vec![RuleResult::unavailable()];
            }
        };
        let certificate_json = match serde_json::to_value(certificate) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "certificate does not serialize");
                return vec![RuleResult::unavailable()];
            }
        };

        let request = RuleEvaluationRequest {
            certificate: certificate_json,
            rules: rules.rules.clone(),
            filter: RuleFilter {
                country: country.to_string(),
                certificate_type: certificate.certificate_type(),
            },
            external: ExternalParameters {
                validation_clock: now,
                value_sets: value_sets.flatten(),
                issued_at: meta.issued_at,
                expires_at: meta.expires_at,
            },
        };

        let results = engine.evaluate(&request);
        if results.is_empty() {
            vec![RuleResult::no_rules_applied()]
        } else {
            results
        }
    }

    /// Forces a trust list refresh.
    pub async fn update_trust_list(&self) -> Result<(), VerificationError> {
        self.trust_list
            .update(self.clock.now())
            .await
            .map_err(|e| VerificationError::TrustServiceError(e.to_string()))
    }

    /// Forces a business rules refresh.
    pub async fn update_business_rules(&self) -> Result<(), VerificationError> {
        self.business_rules
            .update(self.clock.now())
            .await
            .map_err(|e| VerificationError::TrustServiceError(e.to_string()))
    }

    /// Forces a value sets refresh.
    pub async fn update_value_sets(&self) -> Result<(), VerificationError> {
        self.value_sets
            .update(self.clock.now())
            .await
            .map_err(|e| VerificationError::TrustServiceError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_invariant_holds() {
        let failure = VerificationVerdict::failure(VerificationError::UserCancelled);
        assert!(!failure.valid());
        assert!(failure.error().is_some());
        assert!(failure.meta().is_none());
        assert!(failure.certificate().is_none());
    }

    #[tokio::test]
    async fn missing_prefix_short_circuits() {
        let verifier = CertificateVerifier::builder()
            .fetcher(Arc::new(crate::StaticFetcher::new()))
            .build();
        let verdict = verifier.verify("NCFOXN%TS3DH").await;
        assert!(!verdict.valid());
        assert!(matches!(
            verdict.error(),
            Some(VerificationError::InvalidSchemePrefix)
        ));
    }

    #[tokio::test]
    async fn rules_without_engine_fail_closed() {
        use crate::hcert::{CertificateEntries, PersonName};

        let verifier = CertificateVerifier::builder()
            .fetcher(Arc::new(crate::StaticFetcher::new()))
            .build();
        let certificate = EuHealthCert {
            version: "1.3.0".to_string(),
            name: PersonName {
                forename: Some("Gabriele".to_string()),
                surname: Some("Musterfrau".to_string()),
                forename_standard: None,
                surname_standard: Some("MUSTERFRAU".to_string()),
            },
            date_of_birth: "1998-02-26".to_string(),
            entries: CertificateEntries::Recovery(vec![crate::Recovery {
                targeted_disease: "840539006".to_string(),
                result_date: "2021-01-10".to_string(),
                country: "AT".to_string(),
                issuer: "BMSGPK".to_string(),
                valid_from: "2021-01-25".to_string(),
                valid_until: "2021-07-10".to_string(),
                id: "URN:UVCI:01:AT:1".to_string(),
            }]),
        };
        let meta = VerificationMeta {
            issuer: Some("AT".to_string()),
            issued_at: Some(0),
            expires_at: None,
        };

        let results = verifier.evaluate_rules(&certificate, &meta, "AT").await;
        assert_eq!(results, vec![RuleResult::unavailable()]);
    }
}
