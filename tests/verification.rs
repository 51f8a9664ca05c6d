//! End-to-end scenarios: a conformant encoder producing signed `HC1:`
//! strings and signed trust bundles, verified through the full pipeline
//! with in-memory network, storage and clock.

use std::io::Write;
use std::sync::Arc;

use ciborium::ser::into_writer;
use ciborium::value::Value;
use flate2::write::GzEncoder;
use flate2::Compression;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use rstest::rstest;

use hcert::{
    CertificateEntries, CertificateType, CertificateVerifier, ConnectionOptions, EuHealthCert,
    FixedClock, KeyUsage, PersonName, RuleEvaluationRequest, RuleResult, RulesEngine,
    StaticFetcher, TrustEntry, TrustList, Vaccination, ValidationPolicy, VerificationError,
};

const NOW: u64 = 1_650_000_000;
const ISSUED_AT: u64 = NOW - 86_400;
const EXPIRES_AT: u64 = NOW + 86_400;
const KID: [u8; 8] = [0x39, 0x30, 0x17, 0x68, 0xcd, 0xda, 0x05, 0x13];

const TRUST_LIST_URL: &str = "https://trust.test/trustlist";
const TRUST_LIST_SIG_URL: &str = "https://trust.test/trustlistsig";
const RULES_URL: &str = "https://trust.test/rules";
const RULES_SIG_URL: &str = "https://trust.test/rulessig";
const VALUE_SETS_URL: &str = "https://trust.test/valuesets";
const VALUE_SETS_SIG_URL: &str = "https://trust.test/valuesetssig";

fn keypair() -> EcdsaKeyPair {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
    EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref()).unwrap()
}

fn sample_certificate() -> EuHealthCert {
    EuHealthCert {
        version: "1.2.1".to_string(),
        name: PersonName {
            forename: Some("Gabriele".to_string()),
            surname: Some("Musterfrau-Gößinger".to_string()),
            forename_standard: Some("GABRIELE".to_string()),
            surname_standard: Some("MUSTERFRAU<GOESSINGER".to_string()),
        },
        date_of_birth: "1998-02-26".to_string(),
        entries: CertificateEntries::Vaccination(vec![Vaccination {
            targeted_disease: "840539006".to_string(),
            vaccine_prophylaxis: "1119349007".to_string(),
            medicinal_product: "EU/1/20/1528".to_string(),
            manufacturer: "ORG-100030215".to_string(),
            dose_number: 1,
            total_doses: 2,
            date: "2021-02-18".to_string(),
            country: "AT".to_string(),
            issuer: "Ministry of Health, Austria".to_string(),
            id: "URN:UVCI:01:AT:10807843F94AEE0EE5093FBC254BD813#B".to_string(),
        }]),
    }
}

/// Encodes and signs a certificate into a full `HC1:` string.
///
/// `alg` is the COSE label written into the protected header; the signature
/// itself is always ES256 over the canonical Sig_structure.
fn encode_certificate(
    signer: &EcdsaKeyPair,
    kid: &[u8],
    issued_at: u64,
    expires_at: u64,
    certificate: &EuHealthCert,
    alg: i64,
) -> String {
    let mut cert_cbor = Vec::new();
    into_writer(certificate, &mut cert_cbor).unwrap();
    let cert_value: Value = ciborium::de::from_reader(cert_cbor.as_slice()).unwrap();

    let claims = Value::Map(vec![
        (Value::Integer(1.into()), Value::Text("AT".into())),
        (Value::Integer(4.into()), Value::Integer(expires_at.into())),
        (Value::Integer(6.into()), Value::Integer(issued_at.into())),
        (
            Value::Integer((-260).into()),
            Value::Map(vec![(Value::Integer(1.into()), cert_value)]),
        ),
    ]);
    let mut payload = Vec::new();
    into_writer(&claims, &mut payload).unwrap();

    let mut protected = Vec::new();
    into_writer(
        &Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(alg.into())),
            (Value::Integer(4.into()), Value::Bytes(kid.to_vec())),
        ]),
        &mut protected,
    )
    .unwrap();

    let mut sig_structure = Vec::new();
    into_writer(
        &Value::Array(vec![
            Value::Text("Signature1".into()),
            Value::Bytes(protected.clone()),
            Value::Bytes(vec![]),
            Value::Bytes(payload.clone()),
        ]),
        &mut sig_structure,
    )
    .unwrap();
    let rng = SystemRandom::new();
    let signature = signer.sign(&rng, &sig_structure).unwrap();

    let mut cose = Vec::new();
    into_writer(
        &Value::Tag(
            18,
            Box::new(Value::Array(vec![
                Value::Bytes(protected),
                Value::Map(vec![]),
                Value::Bytes(payload),
                Value::Bytes(signature.as_ref().to_vec()),
            ])),
        ),
        &mut cose,
    )
    .unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&cose).unwrap();
    let compressed = encoder.finish().unwrap();

    format!("HC1:{}", base45::encode(&compressed))
}

/// Signs bundle content into a detached COSE_Sign1 signature object.
fn sign_bundle(anchor: &EcdsaKeyPair, content: &[u8]) -> Vec<u8> {
    let mut protected = Vec::new();
    into_writer(
        &Value::Map(vec![(
            Value::Integer(1.into()),
            Value::Integer((-7).into()),
        )]),
        &mut protected,
    )
    .unwrap();

    let mut sig_structure = Vec::new();
    into_writer(
        &Value::Array(vec![
            Value::Text("Signature1".into()),
            Value::Bytes(protected.clone()),
            Value::Bytes(vec![]),
            Value::Bytes(content.to_vec()),
        ]),
        &mut sig_structure,
    )
    .unwrap();
    let rng = SystemRandom::new();
    let signature = anchor.sign(&rng, &sig_structure).unwrap();

    let mut encoded = Vec::new();
    into_writer(
        &Value::Tag(
            18,
            Box::new(Value::Array(vec![
                Value::Bytes(protected),
                Value::Map(vec![]),
                Value::Null,
                Value::Bytes(signature.as_ref().to_vec()),
            ])),
        ),
        &mut encoded,
    )
    .unwrap();
    encoded
}

fn trust_list_with(entries: Vec<TrustEntry>) -> TrustList {
    TrustList {
        valid_from: NOW - 3600,
        valid_until: NOW + 3600,
        entries,
    }
}

fn signer_entry(signer: &EcdsaKeyPair, usage: KeyUsage) -> TrustEntry {
    TrustEntry {
        kid: KID.to_vec(),
        not_before: NOW - 3600,
        not_after: NOW + 3600,
        usage,
        key: signer.public_key().as_ref().to_vec(),
    }
}

struct TestBed {
    fetcher: Arc<StaticFetcher>,
    anchor: EcdsaKeyPair,
    clock: Arc<FixedClock>,
}

impl TestBed {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        Self {
            fetcher: Arc::new(StaticFetcher::new()),
            anchor: keypair(),
            clock: Arc::new(FixedClock::new(NOW)),
        }
    }

    fn serve_trust_list(&self, list: &TrustList) {
        let content = list.to_cbor();
        let signature = sign_bundle(&self.anchor, &content);
        self.fetcher.insert(TRUST_LIST_URL, content);
        self.fetcher.insert(TRUST_LIST_SIG_URL, signature);
    }

    fn serve_bundle(&self, url: &str, sig_url: &str, content: Vec<u8>) {
        let signature = sign_bundle(&self.anchor, &content);
        self.fetcher.insert(url, content);
        self.fetcher.insert(sig_url, signature);
    }

    fn options(&self, url: &str, sig_url: &str) -> ConnectionOptions {
        ConnectionOptions {
            url: url.to_string(),
            signature_url: sig_url.to_string(),
            anchor: base64::encode(self.anchor.public_key().as_ref()),
        }
    }

    fn builder(&self) -> hcert::VerifierBuilder {
        CertificateVerifier::builder()
            .trust_list(self.options(TRUST_LIST_URL, TRUST_LIST_SIG_URL))
            .business_rules(self.options(RULES_URL, RULES_SIG_URL))
            .value_sets(self.options(VALUE_SETS_URL, VALUE_SETS_SIG_URL))
            .fetcher(self.fetcher.clone())
            .clock(self.clock.clone())
    }

    fn verifier(&self) -> CertificateVerifier {
        self.builder().build()
    }
}

#[tokio::test]
async fn a_trusted_certificate_verifies() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = bed.verifier().verify(&encoded).await;

    assert!(verdict.valid(), "unexpected error: {:?}", verdict.error());
    assert!(verdict.error().is_none());

    let meta = verdict.meta().unwrap();
    assert_eq!(meta.issuer.as_deref(), Some("AT"));
    assert_eq!(meta.issued_at, Some(ISSUED_AT));
    assert_eq!(meta.expires_at, Some(EXPIRES_AT));

    let certificate = verdict.certificate().unwrap();
    assert_eq!(certificate.certificate_type(), CertificateType::Vaccination);
    assert_eq!(certificate.date_of_birth, "1998-02-26");
}

#[tokio::test]
async fn a_missing_prefix_is_rejected_up_front() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let body = encoded.strip_prefix("HC1:").unwrap();

    for prefix in ["", "hc1:", "LT1:"] {
        let verdict = bed.verifier().verify(&format!("{prefix}{body}")).await;
        assert!(!verdict.valid());
        assert!(matches!(
            verdict.error(),
            Some(VerificationError::InvalidSchemePrefix)
        ));
        assert!(verdict.meta().is_none());
        assert!(verdict.certificate().is_none());
    }
}

#[rstest]
#[case::empty("")]
#[case::truncated("HC1")]
#[case::wrong_scheme("LT1:6BFOXN")]
#[case::not_base45("HC1:abcdef")]
fn malformed_inputs_fail_the_decode_helper(#[case] input: &str) {
    assert!(hcert::decode(input).is_err());
}

#[tokio::test]
async fn a_tampered_body_never_verifies() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));

    let mut encoded = encode_certificate(
        &signer,
        &KID,
        ISSUED_AT,
        EXPIRES_AT,
        &sample_certificate(),
        -7,
    );
    // flip the last character of the base45 body to another alphabet char
    let last = encoded.pop().unwrap();
    encoded.push(if last == 'A' { 'B' } else { 'A' });

    let verdict = bed.verifier().verify(&encoded).await;
    assert!(!verdict.valid());
    // the mutation either breaks a decode stage or survives framing and
    // lands in the signed bytes; both outcomes reject the certificate
    assert!(
        matches!(
            verdict.error(),
            Some(
                VerificationError::SignatureInvalid
                    | VerificationError::Base45DecodingFailed(_)
                    | VerificationError::DecompressionFailed(_)
                    | VerificationError::CoseDeserializationFailed(_)
                    | VerificationError::CborDeserializationFailed(_)
            )
        ),
        "unexpected error: {:?}",
        verdict.error()
    );
}

#[tokio::test]
async fn an_expired_certificate_still_surfaces_its_content() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));
    bed.clock.set(EXPIRES_AT + 1);

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = bed.verifier().verify(&encoded).await;

    assert!(!verdict.valid());
    assert!(matches!(verdict.error(), Some(VerificationError::CwtExpired)));
    assert_eq!(verdict.meta().unwrap().expires_at, Some(EXPIRES_AT));
    assert!(verdict.certificate().is_some());
}

#[tokio::test]
async fn a_certificate_issued_in_the_future_is_rejected_by_default() {
    let bed = TestBed::new();
    let signer = keypair();
    // the list and its entry must already be usable at the early instant
    let mut entry = signer_entry(&signer, KeyUsage::all());
    entry.not_before = 0;
    bed.serve_trust_list(&TrustList {
        valid_from: 0,
        valid_until: NOW + 3600,
        entries: vec![entry],
    });
    bed.clock.set(ISSUED_AT - 10);

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = bed.verifier().verify(&encoded).await;
    assert!(matches!(verdict.error(), Some(VerificationError::CwtExpired)));

    // the lenient policy only bounds the upper end of the window
    let lenient = bed
        .builder()
        .policy(ValidationPolicy {
            require_issued_at_in_past: false,
            fail_verification_on_refresh_error: false,
        })
        .build();
    let verdict = lenient.verify(&encoded).await;
    assert!(verdict.valid(), "unexpected error: {:?}", verdict.error());
}

#[tokio::test]
async fn an_unknown_issuer_is_rejected() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![]));

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = bed.verifier().verify(&encoded).await;

    assert!(!verdict.valid());
    assert!(matches!(
        verdict.error(),
        Some(VerificationError::KeyNotInTrustList(kid)) if kid.as_slice() == KID
    ));
    assert!(verdict.certificate().is_some());
}

#[tokio::test]
async fn a_key_limited_to_tests_may_not_sign_vaccinations() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(
        &signer,
        KeyUsage::only(CertificateType::Test),
    )]));

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = bed.verifier().verify(&encoded).await;

    assert!(matches!(
        verdict.error(),
        Some(VerificationError::UnsuitablePublicKeyType)
    ));
}

#[tokio::test]
async fn an_unsupported_algorithm_is_a_signature_failure() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));

    // ES384 (-35) is not honored even with a trusted key
    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -35);
    let verdict = bed.verifier().verify(&encoded).await;

    assert!(matches!(
        verdict.error(),
        Some(VerificationError::SignatureInvalid)
    ));
    assert!(verdict.certificate().is_some());
}

#[tokio::test]
async fn a_wrong_key_is_a_signature_failure() {
    let bed = TestBed::new();
    let signer = keypair();
    let other = keypair();
    // the trust list maps the kid to a different key
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&other, KeyUsage::all())]));

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = bed.verifier().verify(&encoded).await;

    assert!(matches!(
        verdict.error(),
        Some(VerificationError::SignatureInvalid)
    ));
}

#[tokio::test]
async fn an_unreachable_trust_service_degrades_by_policy() {
    let bed = TestBed::new();
    let signer = keypair();
    // nothing served: every refresh fails, nothing is cached

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);

    let verdict = bed.verifier().verify(&encoded).await;
    assert!(matches!(
        verdict.error(),
        Some(VerificationError::KeyNotInTrustList(_))
    ));

    let strict = bed
        .builder()
        .policy(ValidationPolicy {
            require_issued_at_in_past: true,
            fail_verification_on_refresh_error: true,
        })
        .build();
    let verdict = strict.verify(&encoded).await;
    assert!(matches!(
        verdict.error(),
        Some(VerificationError::TrustServiceError(_))
    ));
}

struct CountryFilterEngine;

impl RulesEngine for CountryFilterEngine {
    fn evaluate(&self, request: &RuleEvaluationRequest) -> Vec<RuleResult> {
        request
            .rules
            .iter()
            .filter(|rule| rule.country == request.filter.country)
            .map(|rule| RuleResult::passed(rule.identifier.clone()))
            .collect()
    }
}

fn rules_bundle_cbor() -> Vec<u8> {
    use serde_json::json;

    let bundle = hcert::BusinessRules {
        valid_from: NOW - 3600,
        valid_until: NOW + 3600,
        rules: vec![
            hcert::BusinessRule {
                identifier: "GR-AT-0001".to_string(),
                rule_type: Some("Acceptance".to_string()),
                country: "AT".to_string(),
                version: Some("1.0.0".to_string()),
                certificate_type: Some("Vaccination".to_string()),
                valid_from: None,
                valid_to: None,
                description: None,
                logic: json!({">=": [{"var": "payload.v.0.dn"}, 1]}),
            },
            hcert::BusinessRule {
                identifier: "GR-DE-0001".to_string(),
                rule_type: Some("Acceptance".to_string()),
                country: "DE".to_string(),
                version: Some("1.0.0".to_string()),
                certificate_type: None,
                valid_from: None,
                valid_to: None,
                description: None,
                logic: json!(true),
            },
        ],
    };
    let mut encoded = Vec::new();
    into_writer(&bundle, &mut encoded).unwrap();
    encoded
}

fn value_sets_cbor() -> Vec<u8> {
    let sets = hcert::ValueSets {
        valid_from: NOW - 3600,
        valid_until: NOW + 3600,
        sets: Default::default(),
    };
    let mut encoded = Vec::new();
    into_writer(&sets, &mut encoded).unwrap();
    encoded
}

#[tokio::test]
async fn business_rules_run_against_the_decoded_certificate() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));
    bed.serve_bundle(RULES_URL, RULES_SIG_URL, rules_bundle_cbor());
    bed.serve_bundle(VALUE_SETS_URL, VALUE_SETS_SIG_URL, value_sets_cbor());

    let verifier = bed.builder().rules_engine(Arc::new(CountryFilterEngine)).build();

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = verifier.verify(&encoded).await;
    assert!(verdict.valid());

    let results = verifier
        .evaluate_rules(
            verdict.certificate().unwrap(),
            verdict.meta().unwrap(),
            "AT",
        )
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].identifier.as_deref(), Some("GR-AT-0001"));
    assert!(results[0].is_passed());

    // no rule matches this country: a single synthetic pass
    let results = verifier
        .evaluate_rules(
            verdict.certificate().unwrap(),
            verdict.meta().unwrap(),
            "FR",
        )
        .await;
    assert_eq!(results, vec![RuleResult::no_rules_applied()]);
}

#[tokio::test]
async fn unavailable_rules_fail_closed() {
    let bed = TestBed::new();
    let signer = keypair();
    bed.serve_trust_list(&trust_list_with(vec![signer_entry(&signer, KeyUsage::all())]));
    // rules and value sets are not served

    let verifier = bed.builder().rules_engine(Arc::new(CountryFilterEngine)).build();

    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);
    let verdict = verifier.verify(&encoded).await;
    assert!(verdict.valid());

    let results = verifier
        .evaluate_rules(
            verdict.certificate().unwrap(),
            verdict.meta().unwrap(),
            "AT",
        )
        .await;
    assert_eq!(results, vec![RuleResult::unavailable()]);
}

#[tokio::test]
async fn decode_reads_a_certificate_without_any_trust() {
    let signer = keypair();
    let encoded = encode_certificate(&signer, &KID, ISSUED_AT, EXPIRES_AT, &sample_certificate(), -7);

    let cwt = hcert::decode(&encoded).unwrap();
    assert_eq!(cwt.issuer.as_deref(), Some("AT"));
    let certificate = cwt.health_cert().unwrap();
    assert_eq!(certificate.certificate_type(), CertificateType::Vaccination);
    assert_eq!(
        certificate.name.surname_standard.as_deref(),
        Some("MUSTERFRAU<GOESSINGER")
    );
}
