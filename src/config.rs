//! Construction-time configuration: endpoints, anchors and policy knobs.

/// Default endpoint serving the trust list content.
pub const TRUST_LIST_URL: &str = "https://dgc-trust.qr.gv.at/trustlist";
/// Default endpoint serving the trust list signature object.
pub const TRUST_LIST_SIGNATURE_URL: &str = "https://dgc-trust.qr.gv.at/trustlistsig";
/// Default endpoint serving the business rules content.
pub const BUSINESS_RULES_URL: &str = "https://dgc-trust.qr.gv.at/rules";
/// Default endpoint serving the business rules signature object.
pub const BUSINESS_RULES_SIGNATURE_URL: &str = "https://dgc-trust.qr.gv.at/rulessig";
/// Default endpoint serving the value sets content.
pub const VALUE_SETS_URL: &str = "https://dgc-trust.qr.gv.at/valuesets";
/// Default endpoint serving the value sets signature object.
pub const VALUE_SETS_SIGNATURE_URL: &str = "https://dgc-trust.qr.gv.at/valuesetssig";

/// Where a signed bundle is fetched from and which anchor vouches for it.
///
/// The anchor is a base64 string holding either a DER X509 leaf certificate
/// or raw public key bytes. The compiled-in default is empty: refreshes
/// fail with a configuration cause until the operator anchor for the chosen
/// endpoints is supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// URL of the bundle content.
    pub url: String,
    /// URL of the companion signature object.
    pub signature_url: String,
    /// Base64 trust anchor used to verify the signature object.
    pub anchor: String,
}

impl ConnectionOptions {
    /// Options for the trust list store.
    pub fn trust_list() -> Self {
        Self {
            url: TRUST_LIST_URL.to_string(),
            signature_url: TRUST_LIST_SIGNATURE_URL.to_string(),
            anchor: String::new(),
        }
    }

    /// Options for the business rules store.
    pub fn business_rules() -> Self {
        Self {
            url: BUSINESS_RULES_URL.to_string(),
            signature_url: BUSINESS_RULES_SIGNATURE_URL.to_string(),
            anchor: String::new(),
        }
    }

    /// Options for the value sets store.
    pub fn value_sets() -> Self {
        Self {
            url: VALUE_SETS_URL.to_string(),
            signature_url: VALUE_SETS_SIGNATURE_URL.to_string(),
            anchor: String::new(),
        }
    }
}

/// Tunable strictness of the verification pipeline.
///
/// Both knobs correspond to behaviors the upstream ecosystem leaves open;
/// the defaults are the strict reading for certificate time and the lenient
/// reading for trust service availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// When `true` a certificate whose `issued-at` lies in the future is
    /// rejected with `CwtExpired`.
    pub require_issued_at_in_past: bool,
    /// When `true` a verification that cannot obtain any trust list (no
    /// cache, refresh failed) reports `TrustServiceError` instead of
    /// looking up against an empty list and reporting
    /// `KeyNotInTrustList`.
    pub fail_verification_on_refresh_error: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            require_issued_at_in_past: true,
            fail_verification_on_refresh_error: false,
        }
    }
}
