use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::CertificateType;

/// A country business rule in the EU CertLogic exchange format.
///
/// Only the fields the orchestration consumes are modeled; the `Logic`
/// tree is relayed to the engine untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BusinessRule {
    /// Rule identifier, e.g. `VR-IT-0001`.
    #[serde(rename = "Identifier")]
    pub identifier: String,
    /// Acceptance or invalidation rule.
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    /// The country the rule belongs to.
    #[serde(rename = "Country")]
    pub country: String,
    /// Rule version.
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Which certificate type the rule applies to; `General` or absent
    /// means all of them.
    #[serde(
        rename = "CertificateType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_type: Option<String>,
    /// ISO 8601 instant from which the rule applies.
    #[serde(rename = "ValidFrom", default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    /// ISO 8601 instant up to which the rule applies.
    #[serde(rename = "ValidTo", default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    /// Human readable descriptions keyed by language.
    #[serde(
        rename = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<serde_json::Value>,
    /// The CertLogic expression, relayed verbatim to the engine.
    #[serde(rename = "Logic")]
    pub logic: serde_json::Value,
}

/// The signed business-rules bundle: a window plus the rule list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BusinessRules {
    /// POSIX seconds from which the bundle may be used.
    #[serde(rename = "f")]
    pub valid_from: u64,
    /// POSIX seconds up to which the bundle may be used.
    #[serde(rename = "u")]
    pub valid_until: u64,
    /// The rules, in document order.
    #[serde(rename = "r")]
    pub rules: Vec<BusinessRule>,
}

/// Outcome of a single rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The certificate satisfies the rule.
    Passed,
    /// The certificate violates the rule, or the rules could not be
    /// evaluated at all.
    Failed,
}

/// One element of the list returned by [`evaluate_rules`].
///
/// [`evaluate_rules`]: crate::CertificateVerifier::evaluate_rules
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    /// The rule that produced this result; `None` for synthetic results.
    pub identifier: Option<String>,
    /// Pass or fail.
    pub outcome: RuleOutcome,
    /// Optional human readable detail.
    pub description: Option<String>,
}

impl RuleResult {
    /// A pass for the given rule.
    pub fn passed(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            outcome: RuleOutcome::Passed,
            description: None,
        }
    }

    /// A failure for the given rule.
    pub fn failed(identifier: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            outcome: RuleOutcome::Failed,
            description: None,
        }
    }

    /// The synthetic single pass emitted when no rule applies.
    pub fn no_rules_applied() -> Self {
        Self {
            identifier: None,
            outcome: RuleOutcome::Passed,
            description: None,
        }
    }

    /// The synthetic single failure emitted when rules or value sets are
    /// unavailable. An offline device without rules must not silently pass.
    pub fn unavailable() -> Self {
        Self {
            identifier: None,
            outcome: RuleOutcome::Failed,
            description: None,
        }
    }

    /// Whether the outcome is a pass.
    pub fn is_passed(&self) -> bool {
        self.outcome == RuleOutcome::Passed
    }
}

/// The filter half of an evaluation request: which rules apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFilter {
    /// Country whose rules should run, ISO 3166 alpha-2.
    pub country: String,
    /// The type of the certificate under evaluation.
    pub certificate_type: CertificateType,
}

/// The external data half of an evaluation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalParameters {
    /// The instant at which validity is being decided.
    pub validation_clock: u64,
    /// Flattened value sets, `name -> codes`.
    pub value_sets: HashMap<String, Vec<String>>,
    /// The CWT issued-at claim, if present.
    pub issued_at: Option<u64>,
    /// The CWT expiration claim, if present.
    pub expires_at: Option<u64>,
}

/// Everything a rules engine needs for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluationRequest {
    /// The certificate serialized to the JSON shape of the DCC schema.
    pub certificate: serde_json::Value,
    /// The full rule list from the current bundle; the engine applies the
    /// filter.
    pub rules: Vec<BusinessRule>,
    /// Which rules apply.
    pub filter: RuleFilter,
    /// External evaluation data.
    pub external: ExternalParameters,
}

/// The pre-existing CertLogic evaluation component.
///
/// The core never interprets rule logic itself; it assembles the request
/// and relays the engine's results verbatim.
pub trait RulesEngine: Send + Sync {
    /// Evaluates the applicable rules and returns one result per rule.
    fn evaluate(&self, request: &RuleEvaluationRequest) -> Vec<RuleResult>;
}
