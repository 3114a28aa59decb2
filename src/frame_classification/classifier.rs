//! Frame-header classification.
//!
//! The classifier decides, per received chunk, whether the leading bytes match
//! one of the active rule's header patterns for that connection. A match means
//! the chunk is high-volume telemetry destined for the capture log rather than
//! live display. Patterns are configured as hex strings and decoded to bytes
//! once, at rule-compile time; the per-packet path only compares slices.

use log::debug;
use regex::Regex;

use crate::configuration::types::{FrameHeaderRule, RuleTarget};
use crate::error_handling::types::ValidationError;

/// Outcome of [`validate_rule`]: every violation found, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

/// A [`FrameHeaderRule`] with its hex patterns decoded and its composite
/// connection id resolved, ready for per-packet evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub target: RuleTarget,
    pub enabled: bool,
    patterns: Vec<Vec<u8>>,
}

impl CompiledRule {
    pub fn compile(rule: &FrameHeaderRule) -> Result<CompiledRule, Vec<ValidationError>> {
        let report = validate_rule(rule);
        if !report.is_valid {
            return Err(report.errors);
        }
        let patterns = rule.header_patterns.iter().map(|p| decode_hex(p)).collect();
        Ok(CompiledRule {
            id: rule.id.clone(),
            target: RuleTarget::parse(&rule.connection_id),
            enabled: rule.enabled,
            patterns,
        })
    }

    pub fn matches(&self, connection_id: &str, data: &[u8]) -> bool {
        self.enabled
            && self.target.connection_id == connection_id
            && self.patterns.iter().any(|p| data.starts_with(p))
    }
}

/// Stateless rule evaluator. Holds the single system-wide active rule; the
/// match loop iterates a slice so growing to a rule list is a container
/// change, not a logic change.
#[derive(Debug, Default)]
pub struct FrameClassifier {
    rule: Option<CompiledRule>,
}

impl FrameClassifier {
    pub fn new() -> Self {
        Self { rule: None }
    }

    pub fn with_rule(rule: Option<CompiledRule>) -> Self {
        Self { rule }
    }

    pub fn set_rule(&mut self, rule: Option<CompiledRule>) {
        match &rule {
            Some(r) => debug!("Classifier rule set: '{}' -> '{}'", r.id, r.target.connection_id),
            None => debug!("Classifier rule cleared"),
        }
        self.rule = rule;
    }

    pub fn active_rule(&self) -> Option<&CompiledRule> {
        self.rule.as_ref()
    }

    pub fn match_frame(&self, connection_id: &str, data: &[u8]) -> Option<&CompiledRule> {
        self.rules().iter().find(|r| r.matches(connection_id, data))
    }

    fn rules(&self) -> &[CompiledRule] {
        self.rule.as_slice()
    }
}

/// Collects all violations: empty connection id, empty pattern list, and per
/// pattern empty string / odd hex length / non-hex characters.
pub fn validate_rule(rule: &FrameHeaderRule) -> ValidationReport {
    let mut errors = Vec::new();

    if rule.connection_id.trim().is_empty() {
        errors.push(ValidationError::EmptyConnectionId);
    }
    if rule.header_patterns.is_empty() {
        errors.push(ValidationError::EmptyPatternList);
    }

    let hex = Regex::new(r"^[0-9A-Fa-f]+$").unwrap();
    for (i, pattern) in rule.header_patterns.iter().enumerate() {
        if pattern.is_empty() {
            errors.push(ValidationError::EmptyPattern(i));
            continue;
        }
        if pattern.len() % 2 != 0 {
            errors.push(ValidationError::OddPatternLength(i, pattern.clone()));
        }
        if !hex.is_match(pattern) {
            errors.push(ValidationError::NonHexPattern(i, pattern.clone()));
        }
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
    }
}

// Assumes the pattern already passed validation.
fn decode_hex(pattern: &str) -> Vec<u8> {
    pattern
        .as_bytes()
        .chunks(2)
        .filter_map(|pair| {
            let s = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(s, 16).ok()
        })
        .collect()
}
