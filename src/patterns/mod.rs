//! Immutable, versioned tables of weighted detection rules.
//!
//! Every guard stage matches against tables owned by a [`PatternCatalog`]:
//! threat patterns for the input guard, removal patterns for the document
//! sanitizer, trust signals for the trust scorer, and sensitive-data
//! matchers for the output guard. The catalog is compiled once at startup
//! and never mutates afterwards, so it can be shared across concurrent
//! requests without locking.

mod builtin;

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use builtin::CATALOG_VERSION;

/// Broad classification of the adversarial technique a threat pattern targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    InstructionOverride,
    Roleplay,
    Jailbreak,
    PromptInjection,
    DataExtraction,
}

impl ThreatCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstructionOverride => "instruction_override",
            Self::Roleplay => "roleplay",
            Self::Jailbreak => "jailbreak",
            Self::PromptInjection => "prompt_injection",
            Self::DataExtraction => "data_extraction",
        }
    }

    /// Human-readable reason reported to the caller when this category blocks.
    pub fn block_reason(self) -> &'static str {
        match self {
            Self::InstructionOverride => "Attempt to override system instructions detected",
            Self::Roleplay => "Role-play manipulation attempt detected",
            Self::Jailbreak => "Jailbreak attempt detected",
            Self::PromptInjection => "Prompt injection attempt detected",
            Self::DataExtraction => "Data extraction attempt detected",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensitive-data family recognized by the output guard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveCategory {
    Email,
    Phone,
    NationalId,
    PaymentCard,
    ApiKey,
    CloudCredential,
    PrivateKey,
    InternalIp,
}

impl SensitiveCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::NationalId => "national_id",
            Self::PaymentCard => "payment_card",
            Self::ApiKey => "api_key",
            Self::CloudCredential => "cloud_credential",
            Self::PrivateKey => "private_key",
            Self::InternalIp => "internal_ip",
        }
    }

    /// Fixed replacement marker written in place of a redacted span.
    ///
    /// Markers contain no digits or `@`, so no sensitive matcher can ever
    /// re-match a marker. That keeps redaction idempotent.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Email => "[EMAIL REDACTED]",
            Self::Phone => "[PHONE REDACTED]",
            Self::NationalId => "[NATIONAL_ID REDACTED]",
            Self::PaymentCard => "[CARD REDACTED]",
            Self::ApiKey => "[API_KEY REDACTED]",
            Self::CloudCredential => "[CLOUD_KEY REDACTED]",
            Self::PrivateKey => "[PRIVATE_KEY REDACTED]",
            Self::InternalIp => "[INTERNAL_IP REDACTED]",
        }
    }
}

impl fmt::Display for SensitiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single weighted threat detection rule. Immutable after catalog load.
#[derive(Debug)]
pub struct ThreatPattern {
    pub matcher: Regex,
    /// Severity weight in `(0, 1]`.
    pub weight: f64,
    pub category: ThreatCategory,
}

/// A span-removal rule used by the document sanitizer.
#[derive(Debug)]
pub struct RemovalPattern {
    pub matcher: Regex,
    /// Short snake_case label recorded against removed spans.
    pub label: &'static str,
}

/// A presence-based labeled matcher. Not weighted: any hit applies the
/// consulting stage's fixed effect (trust penalty, flag, block).
#[derive(Debug)]
pub struct Signal {
    pub matcher: Regex,
    pub label: &'static str,
}

/// A sensitive-data matcher applied to generated answers.
#[derive(Debug)]
pub struct SensitivePattern {
    pub matcher: Regex,
    pub category: SensitiveCategory,
}

/// The compiled rule tables shared by all guard stages.
#[derive(Debug)]
pub struct PatternCatalog {
    version: &'static str,
    threat: Vec<ThreatPattern>,
    removal: Vec<RemovalPattern>,
    suspicious: Vec<Signal>,
    system_markers: Vec<Signal>,
    structure: Vec<Signal>,
    sensitive: Vec<SensitivePattern>,
    harmful: Vec<Signal>,
    manipulation: Vec<Signal>,
}

static BUILTIN: LazyLock<Arc<PatternCatalog>> =
    LazyLock::new(|| Arc::new(builtin::compile()));

impl PatternCatalog {
    /// The built-in catalog, compiled on first use and shared for the
    /// process lifetime.
    pub fn builtin() -> Arc<PatternCatalog> {
        Arc::clone(&BUILTIN)
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn threat_patterns(&self) -> &[ThreatPattern] {
        &self.threat
    }

    pub fn removal_patterns(&self) -> &[RemovalPattern] {
        &self.removal
    }

    pub fn suspicious_signals(&self) -> &[Signal] {
        &self.suspicious
    }

    pub fn system_marker_signals(&self) -> &[Signal] {
        &self.system_markers
    }

    pub fn structure_signals(&self) -> &[Signal] {
        &self.structure
    }

    pub fn sensitive_patterns(&self) -> &[SensitivePattern] {
        &self.sensitive
    }

    pub fn harmful_signals(&self) -> &[Signal] {
        &self.harmful
    }

    pub fn manipulation_signals(&self) -> &[Signal] {
        &self.manipulation
    }
}
