//! The five guard stages.
//!
//! Each guard is a pure, synchronous transformation over text: no I/O, no
//! shared mutable state, safe to run from any number of concurrent
//! requests. Side effects (event logging) belong to the pipeline, which
//! inspects each guard's returned result.

pub mod input;
pub mod output;
pub mod prompt_lock;
pub mod sanitizer;
pub mod trust;

pub use input::{Decision, InputGuard, ThreatAssessment};
pub use output::{OutputGuard, Redaction, RedactionResult};
pub use prompt_lock::{
    BuiltPrompt, SystemPromptLock, GUARDED_SYSTEM_PROMPT, UNGUARDED_SYSTEM_PROMPT,
};
pub use sanitizer::{DocumentSanitizer, RemovedSpan, SanitizationResult};
pub use trust::{BudgetTier, ContextBudget, TrustFactors, TrustScore, TrustScorer};
