#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::cast_precision_loss
)]

//! Security guardrails for retrieval-augmented generation.
//!
//! A multi-stage policy pipeline between a user query, a retrieval step
//! over ingested documents, and a text-generation backend. The guarded
//! path detects and neutralizes instruction override, persona hijacking,
//! jailbreak phrasing, prompt injection via retrieved content, and
//! sensitive-data leakage in generated answers; the unguarded path skips
//! every check, for side-by-side comparison.

pub mod audit;
pub mod config;
pub mod error;
pub mod guards;
pub mod patterns;
pub mod pipeline;

pub use audit::{EventType, GuardrailEvent, LogSummary, SecurityLog};
pub use config::GuardrailConfig;
pub use error::{GuardrailError, Result};
pub use guards::{
    DocumentSanitizer, InputGuard, OutputGuard, SystemPromptLock, TrustScorer,
};
pub use patterns::PatternCatalog;
pub use pipeline::{
    ChatRequest, ChatResult, DocumentStore, Generator, GuardrailPipeline, IngestedChunk,
    RetrievedChunk, Retriever, SourceRef,
};
