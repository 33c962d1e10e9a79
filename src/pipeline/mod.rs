//! Per-request orchestrator over the guard stages.
//!
//! One pipeline instance serves every request; all per-request state lives
//! on the stack of a single `chat` call. The guarded and unguarded paths
//! are two separate functions rather than a flag threaded through one, so
//! the vulnerable path stays auditable and the guarded path cannot be
//! weakened by a stray conditional.
//!
//! Stage order in guarded mode is fixed: input guard, retrieval, per-chunk
//! sanitize + trust, context budgeting, prompt lock, generation, output
//! guard. Generation output is never returned without passing through the
//! output guard.

pub mod context;
pub mod traits;

pub use context::{AssembledContext, EMPTY_CONTEXT};
pub use traits::{DocumentStore, Generator, IngestedChunk, RetrievedChunk, Retriever};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{ActionTaken, EventType, GuardrailEvent, SecurityLog};
use crate::config::GuardrailConfig;
use crate::error::{GuardrailError, Result, UpstreamStage};
use crate::guards::{
    DocumentSanitizer, InputGuard, OutputGuard, SystemPromptLock, TrustScorer,
};
use crate::patterns::PatternCatalog;

/// Returned in place of an answer when the input guard blocks.
pub const REFUSAL_ANSWER: &str =
    "I cannot process this request as it appears to contain potentially harmful instructions.";

/// Returned in place of an answer the output guard withholds.
pub const WITHHELD_ANSWER: &str =
    "I cannot provide this response as it may contain sensitive or harmful information.";

/// Source previews in chat results are capped at this many characters.
const SOURCE_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Per-request toggle; there is no process-wide guardrails switch.
    #[serde(default = "default_guardrails_enabled")]
    pub guardrails_enabled: bool,
    /// Caller-supplied system prompt. Honored unguarded, discarded guarded.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

fn default_guardrails_enabled() -> bool {
    true
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            guardrails_enabled: true,
            system_prompt: None,
            temperature: None,
            top_k: None,
        }
    }
}

/// A retrieved source as surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub file: String,
    pub chunk_index: usize,
    pub similarity: f64,
    /// Absent in unguarded mode, which never scores trust.
    pub trust: Option<f64>,
    pub preview: String,
}

/// One entry in the per-request guardrail activity trail.
#[derive(Debug, Clone, Serialize)]
pub struct GuardLogEntry {
    pub stage: &'static str,
    pub action: &'static str,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub request_id: Uuid,
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub guardrails_active: bool,
    pub blocked: bool,
    pub block_reason: Option<String>,
    pub guardrail_logs: Vec<GuardLogEntry>,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub chunks_stored: usize,
    /// How many chunks had instruction spans removed before storage.
    pub chunks_sanitized: usize,
}

/// The pipeline and its collaborators. One instance, many concurrent
/// requests.
pub struct GuardrailPipeline {
    config: GuardrailConfig,
    input_guard: InputGuard,
    sanitizer: DocumentSanitizer,
    trust_scorer: TrustScorer,
    prompt_lock: SystemPromptLock,
    output_guard: OutputGuard,
    log: Arc<SecurityLog>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    store: Arc<dyn DocumentStore>,
    /// Chat requests hold this shared across retrieval; document mutation
    /// holds it exclusive, so no request sees a half-updated store.
    store_phase: RwLock<()>,
}

impl GuardrailPipeline {
    pub fn new(
        config: GuardrailConfig,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self> {
        config.validate()?;
        let catalog = PatternCatalog::builtin();
        Ok(Self {
            input_guard: InputGuard::new(
                Arc::clone(&catalog),
                config.block_threshold,
                config.warning_threshold,
            ),
            sanitizer: DocumentSanitizer::new(Arc::clone(&catalog)),
            trust_scorer: TrustScorer::new(
                Arc::clone(&catalog),
                config.trust_threshold,
                config.context_budget_low,
                config.context_budget_high,
            ),
            prompt_lock: SystemPromptLock::new(),
            output_guard: OutputGuard::new(catalog),
            log: Arc::new(SecurityLog::new()),
            config,
            retriever,
            generator,
            store,
            store_phase: RwLock::new(()),
        })
    }

    pub fn security_log(&self) -> &Arc<SecurityLog> {
        &self.log
    }

    /// Handle one chat request on the branch its toggle selects.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResult> {
        if request.query.trim().is_empty() {
            return Err(GuardrailError::InvalidInput(
                "query must not be empty".into(),
            ));
        }
        if request.guardrails_enabled {
            self.chat_guarded(request).await
        } else {
            self.chat_unguarded(request).await
        }
    }

    async fn chat_guarded(&self, request: ChatRequest) -> Result<ChatResult> {
        let request_id = Uuid::new_v4();
        let mut trail: Vec<GuardLogEntry> = Vec::new();
        let query = request.query.trim();

        let assessment = self.input_guard.evaluate(query);
        if assessment.blocked() {
            let category = assessment.primary_category();
            self.log.append(GuardrailEvent::new(
                EventType::InputBlocked,
                query,
                assessment.combined_score,
                ActionTaken::Blocked,
                json!({
                    "reason": category.map(|c| c.block_reason()),
                    "categories": assessment.triggered_categories(),
                    "summary": assessment.summary(),
                }),
            ));
            trail.push(GuardLogEntry {
                stage: "input",
                action: "blocked",
                detail: json!({
                    "threat_level": assessment.combined_score,
                    "summary": assessment.summary(),
                }),
            });
            return Ok(ChatResult {
                request_id,
                answer: REFUSAL_ANSWER.to_string(),
                sources: Vec::new(),
                guardrails_active: true,
                blocked: true,
                block_reason: category.map(|c| c.as_str().to_string()),
                guardrail_logs: trail,
            });
        }
        if !assessment.warnings.is_empty() {
            trail.push(GuardLogEntry {
                stage: "input",
                action: "warning",
                detail: json!({ "warnings": assessment.warnings }),
            });
        }

        let chunks = {
            let _phase = self.store_phase.read().await;
            self.retrieve(query, request.top_k).await?
        };

        let mut sanitized: Vec<RetrievedChunk> = Vec::with_capacity(chunks.len());
        let mut trust_values: Vec<f64> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let result = self.sanitizer.sanitize(&chunk.text);
            if result.was_modified() {
                self.log.append(GuardrailEvent::new(
                    EventType::DocumentSanitized,
                    &chunk.source_id,
                    0.0,
                    ActionTaken::Sanitized,
                    json!({
                        "instructions_removed": result.removed_spans.len(),
                        "chunk_index": chunk.chunk_index,
                    }),
                ));
                trail.push(GuardLogEntry {
                    stage: "retrieval",
                    action: "sanitized",
                    detail: json!({
                        "source": chunk.source_id,
                        "chunk": chunk.chunk_index,
                        "spans_removed": result.removed_spans.len(),
                    }),
                });
            }
            trust_values.push(self.trust_scorer.score(&result.cleaned_text).value);
            sanitized.push(RetrievedChunk {
                text: result.cleaned_text,
                ..chunk
            });
        }

        let average_trust = if trust_values.is_empty() {
            0.5
        } else {
            trust_values.iter().sum::<f64>() / trust_values.len() as f64
        };
        let budget = self.trust_scorer.budget_for(average_trust);
        let assembled =
            context::assemble(&sanitized, budget, self.config.truncation_tolerance);
        if assembled.truncated {
            trail.push(GuardLogEntry {
                stage: "retrieval",
                action: "context_limited",
                detail: json!({
                    "budget_chars": budget.max_chars,
                    "average_trust": average_trust,
                }),
            });
        }

        let prompt = self.prompt_lock.build_guarded(
            &assembled.text,
            query,
            request.system_prompt.as_deref(),
        );
        if prompt.override_blocked {
            self.log.append(GuardrailEvent::new(
                EventType::PromptOverrideBlocked,
                request.system_prompt.as_deref().unwrap_or_default(),
                0.7,
                ActionTaken::Blocked,
                json!({ "type": "system_prompt_override" }),
            ));
            trail.push(GuardLogEntry {
                stage: "prompt",
                action: "override_blocked",
                detail: json!({ "reason": "system_prompt_locked" }),
            });
        }

        let raw_answer = self.generate(&prompt.system, &prompt.user, &request).await?;

        let redaction = self.output_guard.scan(&raw_answer);
        if redaction.had_issues() {
            let categories: Vec<&str> = redaction
                .categories()
                .into_iter()
                .map(|c| c.as_str())
                .collect();
            let detail = json!({
                "redactions": redaction.redactions.len(),
                "categories": categories,
                "harmful": redaction.harmful,
                "manipulation": redaction.manipulation_flags,
            });
            let (event_type, action) = if redaction.should_block() {
                (EventType::OutputBlocked, ActionTaken::Blocked)
            } else {
                (EventType::OutputSanitized, ActionTaken::Sanitized)
            };
            self.log.append(GuardrailEvent::new(
                event_type,
                query,
                0.0,
                action,
                detail.clone(),
            ));
            trail.push(GuardLogEntry {
                stage: "output",
                action: action.as_str(),
                detail,
            });
        }

        let answer = if redaction.should_block() {
            WITHHELD_ANSWER.to_string()
        } else {
            redaction.redacted_text
        };

        let sources = sanitized
            .iter()
            .zip(trust_values.iter())
            .map(|(chunk, trust)| SourceRef {
                file: chunk.source_id.clone(),
                chunk_index: chunk.chunk_index,
                similarity: chunk.similarity,
                trust: Some(*trust),
                preview: preview(&chunk.text),
            })
            .collect();

        Ok(ChatResult {
            request_id,
            answer,
            sources,
            guardrails_active: true,
            blocked: false,
            block_reason: None,
            guardrail_logs: trail,
        })
    }

    /// The deliberately vulnerable path: no input guard, no sanitization,
    /// no trust budgeting, no prompt lock, no output guard.
    async fn chat_unguarded(&self, request: ChatRequest) -> Result<ChatResult> {
        let request_id = Uuid::new_v4();
        let query = request.query.trim();

        let chunks = {
            let _phase = self.store_phase.read().await;
            self.retrieve(query, request.top_k).await?
        };

        let context_text = if chunks.is_empty() {
            EMPTY_CONTEXT.to_string()
        } else {
            chunks
                .iter()
                .map(|c| format!("[Source: {}, chunk {}]\n{}", c.source_id, c.chunk_index, c.text))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let prompt = self.prompt_lock.build_unguarded(
            &context_text,
            query,
            request.system_prompt.as_deref(),
        );
        let answer = self.generate(&prompt.system, &prompt.user, &request).await?;

        let sources = chunks
            .iter()
            .map(|chunk| SourceRef {
                file: chunk.source_id.clone(),
                chunk_index: chunk.chunk_index,
                similarity: chunk.similarity,
                trust: None,
                preview: preview(&chunk.text),
            })
            .collect();

        Ok(ChatResult {
            request_id,
            answer,
            sources,
            guardrails_active: false,
            blocked: false,
            block_reason: None,
            guardrail_logs: Vec::new(),
        })
    }

    async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<RetrievedChunk>> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        self.retriever
            .retrieve(query, top_k)
            .await
            .map_err(|e| GuardrailError::Upstream {
                stage: UpstreamStage::Retrieval,
                message: e.to_string(),
            })
    }

    /// Run generation under the configured timeout. A timed-out or failed
    /// call surfaces as an upstream error and writes no security event.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        request: &ChatRequest,
    ) -> Result<String> {
        let temperature = request.temperature.unwrap_or(self.config.default_temperature);
        match tokio::time::timeout(
            self.config.generation_timeout(),
            self.generator.generate(system_prompt, user_prompt, temperature),
        )
        .await
        {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => Err(GuardrailError::Upstream {
                stage: UpstreamStage::Generation,
                message: e.to_string(),
            }),
            Err(_) => Err(GuardrailError::Upstream {
                stage: UpstreamStage::Generation,
                message: format!(
                    "timed out after {}s",
                    self.config.generation_timeout_secs
                ),
            }),
        }
    }

    /// Sanitize and store one document's chunks. Sanitization happens
    /// before storage so injected instructions never reach the index.
    pub async fn ingest_document(
        &self,
        source_id: &str,
        chunks: Vec<String>,
    ) -> Result<IngestReport> {
        let mut prepared = Vec::with_capacity(chunks.len());
        let mut chunks_sanitized = 0;
        for (chunk_index, text) in chunks.into_iter().enumerate() {
            let result = self.sanitizer.sanitize(&text);
            if result.was_modified() {
                chunks_sanitized += 1;
                self.log.append(GuardrailEvent::new(
                    EventType::DocumentSanitized,
                    source_id,
                    0.0,
                    ActionTaken::Sanitized,
                    json!({
                        "instructions_removed": result.removed_spans.len(),
                        "chunk_index": chunk_index,
                    }),
                ));
            }
            prepared.push(IngestedChunk {
                text: result.cleaned_text,
                source_id: source_id.to_string(),
                chunk_index,
            });
        }

        let _phase = self.store_phase.write().await;
        let chunks_stored =
            self.store
                .add_chunks(prepared)
                .await
                .map_err(|e| GuardrailError::Upstream {
                    stage: UpstreamStage::DocumentStore,
                    message: e.to_string(),
                })?;
        tracing::debug!(source_id, chunks_stored, chunks_sanitized, "document ingested");
        Ok(IngestReport {
            source_id: source_id.to_string(),
            chunks_stored,
            chunks_sanitized,
        })
    }

    /// Drop every stored document. Exclusive with in-flight retrieval.
    pub async fn clear_documents(&self) -> Result<()> {
        let _phase = self.store_phase.write().await;
        self.store
            .clear()
            .await
            .map_err(|e| GuardrailError::Upstream {
                stage: UpstreamStage::DocumentStore,
                message: e.to_string(),
            })
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= SOURCE_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SOURCE_PREVIEW_CHARS).collect();
    format!("{cut}...")
}
