//! Collaborator interfaces at the pipeline boundary.
//!
//! Retrieval, generation, and document storage are external services with
//! their own failure modes; the pipeline speaks to them only through these
//! object-safe traits. Implementations return `anyhow::Result` so the
//! concrete backend keeps its own error context.

use std::future::Future;
use std::pin::Pin;

/// A chunk handed to the document store at ingestion time.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedChunk {
    pub text: String,
    pub source_id: String,
    pub chunk_index: usize,
}

/// A chunk returned by retrieval, ranked by similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub source_id: String,
    pub chunk_index: usize,
    /// Similarity to the query, higher is closer.
    pub similarity: f64,
}

pub trait Retriever: Send + Sync {
    /// The `top_k` chunks most similar to `query`, best first.
    fn retrieve<'a>(
        &'a self,
        query: &'a str,
        top_k: usize,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<RetrievedChunk>>> + Send + 'a>>;
}

pub trait Generator: Send + Sync {
    fn generate<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

pub trait DocumentStore: Send + Sync {
    /// Index the given chunks. Returns how many were stored.
    fn add_chunks(
        &self,
        chunks: Vec<IngestedChunk>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<usize>> + Send + '_>>;

    /// Drop every stored document.
    fn clear(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}
