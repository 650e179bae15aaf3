//! Embedding Scheduler + remote provider client (spec.md §4.3, §6).
//!
//! Batches requests under size/token ceilings, flushing before a request
//! that would cross either ceiling is appended (not after), and issues one
//! synchronous HTTP call per flush. Mirrors `OpenAIRequestScheduler` from
//! the original tool, generalized to a provider-agnostic HTTP contract.

use crate::config::EmbeddingsConfig;
use crate::error::{Error, Result};
use crate::models::{Embedding, EmbeddingRequest};
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
struct EmbeddingsApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsApiResponse {
    data: Vec<EmbeddingDatum>,
    #[allow(dead_code)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct Usage {
    #[allow(dead_code)]
    total_tokens: u64,
}

/// The embedding provider's entire contract from this crate's point of
/// view: send ordered text, get back one vector per input. The remote
/// provider's own internals are out of scope; this boundary is what lets
/// tests substitute a local double instead of reaching the network.
pub trait EmbeddingClient: Send + Sync {
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// One synchronous RPC to the configured embedding provider. Any failure
/// aborts the current Indexer run (`Error::EmbeddingProviderFailure`).
pub struct EmbeddingProvider {
    client: reqwest::blocking::Client,
    config: EmbeddingsConfig,
}

impl EmbeddingProvider {
    pub fn new(config: EmbeddingsConfig) -> Self {
        EmbeddingProvider { client: reqwest::blocking::Client::new(), config }
    }
}

impl EmbeddingClient for EmbeddingProvider {
    /// Sends `inputs` in order, returns one vector per input in the same order.
    fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var(&self.config.api_key_env).unwrap_or_default();
        let body = EmbeddingsApiRequest { model: &self.config.model, input: inputs, dimensions: Some(self.config.dimensions) };

        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| Error::EmbeddingProviderFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::EmbeddingProviderFailure(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let parsed: EmbeddingsApiResponse =
            response.json().map_err(|e| Error::EmbeddingProviderFailure(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Scoped per index run; not thread-safe (spec.md §5 confines it to one
/// Indexer run at a time).
pub struct EmbeddingScheduler {
    provider: Arc<dyn EmbeddingClient>,
    tokenizer: Arc<dyn Tokenizer>,
    batch: Vec<EmbeddingRequest>,
    batch_tokens: usize,
    batch_size_limit: usize,
    batch_token_limit: usize,
    per_request_token_cap: usize,
    requests_scheduled: u64,
    batches_flushed: u64,
}

impl EmbeddingScheduler {
    pub fn new(
        provider: Arc<dyn EmbeddingClient>,
        tokenizer: Arc<dyn Tokenizer>,
        batch_size_limit: usize,
        batch_token_limit: usize,
        per_request_token_cap: usize,
    ) -> Self {
        EmbeddingScheduler {
            provider,
            tokenizer,
            batch: Vec::new(),
            batch_tokens: 0,
            batch_size_limit,
            batch_token_limit,
            per_request_token_cap,
            requests_scheduled: 0,
            batches_flushed: 0,
        }
    }

    /// Total requests passed to `schedule`, including ones later dropped for
    /// exceeding `per_request_token_cap`. Used to drive the `--stats` counters.
    pub fn requests_scheduled(&self) -> u64 {
        self.requests_scheduled
    }

    /// Total synchronous provider calls issued by `flush` (empty-batch
    /// flushes don't call the provider and aren't counted).
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }

    /// Appends `req` to the pending batch, flushing first if it would push
    /// either ceiling over the limit. Requests whose own token count
    /// exceeds `per_request_token_cap` are dropped silently (no embedding;
    /// the object remains searchable via FTS only).
    pub fn schedule(&mut self, req: EmbeddingRequest) -> Result<Vec<Embedding>> {
        self.requests_scheduled += 1;
        let request_tokens = self.tokenizer.count_tokens(&req.content);
        if request_tokens > self.per_request_token_cap {
            return Ok(Vec::new());
        }

        let mut flushed = Vec::new();
        if self.batch.len() >= self.batch_size_limit || self.batch_tokens + request_tokens > self.batch_token_limit {
            flushed = self.flush()?;
        }
        self.batch.push(req);
        self.batch_tokens += request_tokens;
        Ok(flushed)
    }

    /// Issues a single synchronous call for the pending batch. Returns an
    /// empty list if the batch is empty. Result `i` corresponds to input `i`.
    pub fn flush(&mut self) -> Result<Vec<Embedding>> {
        if self.batch.is_empty() {
            return Ok(Vec::new());
        }
        self.batches_flushed += 1;
        let inputs: Vec<String> = self.batch.iter().map(|r| r.content.clone()).collect();
        let vectors = self.provider.embed(&inputs)?;
        let batch = std::mem::take(&mut self.batch);
        self.batch_tokens = 0;
        Ok(batch
            .into_iter()
            .zip(vectors)
            .map(|(req, data)| Embedding { object_id: req.object_id, data, content_hash: req.content_hash })
            .collect())
    }
}

/// A local stand-in for the remote provider, used by this crate's own tests
/// and available to integration tests that need to run an Indexer pass
/// without reaching the network. Produces deterministic, content-derived
/// vectors rather than zeros, so rank-order assertions stay meaningful.
pub mod testing {
    use super::{EmbeddingClient, Result};
    use sha2::{Digest, Sha256};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeEmbeddingClient {
        pub dim: usize,
        pub calls: AtomicUsize,
    }

    impl FakeEmbeddingClient {
        pub fn new(dim: usize) -> Self {
            FakeEmbeddingClient { dim, calls: AtomicUsize::new(0) }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmbeddingClient for FakeEmbeddingClient {
        fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|s| fake_vector(s, self.dim)).collect())
        }
    }

    fn fake_vector(text: &str, dim: usize) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..dim).map(|i| digest[i % digest.len()] as f32 / 255.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::BytesEstimateTokenizer;

    struct FixedTokenizer(usize);
    impl Tokenizer for FixedTokenizer {
        fn count_tokens(&self, _text: &str) -> usize {
            self.0
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn provider() -> Arc<dyn EmbeddingClient> {
        Arc::new(testing::FakeEmbeddingClient::new(4))
    }

    #[test]
    fn request_over_cap_is_dropped_silently() {
        let mut sched = EmbeddingScheduler::new(provider(), Arc::new(FixedTokenizer(9000)), 2048, 400_000, 8192);
        let result = sched.schedule(EmbeddingRequest { object_id: 1, content: "x".into(), content_hash: "h".into() }).unwrap();
        assert!(result.is_empty());
        assert_eq!(sched.batch.len(), 0);
    }

    #[test]
    fn scheduling_appends_without_flushing_below_ceiling() {
        let mut sched =
            EmbeddingScheduler::new(provider(), Arc::new(BytesEstimateTokenizer), 2048, 400_000, 8192);
        sched.schedule(EmbeddingRequest { object_id: 1, content: "abc".into(), content_hash: "h".into() }).unwrap();
        assert_eq!(sched.batch.len(), 1);
    }
}
