use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::cache::store::StoreError;
use crate::clock::Clock;
use crate::fetch::{DefinitionLookup, FetchError, ResolvedDefinition, Source};
use crate::queue::RateLimitedQueue;
use crate::retry::{RetryPolicy, with_retry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub term: String,
    pub lang: String,
    pub sources: Vec<Source>,
    /// Skip cache reads; results still overwrite the cache.
    pub force: bool,
}

/// A definition plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedDefinition {
    #[serde(flatten)]
    pub definition: ResolvedDefinition,
    pub cached: bool,
    /// Epoch milliseconds: when the entry was stored, or when it was fetched.
    pub cache_time: u64,
}

/// Public entry point: cache first, then the rate-limited queue for misses.
pub struct Resolver<L> {
    lookup: Arc<L>,
    cache: CacheStore,
    queue: RateLimitedQueue,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl<L: DefinitionLookup> Resolver<L> {
    pub fn new(
        lookup: L,
        cache: CacheStore,
        queue: RateLimitedQueue,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lookup: Arc::new(lookup),
            cache,
            queue,
            retry,
            clock,
        }
    }

    /// Resolve `request.term` against each source in order.
    ///
    /// Sources that miss, fail, or time out contribute nothing, so the result may be
    /// shorter than `request.sources` (or empty).
    pub async fn resolve(&self, request: &ResolveRequest) -> Vec<AnnotatedDefinition> {
        let mut results = Vec::with_capacity(request.sources.len());

        for &source in &request.sources {
            let key = self.cache.key(&request.term, &request.lang, source);

            if !request.force
                && let Some(entry) = self.cache.get(&key).await
            {
                debug!(%key, "cache hit");
                results.push(AnnotatedDefinition {
                    definition: entry.value,
                    cached: true,
                    cache_time: entry.stored_at,
                });
                continue;
            }

            debug!(
                %key,
                force = request.force,
                queue = ?self.queue.state(),
                waiting = self.queue.pending(),
                "cache miss; queueing fetch"
            );
            let Some(definition) = self.fetch(source, &request.term, &request.lang).await else {
                continue;
            };

            self.cache.set(&key, &definition).await;
            results.push(AnnotatedDefinition {
                definition,
                cached: false,
                cache_time: self.clock.now_ms(),
            });
        }

        info!(
            term = %request.term,
            lang = %request.lang,
            requested = request.sources.len(),
            resolved = results.len(),
            "resolve complete"
        );
        results
    }

    pub async fn clear_cache(&self) -> Result<usize, StoreError> {
        let removed = self.cache.clear().await?;
        info!(removed, "online cache cleared");
        Ok(removed)
    }

    async fn fetch(&self, source: Source, term: &str, lang: &str) -> Option<ResolvedDefinition> {
        let lookup = Arc::clone(&self.lookup);
        let policy = self.retry;
        let term = term.to_string();
        let lang = lang.to_string();

        let outcome = self
            .queue
            .enqueue(move || async move {
                with_retry(policy, FetchError::is_retriable, || {
                    lookup.lookup(source, &term, &lang)
                })
                .await
            })
            .await;

        match outcome {
            Ok(Ok(Some(definition))) => Some(definition),
            Ok(Ok(None)) => {
                debug!(%source, "no definition from source");
                None
            }
            Ok(Err(e)) => {
                warn!(%source, error = %e, "source failed after retry; skipping");
                None
            }
            Err(e) => {
                warn!(%source, error = %e, "fetch task lost; skipping");
                None
            }
        }
    }
}
