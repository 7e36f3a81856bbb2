pub mod extract;
pub mod types;
mod wikipedia;
mod wiktionary;

pub use types::{ResolvedDefinition, Source};
pub use wikipedia::WikipediaFetcher;
pub use wiktionary::WiktionaryFetcher;

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch failed: status {0}")]
    Status(u16),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid endpoint URL: {0} cannot carry a path")]
    NotABase(String),
}

impl FetchError {
    /// Network and HTTP failures may clear up on a second attempt; a bad
    /// endpoint URL never will.
    pub fn is_retriable(&self) -> bool {
        matches!(self, FetchError::Http(_) | FetchError::Status(_))
    }
}

/// One external reference provider.
///
/// `Ok(None)` means the provider answered but had nothing usable for the term.
pub trait SourceFetcher: Send + Sync {
    fn source(&self) -> Source;

    fn fetch(
        &self,
        term: &str,
        lang: &str,
    ) -> impl Future<Output = Result<Option<ResolvedDefinition>, FetchError>> + Send;
}

/// Routes a lookup to the fetcher for the requested source.
/// Implemented by `Fetchers` for production; mock implementations used in tests.
pub trait DefinitionLookup: Send + Sync + 'static {
    fn lookup(
        &self,
        source: Source,
        term: &str,
        lang: &str,
    ) -> impl Future<Output = Result<Option<ResolvedDefinition>, FetchError>> + Send;
}

#[derive(Clone)]
pub struct Fetchers {
    wiktionary: WiktionaryFetcher,
    wikipedia: WikipediaFetcher,
}

impl Fetchers {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self {
            wiktionary: WiktionaryFetcher::new(http.clone(), timeout),
            wikipedia: WikipediaFetcher::new(http, timeout),
        }
    }
}

impl DefinitionLookup for Fetchers {
    async fn lookup(
        &self,
        source: Source,
        term: &str,
        lang: &str,
    ) -> Result<Option<ResolvedDefinition>, FetchError> {
        match source {
            Source::Wiktionary => self.wiktionary.fetch(term, lang).await,
            Source::Wikipedia => self.wikipedia.fetch(term, lang).await,
        }
    }
}

/// GET a JSON document, bounded by `timeout`.
///
/// 404 yields `Ok(None)`; any other non-success status is an error.
async fn get_json<T: DeserializeOwned>(
    http: &Client,
    url: Url,
    timeout: Duration,
) -> Result<Option<T>, FetchError> {
    let response = http
        .get(url)
        .header("User-Agent", crate::USER_AGENT)
        .header("Accept", "application/json")
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        debug!(url = %response.url(), "reference page not found");
        return Ok(None);
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    Ok(Some(response.json().await?))
}

/// Base URL for a per-language host such as `https://en.wikipedia.org`.
fn language_host(site: &str, lang: &str) -> String {
    format!("https://{lang}.{site}")
}
