use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use super::extract::extract_sentence;
use super::types::{ResolvedDefinition, Source, SummaryResponse};
use super::{FetchError, SourceFetcher, get_json, language_host};

const SITE: &str = "wikipedia.org";
const SUMMARY_PATH: &str = "/api/rest_v1/page/summary";

/// Encyclopedia lookups through the REST page-summary endpoint. Never yields examples.
#[derive(Clone)]
pub struct WikipediaFetcher {
    http: Client,
    timeout: Duration,
    base_url: Option<String>,
}

impl WikipediaFetcher {
    pub fn new(http: Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            base_url: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            timeout: Duration::from_secs(5),
            base_url: Some(base_url.to_string()),
        }
    }

    fn endpoint(&self, term: &str, lang: &str) -> Result<Url, FetchError> {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| language_host(SITE, lang));
        let mut url = Url::parse(&format!("{base}{SUMMARY_PATH}"))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::NotABase(base.clone()))?
            .push(term);
        Ok(url)
    }
}

impl SourceFetcher for WikipediaFetcher {
    fn source(&self) -> Source {
        Source::Wikipedia
    }

    async fn fetch(&self, term: &str, lang: &str) -> Result<Option<ResolvedDefinition>, FetchError> {
        let url = self.endpoint(term, lang)?;
        let Some(body) = get_json::<SummaryResponse>(&self.http, url, self.timeout).await? else {
            return Ok(None);
        };

        let definition = extract_sentence(body.extract.as_deref().unwrap_or_default());
        if definition.is_empty() {
            debug!(term, lang, "wikipedia returned no usable extract");
            return Ok(None);
        }

        Ok(Some(ResolvedDefinition {
            source: self.source(),
            definition,
            examples: vec![],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn endpoint_percent_encodes_term_as_one_segment() {
        let fetcher = WikipediaFetcher::new(Client::new(), Duration::from_secs(6));
        let url = fetcher.endpoint("C/C++ interop?", "en").unwrap();
        assert_eq!(url.host_str(), Some("en.wikipedia.org"));
        assert_eq!(
            url.path(),
            "/api/rest_v1/page/summary/C%2FC++%20interop%3F"
        );
        assert!(url.query().is_none());
    }

    #[tokio::test]
    async fn fetch_returns_leading_sentence_without_examples() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/rest_v1/page/summary/Rust"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Rust",
                "extract": "Rust is an iron oxide. It forms on iron."
            })))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::with_base_url(Client::new(), &server.uri());
        let def = fetcher.fetch("Rust", "en").await.unwrap().unwrap();

        assert_eq!(def.source, Source::Wikipedia);
        assert_eq!(def.definition, "Rust is an iron oxide");
        assert!(def.examples.is_empty());
    }

    #[tokio::test]
    async fn fetch_404_is_absent_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::with_base_url(Client::new(), &server.uri());
        assert!(fetcher.fetch("Nope", "en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_empty_extract_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "title": "Blank",
                "extract": "  \n "
            })))
            .mount(&server)
            .await;

        let fetcher = WikipediaFetcher::with_base_url(Client::new(), &server.uri());
        assert!(fetcher.fetch("Blank", "en").await.unwrap().is_none());
    }
}
