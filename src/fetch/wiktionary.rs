use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use super::extract::{extract_example, extract_sentence};
use super::types::{QueryResponse, ResolvedDefinition, Source};
use super::{FetchError, SourceFetcher, get_json, language_host};

const SITE: &str = "wiktionary.org";
const API_PATH: &str = "/w/api.php";

/// Dictionary lookups through the MediaWiki action API (intro extract as plain text).
#[derive(Clone)]
pub struct WiktionaryFetcher {
    http: Client,
    timeout: Duration,
    base_url: Option<String>,
}

impl WiktionaryFetcher {
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
        let mut url = Url::parse(&format!("{base}{API_PATH}"))?;
        url.query_pairs_mut()
            .append_pair("action", "query")
            .append_pair("format", "json")
            .append_pair("prop", "extracts")
            .append_pair("explaintext", "1")
            .append_pair("exintro", "1")
            .append_pair("titles", term);
        Ok(url)
    }
}

impl SourceFetcher for WiktionaryFetcher {
    fn source(&self) -> Source {
        Source::Wiktionary
    }

    async fn fetch(&self, term: &str, lang: &str) -> Result<Option<ResolvedDefinition>, FetchError> {
        let url = self.endpoint(term, lang)?;
        let Some(body) = get_json::<QueryResponse>(&self.http, url, self.timeout).await? else {
            return Ok(None);
        };

        let extract = body
            .query
            .and_then(|q| q.pages)
            .and_then(|pages| pages.into_values().next())
            .and_then(|page| page.extract)
            .unwrap_or_default();

        let definition = extract_sentence(&extract);
        if definition.is_empty() {
            debug!(term, lang, "wiktionary returned no usable extract");
            return Ok(None);
        }
        let example = extract_example(&extract, lang);

        Ok(Some(ResolvedDefinition {
            source: self.source(),
            definition,
            examples: if example.is_empty() { vec![] } else { vec![example] },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn endpoint_targets_language_host() {
        let fetcher = WiktionaryFetcher::new(Client::new(), Duration::from_secs(6));
        let url = fetcher.endpoint("state machine", "en").unwrap();
        assert_eq!(url.host_str(), Some("en.wiktionary.org"));
        assert_eq!(url.path(), "/w/api.php");
        let titles = url
            .query_pairs()
            .find(|(k, _)| k == "titles")
            .map(|(_, v)| v.into_owned());
        assert_eq!(titles.as_deref(), Some("state machine"));
    }

    #[tokio::test]
    async fn fetch_extracts_definition_and_example() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("titles", "API"))
            .and(query_param("prop", "extracts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {
                    "pages": {
                        "12345": {
                            "title": "API",
                            "extract": "API\n\nApplication   programming interface. Used by programs."
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let fetcher = WiktionaryFetcher::with_base_url(Client::new(), &server.uri());
        let def = fetcher.fetch("API", "en").await.unwrap().unwrap();

        assert_eq!(def.source, Source::Wiktionary);
        assert_eq!(def.definition, "API Application programming interface");
        assert_eq!(
            def.examples,
            vec!["API Application programming interface. Used by programs.".to_string()]
        );
    }

    #[tokio::test]
    async fn fetch_missing_page_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": { "pages": { "-1": { "title": "Zzyzx", "missing": "" } } }
            })))
            .mount(&server)
            .await;

        let fetcher = WiktionaryFetcher::with_base_url(Client::new(), &server.uri());
        assert!(fetcher.fetch("Zzyzx", "en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_without_query_block_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "batchcomplete": ""
            })))
            .mount(&server)
            .await;

        let fetcher = WiktionaryFetcher::with_base_url(Client::new(), &server.uri());
        assert!(fetcher.fetch("x", "en").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_server_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fetcher = WiktionaryFetcher::with_base_url(Client::new(), &server.uri());
        let result = fetcher.fetch("API", "en").await;
        assert!(matches!(result, Err(FetchError::Status(502))));
    }
}
