//! JSON message channel in front of the resolver.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::fetch::{DefinitionLookup, Source};
use crate::resolver::{AnnotatedDefinition, ResolveRequest, Resolver};

pub const DEFAULT_LANG: &str = "en";
const MAX_LANG_LEN: usize = 12;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "ts:online-resolve")]
    OnlineResolve {
        term: Option<String>,
        lang: Option<String>,
        sources: Option<Vec<Source>>,
        #[serde(default, deserialize_with = "truthy")]
        force: bool,
    },
    #[serde(rename = "ts:clear-online-cache")]
    ClearCache,
}

/// Loose boolean: `null`, `0`, `""` and `false` are false; anything else is true.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

#[derive(Debug, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<AnnotatedDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok() -> Self {
        Self {
            id: None,
            ok: true,
            results: None,
            error: None,
        }
    }

    fn results(results: Vec<AnnotatedDefinition>) -> Self {
        Self {
            results: Some(results),
            ..Self::ok()
        }
    }

    fn error(e: &impl std::fmt::Display) -> Self {
        Self {
            id: None,
            ok: false,
            results: None,
            error: Some(e.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("term must not be empty")]
    EmptyTerm,

    #[error("invalid language tag: '{0}'")]
    InvalidLang(String),

    #[error("online lookups are disabled")]
    Disabled,
}

/// Validate an inbound resolve request and fill in defaults.
pub fn resolve_request(
    term: Option<String>,
    lang: Option<String>,
    sources: Option<Vec<Source>>,
    force: bool,
) -> Result<ResolveRequest, RequestError> {
    let term = term.unwrap_or_default().trim().to_string();
    if term.is_empty() {
        return Err(RequestError::EmptyTerm);
    }

    let lang = lang
        .map(|l| l.trim().to_ascii_lowercase())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| DEFAULT_LANG.to_string());
    if !is_valid_lang(&lang) {
        return Err(RequestError::InvalidLang(lang));
    }

    Ok(ResolveRequest {
        term,
        lang,
        sources: sources.unwrap_or_else(|| Source::ALL.to_vec()),
        force,
    })
}

/// The tag becomes part of a host name, so only `[a-z0-9-]` is allowed.
fn is_valid_lang(lang: &str) -> bool {
    (2..=MAX_LANG_LEN).contains(&lang.len())
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !lang.starts_with('-')
        && !lang.ends_with('-')
}

pub struct Handler<L> {
    resolver: Resolver<L>,
    online_enabled: bool,
}

impl<L: DefinitionLookup> Handler<L> {
    pub fn new(resolver: Resolver<L>, online_enabled: bool) -> Self {
        Self {
            resolver,
            online_enabled,
        }
    }

    /// Handle one raw JSON message. Never fails: errors become `{ok: false}`.
    pub async fn handle_message(&self, raw: &str) -> Response {
        let mut value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return Response::error(&RequestError::from(e)),
        };
        let id = value.as_object_mut().and_then(|o| o.remove("id"));

        let mut response = match serde_json::from_value::<Request>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::error(&RequestError::from(e)),
        };
        response.id = id;
        response
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::OnlineResolve {
                term,
                lang,
                sources,
                force,
            } => {
                if !self.online_enabled {
                    return Response::error(&RequestError::Disabled);
                }
                match resolve_request(term, lang, sources, force) {
                    Ok(req) => Response::results(self.resolver.resolve(&req).await),
                    Err(e) => {
                        warn!(error = %e, "rejected resolve request");
                        Response::error(&e)
                    }
                }
            }
            Request::ClearCache => match self.resolver.clear_cache().await {
                Ok(removed) => {
                    info!(removed, "clear-online-cache handled");
                    Response::ok()
                }
                Err(e) => {
                    warn!(error = %e, "cache clear failed");
                    Response::error(&e)
                }
            },
        }
    }
}
