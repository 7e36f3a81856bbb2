use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// External reference provider a definition can be resolved from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Dictionary-style lookup.
    Wiktionary,
    /// Encyclopedia-style lookup.
    Wikipedia,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Wiktionary, Source::Wikipedia];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Wiktionary => "wiktionary",
            Source::Wikipedia => "wikipedia",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDefinition {
    pub source: Source,
    pub definition: String,
    /// Zero or one short example phrase.
    #[serde(default)]
    pub examples: Vec<String>,
}

// MediaWiki action API (`action=query&prop=extracts`)

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub query: Option<QueryResult>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResult {
    /// Keyed by page id; `-1` for a missing page.
    pub pages: Option<BTreeMap<String, QueryPage>>,
}

#[derive(Debug, Deserialize)]
pub struct QueryPage {
    pub extract: Option<String>,
}

// REST `page/summary`

#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    pub extract: Option<String>,
}
