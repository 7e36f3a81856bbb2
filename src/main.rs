mod cache;
mod clock;
mod config;
mod fetch;
mod format;
mod protocol;
mod queue;
mod resolver;
mod retry;
mod serve;

pub const USER_AGENT: &str = concat!("termresolve/", env!("CARGO_PKG_VERSION"));

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Client;
use tokio::io::BufReader;
use tracing::{info, warn};

use cache::CacheStore;
use cache::store::{JsonFileStore, KvStore, MemoryStore};
use clock::{Clock, SystemClock};
use config::{Config, NAMESPACE_VERSION};
use fetch::{Fetchers, Source};
use protocol::{Handler, Request};
use queue::RateLimitedQueue;
use resolver::Resolver;
use retry::RetryPolicy;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Maximum redirect hops before aborting.
const MAX_REDIRECTS: usize = 5;

#[derive(Parser)]
#[command(name = "termresolve", version, about = "Resolve terms against Wiktionary and Wikipedia")]
struct Cli {
    /// Cache file (overrides TERMRESOLVE_CACHE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    cache: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, global = true, conflicts_with = "cache")]
    no_persist: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one term and print the definitions found
    Lookup {
        term: String,
        /// Language tag, e.g. "en", "de", "zh"
        #[arg(long, default_value = protocol::DEFAULT_LANG)]
        lang: String,
        /// Source to query (repeatable; default: all, in order)
        #[arg(long = "source", value_enum)]
        sources: Vec<Source>,
        /// Ignore cached entries and fetch fresh ones
        #[arg(long)]
        force: bool,
        /// Print the JSON response instead of Markdown
        #[arg(long)]
        json: bool,
    },
    /// Remove every cached lookup
    ClearCache,
    /// Answer newline-delimited JSON requests on stdin
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("termresolve=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.cache {
        config.cache_path = path;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let handler = build_handler(&config, cli.no_persist, Arc::clone(&clock))?;

    match cli.command {
        Command::Lookup {
            term,
            lang,
            sources,
            force,
            json,
        } => {
            let request = Request::OnlineResolve {
                term: Some(term.clone()),
                lang: Some(lang),
                sources: (!sources.is_empty()).then_some(sources),
                force,
            };
            let response = handler.handle(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if let Some(results) = &response.results {
                print!("{}", format::format_results(&term, results, clock.now_ms()));
            }
            if let Some(error) = response.error {
                return Err(error.into());
            }
        }
        Command::ClearCache => {
            let response = handler.handle(Request::ClearCache).await;
            if let Some(error) = response.error {
                return Err(error.into());
            }
            println!("cache cleared");
        }
        Command::Serve => {
            info!(cache = %config.cache_path.display(), "serving requests on stdin");
            serve::serve(
                Arc::new(handler),
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
            info!("input closed; stopped");
        }
    }

    Ok(())
}

fn build_handler(
    config: &Config,
    no_persist: bool,
    clock: Arc<dyn Clock>,
) -> Result<Handler<Fetchers>, reqwest::Error> {
    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .build()?;

    let cache = CacheStore::new(
        open_store(config, no_persist),
        Arc::clone(&clock),
        config.ttl,
        NAMESPACE_VERSION,
    );
    let resolver = Resolver::new(
        Fetchers::new(http, config.fetch_timeout),
        cache,
        RateLimitedQueue::new(config.rate_limit),
        RetryPolicy::with_backoff(config.retry_backoff),
        clock,
    );
    Ok(Handler::new(resolver, config.online_enabled))
}

/// The file-backed store, or an in-memory one when persistence is off or the
/// cache file can't be read. Lookups keep working either way.
fn open_store(config: &Config, no_persist: bool) -> Box<dyn KvStore> {
    if no_persist {
        return Box::new(MemoryStore::new());
    }
    match JsonFileStore::open(&config.cache_path) {
        Ok(store) => {
            info!(path = %store.path().display(), "using cache file");
            Box::new(store)
        }
        Err(e) => {
            warn!(
                path = %config.cache_path.display(),
                error = %e,
                "cache file unusable; falling back to in-memory cache"
            );
            Box::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn lookup_parses_repeated_sources() {
        let cli = Cli::try_parse_from([
            "termresolve",
            "lookup",
            "API",
            "--source",
            "wikipedia",
            "--source",
            "wiktionary",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Command::Lookup {
                term,
                lang,
                sources,
                force,
                json,
            } => {
                assert_eq!(term, "API");
                assert_eq!(lang, "en");
                assert_eq!(sources, vec![Source::Wikipedia, Source::Wiktionary]);
                assert!(force);
                assert!(!json);
            }
            _ => panic!("expected lookup"),
        }
    }

    #[test]
    fn cache_and_no_persist_conflict() {
        assert!(
            Cli::try_parse_from(["termresolve", "--cache", "/tmp/x", "--no-persist", "serve"])
                .is_err()
        );
    }

    #[test]
    fn user_agent_names_the_tool() {
        assert!(USER_AGENT.starts_with("termresolve/"));
    }

    #[tokio::test]
    async fn handler_builds_with_memory_store() {
        let config = Config {
            online_enabled: false,
            ..Config::default()
        };
        let handler = build_handler(&config, true, Arc::new(SystemClock)).unwrap();
        let response = handler.handle(Request::ClearCache).await;
        assert!(response.ok);
    }
}
