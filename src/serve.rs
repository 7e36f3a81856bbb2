//! Newline-delimited JSON request loop.
//!
//! Each input line is handled on its own task so slow lookups don't hold up
//! cache hits or clears; responses are written as they complete and carry the
//! request's `id` for correlation.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::fetch::DefinitionLookup;
use crate::protocol::Handler;

/// Serve requests from `input` until EOF, then wait for in-flight requests.
/// Returns the writer once every response has been flushed.
pub async fn serve<L, R, W>(handler: Arc<Handler<L>>, input: R, mut output: W) -> io::Result<W>
where
    L: DefinitionLookup,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, io::Error>(output)
    });

    let mut in_flight = JoinSet::new();
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let handler = Arc::clone(&handler);
                let tx = tx.clone();
                in_flight.spawn(async move {
                    let response = handler.handle_message(&line).await;
                    match serde_json::to_string(&response) {
                        Ok(json) => {
                            if tx.send(json).is_err() {
                                warn!("response writer closed; dropping response");
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to encode response"),
                    }
                });
            }
            Some(joined) = in_flight.join_next() => report(joined),
        }
    }

    debug!(pending = in_flight.len(), "input closed; waiting for in-flight requests");
    while let Some(joined) = in_flight.join_next().await {
        report(joined);
    }

    drop(tx);
    writer.await.map_err(io::Error::other)?
}

fn report(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        warn!(error = %e, "request task failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::handler;
    use serde_json::Value;
    use tokio::io::{BufReader, duplex};

    async fn run(input: &str) -> Vec<Value> {
        let handler = Arc::new(handler(true));
        let output = serve(handler, BufReader::new(input.as_bytes()), Vec::new())
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn answers_every_request_with_its_id() {
        let input = concat!(
            r#"{"id":1,"type":"ts:online-resolve","term":"API","sources":["wiktionary"]}"#,
            "\n\n",
            r#"{"id":2,"type":"ts:clear-online-cache"}"#,
            "\n",
            r#"{"id":3,"type":"bogus"}"#,
            "\n",
        );

        let mut responses = run(input).await;
        responses.sort_by_key(|r| r["id"].as_u64());

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["ok"], true);
        assert_eq!(responses[0]["results"][0]["source"], "wiktionary");
        assert_eq!(responses[1], serde_json::json!({"id": 2, "ok": true}));
        assert_eq!(responses[2]["ok"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_each_get_a_response() {
        let input: String = ["alpha", "beta", "gamma"]
            .iter()
            .enumerate()
            .map(|(i, term)| {
                format!(
                    "{{\"id\":{i},\"type\":\"ts:online-resolve\",\"term\":\"{term}\",\"sources\":[\"wiktionary\"]}}\n"
                )
            })
            .collect();

        let responses = run(&input).await;

        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|r| r["ok"] == true));
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        assert!(run("").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn responds_while_input_stays_open() {
        let (mut client, server_input) = duplex(4096);
        let (server_output, responses) = duplex(4096);
        let server = tokio::spawn(serve(
            Arc::new(handler(true)),
            BufReader::new(server_input),
            server_output,
        ));
        let mut responses = BufReader::new(responses).lines();

        for id in 0..3 {
            let request = format!(
                "{{\"id\":{id},\"type\":\"ts:online-resolve\",\"term\":\"t{id}\",\"sources\":[\"wiktionary\"]}}\n"
            );
            client.write_all(request.as_bytes()).await.unwrap();
            let line = responses.next_line().await.unwrap().unwrap();
            let response: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(response["id"], id);
            assert_eq!(response["ok"], true);
        }

        drop(client);
        server.await.unwrap().unwrap();
    }
}
