//! One-shot pipeline: collect, summarize, sign, publish.

use crate::collect;
use crate::config::Settings;
use crate::error::Result;
use crate::event::{self, Event, KIND_NOTE};
use crate::publish;
use crate::relay::{Filter, RelayClient};
use crate::summarize::{self, CompletionClient};

/// Execute a single fetch → summarize → publish cycle.
///
/// Stages run strictly in sequence; no stage starts before the previous one
/// resolves. The returned event is the signed digest, published to the write
/// relay or, under `dry_run`, only printed.
pub async fn run_once(cfg: &Settings) -> Result<Event> {
    let events = fetch_recent(cfg).await?;
    println!(
        "Summarizing {} events from the last {} hours",
        events.len(),
        cfg.lookback_secs / 3600
    );

    let client = CompletionClient::new(cfg);
    let digest = summarize::summarize(&client, cfg, &events).await?;

    let signed = publish::publish_digest(cfg, digest).await?;
    println!("Done!");
    Ok(signed)
}

/// Collect stored notes from the read relay over the configured window.
async fn fetch_recent(cfg: &Settings) -> Result<Vec<Event>> {
    let filter = Filter {
        since: Some(event::unix_now().saturating_sub(cfg.lookback_secs)),
        kinds: Some(vec![KIND_NOTE]),
    };
    let mut relay = RelayClient::connect(&cfg.relay_read, cfg.tor_socks.as_deref()).await?;
    collect::collect(&mut relay, &filter).await
}
