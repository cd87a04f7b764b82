//! Time-windowed collection of stored events from a read relay.

use crate::error::Result;
use crate::event::Event;
use crate::relay::{Filter, RelayClient, RelayMessage};

/// Subscription label for the one-shot history request.
const SUB_ID: &str = "digest";

/// Drain stored events matching `filter` until the relay signals exhaustion.
///
/// Events are accumulated in delivery order; zero matches is a valid, empty
/// result. The session is closed before returning, on success and on error
/// alike.
pub async fn collect(relay: &mut RelayClient, filter: &Filter) -> Result<Vec<Event>> {
    let result = drain(relay, filter).await;
    relay.close().await;
    result
}

async fn drain(relay: &mut RelayClient, filter: &Filter) -> Result<Vec<Event>> {
    relay.subscribe(SUB_ID, filter).await?;
    let mut events = Vec::new();
    while let Some(msg) = relay.recv().await? {
        match msg {
            RelayMessage::Event { sub, event } if sub == SUB_ID => events.push(event),
            RelayMessage::EndOfStored { sub } if sub == SUB_ID => break,
            _ => {}
        }
    }
    Ok(events)
}
