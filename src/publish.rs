//! Digest signing and publication to the write relay.

use crate::config::Settings;
use crate::error::Result;
use crate::event::{self, Event, EventTemplate, KIND_NOTE};
use crate::relay::RelayClient;

/// Sign `digest` as a fresh text note and hand it to the write relay.
///
/// The envelope is stamped with the wall-clock time at signing, not at
/// collection. Dry runs print the would-be content instead of touching the
/// network; when a write session is opened it is closed whether or not the
/// relay accepted the event. Exactly one event goes out per successful run.
pub async fn publish_digest(cfg: &Settings, digest: String) -> Result<Event> {
    let template = EventTemplate {
        kind: KIND_NOTE,
        created_at: event::unix_now(),
        tags: vec![],
        content: digest,
    };
    let signed = event::finalize(template, &cfg.secret)?;

    if cfg.dry_run {
        println!("{}", signed.content);
        return Ok(signed);
    }

    let mut relay = RelayClient::connect(&cfg.relay_write, cfg.tor_socks.as_deref()).await?;
    let outcome = relay.publish(&signed).await;
    relay.close().await;
    outcome?;
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptMode;
    use crate::error::Error;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::{accept_async, tungstenite::Message as TMsg};

    fn test_settings(relay_write: String, dry_run: bool) -> Settings {
        Settings {
            api_key: "key".into(),
            secret: [1u8; 32],
            relay_read: String::new(),
            relay_write,
            prompt_mode: PromptMode::Direct,
            lookback_secs: 21_600,
            max_retries: 3,
            model: "mistral-tiny".into(),
            max_tokens: 2000,
            completions_url: String::new(),
            dry_run,
            tor_socks: None,
        }
    }

    #[tokio::test]
    async fn dry_run_never_touches_the_network() {
        // nothing listens on this port; a connection attempt would fail the run
        let cfg = test_settings("ws://127.0.0.1:1".into(), true);
        let signed = publish_digest(&cfg, "Digest text".into()).await.unwrap();
        assert_eq!(signed.content, "Digest text");
        crate::event::verify(&signed).unwrap();
    }

    #[tokio::test]
    async fn live_run_publishes_one_signed_event() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut published = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    TMsg::Text(txt) => {
                        let val: serde_json::Value = serde_json::from_str(&txt).unwrap();
                        assert_eq!(val[0], "EVENT");
                        let ev: crate::event::Event =
                            serde_json::from_value(val[1].clone()).unwrap();
                        ws.send(TMsg::Text(json!(["OK", ev.id, true, ""]).to_string()))
                            .await
                            .unwrap();
                        published.push(ev);
                    }
                    TMsg::Close(_) => break,
                    _ => {}
                }
            }
            published
        });

        let before = crate::event::unix_now();
        let cfg = test_settings(format!("ws://{addr}"), false);
        let signed = publish_digest(&cfg, "Digest text".into()).await.unwrap();

        let published = server.await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0], signed);
        assert_eq!(published[0].content, "Digest text");
        assert_eq!(published[0].kind, KIND_NOTE);
        assert!(published[0].tags.is_empty());
        assert!(published[0].created_at >= before);
        assert!(published[0].created_at <= before + 5);
        crate::event::verify(&published[0]).unwrap();
    }

    #[tokio::test]
    async fn rejection_fails_after_closing_the_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            if let Some(Ok(TMsg::Text(txt))) = ws.next().await {
                let val: serde_json::Value = serde_json::from_str(&txt).unwrap();
                let id = val[1]["id"].as_str().unwrap().to_string();
                ws.send(TMsg::Text(json!(["OK", id, false, "policy"]).to_string()))
                    .await
                    .unwrap();
            }
            // rejection still ends with the client closing its session
            while let Some(Ok(msg)) = ws.next().await {
                if matches!(msg, TMsg::Close(_)) {
                    return true;
                }
            }
            true
        });

        let cfg = test_settings(format!("ws://{addr}"), false);
        let err = publish_digest(&cfg, "Digest text".into()).await.unwrap_err();
        assert!(matches!(err, Error::Publish(_)));
        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_write_relay_is_connection_error() {
        let cfg = test_settings("ws://127.0.0.1:1".into(), false);
        let err = publish_digest(&cfg, "Digest text".into()).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[tokio::test]
    async fn invalid_secret_fails_before_any_connection() {
        let mut cfg = test_settings("ws://127.0.0.1:1".into(), false);
        cfg.secret = [0u8; 32];
        let err = publish_digest(&cfg, "Digest text".into()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
