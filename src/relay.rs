//! Minimal NIP-01 relay client over WebSocket.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async_tls, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{Error, Result};
use crate::event::Event;

type WsStream = WebSocketStream<MaybeTlsStream<Box<dyn AsyncReadWrite + Unpin + Send>>>;

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Subscription filter sent with a `REQ`, serialized as
/// `{"since": <unix seconds>, "kinds": [1]}`.
#[derive(Debug, Clone, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
}

/// Parsed relay-to-client message.
#[derive(Debug)]
pub enum RelayMessage {
    /// `["EVENT", <sub>, <event>]`
    Event { sub: String, event: Event },
    /// `["EOSE", <sub>]`: stored history for the subscription is exhausted.
    EndOfStored { sub: String },
    /// `["OK", <id>, <accepted>, <reason>]` acknowledging a publish.
    Ok {
        id: String,
        accepted: bool,
        reason: String,
    },
}

/// Client session bound to a single relay endpoint.
///
/// One instance is used per endpoint; the digest pipeline opens one against
/// the read relay and a separate one against the write relay.
pub struct RelayClient {
    url: String,
    ws: Option<WsStream>,
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("url", &self.url)
            .field("connected", &self.ws.is_some())
            .finish()
    }
}

impl RelayClient {
    /// Establish a WebSocket session, optionally through a SOCKS5 proxy.
    /// An unreachable endpoint or failed handshake aborts with a connection
    /// error; there is no automatic retry.
    pub async fn connect(relay: &str, proxy: Option<&str>) -> Result<Self> {
        let parsed = Url::parse(relay).map_err(|e| conn_err(relay, e))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| conn_err(relay, "missing host"))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| conn_err(relay, "missing port"))?;
        let request = relay
            .into_client_request()
            .map_err(|e| conn_err(relay, e))?;
        let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = proxy {
            Box::new(
                Socks5Stream::connect(proxy, (host, port))
                    .await
                    .map_err(|e| conn_err(relay, e))?,
            )
        } else {
            Box::new(
                TcpStream::connect((host, port))
                    .await
                    .map_err(|e| conn_err(relay, e))?,
            )
        };
        let (ws, _) = client_async_tls(request, stream)
            .await
            .map_err(|e| conn_err(relay, e))?;
        Ok(Self {
            url: relay.to_string(),
            ws: Some(ws),
        })
    }

    /// Open a subscription under `sub`. The relay replies with matching
    /// stored events followed by an end-of-stored-events marker; the
    /// subscription stays open until the session is closed.
    pub async fn subscribe(&mut self, sub: &str, filter: &Filter) -> Result<()> {
        self.send(json!(["REQ", sub, filter]).to_string()).await
    }

    /// Submit a fully signed event and wait for the relay's acknowledgement.
    /// Rejection, or a session that drops before acknowledging, fails the
    /// publish; there is no retry.
    pub async fn publish(&mut self, ev: &Event) -> Result<()> {
        self.send(json!(["EVENT", ev]).to_string()).await?;
        loop {
            match self.recv().await? {
                Some(RelayMessage::Ok {
                    id,
                    accepted,
                    reason,
                }) if id == ev.id => {
                    return if accepted {
                        Ok(())
                    } else {
                        Err(Error::Publish(reason))
                    };
                }
                Some(_) => {}
                None => {
                    return Err(Error::Publish(
                        "connection closed before acknowledgement".into(),
                    ))
                }
            }
        }
    }

    /// Next recognized message from the relay, skipping binary frames,
    /// malformed JSON, and message types this client does not speak.
    /// Returns `None` once the stream ends.
    pub async fn recv(&mut self) -> Result<Option<RelayMessage>> {
        let Some(ws) = self.ws.as_mut() else {
            return Ok(None);
        };
        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| conn_err(&self.url, e))?;
            match msg {
                Message::Text(txt) => {
                    if let Some(parsed) = parse_message(&txt) {
                        return Ok(Some(parsed));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }

    async fn send(&mut self, txt: String) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| conn_err(&self.url, "not connected"))?;
        ws.send(Message::Text(txt))
            .await
            .map_err(|e| conn_err(&self.url, e))
    }

    /// Release the session. Idempotent, and safe without a live session.
    pub async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
    }
}

fn conn_err(url: &str, reason: impl ToString) -> Error {
    Error::Connection {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse one relay message, returning `None` for anything unrecognized.
fn parse_message(txt: &str) -> Option<RelayMessage> {
    let val: Value = serde_json::from_str(txt).ok()?;
    let arr = val.as_array()?;
    match arr.first()?.as_str()? {
        "EVENT" if arr.len() >= 3 => {
            let sub = arr[1].as_str()?.to_string();
            let event = serde_json::from_value(arr[2].clone()).ok()?;
            Some(RelayMessage::Event { sub, event })
        }
        "EOSE" => Some(RelayMessage::EndOfStored {
            sub: arr.get(1)?.as_str()?.to_string(),
        }),
        "OK" if arr.len() >= 3 => Some(RelayMessage::Ok {
            id: arr[1].as_str()?.to_string(),
            accepted: arr[2].as_bool()?,
            reason: arr
                .get(3)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }),
        _ => None,
    }
}
