//! Duplex text channel to the realtime endpoint

use crate::conversation::config::WireAuth;
use crate::{ReadalongError, Result};
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use futures::{FutureExt, SinkExt};
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// An open connection: text out, text in
///
/// The inbound stream ends after yielding an error when the connection
/// drops. Dropping `outbound` closes the connection.
pub struct WireConnection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: BoxStream<'static, Result<String>>,
}

/// The far side of a loopback connection
pub struct RemoteEnd {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub inbound: mpsc::UnboundedSender<Result<String>>,
}

impl WireConnection {
    /// An in-process connection for headless runs and tests
    pub fn loopback() -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel::<Result<String>>();
        let inbound = async_stream::stream! {
            while let Some(item) = in_rx.recv().await {
                yield item;
            }
        };
        (
            Self {
                outbound: out_tx,
                inbound: inbound.boxed(),
            },
            RemoteEnd {
                sent: out_rx,
                inbound: in_tx,
            },
        )
    }
}

impl RemoteEnd {
    /// Next message the session sent, parsed
    pub async fn next_sent(&mut self) -> Option<serde_json::Value> {
        let text = self.sent.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Deliver a server message to the session
    pub fn push(&self, event: serde_json::Value) -> bool {
        self.inbound.send(Ok(event.to_string())).is_ok()
    }

    /// Drop the connection from the remote side
    pub fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .send(Err(ReadalongError::TransportError(reason.to_string())));
    }
}

pub trait WireConnector: Send + Sync {
    fn connect<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<WireConnection>>;
}

/// Hands out one prepared connection
pub struct LoopbackConnector {
    connection: Mutex<Option<WireConnection>>,
}

impl LoopbackConnector {
    pub fn new(connection: WireConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
        }
    }
}

impl WireConnector for LoopbackConnector {
    fn connect<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<WireConnection>> {
        let connection = self.connection.lock().take();
        async move {
            connection.ok_or_else(|| {
                ReadalongError::TransportError("Loopback connection already used".into())
            })
        }
        .boxed()
    }
}

/// WebSocket connector for the realtime endpoint
pub struct WebSocketConnector {
    url: String,
    model: String,
    auth: WireAuth,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, model: impl Into<String>, auth: WireAuth) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            auth,
        }
    }

    /// Endpoint URL with the query this auth mode needs, percent-encoded
    pub fn endpoint(&self, token: &str) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| ReadalongError::TransportError(format!("Invalid endpoint: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            if self.auth == WireAuth::QueryToken {
                query.append_pair("token", token);
            }
            query.append_pair("model", &self.model);
        }
        Ok(url.into())
    }

    async fn open(&self, token: &str) -> Result<WireConnection> {
        let endpoint = self.endpoint(token)?;
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ReadalongError::TransportError(format!("Invalid endpoint: {}", e)))?;

        let header = |value: String| {
            HeaderValue::from_str(&value)
                .map_err(|e| ReadalongError::CredentialError(format!("Unusable token: {}", e)))
        };
        match self.auth {
            WireAuth::Bearer => {
                request
                    .headers_mut()
                    .insert("Authorization", header(format!("Bearer {}", token))?);
            }
            WireAuth::Subprotocol => {
                request.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    header(format!(
                        "realtime, openai-insecure-api-key.{}, openai-beta.realtime-v1",
                        token
                    ))?,
                );
            }
            WireAuth::QueryToken => {}
        }

        info!("Connecting to {}", self.url);
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ReadalongError::TransportError(format!("Connection failed: {}", e)))?;
        info!("Realtime connection open");

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!("Realtime send failed: {}", e);
                    break;
                }
            }
            let _ = write.close().await;
            debug!("Realtime writer closed");
        });

        let inbound = async_stream::stream! {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => yield Ok(text.to_string()),
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| format!("{} {}", f.code, f.reason))
                            .unwrap_or_else(|| "no reason".to_string());
                        yield Err(ReadalongError::TransportError(format!("Closed by remote: {}", reason)));
                        break;
                    }
                    // Pings are answered by tungstenite on the next write
                    Ok(_) => continue,
                    Err(e) => {
                        yield Err(ReadalongError::TransportError(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(WireConnection {
            outbound: out_tx,
            inbound: inbound.boxed(),
        })
    }
}

impl WireConnector for WebSocketConnector {
    fn connect<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<WireConnection>> {
        self.open(token).boxed()
    }
}
