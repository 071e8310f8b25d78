// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Duplex transport to the remote dispatcher.
//!
//! The client only needs a framed byte duplex: a sink it writes replication
//! bytes into and a stream it reads them from. [`WebSocketConnector`] provides
//! that over `tokio-tungstenite` binary frames; [`TransportSocket::memory_pair()`]
//! provides it in-process for tests.
//!
//! # Events
//!
//! | Transport event | How it surfaces |
//! |-----------------|-----------------|
//! | `connect` | [`Connector::open()`] resolves `Ok` |
//! | `error` | `open` fails, a frame errors, or a destroy reason is given |
//! | `close` | the pipe over the socket finishes, for any reason |
//!
//! A [`TransportHandle`] is the shareable control side of an open socket.
//! Destroying it makes the pipe stop, which is what drives client teardown.

use crate::error::{ClientError, Result};
use crate::BoxFuture;
use bytes::Bytes;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};
use url::Url;

pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = ClientError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An open duplex socket: outbound frames go into `sink`, inbound arrive on `stream`.
pub struct TransportSocket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl fmt::Debug for TransportSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSocket").finish_non_exhaustive()
    }
}

impl TransportSocket {
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<Bytes, Error = ClientError> + Send + 'static,
        St: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }

    /// Wrap a WebSocket. Data is exchanged as binary frames.
    ///
    /// Text frames are accepted as raw bytes. A close frame ends the stream.
    pub fn from_websocket<S>(ws: WebSocketStream<S>, url: &Url) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (ws_sink, ws_stream) = ws.split();

        let sink_url = url.to_string();
        let sink = ws_sink
            .with(|frame: Bytes| {
                future::ready(Ok::<_, tungstenite::Error>(Message::Binary(frame.to_vec())))
            })
            .sink_map_err(move |e| ClientError::transport(sink_url.clone(), e.to_string()));

        let stream_url = url.to_string();
        let stream = ws_stream
            .take_while(|msg| {
                future::ready(!matches!(
                    msg,
                    Ok(Message::Close(_))
                        | Err(tungstenite::Error::ConnectionClosed)
                        | Err(tungstenite::Error::AlreadyClosed)
                ))
            })
            .filter_map(move |msg| {
                let url = stream_url.clone();
                future::ready(match msg {
                    Ok(Message::Binary(data)) => Some(Ok(Bytes::from(data))),
                    Ok(Message::Text(text)) => Some(Ok(Bytes::from(text.into_bytes()))),
                    Ok(other) => {
                        trace!(url = %url, kind = ?other, "Ignoring control frame");
                        None
                    }
                    Err(e) => Some(Err(ClientError::transport(url, e.to_string()))),
                })
            });

        Self::new(sink, stream)
    }

    /// Two sockets wired back to back in memory.
    pub fn memory_pair() -> (TransportSocket, TransportSocket) {
        let (a_tx, a_rx) = futures::channel::mpsc::unbounded::<Bytes>();
        let (b_tx, b_rx) = futures::channel::mpsc::unbounded::<Bytes>();

        let left = TransportSocket::new(
            a_tx.sink_map_err(|e| ClientError::transport("memory://", e.to_string())),
            b_rx.map(Ok::<Bytes, ClientError>),
        );
        let right = TransportSocket::new(
            b_tx.sink_map_err(|e| ClientError::transport("memory://", e.to_string())),
            a_rx.map(Ok::<Bytes, ClientError>),
        );
        (left, right)
    }
}

/// Opens transports by URL.
pub trait Connector: Send + Sync {
    fn open<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, TransportSocket>;
}

/// Opens WebSocket connections with `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, TransportSocket> {
        Box::pin(async move {
            let (ws, response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ClientError::transport(url.as_str(), e.to_string()))?;

            debug!(url = %url, status = %response.status(), "WebSocket handshake complete");
            Ok(TransportSocket::from_websocket(ws, url))
        })
    }
}

/// Lifecycle signal of an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Open,
    Destroyed(Option<ClientError>),
}

/// Shareable control handle of one transport.
#[derive(Clone)]
pub struct TransportHandle {
    url: Url,
    signal: Arc<watch::Sender<TransportSignal>>,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle")
            .field("url", &self.url.as_str())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl TransportHandle {
    pub fn new(url: Url) -> Self {
        let (signal, _) = watch::channel(TransportSignal::Open);
        Self {
            url,
            signal: Arc::new(signal),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Destroy the transport, optionally with a reason. First call wins.
    pub fn destroy(&self, err: Option<ClientError>) -> bool {
        let destroyed = self.signal.send_if_modified(|signal| match signal {
            TransportSignal::Open => {
                *signal = TransportSignal::Destroyed(err);
                true
            }
            TransportSignal::Destroyed(_) => false,
        });
        if destroyed {
            debug!(url = %self.url, "Transport destroyed");
        }
        destroyed
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(*self.signal.borrow(), TransportSignal::Destroyed(_))
    }

    /// Wait until the transport is destroyed and return the reason, if any.
    pub async fn destroyed(&self) -> Option<ClientError> {
        let mut rx = self.signal.subscribe();
        let reason = match rx.wait_for(|s| matches!(s, TransportSignal::Destroyed(_))).await {
            Ok(signal) => match &*signal {
                TransportSignal::Destroyed(reason) => reason.clone(),
                TransportSignal::Open => None,
            },
            Err(_) => None,
        };
        reason
    }
}
