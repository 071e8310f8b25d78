// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-attempt connection driver and teardown.
//!
//! `run` is spawned once per accepted `connect()`. It owns the attempt until
//! the transport closes, then runs teardown and answers the caller if nobody
//! answered yet.
//!
//! # Teardown Order
//!
//! 1. Finalize the replication stream
//! 2. Close the response structure
//! 3. Close the request structure
//! 4. Stop discovery
//! 5. Clear owned resources, enter `Destroyed`
//!
//! The ready gate is disabled as soon as teardown is claimed, before step 1.
//! 6. Emit `close`

use super::{ClientState, Connection, Shared};
use crate::error::{ClientError, Result};
use crate::metrics;
use crate::pipe;
use crate::session::ReplicationSession;
use crate::structure::Replicable;
use crate::transport::{TransportHandle, TransportSocket};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Reply<S> = Option<oneshot::Sender<Result<Connection<S>>>>;

/// Drive one connection attempt to completion.
pub(crate) async fn run<S: Replicable>(
    shared: Arc<Shared<S>>,
    transport: TransportHandle,
    reply: oneshot::Sender<Result<Connection<S>>>,
) {
    let started = Instant::now();
    let mut reply = Some(reply);
    let mut last_error = None;

    match open(&shared, &transport).await {
        Ok(Some(socket)) => {
            drive(&shared, socket, &transport, &mut reply, &mut last_error).await;
        }
        Ok(None) => {
            debug!(url = %transport.url(), "Transport destroyed before it opened");
        }
        Err(e) => {
            warn!(url = %transport.url(), error = %e, "Transport failed to open");
            metrics::record_connection(false);
            shared.events.emit_error(e.clone());
            last_error = Some(e);
        }
    }

    teardown(&shared).await;
    metrics::record_session_duration(started.elapsed());

    if let Some(reply) = reply.take() {
        let _ = reply.send(Err(last_error.unwrap_or(ClientError::ConnectionClosed)));
    }
}

/// Open the transport, bounded by the connect timeout and by destroy.
async fn open<S: Replicable>(
    shared: &Shared<S>,
    transport: &TransportHandle,
) -> Result<Option<TransportSocket>> {
    let url = transport.url();
    let limit = shared.config.connect_timeout_duration();
    debug!(url = %url, timeout = ?limit, "Opening transport");

    tokio::select! {
        result = tokio::time::timeout(limit, shared.connector.open(url)) => match result {
            Ok(socket) => socket.map(Some),
            Err(_) => Err(ClientError::ConnectTimeout {
                url: url.to_string(),
                timeout_ms: limit.as_millis() as u64,
            }),
        },
        reason = transport.destroyed() => match reason {
            Some(err) => Err(err),
            None => Ok(None),
        },
    }
}

/// Transport is open: replicate over it until the pipe ends.
async fn drive<S: Replicable>(
    shared: &Arc<Shared<S>>,
    socket: TransportSocket,
    transport: &TransportHandle,
    reply: &mut Reply<S>,
    last_error: &mut Option<ClientError>,
) {
    if !shared.mark_connected() {
        debug!(url = %transport.url(), "Client destroyed while connecting");
        return;
    }
    info!(url = %transport.url(), "Transport connected");

    let Some(request) = shared.request.get() else {
        return;
    };

    let stream = match request.replicate(shared.replicate_options()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(structure = request.kind(), error = %e, "Request failed to replicate");
            shared.events.emit_error(e.clone());
            *last_error = Some(e);
            return;
        }
    };

    let (session, io) = stream.into_parts();
    shared.stream.set(session.clone());
    debug!(session = session.id(), "Replication stream piped to transport");

    let pipe = pipe::bridge(socket, io, transport.clone());
    let establishing = establish(shared, &request, &session, transport);
    tokio::pin!(pipe);
    tokio::pin!(establishing);

    let mut established = false;
    let mut closing = false;

    let outcome = loop {
        tokio::select! {
            outcome = &mut pipe => break outcome,
            result = &mut establishing, if !established => {
                established = true;
                match result {
                    Ok(connection) => {
                        metrics::record_connection(true);
                        info!(
                            url = %transport.url(),
                            structure = request.kind(),
                            response = %connection.response.key(),
                            "Connection established"
                        );
                        shared.events.emit_connect(connection.clone());
                        if let Some(reply) = reply.take() {
                            let _ = reply.send(Ok(connection));
                        }
                    }
                    Err(e) => {
                        warn!(url = %transport.url(), error = %e, "Failed to establish replication");
                        metrics::record_connection(false);
                        shared.events.emit_error(e.clone());
                        *last_error = Some(e);
                        transport.destroy(None);
                    }
                }
            }
            _ = session.closed(), if established && !closing => {
                closing = true;
                debug!(session = session.id(), "Replication stream closed");
                session.finalize();
                transport.destroy(None);
            }
        }
    };

    if let Some(e) = outcome.error {
        warn!(url = %transport.url(), error = %e, "Transport error");
        shared.events.emit_error(e.clone());
        last_error.get_or_insert(e);
    }
}

/// Wait for the handshake, then open and join the response.
async fn establish<S: Replicable>(
    shared: &Shared<S>,
    request: &Arc<S>,
    session: &ReplicationSession,
    transport: &TransportHandle,
) -> Result<Connection<S>> {
    let started = Instant::now();
    let handshake = session.handshake().await?;
    metrics::record_handshake(started.elapsed());
    debug!(
        session = session.id(),
        user_data_len = handshake.remote_user_data.len(),
        "Replication handshake complete"
    );
    shared.events.emit_handshake(session.clone());

    let key = handshake.response_key()?;
    let response = Arc::new(request.open_remote(key).await?);
    shared.response.set(response.clone());

    response.replicate_into(session, shared.replicate_options())?;
    response.ready().await?;

    Ok(Connection {
        response,
        request: request.clone(),
        socket: transport.clone(),
        stream: session.clone(),
    })
}

/// Release everything the client owns, in order. Runs at most once.
///
/// Returns `false` if teardown was already claimed by another caller.
pub(crate) async fn teardown<S: Replicable>(shared: &Shared<S>) -> bool {
    if !shared.begin_teardown() {
        return false;
    }
    let started = Instant::now();

    // No new connect may get past the gate once teardown is claimed
    shared.gate.disable();

    if let Some(stream) = shared.stream.get() {
        stream.finalize();
    }

    if let Some(response) = shared.response.take() {
        close_structure(shared, response.as_ref(), "response").await;
    }

    if let Some(request) = shared.request.take() {
        close_structure(shared, request.as_ref(), "request").await;
    }

    if let Some(discovery) = shared.discovery.take() {
        if let Err(e) = discovery.close().await {
            shared.events.emit_error(e);
        }
    }

    shared.stream.take();
    if let Some(transport) = shared.transport.take() {
        transport.destroy(None);
    }
    shared.url.take();
    shared.key.take();
    shared.set_state(ClientState::Destroyed);

    metrics::record_teardown(started.elapsed());
    info!(elapsed = ?started.elapsed(), "Client destroyed");

    shared.events.emit_close();
    true
}

async fn close_structure<S: Replicable>(shared: &Shared<S>, structure: &S, role: &'static str) {
    let capability = structure.close_capability();
    let closables = capability.len();

    match capability.close_all().await {
        Ok(()) => debug!(role, structure = structure.kind(), closables, "Structure closed"),
        Err(e) => {
            warn!(role, structure = structure.kind(), error = %e, "Failed to close structure");
            shared.events.emit_error(e);
        }
    }
}
