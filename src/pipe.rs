// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bidirectional pump between a transport socket and a replication stream.
//!
//! ```text
//!   transport.stream ──frames──► replication io (write)
//!   transport.sink   ◄──frames── replication io (read)
//! ```
//!
//! The first direction to finish, or a destroy of the transport, ends the
//! whole pipe. Whatever error ended it is reported in the [`PipeOutcome`].

use crate::error::ClientError;
use crate::metrics;
use crate::session::BoxedIo;
use crate::transport::{TransportHandle, TransportSocket};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Read buffer size for the outbound direction.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// How a pipe ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipeOutcome {
    /// Bytes written from the transport into the replication stream.
    pub bytes_in: u64,
    /// Bytes read from the replication stream and sent over the transport.
    pub bytes_out: u64,
    /// Error that ended the pipe, if any.
    pub error: Option<ClientError>,
}

/// Pump bytes both ways until either side ends or the transport is destroyed.
pub async fn bridge(socket: TransportSocket, io: BoxedIo, transport: TransportHandle) -> PipeOutcome {
    let TransportSocket {
        mut sink,
        mut stream,
    } = socket;
    let (mut reader, mut writer) = tokio::io::split(io);

    let mut bytes_in = 0u64;
    let mut bytes_out = 0u64;

    let inbound = async {
        while let Some(frame) = stream.next().await {
            let frame = frame?;
            writer
                .write_all(&frame)
                .await
                .map_err(|e| ClientError::Pipe(format!("write to replication stream: {}", e)))?;
            bytes_in += frame.len() as u64;
        }
        let _ = writer.shutdown().await;
        Ok::<(), ClientError>(())
    };

    let outbound = async {
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        loop {
            buf.reserve(READ_BUFFER_SIZE);
            let n = reader
                .read_buf(&mut buf)
                .await
                .map_err(|e| ClientError::Pipe(format!("read from replication stream: {}", e)))?;
            if n == 0 {
                break;
            }
            sink.send(buf.split().freeze()).await?;
            bytes_out += n as u64;
        }
        let _ = sink.close().await;
        Ok::<(), ClientError>(())
    };

    let (error, ended_by) = tokio::select! {
        result = inbound => (result.err(), "remote"),
        result = outbound => (result.err(), "local"),
        reason = transport.destroyed() => (reason, "destroy"),
    };

    debug!(
        url = %transport.url(),
        ended_by,
        bytes_in,
        bytes_out,
        error = ?error,
        "Pipe finished"
    );
    metrics::record_pipe_bytes("in", bytes_in);
    metrics::record_pipe_bytes("out", bytes_out);

    PipeOutcome {
        bytes_in,
        bytes_out,
        error,
    }
}
