// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: TCP transport speaking newline-delimited JSON frames to the device.
// Author: Lukas Bower

//! Newline-delimited JSON transport over TCP.

use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use uasim_proto::frame::{self, Request, RequestBody, Response, ResponseBody};
use uasim_proto::Endpoint;

use super::{Connector, Transport, TransportError};

/// Schemes accepted by [`TcpConnector`].
pub const SUPPORTED_SCHEMES: [&str; 2] = ["opc.tcp", "tcp"];

/// Connector opening TCP line transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Transport, TransportError> {
        if !SUPPORTED_SCHEMES.iter().any(|scheme| *scheme == endpoint.scheme()) {
            return Err(TransportError::Protocol(format!(
                "unsupported endpoint scheme '{}'",
                endpoint.scheme()
            )));
        }
        let address = endpoint.socket_address();
        let stream = TcpStream::connect(&address).await.map_err(|err| {
            TransportError::ConnectionLost(format!("failed to connect to {address}: {err}"))
        })?;
        stream.set_nodelay(true).map_err(|err| {
            TransportError::ConnectionLost(format!("failed to configure {address}: {err}"))
        })?;
        debug!("connected to {endpoint}");
        Ok(TcpTransport::new(stream, address))
    }
}

#[derive(Debug)]
struct Channel {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_tag: u32,
}

/// TCP transport issuing one tagged request at a time.
///
/// Replies carrying an older tag belong to requests abandoned by a timeout
/// and are skipped.
#[derive(Debug)]
pub struct TcpTransport {
    peer: String,
    channel: Mutex<Option<Channel>>,
}

impl TcpTransport {
    /// Wrap a connected stream.
    pub fn new(stream: TcpStream, peer: impl Into<String>) -> Self {
        let (read_half, writer) = stream.into_split();
        let channel = Channel {
            lines: BufReader::new(read_half).lines(),
            writer,
            next_tag: 1,
        };
        Self {
            peer: peer.into(),
            channel: Mutex::new(Some(channel)),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn request(&self, body: RequestBody) -> Result<ResponseBody, TransportError> {
        let mut guard = self.channel.lock().await;
        let Some(channel) = guard.as_mut() else {
            return Err(TransportError::ConnectionLost(format!(
                "connection to {} is closed",
                self.peer
            )));
        };
        let result = exchange(channel, body).await;
        if matches!(result, Err(TransportError::ConnectionLost(_))) {
            debug!("dropping connection to {}", self.peer);
            *guard = None;
        }
        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        let Some(mut channel) = self.channel.lock().await.take() else {
            return Ok(());
        };
        channel
            .writer
            .shutdown()
            .await
            .map_err(|err| TransportError::ConnectionLost(err.to_string()))
    }
}

async fn exchange(channel: &mut Channel, body: RequestBody) -> Result<ResponseBody, TransportError> {
    let tag = channel.next_tag;
    channel.next_tag = channel.next_tag.wrapping_add(1);
    let mut line = frame::encode_line(&Request { tag, body })
        .map_err(|err| TransportError::Protocol(err.to_string()))?;
    line.push('\n');
    channel
        .writer
        .write_all(line.as_bytes())
        .await
        .map_err(|err| TransportError::ConnectionLost(format!("write failed: {err}")))?;
    loop {
        let reply = channel
            .lines
            .next_line()
            .await
            .map_err(|err| TransportError::ConnectionLost(format!("read failed: {err}")))?
            .ok_or_else(|| TransportError::ConnectionLost("connection closed by peer".into()))?;
        let response: Response =
            frame::decode_line(&reply).map_err(|err| TransportError::Protocol(err.to_string()))?;
        if response.tag == tag {
            return Ok(response.body);
        }
        if response.tag < tag {
            debug!("skipping stale reply for tag {}", response.tag);
            continue;
        }
        return Err(TransportError::Protocol(format!(
            "reply tag {} does not match request tag {tag}",
            response.tag
        )));
    }
}
