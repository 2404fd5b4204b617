// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Newline-delimited JSON listener exposing the device server over TCP.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! TCP line server.
//!
//! Each line received is one [`Request`] frame; each reply is one
//! [`Response`] frame echoing the request tag. A line that cannot be decoded
//! closes the connection.

use std::io;
use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use uasim_proto::frame::{self, Request, Response};

use crate::server::{DeviceConnection, DeviceServer};

/// Accept clients until `cancel` fires.
///
/// Client tasks observe the same token and drop their sockets on
/// cancellation.
pub async fn serve(
    listener: TcpListener,
    server: DeviceServer,
    cancel: CancellationToken,
) -> io::Result<()> {
    let local = listener.local_addr()?;
    info!("device server listening on {local}");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("device server on {local} stopped");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let Ok(connection) = server.connect() else {
                    debug!("rejecting {peer}: server shut down");
                    continue;
                };
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        result = handle_client(stream, peer, connection) => {
                            if let Err(err) = result {
                                warn!("client {peer} dropped: {err}");
                            }
                        }
                    }
                });
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    connection: DeviceConnection,
) -> io::Result<()> {
    debug!("client {peer} connected as session {}", connection.session());
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = frame::decode_line(&line)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let Ok(body) = connection.call(request.body) else {
            debug!("client {peer}: server closed");
            break;
        };
        let response = Response {
            tag: request.tag,
            body,
        };
        let mut encoded = frame::encode_line(&response)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        encoded.push('\n');
        write_half.write_all(encoded.as_bytes()).await?;
    }
    debug!("client {peer} disconnected");
    Ok(())
}
