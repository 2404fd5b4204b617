// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-process transport bound directly to a device server.
// Author: Lukas Bower

//! Transport backed by an in-process device connection.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::debug;
use sim_device::{DeviceConnection, DeviceServer};
use uasim_proto::frame::{RequestBody, ResponseBody};
use uasim_proto::Endpoint;

use super::{Connector, Transport, TransportError};

/// Connector handing out connections to an in-process device server.
///
/// The endpoint is only used for logging.
#[derive(Debug, Clone)]
pub struct InProcessConnector {
    server: DeviceServer,
}

impl InProcessConnector {
    /// Connect future sessions to `server`.
    pub fn new(server: DeviceServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    type Transport = InProcessTransport;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Transport, TransportError> {
        let connection = self
            .server
            .connect()
            .map_err(|err| TransportError::ConnectionLost(err.to_string()))?;
        debug!(
            "in-process session {} attached for {endpoint}",
            connection.session()
        );
        Ok(InProcessTransport::new(connection))
    }
}

/// Transport calling the device server without serialisation.
#[derive(Debug)]
pub struct InProcessTransport {
    connection: DeviceConnection,
    closed: AtomicBool,
}

impl InProcessTransport {
    /// Wrap an open device connection.
    pub fn new(connection: DeviceConnection) -> Self {
        Self {
            connection,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn request(&self, body: RequestBody) -> Result<ResponseBody, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionLost("transport closed".into()));
        }
        self.connection
            .call(body)
            .map_err(|err| TransportError::ConnectionLost(err.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
