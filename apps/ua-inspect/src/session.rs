// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Session lifecycle around a transport: timeouts, loss tracking, namespace cache.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Sessions bounding every request by a timeout and tracking connection loss.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::time;
use uasim_proto::{Endpoint, Identifier, NamespaceIndex, NodeClass, NodeRef, Value};

use crate::transport::{Connector, Transport, TransportError};

/// Default bound on establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a single request.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeouts applied by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on [`TransportSession::connect`].
    pub connect_timeout: Duration,
    /// Bound on every request issued through the session.
    pub call_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Failure to open a session. Always fatal.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No connection was established within the connect timeout.
    #[error("connecting to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// Target endpoint.
        endpoint: Endpoint,
        /// Configured bound.
        timeout: Duration,
    },
    /// The connector reported a failure.
    #[error("failed to connect to {endpoint}: {source}")]
    Failed {
        /// Target endpoint.
        endpoint: Endpoint,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
}

/// Connected session to one device endpoint.
///
/// Once any call reports [`TransportError::ConnectionLost`] the session is
/// marked lost and every later call fails immediately with the same error.
#[derive(Debug)]
pub struct TransportSession<T> {
    transport: T,
    endpoint: Endpoint,
    call_timeout: Duration,
    lost: AtomicBool,
    closed: AtomicBool,
    namespaces: Mutex<HashMap<String, NamespaceIndex>>,
}

impl<T: Transport> TransportSession<T> {
    /// Open a session to `endpoint` through `connector`.
    pub async fn connect<C>(
        connector: &C,
        endpoint: Endpoint,
        options: SessionOptions,
    ) -> Result<Self, ConnectError>
    where
        C: Connector<Transport = T>,
    {
        let transport = match time::timeout(options.connect_timeout, connector.connect(&endpoint)).await
        {
            Err(_) => {
                return Err(ConnectError::Timeout {
                    endpoint,
                    timeout: options.connect_timeout,
                })
            }
            Ok(Err(source)) => return Err(ConnectError::Failed { endpoint, source }),
            Ok(Ok(transport)) => transport,
        };
        info!("session established with {endpoint}");
        Ok(Self::from_transport(transport, endpoint, options.call_timeout))
    }

    /// Wrap an already connected transport.
    pub fn from_transport(transport: T, endpoint: Endpoint, call_timeout: Duration) -> Self {
        Self {
            transport,
            endpoint,
            call_timeout,
            lost: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            namespaces: Mutex::new(HashMap::new()),
        }
    }

    /// Endpoint the session is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Bound applied to each request.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Change the bound applied to subsequent requests.
    pub fn set_call_timeout(&mut self, timeout: Duration) {
        self.call_timeout = timeout;
    }

    /// Whether the connection has been lost or the session closed.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Namespace URIs in index order.
    pub async fn namespace_array(&self) -> Result<Vec<String>, TransportError> {
        self.call(self.transport.namespace_array()).await
    }

    /// Resolve a namespace URI, caching the index for the session lifetime.
    pub async fn namespace_index(&self, uri: &str) -> Result<NamespaceIndex, TransportError> {
        if let Some(index) = self.cached_namespace(uri) {
            return Ok(index);
        }
        let index = self.call(self.transport.resolve_namespace_index(uri)).await?;
        debug!("namespace {uri} resolved to index {index}");
        self.namespaces
            .lock()
            .expect("poisoned namespace cache lock")
            .insert(uri.to_owned(), index);
        Ok(index)
    }

    /// Build a node reference in the namespace identified by `uri`.
    pub async fn node_ref(&self, uri: &str, identifier: Identifier) -> Result<NodeRef, TransportError> {
        let namespace = self.namespace_index(uri).await?;
        Ok(NodeRef::new(namespace, identifier))
    }

    /// Ordered children of `node`.
    pub async fn browse_children(&self, node: &NodeRef) -> Result<Vec<NodeRef>, TransportError> {
        self.call(self.transport.browse_children(node)).await
    }

    /// Browse name of `node`.
    pub async fn read_browse_name(&self, node: &NodeRef) -> Result<String, TransportError> {
        self.call(self.transport.read_browse_name(node)).await
    }

    /// Class of `node`.
    pub async fn read_node_class(&self, node: &NodeRef) -> Result<NodeClass, TransportError> {
        self.call(self.transport.read_node_class(node)).await
    }

    /// Current value of the variable `node`.
    pub async fn read_value(&self, node: &NodeRef) -> Result<Value, TransportError> {
        self.call(self.transport.read_value(node)).await
    }

    /// Write `value` to the variable `node`.
    pub async fn write_value(&self, node: &NodeRef, value: Value) -> Result<(), TransportError> {
        self.call(self.transport.write_value(node, value)).await
    }

    /// Close the transport. Only the first call reaches the transport.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lost.store(true, Ordering::Release);
        debug!("closing session with {}", self.endpoint);
        self.transport.close().await
    }

    fn cached_namespace(&self, uri: &str) -> Option<NamespaceIndex> {
        self.namespaces
            .lock()
            .expect("poisoned namespace cache lock")
            .get(uri)
            .copied()
    }

    async fn call<R, F>(&self, request: F) -> Result<R, TransportError>
    where
        F: Future<Output = Result<R, TransportError>>,
    {
        if self.is_lost() {
            return Err(TransportError::ConnectionLost(format!(
                "session with {} is no longer connected",
                self.endpoint
            )));
        }
        match time::timeout(self.call_timeout, request).await {
            Err(_) => {
                warn!("request to {} timed out after {:?}", self.endpoint, self.call_timeout);
                Err(TransportError::Timeout(self.call_timeout))
            }
            Ok(Err(err)) if err.is_fatal() => {
                warn!("session with {} lost: {err}", self.endpoint);
                self.lost.store(true, Ordering::Release);
                Err(err)
            }
            Ok(result) => result,
        }
    }
}
