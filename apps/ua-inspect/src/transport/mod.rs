// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Transport abstraction carrying address-space requests to a device.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Transports carry one request at a time to a device and return its reply.
//!
//! A [`Transport`] is a connected channel; a [`Connector`] opens one for an
//! endpoint. Timeouts and connection-loss bookkeeping live in
//! [`crate::TransportSession`], not in the transports.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uasim_proto::frame::{RequestBody, ResponseBody};
use uasim_proto::{Endpoint, NamespaceIndex, NodeClass, NodeRef, ServiceError, Value};

mod in_process;
mod tcp;

pub use in_process::{InProcessConnector, InProcessTransport};
pub use tcp::{TcpConnector, TcpTransport};

/// Failure of a single transport call.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum TransportError {
    /// The connection is gone; the session cannot continue.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The call did not complete within the configured timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    /// The device rejected the request.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The device replied with something that does not answer the request.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether the error ends the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    pub(crate) fn unexpected(expected: &str, found: &ResponseBody) -> Self {
        Self::Protocol(format!("expected {expected} reply, received {found:?}"))
    }
}

/// Connected request/response channel to a device.
///
/// The typed operations are provided on top of [`Transport::request`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and wait for its reply.
    ///
    /// Service failures reported by the device arrive as
    /// [`ResponseBody::Error`]; only channel failures are returned as errors.
    async fn request(&self, body: RequestBody) -> Result<ResponseBody, TransportError>;

    /// Release the channel.
    async fn close(&self) -> Result<(), TransportError>;

    /// Namespace URIs in index order.
    async fn namespace_array(&self) -> Result<Vec<String>, TransportError> {
        match checked(self.request(RequestBody::NamespaceArray).await?)? {
            ResponseBody::NamespaceArray { uris } => Ok(uris),
            other => Err(TransportError::unexpected("namespace_array", &other)),
        }
    }

    /// Resolve a namespace URI to its index.
    async fn resolve_namespace_index(&self, uri: &str) -> Result<NamespaceIndex, TransportError> {
        let body = RequestBody::ResolveNamespace {
            uri: uri.to_owned(),
        };
        match checked(self.request(body).await?)? {
            ResponseBody::ResolveNamespace { index } => Ok(index),
            other => Err(TransportError::unexpected("resolve_namespace", &other)),
        }
    }

    /// Ordered children of `node`.
    async fn browse_children(&self, node: &NodeRef) -> Result<Vec<NodeRef>, TransportError> {
        let body = RequestBody::BrowseChildren { node: node.clone() };
        match checked(self.request(body).await?)? {
            ResponseBody::BrowseChildren { children } => Ok(children),
            other => Err(TransportError::unexpected("browse_children", &other)),
        }
    }

    /// Browse name of `node`.
    async fn read_browse_name(&self, node: &NodeRef) -> Result<String, TransportError> {
        let body = RequestBody::ReadBrowseName { node: node.clone() };
        match checked(self.request(body).await?)? {
            ResponseBody::ReadBrowseName { name } => Ok(name),
            other => Err(TransportError::unexpected("read_browse_name", &other)),
        }
    }

    /// Class of `node`.
    async fn read_node_class(&self, node: &NodeRef) -> Result<NodeClass, TransportError> {
        let body = RequestBody::ReadNodeClass { node: node.clone() };
        match checked(self.request(body).await?)? {
            ResponseBody::ReadNodeClass { class } => Ok(class),
            other => Err(TransportError::unexpected("read_node_class", &other)),
        }
    }

    /// Current value of the variable `node`.
    async fn read_value(&self, node: &NodeRef) -> Result<Value, TransportError> {
        let body = RequestBody::ReadValue { node: node.clone() };
        match checked(self.request(body).await?)? {
            ResponseBody::ReadValue { value } => Ok(value),
            other => Err(TransportError::unexpected("read_value", &other)),
        }
    }

    /// Write `value` to the variable `node` through the external path.
    async fn write_value(&self, node: &NodeRef, value: Value) -> Result<(), TransportError> {
        let body = RequestBody::WriteValue {
            node: node.clone(),
            value,
        };
        match checked(self.request(body).await?)? {
            ResponseBody::WriteValue => Ok(()),
            other => Err(TransportError::unexpected("write_value", &other)),
        }
    }
}

/// Opens transports for endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Establish a channel to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Transport, TransportError>;
}

fn checked(body: ResponseBody) -> Result<ResponseBody, TransportError> {
    match body {
        ResponseBody::Error { error } => Err(TransportError::Service(error)),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_loss_is_fatal() {
        assert!(TransportError::ConnectionLost("reset".into()).is_fatal());
        assert!(!TransportError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!TransportError::Protocol("tag".into()).is_fatal());
        assert!(!TransportError::Service(ServiceError::NotWritable(NodeRef::numeric(1, 4))).is_fatal());
    }

    #[test]
    fn service_errors_keep_their_message() {
        let err = TransportError::from(ServiceError::NodeNotFound(NodeRef::numeric(2, 9)));
        assert_eq!(err.to_string(), "node ns=2;i=9 not found");
    }
}
