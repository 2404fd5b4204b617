// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serve address-space requests to in-process and networked clients.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Request dispatch and in-process connections to the device.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use thiserror::Error;
use uasim_proto::frame::{RequestBody, ResponseBody};
use uasim_proto::ServiceError;

use crate::address_space::{AddressSpace, SharedAddressSpace};

/// The server was shut down; no further requests are served.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("device server connection closed")]
pub struct ConnectionClosed;

#[derive(Debug)]
struct ServerState {
    open: AtomicBool,
    next_session: AtomicU64,
}

/// Device server handing out connections bound to one address space.
#[derive(Debug, Clone)]
pub struct DeviceServer {
    space: SharedAddressSpace,
    state: Arc<ServerState>,
}

impl DeviceServer {
    /// Serve the supplied address space.
    pub fn new(space: SharedAddressSpace) -> Self {
        let state = ServerState {
            open: AtomicBool::new(true),
            next_session: AtomicU64::new(1),
        };
        Self {
            space,
            state: Arc::new(state),
        }
    }

    /// Shared address space backing the server.
    #[must_use]
    pub fn space(&self) -> &SharedAddressSpace {
        &self.space
    }

    /// Open a new client connection.
    pub fn connect(&self) -> Result<DeviceConnection, ConnectionClosed> {
        if !self.is_open() {
            return Err(ConnectionClosed);
        }
        let session = self.state.next_session.fetch_add(1, Ordering::Relaxed);
        debug!("device session {session} opened");
        Ok(DeviceConnection {
            space: self.space.clone(),
            state: self.state.clone(),
            session,
        })
    }

    /// Close the server and every outstanding connection.
    pub fn shutdown(&self) {
        if self.state.open.swap(false, Ordering::AcqRel) {
            debug!("device server shut down");
        }
    }

    /// Whether the server still accepts requests.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }
}

/// Client handle issuing requests against the server.
pub struct DeviceConnection {
    space: SharedAddressSpace,
    state: Arc<ServerState>,
    session: u64,
}

impl fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("session", &self.session)
            .finish()
    }
}

impl DeviceConnection {
    /// Session number assigned by the server.
    #[must_use]
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Serve one request atomically under the address space lock.
    pub fn call(&self, body: RequestBody) -> Result<ResponseBody, ConnectionClosed> {
        if !self.state.open.load(Ordering::Acquire) {
            return Err(ConnectionClosed);
        }
        debug!("session {} request {body:?}", self.session);
        let mut space = self.space.lock().expect("poisoned address space lock");
        Ok(dispatch(&mut space, body))
    }
}

/// Apply a request to the address space, mapping failures to error replies.
pub fn dispatch(space: &mut AddressSpace, body: RequestBody) -> ResponseBody {
    match handle(space, body) {
        Ok(response) => response,
        Err(error) => {
            debug!("request failed: {error}");
            ResponseBody::Error { error }
        }
    }
}

fn handle(space: &mut AddressSpace, body: RequestBody) -> Result<ResponseBody, ServiceError> {
    let response = match body {
        RequestBody::NamespaceArray => ResponseBody::NamespaceArray {
            uris: space.namespace_array(),
        },
        RequestBody::ResolveNamespace { uri } => ResponseBody::ResolveNamespace {
            index: space.namespace_index(&uri)?,
        },
        RequestBody::BrowseChildren { node } => ResponseBody::BrowseChildren {
            children: space.children(&node)?,
        },
        RequestBody::ReadBrowseName { node } => ResponseBody::ReadBrowseName {
            name: space.browse_name(&node)?,
        },
        RequestBody::ReadNodeClass { node } => ResponseBody::ReadNodeClass {
            class: space.node_class(&node)?,
        },
        RequestBody::ReadValue { node } => ResponseBody::ReadValue {
            value: space.read_value(&node)?,
        },
        RequestBody::WriteValue { node, value } => {
            space.write_value(&node, value)?;
            ResponseBody::WriteValue
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uasim_proto::{NodeRef, Value, BASE_NAMESPACE_URI};

    fn server() -> (DeviceServer, NodeRef) {
        let mut space = AddressSpace::new();
        let ns = space.register_namespace("urn:test");
        let root = space.root().clone();
        let device = space.create_object(&root, ns, "Dev").unwrap();
        let level = space
            .create_variable(&device, ns, "Level", Value::Float(1.0), true)
            .unwrap();
        (DeviceServer::new(space.into_shared()), level)
    }

    #[test]
    fn requests_are_served_against_the_model() {
        let (server, level) = server();
        let client = server.connect().unwrap();
        assert_eq!(
            client.call(RequestBody::NamespaceArray).unwrap(),
            ResponseBody::NamespaceArray {
                uris: vec![BASE_NAMESPACE_URI.to_owned(), "urn:test".to_owned()]
            }
        );
        assert_eq!(
            client
                .call(RequestBody::WriteValue {
                    node: level.clone(),
                    value: Value::Float(4.5)
                })
                .unwrap(),
            ResponseBody::WriteValue
        );
        assert_eq!(
            client.call(RequestBody::ReadValue { node: level }).unwrap(),
            ResponseBody::ReadValue {
                value: Value::Float(4.5)
            }
        );
    }

    #[test]
    fn service_failures_become_error_replies() {
        let (server, level) = server();
        let client = server.connect().unwrap();
        let reply = client
            .call(RequestBody::WriteValue {
                node: level.clone(),
                value: Value::Bool(true),
            })
            .unwrap();
        assert!(matches!(
            reply,
            ResponseBody::Error {
                error: ServiceError::TypeMismatch { .. }
            }
        ));
        let missing = NodeRef::numeric(1, 999);
        assert_eq!(
            client
                .call(RequestBody::BrowseChildren {
                    node: missing.clone()
                })
                .unwrap(),
            ResponseBody::Error {
                error: ServiceError::NodeNotFound(missing)
            }
        );
    }

    #[test]
    fn shutdown_closes_outstanding_connections() {
        let (server, _) = server();
        let client = server.connect().unwrap();
        server.shutdown();
        assert_eq!(client.call(RequestBody::NamespaceArray), Err(ConnectionClosed));
        assert!(server.connect().is_err());
    }
}
