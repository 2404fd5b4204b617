// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Shared vocabulary for the simulated device and the address-space inspector.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Node identifiers, typed values, service errors and request frames shared
//! by the simulated device (`sim-device`) and the inspector (`ua-inspect`).
//!
//! Nothing in this crate performs I/O. Both sides agree on these types and
//! exchange them either in-process or as newline-delimited JSON frames.

mod endpoint;
mod error;
pub mod frame;
mod node_ref;
mod value;

pub use endpoint::{Endpoint, EndpointError, DEFAULT_PORT};
pub use error::ServiceError;
pub use node_ref::{Identifier, NamespaceIndex, NodeRef, NodeRefParseError};
pub use value::{Value, ValueParseError, ValueTag};

use serde::{Deserialize, Serialize};

/// URI of the base namespace, always registered at index 0.
pub const BASE_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

/// Numeric identifier of the well-known Objects folder in namespace 0.
pub const OBJECTS_FOLDER_ID: u32 = 85;

/// Browse name of the well-known Objects folder.
pub const OBJECTS_FOLDER_NAME: &str = "Objects";

/// Class of a node in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// Structural node that groups children.
    Object,
    /// Node carrying a typed value.
    Variable,
}

impl std::fmt::Display for NodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Object => "Object",
            Self::Variable => "Variable",
        };
        write!(f, "{label}")
    }
}
