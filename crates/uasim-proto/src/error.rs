// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Service-level failures reported by the address space for a single request.
// Author: Lukas Bower

//! Per-request service failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{NamespaceIndex, NodeRef, ValueTag};

/// Per-request failure raised by the address space.
///
/// All variants are recoverable: they describe one operation on one node and
/// never invalidate the session that carried the request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ServiceError {
    /// The referenced node does not exist.
    #[error("node {0} not found")]
    NodeNotFound(NodeRef),
    /// A value operation targeted an object node.
    #[error("node {0} is not a variable")]
    NotAVariable(NodeRef),
    /// The written value does not carry the variable's fixed type.
    #[error("type mismatch on {node}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Target variable.
        node: NodeRef,
        /// Tag fixed at creation.
        expected: ValueTag,
        /// Tag of the rejected value.
        found: ValueTag,
    },
    /// External write to a variable created read-only.
    #[error("node {0} is not writable")]
    NotWritable(NodeRef),
    /// Node creation named a parent that does not exist.
    #[error("parent {0} does not exist")]
    InvalidParent(NodeRef),
    /// A sibling already uses the requested browse name.
    #[error("{parent} already has a child named '{name}'")]
    DuplicateBrowseName {
        /// Parent node.
        parent: NodeRef,
        /// Conflicting browse name.
        name: String,
    },
    /// No namespace is registered under the URI.
    #[error("namespace '{0}' not found")]
    NamespaceNotFound(String),
    /// The namespace index has not been registered.
    #[error("namespace index {0} is not registered")]
    UnknownNamespace(NamespaceIndex),
}
