// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Namespace-qualified node identifiers and their textual form.
// Author: Lukas Bower

//! Node identifiers and their text form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::OBJECTS_FOLDER_ID;

/// Integer alias for a namespace URI, resolved once per session.
pub type NamespaceIndex = u16;

/// Identifier part of a [`NodeRef`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    /// Numeric identifier (`i=`).
    Numeric(u32),
    /// String identifier (`s=`).
    String(String),
}

/// Stable reference to a node within a namespace.
///
/// Equality is structural. The textual form is `ns=<index>;i=<n>` or
/// `ns=<index>;s=<text>`, which is also the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeRef {
    namespace: NamespaceIndex,
    identifier: Identifier,
}

impl NodeRef {
    /// Construct a numeric node reference.
    #[must_use]
    pub fn numeric(namespace: NamespaceIndex, id: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(id),
        }
    }

    /// Construct a string node reference.
    #[must_use]
    pub fn string(namespace: NamespaceIndex, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(id.into()),
        }
    }

    /// Construct a reference from an explicit identifier.
    #[must_use]
    pub fn new(namespace: NamespaceIndex, identifier: Identifier) -> Self {
        Self {
            namespace,
            identifier,
        }
    }

    /// Reference to the well-known Objects folder (`ns=0;i=85`).
    #[must_use]
    pub fn objects_folder() -> Self {
        Self::numeric(0, OBJECTS_FOLDER_ID)
    }

    /// Namespace index of the reference.
    #[must_use]
    pub fn namespace(&self) -> NamespaceIndex {
        self.namespace
    }

    /// Identifier of the reference.
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(id) => write!(f, "ns={};i={id}", self.namespace),
            Identifier::String(id) => write!(f, "ns={};s={id}", self.namespace),
        }
    }
}

/// Failure to parse the textual form of a [`NodeRef`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeRefParseError {
    /// The `ns=<index>;` prefix is missing.
    #[error("node reference '{0}' must start with 'ns=<index>;'")]
    MissingNamespace(String),
    /// The namespace index is not a valid integer.
    #[error("invalid namespace index '{0}'")]
    InvalidNamespace(String),
    /// The identifier kind is neither `i=` nor `s=`.
    #[error("node reference '{0}' must use 'i=<number>' or 's=<text>'")]
    InvalidIdentifier(String),
    /// The numeric identifier is not a valid integer.
    #[error("invalid numeric identifier '{0}'")]
    InvalidNumeric(String),
}

impl FromStr for NodeRef {
    type Err = NodeRefParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let rest = text
            .strip_prefix("ns=")
            .ok_or_else(|| NodeRefParseError::MissingNamespace(text.to_owned()))?;
        let (index, identifier) = rest
            .split_once(';')
            .ok_or_else(|| NodeRefParseError::MissingNamespace(text.to_owned()))?;
        let namespace = index
            .parse::<NamespaceIndex>()
            .map_err(|_| NodeRefParseError::InvalidNamespace(index.to_owned()))?;
        if let Some(numeric) = identifier.strip_prefix("i=") {
            let id = numeric
                .parse::<u32>()
                .map_err(|_| NodeRefParseError::InvalidNumeric(numeric.to_owned()))?;
            return Ok(Self::numeric(namespace, id));
        }
        identifier
            .strip_prefix("s=")
            .map(|id| Self::string(namespace, id))
            .ok_or_else(|| NodeRefParseError::InvalidIdentifier(text.to_owned()))
    }
}

impl TryFrom<String> for NodeRef {
    type Error = NodeRefParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeRef> for String {
    fn from(value: NodeRef) -> Self {
        value.to_string()
    }
}
