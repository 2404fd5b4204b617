// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Resolve browse paths of exact browse names to node references.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Resolve browse-name paths one level at a time.

use log::debug;
use thiserror::Error;
use uasim_proto::NodeRef;

use crate::session::TransportSession;
use crate::transport::{Transport, TransportError};

/// Failure to resolve a browse path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocateError {
    /// No child of `parent` carries the browse name `name`.
    #[error("{parent} has no child named '{name}'")]
    NoSuchChild {
        /// Node whose children were searched.
        parent: NodeRef,
        /// Browse name that was not found.
        name: String,
    },
    /// A request on the path failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Split a `/`-separated browse path into its segments.
#[must_use]
pub fn split_browse_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Walk `path` from `start`, one level per segment.
///
/// Each segment must equal the browse name of a child exactly. An empty path
/// resolves to `start`.
pub async fn locate<T, S>(
    session: &TransportSession<T>,
    start: &NodeRef,
    path: &[S],
) -> Result<NodeRef, LocateError>
where
    T: Transport,
    S: AsRef<str>,
{
    let mut current = start.clone();
    for segment in path {
        let name = segment.as_ref();
        current = child_named(session, &current, name)
            .await?
            .ok_or_else(|| LocateError::NoSuchChild {
                parent: current.clone(),
                name: name.to_owned(),
            })?;
        debug!("browse path segment '{name}' resolved to {current}");
    }
    Ok(current)
}

async fn child_named<T: Transport>(
    session: &TransportSession<T>,
    parent: &NodeRef,
    name: &str,
) -> Result<Option<NodeRef>, TransportError> {
    for child in session.browse_children(parent).await? {
        if session.read_browse_name(&child).await? == name {
            return Ok(Some(child));
        }
    }
    Ok(None)
}
