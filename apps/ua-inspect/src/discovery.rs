// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bounded-depth, fault-isolating discovery walk over a device address space.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Discovery engine.
//!
//! [`discover`] returns a lazy [`Discovery`] walker. Each call to
//! [`Discovery::next`] visits one node depth-first, in the child order
//! reported by the device, and yields a [`DiscoveryRecord`] describing what
//! could be learned about it. Browse-name, node-class, value and children
//! requests are attempted independently; a failure in one is recorded as a
//! [`NodeFault`] on the record and never stops the walk. Only a lost
//! connection or cancellation ends a run early.
//!
//! Nodes at `max_depth` are reported but never browsed, so nothing deeper is
//! requested from the device.

use std::collections::HashSet;

use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uasim_proto::{NodeClass, NodeRef, Value};

use crate::session::TransportSession;
use crate::transport::{Transport, TransportError};

/// Case-insensitive substring patterns matched against browse names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamePatterns {
    lowered: Vec<String>,
}

impl NamePatterns {
    /// Build a pattern set. Empty patterns are ignored.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lowered = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().to_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self { lowered }
    }

    /// Whether the set holds no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lowered.is_empty()
    }

    /// Whether `name` contains any pattern, ignoring case.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.lowered.iter().any(|pattern| name.contains(pattern.as_str()))
    }
}

/// Bounds and annotations for one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Deepest level browsed; the root is depth 0.
    pub max_depth: usize,
    /// Patterns marking records as matched. Matching never prunes the walk.
    pub patterns: Option<NamePatterns>,
}

/// Operation that failed for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FaultKind {
    /// Reading the browse name or node class failed.
    Browse,
    /// Enumerating children failed; the node was treated as a leaf.
    Children,
    /// Reading the variable value failed.
    Read,
}

/// Recoverable failure recorded against a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFault {
    /// Operation that failed.
    pub kind: FaultKind,
    /// Failure reported by the session.
    pub error: TransportError,
}

/// What a discovery run learned about a single node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryRecord {
    /// Visited node.
    pub node_ref: NodeRef,
    /// Distance from the root.
    pub depth: usize,
    /// Browse name, if it could be read.
    pub browse_name: Option<String>,
    /// Node class, if it could be read.
    pub node_class: Option<NodeClass>,
    /// Value of a variable, if it could be read.
    pub value: Option<Value>,
    /// Whether the browse name matched a pattern.
    pub matched: bool,
    /// Isolated failures, in the order they occurred.
    pub faults: Vec<NodeFault>,
}

impl DiscoveryRecord {
    fn new(node_ref: NodeRef, depth: usize) -> Self {
        Self {
            node_ref,
            depth,
            browse_name: None,
            node_class: None,
            value: None,
            matched: false,
            faults: Vec::new(),
        }
    }

    /// Whether a fault of `kind` was recorded.
    #[must_use]
    pub fn has_fault(&self, kind: FaultKind) -> bool {
        self.faults.iter().any(|fault| fault.kind == kind)
    }

    /// Whether any fault was recorded.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        !self.faults.is_empty()
    }

    fn fault(&mut self, kind: FaultKind, error: TransportError) {
        warn!("{kind:?} fault on {}: {error}", self.node_ref);
        self.faults.push(NodeFault { kind, error });
    }
}

/// Conditions that end a discovery run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscoveryError {
    /// The session lost its connection.
    #[error("discovery aborted: {0}")]
    ConnectionLost(TransportError),
    /// The run was cancelled by its owner.
    #[error("discovery cancelled")]
    Cancelled,
}

/// Start a discovery run rooted at `root`.
pub fn discover<T: Transport>(
    session: &TransportSession<T>,
    root: NodeRef,
    options: DiscoveryOptions,
) -> Discovery<'_, T> {
    Discovery {
        session,
        options,
        frontier: vec![(root, 0)],
        seen: HashSet::new(),
        cancel: None,
        finished: false,
    }
}

/// Lazy depth-first walk producing one record per visited node.
#[derive(Debug)]
pub struct Discovery<'s, T> {
    session: &'s TransportSession<T>,
    options: DiscoveryOptions,
    frontier: Vec<(NodeRef, usize)>,
    seen: HashSet<NodeRef>,
    cancel: Option<CancellationToken>,
    finished: bool,
}

impl<'s, T: Transport> Discovery<'s, T> {
    /// Stop the walk before the next request once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Options driving the run.
    #[must_use]
    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Visit the next node.
    ///
    /// Returns `None` once the bounded tree is exhausted or after a fatal
    /// error has been yielded.
    pub async fn next(&mut self) -> Option<Result<DiscoveryRecord, DiscoveryError>> {
        if self.finished {
            return None;
        }
        let Some((node, depth)) = self.frontier.pop() else {
            self.finished = true;
            return None;
        };
        match self.visit(node, depth).await {
            Ok(record) => Some(Ok(record)),
            Err(err) => {
                debug!("discovery stopped: {err}");
                self.finished = true;
                self.frontier.clear();
                Some(Err(err))
            }
        }
    }

    /// Drain the walk into a vector.
    pub async fn collect(mut self) -> Result<Vec<DiscoveryRecord>, DiscoveryError> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record?);
        }
        Ok(records)
    }

    async fn visit(&mut self, node: NodeRef, depth: usize) -> Result<DiscoveryRecord, DiscoveryError> {
        let session = self.session;
        let mut record = DiscoveryRecord::new(node.clone(), depth);
        self.seen.insert(node.clone());

        self.checkpoint()?;
        match session.read_browse_name(&node).await {
            Ok(name) => record.browse_name = Some(name),
            Err(err) => record.fault(FaultKind::Browse, isolate(err)?),
        }
        if let (Some(patterns), Some(name)) = (&self.options.patterns, &record.browse_name) {
            record.matched = patterns.matches(name);
        }

        self.checkpoint()?;
        match session.read_node_class(&node).await {
            Ok(class) => record.node_class = Some(class),
            Err(err) => record.fault(FaultKind::Browse, isolate(err)?),
        }

        if record.node_class == Some(NodeClass::Variable) {
            self.checkpoint()?;
            match session.read_value(&node).await {
                Ok(value) => record.value = Some(value),
                Err(err) => record.fault(FaultKind::Read, isolate(err)?),
            }
        }

        if depth < self.options.max_depth {
            self.checkpoint()?;
            match session.browse_children(&node).await {
                Ok(children) => self.push_children(&node, children, depth + 1),
                Err(err) => record.fault(FaultKind::Children, isolate(err)?),
            }
        }
        Ok(record)
    }

    fn push_children(&mut self, parent: &NodeRef, children: Vec<NodeRef>, depth: usize) {
        for child in children.into_iter().rev() {
            if self.seen.contains(&child) || self.frontier.iter().any(|(queued, _)| *queued == child) {
                warn!("{parent} reports already discovered child {child}; skipping");
                continue;
            }
            self.frontier.push((child, depth));
        }
    }

    fn checkpoint(&self) -> Result<(), DiscoveryError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(DiscoveryError::Cancelled),
            _ => Ok(()),
        }
    }
}

fn isolate(err: TransportError) -> Result<TransportError, DiscoveryError> {
    if err.is_fatal() {
        Err(DiscoveryError::ConnectionLost(err))
    } else {
        Ok(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_match_case_insensitive_substrings() {
        let patterns = NamePatterns::new(["temp", "PRESS"]);
        assert!(patterns.matches("Temperature"));
        assert!(patterns.matches("pressure"));
        assert!(!patterns.matches("Humidity"));
    }

    #[test]
    fn empty_pattern_set_matches_nothing() {
        let patterns = NamePatterns::new(["", ""]);
        assert!(patterns.is_empty());
        assert!(!patterns.matches("MyDevice"));
    }
}
