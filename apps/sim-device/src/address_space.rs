// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Authoritative in-memory node tree served by the simulated device.
// Author: Lukas Bower

//! In-memory address space: the node tree, namespaces and variable values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uasim_proto::{
    NamespaceIndex, NodeClass, NodeRef, ServiceError, Value, ValueTag, BASE_NAMESPACE_URI,
    OBJECTS_FOLDER_NAME,
};

/// Address space shared between the generator and connection handlers.
pub type SharedAddressSpace = Arc<Mutex<AddressSpace>>;

/// Hierarchical set of typed nodes rooted at the Objects folder.
///
/// Nodes are created once and never removed. Numeric identifiers are
/// allocated per namespace from a counter that only moves forward.
#[derive(Debug)]
pub struct AddressSpace {
    namespaces: Vec<String>,
    nodes: HashMap<NodeRef, Node>,
    next_numeric: HashMap<NamespaceIndex, u32>,
    root: NodeRef,
}

impl AddressSpace {
    /// Construct an address space holding only the base namespace and the root.
    pub fn new() -> Self {
        let root = NodeRef::objects_folder();
        let mut nodes = HashMap::new();
        nodes.insert(
            root.clone(),
            Node {
                browse_name: OBJECTS_FOLDER_NAME.to_owned(),
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Object,
            },
        );
        Self {
            namespaces: vec![BASE_NAMESPACE_URI.to_owned()],
            nodes,
            next_numeric: HashMap::new(),
            root,
        }
    }

    /// Wrap the address space for sharing across tasks.
    pub fn into_shared(self) -> SharedAddressSpace {
        Arc::new(Mutex::new(self))
    }

    /// Reference of the root node.
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// Register a namespace URI, returning the existing index when already known.
    pub fn register_namespace(&mut self, uri: &str) -> NamespaceIndex {
        if let Some(index) = self.namespaces.iter().position(|known| known == uri) {
            return index as NamespaceIndex;
        }
        self.namespaces.push(uri.to_owned());
        (self.namespaces.len() - 1) as NamespaceIndex
    }

    /// Resolve a namespace URI to its index.
    pub fn namespace_index(&self, uri: &str) -> Result<NamespaceIndex, ServiceError> {
        self.namespaces
            .iter()
            .position(|known| known == uri)
            .map(|index| index as NamespaceIndex)
            .ok_or_else(|| ServiceError::NamespaceNotFound(uri.to_owned()))
    }

    /// Registered namespace URIs in index order.
    pub fn namespace_array(&self) -> Vec<String> {
        self.namespaces.clone()
    }

    /// Append an object node below `parent`.
    pub fn create_object(
        &mut self,
        parent: &NodeRef,
        namespace: NamespaceIndex,
        name: &str,
    ) -> Result<NodeRef, ServiceError> {
        self.insert(parent, namespace, name, NodeKind::Object)
    }

    /// Append a variable node below `parent`; its type is fixed by `initial`.
    pub fn create_variable(
        &mut self,
        parent: &NodeRef,
        namespace: NamespaceIndex,
        name: &str,
        initial: Value,
        writable: bool,
    ) -> Result<NodeRef, ServiceError> {
        let kind = NodeKind::Variable(VariableState {
            tag: initial.tag(),
            value: initial,
            writable,
        });
        self.insert(parent, namespace, name, kind)
    }

    /// Ordered children of a node; empty for leaves.
    pub fn children(&self, node: &NodeRef) -> Result<Vec<NodeRef>, ServiceError> {
        Ok(self.lookup(node)?.children.clone())
    }

    /// Browse name of a node.
    pub fn browse_name(&self, node: &NodeRef) -> Result<String, ServiceError> {
        Ok(self.lookup(node)?.browse_name.clone())
    }

    /// Class of a node.
    pub fn node_class(&self, node: &NodeRef) -> Result<NodeClass, ServiceError> {
        Ok(self.lookup(node)?.class())
    }

    /// Parent of a node; `None` for the root.
    pub fn parent(&self, node: &NodeRef) -> Result<Option<NodeRef>, ServiceError> {
        Ok(self.lookup(node)?.parent.clone())
    }

    /// Find the immediate child of `parent` carrying `name`.
    pub fn find_child(&self, parent: &NodeRef, name: &str) -> Result<Option<NodeRef>, ServiceError> {
        let node = self.lookup(parent)?;
        Ok(node
            .children
            .iter()
            .find(|child| {
                self.nodes
                    .get(*child)
                    .is_some_and(|candidate| candidate.browse_name == name)
            })
            .cloned())
    }

    /// Read the current value of a variable.
    pub fn read_value(&self, node: &NodeRef) -> Result<Value, ServiceError> {
        match &self.lookup(node)?.kind {
            NodeKind::Variable(state) => Ok(state.value.clone()),
            NodeKind::Object => Err(ServiceError::NotAVariable(node.clone())),
        }
    }

    /// Whether a variable accepts external writes.
    pub fn is_writable(&self, node: &NodeRef) -> Result<bool, ServiceError> {
        match &self.lookup(node)?.kind {
            NodeKind::Variable(state) => Ok(state.writable),
            NodeKind::Object => Err(ServiceError::NotAVariable(node.clone())),
        }
    }

    /// Write a value on behalf of an external caller.
    ///
    /// Rejected writes leave the stored value untouched.
    pub fn write_value(&mut self, node: &NodeRef, value: Value) -> Result<(), ServiceError> {
        self.store(node, value, WriteOrigin::External)
    }

    /// Write a value on behalf of the device itself, bypassing the writable flag.
    ///
    /// The type tag is still enforced.
    pub fn set_value(&mut self, node: &NodeRef, value: Value) -> Result<(), ServiceError> {
        self.store(node, value, WriteOrigin::Owner)
    }

    /// Total number of nodes including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// An address space always holds its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn store(&mut self, node: &NodeRef, value: Value, origin: WriteOrigin) -> Result<(), ServiceError> {
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| ServiceError::NodeNotFound(node.clone()))?;
        let NodeKind::Variable(state) = &mut entry.kind else {
            return Err(ServiceError::NotAVariable(node.clone()));
        };
        if origin == WriteOrigin::External && !state.writable {
            return Err(ServiceError::NotWritable(node.clone()));
        }
        if value.tag() != state.tag {
            return Err(ServiceError::TypeMismatch {
                node: node.clone(),
                expected: state.tag,
                found: value.tag(),
            });
        }
        state.value = value;
        Ok(())
    }

    fn insert(
        &mut self,
        parent: &NodeRef,
        namespace: NamespaceIndex,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeRef, ServiceError> {
        if usize::from(namespace) >= self.namespaces.len() {
            return Err(ServiceError::UnknownNamespace(namespace));
        }
        let parent_node = self
            .nodes
            .get(parent)
            .ok_or_else(|| ServiceError::InvalidParent(parent.clone()))?;
        let duplicate = parent_node.children.iter().any(|child| {
            self.nodes
                .get(child)
                .is_some_and(|sibling| sibling.browse_name == name)
        });
        if duplicate {
            return Err(ServiceError::DuplicateBrowseName {
                parent: parent.clone(),
                name: name.to_owned(),
            });
        }
        let node_ref = self.allocate(namespace);
        self.nodes.insert(
            node_ref.clone(),
            Node {
                browse_name: name.to_owned(),
                parent: Some(parent.clone()),
                children: Vec::new(),
                kind,
            },
        );
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(node_ref.clone());
        }
        Ok(node_ref)
    }

    fn allocate(&mut self, namespace: NamespaceIndex) -> NodeRef {
        loop {
            let counter = self.next_numeric.entry(namespace).or_insert(1);
            let candidate = NodeRef::numeric(namespace, *counter);
            *counter += 1;
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    fn lookup(&self, node: &NodeRef) -> Result<&Node, ServiceError> {
        self.nodes
            .get(node)
            .ok_or_else(|| ServiceError::NodeNotFound(node.clone()))
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOrigin {
    External,
    Owner,
}

#[derive(Debug, Clone)]
struct Node {
    browse_name: String,
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    kind: NodeKind,
}

impl Node {
    fn class(&self) -> NodeClass {
        match self.kind {
            NodeKind::Object => NodeClass::Object,
            NodeKind::Variable(_) => NodeClass::Variable,
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Object,
    Variable(VariableState),
}

#[derive(Debug, Clone)]
struct VariableState {
    value: Value,
    tag: ValueTag,
    writable: bool,
}
