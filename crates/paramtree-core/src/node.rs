//! Named, addressable positions in the parameter tree
//!
//! Child lists are copy-on-write: a structural change builds a new list
//! and swaps it in under the node's lock, so the swap is the only step that
//! publishes a new child. Readers clone the current list (an `Arc`) and
//! iterate it without holding any lock.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;

use crate::device::DeviceContext;
use crate::parameter::{Parameter, ParameterSpec};
use crate::value::ValueError;

/// Characters OSC reserves for address patterns
const RESERVED_CHARS: &[char] = &['/', ' ', '#', '*', ',', '?', '[', ']', '{', '}'];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("address already in use: {0}")]
    AddressConflict(String),
    #[error("invalid node name: {0:?}")]
    InvalidName(String),
    #[error("invalid default value: {0}")]
    InvalidDefault(#[from] ValueError),
}

/// A node of the tree; may carry a parameter and/or children
pub struct Node {
    name: String,
    parent: Weak<Node>,
    children: RwLock<Arc<Vec<Arc<Node>>>>,
    parameter: RwLock<Option<Arc<Parameter>>>,
    context: Arc<DeviceContext>,
    initialized: AtomicBool,
}

impl Node {
    pub(crate) fn new_root(context: Arc<DeviceContext>) -> Arc<Node> {
        Arc::new(Node {
            name: String::new(),
            parent: Weak::new(),
            children: RwLock::new(Arc::new(Vec::new())),
            parameter: RwLock::new(None),
            context,
            initialized: AtomicBool::new(false),
        })
    }

    /// Name segment; empty for the root
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.upgrade()
    }

    pub fn is_root(&self) -> bool {
        self.name.is_empty()
    }

    /// Full `/`-joined address; the root is `/`
    pub fn address(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        let mut segments = vec![self.name.clone()];
        let mut current = self.parent.upgrade();
        while let Some(node) = current {
            if !node.is_root() {
                segments.push(node.name.clone());
            }
            current = node.parent.upgrade();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    pub fn parameter(&self) -> Option<Arc<Parameter>> {
        self.parameter.read().clone()
    }

    pub fn has_parameter(&self) -> bool {
        self.parameter.read().is_some()
    }

    pub fn has_children(&self) -> bool {
        !self.children.read().is_empty()
    }

    /// Attach a parameter declared by `spec` to this node
    pub fn create_parameter(
        self: &Arc<Self>,
        spec: &ParameterSpec,
    ) -> Result<Arc<Parameter>, NodeError> {
        let mut slot = self.parameter.write();
        if slot.is_some() {
            return Err(NodeError::AddressConflict(self.address()));
        }
        let parameter = Arc::new(Parameter::new(
            Arc::downgrade(self),
            spec,
            self.context.clone(),
        )?);
        *slot = Some(parameter.clone());
        debug!(address = %self.address(), value_type = %parameter.value_type(), "Created parameter");
        Ok(parameter)
    }

    /// Detach this node's parameter and return it. The node stays in the
    /// tree as a plain container. Endpoints see the path removed and added
    /// again so that peers drop the stale attributes.
    pub fn remove_parameter(self: &Arc<Self>) -> Option<Arc<Parameter>> {
        let removed = self.parameter.write().take()?;
        debug!(address = %self.address(), "Removed parameter");
        if self.is_initialized() {
            self.context.announce_removed(&self.address());
            self.context.announce_created(self);
        }
        Some(removed)
    }

    /// Whether `parameter` is the one currently attached here
    pub(crate) fn holds(&self, parameter: &Parameter) -> bool {
        self.parameter
            .read()
            .as_ref()
            .is_some_and(|attached| std::ptr::eq(Arc::as_ptr(attached), parameter))
    }

    /// Direct children in insertion order
    pub fn children(&self) -> Children {
        Children {
            nodes: self.children.read().clone(),
            index: 0,
        }
    }

    pub fn child(&self, name: &str) -> Option<Arc<Node>> {
        self.children.read().iter().find(|c| c.name == name).cloned()
    }

    /// Create a new child. Fails if a sibling already uses `name`.
    pub fn create_child(self: &Arc<Self>, name: &str) -> Result<Arc<Node>, NodeError> {
        self.insert_child(name, false)
    }

    /// Return the child called `name`, creating it when absent
    pub fn find_or_create_child(self: &Arc<Self>, name: &str) -> Result<Arc<Node>, NodeError> {
        self.insert_child(name, true)
    }

    fn insert_child(
        self: &Arc<Self>,
        name: &str,
        reuse_existing: bool,
    ) -> Result<Arc<Node>, NodeError> {
        validate_name(name)?;

        let child = {
            let mut children = self.children.write();
            if let Some(existing) = children.iter().find(|c| c.name == name) {
                if reuse_existing {
                    return Ok(existing.clone());
                }
                return Err(NodeError::AddressConflict(existing.address()));
            }

            let child = Arc::new(Node {
                name: name.to_string(),
                parent: Arc::downgrade(self),
                children: RwLock::new(Arc::new(Vec::new())),
                parameter: RwLock::new(None),
                context: self.context.clone(),
                initialized: AtomicBool::new(self.is_initialized()),
            });
            let mut updated = Vec::with_capacity(children.len() + 1);
            updated.extend(children.iter().cloned());
            updated.push(child.clone());
            *children = Arc::new(updated);
            child
        };

        if child.is_initialized() {
            self.context.announce_created(&child);
        }
        Ok(child)
    }

    /// Remove the child called `name` and its subtree
    pub fn remove_child(&self, name: &str) -> bool {
        let removed = {
            let mut children = self.children.write();
            let Some(position) = children.iter().position(|c| c.name == name) else {
                return false;
            };
            let mut updated: Vec<Arc<Node>> = children.iter().cloned().collect();
            let removed = updated.remove(position);
            *children = Arc::new(updated);
            removed
        };

        if removed.is_initialized() {
            let address = removed.address();
            self.context.announce_removed(&address);
        }
        true
    }

    /// Resolve a `/`-delimited path below this node. A path with no
    /// segments (`"/"` or `""`) resolves to the node itself.
    pub fn find(self: &Arc<Self>, path: &str) -> Option<Arc<Node>> {
        let mut current = self.clone();
        for segment in split_path(path) {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Pre-order walk over descendants, `depth` levels deep (`None` for all)
    pub fn descendants(&self, depth: Option<usize>) -> Descendants {
        let stack = if depth == Some(0) {
            Vec::new()
        } else {
            vec![(self.children(), 1)]
        };
        Descendants { stack, depth }
    }

    /// Descendants that carry no parameter but have children of their own
    pub fn get_nodes(&self, depth: Option<usize>) -> impl Iterator<Item = Arc<Node>> {
        self.descendants(depth)
            .filter(|node| !node.has_parameter() && node.has_children())
    }

    /// Parameters found in the subtree, in pre-order
    pub fn get_parameters(&self, depth: Option<usize>) -> impl Iterator<Item = Arc<Parameter>> {
        self.descendants(depth).filter_map(|node| node.parameter())
    }

    /// Finalize the subtree after bulk construction.
    ///
    /// Nodes created before `init()` are not announced to endpoints; this
    /// announces each of them once. Children created under an initialized
    /// node are announced as they appear.
    pub fn init(self: &Arc<Self>) {
        if !self.initialized.swap(true, Ordering::SeqCst) && !self.is_root() {
            self.context.announce_created(self);
        }
        for child in self.children() {
            child.init();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// Nodes compare by identity
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Node {}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address())
            .field("children", &self.children.read().len())
            .field("parameter", &self.has_parameter())
            .finish()
    }
}

/// Restartable iterator over a snapshot of a node's children
#[derive(Clone)]
pub struct Children {
    nodes: Arc<Vec<Arc<Node>>>,
    index: usize,
}

impl Iterator for Children {
    type Item = Arc<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.get(self.index)?.clone();
        self.index += 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.nodes.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Children {}

/// Depth-limited pre-order iterator, see [`Node::descendants`]
#[derive(Clone)]
pub struct Descendants {
    stack: Vec<(Children, usize)>,
    depth: Option<usize>,
}

impl Iterator for Descendants {
    type Item = Arc<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (children, level) = self.stack.last_mut()?;
            let level = *level;
            match children.next() {
                Some(node) => {
                    if self.depth.map_or(true, |max| level < max) && node.has_children() {
                        self.stack.push((node.children(), level + 1));
                    }
                    return Some(node);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn validate_name(name: &str) -> Result<(), NodeError> {
    if name.is_empty() || name.contains(RESERVED_CHARS) {
        return Err(NodeError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::value::ValueType;

    fn build() -> Device {
        let device = Device::new("tree");
        for (path, value_type) in [
            ("int", ValueType::Int),
            ("float", ValueType::Float),
            ("special/bool", ValueType::Bool),
            ("string", ValueType::String),
            ("list/vec2f", ValueType::Vec2f),
            ("list/vec3f", ValueType::Vec3f),
            ("list/vec4f", ValueType::Vec4f),
            ("list/list", ValueType::List),
            ("special/char", ValueType::Char),
        ] {
            device.add_param(ParameterSpec::new(path, value_type)).unwrap();
        }
        device
    }

    #[test]
    fn test_root_address() {
        let device = build();
        assert_eq!(device.root_node().to_string(), "/");
        assert_eq!(device.find_node("/list/vec3f").unwrap().address(), "/list/vec3f");
    }

    #[test]
    fn test_counts() {
        let device = build();
        let root = device.root_node();
        assert_eq!(root.children().len(), 5);
        assert_eq!(root.get_nodes(None).count(), 2);
        assert_eq!(root.get_parameters(None).count(), 9);
        assert_eq!(root.get_parameters(Some(1)).count(), 3);

        let nodes: Vec<_> = root.get_nodes(None).collect();
        assert_eq!(nodes[0].name(), "special");
        assert_eq!(nodes[0].get_parameters(None).count(), 2);
        assert_eq!(nodes[1].name(), "list");
        assert_eq!(nodes[1].get_parameters(None).count(), 4);
    }

    #[test]
    fn test_insertion_order_is_stable() {
        let device = build();
        let names = |device: &Device| -> Vec<String> {
            device
                .root_node()
                .descendants(None)
                .map(|n| n.address())
                .collect()
        };
        let first = names(&device);
        assert_eq!(
            first,
            vec![
                "/int",
                "/float",
                "/special",
                "/special/bool",
                "/special/char",
                "/string",
                "/list",
                "/list/vec2f",
                "/list/vec3f",
                "/list/vec4f",
                "/list/list",
            ]
        );
        assert_eq!(first, names(&device));
    }

    #[test]
    fn test_children_iterator_restarts() {
        let device = build();
        let children = device.root_node().children();
        let again = children.clone();
        assert_eq!(children.count(), again.count());
    }

    #[test]
    fn test_find_returns_same_node() {
        let device = build();
        let found = device.find_node("/special/bool").unwrap();
        let param = found.parameter().unwrap();
        assert!(Arc::ptr_eq(&found, &param.node().unwrap()));

        let special = device.root_node().child("special").unwrap();
        let via_traversal = special.child("bool").unwrap();
        assert_eq!(*found, *via_traversal);
        assert!(device.find_node("/special/missing").is_none());
        assert!(device.find_node("/int/deeper").is_none());
    }

    #[test]
    fn test_sibling_conflict() {
        let device = Device::new("tree");
        let root = device.root_node();
        root.create_child("a").unwrap();
        assert!(matches!(
            root.create_child("a"),
            Err(NodeError::AddressConflict(address)) if address == "/a"
        ));
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_invalid_names() {
        let device = Device::new("tree");
        let root = device.root_node();
        for name in ["", "a/b", "a b", "x*", "{y}"] {
            assert!(matches!(root.create_child(name), Err(NodeError::InvalidName(_))));
        }
    }

    #[test]
    fn test_depth_zero_is_empty() {
        let device = build();
        assert_eq!(device.root_node().descendants(Some(0)).count(), 0);
    }

    #[test]
    fn test_remove_child() {
        let device = build();
        let root = device.root_node();
        assert!(root.remove_child("list"));
        assert!(!root.remove_child("list"));
        assert_eq!(root.get_parameters(None).count(), 5);
        assert!(device.find_node("/list/vec2f").is_none());
    }

    #[test]
    fn test_init_is_idempotent() {
        let device = build();
        let root = device.root_node();
        root.init();
        root.init();
        assert!(root.descendants(None).all(|n| n.is_initialized()));

        let late = root.create_child("late").unwrap();
        assert!(late.is_initialized());
    }
}
