//! Handle allocation and activation dispatch table.
//!
//! Native menus identify entries by small integers. A [`HandleTable`] assigns
//! those integers to the nodes of one menu tree and maps them back when the
//! shell reports an activation.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::menu::item::MenuNode;

/// First handle handed out. Lower values collide with command identifiers the
/// Win32 shell reserves for its own use.
pub const HANDLE_BASE: u32 = 1000;

/// Most handles one tree may use. Win32 reports activations as 16-bit command
/// identifiers, so the last handle must stay at or below `u16::MAX`.
pub const MAX_HANDLES: usize = (u16::MAX as u32 - HANDLE_BASE + 1) as usize;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Integer identifying one menu entry to the native shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

impl Handle {
    /// The raw native identifier.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Identifies one allocation. Every [`HandleTable::allocate`] call gets a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Generation(u64);

impl Generation {
    fn next() -> Self {
        Generation(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }
}

/// A native "entry activated" notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Activation {
    /// Generation of the table the activated entry was bound from.
    pub generation: Generation,
    /// The activated entry.
    pub handle: Handle,
}

/// Position of a node in its tree: one child index per level.
pub type NodePath = Vec<usize>;

/// Maps handles to the nodes of one menu tree, in both directions.
pub struct HandleTable {
    generation: Generation,
    tree: Rc<[MenuNode]>,
    paths: Vec<NodePath>,
    handles: HashMap<NodePath, Handle>,
}

impl HandleTable {
    /// Walks `tree` depth-first, parents before children, and assigns the next
    /// handle to every node that is not a separator.
    pub fn allocate(tree: impl Into<Rc<[MenuNode]>>) -> Self {
        let tree = tree.into();
        let mut paths = Vec::new();
        let mut path = Vec::new();
        Self::walk(&tree, &mut path, &mut paths);

        let handles = paths
            .iter()
            .enumerate()
            .map(|(index, path)| (path.clone(), Self::handle_at(index)))
            .collect();

        Self {
            generation: Generation::next(),
            tree,
            paths,
            handles,
        }
    }

    fn walk(items: &[MenuNode], path: &mut NodePath, out: &mut Vec<NodePath>) {
        for (index, item) in items.iter().enumerate() {
            if item.is_separator() {
                continue;
            }
            path.push(index);
            out.push(path.clone());
            Self::walk(item.children(), path, out);
            path.pop();
        }
    }

    fn handle_at(index: usize) -> Handle {
        Handle(HANDLE_BASE + index as u32)
    }

    /// Generation stamped on every activation bound from this table.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The tree this table was allocated for.
    pub fn tree(&self) -> &[MenuNode] {
        &self.tree
    }

    /// Number of allocated handles.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` if no node received a handle.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Handle assigned to the node at `path`, if any.
    pub fn handle_of(&self, path: &[usize]) -> Option<Handle> {
        self.handles.get(path).copied()
    }

    /// Node assigned `handle` in this table, ignoring generations.
    pub fn node(&self, handle: Handle) -> Option<&MenuNode> {
        let index = handle.0.checked_sub(HANDLE_BASE)? as usize;
        let path = self.paths.get(index)?;
        Self::node_at(&self.tree, path)
    }

    /// Resolves an activation to its node.
    ///
    /// Returns `None` when the activation was bound from another table or the
    /// handle is out of range. Callers drop such events.
    pub fn resolve(&self, activation: Activation) -> Option<&MenuNode> {
        if activation.generation != self.generation {
            return None;
        }
        self.node(activation.handle)
    }

    /// Activation for `handle` stamped with this table's generation.
    pub fn activation(&self, handle: Handle) -> Activation {
        Activation {
            generation: self.generation,
            handle,
        }
    }

    fn node_at<'a>(items: &'a [MenuNode], path: &[usize]) -> Option<&'a MenuNode> {
        let (first, rest) = path.split_first()?;
        let node = items.get(*first)?;
        if rest.is_empty() {
            Some(node)
        } else {
            Self::node_at(node.children(), rest)
        }
    }
}
