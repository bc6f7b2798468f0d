//! Menu model and handle allocation.
//!
//! This module defines the menu tree applications build and the table that maps
//! native entry identifiers back to the nodes of that tree.

pub mod handle;
pub mod item;

pub use handle::{Activation, Generation, HANDLE_BASE, Handle, HandleTable, MAX_HANDLES, NodePath};
pub use item::{Callback, CheckState, Context, MenuNode, SEPARATOR};
