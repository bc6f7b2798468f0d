//! Menu node data structures.
//!
//! A tray menu is an ordered tree of [`MenuNode`]s. A node is either a visual
//! separator, an actionable entry (plain or checkable), or a folder hosting a
//! submenu. Nodes are plain data owned by the application until they are handed
//! to a session.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::tray::session::TrayControl;

/// Label reserved for visual separators.
pub const SEPARATOR: &str = "-";

/// Function invoked when a menu entry is activated.
///
/// Receives the session that dispatched the activation, so the callback can
/// replace the menu or stop the tray, and the node that was activated.
pub type Callback = Rc<dyn Fn(&mut dyn TrayControl, &MenuNode)>;

/// Opaque application value carried by a node.
pub type Context = Rc<dyn Any>;

/// Whether an entry can be checked, and if so, its current state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CheckState {
    /// Rendered as a plain entry without a toggle.
    #[default]
    NotCheckable,
    /// Rendered as a toggle that is off.
    Unchecked,
    /// Rendered as a toggle that is on.
    Checked,
}

impl CheckState {
    /// Returns `true` if the entry renders as a toggle.
    pub fn is_checkable(self) -> bool {
        !matches!(self, CheckState::NotCheckable)
    }

    /// Returns `true` only for [`CheckState::Checked`].
    pub fn is_checked(self) -> bool {
        matches!(self, CheckState::Checked)
    }

    /// Flips a toggle. Non-checkable entries stay non-checkable.
    pub fn toggled(self) -> Self {
        match self {
            CheckState::NotCheckable => CheckState::NotCheckable,
            CheckState::Unchecked => CheckState::Checked,
            CheckState::Checked => CheckState::Unchecked,
        }
    }
}

impl From<Option<bool>> for CheckState {
    fn from(checked: Option<bool>) -> Self {
        match checked {
            None => CheckState::NotCheckable,
            Some(false) => CheckState::Unchecked,
            Some(true) => CheckState::Checked,
        }
    }
}

/// One entry in the tray menu tree.
#[derive(Clone, Default)]
pub struct MenuNode {
    /// Display text, or [`SEPARATOR`] for a divider.
    pub label: String,
    /// Disabled entries are shown greyed out and never fire their callback.
    pub disabled: bool,
    /// Toggle rendering mode and state.
    pub check: CheckState,
    /// Invoked on activation.
    pub callback: Option<Callback>,
    /// Passed through to the callback untouched.
    pub context: Option<Context>,
    /// Child entries. A node with a submenu is a folder.
    pub submenu: Option<Vec<MenuNode>>,
}

impl MenuNode {
    /// Creates a plain, enabled entry with the given label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Creates a visual separator.
    pub fn separator() -> Self {
        Self::new(SEPARATOR)
    }

    /// Creates a folder entry hosting `children`.
    pub fn submenu(label: impl Into<String>, children: Vec<MenuNode>) -> Self {
        Self::new(label).with_submenu(children)
    }

    /// Makes the entry checkable with the given initial state.
    pub fn checkable(mut self, checked: bool) -> Self {
        self.check = CheckState::from(Some(checked));
        self
    }

    /// Sets whether the entry rejects activation.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Attaches the activation callback.
    pub fn on_activate<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut dyn TrayControl, &MenuNode) + 'static,
    {
        self.callback = Some(Rc::new(callback));
        self
    }

    /// Attaches an opaque application value.
    pub fn with_context<T: Any>(mut self, context: T) -> Self {
        self.context = Some(Rc::new(context));
        self
    }

    /// Replaces the children of this entry.
    pub fn with_submenu(mut self, children: Vec<MenuNode>) -> Self {
        self.submenu = Some(children);
        self
    }

    /// Returns `true` if this node renders as a divider.
    pub fn is_separator(&self) -> bool {
        self.label == SEPARATOR
    }

    /// Returns `true` if this node hosts a submenu.
    pub fn is_folder(&self) -> bool {
        self.submenu.is_some()
    }

    /// Returns `true` if activating this node may fire its callback.
    ///
    /// Separators, disabled entries and folders never fire, even when they
    /// carry a callback.
    pub fn is_actionable(&self) -> bool {
        !self.is_separator() && !self.disabled && !self.is_folder()
    }

    /// Downcasts the attached context.
    pub fn context_as<T: Any>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|context| context.downcast_ref())
    }

    /// Children of this node, empty for leaves.
    pub fn children(&self) -> &[MenuNode] {
        self.submenu.as_deref().unwrap_or_default()
    }

    /// Recursively searches `items` for the first node matching `predicate`.
    pub fn find_mut<'a, P>(items: &'a mut [MenuNode], predicate: &P) -> Option<&'a mut MenuNode>
    where
        P: Fn(&MenuNode) -> bool,
    {
        for item in items {
            if predicate(item) {
                return Some(item);
            }
            if let Some(children) = item.submenu.as_deref_mut()
                && let Some(found) = Self::find_mut(children, predicate)
            {
                return Some(found);
            }
        }
        None
    }
}

impl fmt::Debug for MenuNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuNode")
            .field("label", &self.label)
            .field("disabled", &self.disabled)
            .field("check", &self.check)
            .field("callback", &self.callback.is_some())
            .field("context", &self.context.is_some())
            .field("submenu", &self.submenu)
            .finish()
    }
}
