//! Native menu binders and event sources.
//!
//! A [`Backend`] turns a lowered menu into the shell's own menu object, keeps
//! exactly one of them current, and adapts the shell's event delivery into
//! single [`NativeEvent`]s. Dispatch to callbacks happens in the session, so a
//! backend only tags entries with handles and forwards raw activations.

pub mod headless;
#[cfg(all(unix, not(target_os = "macos")))]
pub mod ksni_impl;
#[cfg(windows)]
pub mod windows;

use crate::error::{TrayError, TrayResult};
use crate::menu::handle::{Generation, Handle, HandleTable};
use crate::menu::item::{CheckState, MenuNode};
use crate::tray::event::NativeEvent;
use crate::tray::icon::Icon;

pub use headless::{HeadlessBackend, HeadlessShell};
#[cfg(all(unix, not(target_os = "macos")))]
pub use ksni_impl::{KsniBackend, KsniTray};
#[cfg(windows)]
pub use windows::Win32Backend;

/// Backend used by [`Session::init`](crate::Session::init) on this platform.
#[cfg(all(unix, not(target_os = "macos")))]
pub type PlatformBackend = KsniBackend;

/// Backend used by [`Session::init`](crate::Session::init) on this platform.
#[cfg(windows)]
pub type PlatformBackend = Win32Backend;

/// One shell integration.
///
/// All methods are called from the thread that owns the session. The only
/// cross-thread path is the [`PostExit`] returned by [`Backend::exit_signal`].
pub trait Backend {
    /// The shell's menu object.
    type Menu;

    /// Registers the notification-area presence.
    fn register(&mut self, icon: &Icon) -> TrayResult<()>;

    /// Materializes a native menu for `menu`, every entry tagged with its handle.
    fn bind(&mut self, menu: &BoundMenu) -> TrayResult<Self::Menu>;

    /// Replaces the icon and makes `menu` current. The previously current
    /// menu is released only once `menu` is in place.
    fn install(&mut self, icon: &Icon, menu: Self::Menu) -> TrayResult<()>;

    /// Processes one unit of native event delivery.
    ///
    /// With `blocking`, waits until something arrives. Returns `Ok(None)` when
    /// the processed event was not meant for the session, or nothing was pending.
    fn poll(&mut self, blocking: bool) -> TrayResult<Option<NativeEvent>>;

    /// Thread-safe way to wake the owning thread with [`NativeEvent::Quit`].
    fn exit_signal(&self) -> std::sync::Arc<dyn PostExit>;

    /// Deregisters the icon and releases the current menu and icon.
    /// Must be idempotent.
    fn release(&mut self);
}

/// Posts a termination request to the owning thread's event queue.
pub trait PostExit: Send + Sync {
    fn post_exit(&self);
}

/// A menu tree with separators resolved and every entry tagged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundMenu {
    /// Generation of the table the handles come from.
    pub generation: Generation,
    pub entries: Vec<BoundEntry>,
}

/// One entry of a [`BoundMenu`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundEntry {
    Separator,
    Item(BoundItem),
}

/// A non-separator entry of a [`BoundMenu`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundItem {
    pub handle: Handle,
    pub label: String,
    pub enabled: bool,
    pub check: CheckState,
    /// Children for submenu anchors.
    pub submenu: Option<Vec<BoundEntry>>,
}

impl BoundMenu {
    /// Lowers the tree `table` was allocated for.
    pub fn lower(table: &HandleTable) -> TrayResult<Self> {
        let mut path = Vec::new();
        let entries = Self::lower_items(table, table.tree(), &mut path)?;
        Ok(Self {
            generation: table.generation(),
            entries,
        })
    }

    fn lower_items(
        table: &HandleTable,
        items: &[MenuNode],
        path: &mut Vec<usize>,
    ) -> TrayResult<Vec<BoundEntry>> {
        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            // Separators are dividers whatever else the node carries.
            if item.is_separator() {
                entries.push(BoundEntry::Separator);
                continue;
            }

            path.push(index);
            let handle = table.handle_of(path).ok_or_else(|| {
                TrayError::init(format!("no handle allocated for entry {:?}", item.label))
            })?;
            let submenu = match &item.submenu {
                Some(children) => Some(Self::lower_items(table, children, path)?),
                None => None,
            };
            path.pop();

            entries.push(BoundEntry::Item(BoundItem {
                handle,
                label: item.label.clone(),
                enabled: !item.disabled,
                check: item.check,
                submenu,
            }));
        }
        Ok(entries)
    }

    /// Number of entries at every depth, separators included.
    pub fn len(&self) -> usize {
        fn count(entries: &[BoundEntry]) -> usize {
            entries
                .iter()
                .map(|entry| match entry {
                    BoundEntry::Item(BoundItem {
                        submenu: Some(children),
                        ..
                    }) => 1 + count(children),
                    _ => 1,
                })
                .sum()
        }
        count(&self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the entry reached by following `labels` from the top level.
    pub fn find(&self, labels: &[&str]) -> Option<&BoundItem> {
        let (last, parents) = labels.split_last()?;
        let mut entries = &self.entries;
        for label in parents {
            entries = Self::item(entries, label)?.submenu.as_ref()?;
        }
        Self::item(entries, last)
    }

    fn item<'a>(entries: &'a [BoundEntry], label: &str) -> Option<&'a BoundItem> {
        entries.iter().find_map(|entry| match entry {
            BoundEntry::Item(item) if item.label == label => Some(item),
            _ => None,
        })
    }
}

/// Holds the one native menu that is current.
#[derive(Debug)]
pub struct MenuSlot<M> {
    current: Option<M>,
}

impl<M> Default for MenuSlot<M> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<M> MenuSlot<M> {
    pub fn current(&self) -> Option<&M> {
        self.current.as_ref()
    }

    /// Makes `menu` current and hands back the one it replaced, which the
    /// caller drops once the shell has switched over.
    pub fn replace(&mut self, menu: M) -> Option<M> {
        self.current.replace(menu)
    }

    pub fn take(&mut self) -> Option<M> {
        self.current.take()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowering_keeps_separator_positions() {
        let table = HandleTable::allocate(vec![MenuNode::submenu(
            "Folder",
            vec![MenuNode::new("A"), MenuNode::separator(), MenuNode::new("B")],
        )]);
        let bound = BoundMenu::lower(&table).expect("lowered");
        let BoundEntry::Item(folder) = &bound.entries[0] else {
            panic!("folder entry expected");
        };
        let children = folder.submenu.as_ref().expect("children");
        assert_eq!(children.len(), 3);
        assert!(matches!(&children[0], BoundEntry::Item(item) if item.label == "A"));
        assert_eq!(children[1], BoundEntry::Separator);
        assert!(matches!(&children[2], BoundEntry::Item(item) if item.label == "B"));
        assert_eq!(bound.len(), 4);
    }

    #[test]
    fn lowering_mirrors_disabled_and_check_state() {
        let table = HandleTable::allocate(vec![
            MenuNode::new("Off").disabled(true),
            MenuNode::new("Mute").checkable(true),
        ]);
        let bound = BoundMenu::lower(&table).expect("lowered");
        let off = bound.find(&["Off"]).expect("off");
        assert!(!off.enabled);
        assert_eq!(off.check, CheckState::NotCheckable);
        let mute = bound.find(&["Mute"]).expect("mute");
        assert!(mute.enabled);
        assert_eq!(mute.check, CheckState::Checked);
        assert_eq!(bound.generation, table.generation());
    }

    #[test]
    fn find_follows_label_path() {
        let table = HandleTable::allocate(vec![
            MenuNode::new("Top"),
            MenuNode::submenu("More", vec![MenuNode::new("Deep")]),
        ]);
        let bound = BoundMenu::lower(&table).expect("lowered");
        assert_eq!(bound.find(&["More", "Deep"]).map(|i| i.handle), Some(Handle(1002)));
        assert!(bound.find(&["Top", "Deep"]).is_none());
        assert!(bound.find(&[]).is_none());
    }

    #[test]
    fn slot_hands_back_previous_menu() {
        let mut slot = MenuSlot::default();
        assert!(slot.is_empty());
        assert_eq!(slot.replace(1), None);
        assert_eq!(slot.replace(2), Some(1));
        assert_eq!(slot.current(), Some(&2));
        assert_eq!(slot.take(), Some(2));
        assert!(slot.is_empty());
    }
}
