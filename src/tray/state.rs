//! The application-supplied tray model.

use crate::error::{TrayError, TrayResult};
use crate::menu::handle::MAX_HANDLES;
use crate::menu::item::MenuNode;
use crate::tray::icon::Icon;

/// Everything a session renders: the icon and the menu.
///
/// Handing the same state to [`Session::update`](crate::Session::update) twice
/// produces the same icon and menu.
#[derive(Clone, Debug, Default)]
pub struct TrayState {
    /// Image shown in the notification area.
    pub icon: Icon,
    /// Top-level menu entries, in display order.
    pub menu: Vec<MenuNode>,
}

impl TrayState {
    pub fn new(icon: Icon, menu: Vec<MenuNode>) -> Self {
        Self { icon, menu }
    }

    /// Checks the menu tree for entries no shell can render.
    ///
    /// Labels are free-form, empty ones included. The number of entries that
    /// need a handle is capped at [`MAX_HANDLES`].
    pub fn validate(&self) -> TrayResult<()> {
        let entries = Self::count_entries(&self.menu);
        if entries > MAX_HANDLES {
            return Err(TrayError::InvalidMenu(format!(
                "{entries} entries exceed the limit of {MAX_HANDLES}"
            )));
        }
        Ok(())
    }

    fn count_entries(items: &[MenuNode]) -> usize {
        items
            .iter()
            .filter(|item| !item.is_separator())
            .map(|item| 1 + Self::count_entries(item.children()))
            .sum()
    }
}
