//! StatusNotifierItem backend.
//!
//! Bridges the session to the [ksni](https://crates.io/crates/ksni) service,
//! which exports the tray over D-Bus from its own thread. Menu activations run
//! there, so they are only forwarded through a channel; the owning thread picks
//! them up in `poll` and dispatches them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::sync::Arc;

use ksni::blocking::TrayMethods;
use ksni::menu::{CheckmarkItem, MenuItem, StandardItem, SubMenu};
use tracing::debug;

use crate::backend::{Backend, BoundEntry, BoundMenu, MenuSlot, PostExit};
use crate::error::{TrayError, TrayResult};
use crate::menu::handle::{Activation, Generation};
use crate::menu::item::CheckState;
use crate::tray::config::TrayConfig;
use crate::tray::event::NativeEvent;
use crate::tray::icon::Icon;

/// Only one tray per process may be exported.
static TRAY_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Implementation of the `ksni::Tray` trait that serves the current menu.
///
/// Owned by the ksni service thread once spawned.
pub struct KsniTray {
    config: TrayConfig,
    icon_name: String,
    icon_theme_path: String,
    icon_pixmap: Vec<ksni::Icon>,
    menu: MenuSlot<BoundMenu>,
    events: Sender<NativeEvent>,
}

impl KsniTray {
    fn set_icon(&mut self, fields: IconFields) {
        self.icon_name = fields.name;
        self.icon_theme_path = fields.theme_path;
        self.icon_pixmap = fields.pixmap;
    }

    fn build_menu_item(generation: Generation, entry: &BoundEntry) -> MenuItem<KsniTray> {
        let BoundEntry::Item(item) = entry else {
            return MenuItem::Separator;
        };
        let activation = Activation {
            generation,
            handle: item.handle,
        };

        match (&item.submenu, item.check) {
            (Some(children), _) => SubMenu {
                label: item.label.clone(),
                enabled: item.enabled,
                submenu: children
                    .iter()
                    .map(|child| Self::build_menu_item(generation, child))
                    .collect(),
                ..Default::default()
            }
            .into(),
            (None, CheckState::NotCheckable) => StandardItem {
                label: item.label.clone(),
                enabled: item.enabled,
                activate: Box::new(move |this: &mut KsniTray| {
                    let _ = this.events.send(NativeEvent::Activated(activation));
                }),
                ..Default::default()
            }
            .into(),
            (None, check) => CheckmarkItem {
                label: item.label.clone(),
                enabled: item.enabled,
                checked: check.is_checked(),
                activate: Box::new(move |this: &mut KsniTray| {
                    let _ = this.events.send(NativeEvent::Activated(activation));
                }),
                ..Default::default()
            }
            .into(),
        }
    }
}

impl ksni::Tray for KsniTray {
    fn id(&self) -> String {
        self.config.id.clone()
    }

    fn icon_name(&self) -> String {
        self.icon_name.clone()
    }

    fn icon_theme_path(&self) -> String {
        self.icon_theme_path.clone()
    }

    fn icon_pixmap(&self) -> Vec<ksni::Icon> {
        self.icon_pixmap.clone()
    }

    fn title(&self) -> String {
        self.config.title.clone()
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        ksni::ToolTip {
            icon_name: self.config.tooltip.icon_name.clone(),
            icon_pixmap: vec![],
            title: self.config.tooltip.title.clone(),
            description: self.config.tooltip.description.clone(),
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let Some(menu) = self.menu.current() else {
            return Vec::new();
        };
        menu.entries
            .iter()
            .map(|entry| Self::build_menu_item(menu.generation, entry))
            .collect()
    }
}

impl Drop for KsniTray {
    fn drop(&mut self) {
        // The service only drops the tray once it stops serving it.
        let _ = self.events.send(NativeEvent::Shutdown);
    }
}

struct IconFields {
    name: String,
    theme_path: String,
    pixmap: Vec<ksni::Icon>,
}

impl IconFields {
    fn from_icon(icon: &Icon, config: &TrayConfig) -> TrayResult<Self> {
        match icon {
            Icon::Name(name) => Ok(Self {
                name: name.clone(),
                theme_path: config.icon_theme_path.clone(),
                pixmap: Vec::new(),
            }),
            Icon::Path(path) => {
                let (theme_path, name) = Icon::theme_lookup(path).ok_or_else(|| {
                    TrayError::init(format!("unusable icon path: {}", path.display()))
                })?;
                Ok(Self {
                    name,
                    theme_path,
                    pixmap: Vec::new(),
                })
            }
            Icon::Pixmap {
                width,
                height,
                argb,
            } => Ok(Self {
                name: String::new(),
                theme_path: config.icon_theme_path.clone(),
                pixmap: vec![ksni::Icon {
                    width: *width,
                    height: *height,
                    data: argb.clone(),
                }],
            }),
        }
    }
}

struct ChannelExit(Sender<NativeEvent>);

impl PostExit for ChannelExit {
    fn post_exit(&self) {
        let _ = self.0.send(NativeEvent::Quit);
    }
}

/// Backend exporting the tray as a StatusNotifierItem.
pub struct KsniBackend {
    config: TrayConfig,
    sender: Sender<NativeEvent>,
    events: Receiver<NativeEvent>,
    handle: Option<ksni::blocking::Handle<KsniTray>>,
    claimed: bool,
}

impl KsniBackend {
    pub fn new(config: TrayConfig) -> Self {
        let (sender, events) = channel();
        Self {
            config,
            sender,
            events,
            handle: None,
            claimed: false,
        }
    }

    fn handle(&self) -> TrayResult<&ksni::blocking::Handle<KsniTray>> {
        self.handle
            .as_ref()
            .ok_or_else(|| TrayError::init("tray icon is not registered"))
    }
}

impl Backend for KsniBackend {
    type Menu = BoundMenu;

    fn register(&mut self, icon: &Icon) -> TrayResult<()> {
        if self.handle.is_some() {
            return Err(TrayError::init("tray icon is already registered"));
        }
        if TRAY_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrayError::init(
                "another tray session is already active in this process",
            ));
        }
        self.claimed = true;

        let fields = match IconFields::from_icon(icon, &self.config) {
            Ok(fields) => fields,
            Err(err) => {
                self.release();
                return Err(err);
            }
        };
        let mut tray = KsniTray {
            config: self.config.clone(),
            icon_name: String::new(),
            icon_theme_path: String::new(),
            icon_pixmap: Vec::new(),
            menu: MenuSlot::default(),
            events: self.sender.clone(),
        };
        tray.set_icon(fields);

        match tray.spawn() {
            Ok(handle) => {
                debug!(id = %self.config.id, "status notifier item registered");
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.release();
                Err(TrayError::init_with("failed to spawn tray", err))
            }
        }
    }

    fn bind(&mut self, menu: &BoundMenu) -> TrayResult<BoundMenu> {
        self.handle()?;
        Ok(menu.clone())
    }

    fn install(&mut self, icon: &Icon, menu: BoundMenu) -> TrayResult<()> {
        let fields = IconFields::from_icon(icon, &self.config)?;
        self.handle()?
            .update(move |tray: &mut KsniTray| {
                tray.set_icon(fields);
                drop(tray.menu.replace(menu));
            })
            .ok_or_else(|| TrayError::init("tray service is no longer running"))
    }

    fn poll(&mut self, blocking: bool) -> TrayResult<Option<NativeEvent>> {
        if blocking {
            return self
                .events
                .recv()
                .map(Some)
                .map_err(|_| TrayError::EventLoop("tray event channel closed".into()));
        }
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                Err(TrayError::EventLoop("tray event channel closed".into()))
            }
        }
    }

    fn exit_signal(&self) -> Arc<dyn PostExit> {
        Arc::new(ChannelExit(self.sender.clone()))
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.shutdown();
            debug!(id = %self.config.id, "status notifier item removed");
        }
        if std::mem::take(&mut self.claimed) {
            TRAY_ACTIVE.store(false, Ordering::Release);
        }
    }
}

impl Drop for KsniBackend {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::handle::HandleTable;
    use crate::menu::item::MenuNode;
    use ksni::Tray;

    fn tray_with(menu: Vec<MenuNode>) -> (KsniTray, Receiver<NativeEvent>) {
        let (sender, events) = channel();
        let table = HandleTable::allocate(menu);
        let mut tray = KsniTray {
            config: TrayConfig::new("test"),
            icon_name: String::new(),
            icon_theme_path: String::new(),
            icon_pixmap: Vec::new(),
            menu: MenuSlot::default(),
            events: sender,
        };
        tray.menu.replace(BoundMenu::lower(&table).expect("lowered"));
        (tray, events)
    }

    #[test]
    fn separator_and_items_map_to_ksni_entries() {
        let (tray, _events) = tray_with(vec![
            MenuNode::new("Open"),
            MenuNode::separator(),
            MenuNode::new("Mute").checkable(false),
            MenuNode::submenu("More", vec![MenuNode::new("About")]),
        ]);
        let items = tray.menu();
        assert_eq!(items.len(), 4);
        assert!(matches!(items[0], MenuItem::Standard(_)));
        assert!(matches!(items[1], MenuItem::Separator));
        assert!(matches!(&items[2], MenuItem::Checkmark(item) if !item.checked));
        assert!(matches!(&items[3], MenuItem::SubMenu(sub) if sub.submenu.len() == 1));
    }

    #[test]
    fn activation_is_forwarded_with_handle() {
        let (mut tray, events) = tray_with(vec![MenuNode::new("Open"), MenuNode::new("Quit")]);
        let items = tray.menu();
        let MenuItem::Standard(quit) = &items[1] else {
            panic!("standard item expected");
        };
        (quit.activate)(&mut tray);
        match events.try_recv() {
            Ok(NativeEvent::Activated(activation)) => assert_eq!(activation.handle.id(), 1001),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn path_icons_become_theme_lookups() {
        let fields = IconFields::from_icon(
            &Icon::path("/opt/app/icons/tray.png"),
            &TrayConfig::default(),
        )
        .expect("fields");
        assert_eq!(fields.name, "tray");
        assert_eq!(fields.theme_path, "/opt/app/icons");
        assert!(fields.pixmap.is_empty());
    }
}
