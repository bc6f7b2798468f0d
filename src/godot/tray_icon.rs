//! Godot TrayIcon node implementation.
//!
//! The node keeps the menu model on the Godot side, starts a platform
//! [`Session`] on `spawn_tray` and pumps it without blocking from `process`.

use std::sync::mpsc::{Receiver, Sender, channel};

use godot::classes::{Image, ResourceLoader, Texture2D};
use godot::prelude::*;

use crate::backend::PlatformBackend;
use crate::menu::item::{CheckState, MenuNode};
use crate::tray::config::TrayConfig;
use crate::tray::event::PumpStatus;
use crate::tray::icon::Icon;
use crate::tray::session::Session;
use crate::tray::state::TrayState;

/// Upper bound on events handled per frame so a flood cannot stall the game.
const MAX_PUMPS_PER_FRAME: usize = 16;

/// What menu callbacks report back to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
enum TrayEvent {
    MenuActivated(String),
    CheckmarkToggled(String, bool),
}

#[derive(GodotClass)]
#[class(base=Node)]
/// A Godot node that shows a system tray icon with a menu.
///
/// Uses the StatusNotifierItem service on Linux and the notification area on
/// Windows.
///
/// # Signals
///
/// - `menu_activated(id: String)` - Emitted when a standard menu item is clicked
/// - `checkmark_toggled(id: String, checked: bool)` - Emitted when a checkmark item is toggled
///
/// # Example
///
/// ```gdscript
/// var tray = TrayIcon.new()
/// add_child(tray)
/// tray.set_tray_id("my_app")
/// tray.set_icon_from_path("res://icon.svg")
/// tray.add_menu_item("quit", "Quit", true)
/// tray.menu_activated.connect(_on_menu_activated)
/// tray.spawn_tray()
/// ```
pub struct TrayIcon {
    base: Base<Node>,
    config: TrayConfig,
    icon: Icon,
    menu: Vec<MenuNode>,
    session: Option<Session<PlatformBackend>>,
    sender: Sender<TrayEvent>,
    receiver: Receiver<TrayEvent>,
}

#[godot_api]
impl INode for TrayIcon {
    fn init(base: Base<Node>) -> Self {
        let (sender, receiver) = channel();
        Self {
            base,
            config: TrayConfig::new("godot_tray_icon"),
            icon: Icon::default(),
            menu: Vec::new(),
            session: None,
            sender,
            receiver,
        }
    }

    fn ready(&mut self) {
        self.base_mut().set_process(true);
    }

    fn process(&mut self, _delta: f64) {
        self.pump_session();

        let events: Vec<TrayEvent> = self.receiver.try_iter().collect();
        for event in events {
            match event {
                TrayEvent::MenuActivated(id) => {
                    self.base_mut()
                        .emit_signal("menu_activated", &[Variant::from(id)]);
                }
                TrayEvent::CheckmarkToggled(id, checked) => {
                    self.store_checkmark(&id, checked);
                    self.base_mut().emit_signal(
                        "checkmark_toggled",
                        &[Variant::from(id), Variant::from(checked)],
                    );
                }
            }
        }
    }

    fn exit_tree(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.exit();
        }
    }
}

impl TrayIcon {
    fn pump_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for _ in 0..MAX_PUMPS_PER_FRAME {
            match session.pump(false) {
                Ok(PumpStatus::Continue) => {}
                Ok(PumpStatus::Stop) => {
                    self.session = None;
                    return;
                }
                Err(e) => {
                    godot_error!("Tray event loop failed: {}", e);
                    self.session = None;
                    return;
                }
            }
        }
    }

    fn tray_state(&self) -> TrayState {
        TrayState::new(self.icon.clone(), self.menu.clone())
    }

    /// Rebinds the live tray after a model change. Does nothing before `spawn_tray`.
    fn refresh(&mut self) {
        let state = self.tray_state();
        if let Some(session) = self.session.as_mut()
            && let Err(e) = session.update(state)
        {
            godot_error!("Failed to update tray: {}", e);
        }
    }

    fn store_checkmark(&mut self, id: &str, checked: bool) -> bool {
        let Some(node) = MenuNode::find_mut(&mut self.menu, &|node: &MenuNode| {
            node.check.is_checkable() && node.context_as::<String>().is_some_and(|c| c == id)
        }) else {
            return false;
        };
        node.check = CheckState::from(Some(checked));
        self.refresh();
        true
    }

    fn set_icon(&mut self, icon: Icon) {
        self.icon = icon;
        self.refresh();
    }

    fn standard_item(&self, id: GString, label: GString, enabled: bool) -> MenuNode {
        let sender = self.sender.clone();
        MenuNode::new(label.to_string())
            .disabled(!enabled)
            .with_context(id.to_string())
            .on_activate(move |_, node| {
                if let Some(id) = node.context_as::<String>() {
                    let _ = sender.send(TrayEvent::MenuActivated(id.clone()));
                }
            })
    }

    fn checkmark_item(&self, id: GString, label: GString, checked: bool, enabled: bool) -> MenuNode {
        let sender = self.sender.clone();
        MenuNode::new(label.to_string())
            .checkable(checked)
            .disabled(!enabled)
            .with_context(id.to_string())
            .on_activate(move |_, node| {
                if let Some(id) = node.context_as::<String>() {
                    let toggled = node.check.toggled().is_checked();
                    let _ = sender.send(TrayEvent::CheckmarkToggled(id.clone(), toggled));
                }
            })
    }

    fn push_to_submenu(&mut self, submenu_label: &GString, item: MenuNode) -> bool {
        let label = submenu_label.to_string();
        let Some(folder) = MenuNode::find_mut(&mut self.menu, &|node: &MenuNode| {
            node.is_folder() && node.label == label
        }) else {
            return false;
        };
        folder.submenu.get_or_insert_with(Vec::new).push(item);
        self.refresh();
        true
    }
}

#[godot_api]
impl TrayIcon {
    /// Signal emitted when a standard menu item is clicked.
    ///
    /// # Parameters
    ///
    /// - `id` - The unique identifier of the menu item that was clicked
    #[signal]
    fn menu_activated(id: GString);

    /// Signal emitted when a checkmark menu item is toggled.
    ///
    /// The stored state is flipped before the signal is emitted.
    ///
    /// # Parameters
    ///
    /// - `id` - The unique identifier of the checkmark item
    /// - `checked` - The new checked state
    #[signal]
    fn checkmark_toggled(id: GString, checked: bool);

    /// Shows the tray icon with the configured menu.
    ///
    /// Call this after configuring the node. Returns `false` if the tray is
    /// already shown or the platform refused it.
    ///
    /// # Example
    ///
    /// ```gdscript
    /// if tray_icon.spawn_tray():
    ///     print("Tray icon created successfully")
    /// else:
    ///     print("Failed to create tray icon")
    /// ```
    #[func]
    fn spawn_tray(&mut self) -> bool {
        if self.session.is_some() {
            godot_warn!("Tray already spawned");
            return false;
        }

        match Session::init_with_config(self.config.clone(), self.tray_state()) {
            Ok(session) => {
                self.session = Some(session);
                true
            }
            Err(e) => {
                godot_error!("Failed to spawn tray: {}", e);
                false
            }
        }
    }

    /// Removes the tray icon. `spawn_tray` can show it again afterwards.
    #[func]
    fn close_tray(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.exit();
        }
    }

    /// Returns `true` while the tray icon is shown.
    #[func]
    fn is_spawned(&self) -> bool {
        self.session.is_some()
    }

    /// Sets the unique identifier for this tray icon.
    ///
    /// Takes effect on the next `spawn_tray`.
    ///
    /// # Parameters
    ///
    /// - `tray_id` - A unique identifier string (e.g., "com.example.myapp")
    #[func]
    fn set_tray_id(&mut self, tray_id: GString) {
        self.config.id = tray_id.to_string();
    }

    /// Sets the title text of the tray icon. Takes effect on the next `spawn_tray`.
    #[func]
    fn set_title(&mut self, title: GString) {
        self.config.title = title.to_string();
    }

    /// Sets the tooltip displayed when hovering over the tray icon.
    ///
    /// Takes effect on the next `spawn_tray`. Windows only shows `title`.
    ///
    /// # Parameters
    ///
    /// - `title` - The main tooltip text
    /// - `subtitle` - Additional tooltip text displayed below the title
    /// - `icon_name` - System icon name to display in the tooltip
    #[func]
    fn set_tooltip(&mut self, title: GString, subtitle: GString, icon_name: GString) {
        self.config.tooltip.title = title.to_string();
        self.config.tooltip.description = subtitle.to_string();
        self.config.tooltip.icon_name = icon_name.to_string();
    }

    /// Sets the tray icon using a system icon name.
    ///
    /// On Linux this is a freedesktop icon name such as "applications-games".
    /// On Windows it names an icon resource of the executable.
    #[func]
    fn set_icon_name(&mut self, icon_name: GString) {
        self.set_icon(Icon::name(icon_name.to_string()));
    }

    /// Sets the path to search for icon themes. Takes effect on the next `spawn_tray`.
    #[func]
    fn set_icon_theme_path(&mut self, path: GString) {
        self.config.icon_theme_path = path.to_string();
    }

    /// Sets the tray icon from a Godot Image resource.
    ///
    /// # Returns
    /// `true` if the icon was set successfully, `false` otherwise
    ///
    /// # Example (GDScript)
    /// ```gdscript
    /// var image = load("res://icon.svg").get_image()
    /// tray_icon.set_icon_from_image(image)
    /// ```
    #[func]
    fn set_icon_from_image(&mut self, image: Gd<Image>) -> bool {
        let width = image.get_width();
        let height = image.get_height();

        let Some(copy) = image.duplicate() else {
            godot_error!("Failed to copy image");
            return false;
        };
        let mut img = copy.cast::<Image>();
        img.convert(godot::classes::image::Format::RGBA8);

        match Icon::from_rgba(width, height, img.get_data().to_vec()) {
            Ok(icon) => {
                self.set_icon(icon);
                true
            }
            Err(e) => {
                godot_error!("Invalid image: {}", e);
                false
            }
        }
    }

    /// Sets the tray icon from a Godot Texture2D resource.
    ///
    /// Works with exported games because it uses Godot's resource system.
    #[func]
    fn set_icon_from_texture(&mut self, texture: Gd<Texture2D>) -> bool {
        let Some(image) = texture.get_image() else {
            godot_error!("Failed to get image from texture");
            return false;
        };
        self.set_icon_from_image(image)
    }

    /// Sets the tray icon by loading a texture from a Godot resource path.
    ///
    /// # Example (GDScript)
    /// ```gdscript
    /// tray_icon.set_icon_from_path("res://icon.svg")
    /// ```
    #[func]
    fn set_icon_from_path(&mut self, path: GString) -> bool {
        let Some(resource) = ResourceLoader::singleton().load(&path) else {
            godot_error!("Failed to load resource from path: {}", path);
            return false;
        };
        match resource.try_cast::<Texture2D>() {
            Ok(texture) => self.set_icon_from_texture(texture),
            Err(_) => {
                godot_error!("Resource is not a Texture2D: {}", path);
                false
            }
        }
    }

    /// Sets the tray icon from raw RGBA pixel data.
    ///
    /// # Parameters
    ///
    /// - `width` - Width of the icon in pixels
    /// - `height` - Height of the icon in pixels
    /// - `data` - Raw pixel data as RGBA bytes (length must be width * height * 4)
    #[func]
    fn set_icon_from_data(&mut self, width: i32, height: i32, data: PackedByteArray) -> bool {
        match Icon::from_rgba(width, height, data.to_vec()) {
            Ok(icon) => {
                self.set_icon(icon);
                true
            }
            Err(e) => {
                godot_error!("Invalid icon data: {}", e);
                false
            }
        }
    }

    /// Clears all menu items from the tray menu.
    #[func]
    fn clear_menu(&mut self) {
        self.menu.clear();
        self.refresh();
    }

    /// Adds a standard clickable menu item.
    ///
    /// When clicked, emits the `menu_activated` signal with the item's ID.
    ///
    /// # Parameters
    ///
    /// - `id` - Unique identifier for this menu item
    /// - `label` - Text displayed in the menu
    /// - `enabled` - Whether the item can be clicked
    #[func]
    fn add_menu_item(&mut self, id: GString, label: GString, enabled: bool) {
        let item = self.standard_item(id, label, enabled);
        self.menu.push(item);
        self.refresh();
    }

    /// Adds a menu item with a checkmark that can be toggled.
    ///
    /// When toggled, emits the `checkmark_toggled` signal with the item's ID and new state.
    #[func]
    fn add_checkmark_item(&mut self, id: GString, label: GString, checked: bool, enabled: bool) {
        let item = self.checkmark_item(id, label, checked, enabled);
        self.menu.push(item);
        self.refresh();
    }

    /// Adds a visual separator line to the menu.
    #[func]
    fn add_separator(&mut self) {
        self.menu.push(MenuNode::separator());
        self.refresh();
    }

    /// Creates a submenu that can contain other menu items.
    ///
    /// Use `add_submenu_item`, `add_submenu_checkmark` and `add_submenu_separator`
    /// with the same label to fill it.
    #[func]
    fn begin_submenu(&mut self, label: GString, enabled: bool) {
        self.menu
            .push(MenuNode::submenu(label.to_string(), Vec::new()).disabled(!enabled));
        self.refresh();
    }

    /// Adds a standard menu item to an existing submenu.
    ///
    /// # Returns
    ///
    /// Returns `true` if the item was added, `false` if the submenu was not found.
    #[func]
    fn add_submenu_item(
        &mut self,
        submenu_label: GString,
        id: GString,
        label: GString,
        enabled: bool,
    ) -> bool {
        let item = self.standard_item(id, label, enabled);
        self.push_to_submenu(&submenu_label, item)
    }

    /// Adds a checkmark item to an existing submenu.
    #[func]
    fn add_submenu_checkmark(
        &mut self,
        submenu_label: GString,
        id: GString,
        label: GString,
        checked: bool,
        enabled: bool,
    ) -> bool {
        let item = self.checkmark_item(id, label, checked, enabled);
        self.push_to_submenu(&submenu_label, item)
    }

    /// Adds a separator to an existing submenu.
    #[func]
    fn add_submenu_separator(&mut self, submenu_label: GString) -> bool {
        self.push_to_submenu(&submenu_label, MenuNode::separator())
    }

    /// Programmatically sets the state of a checkmark item.
    ///
    /// Returns `true` if the checkmark was found and updated. Does not emit
    /// `checkmark_toggled`.
    #[func]
    fn set_checkmark_state(&mut self, id: GString, checked: bool) -> bool {
        self.store_checkmark(&id.to_string(), checked)
    }
}
