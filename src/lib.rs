//! # trayloop
//!
//! A notification-area tray icon with a hierarchical, dynamically rebuilt menu,
//! driven by an explicit event pump.
//!
//! ## Overview
//!
//! The application describes the tray as a [`TrayState`]: an [`Icon`] and a tree
//! of [`MenuNode`]s. Nodes are plain entries, checkable entries, separators
//! (label `"-"`) or folders holding a submenu, and may carry a callback plus an
//! opaque context value.
//!
//! A [`Session`] registers the icon, binds the tree to the shell's native menu
//! and gives every selectable entry a fresh [`Handle`]. The application then
//! calls [`Session::pump`] in its own loop; activations of enabled entries run
//! their callback on that same thread before `pump` returns. Callbacks get a
//! [`TrayControl`] and may rebuild the whole menu or stop the tray from inside.
//!
//! Backends:
//!
//! - Linux and the BSDs: StatusNotifierItem via [ksni](https://crates.io/crates/ksni)
//! - Windows: `Shell_NotifyIconW` with a popup menu on a hidden window
//! - [`HeadlessBackend`]: an in-process shell for tests and desktop-less runs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trayloop::{Icon, MenuNode, PumpStatus, Session, TrayControl, TrayState};
//!
//! fn main() -> trayloop::TrayResult<()> {
//!     let menu = vec![
//!         MenuNode::new("Open").on_activate(|_, _| println!("open")),
//!         MenuNode::separator(),
//!         MenuNode::new("Mute")
//!             .checkable(false)
//!             .on_activate(|_, node| println!("mute is now {}", !node.check.is_checked())),
//!         MenuNode::new("Quit").on_activate(|tray: &mut dyn TrayControl, _| tray.exit()),
//!     ];
//!
//!     let mut session = Session::init(TrayState::new(Icon::name("audio-volume-high"), menu))?;
//!     while session.pump(true)? == PumpStatus::Continue {}
//!     Ok(())
//! }
//! ```
//!
//! [`Session::run`] is that loop in one call. Another thread can stop a
//! blocked pump through [`Session::exit_handle`].
//!
//! ## Godot
//!
//! With the `gdextension` feature the crate builds as a standalone Godot 4
//! GDExtension exposing a `TrayIcon` node:
//!
//! ```gdextension
//! [configuration]
//! entry_symbol = "gdext_rust_init"
//! compatibility_minimum = 4.5
//! reloadable = true
//!
//! [libraries]
//! linux.debug.x86_64 = "res://../trayloop/target/debug/libtrayloop.so"
//! windows.debug.x86_64 = "res://../trayloop/target/debug/trayloop.dll"
//! ```
//!
//! ```gdscript
//! extends Node
//!
//! var tray_icon: TrayIcon
//!
//! func _ready():
//!     tray_icon = TrayIcon.new()
//!     add_child(tray_icon)
//!
//!     tray_icon.set_tray_id("my_app")
//!     tray_icon.set_icon_from_path("res://icon.svg")
//!     tray_icon.add_menu_item("quit", "Quit", true)
//!
//!     tray_icon.menu_activated.connect(_on_menu_activated)
//!     tray_icon.spawn_tray()
//!
//! func _on_menu_activated(id: String):
//!     if id == "quit":
//!         get_tree().quit()
//! ```

pub mod backend;
pub mod error;
#[cfg(all(
    feature = "gdextension",
    any(windows, all(unix, not(target_os = "macos")))
))]
pub mod godot;
pub mod menu;
pub mod tray;

pub use backend::{Backend, HeadlessBackend, HeadlessShell};
#[cfg(any(windows, all(unix, not(target_os = "macos"))))]
pub use backend::PlatformBackend;
pub use error::{TrayError, TrayResult};
#[cfg(all(
    feature = "gdextension",
    any(windows, all(unix, not(target_os = "macos")))
))]
pub use godot::TrayIcon;
pub use menu::{Activation, CheckState, Handle, HandleTable, MenuNode};
pub use tray::{
    ExitHandle, Icon, NativeEvent, PumpStatus, Session, SessionState, Tooltip, TrayConfig,
    TrayControl, TrayState,
};

#[cfg(feature = "gdextension")]
mod gdextension {
    use godot::prelude::*;

    struct TrayloopExtension;

    #[gdextension]
    unsafe impl ExtensionLibrary for TrayloopExtension {}
}
