//! Godot integration.
//!
//! Exposes the tray to GDScript as a `TrayIcon` node that owns a [`Session`](crate::Session)
//! and pumps it once per frame.

pub mod tray_icon;

pub use tray_icon::TrayIcon;
