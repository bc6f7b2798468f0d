//! Tray session and the values it is driven with.
//!
//! [`TrayState`] is what the application hands over on `init` and `update`,
//! [`TrayConfig`] is fixed per session, and [`Session`] owns everything the
//! shell shows.

pub mod config;
pub mod event;
pub mod icon;
pub mod session;
pub mod state;

pub use config::{Tooltip, TrayConfig};
pub use event::{NativeEvent, PumpStatus};
pub use icon::Icon;
pub use session::{ExitHandle, Session, SessionState, TrayControl};
pub use state::TrayState;
