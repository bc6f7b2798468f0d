//! Events backends deliver to the session, and the pump result.

use crate::menu::handle::Activation;

/// One unit of native event delivery, as seen by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeEvent {
    /// The user selected a menu entry.
    Activated(Activation),
    /// Termination was requested through [`exit`](crate::Session::exit) or an
    /// [`ExitHandle`](crate::ExitHandle).
    Quit,
    /// The shell went away or closed the tray on its own.
    Shutdown,
}

/// Result of one [`pump`](crate::Session::pump) step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PumpStatus {
    /// Keep pumping.
    Continue,
    /// Stop pumping. The session has released its native resources.
    Stop,
}
