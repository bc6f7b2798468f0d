//! Tray session lifecycle and activation dispatch.
//!
//! A [`Session`] owns the notification icon, the current native menu and the
//! handle table it was bound from. The application drives it one
//! [`pump`](Session::pump) at a time from the thread that created it.

use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, trace};

use crate::backend::{Backend, BoundMenu, PostExit};
use crate::error::{TrayError, TrayResult};
use crate::menu::handle::{Activation, HandleTable};
use crate::tray::event::{NativeEvent, PumpStatus};
use crate::tray::icon::Icon;
use crate::tray::state::TrayState;

/// Lifecycle of a session. A session that failed to initialize never exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Icon registered, menu bound, events dispatched.
    Active,
    /// Termination requested; the next pump finishes it.
    Exiting,
    /// Native resources released. Only a new session can show the tray again.
    Terminated,
}

/// Operations available to menu callbacks while they run.
pub trait TrayControl {
    /// Rebinds the icon and menu from `state`.
    fn update(&mut self, state: TrayState) -> TrayResult<()>;

    /// Stops the tray. The running pump returns [`PumpStatus::Stop`].
    fn exit(&mut self);

    /// Handle other threads can use to stop the tray.
    fn exit_handle(&self) -> ExitHandle;

    fn state(&self) -> SessionState;
}

#[derive(Default)]
struct ExitFlags {
    requested: bool,
    /// Set once the owning thread tears down; later requests post nothing.
    closed: bool,
}

/// Requests termination of a session from any thread.
///
/// Only posts a signal to the owning thread; the owning thread releases the
/// native resources once its pump observes it.
#[derive(Clone)]
pub struct ExitHandle {
    flags: Arc<Mutex<ExitFlags>>,
    signal: Arc<dyn PostExit>,
}

impl ExitHandle {
    fn new(signal: Arc<dyn PostExit>) -> Self {
        Self {
            flags: Arc::default(),
            signal,
        }
    }

    fn flags(&self) -> MutexGuard<'_, ExitFlags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the session to stop. Wakes a pump blocked on the owning thread.
    pub fn exit(&self) {
        let mut flags = self.flags();
        if !flags.requested && !flags.closed {
            // Posted under the lock so teardown cannot miss it.
            self.signal.post_exit();
        }
        flags.requested = true;
    }

    pub fn is_requested(&self) -> bool {
        self.flags().requested
    }

    /// Marks the owning thread as torn down. With `requested`, also records
    /// an exit made by the owner itself, which needs no wake-up.
    fn close(&self, requested: bool) {
        let mut flags = self.flags();
        flags.closed = true;
        flags.requested |= requested;
    }
}

impl fmt::Debug for ExitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitHandle")
            .field("requested", &self.is_requested())
            .finish_non_exhaustive()
    }
}

/// A registered notification icon with its bound menu.
///
/// Not `Send`: every native object belongs to the thread that created the
/// session. Use [`Session::exit_handle`] to stop it from elsewhere.
pub struct Session<B: Backend> {
    backend: B,
    state: SessionState,
    table: Rc<HandleTable>,
    icon: Icon,
    exit: ExitHandle,
}

#[cfg(any(windows, all(unix, not(target_os = "macos"))))]
impl Session<crate::backend::PlatformBackend> {
    /// Shows `state` in the notification area with the default configuration.
    pub fn init(state: TrayState) -> TrayResult<Self> {
        Self::init_with_config(crate::TrayConfig::default(), state)
    }

    /// Shows `state` in the notification area.
    pub fn init_with_config(config: crate::TrayConfig, state: TrayState) -> TrayResult<Self> {
        Self::init_with(crate::backend::PlatformBackend::new(config), state)
    }
}

impl<B: Backend> Session<B> {
    /// Registers the icon through `backend` and binds the first menu.
    ///
    /// On failure the backend is released and no session exists.
    pub fn init_with(mut backend: B, state: TrayState) -> TrayResult<Self> {
        state.validate()?;
        state.icon.validate()?;

        backend.register(&state.icon)?;
        let table = HandleTable::allocate(state.menu);
        if let Err(err) = Self::bind_and_install(&mut backend, &table, &state.icon) {
            error!(%err, "failed to bind the initial tray menu");
            backend.release();
            return Err(err);
        }
        debug!(
            handles = table.len(),
            generation = ?table.generation(),
            "tray session started"
        );

        let exit = ExitHandle::new(backend.exit_signal());
        Ok(Self {
            backend,
            state: SessionState::Active,
            table: Rc::new(table),
            icon: state.icon,
            exit,
        })
    }

    fn bind_and_install(backend: &mut B, table: &HandleTable, icon: &Icon) -> TrayResult<()> {
        let bound = BoundMenu::lower(table)?;
        let menu = backend.bind(&bound)?;
        backend.install(icon, menu)
    }

    /// Replaces the icon and menu with `state`.
    ///
    /// Activations bound from the previous menu no longer resolve afterwards.
    /// Safe to call from inside a callback.
    pub fn update(&mut self, state: TrayState) -> TrayResult<()> {
        self.require_active("update")?;
        state.validate()?;
        state.icon.validate()?;

        let table = HandleTable::allocate(state.menu);
        Self::bind_and_install(&mut self.backend, &table, &state.icon)?;
        trace!(
            handles = table.len(),
            generation = ?table.generation(),
            "tray menu rebound"
        );
        self.table = Rc::new(table);
        self.icon = state.icon;
        Ok(())
    }

    /// Processes one unit of native event delivery.
    ///
    /// Activations of enabled, non-folder entries invoke their callback before
    /// this returns. After [`PumpStatus::Stop`] or an error the session has
    /// released its native resources.
    pub fn pump(&mut self, blocking: bool) -> TrayResult<PumpStatus> {
        match self.state {
            SessionState::Terminated => return Ok(PumpStatus::Stop),
            SessionState::Exiting => return Ok(self.terminate()),
            SessionState::Active => {}
        }
        if self.exit.is_requested() {
            return Ok(self.terminate());
        }

        let event = match self.backend.poll(blocking) {
            Ok(event) => event,
            Err(err) => {
                error!(%err, "tray event loop failed");
                self.terminate();
                return Err(err);
            }
        };

        match event {
            Some(NativeEvent::Activated(activation)) => self.dispatch(activation),
            Some(NativeEvent::Quit) => return Ok(self.terminate()),
            Some(NativeEvent::Shutdown) => {
                debug!("shell closed the tray");
                return Ok(self.terminate());
            }
            None => {}
        }

        if self.state != SessionState::Active || self.exit.is_requested() {
            return Ok(self.terminate());
        }
        Ok(PumpStatus::Continue)
    }

    /// Pumps with blocking until the session stops.
    ///
    /// Returns once a callback, the shell or an [`ExitHandle`] ends the
    /// session, or with the fatal error that ended it.
    pub fn run(&mut self) -> TrayResult<()> {
        while self.pump(true)? == PumpStatus::Continue {}
        Ok(())
    }

    fn dispatch(&mut self, activation: Activation) {
        // Keeps the resolved tree alive if the callback rebinds the menu.
        let table = Rc::clone(&self.table);
        let Some(node) = table.resolve(activation) else {
            trace!(handle = activation.handle.id(), "dropping stale activation");
            return;
        };
        if !node.is_actionable() {
            debug!(label = %node.label, "ignoring activation of inactive entry");
            return;
        }
        if let Some(callback) = node.callback.clone() {
            callback(self, node);
        }
    }

    /// Stops the tray from the owning thread.
    ///
    /// The icon is removed and the menu released immediately; the next pump
    /// returns [`PumpStatus::Stop`] without waiting. Nothing is posted to the
    /// event queue, so a later session on this thread starts clean.
    pub fn exit(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        self.exit.close(true);
        self.state = SessionState::Exiting;
        self.backend.release();
        debug!("tray exit requested");
    }

    /// Handle that stops this session from any thread.
    pub fn exit_handle(&self) -> ExitHandle {
        self.exit.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Icon currently shown.
    pub fn icon(&self) -> &Icon {
        &self.icon
    }

    /// Table the current menu was bound from.
    pub fn handles(&self) -> &HandleTable {
        &self.table
    }

    fn require_active(&self, operation: &'static str) -> TrayResult<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(TrayError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn terminate(&mut self) -> PumpStatus {
        if self.state != SessionState::Terminated {
            self.exit.close(false);
            self.state = SessionState::Exiting;
            self.backend.release();
            self.state = SessionState::Terminated;
            debug!("tray session terminated");
        }
        PumpStatus::Stop
    }
}

impl<B: Backend> TrayControl for Session<B> {
    fn update(&mut self, state: TrayState) -> TrayResult<()> {
        Session::update(self, state)
    }

    fn exit(&mut self) {
        Session::exit(self);
    }

    fn exit_handle(&self) -> ExitHandle {
        Session::exit_handle(self)
    }

    fn state(&self) -> SessionState {
        self.state
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        if self.state != SessionState::Terminated {
            self.exit.close(false);
            self.backend.release();
        }
    }
}

impl<B: Backend> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("handles", &self.table.len())
            .field("icon", &self.icon)
            .finish_non_exhaustive()
    }
}
