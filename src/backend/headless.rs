//! In-process shell without any OS dependency.
//!
//! [`HeadlessBackend`] behaves like a native backend: it registers an icon,
//! keeps one current menu and delivers events through a queue the owning
//! thread blocks on. The matching [`HeadlessShell`] plays the user and the
//! operating system: it clicks entries, closes the tray or breaks the loop.
//! Useful for tests and for running without a desktop session.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::backend::{Backend, BoundMenu, MenuSlot, PostExit};
use crate::error::{TrayError, TrayResult};
use crate::menu::handle::{Activation, Handle};
use crate::tray::config::TrayConfig;
use crate::tray::event::NativeEvent;
use crate::tray::icon::Icon;

enum Delivery {
    Event(NativeEvent),
    LoopFailure(String),
}

#[derive(Default)]
struct ShellState {
    config: Option<TrayConfig>,
    registered: bool,
    icon: Option<Icon>,
    menu: Option<BoundMenu>,
    live_menus: usize,
    binds: usize,
    reject_registration: bool,
    fail_next_bind: bool,
    queue: VecDeque<Delivery>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ShellState>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ShellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, delivery: Delivery) {
        self.lock().queue.push_back(delivery);
        self.ready.notify_all();
    }
}

/// The user-and-OS side of a [`HeadlessBackend`].
#[derive(Clone, Default)]
pub struct HeadlessShell {
    shared: Arc<Shared>,
}

impl HeadlessShell {
    /// Returns `true` while an icon is registered.
    pub fn is_registered(&self) -> bool {
        self.shared.lock().registered
    }

    /// Configuration the backend registered with.
    pub fn config(&self) -> Option<TrayConfig> {
        self.shared.lock().config.clone()
    }

    /// Icon currently shown.
    pub fn icon(&self) -> Option<Icon> {
        self.shared.lock().icon.clone()
    }

    /// Menu currently attached to the icon.
    pub fn menu(&self) -> Option<BoundMenu> {
        self.shared.lock().menu.clone()
    }

    /// Number of native menus that have been bound and not yet released.
    pub fn live_menus(&self) -> usize {
        self.shared.lock().live_menus
    }

    /// Number of successful binds so far.
    pub fn binds(&self) -> usize {
        self.shared.lock().binds
    }

    /// Clicks the entry reached by following `labels` in the current menu.
    ///
    /// Like a misbehaving shell, this delivers the activation even for
    /// disabled entries and folders. Returns the clicked handle, or `None` if
    /// no such entry is shown.
    pub fn click(&self, labels: &[&str]) -> Option<Handle> {
        let activation = {
            let state = self.shared.lock();
            let menu = state.menu.as_ref()?;
            let item = menu.find(labels)?;
            Activation {
                generation: menu.generation,
                handle: item.handle,
            }
        };
        self.post(NativeEvent::Activated(activation));
        Some(activation.handle)
    }

    /// Delivers a raw event to the owning thread.
    pub fn post(&self, event: NativeEvent) {
        self.shared.deliver(Delivery::Event(event));
    }

    /// Closes the tray from the shell side.
    pub fn close(&self) {
        self.post(NativeEvent::Shutdown);
    }

    /// Makes the next poll fail like a broken event-retrieval primitive.
    pub fn break_loop(&self, reason: impl Into<String>) {
        self.shared.deliver(Delivery::LoopFailure(reason.into()));
    }

    /// Makes registration fail.
    pub fn reject_registration(&self) {
        self.shared.lock().reject_registration = true;
    }

    /// Makes the next bind fail.
    pub fn fail_next_bind(&self) {
        self.shared.lock().fail_next_bind = true;
    }

    /// Number of deliveries not yet polled.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }
}

/// Native menu object of the headless shell.
pub struct HeadlessMenu {
    bound: BoundMenu,
    shared: Arc<Shared>,
}

impl Drop for HeadlessMenu {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.live_menus = state.live_menus.saturating_sub(1);
    }
}

struct QueueExit(Arc<Shared>);

impl PostExit for QueueExit {
    fn post_exit(&self) {
        self.0.deliver(Delivery::Event(NativeEvent::Quit));
    }
}

/// Backend driven by a [`HeadlessShell`].
pub struct HeadlessBackend {
    config: TrayConfig,
    shared: Arc<Shared>,
    slot: MenuSlot<HeadlessMenu>,
}

impl HeadlessBackend {
    pub fn new(config: TrayConfig) -> Self {
        Self {
            config,
            shared: Arc::default(),
            slot: MenuSlot::default(),
        }
    }

    /// Handle for playing the user and the OS.
    pub fn shell(&self) -> HeadlessShell {
        HeadlessShell {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Backend for HeadlessBackend {
    type Menu = HeadlessMenu;

    fn register(&mut self, icon: &Icon) -> TrayResult<()> {
        let mut state = self.shared.lock();
        if state.reject_registration {
            return Err(TrayError::init("notification area rejected the icon"));
        }
        state.config = Some(self.config.clone());
        state.registered = true;
        state.icon = Some(icon.clone());
        Ok(())
    }

    fn bind(&mut self, menu: &BoundMenu) -> TrayResult<HeadlessMenu> {
        let mut state = self.shared.lock();
        if std::mem::take(&mut state.fail_next_bind) {
            return Err(TrayError::init("native menu construction failed"));
        }
        state.live_menus += 1;
        state.binds += 1;
        trace!(entries = menu.len(), "bound headless menu");
        Ok(HeadlessMenu {
            bound: menu.clone(),
            shared: Arc::clone(&self.shared),
        })
    }

    fn install(&mut self, icon: &Icon, menu: HeadlessMenu) -> TrayResult<()> {
        let registered = {
            let mut state = self.shared.lock();
            if state.registered {
                state.icon = Some(icon.clone());
                state.menu = Some(menu.bound.clone());
            }
            state.registered
        };
        if !registered {
            return Err(TrayError::init("tray icon is not registered"));
        }
        drop(self.slot.replace(menu));
        Ok(())
    }

    fn poll(&mut self, blocking: bool) -> TrayResult<Option<NativeEvent>> {
        let mut state = self.shared.lock();
        loop {
            match state.queue.pop_front() {
                Some(Delivery::Event(event)) => return Ok(Some(event)),
                Some(Delivery::LoopFailure(reason)) => return Err(TrayError::EventLoop(reason)),
                None if !blocking => return Ok(None),
                None => {
                    state = self
                        .shared
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn exit_signal(&self) -> Arc<dyn PostExit> {
        Arc::new(QueueExit(Arc::clone(&self.shared)))
    }

    fn release(&mut self) {
        {
            let mut state = self.shared.lock();
            state.registered = false;
            state.icon = None;
            state.menu = None;
        }
        drop(self.slot.take());
    }
}
