//! Win32 notification-area backend.
//!
//! A hidden window receives the notify-icon callback message, pops up the
//! current `HMENU` at the cursor and turns the chosen command into an
//! activation. Everything here lives on the thread that registered the icon;
//! other threads only post `WM_QUIT` to that thread's queue, and `release`
//! drains whatever of it is left unread.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::iter::once;
use std::mem::{size_of, zeroed};
use std::os::windows::ffi::OsStrExt;
use std::ptr::{null, null_mut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Shell::{
    NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_MODIFY, NOTIFYICONDATAW,
    Shell_NotifyIconW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateIcon, CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyIcon, DestroyMenu,
    DestroyWindow, DispatchMessageW, GetCursorPos, GetMessageW, HICON, HMENU, IDI_APPLICATION,
    IMAGE_ICON, InsertMenuItemW, LR_DEFAULTSIZE, LR_LOADFROMFILE, LoadIconW, LoadImageW,
    MENUITEMINFOW, MFS_CHECKED, MFS_DISABLED, MFT_SEPARATOR, MFT_STRING, MIIM_DATA, MIIM_FTYPE,
    MIIM_ID, MIIM_STATE, MIIM_STRING, MIIM_SUBMENU, MSG, PM_REMOVE, PeekMessageW,
    PostThreadMessageW, RegisterClassExW, SendMessageW, SetForegroundWindow, TPM_LEFTALIGN,
    TPM_NONOTIFY, TPM_RETURNCMD, TPM_RIGHTBUTTON, TrackPopupMenu, TranslateMessage,
    UnregisterClassW, WM_CLOSE, WM_COMMAND, WM_DESTROY, WM_LBUTTONUP, WM_QUIT, WM_RBUTTONUP,
    WM_USER, WNDCLASSEXW,
};

use crate::backend::{Backend, BoundEntry, BoundItem, BoundMenu, MenuSlot, PostExit};
use crate::error::{TrayError, TrayResult};
use crate::menu::handle::{Activation, Generation, HANDLE_BASE, Handle};
use crate::menu::item::CheckState;
use crate::tray::config::TrayConfig;
use crate::tray::event::NativeEvent;
use crate::tray::icon::Icon;

const WM_TRAY_CALLBACK: u32 = WM_USER + 1;
const CLASS_NAME: &str = "TrayloopWindow";

static TRAY_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Default)]
struct ThreadShell {
    menu: MenuSlot<Win32Menu>,
    pending: VecDeque<NativeEvent>,
    releasing: bool,
}

thread_local! {
    static SHELL: RefCell<ThreadShell> = RefCell::new(ThreadShell::default());
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(once(0)).collect()
}

fn wide_os(text: &OsStr) -> Vec<u16> {
    text.encode_wide().chain(once(0)).collect()
}

fn push_pending(event: NativeEvent) {
    SHELL.with(|shell| shell.borrow_mut().pending.push_back(event));
}

fn take_pending() -> Option<NativeEvent> {
    SHELL.with(|shell| shell.borrow_mut().pending.pop_front())
}

/// Removes exit wake-ups nobody consumed, so they cannot end the next loop
/// running on this thread.
fn drain_quit_messages() {
    let mut msg: MSG = unsafe { zeroed() };
    while unsafe { PeekMessageW(&mut msg, null_mut(), WM_QUIT, WM_QUIT, PM_REMOVE) } != 0 {}
}

/// A popup menu and its submenus.
pub struct Win32Menu {
    hmenu: HMENU,
    generation: Generation,
}

impl Drop for Win32Menu {
    fn drop(&mut self) {
        // Destroys submenus as well.
        unsafe { DestroyMenu(self.hmenu) };
    }
}

struct OwnedIcon {
    handle: HICON,
    owned: bool,
}

impl Drop for OwnedIcon {
    fn drop(&mut self) {
        if self.owned {
            unsafe { DestroyIcon(self.handle) };
        }
    }
}

struct ThreadQuit {
    thread_id: u32,
}

impl PostExit for ThreadQuit {
    fn post_exit(&self) {
        let posted = unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
        if posted == 0 {
            warn!(thread_id = self.thread_id, "failed to post WM_QUIT to the tray thread");
        }
    }
}

unsafe extern "system" fn tray_wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_TRAY_CALLBACK => {
            let mouse = lparam as u32;
            if mouse == WM_LBUTTONUP || mouse == WM_RBUTTONUP {
                show_menu(hwnd);
                return 0;
            }
        }
        WM_COMMAND => {
            let id = (wparam & 0xffff) as u32;
            if id >= HANDLE_BASE {
                let generation =
                    SHELL.with(|shell| shell.borrow().menu.current().map(|menu| menu.generation));
                if let Some(generation) = generation {
                    push_pending(NativeEvent::Activated(Activation {
                        generation,
                        handle: Handle(id),
                    }));
                }
                return 0;
            }
        }
        WM_CLOSE => {
            unsafe { DestroyWindow(hwnd) };
            return 0;
        }
        WM_DESTROY => {
            if !SHELL.with(|shell| shell.borrow().releasing) {
                push_pending(NativeEvent::Shutdown);
            }
            return 0;
        }
        _ => {}
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

fn show_menu(hwnd: HWND) {
    // Copied out: TrackPopupMenu runs a modal loop that re-enters the window procedure.
    let Some(hmenu) = SHELL.with(|shell| shell.borrow().menu.current().map(|menu| menu.hmenu))
    else {
        return;
    };
    let mut point = POINT { x: 0, y: 0 };
    unsafe {
        if GetCursorPos(&mut point) == 0 {
            return;
        }
        SetForegroundWindow(hwnd);
        let command = TrackPopupMenu(
            hmenu,
            TPM_LEFTALIGN | TPM_RIGHTBUTTON | TPM_RETURNCMD | TPM_NONOTIFY,
            point.x,
            point.y,
            0,
            hwnd,
            null(),
        );
        if command != 0 {
            SendMessageW(hwnd, WM_COMMAND, command as WPARAM, 0);
        }
    }
}

/// Backend using `Shell_NotifyIconW` and popup menus.
pub struct Win32Backend {
    config: TrayConfig,
    instance: HINSTANCE,
    hwnd: HWND,
    data: NOTIFYICONDATAW,
    icon: Option<OwnedIcon>,
    owner_thread: u32,
    class_registered: bool,
    icon_added: bool,
    claimed: bool,
}

impl Win32Backend {
    pub fn new(config: TrayConfig) -> Self {
        Self {
            config,
            instance: null_mut(),
            hwnd: null_mut(),
            data: unsafe { zeroed() },
            icon: None,
            owner_thread: 0,
            class_registered: false,
            icon_added: false,
            claimed: false,
        }
    }

    fn create_window(&mut self) -> TrayResult<()> {
        let class_name = wide(CLASS_NAME);
        unsafe {
            self.instance = GetModuleHandleW(null());

            let mut class: WNDCLASSEXW = zeroed();
            class.cbSize = size_of::<WNDCLASSEXW>() as u32;
            class.lpfnWndProc = Some(tray_wnd_proc);
            class.hInstance = self.instance;
            class.lpszClassName = class_name.as_ptr();
            if RegisterClassExW(&class) == 0 {
                return Err(TrayError::init("RegisterClassExW failed"));
            }
            self.class_registered = true;

            self.hwnd = CreateWindowExW(
                0,
                class_name.as_ptr(),
                null(),
                0,
                0,
                0,
                0,
                0,
                null_mut(),
                null_mut(),
                self.instance,
                null(),
            );
        }
        if self.hwnd.is_null() {
            return Err(TrayError::init("CreateWindowExW failed"));
        }
        Ok(())
    }

    fn load_icon(&self, icon: &Icon) -> TrayResult<OwnedIcon> {
        match icon {
            Icon::Path(path) => {
                let path_wide = wide_os(path.as_os_str());
                let handle = unsafe {
                    LoadImageW(
                        null_mut(),
                        path_wide.as_ptr(),
                        IMAGE_ICON,
                        0,
                        0,
                        LR_LOADFROMFILE | LR_DEFAULTSIZE,
                    )
                };
                if handle.is_null() {
                    return Err(TrayError::init(format!(
                        "cannot load icon {}",
                        path.display()
                    )));
                }
                Ok(OwnedIcon {
                    handle: handle as HICON,
                    owned: true,
                })
            }
            Icon::Name(name) => {
                // Names refer to icon resources linked into the executable.
                let name_wide = wide(name);
                let mut handle = unsafe { LoadIconW(self.instance, name_wide.as_ptr()) };
                if handle.is_null() {
                    debug!(%name, "no icon resource with this name, using the application icon");
                    handle = unsafe { LoadIconW(null_mut(), IDI_APPLICATION) };
                }
                if handle.is_null() {
                    return Err(TrayError::init(format!("cannot load icon {name:?}")));
                }
                Ok(OwnedIcon {
                    handle,
                    owned: false,
                })
            }
            Icon::Pixmap {
                width,
                height,
                argb,
            } => {
                let bgra: Vec<u8> = argb
                    .chunks_exact(4)
                    .flat_map(|pixel| [pixel[3], pixel[2], pixel[1], pixel[0]])
                    .collect();
                // Word-aligned monochrome rows; all zero keeps every pixel opaque.
                let mask_row = (*width as usize).div_ceil(16) * 2;
                let mask = vec![0u8; mask_row * *height as usize];
                let handle = unsafe {
                    CreateIcon(
                        self.instance,
                        *width,
                        *height,
                        1,
                        32,
                        mask.as_ptr(),
                        bgra.as_ptr(),
                    )
                };
                if handle.is_null() {
                    return Err(TrayError::init("CreateIcon failed"));
                }
                Ok(OwnedIcon {
                    handle,
                    owned: true,
                })
            }
        }
    }

    fn build_menu(entries: &[BoundEntry]) -> TrayResult<HMENU> {
        let hmenu = unsafe { CreatePopupMenu() };
        if hmenu.is_null() {
            return Err(TrayError::init("CreatePopupMenu failed"));
        }
        for (position, entry) in entries.iter().enumerate() {
            if let Err(err) = Self::insert_entry(hmenu, position as u32, entry) {
                unsafe { DestroyMenu(hmenu) };
                return Err(err);
            }
        }
        Ok(hmenu)
    }

    fn insert_entry(hmenu: HMENU, position: u32, entry: &BoundEntry) -> TrayResult<()> {
        let mut info: MENUITEMINFOW = unsafe { zeroed() };
        info.cbSize = size_of::<MENUITEMINFOW>() as u32;

        let BoundEntry::Item(item) = entry else {
            info.fMask = MIIM_FTYPE;
            info.fType = MFT_SEPARATOR;
            return Self::insert(hmenu, position, &info, null_mut());
        };

        let mut label = wide(&item.label);
        info.fMask = MIIM_ID | MIIM_FTYPE | MIIM_STRING | MIIM_STATE | MIIM_DATA;
        info.fType = MFT_STRING;
        info.fState = Self::item_state(item);
        info.wID = item.handle.id();
        info.dwItemData = item.handle.id() as usize;
        info.dwTypeData = label.as_mut_ptr();
        info.cch = (label.len() - 1) as u32;

        let mut submenu = null_mut();
        if let Some(children) = &item.submenu {
            submenu = Self::build_menu(children)?;
            info.fMask |= MIIM_SUBMENU;
            info.hSubMenu = submenu;
        }
        Self::insert(hmenu, position, &info, submenu)
    }

    fn item_state(item: &BoundItem) -> u32 {
        let mut state = 0;
        if !item.enabled {
            state |= MFS_DISABLED;
        }
        if item.check == CheckState::Checked {
            state |= MFS_CHECKED;
        }
        state
    }

    fn insert(hmenu: HMENU, position: u32, info: &MENUITEMINFOW, submenu: HMENU) -> TrayResult<()> {
        if unsafe { InsertMenuItemW(hmenu, position, 1, info) } == 0 {
            if !submenu.is_null() {
                unsafe { DestroyMenu(submenu) };
            }
            return Err(TrayError::init("InsertMenuItemW failed"));
        }
        Ok(())
    }
}

impl Backend for Win32Backend {
    type Menu = Win32Menu;

    fn register(&mut self, icon: &Icon) -> TrayResult<()> {
        if TRAY_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrayError::init(
                "another tray session is already active in this process",
            ));
        }
        self.claimed = true;

        if let Err(err) = self.create_window() {
            self.release();
            return Err(err);
        }
        let loaded = match self.load_icon(icon) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.release();
                return Err(err);
            }
        };

        self.owner_thread = unsafe { GetCurrentThreadId() };
        self.data = unsafe { zeroed() };
        self.data.cbSize = size_of::<NOTIFYICONDATAW>() as u32;
        self.data.hWnd = self.hwnd;
        self.data.uID = 0;
        self.data.uFlags = NIF_ICON | NIF_MESSAGE | NIF_TIP;
        self.data.uCallbackMessage = WM_TRAY_CALLBACK;
        self.data.hIcon = loaded.handle;
        for (slot, unit) in self
            .data
            .szTip
            .iter_mut()
            .zip(self.config.hover_text().encode_utf16().take(127))
        {
            *slot = unit;
        }
        self.icon = Some(loaded);

        if unsafe { Shell_NotifyIconW(NIM_ADD, &self.data) } == 0 {
            self.release();
            return Err(TrayError::init("Shell_NotifyIconW rejected the icon"));
        }
        self.icon_added = true;
        SHELL.with(|shell| {
            let mut shell = shell.borrow_mut();
            shell.pending.clear();
            shell.releasing = false;
        });
        debug!(id = %self.config.id, "notification icon added");
        Ok(())
    }

    fn bind(&mut self, menu: &BoundMenu) -> TrayResult<Win32Menu> {
        let hmenu = Self::build_menu(&menu.entries)?;
        Ok(Win32Menu {
            hmenu,
            generation: menu.generation,
        })
    }

    fn install(&mut self, icon: &Icon, menu: Win32Menu) -> TrayResult<()> {
        if !self.icon_added {
            return Err(TrayError::init("tray icon is not registered"));
        }
        let loaded = self.load_icon(icon)?;
        let previous_handle = self.data.hIcon;
        self.data.hIcon = loaded.handle;
        if unsafe { Shell_NotifyIconW(NIM_MODIFY, &self.data) } == 0 {
            self.data.hIcon = previous_handle;
            return Err(TrayError::init("Shell_NotifyIconW refused the new icon"));
        }
        drop(self.icon.replace(loaded));

        let previous = SHELL.with(|shell| shell.borrow_mut().menu.replace(menu));
        drop(previous);
        Ok(())
    }

    fn poll(&mut self, blocking: bool) -> TrayResult<Option<NativeEvent>> {
        if let Some(event) = take_pending() {
            return Ok(Some(event));
        }

        let mut msg: MSG = unsafe { zeroed() };
        if blocking {
            match unsafe { GetMessageW(&mut msg, null_mut(), 0, 0) } {
                -1 => return Err(TrayError::EventLoop("GetMessageW failed".into())),
                0 => return Ok(Some(NativeEvent::Quit)),
                _ => {}
            }
        } else {
            if unsafe { PeekMessageW(&mut msg, null_mut(), 0, 0, PM_REMOVE) } == 0 {
                return Ok(None);
            }
            if msg.message == WM_QUIT {
                return Ok(Some(NativeEvent::Quit));
            }
        }

        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
        Ok(take_pending())
    }

    fn exit_signal(&self) -> Arc<dyn PostExit> {
        Arc::new(ThreadQuit {
            thread_id: self.owner_thread,
        })
    }

    fn release(&mut self) {
        SHELL.with(|shell| shell.borrow_mut().releasing = true);

        if std::mem::take(&mut self.icon_added) {
            unsafe { Shell_NotifyIconW(NIM_DELETE, &self.data) };
            debug!(id = %self.config.id, "notification icon removed");
        }
        drop(self.icon.take());
        let menu = SHELL.with(|shell| shell.borrow_mut().menu.take());
        drop(menu);

        if !self.hwnd.is_null() {
            unsafe { DestroyWindow(self.hwnd) };
            self.hwnd = null_mut();
        }
        if std::mem::take(&mut self.class_registered) {
            let class_name = wide(CLASS_NAME);
            unsafe { UnregisterClassW(class_name.as_ptr(), self.instance) };
        }

        SHELL.with(|shell| {
            let mut shell = shell.borrow_mut();
            shell.pending.clear();
            shell.releasing = false;
        });
        if self.owner_thread != 0 {
            drain_quit_messages();
            self.owner_thread = 0;
        }
        if std::mem::take(&mut self.claimed) {
            TRAY_ACTIVE.store(false, Ordering::Release);
        }
    }
}

impl Drop for Win32Backend {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use windows_sys::Win32::UI::WindowsAndMessaging::PM_NOREMOVE;

    use super::*;
    use crate::menu::item::MenuNode;
    use crate::tray::event::PumpStatus;
    use crate::tray::session::Session;
    use crate::tray::state::TrayState;

    fn quit_pending() -> bool {
        let mut msg: MSG = unsafe { zeroed() };
        unsafe { PeekMessageW(&mut msg, null_mut(), WM_QUIT, WM_QUIT, PM_NOREMOVE) != 0 }
    }

    fn open_session(id: &str) -> Session<Win32Backend> {
        Session::init_with(
            Win32Backend::new(TrayConfig::new(id)),
            TrayState::new(Icon::default(), vec![MenuNode::new("Open")]),
        )
        .expect("session")
    }

    // One test: the backend allows a single live tray per process.
    #[test]
    fn exit_leaves_the_thread_queue_clean_for_the_next_session() {
        let mut first = open_session("first");
        first.exit();
        assert_eq!(first.pump(true).expect("pump"), PumpStatus::Stop);
        drop(first);
        assert!(!quit_pending());

        let mut second = open_session("second");
        let handle = second.exit_handle();
        thread::spawn(move || handle.exit())
            .join()
            .expect("exit thread");
        // Stops on the flag without reading the posted WM_QUIT.
        assert_eq!(second.pump(true).expect("pump"), PumpStatus::Stop);
        assert!(!quit_pending());
        second.exit_handle().exit();
        drop(second);
        assert!(!quit_pending());

        let mut third = open_session("third");
        for _ in 0..4 {
            assert_eq!(third.pump(false).expect("pump"), PumpStatus::Continue);
        }
        third.exit();
        assert_eq!(third.pump(false).expect("pump"), PumpStatus::Stop);
    }
}
