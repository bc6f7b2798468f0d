//! Session lifecycle and dispatch, driven through the headless shell.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use trayloop::backend::BoundEntry;
use trayloop::menu::MAX_HANDLES;
use trayloop::{
    Activation, CheckState, HeadlessBackend, HeadlessShell, Icon, MenuNode, NativeEvent,
    PumpStatus, Session, SessionState, TrayConfig, TrayControl, TrayError, TrayState,
};

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn counting(label: &str, hits: &Rc<Cell<u32>>) -> MenuNode {
    let hits = Rc::clone(hits);
    MenuNode::new(label).on_activate(move |_, _| hits.set(hits.get() + 1))
}

fn start(menu: Vec<MenuNode>) -> (Session<HeadlessBackend>, HeadlessShell) {
    let backend = HeadlessBackend::new(TrayConfig::new("test"));
    let shell = backend.shell();
    let session =
        Session::init_with(backend, TrayState::new(Icon::default(), menu)).expect("session");
    (session, shell)
}

#[test]
fn init_registers_icon_and_binds_menu() {
    let (session, shell) = start(vec![MenuNode::new("Open")]);
    assert_eq!(session.state(), SessionState::Active);
    assert!(shell.is_registered());
    assert_eq!(shell.live_menus(), 1);
    assert_eq!(shell.config().map(|c| c.id), Some("test".to_string()));
    assert_eq!(shell.icon(), Some(Icon::default()));
}

#[test]
fn only_the_activated_entry_runs() {
    let open = counter();
    let mute = counter();
    let (mut session, shell) = start(vec![
        counting("Open", &open),
        MenuNode::separator(),
        counting("Mute", &mute).checkable(false),
    ]);

    let shown = shell.menu().expect("menu");
    assert_eq!(shown.entries.len(), 3);
    assert_eq!(shown.entries[1], BoundEntry::Separator);
    assert_eq!(session.handles().len(), 2);

    shell.click(&["Mute"]).expect("mute shown");
    assert_eq!(session.pump(true).expect("pump"), PumpStatus::Continue);
    assert_eq!(mute.get(), 1);
    assert_eq!(open.get(), 0);
}

#[test]
fn submenu_entry_after_separator_is_dispatched() {
    let a = counter();
    let b = counter();
    let (mut session, shell) = start(vec![MenuNode::submenu(
        "Folder",
        vec![counting("A", &a), MenuNode::separator(), counting("B", &b)],
    )]);

    shell.click(&["Folder", "B"]).expect("B shown");
    session.pump(true).expect("pump");
    assert_eq!((a.get(), b.get()), (0, 1));
}

#[test]
fn callback_receives_its_node_and_context() {
    let seen = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&seen);
    let (mut session, shell) = start(vec![
        MenuNode::new("Volume")
            .with_context(42u8)
            .on_activate(move |_, node| {
                *sink.borrow_mut() = Some((node.label.clone(), node.context_as::<u8>().copied()));
            }),
    ]);

    shell.click(&["Volume"]).expect("shown");
    session.pump(true).expect("pump");
    assert_eq!(*seen.borrow(), Some(("Volume".to_string(), Some(42))));
}

#[test]
fn update_replaces_menu_and_drops_stale_activations() {
    let old = counter();
    let new = counter();
    let (mut session, shell) = start(vec![counting("Old", &old)]);
    let stale_menu = shell.menu().expect("menu");
    let stale = stale_menu.find(&["Old"]).expect("old").handle;

    session
        .update(TrayState::new(Icon::name("b"), vec![counting("New", &new)]))
        .expect("first update");
    session
        .update(TrayState::new(Icon::name("c"), vec![counting("New", &new)]))
        .expect("second update");
    assert_eq!(shell.live_menus(), 1);
    assert_eq!(shell.binds(), 3);
    assert_eq!(shell.icon(), Some(Icon::name("c")));

    // Same handle value, older generation.
    shell.post(NativeEvent::Activated(Activation {
        generation: stale_menu.generation,
        handle: stale,
    }));
    assert_eq!(session.pump(true).expect("pump"), PumpStatus::Continue);
    assert_eq!((old.get(), new.get()), (0, 0));

    shell.click(&["New"]).expect("new shown");
    session.pump(true).expect("pump");
    assert_eq!(new.get(), 1);
}

#[test]
fn disabled_entry_never_fires() {
    let hits = counter();
    let (mut session, shell) = start(vec![counting("Off", &hits).disabled(true)]);

    shell.click(&["Off"]).expect("shown");
    session.pump(true).expect("pump");
    assert_eq!(hits.get(), 0);
    assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn folder_callback_is_suppressed() {
    let folder = counter();
    let (mut session, shell) = start(vec![
        counting("More", &folder).with_submenu(vec![MenuNode::new("Inner")]),
    ]);

    shell.click(&["More"]).expect("shown");
    session.pump(true).expect("pump");
    assert_eq!(folder.get(), 0);
}

#[test]
fn callback_can_rebuild_the_menu() {
    let (mut session, shell) = start(vec![MenuNode::new("Mute").checkable(false).on_activate(
        |tray: &mut dyn TrayControl, node: &MenuNode| {
            let flipped = MenuNode {
                check: node.check.toggled(),
                ..node.clone()
            };
            tray.update(TrayState::new(Icon::default(), vec![flipped]))
                .expect("rebuild from callback");
        },
    )]);

    shell.click(&["Mute"]).expect("shown");
    session.pump(true).expect("pump");
    let shown = shell.menu().expect("menu");
    assert_eq!(shown.find(&["Mute"]).map(|i| i.check), Some(CheckState::Checked));
    assert_eq!(session.handles().tree()[0].check, CheckState::Checked);

    shell.click(&["Mute"]).expect("shown");
    session.pump(true).expect("pump");
    let shown = shell.menu().expect("menu");
    assert_eq!(shown.find(&["Mute"]).map(|i| i.check), Some(CheckState::Unchecked));
    assert_eq!(shell.live_menus(), 1);
}

#[test]
fn exit_from_callback_stops_the_pump() {
    let (mut session, shell) = start(vec![
        MenuNode::new("Quit").on_activate(|tray: &mut dyn TrayControl, _: &MenuNode| tray.exit()),
    ]);

    shell.click(&["Quit"]).expect("shown");
    assert_eq!(session.pump(true).expect("pump"), PumpStatus::Stop);
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(!shell.is_registered());
    assert_eq!(shell.live_menus(), 0);
}

#[test]
fn exit_before_pump_returns_stop() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    session.exit();
    assert_eq!(session.state(), SessionState::Exiting);
    assert!(!shell.is_registered());

    assert_eq!(session.pump(true).expect("pump"), PumpStatus::Stop);
    assert_eq!(session.state(), SessionState::Terminated);
    assert_eq!(session.pump(false).expect("pump"), PumpStatus::Stop);
}

#[test]
fn exit_handle_unblocks_pump_from_another_thread() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    let handle = session.exit_handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.exit();
        handle.exit();
    });

    assert_eq!(session.pump(true).expect("pump"), PumpStatus::Stop);
    stopper.join().expect("stopper thread");
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(!shell.is_registered());
    assert!(session.exit_handle().is_requested());
}

#[test]
fn shell_close_stops_the_session() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    shell.close();
    assert_eq!(session.pump(true).expect("pump"), PumpStatus::Stop);
    assert_eq!(session.state(), SessionState::Terminated);
}

#[test]
fn loop_failure_is_fatal() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    shell.break_loop("message retrieval failed");

    let err = session.pump(true).expect_err("loop failure");
    assert!(matches!(err, TrayError::EventLoop(_)));
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(!shell.is_registered());
}

#[test]
fn update_after_termination_is_rejected() {
    let (mut session, _shell) = start(vec![MenuNode::new("Open")]);
    session.exit();
    session.pump(false).expect("pump");

    let err = session
        .update(TrayState::default())
        .expect_err("terminated session");
    assert!(matches!(
        err,
        TrayError::InvalidState {
            operation: "update",
            state: SessionState::Terminated
        }
    ));
}

#[test]
fn rejected_registration_creates_no_session() {
    let backend = HeadlessBackend::new(TrayConfig::default());
    let shell = backend.shell();
    shell.reject_registration();

    let err = Session::init_with(backend, TrayState::default()).expect_err("rejected");
    assert!(matches!(err, TrayError::Initialization { .. }));
    assert!(!shell.is_registered());
}

#[test]
fn failed_initial_bind_releases_the_icon() {
    let backend = HeadlessBackend::new(TrayConfig::default());
    let shell = backend.shell();
    shell.fail_next_bind();

    assert!(Session::init_with(backend, TrayState::default()).is_err());
    assert!(!shell.is_registered());
    assert_eq!(shell.live_menus(), 0);
}

#[test]
fn failed_update_keeps_previous_menu() {
    let hits = counter();
    let (mut session, shell) = start(vec![counting("Open", &hits)]);
    shell.fail_next_bind();

    assert!(
        session
            .update(TrayState::new(Icon::default(), vec![MenuNode::new("Other")]))
            .is_err()
    );
    assert_eq!(session.state(), SessionState::Active);

    shell.click(&["Open"]).expect("previous menu still shown");
    session.pump(true).expect("pump");
    assert_eq!(hits.get(), 1);
}

#[test]
fn oversized_menu_is_rejected_before_registration() {
    let backend = HeadlessBackend::new(TrayConfig::default());
    let shell = backend.shell();
    let menu = (0..=MAX_HANDLES).map(|_| MenuNode::new("x")).collect();

    let err = Session::init_with(backend, TrayState::new(Icon::default(), menu))
        .expect_err("invalid menu");
    assert!(matches!(err, TrayError::InvalidMenu(_)));
    assert!(!shell.is_registered());
}

#[test]
fn empty_label_is_a_regular_entry() {
    let hits = counter();
    let (mut session, shell) = start(vec![counting("", &hits)]);

    shell.click(&[""]).expect("unlabelled entry shown");
    session.pump(true).expect("pump");
    assert_eq!(hits.get(), 1);
}

#[test]
fn non_blocking_pump_handles_one_event_per_call() {
    let hits = counter();
    let (mut session, shell) = start(vec![counting("A", &hits)]);
    shell.click(&["A"]).expect("shown");
    shell.click(&["A"]).expect("shown");

    assert_eq!(session.pump(false).expect("pump"), PumpStatus::Continue);
    assert_eq!(hits.get(), 1);
    assert_eq!(shell.pending(), 1);

    assert_eq!(session.pump(false).expect("pump"), PumpStatus::Continue);
    assert_eq!(hits.get(), 2);
    assert_eq!(shell.pending(), 0);
}

#[test]
fn update_while_exiting_is_rejected() {
    let (mut session, _shell) = start(vec![MenuNode::new("Open")]);
    session.exit();

    let err = session
        .update(TrayState::default())
        .expect_err("exiting session");
    assert!(matches!(
        err,
        TrayError::InvalidState {
            operation: "update",
            state: SessionState::Exiting
        }
    ));
}

#[test]
fn owner_exit_posts_nothing_to_the_queue() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    session.exit();
    assert_eq!(shell.pending(), 0);
    session.pump(true).expect("pump");

    // Requests after teardown stay silent too.
    session.exit_handle().exit();
    assert_eq!(shell.pending(), 0);
}

#[test]
fn run_returns_when_stopped_from_another_thread() {
    let (clicked, seen) = mpsc::channel();
    let (mut session, shell) = start(vec![MenuNode::new("A").on_activate(move |_, _| {
        let _ = clicked.send(());
    })]);
    shell.click(&["A"]).expect("shown");
    let handle = session.exit_handle();

    let stopper = thread::spawn(move || {
        seen.recv().expect("activation");
        handle.exit();
    });

    session.run().expect("run");
    stopper.join().expect("stopper thread");
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(!shell.is_registered());
}

#[test]
fn run_surfaces_loop_failure() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    shell.break_loop("message retrieval failed");

    let err = session.run().expect_err("loop failure");
    assert!(err.is_fatal());
    assert_eq!(session.state(), SessionState::Terminated);
}

#[test]
fn dropping_a_live_session_releases_everything() {
    let (session, shell) = start(vec![MenuNode::submenu("More", vec![MenuNode::new("A")])]);
    drop(session);
    assert!(!shell.is_registered());
    assert_eq!(shell.live_menus(), 0);
}

#[test]
fn non_blocking_pump_with_nothing_pending_continues() {
    let (mut session, shell) = start(vec![MenuNode::new("Open")]);
    assert_eq!(session.pump(false).expect("pump"), PumpStatus::Continue);
    assert_eq!(shell.pending(), 0);
    assert_eq!(session.state(), SessionState::Active);
}
