//! Window proxy integration tests
//!
//! Drive a real host loop over real pipes, or a scripted host when the test
//! needs control over what the far side sends.

mod common;

use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use st_client::{
    ConnectionState, Promise, ProxyError, RemoteErrorKind, Value, WidgetId, WindowBuilder,
};
use st_core::POLL_INVALID;
use st_host::{Button, InputEvent, InputFeed, MouseAction};
use st_protocol::{key, Request, START_BYTE};

use common::{config, scripted, start, start_with_input, wait_for, TIMEOUT};

#[test]
fn test_width_roundtrip() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    let width = window.width().unwrap();
    assert_eq!(width.wait(Some(TIMEOUT)).unwrap(), Value::Int(80));
    assert_eq!(
        window.size().unwrap().wait(Some(TIMEOUT)).unwrap(),
        Value::from(vec![80i64, 24])
    );
    assert_eq!(window.state(), ConnectionState::Running);

    assert_eq!(window.close(), Some(0));
}

#[test]
fn test_queued_requests_run_in_order() {
    let window = start(WindowBuilder::new(config()));

    window.set_cursor(5, 0).unwrap();
    window.putstr("x", None, None).unwrap();
    let cursor = window.cursor().unwrap();
    assert_eq!(window.state(), ConnectionState::Ready);
    assert!(!cursor.fulfilled());

    window.begin().unwrap();
    assert_eq!(
        cursor.wait(Some(TIMEOUT)).unwrap(),
        Value::from(vec![6i64, 0])
    );
}

#[test]
fn test_queued_requests_follow_start_byte() {
    let (tx, rx) = mpsc::channel();
    let window = scripted(config(), move |script| {
        let start = script.terminal.read(1).unwrap();
        let first: Request = script.terminal.recv().unwrap();
        let second: Request = script.terminal.recv().unwrap();
        tx.send((start, first.operation.to_string(), second.operation.to_string()))
            .unwrap();
        script.serve_until_destroy();
        0
    });

    window.clear().unwrap();
    window.width().unwrap();
    window.begin().unwrap();

    let (start, first, second) = rx.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(start, vec![START_BYTE]);
    assert_eq!(first, "clear()");
    assert_eq!(second, "width");
}

#[test]
fn test_begin_twice_rejected() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();
    assert!(matches!(window.begin(), Err(ProxyError::AlreadyStarted)));
}

#[test]
fn test_unknown_widget_evicts_proxy() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    let ghost = window.widget(WidgetId(42));
    let err = ghost.hide().unwrap().wait(Some(TIMEOUT)).unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteErrorKind::Index);
    assert!(!ghost.is_valid());

    // Later calls fail without a round trip
    let again = ghost.text().unwrap();
    assert_eq!(again.has_failed(), Some(true));

    let fresh = window.widget(WidgetId(42));
    assert!(fresh.is_valid());
    assert!(!fresh.same_as(&ghost));
}

#[test]
fn test_widget_proxies_are_cached() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    let label = window
        .add_label((2, 3), "status")
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap();
    assert_eq!(
        label.text().unwrap().wait(Some(TIMEOUT)).unwrap(),
        Value::from("status")
    );
    assert!(window.widget(label.id()).same_as(&label));

    let looked_up = window
        .get_widget(label.id())
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap();
    assert!(looked_up.same_as(&label));

    let all = window.widgets().unwrap().wait(Some(TIMEOUT)).unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].same_as(&label));
}

#[test]
fn test_deleted_widget_reports_index_error() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    let label = window
        .add_label((0, 0), "bye")
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap();
    window.del_widget(&label).unwrap().wait(Some(TIMEOUT)).unwrap();

    let err = label.x().unwrap().wait(Some(TIMEOUT)).unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteErrorKind::Index);
    assert!(!label.is_valid());
}

#[test]
fn test_button_activation_notifies_callback() {
    let window = start(WindowBuilder::new(config()));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let clicked = window.register_callback(move |value| {
        let _ = tx.lock().unwrap().send(value);
    });
    window.begin().unwrap();

    let button = window
        .add_button((1, 1), (6, 1), "OK", Some(clicked))
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap();
    assert_eq!(
        button.activate().unwrap().wait(Some(TIMEOUT)).unwrap(),
        Value::Bool(true)
    );

    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Value::Widget(button.id())
    );
}

#[test]
fn test_mouse_click_notifies_callback() {
    let input = InputFeed::new();
    let window = start_with_input(WindowBuilder::new(config()), input.clone());
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let clicked = window.register_callback(move |value| {
        let _ = tx.lock().unwrap().send(value);
    });
    window.begin().unwrap();

    let button = window
        .add_button((10, 3), (6, 1), "OK", Some(clicked))
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap();

    input.push(InputEvent::Mouse {
        x: 2,
        y: 3,
        action: MouseAction::Press(Button::Left),
    });
    input.push(InputEvent::Mouse {
        x: 12,
        y: 3,
        action: MouseAction::Press(Button::Left),
    });
    assert_eq!(
        rx.recv_timeout(TIMEOUT).unwrap(),
        Value::Widget(button.id())
    );

    let mouse = window.mouse().unwrap().wait(Some(TIMEOUT)).unwrap();
    let mouse = mouse.as_map().unwrap();
    assert_eq!(mouse["x"], Value::Int(12));
    assert_eq!(mouse["left"], Value::Bool(true));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_console_keys_reach_getch() {
    let input = InputFeed::new();
    let window = start_with_input(WindowBuilder::new(config()), input.clone());
    window.begin().unwrap();

    input.push(InputEvent::Key(i64::from(b'q')));
    input.push(InputEvent::Key(key::ENTER));
    wait_for(|| {
        window.peekch().unwrap().wait(Some(TIMEOUT)).unwrap() == Value::Int(key::ENTER)
    });

    assert_eq!(window.getch().unwrap().wait(Some(TIMEOUT)).unwrap(), Value::Int(113));
    window.ungetch(key::UP).unwrap();
    assert_eq!(window.getch().unwrap().wait(Some(TIMEOUT)).unwrap(), Value::Int(key::ENTER));
    assert_eq!(window.getch().unwrap().wait(Some(TIMEOUT)).unwrap(), Value::Int(key::UP));
    assert_eq!(window.getch().unwrap().wait(Some(TIMEOUT)).unwrap(), Value::Unit);

    assert_eq!(window.getgch().unwrap().wait(Some(TIMEOUT)).unwrap(), Value::Int(113));
    assert_eq!(window.close(), Some(0));
}

#[test]
fn test_timer_fires_callback() {
    let window = start(WindowBuilder::new(config()));
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let fired = window.register_callback(move |value| {
        let _ = tx.lock().unwrap().send(value);
    });
    window.begin().unwrap();

    let timer = window.after(2, fired).unwrap().wait(Some(TIMEOUT)).unwrap();
    assert!(timer.as_i64().is_some());

    let tick = rx.recv_timeout(TIMEOUT).unwrap();
    assert!(tick.as_i64().unwrap() >= 2);
}

#[test]
fn test_unregister_releases_host_references() {
    let window = start(WindowBuilder::new(config()));
    let callback = window.register_callback(|_| {});
    window.begin().unwrap();

    window.after(100_000, callback).unwrap().wait(Some(TIMEOUT)).unwrap();
    let released = window
        .unregister_callback(callback)
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap();
    assert_eq!(released, Value::Int(1));
}

#[test]
fn test_cancelled_timer_reports_true_once() {
    let window = start(WindowBuilder::new(config()));
    let callback = window.register_callback(|_| {});
    window.begin().unwrap();

    let timer = window
        .after(100_000, callback)
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap()
        .as_i64()
        .unwrap() as u64;
    assert_eq!(
        window.cancel(timer).unwrap().wait(Some(TIMEOUT)).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        window.cancel(timer).unwrap().wait(Some(TIMEOUT)).unwrap(),
        Value::Bool(false)
    );
}

#[test]
fn test_before_draw_receives_ticks() {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let builder = WindowBuilder::new(config()).before_draw(move |tick| {
        let _ = tx.lock().unwrap().send(tick);
    });
    let window = start(builder);
    window.begin().unwrap();

    let first = rx.recv_timeout(TIMEOUT).unwrap().as_i64().unwrap();
    let second = rx.recv_timeout(TIMEOUT).unwrap().as_i64().unwrap();
    assert!(first >= 1);
    assert!(second > first);
}

#[test]
fn test_end_reports_exit_code() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    window.end(Some(3)).unwrap().wait(Some(TIMEOUT)).unwrap();
    wait_for(|| !window.is_connected());

    assert_eq!(window.exit_reason(), Some(Value::Unit));
    assert_eq!(window.state(), ConnectionState::Closed);
    assert!(matches!(window.width(), Err(ProxyError::Closed)));
    assert_eq!(window.close(), Some(3));
}

#[test]
fn test_termination_notice_fails_pending() {
    let window = scripted(config(), |script| {
        script.terminal.read(1).unwrap();
        let _unanswered: Request = script.terminal.recv().unwrap();
        script
            .terminal
            .send(&st_protocol::Response::shutdown(None))
            .unwrap();
        0
    });
    window.begin().unwrap();

    let promise = window.current_tick().unwrap();
    let err = promise.wait(Some(TIMEOUT)).unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteErrorKind::ConnectionAborted);

    wait_for(|| !window.is_connected());
    assert_eq!(window.exit_reason(), Some(Value::Unit));
    assert_eq!(window.pending_requests(), 0);
}

#[test]
fn test_host_vanishing_fails_pending() {
    let window = scripted(config(), |script| {
        script.terminal.read(1).unwrap();
        let _unanswered: Request = script.terminal.recv().unwrap();
        drop(script);
        9
    });
    window.begin().unwrap();

    let err = window
        .height()
        .unwrap()
        .wait(Some(TIMEOUT))
        .unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteErrorKind::ConnectionAborted);
    wait_for(|| !window.is_connected());
    assert_eq!(window.exit_reason(), None);
    assert_eq!(window.close(), Some(9));
}

#[test]
fn test_corrupt_frame_aborts_pending() {
    let window = scripted(config(), |script| {
        script.terminal.read(1).unwrap();
        let _unanswered: Request = script.terminal.recv().unwrap();
        script.terminal.write(&(1u64 << 40).to_le_bytes()).unwrap();

        // Hold the channel open until the controller gives up on it
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            match script.terminal.poll() {
                Ok(n) if n != POLL_INVALID => thread::sleep(Duration::from_millis(1)),
                _ => break,
            }
        }
        0
    });
    window.begin().unwrap();

    let err = window.width().unwrap().wait(Some(TIMEOUT)).unwrap_err();
    let remote = err.remote().unwrap();
    assert_eq!(remote.kind, RemoteErrorKind::ConnectionAborted);
    assert!(remote.message.contains("too large"), "{}", remote.message);
    wait_for(|| !window.is_connected());
}

#[test]
fn test_startup_failure_reports_exit_code() {
    let terminal = st_core::DuplexPipe::create().unwrap();
    let widgets = st_core::DuplexPipe::create().unwrap();
    let handle = std::thread::spawn(|| 255);

    let err = WindowBuilder::new(config())
        .attach(
            terminal,
            widgets,
            Box::new(common::ThreadProcess::new(handle, None)),
        )
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ProxyError::StartupFailed {
            exit_code: Some(255)
        }
    ));
}

#[test]
fn test_correlation_ids_are_recycled() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    for _ in 0..20 {
        window.width().unwrap().wait(Some(TIMEOUT)).unwrap();
    }
    assert_eq!(window.minted_ids(), 1);
    assert_eq!(window.pending_requests(), 0);
}

#[test]
fn test_close_is_idempotent() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    let first = window.close();
    assert_eq!(first, Some(0));
    assert_eq!(window.close(), first);
    assert_eq!(window.state(), ConnectionState::Closed);
    assert!(matches!(window.width(), Err(ProxyError::Closed)));
}

#[test]
fn test_close_before_begin_fails_queued() {
    let window = start(WindowBuilder::new(config()));
    let queued = window.width().unwrap();

    assert_eq!(window.close(), Some(0));
    let err = queued.wait(Some(TIMEOUT)).unwrap_err();
    assert_eq!(err.remote().unwrap().kind, RemoteErrorKind::ConnectionAborted);
}

#[tokio::test]
async fn test_promise_can_be_awaited() {
    let window = start(WindowBuilder::new(config()));
    window.begin().unwrap();

    let height = window.height().unwrap();
    let value = tokio::time::timeout(Duration::from_secs(5), height)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, Value::Int(24));
}
