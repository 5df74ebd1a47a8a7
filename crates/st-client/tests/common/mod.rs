//! Shared fixtures: hosts running on threads instead of child processes

#![allow(dead_code)]

use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use st_client::{RemoteProcess, WindowBuilder, WindowConfig, WindowTerminal};
use st_core::DuplexPipe;
use st_host::{Host, InputFeed, InterruptHandle, NullSurface};
use st_protocol::{Request, Response, Value, READY_BYTE};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A host thread standing in for a child process
pub struct ThreadProcess {
    handle: Option<JoinHandle<i32>>,
    interrupt: Option<InterruptHandle>,
    code: Option<i32>,
}

impl ThreadProcess {
    pub fn new(handle: JoinHandle<i32>, interrupt: Option<InterruptHandle>) -> Self {
        Self {
            handle: Some(handle),
            interrupt,
            code: None,
        }
    }
}

impl RemoteProcess for ThreadProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        if self.code.is_none() && self.handle.as_ref().is_some_and(|h| h.is_finished()) {
            let handle = self.handle.take().unwrap();
            self.code = Some(handle.join().unwrap_or(-1));
        }
        Ok(self.code)
    }

    fn kill(&mut self) -> io::Result<()> {
        if let Some(interrupt) = &self.interrupt {
            interrupt.interrupt();
        }
        Ok(())
    }
}

pub fn config() -> WindowConfig {
    WindowConfig {
        tps: 200,
        width: 80,
        height: 24,
        handshake_timeout: TIMEOUT,
        close_timeout: Duration::from_secs(2),
        ..WindowConfig::default()
    }
}

/// Attach to a real [`Host`] serving on a thread
pub fn start(builder: WindowBuilder) -> WindowTerminal {
    start_with_input(builder, InputFeed::new())
}

/// Like [`start`], with console input pushed through `input`
pub fn start_with_input(builder: WindowBuilder, input: InputFeed) -> WindowTerminal {
    let terminal = DuplexPipe::create().unwrap();
    let widgets = DuplexPipe::create().unwrap();
    let launch = builder.launch_config(&terminal, &widgets);

    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut host = match Host::connect(launch, Box::new(NullSurface::with_input(input))) {
            Ok(host) => host,
            Err(e) => return e.exit_code(),
        };
        tx.send(host.interrupt_handle()).unwrap();
        if let Err(e) = host.await_start() {
            return e.exit_code();
        }
        match host.run() {
            Ok(code) => code as i32,
            Err(e) => e.exit_code(),
        }
    });

    let interrupt = rx.recv_timeout(TIMEOUT).unwrap();
    builder
        .attach(
            terminal,
            widgets,
            Box::new(ThreadProcess::new(handle, Some(interrupt))),
        )
        .unwrap()
}

/// Channels as seen by a scripted host
pub struct Script {
    pub terminal: DuplexPipe,
    pub widgets: DuplexPipe,
}

impl Script {
    /// Answer requests until `destroy`, then send the termination notice
    pub fn serve_until_destroy(&self) {
        while let Ok(request) = self.terminal.recv::<Request>() {
            let done = request.operation == "destroy()";
            if self
                .terminal
                .send(&Response::new(request.id, Ok(Value::Unit)))
                .is_err()
            {
                return;
            }
            if done {
                let _ = self.terminal.send(&Response::shutdown(None));
                return;
            }
        }
    }
}

/// Attach to a hand-written host; the script runs after the ready byte
pub fn scripted<F>(config: WindowConfig, script: F) -> WindowTerminal
where
    F: FnOnce(Script) -> i32 + Send + 'static,
{
    let terminal = DuplexPipe::create().unwrap();
    let widgets = DuplexPipe::create().unwrap();
    let (terminal_token, widget_token) = (terminal.token(), widgets.token());

    let handle = thread::spawn(move || {
        let script_side = Script {
            terminal: DuplexPipe::open(&terminal_token).unwrap(),
            widgets: DuplexPipe::open(&widget_token).unwrap(),
        };
        script_side.terminal.write(&[READY_BYTE]).unwrap();
        script(script_side)
    });

    WindowBuilder::new(config)
        .attach(terminal, widgets, Box::new(ThreadProcess::new(handle, None)))
        .unwrap()
}

pub fn wait_for<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(1));
    }
}
