//! The controller-side proxy for a remote terminal window
//!
//! A [`WindowBuilder`] launches `subterm-host`, waits for its ready byte and
//! hands back a [`WindowTerminal`]. Every call on the proxy returns a
//! [`ThreadPromise`] settled by the resolver thread when the response
//! arrives. Calls made before [`WindowTerminal::begin`] are queued and sent
//! in order right after the start byte.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use st_core::config::{LaunchConfig, WindowConfig};
use st_core::sync::lock;
use st_core::{ChildProcess, DuplexPipe, Promise, RemoteProcess, ThreadPromise};
use st_protocol::{
    CallbackId, Kwargs, Operation, RemoteError, Request, Value, WidgetId, START_BYTE,
};

use crate::callback::CallbackTable;
use crate::error::ProxyError;
use crate::launch::{await_ready, spawn_host};
use crate::link::{settle, ConnectionState, Flow, Link, Outgoing};
use crate::resolver;
use crate::widget::SerializedWidget;

/// Grace period after killing a host that ignored `destroy`
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Configures and launches a remote window
pub struct WindowBuilder {
    config: WindowConfig,
    callbacks: CallbackTable,
    before_draw: Option<CallbackId>,
    after_draw: Option<CallbackId>,
}

impl WindowBuilder {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            callbacks: CallbackTable::new(),
            before_draw: None,
            after_draw: None,
        }
    }

    pub fn tps(mut self, tps: u32) -> Self {
        self.config.tps = tps;
        self
    }

    pub fn size(mut self, width: u16, height: u16) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Called with the tick number before every frame is drawn
    pub fn before_draw<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.before_draw = Some(self.callbacks.register(callback));
        self
    }

    /// Called with the tick number after every frame is drawn
    pub fn after_draw<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.after_draw = Some(self.callbacks.register(callback));
        self
    }

    /// Startup configuration for a host attaching to these channels
    pub fn launch_config(&self, terminal: &DuplexPipe, widgets: &DuplexPipe) -> LaunchConfig {
        LaunchConfig {
            parent_pid: std::process::id(),
            terminal: terminal.token(),
            widgets: widgets.token(),
            tps: self.config.tps,
            width: self.config.width,
            height: self.config.height,
            before_draw: self.before_draw,
            after_draw: self.after_draw,
        }
    }

    /// Launch `subterm-host` in a new console and wait until it is ready
    pub fn spawn(self) -> Result<WindowTerminal, ProxyError> {
        let terminal = DuplexPipe::create()?;
        let widgets = DuplexPipe::create()?;
        let launch = self.launch_config(&terminal, &widgets);

        let child = spawn_host(&self.config, &launch)?;
        tracing::info!(pid = child.id(), "host launched");
        self.attach(terminal, widgets, Box::new(ChildProcess::new(child)))
    }

    /// Wait for a host that was started some other way.
    ///
    /// The host must have been given [`launch_config`](Self::launch_config)
    /// for these same channels.
    pub fn attach(
        self,
        terminal: DuplexPipe,
        widgets: DuplexPipe,
        process: Box<dyn RemoteProcess>,
    ) -> Result<WindowTerminal, ProxyError> {
        let link = Arc::new(Link::new(terminal, widgets, self.callbacks, process));
        link.transition(ConnectionState::Connecting);

        {
            let mut process = lock(&link.process);
            if let Some(process) = process.as_mut() {
                await_ready(&link.terminal_pipe, &mut **process, self.config.handshake_timeout)?;
            }
        }

        link.transition(ConnectionState::Ready);
        Ok(WindowTerminal {
            link,
            resolver: Mutex::new(None),
            exit_status: Mutex::new(None),
            poll_interval: self.config.poll_interval,
            close_timeout: self.config.close_timeout,
        })
    }
}

impl Default for WindowBuilder {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

/// Proxy for a terminal running in a host process
pub struct WindowTerminal {
    link: Arc<Link>,
    resolver: Mutex<Option<JoinHandle<()>>>,
    exit_status: Mutex<Option<i32>>,
    poll_interval: Duration,
    close_timeout: Duration,
}

impl WindowTerminal {
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// False once the host has ended or the connection dropped
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Reason carried by the host's termination notice, once received
    pub fn exit_reason(&self) -> Option<Value> {
        self.link.exit_reason()
    }

    /// OS process ID of the host, until it has been reaped
    pub fn host_pid(&self) -> Option<u32> {
        lock(&self.link.process).as_ref().and_then(|p| p.id())
    }

    /// Requests still waiting for a terminal-level response
    pub fn pending_requests(&self) -> usize {
        lock(&self.link.pending).len()
    }

    /// Distinct terminal-level correlation IDs minted so far
    pub fn minted_ids(&self) -> usize {
        lock(&self.link.pending).minted()
    }

    /// Send the start byte, flush queued requests and start resolving
    pub fn begin(&self) -> Result<(), ProxyError> {
        let mut phase = lock(&self.link.phase);
        match phase.state {
            ConnectionState::Ready => {}
            ConnectionState::Running => return Err(ProxyError::AlreadyStarted),
            ConnectionState::Closing | ConnectionState::Closed => return Err(ProxyError::Closed),
            ConnectionState::Created | ConnectionState::Connecting => {
                return Err(ProxyError::NotReady)
            }
        }

        self.link.terminal_pipe.write(&[START_BYTE])?;

        let queued = std::mem::take(&mut phase.outbox);
        for outgoing in &queued {
            if let Err(e) = self.link.send_outgoing(outgoing) {
                tracing::warn!(error = %e, "queued request not sent");
                self.link.fail_outgoing(outgoing, RemoteError::from(&e));
            }
        }
        phase.state = ConnectionState::Running;
        drop(phase);

        let link = Arc::clone(&self.link);
        let interval = self.poll_interval;
        let handle = thread::Builder::new()
            .name("subterm-resolver".into())
            .spawn(move || resolver::run(link, interval))
            .map_err(ProxyError::Spawn)?;
        *lock(&self.resolver) = Some(handle);

        tracing::info!(queued = queued.len(), "remote window started");
        Ok(())
    }

    /// Shut the window down and return the host's exit code.
    ///
    /// Asks the host to `destroy` itself, waits for it to exit (killing it
    /// after the close timeout), closes both channels and fails every
    /// outstanding promise. Later calls return the same code.
    pub fn close(&self) -> Option<i32> {
        let previous = {
            let mut phase = lock(&self.link.phase);
            if phase.finished {
                drop(phase);
                return *lock(&self.exit_status);
            }
            phase.finished = true;
            let previous = phase.state;
            phase.state = ConnectionState::Closing;
            previous
        };

        self.link.stop.store(true, Ordering::Release);
        let resolver = lock(&self.resolver).take();
        if let Some(handle) = resolver {
            if handle.join().is_err() {
                tracing::error!("resolver thread panicked");
            }
        }

        if self.link.is_connected() {
            if previous == ConnectionState::Ready {
                // The host is still waiting to start
                if let Err(e) = self.link.terminal_pipe.write(&[START_BYTE]) {
                    tracing::debug!(error = %e, "start byte not sent during close");
                }
            }
            if let Err(e) = self.request_destroy() {
                tracing::debug!(error = %e, "destroy not completed");
            }
        }

        let status = self.reap();
        self.link
            .disconnect(RemoteError::connection_aborted("remote window closed"));
        self.link.transition(ConnectionState::Closed);
        *lock(&self.exit_status) = status;

        tracing::info!(status = ?status, "remote window closed");
        status
    }

    /// Send `destroy()` and read responses on this thread until it is
    /// answered or the close timeout passes
    fn request_destroy(&self) -> Result<(), ProxyError> {
        let operation = Operation::invoke("destroy")?;
        let (id, promise) = lock(&self.link.pending).register();
        let request = Request::new(operation, id, Vec::new(), Kwargs::new());
        if let Err(e) = self.link.terminal_pipe.send(&request) {
            lock(&self.link.pending).discard(id);
            return Err(e.into());
        }

        let deadline = Instant::now() + self.close_timeout;
        while !promise.fulfilled() {
            if Instant::now() >= deadline {
                tracing::warn!("host did not answer destroy in time");
                break;
            }
            match self.link.poll_once()? {
                Flow::Stop => break,
                Flow::Busy => {}
                Flow::Idle => thread::sleep(self.poll_interval),
            }
        }
        Ok(())
    }

    fn reap(&self) -> Option<i32> {
        let mut process = lock(&self.link.process).take()?;
        match process.wait_timeout(self.close_timeout) {
            Ok(Some(code)) => Some(code),
            Ok(None) => {
                tracing::warn!("host still running after close timeout, killing");
                if let Err(e) = process.kill() {
                    tracing::warn!(error = %e, "failed to kill host");
                }
                process.wait_timeout(KILL_GRACE).ok().flatten()
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to wait for host");
                None
            }
        }
    }

    /// Send a raw operation to the remote terminal
    pub fn send(
        &self,
        operation: Operation,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<ThreadPromise<Value>, ProxyError> {
        self.link.dispatch(&self.link.pending, move |id| {
            Outgoing::Terminal(Request::new(operation, id, args, kwargs))
        })
    }

    fn read(&self, name: &str) -> Result<ThreadPromise<Value>, ProxyError> {
        self.send(Operation::read(name)?, Vec::new(), Kwargs::new())
    }

    fn invoke(&self, name: &str, args: Vec<Value>) -> Result<ThreadPromise<Value>, ProxyError> {
        self.send(Operation::invoke(name)?, args, Kwargs::new())
    }

    pub fn width(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("width")
    }

    pub fn height(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("height")
    }

    /// Resolves to `[width, height]`
    pub fn size(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("size")
    }

    /// Resolves to `[x, y]`
    pub fn cursor(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("cursor")
    }

    pub fn current_tick(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("current_tick")
    }

    pub fn exit_code(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("exit_code")
    }

    /// Resolves to a map with `x`, `y` and one flag per button and wheel
    /// direction
    pub fn mouse(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("mouse")
    }

    /// Take the oldest unread key; resolves to `Unit` when none is queued.
    /// Key codes are listed in [`key`](crate::key).
    pub fn getch(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("getch", Vec::new())
    }

    /// The newest queued key without consuming it
    pub fn peekch(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("peekch", Vec::new())
    }

    pub fn ungetch(&self, key: i64) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("ungetch", vec![key.into()])
    }

    /// Like [`getch`](Self::getch) on the global queue
    pub fn getgch(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("getgch", Vec::new())
    }

    pub fn peekgch(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("peekgch", Vec::new())
    }

    pub fn ungetgch(&self, key: i64) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("ungetgch", vec![key.into()])
    }

    /// Write text at a position, or at the cursor when omitted
    pub fn putstr(
        &self,
        text: &str,
        x: Option<u16>,
        y: Option<u16>,
    ) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("putstr", vec![text.into(), x.into(), y.into()])
    }

    pub fn clear(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("clear", Vec::new())
    }

    pub fn set_cursor(&self, x: u16, y: u16) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("set_cursor", vec![x.into(), y.into()])
    }

    /// Stop the host's loop after this tick
    pub fn end(&self, code: Option<i64>) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("end", vec![code.into()])
    }

    pub fn add_button(
        &self,
        position: (u16, u16),
        size: (u16, u16),
        text: &str,
        callback: Option<CallbackId>,
    ) -> Result<ThreadPromise<SerializedWidget>, ProxyError> {
        let args = vec![
            position.0.into(),
            position.1.into(),
            size.0.into(),
            size.1.into(),
            text.into(),
            callback.into(),
        ];
        self.widget_call("add_button", args)
    }

    pub fn add_label(
        &self,
        position: (u16, u16),
        text: &str,
    ) -> Result<ThreadPromise<SerializedWidget>, ProxyError> {
        self.widget_call("add_label", vec![position.0.into(), position.1.into(), text.into()])
    }

    /// Look a widget up by ID on the host
    pub fn get_widget(&self, id: WidgetId) -> Result<ThreadPromise<SerializedWidget>, ProxyError> {
        self.widget_call("get_widget", vec![id.into()])
    }

    pub fn del_widget(&self, widget: &SerializedWidget) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("del_widget", vec![widget.id().into()])
    }

    /// Every live widget, in creation order
    pub fn widgets(&self) -> Result<ThreadPromise<Vec<SerializedWidget>>, ProxyError> {
        let raw = self.invoke("widgets", Vec::new())?;
        let typed = ThreadPromise::new();
        let peer = typed.peer();
        let link = Arc::downgrade(&self.link);

        raw.then(move |outcome| {
            let result = outcome.clone().and_then(|value| {
                let link = link
                    .upgrade()
                    .ok_or_else(|| RemoteError::connection_aborted("remote window closed"))?;
                value
                    .as_list()
                    .unwrap_or_default()
                    .iter()
                    .map(|item| widget_value(&link, item))
                    .collect()
            });
            settle(&peer, result);
        })?;
        Ok(typed)
    }

    /// Proxy for a widget ID without asking the host first
    pub fn widget(&self, id: WidgetId) -> SerializedWidget {
        self.link.bind_widget(id)
    }

    /// Call `callback` after `ticks` more ticks; resolves to the timer ID
    pub fn after(&self, ticks: u64, callback: CallbackId) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("after", vec![Value::Int(ticks as i64), callback.into()])
    }

    /// Cancel a timer; resolves to whether it was still scheduled
    pub fn cancel(&self, timer: u64) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("cancel", vec![Value::Int(timer as i64)])
    }

    /// Make a local callable addressable by the host
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.link.callbacks.register(callback)
    }

    /// Forget a callable here and drop every host-side reference to it.
    ///
    /// Resolves to the number of timers and bindings the host released.
    pub fn unregister_callback(&self, id: CallbackId) -> Result<ThreadPromise<Value>, ProxyError> {
        self.link.callbacks.remove(id);
        self.invoke("release_callback", vec![id.into()])
    }

    /// Call a widget-returning operation and resolve to the cached proxy
    fn widget_call(
        &self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<ThreadPromise<SerializedWidget>, ProxyError> {
        let raw = self.invoke(name, args)?;
        let typed = ThreadPromise::new();
        let peer = typed.peer();
        let link = Arc::downgrade(&self.link);

        raw.then(move |outcome| {
            let result = outcome.clone().and_then(|value| {
                let link = link
                    .upgrade()
                    .ok_or_else(|| RemoteError::connection_aborted("remote window closed"))?;
                widget_value(&link, &value)
            });
            settle(&peer, result);
        })?;
        Ok(typed)
    }
}

impl Drop for WindowTerminal {
    fn drop(&mut self) {
        self.close();
    }
}

fn widget_value(link: &Arc<Link>, value: &Value) -> Result<SerializedWidget, RemoteError> {
    value
        .as_widget()
        .map(|id| link.bind_widget(id))
        .ok_or_else(|| RemoteError::execution(format!("expected a widget, got {}", value.type_name())))
}
