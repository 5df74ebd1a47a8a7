//! State shared by a window proxy, its widget proxies and the resolver thread

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use st_core::sync::lock;
use st_core::{DuplexPipe, Promise, RemoteProcess, ThreadPromise, TransportError};
use st_protocol::{
    CorrelationId, RemoteError, RemoteErrorKind, Request, Response, Value, WidgetId,
    WidgetRequest, WidgetResponse,
};

use crate::callback::CallbackTable;
use crate::error::ProxyError;
use crate::pending::PendingTable;
use crate::widget::SerializedWidget;

/// Lifecycle of a remote window connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Channels exist, host not launched yet
    Created,
    /// Waiting for the host's ready byte
    Connecting,
    /// Host is ready; requests queue until `begin`
    Ready,
    /// Requests go straight to the wire
    Running,
    /// `close` is in progress
    Closing,
    /// Nothing more will be sent or received
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Created => "created",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Running => "running",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A request waiting in the outbox
#[derive(Debug)]
pub(crate) enum Outgoing {
    Terminal(Request),
    Widget(WidgetRequest),
}

/// State and outbox share one lock so queued and live sends keep order
#[derive(Debug)]
pub(crate) struct Phase {
    pub state: ConnectionState,
    pub outbox: VecDeque<Outgoing>,
    /// Set once `close` has started
    pub finished: bool,
}

/// What one pass over both channels found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Idle,
    Busy,
    /// The termination notice arrived
    Stop,
}

pub(crate) struct Link {
    pub terminal_pipe: DuplexPipe,
    pub widget_pipe: DuplexPipe,
    pub phase: Mutex<Phase>,
    pub pending: Mutex<PendingTable>,
    pub widgets: DashMap<WidgetId, SerializedWidget>,
    pub callbacks: CallbackTable,
    pub process: Mutex<Option<Box<dyn RemoteProcess>>>,
    pub stop: AtomicBool,
    connected: AtomicBool,
    exit_reason: Mutex<Option<Value>>,
}

impl Link {
    pub fn new(
        terminal_pipe: DuplexPipe,
        widget_pipe: DuplexPipe,
        callbacks: CallbackTable,
        process: Box<dyn RemoteProcess>,
    ) -> Self {
        Self {
            terminal_pipe,
            widget_pipe,
            phase: Mutex::new(Phase {
                state: ConnectionState::Created,
                outbox: VecDeque::new(),
                finished: false,
            }),
            pending: Mutex::new(PendingTable::new()),
            widgets: DashMap::new(),
            callbacks,
            process: Mutex::new(Some(process)),
            stop: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            exit_reason: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.phase).state
    }

    pub fn transition(&self, to: ConnectionState) {
        let mut phase = lock(&self.phase);
        tracing::debug!(from = %phase.state, to = %to, "connection state");
        phase.state = to;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn exit_reason(&self) -> Option<Value> {
        lock(&self.exit_reason).clone()
    }

    /// Register a request against `pending` and send or queue it.
    ///
    /// `build` receives the allocated correlation ID.
    pub fn dispatch<F>(
        &self,
        pending: &Mutex<PendingTable>,
        build: F,
    ) -> Result<ThreadPromise<Value>, ProxyError>
    where
        F: FnOnce(CorrelationId) -> Outgoing,
    {
        let mut phase = lock(&self.phase);
        if matches!(phase.state, ConnectionState::Closing | ConnectionState::Closed) {
            return Err(ProxyError::Closed);
        }

        let (id, promise) = lock(pending).register();
        let outgoing = build(id);

        if phase.state != ConnectionState::Running {
            tracing::debug!(id = %id, "request queued until begin");
            phase.outbox.push_back(outgoing);
            return Ok(promise);
        }

        if let Err(e) = self.send_outgoing(&outgoing) {
            tracing::warn!(id = %id, error = %e, "request not sent");
            lock(pending).discard(id);
            return Ok(ThreadPromise::failed(RemoteError::from(&e)));
        }
        Ok(promise)
    }

    pub fn send_outgoing(&self, outgoing: &Outgoing) -> Result<(), TransportError> {
        match outgoing {
            Outgoing::Terminal(request) => {
                tracing::debug!(id = %request.id, operation = %request.operation, "terminal request");
                self.terminal_pipe.send(request)
            }
            Outgoing::Widget(request) => {
                tracing::debug!(
                    id = %request.id,
                    widget = %request.widget,
                    operation = %request.operation,
                    "widget request"
                );
                self.widget_pipe.send(request)
            }
        }
    }

    /// Fail the promise of a queued request that could not be sent
    pub fn fail_outgoing(&self, outgoing: &Outgoing, error: RemoteError) {
        match outgoing {
            Outgoing::Terminal(request) => {
                let peer = lock(&self.pending).take(request.id);
                if let Some(peer) = peer {
                    settle(&peer, Err(error));
                }
            }
            Outgoing::Widget(request) => {
                if let Some(widget) = self.cached_widget(request.widget) {
                    widget.settle(request.id, Err(error));
                }
            }
        }
    }

    /// The cached proxy for `id`, creating it if needed
    pub fn bind_widget(self: &Arc<Self>, id: WidgetId) -> SerializedWidget {
        self.widgets
            .entry(id)
            .or_insert_with(|| SerializedWidget::new(id, Arc::downgrade(self)))
            .value()
            .clone()
    }

    pub fn cached_widget(&self, id: WidgetId) -> Option<SerializedWidget> {
        self.widgets.get(&id).map(|entry| entry.value().clone())
    }

    /// Read everything currently available on both channels
    pub fn poll_once(&self) -> Result<Flow, TransportError> {
        let mut flow = Flow::Idle;

        while let Some(response) = self.terminal_pipe.next_message::<Response>()? {
            flow = Flow::Busy;
            if self.handle_response(response) == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        while let Some(response) = self.widget_pipe.next_message::<WidgetResponse>()? {
            flow = Flow::Busy;
            self.handle_widget_response(response);
        }

        Ok(flow)
    }

    fn handle_response(&self, response: Response) -> Flow {
        let id = response.id;

        if id.is_shutdown() {
            self.terminate(response.result);
            return Flow::Stop;
        }

        if let Some(callback) = id.as_callback() {
            let value = response.result.unwrap_or_else(Value::from);
            self.callbacks.invoke(callback, value);
            return Flow::Busy;
        }

        let peer = lock(&self.pending).take(id);
        match peer {
            Some(peer) => settle(&peer, response.result),
            None => tracing::warn!(id = %id, "response for unknown request"),
        }
        Flow::Busy
    }

    fn handle_widget_response(&self, response: WidgetResponse) {
        let Some(widget) = self.cached_widget(response.widget) else {
            tracing::debug!(widget = %response.widget, id = %response.id, "response for evicted widget");
            return;
        };

        let missing = match &response.result {
            Err(err) if err.kind == RemoteErrorKind::Index => Some(err.clone()),
            _ => None,
        };

        if missing.is_some() {
            tracing::debug!(widget = %widget.id(), "widget gone, evicting proxy");
            self.widgets.remove(&widget.id());
            widget.invalidate();
        }

        widget.settle(response.id, response.result);

        if let Some(err) = missing {
            widget.fail_pending(err);
        }
    }

    /// Handle the termination notice
    fn terminate(&self, reason: Result<Value, RemoteError>) {
        let reason = reason.unwrap_or_else(Value::from);
        tracing::info!(reason = %reason, "host sent termination notice");
        *lock(&self.exit_reason) = Some(reason);

        // Widget answers written before the notice still count
        loop {
            match self.widget_pipe.next_message::<WidgetResponse>() {
                Ok(Some(response)) => self.handle_widget_response(response),
                Ok(None) | Err(_) => break,
            }
        }

        self.disconnect(RemoteError::connection_aborted("remote terminal ended"));
    }

    /// Mark the connection dead, fail everything outstanding and close both
    /// channels
    pub fn disconnect(&self, error: RemoteError) {
        self.connected.store(false, Ordering::Release);

        let queued = {
            let mut phase = lock(&self.phase);
            if phase.state != ConnectionState::Closing {
                phase.state = ConnectionState::Closed;
            }
            std::mem::take(&mut phase.outbox)
        };
        for outgoing in &queued {
            self.fail_outgoing(outgoing, error.clone());
        }

        let peers = lock(&self.pending).drain();
        let failed = peers.len();
        for peer in peers {
            settle(&peer, Err(error.clone()));
        }

        let widgets: Vec<_> = self.widgets.iter().map(|e| e.value().clone()).collect();
        for widget in widgets {
            widget.fail_pending(error.clone());
        }

        for pipe in [&self.terminal_pipe, &self.widget_pipe] {
            match pipe.close() {
                Ok(()) | Err(TransportError::AlreadyClosed) => {}
                Err(e) => tracing::debug!(pipe = pipe.name(), error = %e, "close failed"),
            }
        }

        if failed > 0 {
            tracing::debug!(failed, "failed outstanding requests");
        }
    }

    /// Exit code of the host if it has already exited
    pub fn exited(&self) -> Option<i32> {
        let mut process = lock(&self.process);
        let process = process.as_mut()?;
        match process.try_wait() {
            Ok(code) => code,
            Err(e) => {
                tracing::debug!(error = %e, "could not query host process");
                None
            }
        }
    }
}

/// Settle a peer handle; a second settlement is only logged
pub(crate) fn settle<T>(peer: &ThreadPromise<T>, result: Result<T, RemoteError>)
where
    T: Clone + Send + 'static,
{
    let settled = match result {
        Ok(value) => peer.resolve(value),
        Err(err) => peer.throw(err),
    };
    if let Err(e) = settled {
        tracing::debug!(error = %e, "promise already settled");
    }
}
