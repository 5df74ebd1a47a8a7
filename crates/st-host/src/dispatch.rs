//! Per-tick request dispatch
//!
//! [`Dispatcher::pump`] runs once per tick, before drawing:
//!
//! 1. drain the terminal channel, executing each [`Request`] and answering
//!    with a [`Response`] carrying the same correlation ID;
//! 2. drain the widget channel the same way, answering unknown widget IDs
//!    with an index error;
//! 3. send queued callback notifications;
//! 4. prune closed widgets.
//!
//! Every request gets exactly one response. Handler failures, including
//! panics, become failed responses; a cancellation failure also asks the
//! terminal to exit.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use st_core::{DuplexPipe, TransportError};
use st_protocol::{
    Operation, ProtocolError, RemoteError, Request, Response, Value, WidgetId, WidgetRequest,
    WidgetResponse,
};

use crate::ops::{terminal_registry, widget_registry, TerminalHandler, WidgetHandler};
use crate::registry::{Args, Registry};
use crate::terminal::{no_such_widget, Terminal};

/// Counts from one pump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub requests: usize,
    pub widget_requests: usize,
    pub notifications: usize,
}

/// Serves a terminal's two request channels
pub struct Dispatcher {
    terminal_pipe: DuplexPipe,
    widget_pipe: DuplexPipe,
    terminal_ops: Registry<TerminalHandler>,
    widget_ops: Registry<WidgetHandler>,
    /// Widgets handed out to the controller
    bound: HashSet<WidgetId>,
}

impl Dispatcher {
    pub fn new(terminal_pipe: DuplexPipe, widget_pipe: DuplexPipe) -> Self {
        Self {
            terminal_pipe,
            widget_pipe,
            terminal_ops: terminal_registry(),
            widget_ops: widget_registry(),
            bound: HashSet::new(),
        }
    }

    /// The terminal-level channel
    pub fn terminal_pipe(&self) -> &DuplexPipe {
        &self.terminal_pipe
    }

    /// Whether the controller currently holds a reference to `id`
    pub fn is_bound(&self, id: WidgetId) -> bool {
        self.bound.contains(&id)
    }

    /// Serve everything queued on both channels
    pub fn pump(&mut self, terminal: &mut Terminal) -> Result<PumpStats, TransportError> {
        let mut stats = PumpStats::default();

        while let Some(request) = self.terminal_pipe.next_message::<Request>()? {
            let result = self.execute(terminal, &request);
            tracing::debug!(
                id = %request.id,
                operation = %request.operation,
                ok = result.is_ok(),
                "terminal request"
            );
            self.terminal_pipe.send(&Response::new(request.id, result))?;
            stats.requests += 1;
        }

        while let Some(request) = self.widget_pipe.next_message::<WidgetRequest>()? {
            let result = self.execute_widget(terminal, &request);
            tracing::debug!(
                id = %request.id,
                widget = %request.widget,
                operation = %request.operation,
                ok = result.is_ok(),
                "widget request"
            );
            self.widget_pipe
                .send(&WidgetResponse::new(request.widget, request.id, result))?;
            stats.widget_requests += 1;
        }

        for (callback, value) in terminal.drain_notifications() {
            self.terminal_pipe
                .send(&Response::new(callback.into(), Ok(value)))?;
            stats.notifications += 1;
        }

        for id in terminal.prune_closed() {
            self.bound.remove(&id);
        }

        Ok(stats)
    }

    /// Send the termination notice and close both channels
    pub fn shutdown(&self, reason: Option<RemoteError>) -> Result<(), TransportError> {
        let sent = self.terminal_pipe.send(&Response::shutdown(reason));
        for pipe in [&self.terminal_pipe, &self.widget_pipe] {
            if let Err(e) = pipe.close() {
                tracing::debug!(pipe = pipe.name(), error = %e, "close during shutdown");
            }
        }
        sent
    }

    fn execute(&mut self, terminal: &mut Terminal, request: &Request) -> Result<Value, RemoteError> {
        let result = parse_operation(request.operation())
            .and_then(|op| self.terminal_ops.lookup(&op))
            .and_then(|handler| {
                let args = Args::new(&request.args, &request.kwargs);
                guarded(|| handler(terminal, args))
            });
        self.settle(terminal, result)
    }

    fn execute_widget(
        &mut self,
        terminal: &mut Terminal,
        request: &WidgetRequest,
    ) -> Result<Value, RemoteError> {
        if !terminal.has_widget(request.widget) {
            self.bound.remove(&request.widget);
            return Err(no_such_widget(request.widget));
        }

        let result = parse_operation(request.operation())
            .and_then(|op| self.widget_ops.lookup(&op))
            .and_then(|handler| {
                let args = Args::new(&request.args, &request.kwargs);
                guarded(|| handler(terminal, request.widget, args))
            });
        self.settle(terminal, result)
    }

    /// Common bookkeeping on a handler's result
    fn settle(
        &mut self,
        terminal: &mut Terminal,
        result: Result<Value, RemoteError>,
    ) -> Result<Value, RemoteError> {
        match &result {
            Ok(value) => self.bind(value),
            Err(err) if err.is_cancellation() => terminal.request_exit(Some(err.clone())),
            Err(_) => {}
        }
        result
    }

    fn bind(&mut self, value: &Value) {
        match value {
            Value::Widget(id) => {
                self.bound.insert(*id);
            }
            Value::List(items) => items.iter().for_each(|item| self.bind(item)),
            _ => {}
        }
    }
}

fn parse_operation(parsed: Result<Operation, ProtocolError>) -> Result<Operation, RemoteError> {
    parsed.map_err(|e| RemoteError::unknown_operation(e.to_string()))
}

/// Run a handler, turning a panic into an execution error
fn guarded<F>(handler: F) -> Result<Value, RemoteError>
where
    F: FnOnce() -> Result<Value, RemoteError>,
{
    panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "operation panicked".to_string());
        tracing::error!(%message, "operation panicked");
        Err(RemoteError::execution(message))
    })
}
