//! Controller-side proxy for a widget in the remote terminal

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use st_core::sync::lock;
use st_core::ThreadPromise;
use st_protocol::{
    CallbackId, CorrelationId, Kwargs, Operation, RemoteError, Value, WidgetId, WidgetRequest,
};

use crate::error::ProxyError;
use crate::link::{settle, Link, Outgoing};
use crate::pending::PendingTable;

/// A widget living in the remote terminal.
///
/// Clones share one identity. Every call goes over the widget channel and
/// returns a promise. Once the host reports that the widget no longer
/// exists the proxy is invalidated: its cache entry is evicted and later
/// calls return an already-failed promise.
#[derive(Clone)]
pub struct SerializedWidget {
    shared: Arc<WidgetShared>,
}

struct WidgetShared {
    id: WidgetId,
    link: Weak<Link>,
    pending: Mutex<PendingTable>,
    valid: AtomicBool,
}

impl SerializedWidget {
    pub(crate) fn new(id: WidgetId, link: Weak<Link>) -> Self {
        Self {
            shared: Arc::new(WidgetShared {
                id,
                link,
                pending: Mutex::new(PendingTable::new()),
                valid: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> WidgetId {
        self.shared.id
    }

    /// False once the host has reported the widget missing
    pub fn is_valid(&self) -> bool {
        self.shared.valid.load(Ordering::Acquire)
    }

    /// Whether both proxies are the same cached instance
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Send a raw operation to this widget
    pub fn send(
        &self,
        operation: Operation,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<ThreadPromise<Value>, ProxyError> {
        if !self.is_valid() {
            return Ok(ThreadPromise::failed(RemoteError::index(format!(
                "No such widget - {}",
                self.id().as_u64()
            ))));
        }
        let link = self.shared.link.upgrade().ok_or(ProxyError::Closed)?;
        let widget = self.id();
        link.dispatch(&self.shared.pending, move |id| {
            Outgoing::Widget(WidgetRequest::new(widget, operation, id, args, kwargs))
        })
    }

    fn read(&self, name: &str) -> Result<ThreadPromise<Value>, ProxyError> {
        self.send(Operation::read(name)?, Vec::new(), Kwargs::new())
    }

    fn invoke(&self, name: &str, args: Vec<Value>) -> Result<ThreadPromise<Value>, ProxyError> {
        self.send(Operation::invoke(name)?, args, Kwargs::new())
    }

    pub fn kind(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("kind")
    }

    pub fn x(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("x")
    }

    pub fn y(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("y")
    }

    pub fn width(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("width")
    }

    pub fn height(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("height")
    }

    pub fn text(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("text")
    }

    pub fn hidden(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("hidden")
    }

    pub fn closed(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("closed")
    }

    pub fn z_index(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.read("z_index")
    }

    pub fn set_position(&self, x: u16, y: u16) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("set_position", vec![x.into(), y.into()])
    }

    /// Move by an offset; the host clamps at the origin
    pub fn move_by(&self, dx: i64, dy: i64) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("move", vec![dx.into(), dy.into()])
    }

    pub fn resize(&self, width: u16, height: u16) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("resize", vec![width.into(), height.into()])
    }

    pub fn set_text(&self, text: &str) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("set_text", vec![text.into()])
    }

    pub fn show(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("show", Vec::new())
    }

    pub fn hide(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("hide", Vec::new())
    }

    pub fn has_coord(&self, x: u16, y: u16) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("has_coord", vec![x.into(), y.into()])
    }

    /// Bind or clear the callback notified on activation
    pub fn set_callback(
        &self,
        callback: Option<CallbackId>,
    ) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("set_callback", vec![callback.into()])
    }

    /// Trigger the widget's callback as if it were clicked.
    ///
    /// Resolves to whether a callback was bound.
    pub fn activate(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("activate", Vec::new())
    }

    pub fn close(&self) -> Result<ThreadPromise<Value>, ProxyError> {
        self.invoke("close", Vec::new())
    }

    pub(crate) fn settle(&self, id: CorrelationId, result: Result<Value, RemoteError>) {
        let peer = lock(&self.shared.pending).take(id);
        match peer {
            Some(peer) => settle(&peer, result),
            None => tracing::warn!(widget = %self.id(), id = %id, "response for unknown widget request"),
        }
    }

    pub(crate) fn fail_pending(&self, error: RemoteError) {
        let peers = lock(&self.shared.pending).drain();
        for peer in peers {
            settle(&peer, Err(error.clone()));
        }
    }

    pub(crate) fn invalidate(&self) {
        self.shared.valid.store(false, Ordering::Release);
    }
}

impl PartialEq for SerializedWidget {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for SerializedWidget {}

impl fmt::Debug for SerializedWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedWidget")
            .field("id", &self.id())
            .field("valid", &self.is_valid())
            .finish()
    }
}
