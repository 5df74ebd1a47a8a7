//! Widgets living inside a host terminal

use std::fmt;

use st_protocol::{CallbackId, WidgetId};

/// What a widget is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    /// Clickable box with a label and an optional callback
    Button,
    /// Static single-line text
    Label,
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetKind::Button => f.write_str("button"),
            WidgetKind::Label => f.write_str("label"),
        }
    }
}

/// A positioned element drawn over the terminal buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: WidgetId,
    pub kind: WidgetKind,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub text: String,
    pub hidden: bool,
    pub closed: bool,
    pub z_index: i64,
    pub callback: Option<CallbackId>,
}

impl Widget {
    pub fn button(
        id: WidgetId,
        (x, y): (u16, u16),
        (width, height): (u16, u16),
        text: impl Into<String>,
        callback: Option<CallbackId>,
    ) -> Self {
        Self {
            id,
            kind: WidgetKind::Button,
            x,
            y,
            width,
            height,
            text: text.into(),
            hidden: false,
            closed: false,
            z_index: 0,
            callback,
        }
    }

    pub fn label(id: WidgetId, (x, y): (u16, u16), text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id,
            kind: WidgetKind::Label,
            x,
            y,
            width: u16::try_from(text.chars().count()).unwrap_or(u16::MAX),
            height: 1,
            text,
            hidden: false,
            closed: false,
            z_index: 0,
            callback: None,
        }
    }

    pub fn set_position(&mut self, x: u16, y: u16) {
        self.x = x;
        self.y = y;
    }

    /// Move by a signed offset, clamped at the origin
    pub fn move_by(&mut self, dx: i64, dy: i64) {
        self.x = offset(self.x, dx);
        self.y = offset(self.y, dy);
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if self.kind == WidgetKind::Label {
            self.width = u16::try_from(self.text.chars().count()).unwrap_or(u16::MAX);
        }
    }

    pub fn show(&mut self) {
        self.hidden = false;
    }

    pub fn hide(&mut self) {
        self.hidden = true;
    }

    /// Whether a visible cell of this widget covers `(x, y)`
    pub fn has_coord(&self, x: u16, y: u16) -> bool {
        !self.hidden
            && !self.closed
            && x >= self.x
            && y >= self.y
            && u32::from(x) < u32::from(self.x) + u32::from(self.width)
            && u32::from(y) < u32::from(self.y) + u32::from(self.height)
    }

    /// The callback an activation should notify, if any
    pub fn activate(&self) -> Option<CallbackId> {
        if self.hidden || self.closed {
            return None;
        }
        self.callback
    }

    /// Mark for removal at the end of the current pump
    pub fn close(&mut self) {
        self.closed = true;
    }
}

fn offset(base: u16, delta: i64) -> u16 {
    let moved = i64::from(base).saturating_add(delta);
    u16::try_from(moved.clamp(0, i64::from(u16::MAX))).unwrap_or(0)
}
