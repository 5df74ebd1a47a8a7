//! The terminal owned by a host
//!
//! A character grid with a cursor, a set of widgets drawn above it, and a
//! tick counter driving scheduled callbacks. All mutation happens on the
//! host's tick loop; controllers reach it only through dispatched requests.
//!
//! Console input is fed in once per tick. Keys are kept in two bounded
//! queues: the local one is read with `getch`, the global one with `getgch`
//! so a second reader does not steal keys from the first.

use std::collections::{BTreeMap, VecDeque};

use st_protocol::{CallbackId, RemoteError, Value, WidgetId};

use crate::input::{Button, InputEvent, MouseAction, MouseState};
use crate::widget::{Widget, WidgetKind};

/// A callback scheduled by `after`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Timer {
    id: u64,
    due: u64,
    callback: CallbackId,
}

/// Remote-drivable terminal state
#[derive(Debug)]
pub struct Terminal {
    width: u16,
    height: u16,
    rows: Vec<Vec<char>>,
    cursor: (u16, u16),
    tps: u32,
    tick: u64,
    widgets: BTreeMap<WidgetId, Widget>,
    next_widget: u64,
    timers: Vec<Timer>,
    next_timer: u64,
    notifications: Vec<(CallbackId, Value)>,
    should_exit: bool,
    exit_code: Option<i64>,
    exit_reason: Option<RemoteError>,
    keys: VecDeque<i64>,
    global_keys: VecDeque<i64>,
    mouse: MouseState,
}

/// Largest width or height a terminal accepts
pub const MAX_DIMENSION: u16 = 4096;

/// Keys each queue holds before the oldest is dropped
pub const KEY_QUEUE_LEN: usize = 10;

/// The error every lookup of a missing widget reports
pub fn no_such_widget(id: WidgetId) -> RemoteError {
    RemoteError::index(format!("No such widget - {}", id.0))
}

impl Terminal {
    /// Dimensions are clamped to `1..=MAX_DIMENSION`
    pub fn new(width: u16, height: u16, tps: u32) -> Self {
        let width = width.clamp(1, MAX_DIMENSION);
        let height = height.clamp(1, MAX_DIMENSION);
        Self {
            width,
            height,
            rows: blank(width, height),
            cursor: (0, 0),
            tps,
            tick: 0,
            widgets: BTreeMap::new(),
            next_widget: 1,
            timers: Vec::new(),
            next_timer: 1,
            notifications: Vec::new(),
            should_exit: false,
            exit_code: None,
            exit_reason: None,
            keys: VecDeque::with_capacity(KEY_QUEUE_LEN),
            global_keys: VecDeque::with_capacity(KEY_QUEUE_LEN),
            mouse: MouseState::default(),
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn cursor(&self) -> (u16, u16) {
        self.cursor
    }

    pub fn tps(&self) -> u32 {
        self.tps
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.exit_code
    }

    pub fn exit_reason(&self) -> Option<&RemoteError> {
        self.exit_reason.as_ref()
    }

    pub fn should_exit(&self) -> bool {
        self.should_exit
    }

    /// Write `text` at `(x, y)`, or at the cursor when a coordinate is
    /// omitted. The cursor ends after the last character written; text past
    /// the right edge or the last row is clipped.
    pub fn putstr(&mut self, text: &str, x: Option<u16>, y: Option<u16>) {
        let (mut cx, mut cy) = (x.unwrap_or(self.cursor.0), y.unwrap_or(self.cursor.1));
        let line_start = cx;

        for ch in text.chars() {
            if ch == '\n' {
                cx = line_start;
                cy = cy.saturating_add(1);
                continue;
            }
            if let Some(cell) = self
                .rows
                .get_mut(usize::from(cy))
                .and_then(|row| row.get_mut(usize::from(cx)))
            {
                *cell = ch;
            }
            cx = cx.saturating_add(1);
        }

        self.cursor = (cx.min(self.width), cy.min(self.height.saturating_sub(1)));
    }

    pub fn clear(&mut self) {
        self.rows = blank(self.width, self.height);
        self.cursor = (0, 0);
    }

    pub fn set_cursor(&mut self, x: u16, y: u16) -> Result<(), RemoteError> {
        if x > self.width || y >= self.height {
            return Err(RemoteError::invalid_argument(format!(
                "cursor ({}, {}) outside {}x{}",
                x, y, self.width, self.height
            )));
        }
        self.cursor = (x, y);
        Ok(())
    }

    /// Change the grid size, keeping whatever still fits
    pub fn resize(&mut self, width: u16, height: u16) -> Result<(), RemoteError> {
        if !(1..=MAX_DIMENSION).contains(&width) || !(1..=MAX_DIMENSION).contains(&height) {
            return Err(RemoteError::invalid_argument(format!(
                "size {}x{} outside 1..={}",
                width, height, MAX_DIMENSION
            )));
        }

        let mut rows = blank(width, height);
        for (new, old) in rows.iter_mut().zip(&self.rows) {
            for (cell, ch) in new.iter_mut().zip(old) {
                *cell = *ch;
            }
        }
        self.rows = rows;
        self.width = width;
        self.height = height;
        self.cursor = (
            self.cursor.0.min(width),
            self.cursor.1.min(height.saturating_sub(1)),
        );
        Ok(())
    }

    /// Finish normally with `code`
    pub fn end(&mut self, code: Option<i64>) {
        self.exit_code = Some(code.unwrap_or(0));
        self.request_exit(None);
    }

    /// Stop the tick loop after the current pump
    pub fn request_exit(&mut self, reason: Option<RemoteError>) {
        if !self.should_exit {
            tracing::info!(reason = ?reason.as_ref().map(|r| r.to_string()), "exit requested");
        }
        self.should_exit = true;
        if reason.is_some() {
            self.exit_reason = reason;
        }
    }

    /// Record an exit code without stopping
    pub fn set_exit_code(&mut self, code: i64) {
        self.exit_code = Some(code);
    }

    pub fn add_widget(&mut self, build: impl FnOnce(WidgetId) -> Widget) -> WidgetId {
        let id = WidgetId(self.next_widget);
        self.next_widget += 1;
        self.widgets.insert(id, build(id));
        tracing::debug!(widget = %id, "added widget");
        id
    }

    pub fn widget(&self, id: WidgetId) -> Option<&Widget> {
        self.widgets.get(&id)
    }

    pub fn widget_mut(&mut self, id: WidgetId) -> Option<&mut Widget> {
        self.widgets.get_mut(&id)
    }

    pub fn has_widget(&self, id: WidgetId) -> bool {
        self.widgets.contains_key(&id)
    }

    /// Close a widget; it is removed at the end of the current pump
    pub fn del_widget(&mut self, id: WidgetId) -> Result<(), RemoteError> {
        let widget = self.widget_mut(id).ok_or_else(|| no_such_widget(id))?;
        widget.close();
        Ok(())
    }

    /// IDs of every open widget, lowest first
    pub fn widget_ids(&self) -> Vec<WidgetId> {
        self.widgets
            .values()
            .filter(|w| !w.closed)
            .map(|w| w.id)
            .collect()
    }

    /// Widgets in drawing order
    pub fn visible_widgets(&self) -> Vec<&Widget> {
        let mut visible: Vec<_> = self
            .widgets
            .values()
            .filter(|w| !w.hidden && !w.closed)
            .collect();
        visible.sort_by_key(|w| (w.z_index, w.id));
        visible
    }

    /// Drop closed widgets, returning their IDs
    pub fn prune_closed(&mut self) -> Vec<WidgetId> {
        let closed: Vec<_> = self
            .widgets
            .values()
            .filter(|w| w.closed)
            .map(|w| w.id)
            .collect();
        for id in &closed {
            self.widgets.remove(id);
            tracing::debug!(widget = %id, "pruned widget");
        }
        closed
    }

    /// Notify `callback` after `ticks` more ticks; returns the timer ID
    pub fn after(&mut self, ticks: u64, callback: CallbackId) -> u64 {
        let id = self.next_timer;
        self.next_timer += 1;
        self.timers.push(Timer {
            id,
            due: self.tick.saturating_add(ticks),
            callback,
        });
        id
    }

    /// Cancel a scheduled timer; false if it already fired or never existed
    pub fn cancel(&mut self, timer: u64) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != timer);
        self.timers.len() != before
    }

    /// Forget every reference to `callback`; returns how many were dropped
    pub fn release_callback(&mut self, callback: CallbackId) -> usize {
        let before = self.timers.len();
        self.timers.retain(|t| t.callback != callback);
        let mut released = before - self.timers.len();

        for widget in self.widgets.values_mut() {
            if widget.callback == Some(callback) {
                widget.callback = None;
                released += 1;
            }
        }
        released
    }

    /// Queue a callback notification for the controller
    pub fn notify(&mut self, callback: CallbackId, value: Value) {
        self.notifications.push((callback, value));
    }

    pub fn drain_notifications(&mut self) -> Vec<(CallbackId, Value)> {
        std::mem::take(&mut self.notifications)
    }

    /// Advance one tick and fire due timers
    pub fn advance(&mut self) {
        self.tick += 1;
        let tick = self.tick;

        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.timers).into_iter().partition(|t| t.due <= tick);
        self.timers = pending;
        for timer in due {
            self.notify(timer.callback, Value::Int(tick as i64));
        }
    }

    /// Apply one console input event
    pub fn feed(&mut self, event: InputEvent) {
        match event {
            InputEvent::Key(key) => {
                push_bounded(&mut self.keys, key);
                push_bounded(&mut self.global_keys, key);
            }
            InputEvent::Mouse { x, y, action } => self.feed_mouse(x, y, action),
            InputEvent::Interrupt => {}
        }
    }

    fn feed_mouse(&mut self, x: u16, y: u16, action: MouseAction) {
        self.mouse.x = x;
        self.mouse.y = y;
        self.mouse.scroll = 0;
        match action {
            MouseAction::Press(button) => {
                self.mouse.buttons |= button.bit();
                if button == Button::Left {
                    self.click(x, y);
                }
            }
            MouseAction::Release(button) => self.mouse.buttons &= !button.bit(),
            MouseAction::Move => {}
            MouseAction::ScrollUp => self.mouse.scroll = -1,
            MouseAction::ScrollDown => self.mouse.scroll = 1,
        }
    }

    /// Activate the topmost visible widget covering `(x, y)`
    fn click(&mut self, x: u16, y: u16) {
        let target = self
            .visible_widgets()
            .into_iter()
            .rev()
            .find(|w| w.has_coord(x, y))
            .map(|w| w.id);
        if let Some(id) = target {
            tracing::debug!(widget = %id, x, y, "click");
            if let Err(e) = self.activate(id) {
                tracing::debug!(error = %e, "click target vanished");
            }
        }
    }

    /// Notify the widget's callback as if it had been clicked; false when
    /// it has none
    pub fn activate(&mut self, id: WidgetId) -> Result<bool, RemoteError> {
        let widget = self.widget(id).ok_or_else(|| no_such_widget(id))?;
        match widget.activate() {
            Some(callback) => {
                self.notify(callback, Value::Widget(id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Take the oldest unread key
    pub fn getch(&mut self) -> Option<i64> {
        self.keys.pop_front()
    }

    /// The newest key, left in the queue
    pub fn peekch(&self) -> Option<i64> {
        self.keys.back().copied()
    }

    /// Put a key back as the newest entry
    pub fn ungetch(&mut self, key: i64) {
        push_bounded(&mut self.keys, key);
    }

    pub fn getgch(&mut self) -> Option<i64> {
        self.global_keys.pop_front()
    }

    pub fn peekgch(&self) -> Option<i64> {
        self.global_keys.back().copied()
    }

    pub fn ungetgch(&mut self, key: i64) {
        push_bounded(&mut self.global_keys, key);
    }

    pub fn mouse(&self) -> MouseState {
        self.mouse
    }

    /// Mouse state as a map of position and button flags
    pub fn mouse_value(&self) -> Value {
        let m = self.mouse;
        let map = BTreeMap::from([
            ("x".to_string(), Value::from(m.x)),
            ("y".to_string(), Value::from(m.y)),
            ("left".to_string(), m.pressed(Button::Left).into()),
            ("middle".to_string(), m.pressed(Button::Middle).into()),
            ("right".to_string(), m.pressed(Button::Right).into()),
            ("scroll_up".to_string(), (m.scroll < 0).into()),
            ("scroll_down".to_string(), (m.scroll > 0).into()),
        ]);
        Value::Map(map)
    }

    /// The grid with widgets drawn over it
    pub fn compose(&self) -> Vec<String> {
        let mut rows = self.rows.clone();

        for widget in self.visible_widgets() {
            let text: Vec<char> = match widget.kind {
                WidgetKind::Button => format!("[{}]", widget.text).chars().collect(),
                WidgetKind::Label => widget.text.chars().collect(),
            };
            for dy in 0..widget.height {
                let Some(row) = rows.get_mut(usize::from(widget.y.saturating_add(dy))) else {
                    break;
                };
                for dx in 0..widget.width {
                    let Some(cell) = row.get_mut(usize::from(widget.x.saturating_add(dx))) else {
                        break;
                    };
                    let ch = if dy == widget.height / 2 {
                        text.get(usize::from(dx)).copied().unwrap_or(' ')
                    } else {
                        ' '
                    };
                    *cell = ch;
                }
            }
        }

        rows.into_iter().map(|row| row.into_iter().collect()).collect()
    }
}

fn push_bounded(queue: &mut VecDeque<i64>, key: i64) {
    if queue.len() == KEY_QUEUE_LEN {
        queue.pop_front();
    }
    queue.push_back(key);
}

fn blank(width: u16, height: u16) -> Vec<Vec<char>> {
    vec![vec![' '; usize::from(width)]; usize::from(height)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_putstr_at_cursor_and_position() {
        let mut term = Terminal::new(10, 3, 30);
        term.putstr("hi", None, None);
        assert_eq!(term.cursor(), (2, 0));
        term.putstr("yo", Some(5), Some(2));
        assert_eq!(term.cursor(), (7, 2));

        let lines = term.compose();
        assert_eq!(lines[0], "hi        ");
        assert_eq!(lines[2], "     yo   ");
    }

    #[test]
    fn test_putstr_clips_at_edge() {
        let mut term = Terminal::new(4, 2, 30);
        term.putstr("abcdef\nxy", Some(2), Some(0));
        let lines = term.compose();
        assert_eq!(lines[0], "  ab");
        assert_eq!(lines[1], "  xy");
    }

    #[test]
    fn test_resize_keeps_content() {
        let mut term = Terminal::new(4, 2, 30);
        term.putstr("abcd", Some(0), Some(0));
        term.resize(2, 3).unwrap();
        assert_eq!(term.compose(), vec!["ab", "  ", "  "]);
        assert_eq!(term.size(), (2, 3));
    }

    #[test]
    fn test_resize_rejects_huge_and_empty() {
        let mut term = Terminal::new(4, 2, 30);
        let err = term.resize(u16::MAX, u16::MAX).unwrap_err();
        assert_eq!(err.kind, st_protocol::RemoteErrorKind::InvalidArgument);
        assert!(term.resize(0, 5).is_err());
        assert_eq!(term.size(), (4, 2));

        assert!(term.resize(MAX_DIMENSION, 1).is_ok());
    }

    #[test]
    fn test_new_clamps_dimensions() {
        let term = Terminal::new(u16::MAX, 0, 30);
        assert_eq!(term.size(), (MAX_DIMENSION, 1));
    }

    #[test]
    fn test_set_cursor_bounds() {
        let mut term = Terminal::new(4, 2, 30);
        assert!(term.set_cursor(4, 1).is_ok());
        assert!(term.set_cursor(1, 2).is_err());
    }

    #[test]
    fn test_timers_fire_once_when_due() {
        let mut term = Terminal::new(1, 1, 30);
        let first = term.after(2, CallbackId(1));
        let second = term.after(1, CallbackId(2));
        assert!(term.cancel(first));
        assert!(!term.cancel(first));

        term.advance();
        assert_eq!(term.drain_notifications(), vec![(CallbackId(2), Value::Int(1))]);
        term.advance();
        term.advance();
        assert!(term.drain_notifications().is_empty());
        assert!(!term.cancel(second));
    }

    #[test]
    fn test_release_callback_drops_references() {
        let mut term = Terminal::new(10, 5, 30);
        term.after(5, CallbackId(3));
        let id = term.add_widget(|id| Widget::button(id, (0, 0), (3, 1), "b", Some(CallbackId(3))));

        assert_eq!(term.release_callback(CallbackId(3)), 2);
        assert_eq!(term.widget(id).unwrap().callback, None);
    }

    #[test]
    fn test_deleted_widget_pruned() {
        let mut term = Terminal::new(10, 5, 30);
        let id = term.add_widget(|id| Widget::label(id, (0, 0), "x"));
        term.del_widget(id).unwrap();
        assert!(term.widget_ids().is_empty());
        assert_eq!(term.prune_closed(), vec![id]);
        assert_eq!(term.del_widget(id).unwrap_err(), no_such_widget(id));
    }

    #[test]
    fn test_key_queues_are_independent() {
        let mut term = Terminal::new(1, 1, 30);
        term.feed(InputEvent::Key(97));
        term.feed(InputEvent::Key(98));

        assert_eq!(term.peekch(), Some(98));
        assert_eq!(term.getch(), Some(97));
        assert_eq!(term.getch(), Some(98));
        assert_eq!(term.getch(), None);

        assert_eq!(term.getgch(), Some(97));
        term.ungetgch(120);
        assert_eq!(term.peekgch(), Some(120));
        assert_eq!(term.getgch(), Some(98));
        assert_eq!(term.getgch(), Some(120));
    }

    #[test]
    fn test_key_queue_drops_oldest() {
        let mut term = Terminal::new(1, 1, 30);
        for key in 0..15 {
            term.feed(InputEvent::Key(key));
        }
        assert_eq!(term.getch(), Some(5));
        term.ungetch(99);
        assert_eq!(term.peekch(), Some(99));
    }

    #[test]
    fn test_click_activates_topmost_widget() {
        let mut term = Terminal::new(20, 5, 30);
        let below = term.add_widget(|id| Widget::button(id, (0, 0), (10, 3), "a", Some(CallbackId(1))));
        let above = term.add_widget(|id| Widget::button(id, (5, 1), (4, 1), "b", Some(CallbackId(2))));

        let click = |x, y| InputEvent::Mouse {
            x,
            y,
            action: MouseAction::Press(Button::Left),
        };
        term.feed(click(6, 1));
        term.feed(click(1, 0));
        term.feed(click(15, 4));
        assert_eq!(
            term.drain_notifications(),
            vec![
                (CallbackId(2), Value::Widget(above)),
                (CallbackId(1), Value::Widget(below)),
            ]
        );

        term.widget_mut(above).unwrap().hide();
        term.feed(click(6, 1));
        assert_eq!(term.drain_notifications(), vec![(CallbackId(1), Value::Widget(below))]);
    }

    #[test]
    fn test_mouse_state_tracks_buttons() {
        let mut term = Terminal::new(20, 5, 30);
        term.feed(InputEvent::Mouse {
            x: 4,
            y: 2,
            action: MouseAction::Press(Button::Right),
        });
        assert!(term.mouse().pressed(Button::Right));
        assert!(term.drain_notifications().is_empty());

        term.feed(InputEvent::Mouse {
            x: 5,
            y: 2,
            action: MouseAction::ScrollDown,
        });
        let value = term.mouse_value();
        let map = value.as_map().unwrap();
        assert_eq!(map["x"], Value::Int(5));
        assert_eq!(map["right"], Value::Bool(true));
        assert_eq!(map["scroll_down"], Value::Bool(true));

        term.feed(InputEvent::Mouse {
            x: 5,
            y: 2,
            action: MouseAction::Release(Button::Right),
        });
        assert_eq!(term.mouse().buttons, 0);
        assert_eq!(term.mouse().scroll, 0);
    }

    #[test]
    fn test_exit_reason_kept() {
        let mut term = Terminal::new(1, 1, 30);
        term.request_exit(Some(RemoteError::cancelled("stop")));
        term.request_exit(None);
        assert!(term.should_exit());
        assert_eq!(term.exit_reason().unwrap().message, "stop");
    }
}
