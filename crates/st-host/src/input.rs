//! Keyboard and mouse input from the host console
//!
//! Console events are translated into [`InputEvent`]s once per tick and fed
//! to the [`Terminal`](crate::Terminal): keys land in its key queues, mouse
//! events update the mouse state and a left press activates the topmost
//! widget under the pointer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use st_core::sync::lock;
use st_protocol::key;

/// One input event read from the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(i64),
    Mouse { x: u16, y: u16, action: MouseAction },
    /// Ctrl-C while the console is in raw mode
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press(Button),
    Release(Button),
    Move,
    ScrollUp,
    ScrollDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Middle,
    Right,
}

impl Button {
    /// Bit in [`MouseState::buttons`]
    pub fn bit(self) -> u8 {
        match self {
            Button::Left => 1,
            Button::Middle => 2,
            Button::Right => 4,
        }
    }
}

/// Last known pointer position and pressed buttons
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MouseState {
    pub x: u16,
    pub y: u16,
    pub buttons: u8,
    /// Wheel movement of the last event: -1 up, 1 down, 0 none
    pub scroll: i8,
}

impl MouseState {
    pub fn pressed(&self, button: Button) -> bool {
        self.buttons & button.bit() != 0
    }
}

/// Translate a console event; `None` for events the terminal ignores
pub fn translate(event: Event) -> Option<InputEvent> {
    match event {
        Event::Key(event) => translate_key(event),
        Event::Mouse(event) => translate_mouse(event),
        _ => None,
    }
}

fn translate_key(event: KeyEvent) -> Option<InputEvent> {
    if event.kind == KeyEventKind::Release {
        return None;
    }

    let code = match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(InputEvent::Interrupt)
        }
        KeyCode::Char(c) if event.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() => {
            i64::from(c.to_ascii_lowercase() as u8 - b'a' + 1)
        }
        KeyCode::Char(c) => i64::from(u32::from(c)),
        KeyCode::Enter => key::ENTER,
        KeyCode::Tab => key::TAB,
        KeyCode::BackTab => key::BACK_TAB,
        KeyCode::Backspace => key::BACKSPACE,
        KeyCode::Esc => key::ESCAPE,
        KeyCode::Up => key::UP,
        KeyCode::Down => key::DOWN,
        KeyCode::Left => key::LEFT,
        KeyCode::Right => key::RIGHT,
        KeyCode::Home => key::HOME,
        KeyCode::End => key::END,
        KeyCode::PageUp => key::PAGE_UP,
        KeyCode::PageDown => key::PAGE_DOWN,
        KeyCode::Delete => key::DELETE,
        KeyCode::Insert => key::INSERT,
        KeyCode::F(n) => key::function(n),
        _ => return None,
    };
    Some(InputEvent::Key(code))
}

fn translate_mouse(event: MouseEvent) -> Option<InputEvent> {
    let action = match event.kind {
        MouseEventKind::Down(button) => MouseAction::Press(button.into()),
        MouseEventKind::Up(button) => MouseAction::Release(button.into()),
        MouseEventKind::Drag(_) | MouseEventKind::Moved => MouseAction::Move,
        MouseEventKind::ScrollUp => MouseAction::ScrollUp,
        MouseEventKind::ScrollDown => MouseAction::ScrollDown,
        _ => return None,
    };
    Some(InputEvent::Mouse {
        x: event.column,
        y: event.row,
        action,
    })
}

impl From<MouseButton> for Button {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => Button::Left,
            MouseButton::Middle => Button::Middle,
            MouseButton::Right => Button::Right,
        }
    }
}

/// Shared queue of events for a surface without a console
#[derive(Debug, Clone, Default)]
pub struct InputFeed(Arc<Mutex<VecDeque<InputEvent>>>);

impl InputFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` on the next tick
    pub fn push(&self, event: InputEvent) {
        lock(&self.0).push_back(event);
    }

    pub fn drain(&self) -> Vec<InputEvent> {
        lock(&self.0).drain(..).collect()
    }
}
