//! st-host: The owning side of a subterm window
//!
//! The host runs in its own console. It holds the real [`Terminal`] and its
//! widgets, and once per render tick drains the requests its controller has
//! sent, executes them against the terminal and answers each one. Console
//! keys and mouse clicks are read on the same loop.

pub mod dispatch;
pub mod error;
pub mod host;
pub mod input;
pub mod ops;
pub mod registry;
pub mod render;
pub mod terminal;
pub mod widget;

pub use dispatch::Dispatcher;
pub use error::HostError;
pub use host::{Host, InterruptHandle};
pub use input::{Button, InputEvent, InputFeed, MouseAction, MouseState};
pub use render::{CrosstermSurface, NullSurface, Surface};
pub use terminal::Terminal;
pub use widget::{Widget, WidgetKind};
