//! Drawing the terminal to the host console

use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{
    self as console, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute, queue, style};

use crate::input::{self, InputEvent, InputFeed};
use crate::terminal::Terminal;

/// Something a host can draw frames on
pub trait Surface {
    /// Draw one frame
    fn draw(&mut self, terminal: &Terminal) -> io::Result<()>;

    /// Input events that arrived since the last call, without blocking
    fn poll_input(&mut self) -> io::Result<Vec<InputEvent>> {
        Ok(Vec::new())
    }
}

/// Discards every frame; for headless hosts and tests.
///
/// Input comes from an [`InputFeed`] instead of a console.
#[derive(Debug, Default)]
pub struct NullSurface {
    frames: u64,
    input: InputFeed,
}

impl NullSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface whose input is whatever gets pushed on `input`
    pub fn with_input(input: InputFeed) -> Self {
        Self { frames: 0, input }
    }

    /// Frames drawn so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Surface for NullSurface {
    fn draw(&mut self, _terminal: &Terminal) -> io::Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn poll_input(&mut self) -> io::Result<Vec<InputEvent>> {
        Ok(self.input.drain())
    }
}

/// Draws on the process console through crossterm.
///
/// Switches to the alternate screen in raw mode with mouse capture on
/// creation and restores the console when dropped. Only rows that changed since the last frame are rewritten.
pub struct CrosstermSurface {
    out: Stdout,
    last: Vec<String>,
}

impl CrosstermSurface {
    pub fn new() -> io::Result<Self> {
        let mut out = io::stdout();
        console::enable_raw_mode()?;
        execute!(
            out,
            EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide,
            Clear(ClearType::All)
        )?;
        Ok(Self {
            out,
            last: Vec::new(),
        })
    }
}

impl Surface for CrosstermSurface {
    fn draw(&mut self, terminal: &Terminal) -> io::Result<()> {
        let lines = terminal.compose();
        if lines.len() != self.last.len() {
            queue!(self.out, Clear(ClearType::All))?;
            self.last.clear();
        }

        for (row, line) in lines.iter().enumerate() {
            if self.last.get(row) == Some(line) {
                continue;
            }
            let row = u16::try_from(row).unwrap_or(u16::MAX);
            queue!(self.out, cursor::MoveTo(0, row), style::Print(line))?;
        }

        self.out.flush()?;
        self.last = lines;
        Ok(())
    }

    fn poll_input(&mut self) -> io::Result<Vec<InputEvent>> {
        let mut events = Vec::new();
        while event::poll(Duration::ZERO)? {
            if let Some(event) = input::translate(event::read()?) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        if let Err(e) = execute!(
            self.out,
            cursor::Show,
            DisableMouseCapture,
            LeaveAlternateScreen
        ) {
            tracing::warn!(error = %e, "failed to restore console");
        }
        if let Err(e) = console::disable_raw_mode() {
            tracing::warn!(error = %e, "failed to leave raw mode");
        }
    }
}
