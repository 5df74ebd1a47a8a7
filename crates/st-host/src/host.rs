//! Host lifecycle: connect, handshake, tick loop, shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use st_core::config::LaunchConfig;
use st_core::{is_process_alive, DuplexPipe, POLL_INVALID};
use st_protocol::{RemoteError, RemoteErrorKind, Value, READY_BYTE, START_BYTE};

use crate::dispatch::Dispatcher;
use crate::error::HostError;
use crate::input::InputEvent;
use crate::render::Surface;
use crate::terminal::Terminal;

/// Poll interval while waiting for the start byte
const START_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Exit code recorded when the host is interrupted
pub const EXIT_INTERRUPTED: i64 = -1;

/// Stops a running host from another thread or a signal handler
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The owning side of one remote window
pub struct Host {
    config: LaunchConfig,
    terminal: Terminal,
    dispatcher: Dispatcher,
    surface: Box<dyn Surface + Send>,
    interrupted: Arc<AtomicBool>,
    tick_interval: Duration,
}

impl Host {
    /// Open both channels and announce readiness to the controller
    pub fn connect(config: LaunchConfig, surface: Box<dyn Surface + Send>) -> Result<Self, HostError> {
        let terminal_pipe = DuplexPipe::open(&config.terminal)?;
        let widget_pipe = DuplexPipe::open(&config.widgets)?;
        terminal_pipe.write(&[READY_BYTE])?;

        tracing::info!(
            parent = config.parent_pid,
            width = config.width,
            height = config.height,
            tps = config.tps,
            "host connected"
        );

        Ok(Self {
            terminal: Terminal::new(config.width, config.height, config.tps),
            dispatcher: Dispatcher::new(terminal_pipe, widget_pipe),
            surface,
            interrupted: Arc::new(AtomicBool::new(false)),
            tick_interval: Duration::from_secs(1) / config.tps.max(1),
            config,
        })
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupted))
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    /// Block until the controller sends the start byte.
    ///
    /// Fails if the controller exits first or sends anything else.
    pub fn await_start(&self) -> Result<(), HostError> {
        let pipe = self.dispatcher.terminal_pipe();
        let parent = self.config.parent_pid;

        loop {
            match pipe.poll()? {
                POLL_INVALID => return Err(HostError::ParentGone(parent)),
                0 => {}
                _ => {
                    let byte = pipe.read(1)?.first().copied().unwrap_or_default();
                    if byte != START_BYTE {
                        return Err(HostError::BadStartByte(byte));
                    }
                    tracing::info!("start byte received");
                    return Ok(());
                }
            }

            if !is_process_alive(parent) {
                return Err(HostError::ParentGone(parent));
            }
            thread::sleep(START_POLL_INTERVAL);
        }
    }

    /// Run the tick loop until the terminal ends, then send the termination
    /// notice and close both channels. Returns the exit code.
    pub fn run(&mut self) -> Result<i64, HostError> {
        let outcome = self.tick_loop();

        let reason = match &outcome {
            Ok(()) => self.terminal.exit_reason().cloned(),
            Err(e) => Some(RemoteError::execution(e.to_string())),
        };
        if let Err(e) = self.dispatcher.shutdown(reason) {
            tracing::debug!(error = %e, "termination notice not delivered");
        }

        outcome?;
        let code = self.terminal.exit_code().unwrap_or(0);
        tracing::info!(code, "host finished");
        Ok(code)
    }

    fn tick_loop(&mut self) -> Result<(), HostError> {
        let mut next_tick = Instant::now();

        while !self.terminal.should_exit() {
            self.read_input()?;
            if self.interrupted.swap(false, Ordering::SeqCst) {
                self.terminal.set_exit_code(EXIT_INTERRUPTED);
                self.terminal.request_exit(Some(RemoteError::new(
                    RemoteErrorKind::Interrupted,
                    "host interrupted",
                )));
                break;
            }

            self.terminal.advance();
            let tick = Value::Int(self.terminal.current_tick() as i64);
            if let Some(callback) = self.config.before_draw {
                self.terminal.notify(callback, tick.clone());
            }

            match self.dispatcher.pump(&mut self.terminal) {
                Ok(_) => {}
                Err(e) if e.is_disconnect() => {
                    tracing::warn!(error = %e, "controller disconnected");
                    self.terminal
                        .request_exit(Some(RemoteError::connection_aborted(e.to_string())));
                    break;
                }
                Err(e) => return Err(e.into()),
            }
            if self.terminal.should_exit() {
                break;
            }

            self.surface.draw(&self.terminal)?;
            if let Some(callback) = self.config.after_draw {
                self.terminal.notify(callback, tick);
            }

            next_tick += self.tick_interval;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }

        Ok(())
    }

    /// Feed pending console input to the terminal; Ctrl-C interrupts
    fn read_input(&mut self) -> Result<(), HostError> {
        for event in self.surface.poll_input()? {
            match event {
                InputEvent::Interrupt => self.interrupted.store(true, Ordering::SeqCst),
                event => self.terminal.feed(event),
            }
        }
        Ok(())
    }
}
