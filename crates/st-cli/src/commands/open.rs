//! Open a remote window, put a button in it and wait for the click

use std::sync::{mpsc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::output::{format_value, print_info, print_success, print_warning};
use st_client::{Promise, WindowBuilder, WindowConfig};
use st_core::sync::lock;

/// What `subterm open` shows and how long it waits
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub text: String,
    pub button: String,
    pub timeout: Duration,
    /// Activate the button from here after this many ticks
    pub click_after: Option<u64>,
}

/// Label plus one cell of padding on each side
fn button_width(label: &str) -> Result<u16> {
    u16::try_from(label.chars().count())
        .ok()
        .and_then(|w| w.checked_add(2))
        .with_context(|| format!("Button label too long ({} chars)", label.chars().count()))
}

pub fn open_command(config: WindowConfig, options: OpenOptions) -> Result<()> {
    let window = WindowBuilder::new(config)
        .spawn()
        .context("Failed to open remote window")?;
    tracing::info!(pid = ?window.host_pid(), "remote window ready");

    let (clicks, clicked) = mpsc::channel();
    let clicks = Mutex::new(clicks);
    let on_click = window.register_callback(move |value| {
        let _ = lock(&clicks).send(value);
    });

    window.putstr(&options.text, Some(1), Some(1))?;
    let width = button_width(&options.button)?;
    let button = window.add_button((1, 3), (width, 1), &options.button, Some(on_click))?;
    let size = window.size()?;
    window.begin()?;

    let button = button
        .wait(Some(options.timeout))
        .context("Remote window did not create the button")?;
    let size = size.wait(Some(options.timeout))?;
    print_info(&format!(
        "Window open ({} cells), click button {} in it",
        format_value(&size),
        button.id()
    ));

    if let Some(ticks) = options.click_after {
        let target = button.clone();
        let auto = window.register_callback(move |_| {
            if let Err(e) = target.activate() {
                tracing::warn!(error = %e, "automatic click failed");
            }
        });
        window.after(ticks, auto)?;
    }

    match clicked.recv_timeout(options.timeout) {
        Ok(value) => print_success(&format!("Button clicked ({})", format_value(&value))),
        Err(_) => print_warning("No click before the timeout"),
    }

    match window.close() {
        Some(code) => print_info(&format!("Host exited with code {}", code)),
        None => print_warning("Host exit code unknown"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_width_pads_label() {
        assert_eq!(button_width("OK").unwrap(), 4);
        assert_eq!(button_width("").unwrap(), 2);
    }

    #[test]
    fn test_button_width_rejects_overlong_label() {
        assert!(button_width(&"x".repeat(usize::from(u16::MAX) - 2)).is_ok());
        assert!(button_width(&"x".repeat(usize::from(u16::MAX) - 1)).is_err());
        assert!(button_width(&"x".repeat(70_000)).is_err());
    }
}
