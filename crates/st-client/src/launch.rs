//! Launching a host and waiting for it to become ready

use std::path::PathBuf;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};

use st_core::config::{LaunchConfig, WindowConfig};
use st_core::{DuplexPipe, RemoteProcess, POLL_INVALID};
use st_protocol::READY_BYTE;

use crate::error::ProxyError;

/// Name of the host executable, without platform suffix
pub const HOST_BINARY: &str = "subterm-host";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configured host binary, else the one next to the current executable,
/// else whatever `PATH` resolves
pub(crate) fn host_binary(config: &WindowConfig) -> PathBuf {
    if let Some(path) = &config.host_binary {
        return path.clone();
    }

    let name = format!("{}{}", HOST_BINARY, std::env::consts::EXE_SUFFIX);
    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)));
    match sibling {
        Some(path) if path.is_file() => path,
        _ => PathBuf::from(name),
    }
}

/// Command line that starts a host in its own console
pub(crate) fn host_command(config: &WindowConfig, launch: &LaunchConfig) -> Result<Command, ProxyError> {
    let binary = host_binary(config);
    let argument = launch.encode()?;

    let mut command = match config.launcher.split_first() {
        Some((program, prefix)) if cfg!(unix) => {
            let mut command = Command::new(program);
            command.args(prefix).arg(&binary);
            command
        }
        _ => Command::new(&binary),
    };
    command.arg(argument);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use windows_sys::Win32::System::Threading::CREATE_NEW_CONSOLE;
        command.creation_flags(CREATE_NEW_CONSOLE);
    }

    Ok(command)
}

pub(crate) fn spawn_host(config: &WindowConfig, launch: &LaunchConfig) -> Result<Child, ProxyError> {
    let mut command = host_command(config, launch)?;
    tracing::debug!(command = ?command, "launching host");
    command.spawn().map_err(ProxyError::Spawn)
}

/// Wait for the host's ready byte.
///
/// Bounded by `timeout` and by the host staying alive. A wrong byte or a
/// timeout kills the host.
pub(crate) fn await_ready(
    pipe: &DuplexPipe,
    process: &mut dyn RemoteProcess,
    timeout: Duration,
) -> Result<(), ProxyError> {
    let deadline = Instant::now() + timeout;

    loop {
        let available = pipe.poll()?;
        if available > 0 {
            let byte = pipe.read(1)?.first().copied().unwrap_or_default();
            if byte == READY_BYTE {
                tracing::debug!("host ready");
                return Ok(());
            }
            tracing::error!(byte, "unexpected handshake byte");
            kill(process);
            return Err(ProxyError::Handshake(byte));
        }

        if let Some(code) = process.try_wait().map_err(ProxyError::Spawn)? {
            return Err(ProxyError::StartupFailed {
                exit_code: Some(code),
            });
        }
        if available == POLL_INVALID {
            return Err(ProxyError::StartupFailed { exit_code: None });
        }
        if Instant::now() >= deadline {
            kill(process);
            return Err(ProxyError::HandshakeTimeout(timeout));
        }

        thread::sleep(READY_POLL_INTERVAL);
    }
}

fn kill(process: &mut dyn RemoteProcess) {
    if let Err(e) = process.kill() {
        tracing::warn!(error = %e, "failed to kill host");
    }
}
