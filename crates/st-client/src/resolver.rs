//! Background thread that settles promises as responses arrive

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use st_protocol::RemoteError;

use crate::link::{Flow, Link};

/// How often an idle resolver checks that the host is still alive
const LIVENESS_INTERVAL: Duration = Duration::from_millis(50);

/// Poll both channels until the host ends, the connection drops or the
/// stop flag is raised
pub(crate) fn run(link: Arc<Link>, poll_interval: Duration) {
    tracing::debug!("resolver started");
    let mut last_check = Instant::now();

    while !link.stop.load(Ordering::Acquire) {
        match link.poll_once() {
            Ok(Flow::Stop) => break,
            Ok(Flow::Busy) => continue,
            Ok(Flow::Idle) => {}
            Err(e) => {
                tracing::warn!(error = %e, "connection to host lost");
                link.disconnect(RemoteError::connection_aborted(e.to_string()));
                break;
            }
        }

        if last_check.elapsed() >= LIVENESS_INTERVAL {
            last_check = Instant::now();
            if let Some(code) = link.exited() {
                // The notice may have landed just before the exit
                if matches!(link.poll_once(), Ok(Flow::Stop)) {
                    break;
                }
                tracing::warn!(code, "host exited without a termination notice");
                link.disconnect(RemoteError::connection_aborted(format!(
                    "host exited with code {}",
                    code
                )));
                break;
            }
        }

        thread::sleep(poll_interval);
    }

    tracing::debug!("resolver stopped");
}
