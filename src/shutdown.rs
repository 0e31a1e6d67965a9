//! SIGINT/SIGTERM handling.
//!
//! The control loop is synchronous, so the signals are awaited on a small
//! current-thread tokio runtime in a side thread that flips a shared flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

use log::info;
use tokio::signal::unix::{SignalKind, signal};

use crate::error::{Result, TurretError};

/// Install handlers and return the flag they set.
///
/// Both handlers are registered before this returns, so a signal arriving
/// right after startup is not lost.
pub fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    let (ready_tx, ready_rx) = mpsc::channel::<std::io::Result<()>>();

    thread::Builder::new()
        .name("shutdown-signal".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let handlers = signal(SignalKind::interrupt())
                    .and_then(|int| signal(SignalKind::terminate()).map(|term| (int, term)));
                let (mut interrupt, mut terminate) = match handlers {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                tokio::select! {
                    _ = interrupt.recv() => {
                        info!("Received Ctrl+C, shutting down...");
                    },
                    _ = terminate.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    },
                }
                flag.store(true, Ordering::SeqCst);
            });
        })?;

    ready_rx
        .recv()
        .map_err(|_| TurretError::Signal("signal thread exited early".to_string()))?
        .map_err(|e| TurretError::Signal(format!("failed to install signal handler: {e}")))?;

    Ok(stop)
}
