//! External control of a running engine
//!
//! The daemon translates OS signals into calls on an [`EngineHandle`]; the
//! engine owns the matching [`EngineControl`] and polls it at its
//! suspension points.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Requests queued beyond this are coalesced
const RELOAD_CHANNEL_CAPACITY: usize = 1;

/// Create a connected handle/control pair
pub fn control_channel() -> (EngineHandle, EngineControl) {
    let shutdown = CancellationToken::new();
    let (reload_tx, reload_rx) = mpsc::channel(RELOAD_CHANNEL_CAPACITY);

    (
        EngineHandle {
            shutdown: shutdown.clone(),
            reload_tx,
        },
        EngineControl {
            shutdown,
            reload_rx,
        },
    )
}

/// Sending side, cheap to clone
#[derive(Debug, Clone)]
pub struct EngineHandle {
    shutdown: CancellationToken,
    reload_tx: mpsc::Sender<()>,
}

impl EngineHandle {
    /// Ask the engine to stop at its next suspension point
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Ask the engine to re-read its configuration
    ///
    /// Returns `false` if the engine is gone. A request made while another
    /// one is still pending is merged into it.
    pub fn reload(&self) -> bool {
        match self.reload_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Receiving side, owned by the engine
#[derive(Debug)]
pub struct EngineControl {
    pub(crate) shutdown: CancellationToken,
    pub(crate) reload_rx: mpsc::Receiver<()>,
}

impl EngineControl {
    /// Consume every pending reload request, reporting whether there was any
    pub(crate) fn take_reload(&mut self) -> bool {
        let mut requested = false;
        while self.reload_rx.try_recv().is_ok() {
            requested = true;
        }
        requested
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
