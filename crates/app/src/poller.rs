//! Fixed-period read loop for characteristics that do not notify.
//!
//! Reads go through the session handle like any other command, so they
//! queue behind whatever the session task is doing instead of overlapping
//! with it.

use std::time::Duration;

use gattbridge_domain::error::GattBridgeError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::session::SessionHandle;

/// Default polling period.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(100);

/// A running poll loop.
pub struct Poller {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Start reading `uuid` every `period`.
    ///
    /// The first read is issued immediately. The loop ends on [`Poller::stop`]
    /// or when the session goes away.
    #[must_use]
    pub fn start(session: SessionHandle, uuid: Uuid, period: Duration) -> Self {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(run(session, uuid, period, stopped));
        Self { stop, handle }
    }

    /// Whether the loop is still going.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "poller task failed");
        }
    }
}

async fn run(
    session: SessionHandle,
    uuid: Uuid,
    period: Duration,
    mut stopped: oneshot::Receiver<()>,
) {
    tracing::info!(%uuid, period_ms = period.as_millis(), "poller started");
    let mut interval = tokio::time::interval(period);
    // a slow read pushes the schedule back instead of bursting to catch up
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = interval.tick() => {
                match session.read(uuid).await {
                    Ok(()) => {}
                    Err(GattBridgeError::SessionClosed) => {
                        tracing::debug!("session closed, poller exiting");
                        break;
                    }
                    Err(err) => tracing::debug!(%uuid, error = %err, "poll read rejected"),
                }
            }
        }
    }
    tracing::info!(%uuid, "poller stopped");
}
