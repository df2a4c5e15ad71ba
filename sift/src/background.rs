//! Periodic background activities
//!
//! Each activity owns one repeating timer and one stop signal. Stopping
//! sends an acknowledgement channel to the task; the task finishes the
//! iteration it is running, answers on that channel and exits.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

type StopSignal = oneshot::Sender<oneshot::Sender<()>>;

/// Handle to a spawned periodic activity
pub(crate) struct BackgroundTask {
    name: &'static str,
    stop_tx: Option<StopSignal>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `tick` every `interval`, first firing one interval from now.
    ///
    /// The task holds only a weak reference to its target and exits on its
    /// own once the target is gone.
    pub(crate) fn spawn<T, F, Fut>(
        name: &'static str,
        interval: Duration,
        target: Weak<T>,
        tick: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<oneshot::Sender<()>>();

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("{} started with {}ms interval", name, interval.as_millis());

            loop {
                tokio::select! {
                    ack = &mut stop_rx => {
                        if let Ok(ack) = ack {
                            let _ = ack.send(());
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        // Runs to completion; a stop request waits for it
                        tick(target).await;
                    }
                }
            }

            info!("{} stopped", name);
        });

        Self {
            name,
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Ask the task to stop and wait for its acknowledgement
    pub(crate) async fn stop(mut self) -> bool {
        let mut acknowledged = false;
        if let Some(stop_tx) = self.stop_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if stop_tx.send(ack_tx).is_ok() {
                acknowledged = ack_rx.await.is_ok();
            }
        }
        let _ = (&mut self.handle).await;
        debug!(task = self.name, acknowledged, "Background task stopped");
        acknowledged
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        // Dropping the stop sender also ends the loop; abort covers a tick in flight
        if self.stop_tx.is_some() {
            self.handle.abort();
        }
    }
}
