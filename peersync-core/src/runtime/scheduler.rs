//! Tokio-backed timers for a driven session

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::driver::DriverCommand;
use crate::session::{DeferredTask, Scheduler};

/// Shortest accepted sync check period
const MIN_SYNC_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Posts timer firings back into the driver's queue
pub struct TokioScheduler {
    runtime: Handle,
    commands: mpsc::UnboundedSender<DriverCommand>,
    /// Handle for cancelling the sync check loop
    sync_check_cancel: Option<oneshot::Sender<()>>,
    /// Deferred tasks that may still be sleeping
    deferred: Vec<JoinHandle<()>>,
}

impl TokioScheduler {
    pub(super) fn new(runtime: Handle, commands: mpsc::UnboundedSender<DriverCommand>) -> Self {
        Self {
            runtime,
            commands,
            sync_check_cancel: None,
            deferred: Vec::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn start_sync_checks(&mut self, every: Duration) {
        // Stop any existing loop first
        self.stop_sync_checks();

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.sync_check_cancel = Some(cancel_tx);

        let commands = self.commands.clone();
        let every = every.max(MIN_SYNC_CHECK_INTERVAL);

        self.runtime.spawn(async move {
            debug!("Sync check loop started ({:?})", every);
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!("Sync check loop cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if commands.send(DriverCommand::SyncCheckTick).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn stop_sync_checks(&mut self) {
        if let Some(tx) = self.sync_check_cancel.take() {
            let _ = tx.send(());
        }
    }

    fn defer(&mut self, delay: Duration, task: DeferredTask) {
        self.deferred.retain(|handle| !handle.is_finished());

        let commands = self.commands.clone();
        self.deferred.push(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(DriverCommand::Deferred(task));
        }));
    }

    fn cancel_deferred(&mut self) {
        let pending = self.deferred.len();
        for handle in self.deferred.drain(..) {
            handle.abort();
        }
        if pending > 0 {
            debug!("Cancelled {} deferred task(s)", pending);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.stop_sync_checks();
        self.cancel_deferred();
    }
}
