//! Background compaction scheduler.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::compaction;
use crate::error::Error;
use crate::store::Store;

/// Runs compaction against a store on a fixed wall-clock interval.
///
/// Compaction failures never terminate the loop: each is logged, forwarded
/// on the error channel, and the next interval's attempt proceeds
/// independently. `stop` (or dropping the daemon) prevents any further run
/// from starting; an in-flight compaction is allowed to finish.
#[derive(Debug)]
pub struct CompactionDaemon {
    shutdown: Sender<()>,
    errors: Receiver<Error>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionDaemon {
    /// Spawns the daemon thread and starts the schedule.
    pub fn start(store: Arc<Store>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (error_tx, error_rx) = mpsc::channel();

        let handle = thread::spawn(move || run(store, interval, shutdown_rx, error_tx));

        Self {
            shutdown: shutdown_tx,
            errors: error_rx,
            handle: Some(handle),
        }
    }

    /// Channel carrying errors from failed compaction runs. The host can
    /// drain it with `try_recv` at its own pace.
    pub fn errors(&self) -> &Receiver<Error> {
        &self.errors
    }

    /// Stops the schedule and waits for the daemon thread to exit.
    ///
    /// No compaction begins after this returns; a run already in flight
    /// completes first (the join waits for it).
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CompactionDaemon {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run(store: Arc<Store>, interval: Duration, shutdown: Receiver<()>, errors: Sender<Error>) {
    log::debug!("compaction daemon started, interval {:?}", interval);
    loop {
        match shutdown.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                match compaction::perform_compaction(&store, None) {
                    Ok(reclaimed) => {
                        log::debug!("background compaction reclaimed {reclaimed} bytes");
                    }
                    Err(e) => {
                        log::error!("background compaction failed: {e}");
                        // The receiver lives as long as the daemon; a send
                        // failure just means nobody is listening anymore.
                        let _ = errors.send(e);
                    }
                }
            }
        }
    }
    log::debug!("compaction daemon stopped");
}
