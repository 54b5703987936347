// Recurring poll timer backed by one ticker thread.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

/// Fires every `period` until stopped. Ticks that arrive while the owner is
/// still busy with the previous one are dropped, never queued.
pub struct PollTimer {
    stop_tx: Option<Sender<()>>,
    ticks: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl PollTimer {
    pub fn start(period: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (tick_tx, ticks) = mpsc::sync_channel::<()>(1);
        let handle = thread::spawn(move || run_ticker(period, stop_rx, tick_tx));
        Self {
            stop_tx: Some(stop_tx),
            ticks,
            handle: Some(handle),
        }
    }

    /// Block until the next tick. Returns `false` once the timer is stopped.
    pub fn tick(&self) -> bool {
        self.stop_tx.is_some() && self.ticks.recv().is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }

    /// Cancel the timer. Safe to call any number of times; only the first
    /// call returns `true`.
    pub fn stop(&mut self) -> bool {
        let Some(stop_tx) = self.stop_tx.take() else {
            return false;
        };
        drop(stop_tx);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!("poll timer stopped");
        true
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_ticker(period: Duration, stop_rx: Receiver<()>, tick_tx: SyncSender<()>) {
    loop {
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => match tick_tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => return,
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
