use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::DelayRange;

/// Uniform random pause inside `range`.
pub fn pick_delay(range: DelayRange) -> Duration {
    if range.max_ms <= range.min_ms {
        return Duration::from_millis(range.min_ms);
    }
    Duration::from_millis(fastrand::u64(range.min_ms..=range.max_ms))
}

/// Raises the stop flag, usually from the Ctrl-C listener.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Checked between queries; also cuts pacing delays short.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopSignal {
    /// A signal nobody can raise.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps for `duration` unless stopped first. Returns `true` when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_stopped() {
            return true;
        }
        if duration.is_zero() {
            return false;
        }

        let mut rx = self.rx.clone();
        tokio::select! {
            _ = sleep(duration) => false,
            stopped = async {
                let result = rx.wait_for(|stop| *stop).await.map(|_| ());
                match result {
                    Ok(_) => true,
                    // Sender gone: nobody can stop us any more.
                    Err(_) => std::future::pending().await,
                }
            } => stopped,
        }
    }
}
