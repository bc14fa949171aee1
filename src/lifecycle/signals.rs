//! Lifecycle signal distribution.
//!
//! # Responsibilities
//! - Register OS signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Fan events out to every subscriber
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers a reload, not shutdown
//! - The hub is a broadcast channel, so tests inject signals with `send`
//!   instead of raising real ones

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// An event that changes the lifecycle of the running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// Stop and exit.
    Terminate,
    /// Stop, re-read configuration, start again.
    Reload,
}

/// Fan-out point for lifecycle signals.
#[derive(Debug, Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<LifecycleSignal>,
}

impl SignalHub {
    /// A hub with no OS handlers attached.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// A hub fed by SIGTERM, SIGINT (terminate) and SIGHUP (reload).
    pub fn install_os() -> std::io::Result<Self> {
        let hub = Self::new();
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut hangup = signal(SignalKind::hangup())?;

        let tx = hub.tx.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(()) = terminate.recv() => {
                        tracing::info!("received SIGTERM");
                        LifecycleSignal::Terminate
                    }
                    Some(()) = interrupt.recv() => {
                        tracing::info!("received SIGINT");
                        LifecycleSignal::Terminate
                    }
                    Some(()) = hangup.recv() => {
                        tracing::info!("received SIGHUP");
                        LifecycleSignal::Reload
                    }
                    else => break,
                };
                if tx.send(event).is_err() {
                    tracing::warn!(signal = ?event, "No lifecycle subscriber for signal");
                }
            }
        });

        Ok(hub)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.tx.subscribe()
    }

    /// Deliver `event` to every subscriber. Returns how many received it.
    pub fn send(&self, event: LifecycleSignal) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn terminate(&self) -> usize {
        self.send(LifecycleSignal::Terminate)
    }

    pub fn reload(&self) -> usize {
        self.send(LifecycleSignal::Reload)
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_signal() {
        let hub = SignalHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        assert_eq!(hub.reload(), 2);
        assert_eq!(hub.terminate(), 2);

        assert_eq!(a.recv().await.unwrap(), LifecycleSignal::Reload);
        assert_eq!(a.recv().await.unwrap(), LifecycleSignal::Terminate);
        assert_eq!(b.recv().await.unwrap(), LifecycleSignal::Reload);
    }

    #[test]
    fn send_without_subscribers_is_not_an_error() {
        let hub = SignalHub::new();
        assert_eq!(hub.receiver_count(), 0);
        assert_eq!(hub.terminate(), 0);
    }
}
