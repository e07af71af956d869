use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

/// Everything observable that the subsystems emit. Delivery is lossy:
/// a lagging subscriber loses the oldest events, never blocks a producer.
#[derive(Debug, Clone)]
pub enum Event {
    TradeExecuted {
        mint: String,
        action: String,
        mode: String,
        success: bool,
        wallets_ok: usize,
        wallets_failed: usize,
        total_sol_in: f64,
    },
    TradeDetected {
        target: String,
        mint: String,
        action: String,
        sol_amount: f64,
    },
    TradeCopied {
        target: String,
        mint: String,
        action: String,
        sol_amount: f64,
        success: bool,
    },
    MirrorSkipped {
        target: String,
        signature: String,
        reason: String,
    },
    StopLossTriggered {
        mint: String,
        price: f64,
    },
    TakeProfitTriggered {
        mint: String,
        price: f64,
    },
    DcaExecuted {
        id: String,
        mint: String,
        completed: u32,
        total: u32,
    },
    DcaCompleted {
        id: String,
        mint: String,
    },
    DcaError {
        id: String,
        mint: String,
        error: String,
    },
    BalancesRefreshed {
        wallets: usize,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish never fails; with no subscribers the event is dropped.
    pub fn publish(&self, event: Event) {
        debug!("event: {:?}", event);
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(Event::BalancesRefreshed { wallets: 3 });

        match rx.recv().await.unwrap() {
            Event::BalancesRefreshed { wallets } => assert_eq!(wallets, 3),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(Event::BalancesRefreshed { wallets: 1 });
    }
}
