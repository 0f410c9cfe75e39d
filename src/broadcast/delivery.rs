use bytes::Bytes;
use log::{debug, trace};
use tokio::sync::broadcast;

/// Fan-out of payloads this node has accepted, for forwarding to other local
/// subsystems.
///
/// Every open subscriber receives every delivered payload at most once.
/// Publishing never blocks: a closed subscriber is simply gone, and a slow
/// subscriber that lags behind the channel capacity loses the oldest
/// payloads.
#[derive(Clone)]
pub struct DeliveredBroadcast {
    delivered_tx: broadcast::Sender<Bytes>,
}

impl DeliveredBroadcast {
    pub(crate) fn new(buffer: usize) -> DeliveredBroadcast {
        let (delivered_tx, _) = broadcast::channel(buffer);
        DeliveredBroadcast { delivered_tx }
    }

    pub(crate) fn send(&self, payload: Bytes) {
        trace!("Forwarding accepted payload to {} subscribers", self.delivered_tx.receiver_count());
        //send only fails when nobody is subscribed, which is fine
        if self.delivered_tx.send(payload).is_err() {
            debug!("No subscribers for accepted payload, dropping");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.delivered_tx.subscribe()
    }
}
