use async_trait::async_trait;
use log::trace;
use tokio::sync::mpsc;

use crate::broadcast::RbMsg;

/// Outbound side of the transport collaborator.
///
/// The transport owns peer discovery, connections, identity and wire
/// serialization. It is also expected to filter out self-sent messages, so
/// the protocol core never sees its own announcements on the inbound stream.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Best-effort send of a protocol message to every peer in the group.
    async fn send(&self, msg: RbMsg) -> anyhow::Result<()>;

    /// Snapshot of the broadcast group size, taken at round-start time.
    fn peer_count(&self) -> usize;
}

/// Channel pair the transport feeds inbound protocol messages through.
pub struct NetworkCommunication;

impl NetworkCommunication {
    pub fn init(buffer: usize) -> (NetSender, NetReceiver) {
        let (protocol_tx, protocol_rcv) = mpsc::channel(buffer);

        let sender = NetSender::new(protocol_tx);
        let receiver = NetReceiver::new(protocol_rcv);

        (sender, receiver)
    }
}

//Receives protocol messages from the network
pub struct NetReceiver {
    pub(crate) protocol_msg_receiver: mpsc::Receiver<RbMsg>,
}

impl NetReceiver {
    pub(crate) fn new(protocol_msg_receiver: mpsc::Receiver<RbMsg>) -> Self {
        Self {
            protocol_msg_receiver,
        }
    }
}

//Sends inbound protocol messages towards the dispatcher
#[derive(Clone)]
pub struct NetSender {
    protocol_msg_tx: mpsc::Sender<RbMsg>,
}

impl NetSender {
    pub(crate) fn new(protocol_msg_tx: mpsc::Sender<RbMsg>) -> Self {
        Self { protocol_msg_tx }
    }

    pub async fn send_protocol_message(&self, msg: RbMsg) -> anyhow::Result<()> {
        trace!("Received protocol message: {msg:?}");
        self.protocol_msg_tx
            .send(msg)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }
}

/// Transport implementation over a plain channel, for wiring the core into
/// an in-process network and for tests.
pub struct ChannelTransport {
    outbound_tx: mpsc::Sender<RbMsg>,
    peer_count: usize,
}

impl ChannelTransport {
    pub fn new(outbound_tx: mpsc::Sender<RbMsg>, peer_count: usize) -> Self {
        Self {
            outbound_tx,
            peer_count,
        }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, msg: RbMsg) -> anyhow::Result<()> {
        trace!("Sending protocol message: {msg:?}");
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|e| anyhow::anyhow!(e))
    }

    fn peer_count(&self) -> usize {
        self.peer_count
    }
}
