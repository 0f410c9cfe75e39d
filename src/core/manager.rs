use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{error, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::broadcast::broadcaster::Broadcaster;
use crate::broadcast::delivery::DeliveredBroadcast;
use crate::broadcast::{protocol_id, ProtocolId, ProtocolResponse, RbMsg};
use crate::config::BroadcastConfig;
use crate::core::shutdown::Shutdown;
use crate::core::{RbcCommand, RbcError};
use crate::network::{NetReceiver, Transport};
use crate::peer::PeerId;

/// The single task that owns all round state.
///
/// Inbound network messages and locally initiated broadcasts go through one
/// serialized loop, so tallies and stages never race. Messages for different
/// rounds are independent; messages for the same round are applied in receipt
/// order.
pub struct RbcManager {
    peer_id: PeerId,
    broadcast_config: BroadcastConfig,
    broadcaster: Broadcaster,

    /// Inbound protocol messages from the transport.
    from_network: NetReceiver,
    /// Requests from local `RbcHandle`s.
    commands: mpsc::Receiver<RbcCommand>,
    /// Outbound side of the transport collaborator.
    transport: Arc<dyn Transport>,
    /// Fan-out of accepted payloads to local subscribers.
    delivered: DeliveredBroadcast,

    /// Callers waiting for their own round to be accepted, by round id.
    ///
    /// An entry stays until its round retires, even when the caller has
    /// stopped waiting; a round that never reaches accept keeps its entry,
    /// the protocol itself has no deadline.
    completion_listeners: HashMap<ProtocolId, oneshot::Sender<Result<(), RbcError>>>,
    /// Every INIT needs a fresh protocol id; incremented per broadcast.
    protocol_counter: u64,

    shutdown: Shutdown,
}

/// Cloneable interface to a running `RbcManager`.
#[derive(Clone)]
pub struct RbcHandle {
    command_tx: mpsc::Sender<RbcCommand>,
    delivered: DeliveredBroadcast,
}

impl RbcHandle {
    /// Broadcasts a payload to the peer group and waits until this node has
    /// accepted it.
    ///
    /// Returns immediately with an error if the initial INIT cannot be
    /// handed to the transport. Otherwise the call waits without a deadline,
    /// mirroring the protocol's own lack of one; see
    /// [`broadcast_with_timeout`](Self::broadcast_with_timeout) for a
    /// bounded wait. Dropping the returned future abandons only the wait,
    /// the round itself keeps running for the benefit of the other peers.
    pub async fn broadcast(&self, payload: Bytes) -> Result<(), RbcError> {
        let (done_tx, done_rcv) = oneshot::channel();
        self.command_tx
            .send(RbcCommand::StartBroadcast {
                payload,
                done: done_tx,
            })
            .await
            .map_err(|_| RbcError::ManagerStopped)?;
        done_rcv.await.map_err(|_| RbcError::ManagerStopped)?
    }

    /// Like [`broadcast`](Self::broadcast) but fails with
    /// [`RbcError::Timeout`] if the round is not accepted within `deadline`.
    pub async fn broadcast_with_timeout(
        &self,
        payload: Bytes,
        deadline: Duration,
    ) -> Result<(), RbcError> {
        tokio::time::timeout(deadline, self.broadcast(payload))
            .await
            .map_err(|_| RbcError::Timeout)?
    }

    /// Subscribes to every payload this node accepts, own broadcasts
    /// included. Each subscriber sees each payload at most once.
    pub fn subscribe_delivered(&self) -> broadcast::Receiver<Bytes> {
        self.delivered.subscribe()
    }
}

impl RbcManager {
    pub(crate) fn new(
        peer_id: PeerId,
        broadcast_config: BroadcastConfig,
        broadcaster: Broadcaster,
        from_network: NetReceiver,
        commands: mpsc::Receiver<RbcCommand>,
        transport: Arc<dyn Transport>,
        delivered: DeliveredBroadcast,
        shutdown: Shutdown,
    ) -> RbcManager {
        RbcManager {
            peer_id,
            broadcast_config,
            broadcaster,
            from_network,
            commands,
            transport,
            delivered,
            completion_listeners: HashMap::new(),
            protocol_counter: 0,
            shutdown,
        }
    }

    /// Main loop. Sole mutator of round state.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Starting reliable broadcast manager for {}", self.peer_id);
        loop {
            tokio::select! {
                Some(rb_msg) = self.from_network.protocol_msg_receiver.recv() => {
                    self.process_network_message(rb_msg);
                }
                Some(command) = self.commands.recv() => {
                    self.process_command(command).await;
                }
                _ = self.shutdown.shutdown_signal_rcv.recv() => {
                    info!("Shutting down reliable broadcast manager");
                    break;
                }
                else => {
                    info!("All channels closed, stopping reliable broadcast manager");
                    break;
                }
            }
        }
        Ok(())
    }

    fn process_network_message(&mut self, rb_msg: RbMsg) {
        self.broadcaster.update_group_size(self.transport.peer_count());

        let protocol_id = rb_msg.protocol_id.clone();
        let response = self.broadcaster.handle(rb_msg);
        self.dispatch(&protocol_id, response);
    }

    async fn process_command(&mut self, command: RbcCommand) {
        match command {
            RbcCommand::StartBroadcast { payload, done } => {
                self.start_broadcast(payload, done).await;
            }
        }
    }

    async fn start_broadcast(
        &mut self,
        payload: Bytes,
        done: oneshot::Sender<Result<(), RbcError>>,
    ) {
        if payload.len() > self.broadcast_config.payload_max_bytes {
            let err = RbcError::InvalidConfiguration(format!(
                "payload of {} bytes exceeds the configured bound of {}",
                payload.len(),
                self.broadcast_config.payload_max_bytes
            ));
            let _ = done.send(Err(err));
            return;
        }

        self.broadcaster.update_group_size(self.transport.peer_count());

        let protocol_id = protocol_id(&self.peer_id, self.protocol_counter);
        self.protocol_counter += 1;

        //register the listener before anything is sent, so delivery can
        //never race past it
        self.completion_listeners.insert(protocol_id.clone(), done);

        let (init, response) = self.broadcaster.new_broadcast(protocol_id.clone(), payload);

        //the initial INIT is the one send whose failure the caller must see
        if let Err(err) = self.transport.send(init).await {
            error!("Failed sending INIT for round {protocol_id}: {err:?}");
            if let Some(done) = self.completion_listeners.remove(&protocol_id) {
                let _ = done.send(Err(RbcError::Transport(err)));
            }
            return;
        }
        info!("Broadcast INIT sent for round {protocol_id}");

        self.dispatch(&protocol_id, response);
    }

    fn dispatch(&mut self, protocol_id: &ProtocolId, response: ProtocolResponse) {
        for reply in response.protocol_replies {
            //best effort: a stalled or failed send to the group must not
            //stop processing of unrelated rounds
            let transport = self.transport.clone();
            let id = protocol_id.clone();
            tokio::spawn(async move {
                if let Err(err) = transport.send(reply).await {
                    warn!("Failed sending protocol message for round {id}: {err:?}");
                }
            });
        }

        if let Some(payload) = response.delivered {
            self.delivered.send(payload);
            if let Some(done) = self.completion_listeners.remove(protocol_id) {
                //the waiting caller may have given up already
                let _ = done.send(Ok(()));
            }
        }
    }

    pub(crate) fn handle(command_tx: mpsc::Sender<RbcCommand>, delivered: DeliveredBroadcast) -> RbcHandle {
        RbcHandle {
            command_tx,
            delivered,
        }
    }
}
