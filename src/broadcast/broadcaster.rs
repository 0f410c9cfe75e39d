use bytes::Bytes;
use log::{debug, info, trace, warn};

use crate::broadcast::quorum::{BrachaQuorum, Decision};
use crate::broadcast::round::RoundStore;
use crate::broadcast::{ProtocolId, ProtocolResponse, RbMsg, Stage};
use crate::peer::PeerId;

/// The round dispatcher state machine.
///
/// Owns all round state. Must only ever be driven from a single task: the
/// manager funnels both inbound network messages and locally initiated
/// broadcasts through one queue, which is what keeps the tallies consistent
/// without locks.
pub(crate) struct Broadcaster {
    store: RoundStore,
    peer_id: PeerId,
    group_size: usize,
}

impl Broadcaster {
    pub(crate) fn new(peer_id: PeerId, group_size: usize) -> Broadcaster {
        Broadcaster {
            store: RoundStore::new(),
            peer_id,
            group_size,
        }
    }

    /// Group size snapshot used for rounds created from now on; in-flight
    /// rounds keep the parameters they were created with.
    pub(crate) fn update_group_size(&mut self, size: usize) {
        if size != self.group_size {
            info!("Broadcast group size changed: {} -> {}", self.group_size, size);
            self.group_size = size;
        }
    }

    /// Starts a round for a payload this node initiates.
    ///
    /// Returns the INIT message for the peer group plus the response produced
    /// by observing our own INIT (normally an ECHO announcement).
    pub(crate) fn new_broadcast(
        &mut self,
        protocol_id: ProtocolId,
        payload: Bytes,
    ) -> (RbMsg, ProtocolResponse) {
        debug!("Starting protocol for new round {protocol_id}");

        let quorum = BrachaQuorum::new(self.group_size);
        let round = self.store.get_or_create(&protocol_id, &payload, quorum);

        //drive the round exactly as if our INIT had been received from self
        let local_id = self.peer_id.clone();
        round.record_peer_stage(&local_id, Stage::Init);
        let decision = round.quorum().decide(round);

        let init = RbMsg::new(protocol_id.clone(), local_id, Stage::Init, payload);
        let response = self.apply(&protocol_id, decision);
        (init, response)
    }

    /// Processes one inbound protocol message.
    ///
    /// Malformed or regressive reports from peers are logged and dropped,
    /// never fatal; tolerating them is the point of the protocol.
    pub(crate) fn handle(&mut self, rb_msg: RbMsg) -> ProtocolResponse {
        if self.store.is_terminal(&rb_msg.protocol_id) {
            trace!(
                "Discarding {:?} for finished round {}",
                rb_msg.stage,
                rb_msg.protocol_id
            );
            return ProtocolResponse::dropped();
        }

        if self.store.get_mut(&rb_msg.protocol_id).is_none() {
            debug!("New message round {}", rb_msg.protocol_id);
        }
        let quorum = BrachaQuorum::new(self.group_size);
        let round = self
            .store
            .get_or_create(&rb_msg.protocol_id, &rb_msg.payload, quorum);

        if !round.record_peer_stage(&rb_msg.sender, rb_msg.stage) {
            warn!(
                "Stale or duplicate {:?} report from {} for round {}",
                rb_msg.stage, rb_msg.sender, rb_msg.protocol_id
            );
            return ProtocolResponse::dropped();
        }
        trace!("Round after {:?} from {}: {}", rb_msg.stage, rb_msg.sender, round);

        let decision = round.quorum().decide(round);
        self.apply(&rb_msg.protocol_id, decision)
    }

    fn apply(&mut self, protocol_id: &ProtocolId, mut decision: Decision) -> ProtocolResponse {
        let mut response = ProtocolResponse::default();
        loop {
            let Some(round) = self.store.get_mut(protocol_id) else {
                return response;
            };

            let announced = decision.broadcast.is_some();
            if let Some(stage) = decision.broadcast {
                response.protocol_replies.push(RbMsg::new(
                    protocol_id.clone(),
                    self.peer_id.clone(),
                    stage,
                    round.payload().clone(),
                ));
                //count our own announcement here; the transport filters
                //self-sent messages, so it never arrives back over the wire
                let local_id = self.peer_id.clone();
                round.record_peer_stage(&local_id, stage);
            }

            if let Some(next_stage) = decision.next_stage {
                round.advance(next_stage);
            }

            if decision.deliver {
                info!("Round {protocol_id} accepted");
                response.delivered = Some(round.payload().clone());
                self.store.retire(protocol_id);
                return response;
            }

            //our own announcement was a tally update, so the engine runs
            //again; without it the round could stall one vote short of a
            //threshold with no further inbound messages due
            if !announced {
                return response;
            }
            decision = round.quorum().decide(round);
        }
    }
}
