//! Bracha reliable broadcast.
//!
//! One node disseminates a payload to a fixed group of peers so that every
//! correct peer either delivers exactly the same payload exactly once, or
//! never delivers it, tolerating up to `t` arbitrarily faulty peers.
//!
//! A broadcast round goes through three wire stages:
//!
//! INIT:
//!      1. The initiator sends INIT with the payload to all peers.
//! ECHO:
//!      1. Upon receiving INIT, a peer sends ECHO to all peers.
//! READY:
//!      1. When a peer receives `(n+t)/2` ECHOs (or `t+1` READYs), it sends
//!         READY to all peers.
//!      2. When a peer receives `1+2t` READYs, it accepts the round and
//!         delivers the payload locally.
//!
//! Limitations:
//! - Rounds only make progress when messages arrive; there is no
//!   retransmission timer. If the group size assumption is wrong or peers are
//!   partitioned, a round can stay pending forever (callers can bound their
//!   own wait, see `core`).
//! - Different rounds are independent; there is no total order across rounds.
//! - Peer authenticity is a transport concern. ECHO/READY votes are not
//!   cross-checked against the INIT payload (no payload hash in the vote), so
//!   an equivocating initiator is not detected. This matches the behavior of
//!   the system this crate models.

use bytes::Bytes;
use serde_derive::{Deserialize, Serialize};

use crate::peer::PeerId;

pub(crate) mod broadcaster;
pub mod delivery;
pub(crate) mod quorum;
pub(crate) mod round;
mod test;

/// Unique identifier of a broadcast round, minted by the initiator as
/// `"{initiator}_{counter}"`.
pub type ProtocolId = String;

pub(crate) fn protocol_id(initiator: &PeerId, counter: u64) -> ProtocolId {
    format!("{initiator}_{counter}")
}

/// Wire stage carried by a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Init,
    Echo,
    Ready,
}

/// Local protocol progress of a round on this node.
///
/// Monotonically increasing; `Accepted` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LocalStage {
    #[default]
    None,
    Init,
    Echo,
    Ready,
    Accepted,
}

impl From<Stage> for LocalStage {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Init => LocalStage::Init,
            Stage::Echo => LocalStage::Echo,
            Stage::Ready => LocalStage::Ready,
        }
    }
}

/// A reliable broadcast protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbMsg {
    /// Id of the round this message belongs to. Stays the same throughout
    /// the protocol.
    pub protocol_id: ProtocolId,
    /// Peer that sent this message (not necessarily the round initiator).
    pub sender: PeerId,
    /// Protocol stage the sender reports having reached.
    pub stage: Stage,
    /// Round payload. Authoritative only on the first message seen for a
    /// fresh round.
    pub payload: Bytes,
}

impl RbMsg {
    pub fn new(protocol_id: ProtocolId, sender: PeerId, stage: Stage, payload: Bytes) -> RbMsg {
        RbMsg {
            protocol_id,
            sender,
            stage,
            payload,
        }
    }
}

/// Outcome of processing one inbound protocol message.
#[derive(Debug, Default)]
pub(crate) struct ProtocolResponse {
    /// Messages to broadcast to the peer group, in announcement order. Our
    /// own announcement counts towards the next threshold, so one inbound
    /// message can advance the round through several stages at once.
    pub(crate) protocol_replies: Vec<RbMsg>,
    /// Payload to deliver locally, if the round was accepted.
    pub(crate) delivered: Option<Bytes>,
}

impl ProtocolResponse {
    pub(crate) fn dropped() -> ProtocolResponse {
        ProtocolResponse::default()
    }
}
