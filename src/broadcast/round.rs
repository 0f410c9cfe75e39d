use std::collections::HashMap;
use std::fmt::Display;
use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;

use crate::broadcast::quorum::BrachaQuorum;
use crate::broadcast::{LocalStage, ProtocolId, Stage};
use crate::peer::PeerId;

/// Retired round ids kept so late messages are cheaply ignored instead of
/// silently recreating the round.
const TERMINAL_SET_CAPACITY: usize = 1000;

/// State of one live broadcast round.
///
/// Mutated exclusively by the dispatcher; the quorum parameters are
/// snapshotted at round creation and stay fixed for the round's lifetime.
#[derive(Debug, Clone)]
pub(crate) struct Round {
    id: ProtocolId,
    local_stage: LocalStage,
    payload: Bytes,
    /// Count of distinct peers that reported having reached each stage.
    tally: HashMap<Stage, usize>,
    /// Highest stage each peer has reported for this round.
    peer_stage: HashMap<PeerId, Stage>,
    quorum: BrachaQuorum,
}

impl Round {
    pub(crate) fn new(id: ProtocolId, payload: Bytes, quorum: BrachaQuorum) -> Round {
        Round {
            id,
            local_stage: LocalStage::None,
            payload,
            tally: HashMap::new(),
            peer_stage: HashMap::new(),
            quorum,
        }
    }

    pub(crate) fn local_stage(&self) -> LocalStage {
        self.local_stage
    }

    pub(crate) fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub(crate) fn quorum(&self) -> BrachaQuorum {
        self.quorum
    }

    pub(crate) fn tally(&self, stage: Stage) -> usize {
        self.tally.get(&stage).copied().unwrap_or(0)
    }

    /// Records that `peer` has reached `stage` and updates the tally.
    ///
    /// Returns false when the report is a duplicate or a regression (the peer
    /// already reported this stage or a higher one); tallies are untouched in
    /// that case, which caps each peer's contribution per stage at one.
    pub(crate) fn record_peer_stage(&mut self, peer: &PeerId, stage: Stage) -> bool {
        match self.peer_stage.get(peer) {
            Some(recorded) if *recorded >= stage => false,
            _ => {
                self.peer_stage.insert(peer.clone(), stage);
                *self.tally.entry(stage).or_insert(0) += 1;
                true
            }
        }
    }

    /// Moves the local stage forward. Backward moves are ignored.
    pub(crate) fn advance(&mut self, stage: LocalStage) {
        if stage > self.local_stage {
            self.local_stage = stage;
        }
    }

    #[cfg(test)]
    pub(crate) fn force_stage(&mut self, stage: LocalStage) {
        self.local_stage = stage;
    }
}

impl Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(stage={:?} init={} echo={} ready={})",
            self.id,
            self.local_stage,
            self.tally(Stage::Init),
            self.tally(Stage::Echo),
            self.tally(Stage::Ready),
        )
    }
}

/// Holds exactly one `Round` per live protocol id plus a bounded terminal
/// set of finished ids.
pub(crate) struct RoundStore {
    active: HashMap<ProtocolId, Round>,
    terminal: LruCache<ProtocolId, ()>,
}

impl RoundStore {
    pub(crate) fn new() -> RoundStore {
        RoundStore {
            active: HashMap::new(),
            terminal: LruCache::new(NonZeroUsize::new(TERMINAL_SET_CAPACITY).unwrap()),
        }
    }

    /// Returns the round for `protocol_id`, creating it from `payload` and
    /// `quorum` on first sight. The payload of the creating message is
    /// authoritative for the round's whole lifetime.
    pub(crate) fn get_or_create(
        &mut self,
        protocol_id: &ProtocolId,
        payload: &Bytes,
        quorum: BrachaQuorum,
    ) -> &mut Round {
        self.active
            .entry(protocol_id.clone())
            .or_insert_with(|| Round::new(protocol_id.clone(), payload.clone(), quorum))
    }

    pub(crate) fn get_mut(&mut self, protocol_id: &ProtocolId) -> Option<&mut Round> {
        self.active.get_mut(protocol_id)
    }

    pub(crate) fn is_terminal(&self, protocol_id: &ProtocolId) -> bool {
        self.terminal.contains(protocol_id)
    }

    /// Drops the round state and remembers the id as finished, releasing the
    /// payload memory.
    pub(crate) fn retire(&mut self, protocol_id: &ProtocolId) {
        self.active.remove(protocol_id);
        self.terminal.put(protocol_id.clone(), ());
    }

    #[cfg(test)]
    pub(crate) fn active_rounds(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use crate::broadcast::quorum::BrachaQuorum;
    use crate::broadcast::round::{Round, RoundStore};
    use crate::broadcast::Stage;
    use crate::peer::PeerId;

    #[test]
    fn test_peer_vote_capped_per_stage() {
        let mut round = new_round();
        let peer = PeerId::random();

        assert!(round.record_peer_stage(&peer, Stage::Echo));
        assert!(!round.record_peer_stage(&peer, Stage::Echo));
        assert_eq!(round.tally(Stage::Echo), 1);
    }

    #[test]
    fn test_stage_regression_rejected() {
        let mut round = new_round();
        let peer = PeerId::random();

        assert!(round.record_peer_stage(&peer, Stage::Ready));
        assert!(!round.record_peer_stage(&peer, Stage::Echo));
        assert!(!round.record_peer_stage(&peer, Stage::Init));
        assert_eq!(round.tally(Stage::Ready), 1);
        assert_eq!(round.tally(Stage::Echo), 0);
        assert_eq!(round.tally(Stage::Init), 0);
    }

    #[test]
    fn test_peer_stage_advances() {
        let mut round = new_round();
        let peer = PeerId::random();

        assert!(round.record_peer_stage(&peer, Stage::Init));
        assert!(round.record_peer_stage(&peer, Stage::Echo));
        assert!(round.record_peer_stage(&peer, Stage::Ready));
        assert_eq!(round.tally(Stage::Init), 1);
        assert_eq!(round.tally(Stage::Echo), 1);
        assert_eq!(round.tally(Stage::Ready), 1);
    }

    #[test]
    fn test_retire_moves_round_to_terminal_set() {
        let mut store = RoundStore::new();
        let id = "peer1_0".to_string();
        let payload = Bytes::from_static(b"payload");

        store.get_or_create(&id, &payload, BrachaQuorum::new(10));
        assert_eq!(store.active_rounds(), 1);
        assert!(!store.is_terminal(&id));

        store.retire(&id);
        assert_eq!(store.active_rounds(), 0);
        assert!(store.is_terminal(&id));
    }

    #[test]
    fn test_first_payload_is_authoritative() {
        let mut store = RoundStore::new();
        let id = "peer1_0".to_string();

        store.get_or_create(&id, &Bytes::from_static(b"first"), BrachaQuorum::new(10));
        let round = store.get_or_create(&id, &Bytes::from_static(b"second"), BrachaQuorum::new(10));
        assert_eq!(round.payload(), &Bytes::from_static(b"first"));
    }

    fn new_round() -> Round {
        Round::new(
            "peer1_0".to_string(),
            Bytes::from_static(b"payload"),
            BrachaQuorum::new(10),
        )
    }
}
