use log::trace;

use crate::broadcast::round::Round;
use crate::broadcast::{LocalStage, Stage};

/// Quorum arithmetic of the Bracha protocol for a group of `cluster_size`
/// peers tolerating `max_faulty` Byzantine ones.
///
/// `max_faulty = max(0, n/3 - 1)` (integer division), so the protocol
/// degenerates gracefully for groups of three or fewer peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BrachaQuorum {
    pub(crate) cluster_size: usize,
    pub(crate) max_faulty: usize,
}

/// What the dispatcher should do to a round after a tally update.
///
/// Evaluated strongest threshold first so a node that jumps straight to a
/// high stage does not re-announce the lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Decision {
    pub(crate) next_stage: Option<LocalStage>,
    pub(crate) broadcast: Option<Stage>,
    pub(crate) deliver: bool,
}

impl Decision {
    pub(crate) const IGNORE: Decision = Decision {
        next_stage: None,
        broadcast: None,
        deliver: false,
    };
}

impl BrachaQuorum {
    pub(crate) fn new(cluster_size: usize) -> Self {
        let max_faulty = (cluster_size / 3).saturating_sub(1);
        Self {
            cluster_size,
            max_faulty,
        }
    }

    /// Pure decision function over a round's tallies and local stage.
    ///
    /// Never moves the local stage backwards and never asks to re-broadcast a
    /// stage the round has already announced.
    pub(crate) fn decide(&self, round: &Round) -> Decision {
        let local_stage = round.local_stage();
        if local_stage == LocalStage::Accepted {
            return Decision::IGNORE;
        }

        let inits = round.tally(Stage::Init);
        let echoes = round.tally(Stage::Echo);
        let readys = round.tally(Stage::Ready);
        let n = self.cluster_size;
        let t = self.max_faulty;

        //on receiving <ready> from 1+2t distinct peers: deliver
        if readys >= 1 + 2 * t {
            trace!(
                "Accept threshold reached: Ready:{}/{} for round {}",
                readys,
                1 + 2 * t,
                round
            );
            //a correct node always announces READY before accepting
            let broadcast = (local_stage < LocalStage::Ready).then_some(Stage::Ready);
            return Decision {
                next_stage: Some(LocalStage::Accepted),
                broadcast,
                deliver: true,
            };
        }

        //on receiving <echo> from (n+t)/2 distinct peers, or <ready> from t+1: send <ready>
        if echoes >= (n + t) / 2 || readys >= t + 1 {
            if local_stage < LocalStage::Ready {
                trace!(
                    "Ready threshold reached: Echoed:{}/{} Ready:{}/{} for round {}",
                    echoes,
                    (n + t) / 2,
                    readys,
                    t + 1,
                    round
                );
                return Decision {
                    next_stage: Some(LocalStage::Ready),
                    broadcast: Some(Stage::Ready),
                    deliver: false,
                };
            }
            return Decision::IGNORE;
        }

        //on first <init> observation: send <echo>
        if inits >= 1 && local_stage < LocalStage::Echo {
            trace!("Init observed, echoing round {}", round);
            return Decision {
                next_stage: Some(LocalStage::Echo),
                broadcast: Some(Stage::Echo),
                deliver: false,
            };
        }

        Decision::IGNORE
    }
}
