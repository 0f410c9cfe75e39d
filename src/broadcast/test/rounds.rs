// Exercises the round state machine internally.
// It is not concerned about networking nor time etc.

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use crate::broadcast::broadcaster::Broadcaster;
    use crate::broadcast::{RbMsg, Stage};
    use crate::peer::PeerId;

    #[test]
    fn test_initiator_round_ten_peers() {
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local.clone(), 10);
        let payload = Bytes::from_static(b"block one");

        let (init, response) = broadcaster.new_broadcast("local_0".to_string(), payload.clone());
        assert_eq!(init.stage, Stage::Init);
        assert_eq!(init.sender, local);
        assert_eq!(init.payload, payload);

        //observing our own INIT makes us announce ECHO
        assert_eq!(stages(&response.protocol_replies), vec![Stage::Echo]);
        assert!(response.delivered.is_none());

        //five distinct peers echo; threshold (n+t)/2 = 6 counts our own echo
        for i in 0..5 {
            let peer = PeerId::random();
            let response = broadcaster.handle(msg("local_0", &peer, Stage::Echo, b"block one"));
            if i < 4 {
                assert!(response.protocol_replies.is_empty());
            } else {
                assert_eq!(stages(&response.protocol_replies), vec![Stage::Ready]);
            }
            assert!(response.delivered.is_none());
        }

        //four more peers report READY; accept threshold 1+2t = 5 counts our own
        for i in 0..4 {
            let peer = PeerId::random();
            let response = broadcaster.handle(msg("local_0", &peer, Stage::Ready, b"block one"));
            //READY was already announced once, never again
            assert!(response.protocol_replies.is_empty());
            if i < 3 {
                assert!(response.delivered.is_none());
            } else {
                assert_eq!(response.delivered.expect("expected delivery"), payload);
            }
        }
    }

    #[test]
    fn test_receiver_round_three_peers() {
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 3);
        let peer_a = PeerId::new("peer-a");

        //at t = 0 every threshold degenerates to a single vote, so our own
        //ECHO and READY announcements carry the round to accept on the spot
        let response = broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Init, b"hello"));
        assert_eq!(
            stages(&response.protocol_replies),
            vec![Stage::Echo, Stage::Ready]
        );
        assert_eq!(response.delivered.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_single_node_round_delivers_immediately() {
        //a group of one gets no inbound messages, ever; the initiator's own
        //votes must complete the round
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 1);
        let payload = Bytes::from_static(b"solo");

        let (init, response) = broadcaster.new_broadcast("local_0".to_string(), payload.clone());
        assert_eq!(init.stage, Stage::Init);
        //the echo threshold (1+0)/2 = 0 is met before echoing, so the round
        //jumps straight to READY
        assert_eq!(stages(&response.protocol_replies), vec![Stage::Ready]);
        assert_eq!(response.delivered.expect("expected delivery"), payload);
    }

    #[test]
    fn test_round_delivers_at_most_once() {
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 3);
        let peer_a = PeerId::new("peer-a");
        let peer_c = PeerId::new("peer-c");

        let response = broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Init, b"hello"));
        assert!(response.delivered.is_some());

        //the round is terminal now; late messages are discarded silently
        let response = broadcaster.handle(msg("peer-a_0", &peer_c, Stage::Ready, b"hello"));
        assert!(response.delivered.is_none());
        assert!(response.protocol_replies.is_empty());

        //and a late INIT must not silently recreate the round
        let response = broadcaster.handle(msg("peer-a_0", &peer_c, Stage::Init, b"hello"));
        assert!(response.protocol_replies.is_empty());
        assert!(response.delivered.is_none());
    }

    #[test]
    fn test_duplicate_echo_does_not_count() {
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 10);
        let peer_a = PeerId::new("peer-a");

        broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Init, b"hello"));

        //same peer echoing twice counts once
        let repeater = PeerId::random();
        let response = broadcaster.handle(msg("peer-a_0", &repeater, Stage::Echo, b"hello"));
        assert!(response.protocol_replies.is_empty());
        let response = broadcaster.handle(msg("peer-a_0", &repeater, Stage::Echo, b"hello"));
        assert!(response.protocol_replies.is_empty());

        //with our own echo that is 2 of the 6 required; three more distinct
        //peers are not enough, a fourth tips the round to READY
        for _ in 0..3 {
            let response =
                broadcaster.handle(msg("peer-a_0", &PeerId::random(), Stage::Echo, b"hello"));
            assert!(response.protocol_replies.is_empty());
        }
        let response = broadcaster.handle(msg("peer-a_0", &PeerId::random(), Stage::Echo, b"hello"));
        assert_eq!(stages(&response.protocol_replies), vec![Stage::Ready]);
    }

    #[test]
    fn test_stage_regression_is_discarded() {
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 10);
        let peer_a = PeerId::new("peer-a");
        let peer_b = PeerId::new("peer-b");

        broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Init, b"hello"));
        broadcaster.handle(msg("peer-a_0", &peer_b, Stage::Ready, b"hello"));

        //peer-b regressing to ECHO changes nothing
        let response = broadcaster.handle(msg("peer-a_0", &peer_b, Stage::Echo, b"hello"));
        assert!(response.protocol_replies.is_empty());
        assert!(response.delivered.is_none());
    }

    #[test]
    fn test_interleaved_rounds_are_independent() {
        //t = 1: (6+1)/2 = 3 echoes to READY, 1+2t = 3 readys to accept
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 6);
        let peer_a = PeerId::new("peer-a");
        let peer_c = PeerId::new("peer-c");
        let peer_d = PeerId::new("peer-d");

        let response = broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Init, b"from a"));
        assert_eq!(response.protocol_replies[0].protocol_id, "peer-a_0");

        let response = broadcaster.handle(msg("peer-c_0", &peer_c, Stage::Init, b"from c"));
        assert_eq!(response.protocol_replies[0].protocol_id, "peer-c_0");

        //each round reaches its echo threshold on its own messages only
        broadcaster.handle(msg("peer-c_0", &peer_c, Stage::Echo, b"from c"));
        broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Echo, b"from a"));

        let response = broadcaster.handle(msg("peer-c_0", &peer_d, Stage::Echo, b"from c"));
        let reply = &response.protocol_replies[0];
        assert_eq!((reply.protocol_id.as_str(), reply.stage), ("peer-c_0", Stage::Ready));

        let response = broadcaster.handle(msg("peer-a_0", &peer_d, Stage::Echo, b"from a"));
        let reply = &response.protocol_replies[0];
        assert_eq!((reply.protocol_id.as_str(), reply.stage), ("peer-a_0", Stage::Ready));

        //and the accept thresholds interleave the same way
        broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Ready, b"from a"));
        broadcaster.handle(msg("peer-c_0", &peer_c, Stage::Ready, b"from c"));

        let response = broadcaster.handle(msg("peer-a_0", &peer_d, Stage::Ready, b"from a"));
        assert_eq!(response.delivered.unwrap(), Bytes::from_static(b"from a"));

        let response = broadcaster.handle(msg("peer-c_0", &peer_d, Stage::Ready, b"from c"));
        assert_eq!(response.delivered.unwrap(), Bytes::from_static(b"from c"));
    }

    #[test]
    fn test_first_payload_wins_within_a_round() {
        //an equivocating peer cannot swap the payload mid-round; the first
        //message seen for a fresh round id is authoritative
        let local = PeerId::new("local");
        let mut broadcaster = Broadcaster::new(local, 6);
        let peer_a = PeerId::new("peer-a");
        let peer_b = PeerId::new("peer-b");

        let response = broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Init, b"first"));
        assert_eq!(
            response.protocol_replies[0].payload,
            Bytes::from_static(b"first")
        );

        broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Echo, b"second"));
        let response = broadcaster.handle(msg("peer-a_0", &peer_b, Stage::Echo, b"third"));
        assert_eq!(
            response.protocol_replies[0].payload,
            Bytes::from_static(b"first")
        );

        broadcaster.handle(msg("peer-a_0", &peer_a, Stage::Ready, b"fourth"));
        let response = broadcaster.handle(msg("peer-a_0", &peer_b, Stage::Ready, b"fifth"));
        assert_eq!(response.delivered.unwrap(), Bytes::from_static(b"first"));
    }

    fn msg(protocol_id: &str, from: &PeerId, stage: Stage, payload: &[u8]) -> RbMsg {
        RbMsg::new(
            protocol_id.to_string(),
            from.clone(),
            stage,
            Bytes::copy_from_slice(payload),
        )
    }

    fn stages(replies: &[RbMsg]) -> Vec<Stage> {
        replies.iter().map(|reply| reply.stage).collect()
    }
}
