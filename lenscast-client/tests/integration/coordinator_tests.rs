use lenscast_client::{IceCandidate, PeerConnection, PeerRole, SignalingState};
use lenscast_core::SignalMessage;

use crate::integration::{init_tracing, next_signal, settle, spawn_coordinator, spawn_coordinator_with};
use crate::utils::FakeFactory;

fn candidate(n: usize) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n}"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    }
}

#[tokio::test]
async fn initiator_reaches_stable_after_offer_and_answer() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Initiator);

    fx.handle.initiate();
    let offer = next_signal(&mut fx.signals).await;
    assert!(matches!(offer, SignalMessage::Offer { from: None, .. }));

    let conn = fx.factory.latest();
    assert_eq!(conn.signaling_state(), SignalingState::HaveLocalOffer);

    fx.handle.remote_answer("v=0 remote answer".into());
    settle().await;

    assert_eq!(conn.signaling_state(), SignalingState::Stable);
    assert_eq!(fx.factory.created_count(), 1, "no reset on the happy path");
}

#[tokio::test]
async fn full_handshake_leaves_both_sides_stable() {
    init_tracing();
    let mut host = spawn_coordinator(PeerRole::Initiator);
    let mut viewer = spawn_coordinator(PeerRole::Responder);

    host.handle.initiate();
    let offer = next_signal(&mut host.signals).await;
    let SignalMessage::Offer { sdp, .. } = offer else {
        panic!("expected an offer, got {offer}");
    };

    viewer.handle.remote_offer(sdp);
    let answer = next_signal(&mut viewer.signals).await;
    let SignalMessage::Answer { sdp, .. } = answer else {
        panic!("expected an answer, got {answer}");
    };

    host.handle.remote_answer(sdp);
    settle().await;

    assert_eq!(
        host.factory.latest().signaling_state(),
        SignalingState::Stable
    );
    assert_eq!(
        viewer.factory.latest().signaling_state(),
        SignalingState::Stable
    );
    assert!(host.factory.latest().applied_candidates().is_empty());
    assert!(viewer.factory.latest().applied_candidates().is_empty());
}

#[tokio::test]
async fn initiate_outside_stable_resets_first() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Initiator);

    fx.handle.initiate();
    let _first = next_signal(&mut fx.signals).await;
    let first_conn = fx.factory.latest();
    assert_eq!(first_conn.signaling_state(), SignalingState::HaveLocalOffer);

    // renegotiating while an offer is outstanding starts from a clean slate
    fx.handle.initiate();
    let second = next_signal(&mut fx.signals).await;
    assert!(matches!(second, SignalMessage::Offer { .. }));
    assert_eq!(fx.factory.created_count(), 2);
    assert!(first_conn.is_closed());
}

#[tokio::test]
async fn responder_answers_an_offer_and_reaches_stable() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Responder);

    fx.handle.remote_offer("v=0 remote offer".into());
    let answer = next_signal(&mut fx.signals).await;
    assert!(matches!(answer, SignalMessage::Answer { from: None, .. }));

    let conn = fx.factory.latest();
    assert_eq!(conn.signaling_state(), SignalingState::Stable);
}

#[tokio::test]
async fn incoming_offer_always_wins_over_a_pending_local_offer() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Initiator);

    fx.handle.initiate();
    let first = next_signal(&mut fx.signals).await;
    assert!(matches!(first, SignalMessage::Offer { .. }));
    let first_conn = fx.factory.latest();
    assert_eq!(first_conn.signaling_state(), SignalingState::HaveLocalOffer);

    // glare: the remote offered too; last offer received wins locally
    fx.handle.remote_offer("v=0 competing offer".into());
    let answer = next_signal(&mut fx.signals).await;
    assert!(matches!(answer, SignalMessage::Answer { .. }));

    assert_eq!(fx.factory.created_count(), 2);
    assert!(first_conn.is_closed(), "the pending offer's connection is discarded");
    assert_eq!(fx.factory.latest().signaling_state(), SignalingState::Stable);
}

#[tokio::test]
async fn early_candidates_flush_in_order_once_the_answer_lands() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Initiator);

    fx.handle.initiate();
    let _offer = next_signal(&mut fx.signals).await;
    let conn = fx.factory.latest();

    // candidates outrun the answer: they must wait for the remote description
    for n in 0..3 {
        fx.handle.remote_candidate(candidate(n));
    }
    settle().await;
    assert!(conn.applied_candidates().is_empty());

    fx.handle.remote_answer("v=0 remote answer".into());
    settle().await;

    let applied = conn.applied_candidates();
    assert_eq!(applied.len(), 3, "none lost");
    for (n, c) in applied.iter().enumerate() {
        assert_eq!(c.candidate, format!("candidate:{n}"));
    }

    // a later candidate applies directly, after the flushed ones
    fx.handle.remote_candidate(candidate(9));
    settle().await;
    assert_eq!(conn.applied_candidates().last().unwrap().candidate, "candidate:9");
}

#[tokio::test]
async fn candidates_without_a_connection_are_dropped() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Responder);

    fx.handle.remote_candidate(candidate(0));
    settle().await;
    assert_eq!(fx.factory.created_count(), 0);

    // a later negotiation starts clean: the dropped candidate never surfaces
    fx.handle.remote_offer("v=0 remote offer".into());
    let _answer = next_signal(&mut fx.signals).await;
    assert!(fx.factory.latest().applied_candidates().is_empty());
}

#[tokio::test]
async fn stale_offer_completion_is_discarded_after_a_reset() {
    init_tracing();
    let factory = FakeFactory::new();
    let gate = factory.gate_next_offer();
    let mut fx = spawn_coordinator_with(PeerRole::Initiator, factory);

    // the offer step suspends inside the engine...
    fx.handle.initiate();
    settle().await;
    assert_eq!(fx.factory.created_count(), 1);

    // ...and a remote offer resets the session while it is still pending
    fx.handle.remote_offer("v=0 remote offer".into());
    let answer = next_signal(&mut fx.signals).await;
    assert!(matches!(answer, SignalMessage::Answer { .. }));

    // the suspended step now completes against the dead generation
    gate.add_permits(1);
    settle().await;

    assert!(
        fx.signals.try_recv().is_err(),
        "the stale offer must not be emitted"
    );
    assert_eq!(
        fx.factory.latest().signaling_state(),
        SignalingState::Stable,
        "session state is untouched by the stale completion"
    );
    assert_eq!(
        fx.factory.created_count(),
        2,
        "no reset is triggered by the stale completion"
    );
}

#[tokio::test]
async fn answer_in_wrong_state_resets_and_reoffers() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Initiator);

    fx.handle.initiate();
    let _offer = next_signal(&mut fx.signals).await;
    fx.handle.remote_answer("v=0 first answer".into());
    settle().await;
    let first_conn = fx.factory.latest();
    assert_eq!(first_conn.signaling_state(), SignalingState::Stable);

    // a duplicate answer arrives while stable: start over and re-offer
    fx.handle.remote_answer("v=0 duplicate answer".into());
    let reoffer = next_signal(&mut fx.signals).await;
    assert!(matches!(reoffer, SignalMessage::Offer { .. }));

    assert_eq!(fx.factory.created_count(), 2);
    assert!(first_conn.is_closed());
}

#[tokio::test]
async fn close_tears_the_connection_down() {
    init_tracing();
    let mut fx = spawn_coordinator(PeerRole::Initiator);

    fx.handle.initiate();
    let _offer = next_signal(&mut fx.signals).await;
    let conn = fx.factory.latest();

    fx.handle.close();
    settle().await;
    assert!(conn.is_closed());
}
