use lenscast_core::{ParticipantId, RoomId, SignalMessage};

use crate::integration::{create_registry, init_tracing};

#[tokio::test]
async fn join_creates_room_and_notifies_existing_members() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room = RoomId::from("abc123");
    let host = ParticipantId::new();
    let viewer = ParticipantId::new();

    let others = registry.join(&room, &host).await;
    assert!(others.is_empty(), "first joiner sees an empty room");

    let others = registry.join(&room, &viewer).await;
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].participant, host);

    let host_inbox = sink.messages_for(&host).await;
    assert_eq!(
        host_inbox,
        vec![SignalMessage::UserConnected {
            participant: viewer.clone()
        }]
    );
    assert!(
        sink.messages_for(&viewer).await.is_empty(),
        "the joiner is not notified about itself"
    );
}

#[tokio::test]
async fn joining_a_room_with_n_members_returns_all_n() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room = RoomId::from("busy");
    let earlier: Vec<ParticipantId> = (0..3).map(|_| ParticipantId::new()).collect();
    for p in &earlier {
        registry.join(&room, p).await;
    }

    let latecomer = ParticipantId::new();
    let others = registry.join(&room, &latecomer).await;

    assert_eq!(others.len(), 3);
    for p in &earlier {
        assert!(others.iter().any(|m| &m.participant == p));
    }

    for p in &earlier {
        let connected: Vec<_> = sink
            .messages_for(p)
            .await
            .into_iter()
            .filter(|m| {
                matches!(m, SignalMessage::UserConnected { participant } if participant == &latecomer)
            })
            .collect();
        assert_eq!(connected.len(), 1, "each member hears about the joiner once");
    }
}

#[tokio::test]
async fn removing_the_last_member_deletes_the_room() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room = RoomId::from("fleeting");
    let p = ParticipantId::new();

    registry.join(&room, &p).await;
    assert_eq!(registry.list_members(&room).len(), 1);

    registry.leave(&room, &p).await;
    assert!(registry.list_members(&room).is_empty());
    assert!(registry.room_of(&p).is_none());

    // the room is gone: later operations are silent no-ops
    sink.clear().await;
    registry
        .relay(
            &room,
            &p,
            SignalMessage::Offer {
                from: None,
                sdp: "v=0".into(),
            },
        )
        .await;
    registry.leave(&room, &p).await;
    assert!(sink.deliveries().await.is_empty());
}

#[tokio::test]
async fn leave_reports_streams_stopped_before_the_disconnect() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room = RoomId::from("abc123");
    let host = ParticipantId::new();
    let viewer = ParticipantId::new();

    registry.join(&room, &host).await;
    registry.join(&room, &viewer).await;
    registry
        .relay(
            &room,
            &host,
            SignalMessage::StreamStarted {
                from: None,
                stream: "camera".into(),
            },
        )
        .await;
    registry
        .relay(
            &room,
            &host,
            SignalMessage::StreamStarted {
                from: None,
                stream: "screen".into(),
            },
        )
        .await;
    sink.clear().await;

    registry.leave(&room, &host).await;

    let inbox = sink.messages_for(&viewer).await;
    assert_eq!(
        inbox,
        vec![
            SignalMessage::StreamStopped {
                from: Some(host.clone()),
                stream: "camera".into(),
            },
            SignalMessage::StreamStopped {
                from: Some(host.clone()),
                stream: "screen".into(),
            },
            SignalMessage::UserDisconnected {
                participant: host.clone()
            },
        ]
    );
}

#[tokio::test]
async fn disconnect_leaves_the_current_room() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room = RoomId::from("abc123");
    let p1 = ParticipantId::new();
    let p2 = ParticipantId::new();

    registry.join(&room, &p1).await;
    registry.join(&room, &p2).await;
    sink.clear().await;

    registry.disconnect(&p1).await;

    assert!(registry.room_of(&p1).is_none());
    assert_eq!(registry.list_members(&room).len(), 1);
    assert_eq!(
        sink.messages_for(&p2).await,
        vec![SignalMessage::UserDisconnected {
            participant: p1.clone()
        }]
    );

    // disconnecting a participant that is in no room does nothing
    registry.disconnect(&p1).await;
}

#[tokio::test]
async fn second_join_implicitly_leaves_the_previous_room() {
    init_tracing();
    let (registry, sink) = create_registry();
    let old_room = RoomId::from("old");
    let new_room = RoomId::from("new");
    let mover = ParticipantId::new();
    let bystander = ParticipantId::new();

    registry.join(&old_room, &mover).await;
    registry.join(&old_room, &bystander).await;
    sink.clear().await;

    registry.join(&new_room, &mover).await;

    assert_eq!(registry.room_of(&mover), Some(new_room.clone()));
    assert_eq!(registry.list_members(&new_room).len(), 1);
    assert_eq!(
        registry.list_members(&old_room).len(),
        1,
        "only the bystander remains in the old room"
    );
    assert_eq!(
        sink.messages_for(&bystander).await,
        vec![SignalMessage::UserDisconnected {
            participant: mover.clone()
        }]
    );
}

#[tokio::test]
async fn rejoining_the_same_room_is_idempotent() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room = RoomId::from("abc123");
    let p1 = ParticipantId::new();
    let p2 = ParticipantId::new();

    registry.join(&room, &p1).await;
    registry.join(&room, &p2).await;
    sink.clear().await;

    let others = registry.join(&room, &p2).await;

    assert_eq!(others.len(), 1);
    assert_eq!(others[0].participant, p1);
    assert_eq!(registry.list_members(&room).len(), 2);
    assert!(
        sink.deliveries().await.is_empty(),
        "no duplicate user-connected broadcast"
    );
}

#[tokio::test]
async fn concurrent_joins_create_exactly_one_room() {
    init_tracing();
    let (registry, _sink) = create_registry();
    let room = RoomId::from("thundering-herd");

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let room = room.clone();
        let p = ParticipantId::new();
        tasks.push(tokio::spawn(async move {
            registry.join(&room, &p).await;
        }));
    }
    for task in tasks {
        task.await.expect("join task panicked");
    }

    assert_eq!(registry.snapshot().len(), 1);
    assert_eq!(registry.list_members(&room).len(), 16);
}

#[tokio::test]
async fn admin_clear_force_disconnects_every_participant() {
    init_tracing();
    let (registry, sink) = create_registry();
    let room_a = RoomId::from("a");
    let room_b = RoomId::from("b");
    let p1 = ParticipantId::new();
    let p2 = ParticipantId::new();
    let p3 = ParticipantId::new();

    registry.join(&room_a, &p1).await;
    registry.join(&room_a, &p2).await;
    registry.join(&room_b, &p3).await;
    sink.clear().await;

    let report = registry.clear("Server clearing all rooms").await;

    assert_eq!(report.rooms, 2);
    assert_eq!(report.participants, 3);
    assert!(registry.snapshot().is_empty());

    for p in [&p1, &p2, &p3] {
        assert_eq!(
            sink.messages_for(p).await,
            vec![SignalMessage::ForceDisconnect {
                reason: "Server clearing all rooms".into()
            }]
        );
        assert!(sink.was_kicked(p).await);
    }
}
