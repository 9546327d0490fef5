use huddle::{
    media::{MediaKind, MediaSlot},
    room::RoomError,
    rpc::{
        Command, ConsumerId, ConsumerScore, ConsumerSpec, ConsumerType, Event,
        ParticipantId,
    },
    session::Participant,
};

use super::{consumer_spec, run, settle, Harness};

fn participant(h: &Harness, id: &str) -> Participant {
    h.session().participants[&ParticipantId::from(id)].clone()
}

/// Non-shared track of the `profiles:1` participant.
fn peer_track(consumer_id: &str, kind: MediaKind) -> ConsumerSpec {
    consumer_spec("profiles:1", consumer_id, kind, false)
}

fn ids(ids: &[&str]) -> Vec<ConsumerId> {
    ids.iter().map(|id| ConsumerId::from(*id)).collect()
}

/// Joins with two participants each having an audio consumer.
async fn two_listeners() -> Harness {
    let h = Harness::new();
    h.join(&["a", "b"]).await;
    for (participant, consumer) in &[("a", "ca"), ("b", "cb")] {
        let spec =
            consumer_spec(participant, consumer, MediaKind::Audio, false);
        assert!(h.consume(spec).await);
    }
    drop(h.take_commands());
    h
}

#[test]
fn share_flag_selects_share_slot() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;

        let created = h
            .consume(consumer_spec("profiles:1", "c1", MediaKind::Video, true))
            .await;

        assert!(created);
        let p = participant(&h, "profiles:1");
        assert_eq!(p.share.as_ref().map(|c| c.id.0.as_str()), Some("c1"));
        assert!(p.video.is_none());
        assert!(p.audio.is_none());

        let share = p.share.unwrap();
        assert_eq!(share.kind, ConsumerType::Svc);
        assert_eq!(share.codec.as_deref(), Some("VP9"));
        assert_eq!(share.scalability.spatial.total, 3);
        assert_eq!(share.scalability.spatial.preferred, 2);
        assert_eq!(share.scalability.temporal.current, None);
        assert!(h.engine.device().recv_transport().is_connected());
    });
}

#[test]
fn failed_consumer_creation_is_answered_negatively() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        h.engine.device().recv_transport().set_fail_consume(true);

        let created = h
            .consume(peer_track("c1", MediaKind::Audio))
            .await;

        assert!(!created);
        assert!(matches!(h.errors().as_slice(), [RoomError::Engine(_)]));
        assert!(participant(&h, "profiles:1").audio.is_none());
    });
}

#[test]
fn consumer_of_unknown_participant_adds_it() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;

        assert!(
            h.consume(consumer_spec("late", "c1", MediaKind::Video, false))
                .await
        );

        let p = participant(&h, "late");
        assert_eq!(p.volume, 100);
        assert!(p.video.is_some());
    });
}

#[test]
fn unknown_consumer_closed_is_noop() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        assert!(h.consume(peer_track("c1", MediaKind::Audio)).await);
        let before = h.session();

        h.socket().send(Event::ConsumerClosed {
            consumer_id: "nope".into(),
        });
        settle().await;

        assert_eq!(h.session(), before);
        assert!(h.errors().is_empty(), "{:?}", h.errors());
    });
}

#[test]
fn participant_left_after_consumer_closed() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        assert!(h.consume(peer_track("c1", MediaKind::Audio)).await);
        let consumer = h.engine.device().recv_transport().consumer("c1");
        let socket = h.socket();

        socket.send(Event::ConsumerClosed {
            consumer_id: "c1".into(),
        });
        settle().await;
        assert!(consumer.is_closed());
        assert!(participant(&h, "profiles:1").audio.is_none());

        socket.send(Event::ParticipantLeft {
            participant_id: "profiles:1".into(),
        });
        settle().await;
        assert!(h.session().participants.is_empty());
        assert!(h.errors().is_empty(), "{:?}", h.errors());
    });
}

#[test]
fn participant_left_closes_its_consumers() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        for (id, kind) in &[("c1", MediaKind::Audio), ("c2", MediaKind::Video)]
        {
            assert!(h.consume(peer_track(id, *kind)).await);
        }

        h.socket().send(Event::ParticipantLeft {
            participant_id: "profiles:1".into(),
        });
        settle().await;

        let transport = h.engine.device().recv_transport();
        assert!(transport.consumers().iter().all(|c| c.is_closed()));
        assert!(h.session().participants.is_empty());
    });
}

#[test]
fn occupied_slot_is_replaced() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        assert!(h.consume(peer_track("c1", MediaKind::Video)).await);
        assert!(h.consume(peer_track("c2", MediaKind::Video)).await);

        let transport = h.engine.device().recv_transport();
        assert!(transport.consumer("c1").is_closed());
        assert!(!transport.consumer("c2").is_closed());
        let video = participant(&h, "profiles:1").video.unwrap();
        assert_eq!(video.id, ConsumerId::from("c2"));

        h.socket().send(Event::ConsumerClosed {
            consumer_id: "c1".into(),
        });
        settle().await;
        assert!(participant(&h, "profiles:1").video.is_some());
    });
}

#[test]
fn transport_close_forgets_consumer() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        assert!(h.consume(peer_track("c1", MediaKind::Video)).await);

        h.engine
            .device()
            .recv_transport()
            .consumer("c1")
            .close_transport();

        assert!(participant(&h, "profiles:1").video.is_none());
    });
}

#[test]
fn remote_state_of_consumer_is_tracked() {
    run(async {
        let h = Harness::new();
        h.join(&["profiles:1"]).await;
        assert!(h.consume(peer_track("c1", MediaKind::Video)).await);
        let socket = h.socket();

        socket.send(Event::ConsumerPaused {
            consumer_id: "c1".into(),
        });
        socket.send(Event::ConsumerLayersChanged {
            consumer_id: "c1".into(),
            spatial: Some(1),
            temporal: Some(2),
        });
        socket.send(Event::ConsumerScore {
            consumer_id: "c1".into(),
            score: ConsumerScore {
                score: 7,
                producer_score: 10,
                producer_scores: vec![10, 9, 8],
            },
        });
        settle().await;

        let video = participant(&h, "profiles:1").video.unwrap();
        assert!(video.paused.remote);
        assert!(!video.paused.local);
        assert!(video.is_paused());
        assert_eq!(video.scalability.spatial.current, Some(1));
        assert_eq!(video.scalability.temporal.current, Some(2));
        assert_eq!(video.score.map(|s| s.score), Some(7));

        socket.send(Event::ConsumerResumed {
            consumer_id: "c1".into(),
        });
        settle().await;
        assert!(!participant(&h, "profiles:1").video.unwrap().is_paused());
    });
}

#[test]
fn local_pause_and_resume() {
    run(async {
        let h = two_listeners().await;
        let consumer = h.engine.device().recv_transport().consumer("ca");

        h.handle.pause(&"a".into(), MediaSlot::Audio).unwrap();
        h.handle.pause(&"a".into(), MediaSlot::Audio).unwrap();
        assert!(consumer.is_paused());
        assert!(participant(&h, "a").audio.unwrap().paused.local);

        h.handle.resume(&"a".into(), MediaSlot::Audio).unwrap();
        assert!(!consumer.is_paused());

        assert_eq!(
            h.take_commands(),
            vec![
                Command::ConsumersPaused {
                    consumer_ids: ids(&["ca"]),
                },
                Command::ConsumersResumed {
                    consumer_ids: ids(&["ca"]),
                },
            ],
        );
    });
}

#[test]
fn deafen_and_undeafen_restore_pause_state() {
    run(async {
        let h = two_listeners().await;
        h.handle.pause(&"a".into(), MediaSlot::Audio).unwrap();
        drop(h.take_commands());

        h.handle.audio().deafen().unwrap();
        h.handle.audio().deafen().unwrap();

        assert!(h.session().is_deafened);
        assert!(participant(&h, "a").audio.unwrap().paused.local);
        assert!(participant(&h, "b").audio.unwrap().paused.local);
        assert_eq!(
            h.take_commands(),
            vec![Command::ConsumersPaused {
                consumer_ids: ids(&["cb"]),
            }],
        );

        h.handle.audio().undeafen().unwrap();

        assert!(!h.session().is_deafened);
        assert!(participant(&h, "a").audio.unwrap().paused.local);
        assert!(!participant(&h, "b").audio.unwrap().paused.local);
        let transport = h.engine.device().recv_transport();
        assert!(transport.consumer("ca").is_paused());
        assert!(!transport.consumer("cb").is_paused());
        assert_eq!(
            h.take_commands(),
            vec![Command::ConsumersResumed {
                consumer_ids: ids(&["cb"]),
            }],
        );
    });
}

#[test]
fn resume_while_deafened_applies_on_undeafen() {
    run(async {
        let h = two_listeners().await;
        h.handle.pause(&"a".into(), MediaSlot::Audio).unwrap();
        h.handle.audio().deafen().unwrap();

        h.handle.resume(&"a".into(), MediaSlot::Audio).unwrap();
        assert!(participant(&h, "a").audio.unwrap().paused.local);

        h.handle.audio().undeafen().unwrap();
        assert!(!participant(&h, "a").audio.unwrap().paused.local);
        assert!(!participant(&h, "b").audio.unwrap().paused.local);
    });
}

#[test]
fn zero_volume_pauses_audio() {
    run(async {
        let h = two_listeners().await;
        let consumer = h.engine.device().recv_transport().consumer("ca");

        h.handle.audio().set_volume(&"a".into(), 0).unwrap();

        let a = participant(&h, "a");
        assert_eq!(a.volume, 0);
        assert!(a.audio.unwrap().paused.local);
        assert!(consumer.is_paused());

        h.handle.audio().deafen().unwrap();
        h.handle.audio().undeafen().unwrap();
        assert!(participant(&h, "a").audio.unwrap().paused.local);

        h.handle.audio().set_volume(&"a".into(), 150).unwrap();

        let a = participant(&h, "a");
        assert_eq!(a.volume, 100);
        assert!(!a.audio.unwrap().paused.local);
        assert!(!consumer.is_paused());
    });
}

#[test]
fn audio_consumed_while_deafened_starts_paused() {
    run(async {
        let h = Harness::new();
        h.join(&["a"]).await;
        h.handle.audio().deafen().unwrap();
        drop(h.take_commands());

        let spec = consumer_spec("a", "ca", MediaKind::Audio, false);
        assert!(h.consume(spec).await);

        assert!(participant(&h, "a").audio.unwrap().paused.local);
        let transport = h.engine.device().recv_transport();
        assert!(transport.consumer("ca").is_paused());
        assert_eq!(
            h.take_commands(),
            vec![Command::ConsumersPaused {
                consumer_ids: ids(&["ca"]),
            }],
        );

        h.handle.audio().undeafen().unwrap();
        assert!(!transport.consumer("ca").is_paused());
    });
}
