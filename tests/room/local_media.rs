use huddle::{
    media::{LocalMediaType, MediaKind, VideoCodec, VideoOptions},
    platform::{MediaDevicesError, MediaStreamTrack as _, Producer as _},
    room::RoomError,
    rpc::{self, Command, Event, ProducerId},
};

use super::{fakes::Produced, run, settle, Harness};

fn produced_of(h: &Harness, kind: MediaKind) -> Vec<Produced> {
    h.engine
        .device()
        .send_transport()
        .produced()
        .into_iter()
        .filter(|p| p.options.track.kind() == kind)
        .collect()
}

fn paused_producers(commands: &[Command]) -> Vec<ProducerId> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::ProducerPaused { producer_id } => {
                Some(producer_id.clone())
            }
            _ => None,
        })
        .collect()
}

#[test]
fn microphone_is_enabled_on_join_unless_muted() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;

        let session = h.session();
        assert!(session.is_mic_enabled);
        let mic = produced_of(&h, MediaKind::Audio);
        assert_eq!(mic.len(), 1);
        let codec_options = &mic[0].options.codec_options;
        assert_eq!(codec_options.opus_stereo, Some(true));
        assert_eq!(codec_options.opus_dtx, Some(true));
        assert_eq!(codec_options.opus_fec, Some(true));

        let commands = h.socket().commands();
        let connects = commands
            .iter()
            .filter(|c| match c {
                Command::ConnectTransport { transport_id, .. } => {
                    transport_id == "send-1"
                }
                _ => false,
            })
            .count();
        assert_eq!(connects, 1);
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::Produce { kind: MediaKind::Audio, .. },
        )));
        assert!(h.errors().is_empty(), "{:?}", h.errors());
    });
}

#[test]
fn muted_microphone_starts_paused() {
    run(async {
        let h = Harness::new();
        h.handle.microphone().mute().unwrap();
        h.join(&[]).await;

        assert!(!h.session().is_mic_enabled);
        assert!(produced_of(&h, MediaKind::Audio).is_empty());

        h.handle.microphone().enable(None).await.unwrap();

        let session = h.session();
        assert!(session.is_mic_enabled);
        assert!(session.is_mic_muted);
        let producer = h.engine.device().send_transport().producer();
        assert!(producer.is_paused());
        assert_eq!(
            paused_producers(&h.socket().commands()),
            vec![producer.id()],
        );
    });
}

#[test]
fn mute_and_unmute_keep_same_producer() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;
        let producer = h.engine.device().send_transport().producer();
        drop(h.take_commands());

        h.handle.microphone().mute().unwrap();
        h.handle.microphone().mute().unwrap();
        assert!(producer.is_paused());
        assert!(h.session().is_mic_muted);

        h.handle.microphone().unmute().unwrap();
        assert!(!producer.is_paused());
        assert!(!h.session().is_mic_muted);

        assert_eq!(produced_of(&h, MediaKind::Audio).len(), 1);
        assert!(!producer.is_closed());
        assert_eq!(
            h.take_commands(),
            vec![
                Command::ProducerPaused {
                    producer_id: producer.id(),
                },
                Command::ProducerResumed {
                    producer_id: producer.id(),
                },
            ],
        );
    });
}

#[test]
fn disabling_microphone_closes_producer_and_track() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;
        let producer = h.engine.device().send_transport().producer();
        drop(h.take_commands());

        h.handle.microphone().disable().unwrap();

        assert!(producer.is_closed());
        assert!(h.devices.tracks()[0].is_stopped());
        assert!(!h.session().is_mic_enabled);
        assert_eq!(
            h.take_commands(),
            vec![Command::ProducerClosed {
                producer_id: producer.id(),
            }],
        );

        h.handle.microphone().enable(None).await.unwrap();
        assert!(h.session().is_mic_enabled);
        assert_eq!(produced_of(&h, MediaKind::Audio).len(), 2);
    });
}

#[test]
fn enabling_twice_keeps_one_producer() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;

        h.handle.microphone().enable(None).await.unwrap();

        assert_eq!(produced_of(&h, MediaKind::Audio).len(), 1);
        assert_eq!(h.devices.tracks().len(), 1);
    });
}

#[test]
fn microphone_without_input_device_is_reported() {
    run(async {
        let h = Harness::new();
        h.devices.set_microphone(false);

        h.join(&[]).await;

        assert!(matches!(
            h.errors().as_slice(),
            [RoomError::MediaDevices(MediaDevicesError::NotFound)],
        ));
        assert!(!h.session().is_mic_enabled);
        assert!(produced_of(&h, MediaKind::Audio).is_empty());

        h.devices.set_microphone(true);
        h.handle.microphone().enable(None).await.unwrap();
        assert!(h.session().is_mic_enabled);
    });
}

#[test]
fn changing_microphone_recaptures() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;
        let old = h.engine.device().send_transport().producer();

        h.handle
            .microphone()
            .set_device("usb-mic".into())
            .await
            .unwrap();

        assert!(old.is_closed());
        let mic = produced_of(&h, MediaKind::Audio);
        assert_eq!(mic.len(), 2);
        assert_eq!(
            mic[1].options.track.device_id().as_deref(),
            Some("usb-mic"),
        );
        let session = h.session();
        assert!(session.is_mic_enabled);
        assert_eq!(session.audio_input_device.as_deref(), Some("usb-mic"));
    });
}

#[test]
fn microphone_selected_before_join_is_captured() {
    run(async {
        let h = Harness::new();
        h.handle
            .microphone()
            .enable(Some("usb-mic".into()))
            .await
            .unwrap();
        assert!(h.devices.requests().is_empty());

        h.join(&[]).await;

        let audio = h.devices.requests()[0].audio.clone().unwrap();
        assert_eq!(audio.device_id.as_deref(), Some("usb-mic"));
    });
}

#[test]
fn webcam_intent_is_applied_on_join() {
    run(async {
        let h = Harness::new();
        h.handle.webcam().enable(None).await.unwrap();
        let session = h.session();
        assert!(session.is_webcam_on);
        assert!(!session.is_webcam_enabled);

        h.join(&[]).await;

        assert!(h.session().is_webcam_enabled);
        let webcam = produced_of(&h, MediaKind::Video);
        assert_eq!(webcam.len(), 1);
        let options = &webcam[0].options;
        assert_eq!(options.encodings.len(), 3);
        assert_eq!(options.codec, Some(VideoCodec::Vp8));
        assert!(!options.app_data.share);
        assert_eq!(
            options.codec_options.video_google_start_bitrate,
            Some(1000),
        );

        let video = h
            .devices
            .requests()
            .into_iter()
            .find_map(|r| r.video)
            .unwrap();
        assert_eq!(video.width, Some(1280));
        assert_eq!(video.height, Some(720));
        assert_eq!(video.frame_rate, Some(30));
    });
}

#[test]
fn vp9_device_publishes_svc_webcam() {
    run(async {
        let h = Harness::new();
        h.engine.set_codecs(vec![VideoCodec::Vp9]);
        h.handle.webcam().enable(None).await.unwrap();

        h.join(&[]).await;

        let webcam = produced_of(&h, MediaKind::Video);
        let encodings = &webcam[0].options.encodings;
        assert_eq!(encodings.len(), 1);
        assert_eq!(
            encodings[0].scalability_mode.as_deref(),
            Some("L3T3_KEY"),
        );
    });
}

#[test]
fn disabling_webcam_drops_intent() {
    run(async {
        let h = Harness::new();
        h.handle.webcam().enable(None).await.unwrap();
        h.join(&[]).await;
        let producer = produced_of(&h, MediaKind::Video)[0].producer.clone();

        h.handle.webcam().disable().unwrap();

        assert!(producer.is_closed());
        let session = h.session();
        assert!(!session.is_webcam_on);
        assert!(!session.is_webcam_enabled);
    });
}

#[test]
fn webcam_options_change_recreates_producer() {
    run(async {
        let h = Harness::new();
        h.handle.webcam().enable(None).await.unwrap();
        h.join(&[]).await;
        let old = produced_of(&h, MediaKind::Video)[0].producer.clone();

        h.handle
            .webcam()
            .set_options(VideoOptions {
                simulcast_streams: 1,
                ..VideoOptions::default()
            })
            .await
            .unwrap();

        assert!(old.is_closed());
        let webcam = produced_of(&h, MediaKind::Video);
        assert_eq!(webcam.len(), 2);
        assert_eq!(webcam[1].options.encodings.len(), 1);
        let session = h.session();
        assert!(session.is_webcam_enabled);
        assert_eq!(session.video_options.simulcast_streams, 1);
    });
}

#[test]
fn screenshare_is_produced_with_share_flag() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;

        h.handle.screenshare().enable(None).await.unwrap();

        assert!(h.session().is_screen_shared);
        let share = produced_of(&h, MediaKind::Video);
        assert_eq!(share.len(), 1);
        assert!(share[0].options.app_data.share);
        assert_eq!(share[0].options.encodings[0].dtx, Some(true));
        assert!(h.socket().commands().iter().any(|c| matches!(
            c,
            Command::Produce { app_data, .. } if app_data.share,
        )));

        h.handle.screenshare().disable().unwrap();
        assert!(!h.session().is_screen_shared);
        assert!(share[0].producer.is_closed());
    });
}

#[test]
fn screenshare_requires_video_capability() {
    run(async {
        let h = Harness::new();
        h.engine.set_can_produce_video(false);
        h.join(&[]).await;

        h.handle.screenshare().enable(None).await.unwrap();

        assert!(matches!(
            h.errors().as_slice(),
            [RoomError::Capability(MediaKind::Video)],
        ));
        assert!(!h.session().is_screen_shared);
        assert!(h
            .devices
            .tracks()
            .iter()
            .all(|t| t.kind() == MediaKind::Audio));
    });
}

#[test]
fn failed_webcam_enable_leaves_state_unchanged() {
    run(async {
        let h = Harness::new();
        h.engine.set_can_produce_video(false);
        h.join(&[]).await;
        let before = h.session();

        h.handle
            .webcam()
            .enable(Some(VideoOptions {
                simulcast_streams: 1,
                ..VideoOptions::default()
            }))
            .await
            .unwrap();

        assert!(matches!(
            h.errors().as_slice(),
            [RoomError::Capability(MediaKind::Video)],
        ));
        let session = h.session();
        assert!(!session.is_webcam_on);
        assert_eq!(session, before);
    });
}

#[test]
fn failed_microphone_capture_keeps_device_selection() {
    run(async {
        let h = Harness::new();
        h.devices.set_microphone(false);
        h.join(&[]).await;

        h.handle
            .microphone()
            .enable(Some("usb-mic".into()))
            .await
            .unwrap();

        assert!(matches!(
            h.errors().as_slice(),
            [
                RoomError::MediaDevices(MediaDevicesError::NotFound),
                RoomError::MediaDevices(MediaDevicesError::NotFound),
            ],
        ));
        let session = h.session();
        assert_eq!(session.audio_input_device, None);
        assert!(!session.is_mic_enabled);

        h.devices.set_microphone(true);
        h.handle
            .microphone()
            .enable(Some("usb-mic".into()))
            .await
            .unwrap();

        let session = h.session();
        assert_eq!(session.audio_input_device.as_deref(), Some("usb-mic"));
        assert!(session.is_mic_enabled);
    });
}

#[test]
fn ended_webcam_track_disables_webcam() {
    run(async {
        let h = Harness::new();
        h.handle.webcam().enable(None).await.unwrap();
        h.join(&[]).await;
        let producer = produced_of(&h, MediaKind::Video)[0].producer.clone();
        let track = h
            .devices
            .tracks()
            .into_iter()
            .find(|t| t.kind() == MediaKind::Video)
            .unwrap();
        drop(h.take_commands());

        track.end();

        assert!(producer.is_closed());
        let session = h.session();
        assert!(!session.is_webcam_on);
        assert!(!session.is_webcam_enabled);
        assert!(matches!(
            h.errors().as_slice(),
            [RoomError::TrackEnded(LocalMediaType::Webcam)],
        ));
        assert_eq!(
            h.take_commands(),
            vec![Command::ProducerClosed {
                producer_id: producer.id(),
            }],
        );
    });
}

#[test]
fn track_ended_while_producing_disables_webcam() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;
        let produce = h.engine.device().send_transport().hold_next_produce();
        let webcam = h.handle.webcam();
        let enabling = tokio::task::spawn_local(async move {
            webcam.enable(None).await.unwrap();
        });
        settle().await;
        let track = h
            .devices
            .tracks()
            .into_iter()
            .find(|t| t.kind() == MediaKind::Video)
            .unwrap();

        track.end();
        produce.send(()).unwrap();
        enabling.await.unwrap();

        let producer = produced_of(&h, MediaKind::Video)[0].producer.clone();
        assert!(producer.is_closed());
        assert!(track.is_stopped());
        let session = h.session();
        assert!(!session.is_webcam_on);
        assert!(!session.is_webcam_enabled);
        assert!(matches!(
            h.errors().as_slice(),
            [RoomError::TrackEnded(LocalMediaType::Webcam)],
        ));
    });
}

#[test]
fn disabling_during_enable_cancels_it() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;
        let capture = h.devices.hold_next_capture();
        let webcam = h.handle.webcam();
        let enabling = tokio::task::spawn_local(async move {
            webcam.enable(None).await.unwrap();
        });
        settle().await;

        h.handle.webcam().disable().unwrap();
        capture.send(()).unwrap();
        enabling.await.unwrap();

        assert!(produced_of(&h, MediaKind::Video).is_empty());
        let video = h
            .devices
            .tracks()
            .into_iter()
            .find(|t| t.kind() == MediaKind::Video)
            .unwrap();
        assert!(video.is_stopped());
        let session = h.session();
        assert!(!session.is_webcam_on);
        assert!(!session.is_webcam_enabled);

        h.handle.webcam().enable(None).await.unwrap();
        assert_eq!(produced_of(&h, MediaKind::Video).len(), 1);
    });
}

#[test]
fn producer_scores_are_kept_per_media_type() {
    run(async {
        let h = Harness::new();
        h.join(&[]).await;
        let producer = h.engine.device().send_transport().producer();
        let socket = h.socket();

        socket.send(Event::ProducerScore {
            producer_id: producer.id(),
            scores: vec![rpc::ProducerScore {
                score: 9,
                ..rpc::ProducerScore::default()
            }],
        });
        socket.send(Event::ProducerScore {
            producer_id: "unknown".into(),
            scores: vec![rpc::ProducerScore::default()],
        });
        settle().await;

        let scores = h.session().producer_scores;
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&LocalMediaType::Microphone][0].score, 9);

        h.handle.microphone().disable().unwrap();
        assert!(h.session().producer_scores.is_empty());
    });
}
