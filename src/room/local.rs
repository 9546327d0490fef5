//! Production of the local media: microphone, webcam and screen sharing.

use std::{cell::Cell, rc::Rc};

use tracerr::Traced;

use crate::{
    media::{
        encodings, CodecOptions, LocalMediaType, MediaKind, VideoOptions,
    },
    platform::{
        AppData, AudioConstraints, Device, DisplayMediaConstraints,
        MediaDevicesError, MediaStreamConstraints, MediaStreamTrack,
        ProducerOptions, Transport, VideoConstraints,
    },
    rpc::Command,
    session::{ProducerReservation, Session},
};

use super::{InnerRoom, RoomError};

impl InnerRoom {
    /// Starts producing the microphone audio.
    ///
    /// The provided device becomes the selected one once the producer is
    /// created, or right away if not joined yet.
    pub(super) async fn enable_microphone(
        self: &Rc<Self>,
        device_id: Option<String>,
    ) -> Result<(), Traced<RoomError>> {
        if !self.store.borrow().joined {
            if let Some(device_id) = device_id {
                self.store.update(|s| s.audio_input_device = Some(device_id));
            }
            log::debug!("Not joined, microphone is enabled on join");
            return Ok(());
        }
        let reservation = match self
            .resources
            .reserve_producer(LocalMediaType::Microphone)
        {
            Ok(reservation) => reservation,
            Err(e) => {
                log::debug!("Microphone is not enabled: {}", e);
                return Ok(());
            }
        };
        let (_, transport) = self.producing_transport(MediaKind::Audio)?;

        let device_id = device_id
            .or_else(|| self.store.borrow().audio_input_device.clone());
        let track = self
            .capture_user_media(
                MediaStreamConstraints {
                    audio: Some(AudioConstraints {
                        device_id: device_id.clone(),
                    }),
                    video: None,
                },
                MediaKind::Audio,
            )
            .await?;

        self.produce(
            LocalMediaType::Microphone,
            reservation,
            &transport,
            ProducerOptions {
                track,
                encodings: Vec::new(),
                codec_options: self.conf.media.microphone.codec_options(),
                codec: None,
                app_data: AppData::default(),
            },
            |s| s.audio_input_device = device_id,
        )
        .await
    }

    /// Pauses or resumes the microphone producer, remembering the choice for
    /// the producers created later.
    pub(super) fn set_mic_muted(&self, muted: bool) {
        self.store.update(|s| s.is_mic_muted = muted);

        let producer =
            match self.resources.producer(LocalMediaType::Microphone) {
                Some(producer) => producer,
                None => return,
            };
        if producer.is_paused() == muted {
            return;
        }
        let producer_id = producer.id();
        if muted {
            producer.pause();
            self.emit(Command::ProducerPaused { producer_id });
        } else {
            producer.resume();
            self.emit(Command::ProducerResumed { producer_id });
        }
    }

    /// Selects the microphone, recapturing if it's enabled.
    pub(super) async fn set_microphone_device(
        self: &Rc<Self>,
        device_id: String,
    ) -> Result<(), Traced<RoomError>> {
        self.store.update(|s| s.audio_input_device = Some(device_id));
        if self.resources.producer(LocalMediaType::Microphone).is_none() {
            return Ok(());
        }
        self.disable_producer(LocalMediaType::Microphone);
        self.enable_microphone(None).await
    }

    /// Starts producing the webcam video.
    ///
    /// The intent and the provided preferences are recorded once the
    /// producer is created, or right away if not joined yet.
    pub(super) async fn enable_webcam(
        self: &Rc<Self>,
        options: Option<VideoOptions>,
    ) -> Result<(), Traced<RoomError>> {
        if !self.store.borrow().joined {
            self.store.update(|s| {
                s.is_webcam_on = true;
                if let Some(options) = options {
                    s.video_options = options;
                }
            });
            log::debug!("Not joined, webcam is enabled on join");
            return Ok(());
        }
        let reservation =
            match self.resources.reserve_producer(LocalMediaType::Webcam) {
                Ok(reservation) => reservation,
                Err(e) => {
                    log::debug!("Webcam is not enabled: {}", e);
                    return Ok(());
                }
            };
        let (device, transport) = self.producing_transport(MediaKind::Video)?;

        let options = options
            .unwrap_or_else(|| self.store.borrow().video_options.clone());
        let codecs = device.video_codecs();
        let (strategy, encodings) =
            encodings::webcam_encodings(&options, &codecs);
        let codec = encodings::effective_codec(&options, &codecs).cloned();
        log::debug!("Webcam {:?} is encoded with {:?}", codec, strategy);

        let track = self
            .capture_user_media(
                MediaStreamConstraints {
                    audio: None,
                    video: Some(VideoConstraints {
                        device_id: None,
                        width: Some(options.resolution.width),
                        height: Some(options.resolution.height),
                        frame_rate: Some(options.frame_rate),
                    }),
                },
                MediaKind::Video,
            )
            .await?;

        self.produce(
            LocalMediaType::Webcam,
            reservation,
            &transport,
            ProducerOptions {
                track,
                encodings,
                codec_options: CodecOptions::webcam(),
                codec,
                app_data: AppData { share: false },
            },
            |s| {
                s.is_webcam_on = true;
                s.video_options = options;
            },
        )
        .await
    }

    /// Stops producing the webcam video and drops the intent to have it on.
    pub(super) fn disable_webcam(&self) {
        self.store.update(|s| s.is_webcam_on = false);
        self.disable_producer(LocalMediaType::Webcam);
    }

    /// Replaces the video preferences, recreating the webcam producer if
    /// it's enabled.
    pub(super) async fn set_webcam_options(
        self: &Rc<Self>,
        options: VideoOptions,
    ) -> Result<(), Traced<RoomError>> {
        self.store.update(|s| s.video_options = options);
        if self.resources.producer(LocalMediaType::Webcam).is_none() {
            return Ok(());
        }
        self.disable_producer(LocalMediaType::Webcam);
        self.enable_webcam(None).await
    }

    /// Starts producing a display capture.
    pub(super) async fn enable_screenshare(
        self: &Rc<Self>,
        constraints: Option<VideoConstraints>,
    ) -> Result<(), Traced<RoomError>> {
        let reservation = match self
            .resources
            .reserve_producer(LocalMediaType::Screenshare)
        {
            Ok(reservation) => reservation,
            Err(e) => {
                log::debug!("Screen sharing is not enabled: {}", e);
                return Ok(());
            }
        };
        let (device, transport) = self.producing_transport(MediaKind::Video)?;

        let codecs = device.video_codecs();
        let encodings = encodings::screenshare_encodings(
            self.conf.media.screenshare_max_bitrate,
            &codecs,
        );

        let tracks = self
            .media_devices
            .get_display_media(DisplayMediaConstraints {
                video: constraints.unwrap_or_default(),
            })
            .await
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        let track = take_track(tracks, MediaKind::Video)?;

        self.produce(
            LocalMediaType::Screenshare,
            reservation,
            &transport,
            ProducerOptions {
                track,
                encodings,
                codec_options: CodecOptions::default(),
                codec: codecs.first().cloned(),
                app_data: AppData { share: true },
            },
            |_| {},
        )
        .await
    }

    /// Closes the producer of the provided [`LocalMediaType`] and stops its
    /// track. Cancels its creation if it's in progress.
    pub(super) fn disable_producer(&self, kind: LocalMediaType) {
        if let Some(producer) = self.resources.take_producer(kind) {
            producer.close();
            producer.track().stop();
            log::info!("{} producer {} is closed", kind, producer.id());
            self.emit(Command::ProducerClosed {
                producer_id: producer.id(),
            });
        }
        self.store.update(|s| {
            *s.producing_mut(kind) = false;
            drop(s.producer_scores.remove(&kind));
        });
    }

    /// Disables the producer whose track has ended on its own and notifies
    /// about it.
    ///
    /// No-op unless the live producer of this kind sends the ended track.
    fn on_track_ended(&self, kind: LocalMediaType, track_id: &str) {
        let is_current = self
            .resources
            .producer(kind)
            .map_or(false, |p| p.track().id() == track_id);
        if !is_current {
            return;
        }
        match kind {
            LocalMediaType::Webcam => self.disable_webcam(),
            LocalMediaType::Microphone | LocalMediaType::Screenshare => {
                self.disable_producer(kind);
            }
        }
        self.report(tracerr::new!(RoomError::TrackEnded(kind)));
    }

    /// Returns the loaded [`Device`] and the sending [`Transport`], if media
    /// of the provided kind can be produced.
    fn producing_transport(
        &self,
        kind: MediaKind,
    ) -> Result<(Rc<dyn Device>, Rc<dyn Transport>), Traced<RoomError>> {
        let device = self
            .resources
            .device()
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        if !device.can_produce(kind) {
            return Err(tracerr::new!(RoomError::Capability(kind)));
        }
        let transport = self
            .resources
            .send_transport()
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        Ok((device, transport))
    }

    /// Captures a single track of the provided kind from a microphone or a
    /// camera.
    async fn capture_user_media(
        &self,
        constraints: MediaStreamConstraints,
        kind: MediaKind,
    ) -> Result<Rc<dyn MediaStreamTrack>, Traced<RoomError>> {
        let tracks = self
            .media_devices
            .get_user_media(constraints)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))?;
        take_track(tracks, kind)
    }

    /// Creates a producer of the captured track and puts it into the
    /// reserved slot, applying `on_commit` to the [`Session`] along with it.
    ///
    /// The track and the producer are discarded if the reservation has been
    /// revoked meanwhile (by a disable or a disconnect).
    async fn produce<F>(
        self: &Rc<Self>,
        kind: LocalMediaType,
        reservation: ProducerReservation<'_>,
        transport: &Rc<dyn Transport>,
        options: ProducerOptions,
        on_commit: F,
    ) -> Result<(), Traced<RoomError>>
    where
        F: FnOnce(&mut Session),
    {
        let track = Rc::clone(&options.track);
        if !reservation.is_valid() {
            log::debug!("Enabling {} is cancelled", kind);
            track.stop();
            return Ok(());
        }

        let track_id = track.id();
        let ended = Rc::new(Cell::new(false));
        {
            let weak = Rc::downgrade(self);
            let ended = Rc::clone(&ended);
            let track_id = track_id.clone();
            track.on_ended(Box::new(move || {
                ended.set(true);
                if let Some(inner) = weak.upgrade() {
                    inner.on_track_ended(kind, &track_id);
                }
            }));
        }

        let producer = match transport
            .produce(options)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> RoomError))
        {
            Ok(producer) => producer,
            Err(e) => {
                track.stop();
                return Err(e);
            }
        };

        let epoch = reservation.epoch();
        if let Err(producer) = reservation.commit(Rc::clone(&producer)) {
            log::debug!("Enabling {} is cancelled", kind);
            producer.close();
            track.stop();
            if self.resources.is_current(epoch) {
                self.emit(Command::ProducerClosed {
                    producer_id: producer.id(),
                });
            }
            return Ok(());
        }
        self.store.update(|s| {
            *s.producing_mut(kind) = true;
            on_commit(s);
        });

        let producer_id = producer.id();
        log::info!("{} producer {} is created", kind, producer_id);
        if ended.get() {
            self.on_track_ended(kind, &track_id);
            return Ok(());
        }

        let is_muted = self.store.borrow().is_mic_muted;
        if kind == LocalMediaType::Microphone && is_muted {
            producer.pause();
            self.emit(Command::ProducerPaused { producer_id });
        }
        Ok(())
    }
}

/// Picks the first track of the provided kind, stopping all the others.
fn take_track(
    tracks: Vec<Rc<dyn MediaStreamTrack>>,
    kind: MediaKind,
) -> Result<Rc<dyn MediaStreamTrack>, Traced<RoomError>> {
    let mut found = None;
    for track in tracks {
        if found.is_none() && track.kind() == kind {
            found = Some(track);
        } else {
            track.stop();
        }
    }
    found.ok_or_else(|| {
        tracerr::new!(RoomError::MediaDevices(MediaDevicesError::NotFound))
    })
}
