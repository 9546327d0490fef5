//! Snapshot of an RTC session as observed by the UI.

use std::collections::HashMap;

use smart_default::SmartDefault;

use crate::{
    media::{LocalMediaType, MediaSlot, VideoOptions},
    rpc::{
        ConsumerId, ConsumerScore, ConsumerSpec, ConsumerType, ParticipantId,
        ProducerScore,
    },
};

/// Playback volume of a newly joined participant.
pub const DEFAULT_VOLUME: u8 = 100;

/// State of the single active room membership.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    /// Room this client is connected (or connecting) to.
    pub room_id: Option<String>,

    /// Domain of the [`Session::room_id`].
    pub domain_id: Option<String>,

    /// Signalling server endpoint of the session.
    pub server_endpoint: String,

    /// Server has acknowledged this client as a full participant.
    pub joined: bool,

    /// Other participants of the room.
    pub participants: HashMap<ParticipantId, Participant>,

    /// Webcam should be active. Honoured on the next join.
    pub is_webcam_on: bool,

    /// Microphone should be muted.
    pub is_mic_muted: bool,

    /// All the remote audio should be paused.
    pub is_deafened: bool,

    /// Selected microphone. The default one if [`None`].
    pub audio_input_device: Option<String>,

    /// Webcam publishing preferences.
    pub video_options: VideoOptions,

    /// Webcam producer exists.
    pub is_webcam_enabled: bool,

    /// Microphone producer exists.
    pub is_mic_enabled: bool,

    /// Screen sharing producer exists.
    pub is_screen_shared: bool,

    /// Latest quality scores of the local producers.
    pub producer_scores: HashMap<LocalMediaType, Vec<ProducerScore>>,
}

impl Session {
    /// Returns a fresh [`Session`] for the provided room, carrying over local
    /// intents (webcam-on, mute, deafen, device selection and video
    /// preferences) of this one.
    #[must_use]
    pub fn reconnecting(&self, room_id: String, domain_id: String) -> Self {
        Self {
            room_id: Some(room_id),
            domain_id: Some(domain_id),
            server_endpoint: self.server_endpoint.clone(),
            is_webcam_on: self.is_webcam_on,
            is_mic_muted: self.is_mic_muted,
            is_deafened: self.is_deafened,
            audio_input_device: self.audio_input_device.clone(),
            video_options: self.video_options.clone(),
            ..Self::default()
        }
    }

    /// Clears everything tied to live resources, keeping the room identity
    /// and local intents.
    pub fn detach(&mut self) {
        self.joined = false;
        self.participants.clear();
        self.is_webcam_enabled = false;
        self.is_mic_enabled = false;
        self.is_screen_shared = false;
        self.producer_scores.clear();
    }

    /// Indicates whether this [`Session`] targets the provided room.
    #[must_use]
    pub fn is_room(&self, room_id: &str, domain_id: &str) -> bool {
        self.room_id.as_deref() == Some(room_id)
            && self.domain_id.as_deref() == Some(domain_id)
    }

    /// Returns the runtime flag reflecting existence of a producer of the
    /// provided [`LocalMediaType`].
    pub fn producing_mut(&mut self, kind: LocalMediaType) -> &mut bool {
        match kind {
            LocalMediaType::Microphone => &mut self.is_mic_enabled,
            LocalMediaType::Webcam => &mut self.is_webcam_enabled,
            LocalMediaType::Screenshare => &mut self.is_screen_shared,
        }
    }

    /// Looks up the [`ConsumerInfo`] with the provided ID in the provided
    /// participant's slots.
    pub fn consumer_mut(
        &mut self,
        participant_id: &ParticipantId,
        consumer_id: &ConsumerId,
    ) -> Option<&mut ConsumerInfo> {
        self.participants
            .get_mut(participant_id)?
            .consumer_mut(consumer_id)
    }
}

/// Another participant of the room.
#[derive(Clone, Debug, PartialEq, SmartDefault)]
pub struct Participant {
    /// ID of this participant.
    pub id: ParticipantId,

    /// Local playback volume (`0..=100`).
    #[default(DEFAULT_VOLUME)]
    pub volume: u8,

    /// Microphone audio consumer.
    pub audio: Option<ConsumerInfo>,

    /// Webcam video consumer.
    pub video: Option<ConsumerInfo>,

    /// Screen sharing video consumer.
    pub share: Option<ConsumerInfo>,
}

impl Participant {
    /// Creates a new [`Participant`] with no consumers and the default
    /// volume.
    #[must_use]
    pub fn new(id: ParticipantId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Returns the provided consumer slot.
    #[must_use]
    pub fn slot(&self, slot: MediaSlot) -> Option<&ConsumerInfo> {
        match slot {
            MediaSlot::Audio => self.audio.as_ref(),
            MediaSlot::Video => self.video.as_ref(),
            MediaSlot::Share => self.share.as_ref(),
        }
    }

    /// Returns the provided consumer slot for modification.
    pub fn slot_mut(&mut self, slot: MediaSlot) -> &mut Option<ConsumerInfo> {
        match slot {
            MediaSlot::Audio => &mut self.audio,
            MediaSlot::Video => &mut self.video,
            MediaSlot::Share => &mut self.share,
        }
    }

    /// Returns the slot holding the consumer with the provided ID.
    #[must_use]
    pub fn slot_of(&self, consumer_id: &ConsumerId) -> Option<MediaSlot> {
        MediaSlot::ALL.iter().copied().find(|slot| {
            self.slot(*slot).map_or(false, |info| &info.id == consumer_id)
        })
    }

    /// Looks up the consumer with the provided ID in the slots.
    pub fn consumer_mut(
        &mut self,
        consumer_id: &ConsumerId,
    ) -> Option<&mut ConsumerInfo> {
        let slot = self.slot_of(consumer_id)?;
        self.slot_mut(slot).as_mut()
    }

    /// Empties the slot holding the consumer with the provided ID.
    ///
    /// Returns `false` if no slot holds it.
    pub fn clear_consumer(&mut self, consumer_id: &ConsumerId) -> bool {
        match self.slot_of(consumer_id) {
            Some(slot) => self.slot_mut(slot).take().is_some(),
            None => false,
        }
    }
}

/// Negotiated state of a remote consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerInfo {
    /// ID of the consumer.
    pub id: ConsumerId,

    /// Transport profile of the consumer.
    pub kind: ConsumerType,

    /// Negotiated codec name.
    pub codec: Option<String>,

    /// Layers of the consumed stream.
    pub scalability: Scalability,

    /// Pause state of the consumer.
    pub paused: Paused,

    /// Latest quality score.
    pub score: Option<ConsumerScore>,
}

impl ConsumerInfo {
    /// Builds a [`ConsumerInfo`] from the server's [`ConsumerSpec`].
    #[must_use]
    pub fn from_spec(spec: &ConsumerSpec) -> Self {
        let mode = spec.scalability_mode();
        Self {
            id: spec.id.clone(),
            kind: spec.consumer_type,
            codec: spec.codec(),
            scalability: Scalability {
                spatial: Layers::new(mode.spatial_layers),
                temporal: Layers::new(mode.temporal_layers),
            },
            paused: Paused {
                local: false,
                remote: spec.producer_paused,
            },
            score: None,
        }
    }

    /// Indicates whether nothing is played back.
    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.local || self.paused.remote
    }
}

/// Spatial and temporal layers of a consumed stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Scalability {
    /// Resolution layers.
    pub spatial: Layers,

    /// Frame rate layers.
    pub temporal: Layers,
}

/// Layers of one dimension of a consumed stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Layers {
    /// Number of available layers.
    pub total: u8,

    /// Layer requested on creation (the highest one).
    pub preferred: u8,

    /// Layer currently received. [`None`] until the server reports it.
    pub current: Option<u8>,
}

impl Layers {
    /// Creates [`Layers`] preferring the highest of `total` ones.
    #[must_use]
    pub fn new(total: u8) -> Self {
        Self {
            total,
            preferred: total.saturating_sub(1),
            current: None,
        }
    }
}

/// Independent pause flags of a consumer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Paused {
    /// Paused by a local action (mute, deafen, zero volume).
    pub local: bool,

    /// Remote producer is paused.
    pub remote: bool,
}
