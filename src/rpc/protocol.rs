//! Messages exchanged over a signalling channel.

use async_trait::async_trait;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracerr::Traced;

use crate::{
    media::{MediaKind, ScalabilityMode},
    platform::AppData,
    utils::Responder,
};

use super::SignallingError;

/// ID of a room participant.
#[derive(
    Clone,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

/// ID of a server-side producer.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct ProducerId(pub String);

/// ID of a server-side consumer.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

impl ProducerId {
    /// Parses the server's acknowledgement of a [`Command::Produce`], which
    /// is either a bare ID string or an `{"id": ...}` object.
    ///
    /// # Errors
    ///
    /// With [`SignallingError::MalformedAck`] if the acknowledgement has
    /// neither of these shapes.
    pub fn from_ack(ack: Value) -> Result<Self, Traced<SignallingError>> {
        /// Shapes of a `produce` acknowledgement.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ProduceAck {
            Id(String),
            Object { id: String },
        }

        match serde_json::from_value(ack.clone()) {
            Ok(ProduceAck::Id(id)) | Ok(ProduceAck::Object { id }) => {
                Ok(Self(id))
            }
            Err(_) => Err(tracerr::new!(SignallingError::MalformedAck(
                ack.to_string()
            ))),
        }
    }
}

/// Command sent by this client to the server.
///
/// Serializes as `{"event": "<kebab-case name>", "args": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "args", rename_all = "kebab-case")]
pub enum Command {
    /// Local DTLS parameters of a transport to be connected.
    #[serde(rename_all = "camelCase")]
    ConnectTransport {
        transport_id: String,
        dtls_parameters: Value,
    },

    /// Request to create a server-side producer, acknowledged with its ID.
    #[serde(rename_all = "camelCase")]
    Produce {
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: AppData,
    },

    /// Capabilities of this client completing the handshake.
    #[serde(rename_all = "camelCase")]
    Config {
        device: String,
        capabilities: Value,
        sctp_capabilities: Value,
    },

    /// Consumers which playback was paused locally.
    #[serde(rename_all = "camelCase")]
    ConsumersPaused { consumer_ids: Vec<ConsumerId> },

    /// Consumers which playback was resumed locally.
    #[serde(rename_all = "camelCase")]
    ConsumersResumed { consumer_ids: Vec<ConsumerId> },

    /// Local producer was paused.
    #[serde(rename_all = "camelCase")]
    ProducerPaused { producer_id: ProducerId },

    /// Local producer was resumed.
    #[serde(rename_all = "camelCase")]
    ProducerResumed { producer_id: ProducerId },

    /// Local producer was closed.
    #[serde(rename_all = "camelCase")]
    ProducerClosed { producer_id: ProducerId },
}

/// Transport profile of a consumer.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    /// Single stream.
    #[display(fmt = "simple")]
    Simple,

    /// Several independent streams.
    #[display(fmt = "simulcast")]
    Simulcast,

    /// Single layered stream.
    #[display(fmt = "svc")]
    Svc,

    /// Router to router pipe.
    #[display(fmt = "pipe")]
    Pipe,
}

/// Parameters of a consumer the server asks this client to create.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSpec {
    /// Participant owning the consumed producer.
    pub participant_id: ParticipantId,

    /// Consumed remote producer.
    pub producer_id: ProducerId,

    /// ID of the server-side consumer.
    pub id: ConsumerId,

    /// Kind of the consumed media.
    pub kind: MediaKind,

    /// RTP parameters of the consumer.
    pub rtp_parameters: Value,

    /// Transport profile of the consumer.
    #[serde(rename = "type")]
    pub consumer_type: ConsumerType,

    /// Application data of the consumed producer.
    #[serde(default)]
    pub app_data: AppData,

    /// Indicates whether the consumed producer is paused.
    #[serde(default)]
    pub producer_paused: bool,
}

impl ConsumerSpec {
    /// Returns the negotiated codec name (`VP8`, `opus`), if any.
    #[must_use]
    pub fn codec(&self) -> Option<String> {
        let mime_type = self
            .rtp_parameters
            .get("codecs")?
            .get(0)?
            .get("mimeType")?
            .as_str()?;
        Some(mime_type.rsplit('/').next().unwrap_or(mime_type).to_owned())
    }

    /// Returns spatial and temporal layers of the first encoding.
    #[must_use]
    pub fn scalability_mode(&self) -> ScalabilityMode {
        ScalabilityMode::parse(
            self.rtp_parameters
                .get("encodings")
                .and_then(|e| e.get(0))
                .and_then(|e| e.get("scalabilityMode"))
                .and_then(Value::as_str),
        )
    }
}

/// Quality score of a consumer.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsumerScore {
    /// Score of the received stream (`0..=10`).
    pub score: u8,

    /// Score of the currently selected remote producer stream.
    pub producer_score: u8,

    /// Scores of all remote producer streams.
    pub producer_scores: Vec<u8>,
}

/// Quality score of a single stream of a local producer.
#[derive(
    Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(default, rename_all = "camelCase")]
pub struct ProducerScore {
    /// Index of the RTP encoding.
    pub encoding_idx: u8,

    /// SSRC of the stream.
    pub ssrc: u32,

    /// RID of the stream, if simulcast.
    pub rid: Option<String>,

    /// Score of the stream (`0..=10`).
    pub score: u8,
}

/// Event sent by the server to this client.
#[derive(Debug)]
pub enum Event {
    /// Server parameters to build a device and transports from.
    Config {
        router_rtp_capabilities: Value,
        producer_transport_options: Value,
        consumer_transport_options: Value,
    },

    /// This client became a full participant of the room.
    Joined {
        participant_ids: Vec<ParticipantId>,
        ack: Responder<()>,
    },

    /// Server asks to consume a remote producer, expecting whether it
    /// succeeded.
    MakeConsumer {
        spec: ConsumerSpec,
        callback: Responder<bool>,
    },

    /// Another participant joined the room.
    ParticipantJoined { participant_id: ParticipantId },

    /// Another participant left the room.
    ParticipantLeft { participant_id: ParticipantId },

    /// Consumer was closed by the server.
    ConsumerClosed { consumer_id: ConsumerId },

    /// Remote producer of a consumer was paused.
    ConsumerPaused { consumer_id: ConsumerId },

    /// Remote producer of a consumer was resumed.
    ConsumerResumed { consumer_id: ConsumerId },

    /// Layers received by a consumer changed.
    ConsumerLayersChanged {
        consumer_id: ConsumerId,
        spatial: Option<u8>,
        temporal: Option<u8>,
    },

    /// Quality score of a consumer changed.
    ConsumerScore {
        consumer_id: ConsumerId,
        score: ConsumerScore,
    },

    /// Quality scores of a local producer changed.
    ProducerScore {
        producer_id: ProducerId,
        scores: Vec<ProducerScore>,
    },

    /// Channel failed to connect or lost its connection.
    ConnectError { reason: String },

    /// Server reported an error.
    Error { message: String, status: u16 },
}

/// Handler of [`Event`]s, having one method per [`Event`] variant.
///
/// [`Event::dispatch_with()`] calls the method matching the [`Event`].
#[async_trait(?Send)]
pub trait EventHandler {
    /// Result of handling an [`Event`].
    type Output;

    /// Handles [`Event::Config`].
    async fn on_config(
        &self,
        router_rtp_capabilities: Value,
        producer_transport_options: Value,
        consumer_transport_options: Value,
    ) -> Self::Output;

    /// Handles [`Event::Joined`].
    async fn on_joined(
        &self,
        participant_ids: Vec<ParticipantId>,
        ack: Responder<()>,
    ) -> Self::Output;

    /// Handles [`Event::MakeConsumer`].
    async fn on_make_consumer(
        &self,
        spec: ConsumerSpec,
        callback: Responder<bool>,
    ) -> Self::Output;

    /// Handles [`Event::ParticipantJoined`].
    async fn on_participant_joined(
        &self,
        participant_id: ParticipantId,
    ) -> Self::Output;

    /// Handles [`Event::ParticipantLeft`].
    async fn on_participant_left(
        &self,
        participant_id: ParticipantId,
    ) -> Self::Output;

    /// Handles [`Event::ConsumerClosed`].
    async fn on_consumer_closed(&self, consumer_id: ConsumerId)
        -> Self::Output;

    /// Handles [`Event::ConsumerPaused`].
    async fn on_consumer_paused(&self, consumer_id: ConsumerId)
        -> Self::Output;

    /// Handles [`Event::ConsumerResumed`].
    async fn on_consumer_resumed(
        &self,
        consumer_id: ConsumerId,
    ) -> Self::Output;

    /// Handles [`Event::ConsumerLayersChanged`].
    async fn on_consumer_layers_changed(
        &self,
        consumer_id: ConsumerId,
        spatial: Option<u8>,
        temporal: Option<u8>,
    ) -> Self::Output;

    /// Handles [`Event::ConsumerScore`].
    async fn on_consumer_score(
        &self,
        consumer_id: ConsumerId,
        score: ConsumerScore,
    ) -> Self::Output;

    /// Handles [`Event::ProducerScore`].
    async fn on_producer_score(
        &self,
        producer_id: ProducerId,
        scores: Vec<ProducerScore>,
    ) -> Self::Output;

    /// Handles [`Event::ConnectError`].
    async fn on_connect_error(&self, reason: String) -> Self::Output;

    /// Handles [`Event::Error`].
    async fn on_error(&self, message: String, status: u16) -> Self::Output;
}

impl Event {
    /// Dispatches this [`Event`] to the matching [`EventHandler`] method.
    pub async fn dispatch_with<T>(self, handler: &T) -> T::Output
    where
        T: EventHandler,
    {
        match self {
            Self::Config {
                router_rtp_capabilities,
                producer_transport_options,
                consumer_transport_options,
            } => {
                handler
                    .on_config(
                        router_rtp_capabilities,
                        producer_transport_options,
                        consumer_transport_options,
                    )
                    .await
            }
            Self::Joined {
                participant_ids,
                ack,
            } => handler.on_joined(participant_ids, ack).await,
            Self::MakeConsumer { spec, callback } => {
                handler.on_make_consumer(spec, callback).await
            }
            Self::ParticipantJoined { participant_id } => {
                handler.on_participant_joined(participant_id).await
            }
            Self::ParticipantLeft { participant_id } => {
                handler.on_participant_left(participant_id).await
            }
            Self::ConsumerClosed { consumer_id } => {
                handler.on_consumer_closed(consumer_id).await
            }
            Self::ConsumerPaused { consumer_id } => {
                handler.on_consumer_paused(consumer_id).await
            }
            Self::ConsumerResumed { consumer_id } => {
                handler.on_consumer_resumed(consumer_id).await
            }
            Self::ConsumerLayersChanged {
                consumer_id,
                spatial,
                temporal,
            } => {
                handler
                    .on_consumer_layers_changed(consumer_id, spatial, temporal)
                    .await
            }
            Self::ConsumerScore { consumer_id, score } => {
                handler.on_consumer_score(consumer_id, score).await
            }
            Self::ProducerScore {
                producer_id,
                scores,
            } => handler.on_producer_score(producer_id, scores).await,
            Self::ConnectError { reason } => {
                handler.on_connect_error(reason).await
            }
            Self::Error { message, status } => {
                handler.on_error(message, status).await
            }
        }
    }
}
