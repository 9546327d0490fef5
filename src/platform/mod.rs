//! Interfaces of the media engine and media capture this client orchestrates.
//!
//! Media engine objects (device, transports, producers, consumers) and
//! captured tracks are treated as opaque capability objects. Their negotiated
//! parameters are passed around as raw [`serde_json::Value`]s, as nothing here
//! interprets them.

use std::{future::Future, rc::Rc, time::Duration};

use async_trait::async_trait;
use derive_more::Display;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracerr::Traced;

use crate::{
    media::{CodecOptions, MediaKind, RtpEncoding, VideoCodec},
    rpc::{ConsumerId, ProducerId, SignallingError},
};

/// Spawns a new asynchronous task on the current thread.
///
/// Must be called from within a [`tokio::task::LocalSet`].
#[inline]
pub fn spawn<F>(task: F)
where
    F: Future<Output = ()> + 'static,
{
    drop(tokio::task::spawn_local(task));
}

/// Error of a future not being resolved in time.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Timed out after {:?}", _0)]
pub struct TimedOut(pub Duration);

/// Resolves the provided `future`, or errors if it's not resolved within the
/// given `duration`.
///
/// # Errors
///
/// With [`TimedOut`] if the `duration` elapses first.
pub async fn timeout<F>(
    duration: Duration,
    future: F,
) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimedOut(duration))
}

/// Failure of acquiring a media track from a capture device.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum MediaDevicesError {
    /// No capture device matches the request.
    #[display(fmt = "Requested capture device is not found")]
    NotFound,

    /// User or system denied the capture.
    #[display(fmt = "Permission to capture media is denied")]
    PermissionDenied,

    /// No capture device satisfies the requested constraint.
    #[display(fmt = "Capture constraint `{}` cannot be satisfied", _0)]
    Overconstrained(String),

    /// Any other capture failure.
    #[display(fmt = "Failed to capture media: {}", _0)]
    Other(String),
}

/// Failure of a media engine operation.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Media engine error: {}", _0)]
pub struct EngineError(pub String);

impl EngineError {
    /// Creates a new [`EngineError`] with the provided description.
    #[inline]
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

/// Application data attached to a producer and forwarded by the server to its
/// consumers.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[serde(default)]
pub struct AppData {
    /// Video is a screen share rather than a webcam.
    pub share: bool,
}

/// Constraints of a [`MediaDevices::get_user_media()`] request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MediaStreamConstraints {
    /// Audio track request, if any.
    pub audio: Option<AudioConstraints>,

    /// Video track request, if any.
    pub video: Option<VideoConstraints>,
}

/// Constraints of a requested audio track.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AudioConstraints {
    /// Exact device to capture from. Any device if [`None`].
    pub device_id: Option<String>,
}

/// Constraints of a requested video track.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VideoConstraints {
    /// Exact device to capture from. Any device if [`None`].
    pub device_id: Option<String>,

    /// Ideal width in pixels.
    pub width: Option<u32>,

    /// Ideal height in pixels.
    pub height: Option<u32>,

    /// Ideal frame rate.
    pub frame_rate: Option<u32>,
}

/// Constraints of a [`MediaDevices::get_display_media()`] request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DisplayMediaConstraints {
    /// Display video request.
    pub video: VideoConstraints,
}

/// Kind of a [`InputDeviceInfo`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum InputDeviceKind {
    /// Microphone.
    #[display(fmt = "audioinput")]
    AudioInput,

    /// Camera.
    #[display(fmt = "videoinput")]
    VideoInput,
}

/// Description of a capture device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputDeviceInfo {
    /// Unique identifier of the device.
    pub device_id: String,

    /// Kind of the device.
    pub kind: InputDeviceKind,

    /// Human readable label of the device.
    pub label: String,
}

/// Source of local media tracks.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Captures tracks from a microphone and/or camera.
    async fn get_user_media(
        &self,
        constraints: MediaStreamConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Traced<MediaDevicesError>>;

    /// Captures tracks from a display.
    async fn get_display_media(
        &self,
        constraints: DisplayMediaConstraints,
    ) -> Result<Vec<Rc<dyn MediaStreamTrack>>, Traced<MediaDevicesError>>;

    /// Lists available capture devices.
    async fn enumerate_devices(
        &self,
    ) -> Result<Vec<InputDeviceInfo>, Traced<MediaDevicesError>>;
}

/// Captured local media track.
pub trait MediaStreamTrack {
    /// Unique identifier of this track.
    fn id(&self) -> String;

    /// Kind of this track.
    fn kind(&self) -> MediaKind;

    /// Identifier of the device this track is captured from.
    fn device_id(&self) -> Option<String>;

    /// Stops capturing. Doesn't invoke an [`MediaStreamTrack::on_ended()`]
    /// callback.
    fn stop(&self);

    /// Sets a callback invoked once the track ends on its own (device
    /// unplugged, capture revoked).
    fn on_ended(&self, f: Box<dyn FnOnce()>);
}

/// Factory of media engine [`Device`]s.
pub trait MediaEngine {
    /// Creates a new not loaded [`Device`].
    ///
    /// # Errors
    ///
    /// If the current environment is not supported by the media engine.
    fn new_device(&self) -> Result<Rc<dyn Device>, Traced<EngineError>>;
}

/// Media engine endpoint negotiated with the server's router.
#[async_trait(?Send)]
pub trait Device {
    /// Name of the engine handler in use.
    fn handler_name(&self) -> String;

    /// Loads this [`Device`] with the router's RTP capabilities.
    async fn load(
        &self,
        router_rtp_capabilities: Value,
    ) -> Result<(), Traced<EngineError>>;

    /// Indicates whether media of the provided `kind` can be sent to the
    /// router. `false` until [`Device::load()`]ed.
    fn can_produce(&self, kind: MediaKind) -> bool;

    /// Effective RTP capabilities of this loaded [`Device`].
    fn rtp_capabilities(&self) -> Value;

    /// SCTP capabilities of this [`Device`].
    fn sctp_capabilities(&self) -> Value;

    /// Video codecs both this [`Device`] and the router support, in the
    /// order of preference.
    fn video_codecs(&self) -> Vec<VideoCodec>;

    /// Creates a [`Transport`] for sending media.
    fn create_send_transport(
        &self,
        options: Value,
    ) -> Result<Rc<dyn Transport>, Traced<EngineError>>;

    /// Creates a [`Transport`] for receiving media.
    fn create_recv_transport(
        &self,
        options: Value,
    ) -> Result<Rc<dyn Transport>, Traced<EngineError>>;
}

/// Handler of a [`Transport`]'s `connect` event, receiving local DTLS
/// parameters.
///
/// Resolving to [`Ok`] completes the transport connection, resolving to
/// [`Err`] fails it.
pub type ConnectHandler = Box<
    dyn Fn(
        Value,
    ) -> LocalBoxFuture<'static, Result<(), Traced<SignallingError>>>,
>;

/// Handler of a sending [`Transport`]'s `produce` event, resolving to the
/// identifier of the server-side producer.
pub type ProduceHandler = Box<
    dyn Fn(
        ProduceParameters,
    ) -> LocalBoxFuture<'static, Result<ProducerId, Traced<SignallingError>>>,
>;

/// Parameters of a `produce` event of a sending [`Transport`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProduceParameters {
    /// Kind of the produced media.
    pub kind: MediaKind,

    /// Negotiated RTP parameters.
    pub rtp_parameters: Value,

    /// Application data of the producer.
    pub app_data: AppData,
}

/// Options of a [`Transport::produce()`] call.
#[derive(Clone)]
pub struct ProducerOptions {
    /// Track to be sent.
    pub track: Rc<dyn MediaStreamTrack>,

    /// RTP encodings. Empty means the engine defaults.
    pub encodings: Vec<RtpEncoding>,

    /// Codec specific options.
    pub codec_options: CodecOptions,

    /// Codec to be used. The engine chooses if [`None`].
    pub codec: Option<VideoCodec>,

    /// Application data of the producer.
    pub app_data: AppData,
}

/// Options of a [`Transport::consume()`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerOptions {
    /// Identifier of the server-side consumer.
    pub id: ConsumerId,

    /// Identifier of the consumed remote producer.
    pub producer_id: ProducerId,

    /// Kind of the consumed media.
    pub kind: MediaKind,

    /// RTP parameters provided by the server.
    pub rtp_parameters: Value,

    /// Application data of the remote producer.
    pub app_data: AppData,
}

/// Media engine transport connected to the server.
#[async_trait(?Send)]
pub trait Transport {
    /// Identifier of this [`Transport`].
    fn id(&self) -> String;

    /// Starts sending the provided track.
    ///
    /// Triggers [`ProduceHandler`] (and [`ConnectHandler`] on the first
    /// call).
    async fn produce(
        &self,
        options: ProducerOptions,
    ) -> Result<Rc<dyn Producer>, Traced<EngineError>>;

    /// Starts receiving a remote producer's media.
    ///
    /// Triggers [`ConnectHandler`] on the first call.
    async fn consume(
        &self,
        options: ConsumerOptions,
    ) -> Result<Rc<dyn Consumer>, Traced<EngineError>>;

    /// Sets the handler of the `connect` event.
    fn on_connect(&self, handler: ConnectHandler);

    /// Sets the handler of the `produce` event.
    fn on_produce(&self, handler: ProduceHandler);

    /// Closes this [`Transport`] along with all its producers and consumers.
    fn close(&self);
}

/// Local media being sent to the server.
#[cfg_attr(test, mockall::automock)]
pub trait Producer {
    /// Identifier of the server-side producer.
    fn id(&self) -> ProducerId;

    /// Kind of the produced media.
    fn kind(&self) -> MediaKind;

    /// Track being sent.
    fn track(&self) -> Rc<dyn MediaStreamTrack>;

    /// Pauses sending.
    fn pause(&self);

    /// Resumes sending.
    fn resume(&self);

    /// Stops sending. Doesn't stop the [`Producer::track()`].
    fn close(&self);

    /// Indicates whether this [`Producer`] is closed.
    fn is_closed(&self) -> bool;

    /// Indicates whether this [`Producer`] is paused.
    fn is_paused(&self) -> bool;
}

/// Remote media being received from the server.
pub trait Consumer {
    /// Identifier of the server-side consumer.
    fn id(&self) -> ConsumerId;

    /// Identifier of the consumed remote producer.
    fn producer_id(&self) -> ProducerId;

    /// Kind of the consumed media.
    fn kind(&self) -> MediaKind;

    /// Pauses playback.
    fn pause(&self);

    /// Resumes playback.
    fn resume(&self);

    /// Stops receiving.
    fn close(&self);

    /// Sets a callback invoked once the underlying [`Transport`] is closed.
    fn on_transport_close(&self, f: Box<dyn FnOnce()>);
}
