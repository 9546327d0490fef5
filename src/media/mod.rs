//! Media kinds, local media sources and video publishing options.

pub mod encodings;

use std::{fmt, str::FromStr};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[doc(inline)]
pub use self::encodings::{
    CodecOptions, EncodingStrategy, RtpEncoding, ScalabilityMode,
};

/// Media exchange kind of a track.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}

/// Local media source which can be produced into a room.
///
/// At most one producer per [`LocalMediaType`] exists at a time.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LocalMediaType {
    /// Audio captured from a microphone.
    #[display(fmt = "microphone")]
    Microphone,

    /// Video captured from a camera.
    #[display(fmt = "webcam")]
    Webcam,

    /// Video captured from a display.
    #[display(fmt = "screenshare")]
    Screenshare,
}

impl LocalMediaType {
    /// All the [`LocalMediaType`]s.
    pub const ALL: [Self; 3] =
        [Self::Microphone, Self::Webcam, Self::Screenshare];

    /// Returns [`MediaKind`] produced by this [`LocalMediaType`].
    #[inline]
    #[must_use]
    pub fn kind(self) -> MediaKind {
        match self {
            Self::Microphone => MediaKind::Audio,
            Self::Webcam | Self::Screenshare => MediaKind::Video,
        }
    }
}

/// Per-participant slot holding a single remote consumer.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaSlot {
    /// Participant's microphone audio.
    #[display(fmt = "audio")]
    Audio,

    /// Participant's webcam video.
    #[display(fmt = "video")]
    Video,

    /// Participant's screen share video.
    #[display(fmt = "share")]
    Share,
}

impl MediaSlot {
    /// All the [`MediaSlot`]s.
    pub const ALL: [Self; 3] = [Self::Audio, Self::Video, Self::Share];

    /// Infers [`MediaSlot`] from the consumer's [`MediaKind`] and its `share`
    /// application data flag.
    ///
    /// The `share` flag only distinguishes video kinds, audio always goes into
    /// [`MediaSlot::Audio`].
    #[inline]
    #[must_use]
    pub fn infer(kind: MediaKind, share: bool) -> Self {
        match (kind, share) {
            (MediaKind::Audio, _) => Self::Audio,
            (MediaKind::Video, false) => Self::Video,
            (MediaKind::Video, true) => Self::Share,
        }
    }
}

/// Video codec a device may be capable of.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// `video/VP8`.
    Vp8,

    /// `video/VP9`.
    Vp9,

    /// `video/H264`.
    H264,

    /// `video/AV1`.
    Av1,
}

impl VideoCodec {
    /// Returns MIME type of this [`VideoCodec`].
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Vp8 => "video/VP8",
            Self::Vp9 => "video/VP9",
            Self::H264 => "video/H264",
            Self::Av1 => "video/AV1",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Error of parsing unsupported MIME type into a [`VideoCodec`].
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "Unsupported video codec: {}", _0)]
pub struct UnknownCodecError(pub String);

impl FromStr for VideoCodec {
    type Err = UnknownCodecError;

    /// Parses either a full MIME type (`video/VP9`) or a bare codec name
    /// (`vp9`), case insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.rsplit('/').next().unwrap_or(s).to_ascii_lowercase();
        match name.as_str() {
            "vp8" => Ok(Self::Vp8),
            "vp9" => Ok(Self::Vp9),
            "h264" => Ok(Self::H264),
            "av1" => Ok(Self::Av1),
            _ => Err(UnknownCodecError(s.to_owned())),
        }
    }
}

/// Video frame size.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault,
)]
pub struct Resolution {
    /// Width in pixels.
    #[default(1280)]
    pub width: u32,

    /// Height in pixels.
    #[default(720)]
    pub height: u32,
}

/// Webcam publishing preferences.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct VideoOptions {
    /// Preferred codec. The first video codec of the device is used if
    /// [`None`] or unsupported by the device.
    pub codec: Option<VideoCodec>,

    /// Requested number of simulcast streams (`1..=3`).
    ///
    /// `1` means a single stream, `0` is treated as `1`.
    #[default(3)]
    pub simulcast_streams: u8,

    /// Capture resolution of the top layer.
    pub resolution: Resolution,

    /// Capture frame rate.
    #[default(30)]
    pub frame_rate: u32,

    /// Maximum bitrate of the top layer, bits per second.
    #[default(1_500_000)]
    pub max_bitrate: u32,
}
