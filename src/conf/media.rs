//! Local media publishing settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

use crate::media::{CodecOptions, VideoOptions};

/// Local media publishing settings.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Media {
    /// Default webcam publishing preferences.
    pub video: VideoOptions,

    /// Opus settings of a produced microphone audio.
    pub microphone: Microphone,

    /// Maximum bitrate of a produced screen sharing video, bits per second.
    /// Defaults to `1500000`.
    #[default(1_500_000)]
    pub screenshare_max_bitrate: u32,
}

/// Opus settings of a produced microphone audio.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Microphone {
    /// Stereo audio. Defaults to `true`.
    #[default(true)]
    pub stereo: bool,

    /// Discontinuous transmission. Defaults to `true`.
    #[default(true)]
    pub dtx: bool,

    /// In-band forward error correction. Defaults to `true`.
    #[default(true)]
    pub fec: bool,
}

impl Microphone {
    /// Returns [`CodecOptions`] of a microphone producer.
    #[must_use]
    pub fn codec_options(self) -> CodecOptions {
        CodecOptions {
            opus_stereo: Some(self.stereo),
            opus_dtx: Some(self.dtx),
            opus_fec: Some(self.fec),
            ..CodecOptions::default()
        }
    }
}
