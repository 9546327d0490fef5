//! Encoding strategy negotiation for produced video and codec options.

use serde::{Deserialize, Serialize};

use super::{VideoCodec, VideoOptions};

/// Maximum number of simulcast layers.
const MAX_SIMULCAST_STREAMS: u8 = 3;

/// Scalability mode used for VP9 webcam video.
const WEBCAM_SVC_SCALABILITY_MODE: &str = "L3T3_KEY";

/// Scalability mode used for VP9 screen sharing.
const SCREENSHARE_SVC_SCALABILITY_MODE: &str = "L1T3";

/// Single RTP encoding of a produced track.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpEncoding {
    /// RTP stream ID of a simulcast layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,

    /// Maximum bitrate, bits per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,

    /// Factor the capture resolution is scaled down by.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_resolution_down_by: Option<f64>,

    /// SVC scalability mode (e.g. `L3T3_KEY`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalability_mode: Option<String>,

    /// Discontinuous transmission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtx: Option<bool>,
}

/// Codec options of a producer.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecOptions {
    /// Opus stereo.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opus_stereo: Option<bool>,

    /// Opus discontinuous transmission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opus_dtx: Option<bool>,

    /// Opus in-band forward error correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opus_fec: Option<bool>,

    /// Starting bitrate of a video encoder, kbps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_google_start_bitrate: Option<u32>,
}

impl CodecOptions {
    /// [`CodecOptions`] for a produced webcam video.
    #[must_use]
    pub fn webcam() -> Self {
        Self {
            video_google_start_bitrate: Some(1000),
            ..Self::default()
        }
    }
}

/// Way a produced video is split into layers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncodingStrategy {
    /// One stream of a single quality.
    Single,

    /// Several independent streams of decreasing resolution.
    Simulcast(u8),

    /// One stream with spatial/temporal layers inside (VP9).
    Svc,
}

impl EncodingStrategy {
    /// Chooses an [`EncodingStrategy`] for a webcam video basing on the
    /// requested [`VideoOptions`] and the codecs the device supports.
    ///
    /// VP9 always gets [`EncodingStrategy::Svc`], whatever number of simulcast
    /// streams is requested.
    #[must_use]
    pub fn choose(
        options: &VideoOptions,
        device_codecs: &[VideoCodec],
    ) -> Self {
        if effective_codec(options, device_codecs) == Some(&VideoCodec::Vp9) {
            return Self::Svc;
        }
        match options.simulcast_streams.min(MAX_SIMULCAST_STREAMS) {
            0 | 1 => Self::Single,
            n => Self::Simulcast(n),
        }
    }
}

/// Returns the codec which will actually be used for a webcam video: the
/// preferred one if the device supports it, or the first device's codec
/// otherwise.
#[must_use]
pub fn effective_codec<'a>(
    options: &'a VideoOptions,
    device_codecs: &'a [VideoCodec],
) -> Option<&'a VideoCodec> {
    options
        .codec
        .as_ref()
        .filter(|c| device_codecs.contains(c))
        .or_else(|| device_codecs.first())
}

/// Builds [`RtpEncoding`]s of a webcam video.
///
/// Simulcast layers are ordered from the lowest to the highest, each next
/// layer doubling resolution and bitrate of the previous one, so the top
/// layer matches the [`VideoOptions`] exactly.
#[must_use]
pub fn webcam_encodings(
    options: &VideoOptions,
    device_codecs: &[VideoCodec],
) -> (EncodingStrategy, Vec<RtpEncoding>) {
    let strategy = EncodingStrategy::choose(options, device_codecs);
    let encodings = match strategy {
        EncodingStrategy::Single => vec![RtpEncoding {
            max_bitrate: Some(options.max_bitrate),
            ..RtpEncoding::default()
        }],
        EncodingStrategy::Simulcast(layers) => (0..layers)
            .map(|i| {
                let scale = 1_u32 << u32::from(layers - 1 - i);
                RtpEncoding {
                    rid: Some(format!("r{}", i)),
                    max_bitrate: Some(options.max_bitrate / scale),
                    scale_resolution_down_by: Some(f64::from(scale)),
                    ..RtpEncoding::default()
                }
            })
            .collect(),
        EncodingStrategy::Svc => vec![RtpEncoding {
            max_bitrate: Some(options.max_bitrate),
            scalability_mode: Some(WEBCAM_SVC_SCALABILITY_MODE.to_owned()),
            ..RtpEncoding::default()
        }],
    };
    (strategy, encodings)
}

/// Builds [`RtpEncoding`]s of a screen sharing video.
///
/// Screen sharing is never simulcast: VP9 devices get temporal layers only,
/// others a single DTX-enabled stream.
#[must_use]
pub fn screenshare_encodings(
    max_bitrate: u32,
    device_codecs: &[VideoCodec],
) -> Vec<RtpEncoding> {
    let svc = device_codecs.first() == Some(&VideoCodec::Vp9);
    vec![RtpEncoding {
        max_bitrate: Some(max_bitrate),
        scalability_mode: if svc {
            Some(SCREENSHARE_SVC_SCALABILITY_MODE.to_owned())
        } else {
            None
        },
        dtx: if svc { None } else { Some(true) },
        ..RtpEncoding::default()
    }]
}

/// Number of spatial and temporal layers described by a scalability mode
/// string (`L3T3`, `S2T3_KEY`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ScalabilityMode {
    /// Number of spatial layers.
    pub spatial_layers: u8,

    /// Number of temporal layers.
    pub temporal_layers: u8,
}

impl Default for ScalabilityMode {
    #[inline]
    fn default() -> Self {
        Self {
            spatial_layers: 1,
            temporal_layers: 1,
        }
    }
}

impl ScalabilityMode {
    /// Parses a scalability mode string.
    ///
    /// Anything not matching `[LS]<1-99>T<1-99>[_KEY...]` yields a single
    /// spatial and temporal layer.
    #[must_use]
    pub fn parse(mode: Option<&str>) -> Self {
        mode.and_then(Self::try_parse).unwrap_or_default()
    }

    /// Parses a well-formed scalability mode string.
    fn try_parse(mode: &str) -> Option<Self> {
        let rest = mode.strip_prefix('L').or_else(|| mode.strip_prefix('S'))?;
        let t_pos = rest.find('T')?;
        let spatial_layers = parse_layers(&rest[..t_pos])?;
        let after_t = &rest[t_pos + 1..];
        let digits_end = after_t
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or_else(|| after_t.len());
        let temporal_layers = parse_layers(&after_t[..digits_end])?;
        Some(Self {
            spatial_layers,
            temporal_layers,
        })
    }
}

/// Parses a `1..=99` layers count without leading zeros.
fn parse_layers(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 2 || digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}
