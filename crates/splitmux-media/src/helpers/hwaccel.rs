// crates/splitmux-media/src/helpers/hwaccel.rs
//
// Table-driven hardware codec probing.
//
// Decoder and encoder selection both walk an ordered candidate list of
// vendor-specific implementations (NVIDIA first, then Intel, then AMD) and
// fall back to the library default for the codec id when none of the named
// variants is compiled into the linked FFmpeg. The tables and the typed
// probe result keep the fallback order explicit and testable, instead of a
// chain of null-checks.

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{Codec, Id as CodecId};

/// Ordered hardware decoder candidates per codec id.
const HW_DECODERS: &[(CodecId, &[&str])] = &[
    (CodecId::H264, &["h264_cuvid", "h264_qsv"]),
    (CodecId::HEVC, &["hevc_cuvid", "hevc_qsv"]),
];

/// Ordered hardware H.264 encoder candidates.
const HW_H264_ENCODERS: &[&str] = &["h264_nvenc", "h264_qsv", "h264_amf"];

/// Outcome of a codec probe: which implementation was picked and why.
pub enum CodecProbe {
    /// A named hardware variant was found. Carries the table entry that won.
    Hardware { name: &'static str, codec: Codec },
    /// No hardware variant available — the library default for the codec id.
    Default { codec: Codec },
    /// The codec id has no decoder/encoder at all in the linked FFmpeg.
    NotFound,
}

impl CodecProbe {
    pub fn codec(&self) -> Option<Codec> {
        match self {
            CodecProbe::Hardware { codec, .. } => Some(*codec),
            CodecProbe::Default { codec }      => Some(*codec),
            CodecProbe::NotFound               => None,
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self, CodecProbe::Hardware { .. })
    }
}

/// Ordered hardware decoder names for `id`, empty when the table has no entry.
pub fn decoder_candidates(id: CodecId) -> &'static [&'static str] {
    HW_DECODERS
        .iter()
        .find(|(table_id, _)| *table_id == id)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

/// Ordered hardware encoder names for `id` (H.264 only — the one output codec).
pub fn encoder_candidates(id: CodecId) -> &'static [&'static str] {
    if id == CodecId::H264 { HW_H264_ENCODERS } else { &[] }
}

/// Probe a decoder for `id`: hardware candidates in table order, then the
/// library default.
pub fn probe_decoder(id: CodecId) -> CodecProbe {
    for name in decoder_candidates(id) {
        if let Some(codec) = ffmpeg::decoder::find_by_name(name) {
            return CodecProbe::Hardware { name, codec };
        }
    }
    match ffmpeg::decoder::find(id) {
        Some(codec) => CodecProbe::Default { codec },
        None        => CodecProbe::NotFound,
    }
}

/// Probe an encoder for `id`. `hardware` gates the named-variant walk —
/// when false the probe goes straight to the library default.
pub fn probe_encoder(id: CodecId, hardware: bool) -> CodecProbe {
    if hardware {
        for name in encoder_candidates(id) {
            if let Some(codec) = ffmpeg::encoder::find_by_name(name) {
                return CodecProbe::Hardware { name, codec };
            }
        }
    }
    match ffmpeg::encoder::find(id) {
        Some(codec) => CodecProbe::Default { codec },
        None        => CodecProbe::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h264_decoder_candidates_prefer_nvidia() {
        assert_eq!(decoder_candidates(CodecId::H264), ["h264_cuvid", "h264_qsv"]);
    }

    #[test]
    fn hevc_decoder_candidates_prefer_nvidia() {
        assert_eq!(decoder_candidates(CodecId::HEVC), ["hevc_cuvid", "hevc_qsv"]);
    }

    #[test]
    fn unknown_codec_has_no_hardware_candidates() {
        assert!(decoder_candidates(CodecId::VP9).is_empty());
        assert!(encoder_candidates(CodecId::VP9).is_empty());
    }

    #[test]
    fn encoder_candidate_order_is_nvidia_intel_amd() {
        assert_eq!(
            encoder_candidates(CodecId::H264),
            ["h264_nvenc", "h264_qsv", "h264_amf"],
        );
    }
}
