// crates/splitmux-media/src/encode.rs
//
// VideoEncoder: H.264 MP4 encode session fed with packed RGB24 frames.
//
// PTS strategy: a monotonically increasing frame counter in a 1/fps time
// base. Packets are rescaled to the muxer-assigned stream time base before
// the interleaved write.
//
// Errors are Strings — encode failures travel over the event channel as
// human-readable job messages, not typed errors.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::format::{output, Pixel};
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

use crate::convert::RgbToFrame;
use crate::helpers::hwaccel::{self, CodecProbe};

/// Frame rate used when the caller does not override it (merge jobs).
pub const DEFAULT_FPS: u32 = 25;

/// Bit rate used when the caller does not override it.
pub const DEFAULT_BIT_RATE: usize = 2_000_000;

/// Everything an encode session needs to know up front.
///
/// `hardware_accel` is read once, inside `VideoEncoder::open` — changing it
/// afterwards affects only later sessions.
#[derive(Clone)]
pub struct EncodeConfig {
    pub width:          u32,
    pub height:         u32,
    pub fps:            u32,
    pub bit_rate:       usize,
    pub hardware_accel: bool,
}

impl EncodeConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: DEFAULT_FPS,
            bit_rate: DEFAULT_BIT_RATE,
            hardware_accel: true,
        }
    }
}

pub struct VideoEncoder {
    /// `None` once closed. Every public method tolerates the closed state,
    /// so close/finalize sequences are re-entrant safe.
    inner: Option<Inner>,
}

struct Inner {
    octx:        ffmpeg::format::context::Output,
    encoder:     ffmpeg::encoder::video::Video,
    converter:   RgbToFrame,
    enc_tb:      Rational,
    frame_count: i64,
    width:       u32,
    height:      u32,
}

impl VideoEncoder {
    /// Open an encode session writing to `path`.
    ///
    /// Probes hardware H.264 encoders in table order when
    /// `config.hardware_accel` is set, falling back to the library default.
    /// Writes the container header before returning, so the first
    /// `encode_frame` call can go straight to the codec.
    pub fn open(path: &Path, config: &EncodeConfig) -> Result<Self, String> {
        let mut octx = output(path)
            .map_err(|e| format!("could not open output '{}': {e}", path.display()))?;

        let probe = hwaccel::probe_encoder(CodecId::H264, config.hardware_accel);
        let codec = probe
            .codec()
            .ok_or_else(|| "H.264 encoder not found — is libx264 available?".to_string())?;
        if let CodecProbe::Hardware { name, .. } = &probe {
            eprintln!("[encode] using hardware encoder {name}");
        }

        let enc_tb = Rational::new(1, config.fps as i32);

        let mut ost = octx
            .add_stream(codec)
            .map_err(|e| format!("add video stream: {e}"))?;
        ost.set_time_base(enc_tb);

        let enc_ctx = codec::context::Context::new_with_codec(codec);
        let mut video_enc = enc_ctx
            .encoder()
            .video()
            .map_err(|e| format!("create video encoder context: {e}"))?;

        video_enc.set_width(config.width);
        video_enc.set_height(config.height);
        video_enc.set_format(Pixel::YUV420P);
        video_enc.set_time_base(enc_tb);
        video_enc.set_frame_rate(Some(Rational::new(config.fps as i32, 1)));
        video_enc.set_bit_rate(config.bit_rate);
        video_enc.set_gop(12);
        video_enc.set_max_b_frames(2);

        if octx
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
        {
            video_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("preset", "medium");
        opts.set("tune", "zerolatency");

        let encoder = video_enc
            .open_as_with(codec, opts)
            .map_err(|e| format!("open H.264 encoder: {e}"))?;

        // Copy encoder params into the stream's codecpar so the muxer has
        // resolution, format, and codec-private data. set_parameters()
        // requires AsPtr<AVCodecParameters>, which encoder::Video does not
        // implement — use FFI directly.
        unsafe {
            let ret = ffmpeg::ffi::avcodec_parameters_from_context(
                (**(*octx.as_mut_ptr()).streams.add(0)).codecpar,
                encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
            );
            if ret < 0 {
                return Err(format!("avcodec_parameters_from_context failed: {ret}"));
            }
        }

        octx.write_header()
            .map_err(|e| format!("write output header: {e}"))?;

        let converter = RgbToFrame::new(Pixel::YUV420P, config.width, config.height)
            .map_err(|e| format!("create pixel converter: {e}"))?;

        Ok(Self {
            inner: Some(Inner {
                octx,
                encoder,
                converter,
                enc_tb,
                frame_count: 0,
                width: config.width,
                height: config.height,
            }),
        })
    }

    /// Encode one packed RGB24 frame.
    ///
    /// The frame must already match the session's configured dimensions —
    /// callers resize beforehand. Drains every packet the codec has ready
    /// after the submission.
    pub fn encode_frame(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<(), String> {
        let inner = self.inner.as_mut().ok_or("encoder is closed")?;

        if width != inner.width || height != inner.height {
            return Err(format!(
                "frame {width}x{height} does not match session {}x{}",
                inner.width, inner.height,
            ));
        }

        let mut frame = inner
            .converter
            .convert(rgb)
            .map_err(|e| format!("convert frame: {e}"))?;
        frame.set_pts(Some(inner.frame_count));
        inner.frame_count += 1;

        inner
            .encoder
            .send_frame(&frame)
            .map_err(|e| format!("send frame to encoder: {e}"))?;

        inner.drain_packets()
    }

    /// Flush the codec and write the container trailer.
    pub fn finalize(&mut self) -> Result<(), String> {
        let inner = self.inner.as_mut().ok_or("encoder is closed")?;

        inner
            .encoder
            .send_eof()
            .map_err(|e| format!("send EOF to encoder: {e}"))?;
        inner.drain_packets()?;

        inner
            .octx
            .write_trailer()
            .map_err(|e| format!("write trailer: {e}"))
    }

    /// Number of frames accepted so far.
    pub fn frame_count(&self) -> i64 {
        self.inner.as_ref().map(|i| i.frame_count).unwrap_or(0)
    }

    /// Release every native handle. Safe to call any number of times.
    pub fn close(&mut self) {
        self.inner = None;
    }
}

impl Inner {
    /// Receive all available packets and write them interleaved, rescaling
    /// from the codec time base to the muxer-assigned stream time base.
    fn drain_packets(&mut self) -> Result<(), String> {
        let ost_tb = self.octx.stream(0).unwrap().time_base();
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(0);
            pkt.rescale_ts(self.enc_tb, ost_tb);
            pkt.write_interleaved(&mut self.octx)
                .map_err(|e| format!("write video packet: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_unwritable_path_fails() {
        let cfg = EncodeConfig::new(640, 480);
        assert!(VideoEncoder::open(Path::new("/nonexistent/dir/out.mp4"), &cfg).is_err());
    }

    #[test]
    fn closed_encoder_is_inert() {
        let mut enc = VideoEncoder { inner: None };
        enc.close();
        enc.close();
        assert!(enc.encode_frame(&[0u8; 12], 2, 2).is_err());
        assert!(enc.finalize().is_err());
        assert_eq!(enc.frame_count(), 0);
    }

    #[test]
    fn config_defaults() {
        let cfg = EncodeConfig::new(1280, 720);
        assert_eq!(cfg.fps, 25);
        assert_eq!(cfg.bit_rate, 2_000_000);
        assert!(cfg.hardware_accel);
    }
}
