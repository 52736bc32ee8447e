// crates/splitmux-media/src/decode.rs
//
// VideoDecoder: stateful sequential decoder for one media source.
// Owns the demuxer, the codec context and the RGB conversion context; all
// three are RAII wrappers, so a failure anywhere in `open` releases whatever
// was already acquired on the way out.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::util::frame::video::Video as VideoFrame;
use ffmpeg::Rational;

use splitmux_core::media_types::{MediaInfo, RgbFrame};

use crate::convert::FrameToRgb;
use crate::helpers::hwaccel::{self, CodecProbe};
use crate::helpers::seek::seek_to_ms;
use crate::probe::{first_video_stream, stream_frame_rate, total_frames};

pub struct VideoDecoder {
    path:      PathBuf,
    ictx:      ffmpeg::format::context::Input,
    decoder:   ffmpeg::decoder::Video,
    converter: FrameToRgb,
    video_idx: usize,
    time_base: Rational,
    last_pts:  i64,
    /// Set once the codec has been sent EOF; cleared by reset/seek.
    flushed:   bool,
    info:      MediaInfo,
}

impl VideoDecoder {
    /// Open `path` and prepare for sequential decoding.
    ///
    /// Fails when the container cannot be opened, no video stream exists, no
    /// decoder is found for the stream's codec, or the conversion context
    /// cannot be built. Partially acquired handles are dropped on every
    /// failure path.
    pub fn open(path: &Path) -> Result<Self> {
        let ictx = input(path)
            .map_err(|e| anyhow!("open '{}': {e}", path.display()))?;

        let video_idx = first_video_stream(&ictx)?;

        let (time_base, frame_rate, frames, codec_id) = {
            let stream = ictx.stream(video_idx).unwrap();
            let params = stream.parameters();
            let ctx = ffmpeg::codec::context::Context::from_parameters(params)?;
            let duration_ms = ictx.duration() * 1000 / ffmpeg::ffi::AV_TIME_BASE as i64;
            let fr = stream_frame_rate(&stream);
            (
                stream.time_base(),
                fr,
                total_frames(&stream, duration_ms, fr),
                ctx.id(),
            )
        };

        // Hardware variants first (table order), library default otherwise.
        let probe = hwaccel::probe_decoder(codec_id);
        let codec = probe
            .codec()
            .ok_or_else(|| anyhow!("no decoder for codec {codec_id:?}"))?;
        if let CodecProbe::Hardware { name, .. } = &probe {
            eprintln!("[decode] using hardware decoder {name}");
        }

        let dec_ctx = {
            let stream = ictx.stream(video_idx).unwrap();
            ffmpeg::codec::context::Context::from_parameters(stream.parameters())?
        };
        let decoder = if probe.is_hardware() {
            dec_ctx.decoder().open_as(codec)?.video()?
        } else {
            dec_ctx.decoder().video()?
        };

        let converter = FrameToRgb::new(decoder.format(), decoder.width(), decoder.height())?;

        let duration_ms = ictx.duration() * 1000 / ffmpeg::ffi::AV_TIME_BASE as i64;
        let bit_rate = unsafe { (*ictx.as_ptr()).bit_rate };
        let info = MediaInfo {
            width:        decoder.width(),
            height:       decoder.height(),
            frame_rate,
            bit_rate,
            total_frames: frames,
            duration_ms,
            codec_name:   codec.name().to_string(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            ictx,
            decoder,
            converter,
            video_idx,
            time_base,
            last_pts: -1,
            flushed: false,
            info,
        })
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the next video frame in container order.
    ///
    /// Reads packets, discarding those of other streams, until the codec
    /// hands back a frame; converts it to the RGB interchange format. Once
    /// the container runs out of packets the codec is flushed so delayed
    /// frames (B-frame reordering) still come out; after that `Ok(None)`
    /// signals end of stream.
    pub fn decode_next(&mut self) -> Result<Option<RgbFrame>> {
        let mut decoded = VideoFrame::empty();

        // A previous packet may have produced more than one frame.
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return Ok(Some(self.to_rgb(&decoded)?));
        }

        let mut got = false;
        for (stream, packet) in self.ictx.packets().flatten() {
            if stream.index() != self.video_idx {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                got = true;
                break;
            }
        }
        if got {
            return Ok(Some(self.to_rgb(&decoded)?));
        }

        if !self.flushed {
            self.flushed = true;
            let _ = self.decoder.send_eof();
        }
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return Ok(Some(self.to_rgb(&decoded)?));
        }
        Ok(None)
    }

    /// Seek back to the start of the container and flush codec buffers.
    /// Keyframe-approximate, like every container seek.
    pub fn reset(&mut self) {
        self.seek_ms(0);
    }

    /// Seek to `target_ms` (nearest preceding keyframe) and flush codec
    /// buffers. A failed container seek leaves the demuxer where it is; the
    /// codec flush still applies so no stale frames leak across the seek.
    pub fn seek_ms(&mut self, target_ms: i64) {
        seek_to_ms(&mut self.ictx, target_ms, "decoder");
        self.decoder.flush();
        self.flushed = false;
        self.last_pts = -1;
    }

    fn to_rgb(&mut self, decoded: &VideoFrame) -> Result<RgbFrame> {
        let pts = decoded.pts().unwrap_or(self.last_pts + 1);
        self.last_pts = pts;
        let pts_ms = pts * 1000 * self.time_base.numerator() as i64
            / self.time_base.denominator() as i64;
        Ok(RgbFrame {
            width:  self.info.width,
            height: self.info.height,
            pts_ms,
            data:   self.converter.convert(decoded)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_nonexistent_path_fails_cleanly() {
        // RAII: nothing to release by hand — the Err drop chain covers it.
        assert!(VideoDecoder::open(Path::new("/nonexistent/clip.mp4")).is_err());
    }

    #[test]
    fn open_non_media_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not_a_video.mp4");
        std::fs::write(&bogus, b"plain text, not a container").unwrap();
        assert!(VideoDecoder::open(&bogus).is_err());
    }
}
