// crates/splitmux-media/src/remux.rs
//
// Combine a video-only container with an external audio file into one
// output. The video stream is copied packet-for-packet; audio is decoded,
// resampled to 44100 Hz stereo FLTP and re-encoded as AAC, because the
// source audio (mp3/wav/whatever) is rarely something an mp4 accepts as-is.
//
// Stream layout in the output:
//   Stream 0 — video, stream copy
//   Stream 1 — AAC audio (FLTP stereo, 44100 Hz, 128 kbps)
//
// Interleaving: audio is pumped up to each written video packet's timestamp,
// so the muxer never has to buffer one whole stream. The output is trimmed
// to the shorter of the two tracks.
//
// Audio FIFO: AAC wants exactly `encoder.frame_size()` samples per input
// frame, while decoded audio arrives in arbitrary chunks. All decoded PCM is
// drained into a stereo FLTP ring buffer; full frames are popped off the
// front, and the tail is zero-padded on the final flush.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::codec::{self, Id as CodecId};
use ffmpeg::format::sample::Type as SampleType;
use ffmpeg::format::{input, output, Sample};
use ffmpeg::media::Type as MediaType;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::{ChannelLayout, ChannelLayoutMask};
use ffmpeg::util::frame::audio::Audio as AudioFrame;
use ffmpeg::util::rational::Rational;
use ffmpeg::Packet;

/// Output audio sample rate.
const AUDIO_RATE: i32 = 44_100;

/// Output audio bit rate.
const AUDIO_BIT_RATE: usize = 128_000;

// ── Audio FIFO ────────────────────────────────────────────────────────────────

/// Stereo FLTP (float planar) sample ring buffer. Mono sources are
/// duplicated to both planes so the output is always properly stereo.
struct AudioFifo {
    left:  Vec<f32>,
    right: Vec<f32>,
}

impl AudioFifo {
    fn new() -> Self {
        Self { left: Vec::new(), right: Vec::new() }
    }

    fn len(&self) -> usize {
        self.left.len()
    }

    /// Append one decoded/resampled FLTP audio frame.
    fn push(&mut self, frame: &AudioFrame) {
        let n = frame.samples();
        if n == 0 {
            return;
        }
        unsafe {
            let l_bytes = frame.data(0);
            let l_f32 = std::slice::from_raw_parts(l_bytes.as_ptr() as *const f32, n);
            self.left.extend_from_slice(l_f32);

            let r_bytes = if frame.ch_layout().channels() >= 2 {
                frame.data(1)
            } else {
                frame.data(0)
            };
            let r_f32 = std::slice::from_raw_parts(r_bytes.as_ptr() as *const f32, n);
            self.right.extend_from_slice(r_f32);
        }
    }

    /// Pop one encoder-sized frame off the front, zero-padding the tail when
    /// fewer than `n` samples remain (final flush only).
    fn pop_frame(&mut self, n: usize, sample_idx: i64) -> AudioFrame {
        let available = self.left.len().min(n);

        let mut frame = AudioFrame::new(
            Sample::F32(SampleType::Planar),
            n,
            ChannelLayoutMask::STEREO,
        );
        frame.set_rate(AUDIO_RATE as u32);
        frame.set_pts(Some(sample_idx));

        unsafe {
            let ldata = frame.data_mut(0);
            let ldst = std::slice::from_raw_parts_mut(ldata.as_mut_ptr() as *mut f32, n);
            ldst[..available].copy_from_slice(&self.left[..available]);
            if available < n {
                ldst[available..].fill(0.0);
            }

            let rdata = frame.data_mut(1);
            let rdst = std::slice::from_raw_parts_mut(rdata.as_mut_ptr() as *mut f32, n);
            rdst[..available].copy_from_slice(&self.right[..available]);
            if available < n {
                rdst[available..].fill(0.0);
            }
        }

        self.left.drain(..available);
        self.right.drain(..available);

        frame
    }
}

// ── AAC writer ────────────────────────────────────────────────────────────────

/// AAC encoder plus the FIFO feeding it. Writes to stream 1 of the output.
struct AacWriter {
    encoder:        ffmpeg::encoder::Audio,
    /// Next output frame's PTS in samples (1/44100 time base).
    out_sample_idx: i64,
    frame_size:     usize,
    fifo:           AudioFifo,
    audio_tb:       Rational,
    ost_tb:         Rational,
}

impl AacWriter {
    /// Seconds of audio submitted to the encoder so far.
    fn encoded_secs(&self) -> f64 {
        self.out_sample_idx as f64 / AUDIO_RATE as f64
    }

    /// Drain buffered samples → encode → write interleaved. With `flush`
    /// a partial tail frame is zero-padded so no PCM is lost.
    fn drain_fifo(
        &mut self,
        octx:  &mut ffmpeg::format::context::Output,
        flush: bool,
    ) -> Result<(), String> {
        while self.fifo.len() >= self.frame_size || (flush && self.fifo.len() > 0) {
            let frame = self.fifo.pop_frame(self.frame_size, self.out_sample_idx);
            self.out_sample_idx += self.frame_size as i64;

            self.encoder
                .send_frame(&frame)
                .map_err(|e| format!("send audio frame to encoder: {e}"))?;

            self.drain_packets(octx)?;
        }
        Ok(())
    }

    fn drain_packets(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
    ) -> Result<(), String> {
        let mut pkt = Packet::empty();
        while self.encoder.receive_packet(&mut pkt).is_ok() {
            pkt.set_stream(1);
            pkt.rescale_ts(self.audio_tb, self.ost_tb);
            pkt.write_interleaved(octx)
                .map_err(|e| format!("write audio packet: {e}"))?;
        }
        Ok(())
    }

    fn flush_encoder(
        &mut self,
        octx: &mut ffmpeg::format::context::Output,
    ) -> Result<(), String> {
        self.encoder
            .send_eof()
            .map_err(|e| format!("send EOF to audio encoder: {e}"))?;
        self.drain_packets(octx)
    }
}

// ── Public entry point ────────────────────────────────────────────────────────

/// Mux `video` (stream copy) and `audio` (transcoded to AAC) into `output_path`,
/// trimming the result to the shorter of the two tracks.
pub fn remux_with_audio(video: &Path, audio: &Path, output_path: &Path) -> Result<(), String> {
    // ── Inputs ────────────────────────────────────────────────────────────────
    let mut vin = input(video)
        .map_err(|e| format!("open video '{}': {e}", video.display()))?;
    let video_idx = vin
        .streams()
        .find(|s| s.parameters().medium() == MediaType::Video)
        .map(|s| s.index())
        .ok_or_else(|| format!("no video stream in '{}'", video.display()))?;
    let vin_tb = vin.stream(video_idx).unwrap().time_base();
    let video_secs = vin.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);

    let mut ain = input(audio)
        .map_err(|e| format!("open audio '{}': {e}", audio.display()))?;
    let audio_idx = ain
        .streams()
        .find(|s| s.parameters().medium() == MediaType::Audio)
        .map(|s| s.index())
        .ok_or_else(|| format!("no audio stream in '{}'", audio.display()))?;
    let ain_tb = ain.stream(audio_idx).unwrap().time_base();
    let audio_secs_total = ain.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE);

    // Trim target. Containers without a known duration report <= 0; then the
    // only cut-off is whichever input hits EOF first.
    let limit_secs = match (video_secs > 0.0, audio_secs_total > 0.0) {
        (true, true)   => video_secs.min(audio_secs_total),
        (true, false)  => video_secs,
        (false, true)  => audio_secs_total,
        (false, false) => f64::MAX,
    };

    let mut adec = {
        let ast = ain.stream(audio_idx).unwrap();
        codec::context::Context::from_parameters(ast.parameters())
            .map_err(|e| format!("audio decoder context: {e}"))?
            .decoder()
            .audio()
            .map_err(|e| format!("open audio decoder: {e}"))?
    };

    // ── Output ────────────────────────────────────────────────────────────────
    let mut octx = output(output_path)
        .map_err(|e| format!("could not open output '{}': {e}", output_path.display()))?;

    {
        let ist = vin.stream(video_idx).unwrap();
        let mut ost = octx
            .add_stream(ffmpeg::encoder::find(CodecId::None))
            .map_err(|e| format!("add video stream: {e}"))?;
        ost.set_parameters(ist.parameters());
        unsafe {
            (*ost.parameters().as_mut_ptr()).codec_tag = 0;
        }
    }

    let audio_tb = Rational::new(1, AUDIO_RATE);

    let aac = ffmpeg::encoder::find(CodecId::AAC)
        .ok_or_else(|| "AAC encoder not found".to_string())?;

    let mut ost_audio = octx
        .add_stream(aac)
        .map_err(|e| format!("add audio stream: {e}"))?;
    ost_audio.set_time_base(audio_tb);

    let enc_ctx = codec::context::Context::new_with_codec(aac);
    let mut audio_enc = enc_ctx
        .encoder()
        .audio()
        .map_err(|e| format!("create audio encoder context: {e}"))?;

    audio_enc.set_rate(AUDIO_RATE);
    audio_enc.set_ch_layout(ChannelLayout::STEREO);
    audio_enc.set_format(Sample::F32(SampleType::Planar));
    audio_enc.set_bit_rate(AUDIO_BIT_RATE);

    if octx
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    {
        audio_enc.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let audio_encoder = audio_enc
        .open_as_with(aac, ffmpeg::Dictionary::new())
        .map_err(|e| format!("open AAC encoder: {e}"))?;

    let frame_size = (audio_encoder.frame_size() as usize).max(1024);

    unsafe {
        let ret = ffmpeg::ffi::avcodec_parameters_from_context(
            (**(*octx.as_mut_ptr()).streams.add(1)).codecpar,
            audio_encoder.as_ptr() as *mut ffmpeg::ffi::AVCodecContext,
        );
        if ret < 0 {
            return Err(format!("avcodec_parameters_from_context (audio) failed: {ret}"));
        }
    }

    octx.write_header()
        .map_err(|e| format!("write output header: {e}"))?;

    let ost_video_tb = octx.stream(0).unwrap().time_base();
    let ost_audio_tb = octx.stream(1).unwrap().time_base();

    let mut aac_writer = AacWriter {
        encoder: audio_encoder,
        out_sample_idx: 0,
        frame_size,
        fifo: AudioFifo::new(),
        audio_tb,
        ost_tb: ost_audio_tb,
    };
    let mut resampler: Option<resampling::Context> = None;
    let mut audio_done = false;

    // ── Interleaved copy ──────────────────────────────────────────────────────
    for result in vin.packets() {
        let (stream, mut packet) = result
            .map_err(|e| format!("read packet from '{}': {e}", video.display()))?;
        if stream.index() != video_idx {
            continue;
        }

        let pkt_secs = packet
            .pts()
            .or(packet.dts())
            .map(|t| t as f64 * f64::from(vin_tb))
            .unwrap_or(0.0);
        if pkt_secs > limit_secs {
            break;
        }

        packet.rescale_ts(vin_tb, ost_video_tb);
        packet.set_stream(0);
        packet.set_position(-1);
        packet
            .write_interleaved(&mut octx)
            .map_err(|e| format!("write video packet: {e}"))?;

        // Keep audio caught up with the video timeline.
        while !audio_done && aac_writer.encoded_secs() < pkt_secs.min(limit_secs) {
            if !pump_audio(
                &mut ain,
                audio_idx,
                &mut adec,
                &mut resampler,
                &mut aac_writer,
                &mut octx,
            )? {
                audio_done = true;
            }
        }
    }

    // Final flush: zero-pad the FIFO tail, drain the encoder, close the file.
    aac_writer.drain_fifo(&mut octx, true)?;
    aac_writer.flush_encoder(&mut octx)?;

    octx.write_trailer()
        .map_err(|e| format!("write trailer: {e}"))
}

/// Read one audio packet, decode it and push the PCM into the FIFO.
/// Returns `Ok(false)` once the audio input is exhausted (decoder drained).
fn pump_audio(
    ain:        &mut ffmpeg::format::context::Input,
    audio_idx:  usize,
    adec:       &mut ffmpeg::decoder::Audio,
    resampler:  &mut Option<resampling::Context>,
    aac_writer: &mut AacWriter,
    octx:       &mut ffmpeg::format::context::Output,
) -> Result<bool, String> {
    for (stream, packet) in ain.packets().flatten() {
        if stream.index() != audio_idx {
            continue;
        }
        // A bad packet should not abort the whole remux.
        if adec.send_packet(&packet).is_err() {
            return Ok(true);
        }
        let mut raw = AudioFrame::empty();
        while adec.receive_frame(&mut raw).is_ok() {
            push_resampled(&raw, resampler, &mut aac_writer.fifo);
        }
        aac_writer.drain_fifo(octx, false)?;
        return Ok(true);
    }

    // Input exhausted — drain the decoder's tail.
    let _ = adec.send_eof();
    let mut raw = AudioFrame::empty();
    while adec.receive_frame(&mut raw).is_ok() {
        push_resampled(&raw, resampler, &mut aac_writer.fifo);
    }
    aac_writer.drain_fifo(octx, false)?;
    Ok(false)
}

/// Resample `raw` to FLTP stereo 44100 when it differs and push it into the
/// FIFO. The resampler is built lazily on the first frame that needs it so
/// the real source format is known before the SwrContext exists.
fn push_resampled(
    raw:       &AudioFrame,
    resampler: &mut Option<resampling::Context>,
    fifo:      &mut AudioFifo,
) {
    let target_fmt = Sample::F32(SampleType::Planar);
    let needs_resample = raw.format() != target_fmt
        || raw.rate() != AUDIO_RATE as u32
        || raw.ch_layout().channels() != 2;

    if needs_resample {
        let rs = resampler.get_or_insert_with(|| {
            // Mono sources must be declared as MONO or swr misinterprets the
            // channel layout.
            let src_layout = if raw.ch_layout().channels() >= 2 {
                raw.ch_layout()
            } else {
                ChannelLayout::MONO
            };
            resampling::Context::get2(
                raw.format(), src_layout,            raw.rate(),
                target_fmt,   ChannelLayout::STEREO, AUDIO_RATE as u32,
            )
            .expect("create audio resampler")
        });

        let mut resampled = AudioFrame::empty();
        if rs.run(raw, &mut resampled).is_ok() && resampled.samples() > 0 {
            fifo.push(&resampled);
        }
    } else {
        fifo.push(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remux_with_missing_inputs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");
        assert!(remux_with_audio(
            Path::new("/nonexistent/video.mp4"),
            Path::new("/nonexistent/audio.mp3"),
            &out,
        )
        .is_err());
    }

    #[test]
    fn fifo_pops_fixed_frames_and_zero_pads() {
        let mut fifo = AudioFifo::new();
        fifo.left.extend_from_slice(&[1.0; 10]);
        fifo.right.extend_from_slice(&[1.0; 10]);

        let frame = fifo.pop_frame(8, 0);
        assert_eq!(frame.samples(), 8);
        assert_eq!(fifo.len(), 2);

        // Partial tail: zero-padded to the full frame size.
        let tail = fifo.pop_frame(8, 8);
        assert_eq!(tail.samples(), 8);
        assert_eq!(fifo.len(), 0);
        unsafe {
            let l = std::slice::from_raw_parts(tail.data(0).as_ptr() as *const f32, 8);
            assert_eq!(&l[..2], &[1.0, 1.0]);
            assert_eq!(&l[2..], &[0.0; 6]);
        }
    }
}
