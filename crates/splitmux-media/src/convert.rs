// crates/splitmux-media/src/convert.rs
//
// Pixel-format conversion between decoded/encoded frames and the packed
// RGB24 interchange buffers that cross the channel boundary.
//
// Two directions, one swscale context each:
//   FrameToRgb — decoder output (any pixel format) → packed RGB24
//   RgbToFrame — packed RGB24 → the encoder's input format (YUV420P)
//
// "Packed" means strides are removed: each row is exactly `width * 3` bytes.
// FFmpeg frames pad rows for alignment, so both directions copy row by row.

use anyhow::Result;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as SwsContext, flag::Flags};
use ffmpeg::util::frame::video::Video as VideoFrame;

/// Converts decoded frames to packed RGB24 at the source dimensions.
pub struct FrameToRgb {
    scaler: SwsContext,
    width:  u32,
    height: u32,
}

impl FrameToRgb {
    pub fn new(src_format: Pixel, width: u32, height: u32) -> Result<Self> {
        let scaler = SwsContext::get(
            src_format, width, height,
            Pixel::RGB24, width, height,
            Flags::BILINEAR,
        )?;
        Ok(Self { scaler, width, height })
    }

    /// Scale `decoded` to RGB24 and copy it out with strides removed.
    pub fn convert(&mut self, decoded: &VideoFrame) -> Result<Vec<u8>> {
        let mut rgb = VideoFrame::empty();
        self.scaler.run(decoded, &mut rgb)?;

        let stride    = rgb.stride(0);
        let raw       = rgb.data(0);
        let row_bytes = self.width as usize * 3;
        let data: Vec<u8> = (0..self.height as usize)
            .flat_map(|row| &raw[row * stride..row * stride + row_bytes])
            .copied()
            .collect();
        Ok(data)
    }
}

/// Converts packed RGB24 buffers to encoder-input frames.
pub struct RgbToFrame {
    scaler: SwsContext,
    width:  u32,
    height: u32,
}

impl RgbToFrame {
    pub fn new(dst_format: Pixel, width: u32, height: u32) -> Result<Self> {
        let scaler = SwsContext::get(
            Pixel::RGB24, width, height,
            dst_format, width, height,
            Flags::BILINEAR,
        )?;
        Ok(Self { scaler, width, height })
    }

    /// Build a stride-correct RGB24 frame from `rgb` and scale it to the
    /// encoder format. `rgb` must hold exactly `width * height * 3` bytes.
    pub fn convert(&mut self, rgb: &[u8]) -> Result<VideoFrame> {
        let w = self.width as usize;
        let h = self.height as usize;
        anyhow::ensure!(
            rgb.len() == w * h * 3,
            "RGB buffer is {} bytes, expected {}",
            rgb.len(),
            w * h * 3,
        );

        let mut src = VideoFrame::new(Pixel::RGB24, self.width, self.height);
        {
            let stride = src.stride(0);
            let dst    = src.data_mut(0);
            for row in 0..h {
                dst[row * stride..row * stride + w * 3]
                    .copy_from_slice(&rgb[row * w * 3..(row + 1) * w * 3]);
            }
        }

        let mut out = VideoFrame::empty();
        self.scaler.run(&src, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pure sws work — no container or codec involved, so this runs against
    // the linked FFmpeg without any media fixtures.
    #[test]
    fn rgb_to_yuv_solid_red() {
        let w = 16u32;
        let h = 16u32;
        let rgb = [255u8, 0, 0].repeat((w * h) as usize);

        let mut conv = RgbToFrame::new(Pixel::YUV420P, w, h).unwrap();
        let frame = conv.convert(&rgb).unwrap();

        assert_eq!(frame.format(), Pixel::YUV420P);
        assert_eq!(frame.width(), w);
        assert_eq!(frame.height(), h);
        // BT.601 limited-range luma for pure red is ~81.
        let y = frame.data(0)[0];
        assert!((70..=95).contains(&y), "unexpected luma {y}");
    }

    #[test]
    fn rgb_buffer_size_is_checked() {
        let mut conv = RgbToFrame::new(Pixel::YUV420P, 16, 16).unwrap();
        assert!(conv.convert(&[0u8; 10]).is_err());
    }
}
