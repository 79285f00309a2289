use std::io::Cursor;

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use super::{Frame, FrameSource};

/// Stands in for a camera when detections are simulated or no device is configured.
#[derive(Debug, Clone)]
pub struct SyntheticFrameSource {
    png: Vec<u8>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let img = RgbImage::from_fn(width.max(1), height.max(1), |x, y| {
            let shade = ((x + y) % 256) as u8;
            Rgb([shade, shade / 2, 255 - shade])
        });

        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .context("failed to encode synthetic frame")?;

        Ok(Self {
            png: out.into_inner(),
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    async fn capture(&self) -> Option<Frame> {
        Some(Frame::png(self.png.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_decodable_png() {
        let source = SyntheticFrameSource::new(64, 48).unwrap();
        let frame = source.capture().await.unwrap();
        assert_eq!(frame.mime, "image/png");

        let decoded = image::load_from_memory(&frame.bytes).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }
}
