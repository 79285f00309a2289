//! Frame capture collaborators.
//!
//! A [`FrameSource`] hands the polling loop one encoded image per round, or `None`
//! when nothing could be captured (the round is then skipped).

mod still_image;
mod synthetic;

pub use still_image::StillImageSource;
pub use synthetic::SyntheticFrameSource;

use std::io::Cursor;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat};

#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: "image/jpeg",
            captured_at: Utc::now(),
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: "image/png",
            captured_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self.mime {
            "image/png" => "frame.png",
            _ => "frame.jpg",
        }
    }
}

#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self) -> Option<Frame>;
}

/// Decodes any supported image and re-encodes it as baseline JPEG for upload.
pub fn encode_jpeg(raw: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(raw).context("failed to decode frame")?;
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_to(&mut out, ImageFormat::Jpeg)
        .context("failed to encode frame as JPEG")?;
    Ok(out.into_inner())
}
