//! Image decoding and width-bound resizing for derived variants.

use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::io::Cursor;

/// A decoded canonical image together with the format it arrived in.
pub struct SourceImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl SourceImage {
    /// Sniff the format from the bytes and decode.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let format = image::guess_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        Ok(Self { image, format })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Render a copy `width` pixels wide, keeping the aspect ratio.
    ///
    /// Encodes in the source format, falling back to PNG when no encoder is
    /// available for it. Output is deterministic for a given source.
    pub fn render(&self, width: u32) -> Result<Vec<u8>, image::ImageError> {
        let (src_w, src_h) = self.dimensions();
        let height = scaled_height(src_w, src_h, width);
        let resized = self.image.resize_exact(width, height, FilterType::Lanczos3);

        let mut buf = Vec::new();
        match resized.write_to(&mut Cursor::new(&mut buf), self.format) {
            Ok(()) => Ok(buf),
            Err(err) => {
                tracing::debug!(format = ?self.format, error = %err, "falling back to PNG");
                buf.clear();
                resized.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
                Ok(buf)
            }
        }
    }
}

fn scaled_height(src_w: u32, src_h: u32, width: u32) -> u32 {
    if src_w == 0 {
        return 1;
    }
    let scaled = (u64::from(src_h) * u64::from(width) + u64::from(src_w) / 2) / u64::from(src_w);
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}
