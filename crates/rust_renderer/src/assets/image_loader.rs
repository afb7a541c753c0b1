//! Image decoding for texture uploads
//!
//! Images are decoded with the `image` crate into one of the tightly packed
//! layouts the texture formats expect: R8, R8G8, R8G8B8A8 or RGBA32F.

use std::path::Path;

use crate::assets::AssetError;

/// Decoding hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLoadOptions {
    /// Flip rows so the first row in memory is the bottom of the image
    pub flip_vertically: bool,
    /// Decode to 32-bit float channels
    pub hdr: bool,
}

impl Default for ImageLoadOptions {
    fn default() -> Self {
        Self {
            flip_vertically: true,
            hdr: false,
        }
    }
}

/// Decoded image ready for staging
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Tightly packed pixel bytes
    pub pixels: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channels per pixel in `pixels`
    pub channels: u8,
    /// Channels in the source file
    pub source_channels: u8,
    /// Whether `pixels` holds `f32` channels
    pub hdr: bool,
}

impl ImageData {
    /// Decode an image file
    pub fn from_file(path: impl AsRef<Path>, options: ImageLoadOptions) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| AssetError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let data = Self::from_dynamic(image, options);
        log::debug!(
            "Decoded {} ({}x{}, {} source channels)",
            path.display(),
            data.width,
            data.height,
            data.source_channels
        );
        Ok(data)
    }

    fn from_dynamic(image: image::DynamicImage, options: ImageLoadOptions) -> Self {
        let image = if options.flip_vertically { image.flipv() } else { image };
        let (width, height) = (image.width(), image.height());
        let source_channels = image.color().channel_count();

        if options.hdr {
            let rgba = image.to_rgba32f();
            return Self {
                pixels: bytemuck::cast_slice::<f32, u8>(rgba.as_raw().as_slice()).to_vec(),
                width,
                height,
                channels: 4,
                source_channels,
                hdr: true,
            };
        }

        let (pixels, channels) = match source_channels {
            1 => (image.to_luma8().into_raw(), 1),
            2 => (image.to_luma_alpha8().into_raw(), 2),
            _ => (image.to_rgba8().into_raw(), 4),
        };

        Self {
            pixels,
            width,
            height,
            channels,
            source_channels,
            hdr: false,
        }
    }

    /// Size of the pixel payload in bytes
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgba};

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("rust_renderer_img_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir.join(name)
    }

    #[test]
    fn rgba_png_is_flipped_on_load() {
        let path = temp_path("stripes.png");
        let img = ImageBuffer::from_fn(1, 2, |_, y| {
            if y == 0 {
                Rgba([255u8, 0, 0, 255])
            } else {
                Rgba([0u8, 0, 255, 255])
            }
        });
        img.save(&path).expect("write png");

        let data = ImageData::from_file(&path, ImageLoadOptions::default()).expect("decode");

        assert_eq!((data.width, data.height, data.channels), (1, 2, 4));
        assert_eq!(&data.pixels[0..4], &[0, 0, 255, 255]);
        assert_eq!(&data.pixels[4..8], &[255, 0, 0, 255]);
    }

    #[test]
    fn grayscale_stays_single_channel() {
        let path = temp_path("gray.png");
        let img = ImageBuffer::from_pixel(4, 4, Luma([128u8]));
        img.save(&path).expect("write png");

        let options = ImageLoadOptions { flip_vertically: false, hdr: false };
        let data = ImageData::from_file(&path, options).expect("decode");

        assert_eq!(data.channels, 1);
        assert_eq!(data.size_bytes(), 16);
    }

    #[test]
    fn hdr_request_yields_float_rgba() {
        let path = temp_path("float.png");
        let img = ImageBuffer::from_pixel(2, 2, Rgba([255u8, 255, 255, 255]));
        img.save(&path).expect("write png");

        let options = ImageLoadOptions { flip_vertically: true, hdr: true };
        let data = ImageData::from_file(&path, options).expect("decode");

        assert!(data.hdr);
        assert_eq!(data.size_bytes(), 2 * 2 * 4 * std::mem::size_of::<f32>());
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let result = ImageData::from_file("definitely/not/here.png", ImageLoadOptions::default());
        assert!(matches!(result, Err(AssetError::Decode { .. })));
    }
}
