//! Tile-to-image conversion and PNG encoding.
//!
//! The engine paints premultiplied 32-bit pixels into a leased
//! [`TileBuffer`]; this module turns that buffer into an [`RgbaImage`] and
//! encodes rendered pages to PNG, in parallel when there are several.

use crate::buffer::TileBuffer;
use crate::config::RenderConfig;
use crate::engine::TileMode;
use crate::error::{OfficeError, Result};
use image::RgbaImage;
use rayon::prelude::*;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bytes per painted pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Validate tile dimensions and return the buffer length they need.
pub fn tile_len(width: u32, height: u32, max_dimension: u32) -> Result<usize> {
    let invalid = || OfficeError::InvalidDimensions { width, height };

    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(invalid());
    }

    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(BYTES_PER_PIXEL))
        .ok_or_else(invalid)
}

/// Copy a painted tile into a new image, starting at the buffer's current
/// read position.
pub fn copy_tile(
    buffer: &mut TileBuffer,
    width: u32,
    height: u32,
    mode: TileMode,
    config: &RenderConfig,
) -> Result<RgbaImage> {
    let mut image = RgbaImage::new(width, height);
    buffer.read_exact(&mut image)?;

    if mode == TileMode::Bgra {
        for pixel in image.pixels_mut() {
            pixel.0.swap(0, 2);
        }
    }

    if config.use_alpha {
        Ok(unpremultiply(image))
    } else {
        Ok(apply_background(image, config.background_color))
    }
}

/// Composite premultiplied pixels over a solid background.
pub fn apply_background(mut image: RgbaImage, background: (u8, u8, u8)) -> RgbaImage {
    let (r, g, b) = background;

    for pixel in image.pixels_mut() {
        let inv_alpha = 255 - pixel[3] as u32;
        if inv_alpha > 0 {
            pixel[0] = blend(pixel[0], r, inv_alpha);
            pixel[1] = blend(pixel[1], g, inv_alpha);
            pixel[2] = blend(pixel[2], b, inv_alpha);
            pixel[3] = 255;
        }
    }

    image
}

fn blend(premultiplied: u8, background: u8, inv_alpha: u32) -> u8 {
    let value = premultiplied as u32 + (background as u32 * inv_alpha + 127) / 255;
    value.min(255) as u8
}

/// Convert premultiplied pixels to straight alpha.
pub fn unpremultiply(mut image: RgbaImage) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as u32;
        match alpha {
            255 => {}
            0 => pixel.0 = [0, 0, 0, 0],
            _ => {
                for channel in &mut pixel.0[..3] {
                    let value = (*channel as u32 * 255 + alpha / 2) / alpha;
                    *channel = value.min(255) as u8;
                }
            }
        }
    }

    image
}

fn png_compression(level: u8) -> png::Compression {
    match level {
        0..=2 => png::Compression::Fast,
        3..=7 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Encode an image to PNG bytes.
pub fn encode_png(image: &RgbaImage, compression: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png_compression(compression));

    let mut writer = encoder.write_header().map_err(|e| {
        OfficeError::PngEncodingError(format!("Failed to write PNG header: {}", e))
    })?;

    writer.write_image_data(image.as_raw()).map_err(|e| {
        OfficeError::PngEncodingError(format!("Failed to write PNG data: {}", e))
    })?;

    drop(writer);

    Ok(buffer.into_inner())
}

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page index (0-based).
    pub page_index: usize,

    /// Rendered pixels.
    pub image: RgbaImage,
}

impl RenderedPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn encode_png(&self, compression: u8) -> Result<Vec<u8>> {
        encode_png(&self.image, compression)
    }

    /// Encode and write to `path`.
    pub fn save_png(&self, path: &Path, compression: u8) -> Result<()> {
        let data = self.encode_png(compression)?;
        std::fs::write(path, data).map_err(|e| OfficeError::OutputDirError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Encode pages in parallel and write `{prefix}_page_{NNNN}.png` files
/// (1-based page numbers). Returns the written paths in page order.
pub fn write_pages_png(
    pool: &rayon::ThreadPool,
    pages: &[RenderedPage],
    output_dir: &Path,
    prefix: &str,
    compression: u8,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| OfficeError::OutputDirError {
        path: output_dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let written: Vec<Result<PathBuf>> = pool.install(|| {
        pages
            .par_iter()
            .map(|page| {
                let filename = format!("{}_page_{:04}.png", prefix, page.page_index + 1);
                let path = output_dir.join(filename);
                page.save_png(&path, compression)?;
                Ok(path)
            })
            .collect()
    });

    let paths = written.into_iter().collect::<Result<Vec<_>>>()?;
    debug!("Wrote {} PNG pages to {:?}", paths.len(), output_dir);
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_tile_len() {
        assert_eq!(tile_len(200, 150, 16384).unwrap(), 200 * 150 * 4);
        assert_eq!(tile_len(1, 1, 1).unwrap(), 4);
    }

    #[test]
    fn test_tile_len_rejects_bad_dimensions() {
        assert!(matches!(
            tile_len(0, 10, 100),
            Err(OfficeError::InvalidDimensions { width: 0, height: 10 })
        ));
        assert!(tile_len(10, 0, 100).is_err());
        assert!(tile_len(101, 10, 100).is_err());
        assert!(tile_len(10, 101, 100).is_err());
    }

    #[test]
    fn test_copy_tile_swizzles_bgra() {
        let mut buffer = TileBuffer::from_vec(vec![10, 20, 30, 255, 1, 2, 3, 255]);
        let image = copy_tile(
            &mut buffer,
            2,
            1,
            TileMode::Bgra,
            &RenderConfig::default(),
        )
        .unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([30, 20, 10, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([3, 2, 1, 255]));
    }

    #[test]
    fn test_copy_tile_keeps_rgba() {
        let mut buffer = TileBuffer::from_vec(vec![10, 20, 30, 255]);
        let image = copy_tile(&mut buffer, 1, 1, TileMode::Rgba, &RenderConfig::default()).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_copy_tile_flattens_unless_alpha() {
        let flat = copy_tile(
            &mut TileBuffer::from_vec(vec![0, 0, 0, 0]),
            1,
            1,
            TileMode::Rgba,
            &RenderConfig::default(),
        )
        .unwrap();
        assert_eq!(flat.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));

        let keep = copy_tile(
            &mut TileBuffer::from_vec(vec![0, 0, 0, 0]),
            1,
            1,
            TileMode::Rgba,
            &RenderConfig::default().use_alpha(true),
        )
        .unwrap();
        assert_eq!(keep.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_copy_tile_short_buffer_fails() {
        let mut buffer = TileBuffer::from_vec(vec![0; 4]);
        let result = copy_tile(&mut buffer, 2, 2, TileMode::Rgba, &RenderConfig::default());
        assert!(matches!(result, Err(OfficeError::Io(_))));
    }

    #[test]
    fn test_apply_background_half_alpha() {
        let mut image = RgbaImage::new(1, 1);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 128]));
        let out = apply_background(image, (255, 255, 255));
        assert_eq!(out.get_pixel(0, 0), &Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn test_copy_tile_flattens_premultiplied_edge() {
        let image = copy_tile(
            &mut TileBuffer::from_vec(vec![64, 64, 64, 128]),
            1,
            1,
            TileMode::Rgba,
            &RenderConfig::default(),
        )
        .unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([191, 191, 191, 255]));

        let on_black = copy_tile(
            &mut TileBuffer::from_vec(vec![64, 32, 0, 128]),
            1,
            1,
            TileMode::Rgba,
            &RenderConfig::default().background_color((0, 0, 0)),
        )
        .unwrap();
        assert_eq!(on_black.get_pixel(0, 0), &Rgba([64, 32, 0, 255]));
    }

    #[test]
    fn test_copy_tile_unpremultiplies_with_alpha() {
        let image = copy_tile(
            &mut TileBuffer::from_vec(vec![64, 32, 128, 128]),
            1,
            1,
            TileMode::Rgba,
            &RenderConfig::default().use_alpha(true),
        )
        .unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([128, 64, 255, 128]));
    }

    #[test]
    fn test_unpremultiply_keeps_opaque_and_clears_transparent() {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        image.put_pixel(1, 0, Rgba([9, 9, 9, 0]));
        let out = unpremultiply(image);
        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(out.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_encode_png_small_image() {
        let mut image = RgbaImage::new(10, 10);
        for pixel in image.pixels_mut() {
            *pixel = Rgba([255, 0, 0, 255]);
        }

        let png_data = encode_png(&image, 6).unwrap();
        assert!(png_data.len() > 8);
        assert_eq!(&png_data[0..8], &PNG_MAGIC);
    }

    #[test]
    fn test_write_pages_png_names_and_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let pages: Vec<RenderedPage> = (0..3)
            .map(|i| RenderedPage {
                page_index: i,
                image: RgbaImage::from_pixel(4, 3, Rgba([i as u8, 0, 0, 255])),
            })
            .collect();

        let paths = write_pages_png(&pool, &pages, dir.path(), "deck", 1).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths[0].ends_with("deck_page_0001.png"));
        assert!(paths[2].ends_with("deck_page_0003.png"));
        for path in &paths {
            let data = std::fs::read(path).unwrap();
            assert_eq!(&data[0..8], &PNG_MAGIC);
        }
    }
}
