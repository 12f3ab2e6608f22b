//! Thumbnail normalization with the `image` crate.
//!
//! Whatever strategy produced the frame, the uploaded thumbnail is always an
//! RGB JPEG whose longest side is at most [`config::media::THUMBNAIL_MAX_SIDE`].

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, RgbImage};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::core::config;
use crate::core::utils::generate_code;
use crate::media::MediaError;

/// Where the thumbnail for `video` goes inside `dir`.
///
/// The random suffix keeps concurrent relays of same-named files apart.
pub fn thumbnail_path_for(video: &Path, dir: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("video");
    dir.join(format!("{}_{}_thumb.jpg", stem, generate_code(6).to_lowercase()))
}

/// Shrinks `image` to fit the thumbnail bound. Smaller images are kept as is.
pub fn bound(image: DynamicImage) -> RgbImage {
    let max = config::media::THUMBNAIL_MAX_SIDE;
    let image = if image.width() > max || image.height() > max {
        image.thumbnail(max, max)
    } else {
        image
    };
    image.to_rgb8()
}

/// Encodes `image` as a JPEG at the configured quality.
pub fn write_jpeg(image: &RgbImage, path: &Path) -> Result<(), MediaError> {
    let file = fs_err::File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, config::media::THUMBNAIL_JPEG_QUALITY);
    encoder.encode_image(image)?;
    Ok(())
}

/// Rewrites the image at `path` in place as a bounded RGB JPEG.
///
/// Blocking; run it on the worker pool.
pub fn normalize(path: &Path) -> Result<(u32, u32), MediaError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let rgb = bound(image);
    write_jpeg(&rgb, path)?;
    Ok(rgb.dimensions())
}
