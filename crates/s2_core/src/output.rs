//! Writing composites to disk as JPEG files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::composite::CompositeImage;

pub const JPEG_QUALITY: u8 = 90;
/// Edge length of the copy attached to posts.
pub const SMALL_IMAGE_SIZE: u32 = 2196;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("composite has no pixels")]
    EmptyImage,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },
}

/// Files produced for one composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub full: PathBuf,
    pub small: PathBuf,
}

impl Artifacts {
    pub fn paths(&self) -> [&Path; 2] {
        [self.full.as_path(), self.small.as_path()]
    }

    pub fn remove(&self) -> Result<(), OutputError> {
        for path in self.paths() {
            info!(path = %path.display(), "removing image");
            fs::remove_file(path).map_err(|source| OutputError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Write `{identifier}_rgb.jpg` and `{identifier}_rgb_small.jpg` into `dir`.
pub fn write_artifacts(image: &CompositeImage, dir: &Path) -> Result<Artifacts, OutputError> {
    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let rgb = to_rgb8(image)?;
    let artifacts = Artifacts {
        full: dir.join(format!("{}_rgb.jpg", image.identifier)),
        small: dir.join(format!("{}_rgb_small.jpg", image.identifier)),
    };
    save_jpeg(&rgb, &artifacts.full)?;

    let small = if rgb.width() > SMALL_IMAGE_SIZE || rgb.height() > SMALL_IMAGE_SIZE {
        imageops::resize(&rgb, SMALL_IMAGE_SIZE, SMALL_IMAGE_SIZE, FilterType::Triangle)
    } else {
        rgb
    };
    save_jpeg(&small, &artifacts.small)?;

    info!(
        full = %artifacts.full.display(),
        small = %artifacts.small.display(),
        "wrote images"
    );
    Ok(artifacts)
}

/// Quantise `[0, 1]` floats to 8-bit RGB.
pub fn to_rgb8(image: &CompositeImage) -> Result<RgbImage, OutputError> {
    let (height, width, channels) = image.pixels.dim();
    if height == 0 || width == 0 || channels != 3 {
        return Err(OutputError::EmptyImage);
    }
    let raw: Vec<u8> = image
        .pixels
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    RgbImage::from_raw(width as u32, height as u32, raw).ok_or(OutputError::EmptyImage)
}

fn save_jpeg(image: &RgbImage, path: &Path) -> Result<(), OutputError> {
    let file = File::create(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    image
        .write_with_encoder(encoder)
        .map_err(|err| OutputError::Encode {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    writer.flush().map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Coordinate;
    use chrono::NaiveDate;
    use ndarray::Array3;

    fn composite(size: usize) -> CompositeImage {
        CompositeImage {
            pixels: Array3::from_shape_fn((size, size, 3), |(y, x, c)| {
                ((y + x + c) % 7) as f32 / 6.0
            }),
            center: Coordinate::new(0.0, 0.0),
            identifier: "T32TMT_20200514T103031".to_string(),
            acquired: NaiveDate::from_ymd_opt(2020, 5, 14).expect("date"),
        }
    }

    #[test]
    fn writes_and_removes_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("nested");
        let artifacts = write_artifacts(&composite(16), &out).expect("write");

        assert_eq!(artifacts.full, out.join("T32TMT_20200514T103031_rgb.jpg"));
        assert_eq!(artifacts.small, out.join("T32TMT_20200514T103031_rgb_small.jpg"));
        let decoded = image::open(&artifacts.small).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 16));

        artifacts.remove().expect("remove");
        assert!(!artifacts.full.exists() && !artifacts.small.exists());
    }

    #[test]
    fn quantisation_clamps_values() {
        let mut image = composite(2);
        image.pixels[[0, 0, 0]] = 1.5;
        image.pixels[[0, 0, 1]] = -0.5;
        let rgb = to_rgb8(&image).expect("rgb");
        assert_eq!(&rgb.get_pixel(0, 0).0[..2], &[255, 0]);
    }

    #[test]
    fn empty_composite_is_an_error() {
        let mut image = composite(2);
        image.pixels = Array3::zeros((0, 0, 3));
        assert!(matches!(to_rgb8(&image), Err(OutputError::EmptyImage)));
    }
}
