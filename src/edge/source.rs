//! Frame sources for the edge sender

use super::EdgeError;
use crate::codec::{FrameEncoder, JpegCodec};
use bytes::Bytes;
use image::{imageops, DynamicImage, GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Produces encoded frame payloads, one per call
///
/// Implementations may block; the server calls them on the blocking pool.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Bytes, EdgeError>;
}

/// Cycles through the JPEG files of a directory in name order
pub struct DirectorySource {
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self, EdgeError> {
        let directory = directory.as_ref();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();
            let is_jpeg = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false);
            if is_jpeg && path.is_file() {
                files.push(path);
            }
        }

        if files.is_empty() {
            return Err(EdgeError::EmptyDirectory(directory.to_path_buf()));
        }
        files.sort();

        info!(directory = %directory.display(), files = files.len(), "Directory source opened");
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Bytes, EdgeError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let data = std::fs::read(path)?;
        debug!(file = %path.display(), bytes = data.len(), "Frame loaded");
        Ok(Bytes::from(data))
    }
}

/// Synthetic test pattern: a window sliding in a circle over a block texture
pub struct PatternSource {
    texture: GrayImage,
    width: u32,
    height: u32,
    codec: JpegCodec,
    frame: u64,
}

const PATTERN_MARGIN: u32 = 32;
const PATTERN_BLOCK: u32 = 8;
const PATTERN_SEED: u64 = 7;
const PATTERN_PERIOD: f64 = 120.0;

impl PatternSource {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            texture: block_texture(
                width + 2 * PATTERN_MARGIN,
                height + 2 * PATTERN_MARGIN,
                PATTERN_BLOCK,
                PATTERN_SEED,
            ),
            width,
            height,
            codec: JpegCodec::new(quality),
            frame: 0,
        }
    }

    /// Top-left corner of the window for a given frame number
    fn offset(&self, frame: u64) -> (u32, u32) {
        let phase = (frame as f64 / PATTERN_PERIOD) * std::f64::consts::TAU;
        let radius = (PATTERN_MARGIN - 1) as f64;
        let x = PATTERN_MARGIN as f64 + radius * phase.cos();
        let y = PATTERN_MARGIN as f64 + radius * phase.sin();
        (x.round() as u32, y.round() as u32)
    }
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self) -> Result<Bytes, EdgeError> {
        let (x, y) = self.offset(self.frame);
        self.frame += 1;

        let window = imageops::crop_imm(&self.texture, x, y, self.width, self.height).to_image();
        Ok(self.codec.encode(&DynamicImage::ImageLuma8(window))?)
    }
}

/// Grid of square blocks with seeded random intensities
pub fn block_texture(width: u32, height: u32, block: u32, seed: u64) -> GrayImage {
    let block = block.max(1);
    let columns = width.div_ceil(block) as usize;
    let rows = height.div_ceil(block) as usize;

    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<u8> = (0..columns * rows).map(|_| rng.gen()).collect();

    GrayImage::from_fn(width, height, |x, y| {
        let index = (y / block) as usize * columns + (x / block) as usize;
        Luma([values[index]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameDecoder;
    use std::fs;

    fn write_jpeg(path: &Path, shade: u8) {
        let image = GrayImage::from_pixel(16, 16, Luma([shade]));
        let payload = JpegCodec::default()
            .encode(&DynamicImage::ImageLuma8(image))
            .unwrap();
        fs::write(path, &payload).unwrap();
    }

    #[test]
    fn test_directory_source_cycles_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_jpeg(&dir.path().join("b.jpg"), 200);
        write_jpeg(&dir.path().join("a.JPEG"), 10);
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();
        let third = source.next_frame().unwrap();

        assert_eq!(first, fs::read(dir.path().join("a.JPEG")).unwrap());
        assert_eq!(second, fs::read(dir.path().join("b.jpg")).unwrap());
        assert_eq!(third, first);
    }

    #[test]
    fn test_empty_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectorySource::open(dir.path()),
            Err(EdgeError::EmptyDirectory(_))
        ));
    }

    #[test]
    fn test_pattern_source_produces_decodable_frames() {
        let mut source = PatternSource::new(96, 64, 80);
        let codec = JpegCodec::default();

        let first = source.next_frame().unwrap();
        let second = source.next_frame().unwrap();
        assert_ne!(first, second);

        let decoded = codec.decode(&first).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (96, 64));
    }

    #[test]
    fn test_pattern_window_stays_inside_texture() {
        let source = PatternSource::new(64, 48, 80);
        for frame in 0..PATTERN_PERIOD as u64 {
            let (x, y) = source.offset(frame);
            assert!(x + 64 <= source.texture.width());
            assert!(y + 48 <= source.texture.height());
        }
    }

    #[test]
    fn test_block_texture_is_deterministic() {
        let a = block_texture(40, 24, 8, 3);
        let b = block_texture(40, 24, 8, 3);
        assert_eq!(a, b);
        assert_eq!(a.get_pixel(0, 0), a.get_pixel(7, 7));
        assert_ne!(a, block_texture(40, 24, 8, 4));
    }
}
