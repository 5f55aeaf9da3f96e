use std::error::Error;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

/// immutable RGBA8 raster plus stride metadata. never mutated after load;
/// the rest of the system refers to pool entries by stable index only.
pub struct SourceImage {
    pub width: u32,
    pub height: u32,
    /// row stride in pixels (buffer holds stride * height * 4 bytes)
    pub stride: u32,
    pub data: Vec<u8>,
}

impl SourceImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert!(
            data.len() >= (width as usize) * (height as usize) * 4,
            "SourceImage: buffer too small for {width}x{height}"
        );
        Self { width, height, stride: width, data }
    }

    /// uniform fill, mostly useful for tests and blank reconstruction targets
    #[allow(dead_code)]
    pub fn solid(width: u32, height: u32, byte: u8) -> Self {
        Self::new(width, height, vec![byte; (width * height * 4) as usize])
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        (self.stride * self.height * 4) as usize
    }
}

/// shared pool of source tiles. read-only for as long as anything references
/// it; progressive refinement swaps the whole pool and tells the habitat to
/// re-resolve (see Habitat::reload_after_pool_change).
pub struct ImagePool {
    images: Vec<SourceImage>,
}

impl ImagePool {
    pub fn new(images: Vec<SourceImage>) -> Self {
        assert!(!images.is_empty(), "ImagePool: empty pool");
        assert!(
            images.iter().all(|i| i.width > 0 && i.height > 0),
            "ImagePool: zero-sized image"
        );
        Self { images }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &SourceImage {
        &self.images[index]
    }

    /// detach the highest-index image, typically to serve as the
    /// reconstruction target while the rest stay in the pool
    pub fn split_last(mut self) -> (ImagePool, SourceImage) {
        assert!(
            self.images.len() >= 2,
            "ImagePool: need at least two images to split off a target"
        );
        let target = self.images.pop().expect("len checked above");
        (self, target)
    }

    /// load every decodable image under `dir`, downscaled so each holds about
    /// `px_per_image` pixels. files that fail to decode are logged and
    /// skipped; an empty result is an error, not an empty pool.
    pub fn load_directory(dir: &Path, px_per_image: u32) -> Result<ImagePool, Box<dyn Error>> {
        profiling::scope!("ImagePool::load_directory");

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort(); // stable indices across runs

        let images: Vec<SourceImage> = paths
            .par_iter()
            .filter_map(|path| match load_scaled(path, px_per_image) {
                Ok(img) => {
                    log::debug!(
                        "loaded {} ({}x{})",
                        path.display(),
                        img.width,
                        img.height
                    );
                    Some(img)
                }
                Err(err) => {
                    log::warn!("skipping {}: {err}", path.display());
                    None
                }
            })
            .collect();

        if images.is_empty() {
            return Err(format!("no usable images in {}", dir.display()).into());
        }
        log::info!("loaded {} source images from {}", images.len(), dir.display());
        Ok(ImagePool::new(images))
    }
}

/// decode one file and shrink it to roughly `px_per_image` pixels,
/// preserving aspect ratio. images already under budget keep their size.
pub fn load_scaled(path: &Path, px_per_image: u32) -> Result<SourceImage, Box<dyn Error>> {
    profiling::scope!("load_scaled");

    let img = image::open(path)?;
    let (w, h) = (img.width(), img.height());
    let area = (w as f64) * (h as f64);
    let scale = (px_per_image as f64 / area).min(1.0).sqrt();

    let img = if scale < 1.0 {
        let nw = ((w as f64 * scale) as u32).max(1);
        let nh = ((h as f64 * scale) as u32).max(1);
        img.resize_exact(nw, nh, image::imageops::FilterType::Triangle)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (w, h) = (rgba.width(), rgba.height());
    Ok(SourceImage::new(w, h, rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_image_is_well_formed() {
        let img = SourceImage::solid(3, 2, 0xAB);
        assert_eq!(img.stride, 3);
        assert_eq!(img.byte_len(), 3 * 2 * 4);
        assert!(img.data.iter().all(|&b| b == 0xAB));
    }

    #[test]
    #[should_panic]
    fn undersized_buffer_fails_fast() {
        SourceImage::new(4, 4, vec![0u8; 10]);
    }

    #[test]
    #[should_panic]
    fn empty_pool_fails_fast() {
        ImagePool::new(Vec::new());
    }

    #[test]
    fn split_last_detaches_the_target() {
        let pool = ImagePool::new(vec![
            SourceImage::solid(2, 2, 0x11),
            SourceImage::solid(2, 2, 0x22),
            SourceImage::solid(3, 3, 0x33),
        ]);
        let (pool, target) = pool.split_last();
        assert_eq!(pool.count(), 2);
        assert_eq!(target.width, 3);
        assert!(target.data.iter().all(|&b| b == 0x33));
    }
}
