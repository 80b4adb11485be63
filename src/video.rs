// src/video.rs - Frame images extracted from a swing video
//
// Decoding the video itself happens upstream (ffmpeg or the capture app);
// this module only reads the extracted stills.
use image::DynamicImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Resolves per-frame image references against a base directory. Each file
/// is decoded once; frames without a usable image share one blank canvas.
pub struct FrameImages {
    base_dir: PathBuf,
    blank: Arc<DynamicImage>,
    cache: HashMap<PathBuf, Arc<DynamicImage>>,
}

impl FrameImages {
    pub fn new(base_dir: impl AsRef<Path>, blank_width: u32, blank_height: u32) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            blank: Arc::new(DynamicImage::new_rgb8(blank_width, blank_height)),
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, reference: Option<&Path>) -> Arc<DynamicImage> {
        let Some(reference) = reference else {
            return Arc::clone(&self.blank);
        };
        let path = if reference.is_absolute() {
            reference.to_path_buf()
        } else {
            self.base_dir.join(reference)
        };
        if let Some(img) = self.cache.get(&path) {
            return Arc::clone(img);
        }
        match image::open(&path) {
            Ok(img) => {
                let img = Arc::new(img);
                self.cache.insert(path, Arc::clone(&img));
                img
            }
            Err(e) => {
                warn!("Failed to load frame image {}: {}, using blank frame", path.display(), e);
                Arc::clone(&self.blank)
            }
        }
    }

    pub fn loaded(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn missing_images_fall_back_to_blank() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(6, 6).save(dir.path().join("a.png")).unwrap();
        let mut images = FrameImages::new(dir.path(), 32, 16);

        let a1 = images.resolve(Some(Path::new("a.png")));
        let a2 = images.resolve(Some(Path::new("a.png")));
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(a1.width(), 6);

        let missing = images.resolve(Some(Path::new("gone.png")));
        assert_eq!((missing.width(), missing.height()), (32, 16));
        assert!(Arc::ptr_eq(&missing, &images.resolve(None)));
        assert_eq!(images.loaded(), 1);
    }
}
