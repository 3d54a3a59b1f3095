use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{ImageFormat, RgbaImage};

use crate::error::{CutError, Result};

/// Where a source image comes from
pub trait Source: Debug + Send + Sync {
    /// Type-specific validation that the source is accessible
    fn validate(&self) -> Result<()>;

    /// Get a human-readable description of this source
    fn description(&self) -> String;

    /// Decode the image as 8-bit RGBA
    fn load(&self) -> Result<RgbaImage>;
}

/// Where clipped pieces and per-puzzle artifacts are written.
///
/// Every path is relative to one puzzle, so concurrent puzzles never touch
/// the same location.
pub trait Sink: Debug + Send + Sync {
    /// Type-specific validation that the sink can be written to
    fn validate(&self) -> Result<()>;

    /// Get a human-readable description of this sink
    fn description(&self) -> String;

    /// Write a PNG and return where it ended up
    fn write_image(&self, puzzle_id: &str, relative: &str, image: &RgbaImage) -> Result<PathBuf>;

    fn write_text(&self, puzzle_id: &str, relative: &str, content: &str) -> Result<PathBuf>;

    /// Write a file shared by every puzzle of a cut, such as `edges.json`
    fn write_shared_text(&self, relative: &str, content: &str) -> Result<PathBuf>;
}

/// An image file decoded by the `image` crate
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn source_error(&self, reason: impl ToString) -> CutError {
        CutError::SourceImage {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl Source for FileSource {
    fn validate(&self) -> Result<()> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(self.source_error("file not found"))
        }
    }

    fn description(&self) -> String {
        format!("File: {}", self.path.display())
    }

    fn load(&self) -> Result<RgbaImage> {
        self.validate()?;
        let image = image::open(&self.path).map_err(|e| self.source_error(e))?;
        Ok(image.to_rgba8())
    }
}

/// An already decoded image
#[derive(Debug, Clone)]
pub struct MemorySource {
    pub name: String,
    pub image: RgbaImage,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

impl Source for MemorySource {
    fn validate(&self) -> Result<()> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(CutError::SourceImage {
                path: self.name.clone(),
                reason: "image is empty".to_string(),
            });
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!(
            "Memory: {} ({}x{})",
            self.name,
            self.image.width(),
            self.image.height()
        )
    }

    fn load(&self) -> Result<RgbaImage> {
        self.validate()?;
        Ok(self.image.clone())
    }
}

/// Writes `<root>/<puzzle_id>/<relative>`
#[derive(Debug, Clone)]
pub struct DirectorySink {
    pub root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn puzzle_dir(&self, puzzle_id: &str) -> PathBuf {
        self.root.join(puzzle_id)
    }

    fn prepare(&self, puzzle_id: &str, relative: &str) -> Result<PathBuf> {
        let path = self.puzzle_dir(puzzle_id).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

impl Sink for DirectorySink {
    fn validate(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Directory: {}", self.root.display())
    }

    fn write_image(&self, puzzle_id: &str, relative: &str, image: &RgbaImage) -> Result<PathBuf> {
        let path = self.prepare(puzzle_id, relative)?;
        image.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }

    fn write_text(&self, puzzle_id: &str, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.prepare(puzzle_id, relative)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn write_shared_text(&self, relative: &str, content: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(relative);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Keeps everything in memory, keyed by `<puzzle_id>/<relative>`
#[derive(Debug, Default)]
pub struct MemorySink {
    images: Mutex<BTreeMap<String, RgbaImage>>,
    texts: Mutex<BTreeMap<String, String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(puzzle_id: &str, relative: &str) -> String {
        Path::new(puzzle_id).join(relative).to_string_lossy().into_owned()
    }

    pub fn image(&self, puzzle_id: &str, relative: &str) -> Option<RgbaImage> {
        let images = self.images.lock().ok()?;
        images.get(&Self::key(puzzle_id, relative)).cloned()
    }

    pub fn text(&self, puzzle_id: &str, relative: &str) -> Option<String> {
        self.shared_text(&Self::key(puzzle_id, relative))
    }

    pub fn shared_text(&self, relative: &str) -> Option<String> {
        let texts = self.texts.lock().ok()?;
        texts.get(relative).cloned()
    }

    pub fn image_keys(&self) -> Vec<String> {
        self.images
            .lock()
            .map(|images| images.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Sink for MemorySink {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn description(&self) -> String {
        "Memory".to_string()
    }

    fn write_image(&self, puzzle_id: &str, relative: &str, image: &RgbaImage) -> Result<PathBuf> {
        let key = Self::key(puzzle_id, relative);
        self.images
            .lock()
            .map_err(|_| CutError::Raster("memory sink lock poisoned".to_string()))?
            .insert(key.clone(), image.clone());
        Ok(PathBuf::from(key))
    }

    fn write_text(&self, puzzle_id: &str, relative: &str, content: &str) -> Result<PathBuf> {
        let key = Self::key(puzzle_id, relative);
        self.texts
            .lock()
            .map_err(|_| CutError::Raster("memory sink lock poisoned".to_string()))?
            .insert(key.clone(), content.to_string());
        Ok(PathBuf::from(key))
    }

    fn write_shared_text(&self, relative: &str, content: &str) -> Result<PathBuf> {
        self.texts
            .lock()
            .map_err(|_| CutError::Raster("memory sink lock poisoned".to_string()))?
            .insert(relative.to_string(), content.to_string());
        Ok(PathBuf::from(relative))
    }
}
