//! Scoped staging of numbered frame images.
//!
//! Frames are written as `frame_000000.png`, `frame_000001.png`, ... into a
//! temporary directory that is removed when the [`StagingArea`] is dropped.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::normalize::NormalizedFrame;

/// File name prefix of staged frames.
pub const FRAME_FILE_PREFIX: &str = "frame_";
/// Extension of staged frames.
pub const FRAME_FILE_EXTENSION: &str = "png";
/// Zero-padded width of the frame index.
pub const FRAME_INDEX_WIDTH: usize = 6;
/// Frame indices must fit the padded width to sort lexicographically.
pub const MAX_STAGED_FRAMES: usize = 1_000_000;

/// File name of the frame at `index`.
pub fn frame_file_name(index: usize) -> String {
    format!(
        "{FRAME_FILE_PREFIX}{index:0width$}.{FRAME_FILE_EXTENSION}",
        width = FRAME_INDEX_WIDTH
    )
}

/// FFmpeg image2 pattern matching [`frame_file_name`].
pub fn frame_file_pattern() -> String {
    format!("{FRAME_FILE_PREFIX}%0{FRAME_INDEX_WIDTH}d.{FRAME_FILE_EXTENSION}")
}

/// Temporary directory holding the staged frames of one conversion.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    frame_count: usize,
    dimensions: Option<(u32, u32)>,
}

impl StagingArea {
    /// Create a fresh staging directory, inside `parent` when given.
    pub fn create(parent: Option<&Path>) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dicomvid-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!("Created staging area {}", dir.path().display());

        Ok(Self {
            dir,
            frame_count: 0,
            dimensions: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    /// Width and height shared by every staged frame.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.path().join(frame_file_name(index))
    }

    /// Input pattern passed to FFmpeg.
    pub fn input_pattern(&self) -> PathBuf {
        self.path().join(frame_file_pattern())
    }

    /// Append a frame under the next sequential index.
    pub fn write_frame(&mut self, frame: &NormalizedFrame) -> MediaResult<PathBuf> {
        if self.frame_count >= MAX_STAGED_FRAMES {
            return Err(MediaError::staging(format!(
                "more than {MAX_STAGED_FRAMES} frames cannot be numbered with {FRAME_INDEX_WIDTH} digits"
            )));
        }

        let dims = (frame.width(), frame.height());
        match self.dimensions {
            None => self.dimensions = Some(dims),
            Some(expected) if expected != dims => {
                return Err(MediaError::staging(format!(
                    "frame {} is {}x{} but earlier frames are {}x{}",
                    frame.index(),
                    dims.0,
                    dims.1,
                    expected.0,
                    expected.1
                )));
            }
            Some(_) => {}
        }

        let path = self.frame_path(self.frame_count);
        frame.to_rgb_image()?.save_with_format(&path, ImageFormat::Png)?;
        self.frame_count += 1;
        Ok(path)
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> MediaResult<()> {
        let path = self.path().to_path_buf();
        self.dir.close()?;
        debug!("Removed staging area {}", path.display());
        Ok(())
    }
}

/// Writes a sequence of normalized frames into a new [`StagingArea`].
#[derive(Debug, Clone, Default)]
pub struct FrameStager {
    parent: Option<PathBuf>,
}

impl FrameStager {
    /// Stage into the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage into a subdirectory of `parent`.
    pub fn in_dir(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: Some(parent.into()),
        }
    }

    /// Write every frame; the staging area is released if any frame fails.
    pub fn stage<I>(&self, frames: I) -> MediaResult<StagingArea>
    where
        I: IntoIterator<Item = MediaResult<NormalizedFrame>>,
    {
        let mut area = StagingArea::create(self.parent.as_deref())?;
        for frame in frames {
            let frame = frame?;
            let path = area.write_frame(&frame)?;
            if area.frame_count() % 100 == 0 {
                debug!("Staged {} frames (latest {})", area.frame_count(), path.display());
            }
        }

        if area.is_empty() {
            warn!("No frames were staged in {}", area.path().display());
        }
        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::RawFrame;
    use crate::normalize::FrameNormalizer;

    fn frame(index: usize, rows: usize, columns: usize) -> NormalizedFrame {
        let raw = RawFrame::new(
            index,
            rows,
            columns,
            1,
            (0..rows * columns).map(|v| (v + index) as i64).collect(),
        );
        FrameNormalizer::per_frame().normalize(&raw).unwrap()
    }

    #[test]
    fn test_frame_naming() {
        assert_eq!(frame_file_name(0), "frame_000000.png");
        assert_eq!(frame_file_name(42), "frame_000042.png");
        assert_eq!(frame_file_name(999_999), "frame_999999.png");
        assert_eq!(frame_file_pattern(), "frame_%06d.png");
    }

    #[test]
    fn test_names_sort_in_frame_order() {
        let mut names: Vec<String> = [10, 2, 999_999, 0, 100_000].iter().map(|&i| frame_file_name(i)).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                frame_file_name(0),
                frame_file_name(2),
                frame_file_name(10),
                frame_file_name(100_000),
                frame_file_name(999_999)
            ]
        );
    }

    #[test]
    fn test_stage_writes_one_file_per_frame() {
        let parent = TempDir::new().unwrap();
        let stager = FrameStager::in_dir(parent.path());
        let area = stager.stage((0..5).map(|i| Ok(frame(i, 4, 6)))).unwrap();

        assert_eq!(area.frame_count(), 5);
        assert_eq!(area.dimensions(), Some((6, 4)));
        let mut files: Vec<String> = std::fs::read_dir(area.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        files.sort();
        assert_eq!(files.len(), 5);
        assert_eq!(files[0], "frame_000000.png");
        assert_eq!(files[4], "frame_000004.png");

        let decoded = image::open(area.frame_path(0)).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (6, 4));
    }

    #[test]
    fn test_staging_area_removed_on_drop() {
        let parent = TempDir::new().unwrap();
        let path = {
            let area = FrameStager::in_dir(parent.path())
                .stage((0..2).map(|i| Ok(frame(i, 2, 2))))
                .unwrap();
            assert!(area.path().exists());
            area.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_staging_area_released_on_frame_error() {
        let parent = TempDir::new().unwrap();
        let frames = (0..3).map(|i| {
            if i == 2 {
                Err(MediaError::normalization("bad frame"))
            } else {
                Ok(frame(i, 2, 2))
            }
        });
        let err = FrameStager::in_dir(parent.path()).stage(frames).unwrap_err();
        assert!(matches!(err, MediaError::Normalization(_)));
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_changing_dimensions() {
        let parent = TempDir::new().unwrap();
        let mut area = StagingArea::create(Some(parent.path())).unwrap();
        area.write_frame(&frame(0, 2, 2)).unwrap();
        let err = area.write_frame(&frame(1, 4, 4)).unwrap_err();
        assert!(matches!(err, MediaError::Staging(_)));
        assert_eq!(area.frame_count(), 1);
    }

    #[test]
    fn test_rejects_frames_past_index_width() {
        let parent = TempDir::new().unwrap();
        let mut area = StagingArea::create(Some(parent.path())).unwrap();
        area.frame_count = MAX_STAGED_FRAMES;

        let err = area.write_frame(&frame(0, 2, 2)).unwrap_err();
        assert!(matches!(err, MediaError::Staging(_)));
        assert_eq!(area.frame_count(), MAX_STAGED_FRAMES);
        assert_eq!(std::fs::read_dir(area.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_close_removes_directory() {
        let area = StagingArea::create(None).unwrap();
        let path = area.path().to_path_buf();
        area.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_input_pattern() {
        let area = StagingArea::create(None).unwrap();
        assert_eq!(area.input_pattern(), area.path().join("frame_%06d.png"));
    }
}
