//! Cutting many images through one frozen edge set on a bounded worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jigsaw_common::{PuzzleMetadata, utils};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::edges::EdgeSet;
use crate::error::{CutError, Result};
use crate::pipeline::{CutOutcome, EDGES_FILE, PuzzleCutter, PuzzleJob};
use crate::sources::{FileSource, Sink};

/// Cooperative cancellation flag, checked between images and between pieces
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One source image of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub puzzle_id: String,
    pub image_path: PathBuf,
}

impl BatchJob {
    /// Job named after the file stem
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let image_path = path.into();
        Self {
            puzzle_id: utils::puzzle_id_from_path(&image_path),
            image_path,
        }
    }

    /// Every decodable image directly inside `dir`, sorted by path
    pub fn discover(dir: &Path) -> Result<Vec<BatchJob>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(utils::is_image_file)
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths.into_iter().map(BatchJob::from_path).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub puzzle_id: String,
    pub reason: String,
}

/// What happened to every job of a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    /// Unusable source images and cancelled jobs
    pub skipped: Vec<JobReport>,
    pub failed: Vec<JobReport>,
    /// Pieces left out of otherwise successful puzzles
    pub piece_failures: usize,
    #[serde(skip)]
    pub puzzles: Vec<PuzzleMetadata>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }

    fn record(&mut self, puzzle_id: &str, result: Result<CutOutcome>) {
        match result {
            Ok(outcome) => {
                self.succeeded.push(puzzle_id.to_string());
                self.piece_failures += outcome.failures.len();
                self.puzzles.push(outcome.metadata);
            }
            Err(e) if e.is_source_error() || matches!(e, CutError::Cancelled) => {
                warn!("Skipping {}: {}", puzzle_id, e);
                self.skipped.push(JobReport {
                    puzzle_id: puzzle_id.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                warn!("Failed {}: {}", puzzle_id, e);
                self.failed.push(JobReport {
                    puzzle_id: puzzle_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Runs a [`PuzzleCutter`] over many images sharing one edge set
#[derive(Debug, Clone)]
pub struct BatchRunner {
    cutter: PuzzleCutter,
    threads: usize,
}

impl BatchRunner {
    pub fn new(cutter: PuzzleCutter) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { cutter, threads }
    }

    /// Bound the worker pool; 0 keeps the default
    pub fn with_threads(mut self, threads: usize) -> Self {
        if threads > 0 {
            self.threads = threads;
        }
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn cutter(&self) -> &PuzzleCutter {
        &self.cutter
    }

    /// Cut every job. Per-image failures are recorded in the summary; only
    /// failures to set up the pool or the sink are returned as errors.
    pub fn run(
        &self,
        jobs: &[BatchJob],
        edges: Arc<EdgeSet>,
        sink: &dyn Sink,
        cancel: &CancellationToken,
        requested_pieces: Option<u32>,
    ) -> Result<BatchSummary> {
        sink.validate()?;
        sink.write_shared_text(EDGES_FILE, &edges.to_json()?)?;

        let pool = ThreadPoolBuilder::new().num_threads(self.threads).build()?;
        info!(
            "Cutting {} images into {} pieces each on {} threads ({})",
            jobs.len(),
            edges.size.piece_count(),
            self.threads,
            sink.description()
        );

        let results: Vec<Result<CutOutcome>> = pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    if cancel.is_cancelled() {
                        return Err(CutError::Cancelled);
                    }
                    let source = FileSource::new(&job.image_path);
                    let puzzle = PuzzleJob {
                        puzzle_id: &job.puzzle_id,
                        source: &source,
                        requested_pieces,
                    };
                    self.cutter.cut(puzzle, &edges, sink, cancel)
                })
                .collect()
        });

        let mut summary = BatchSummary::default();
        for (job, result) in jobs.iter().zip(results) {
            summary.record(&job.puzzle_id, result);
        }
        info!(
            "Batch finished: {} succeeded, {} skipped, {} failed, {} pieces missing",
            summary.succeeded.len(),
            summary.skipped.len(),
            summary.failed.len(),
            summary.piece_failures
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DirectorySink, MemorySink};
    use image::{Rgba, RgbaImage};
    use jigsaw_common::GridSize;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn runner() -> BatchRunner {
        let cutter = PuzzleCutter::builder().without_scaling().build().unwrap();
        BatchRunner::new(cutter).with_threads(2)
    }

    #[test]
    fn test_batch_records_outcomes() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_image(input.path(), "a.png", 120, 90);
        write_image(input.path(), "b.png", 150, 100);
        write_image(input.path(), "tiny.png", 2, 2);
        std::fs::write(input.path().join("broken.jpg"), b"nope").unwrap();
        std::fs::write(input.path().join("notes.txt"), b"ignored").unwrap();

        let jobs = BatchJob::discover(input.path()).unwrap();
        assert_eq!(jobs.len(), 4);

        let runner = runner();
        let edges = Arc::new(runner.cutter().generate_edges(GridSize::new(3, 3), 11).unwrap());
        let sink = DirectorySink::new(output.path());
        let summary = runner
            .run(&jobs, edges.clone(), &sink, &CancellationToken::new(), None)
            .unwrap();

        assert_eq!(summary.succeeded, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(summary.skipped.len(), 2);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.total(), 4);
        for puzzle in &summary.puzzles {
            assert_eq!(puzzle.cut_id, edges.cut_id());
        }

        let pieces = output.path().join("a").join("pieces");
        assert_eq!(std::fs::read_dir(pieces).unwrap().count(), 9);
        assert!(output.path().join("b").join("metadata.json").is_file());
        let stored = std::fs::read_to_string(output.path().join(EDGES_FILE)).unwrap();
        assert_eq!(EdgeSet::from_json(&stored).unwrap(), *edges);
    }

    #[test]
    fn test_cancelled_batch_skips_everything() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_image(input.path(), "a.png", 60, 60);
        write_image(input.path(), "b.png", 60, 60);
        let jobs = BatchJob::discover(input.path()).unwrap();

        let runner = runner();
        let edges = Arc::new(runner.cutter().generate_edges(GridSize::new(2, 2), 1).unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = runner
            .run(&jobs, edges, &DirectorySink::new(output.path()), &cancel, None)
            .unwrap();
        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.skipped.len(), 2);
        assert!(!output.path().join("a").exists());
    }

    /// Memory sink that reports one piece of every puzzle as unclippable
    #[derive(Debug, Default)]
    struct RejectingSink {
        inner: MemorySink,
        piece: usize,
    }

    impl Sink for RejectingSink {
        fn validate(&self) -> Result<()> {
            self.inner.validate()
        }

        fn description(&self) -> String {
            "Rejecting".to_string()
        }

        fn write_image(&self, puzzle_id: &str, relative: &str, image: &RgbaImage) -> Result<PathBuf> {
            if relative == format!("pieces/{}", utils::piece_filename(self.piece)) {
                return Err(CutError::ClipFailure {
                    piece: self.piece,
                    reason: "outline covers no pixels".to_string(),
                });
            }
            self.inner.write_image(puzzle_id, relative, image)
        }

        fn write_text(&self, puzzle_id: &str, relative: &str, content: &str) -> Result<PathBuf> {
            self.inner.write_text(puzzle_id, relative, content)
        }

        fn write_shared_text(&self, relative: &str, content: &str) -> Result<PathBuf> {
            self.inner.write_shared_text(relative, content)
        }
    }

    #[test]
    fn test_piece_failures_are_warnings() {
        let input = tempfile::tempdir().unwrap();
        write_image(input.path(), "a.png", 90, 90);
        write_image(input.path(), "b.png", 120, 90);
        let jobs = BatchJob::discover(input.path()).unwrap();

        let runner = runner();
        let edges = Arc::new(runner.cutter().generate_edges(GridSize::new(3, 3), 4).unwrap());
        let sink = RejectingSink {
            piece: 4,
            ..RejectingSink::default()
        };
        let summary = runner
            .run(&jobs, edges, &sink, &CancellationToken::new(), None)
            .unwrap();

        assert_eq!(summary.succeeded.len(), 2);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.piece_failures, 2);
        for puzzle in &summary.puzzles {
            assert_eq!(puzzle.piece_count, 8);
            assert!(puzzle.piece(4).is_none());
            assert_eq!(puzzle.warning.as_deref(), Some("Missing pieces: 4"));
            let written = sink.inner.text(&puzzle.puzzle_id, "metadata.json").unwrap();
            assert_eq!(&PuzzleMetadata::from_json(&written).unwrap(), puzzle);
        }
        assert!(sink.inner.image("a", "pieces/piece_3.png").is_some());
        assert!(sink.inner.image("a", "pieces/piece_4.png").is_none());
    }

    #[test]
    fn test_job_from_path() {
        let job = BatchJob::from_path("/data/images/sunset.jpeg");
        assert_eq!(job.puzzle_id, "sunset");
    }
}
