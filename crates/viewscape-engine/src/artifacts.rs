//! Output artifacts and the sinks that store them.
//!
//! Sinks are fire-and-report: a failed write is logged and reported as
//! `false`, never raised into the query that produced the artifact.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use serde::Serialize;

use viewscape_metrics::MetricTable;

use crate::batch::CumulativeRaster;
use crate::result::{TanRaster, ViewShedResult, ViewTanResult};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Classification window (-1 / 0 / 1 per cell).
    Classification {
        col0: usize,
        row0: usize,
        cols: usize,
        rows: usize,
        samples: Vec<i8>,
    },
    Panorama(TanRaster),
    Cumulative(CumulativeRaster),
    Metrics(MetricTable),
}

impl Artifact {
    pub fn classification(result: &ViewShedResult) -> Self {
        let w = result.window();
        Artifact::Classification {
            col0: w.col0,
            row0: w.row0,
            cols: w.cols,
            rows: w.rows,
            samples: result.samples().to_vec(),
        }
    }

    pub fn panorama(result: &ViewTanResult) -> Self {
        Artifact::Panorama(result.to_raster())
    }
}

/// Destination for named artifacts.
pub trait RasterSink: Send + Sync {
    fn write(&self, name: &str, artifact: &Artifact) -> io::Result<()>;
}

/// Write one artifact, logging a failure instead of returning it.
pub fn write_artifact(sink: &dyn RasterSink, name: &str, artifact: &Artifact) -> bool {
    match sink.write(name, artifact) {
        Ok(()) => {
            debug!("artifact {name} written");
            true
        }
        Err(e) => {
            warn!("failed to write artifact {name}: {e}");
            false
        }
    }
}

/// Keeps artifacts in memory, in write order.
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<(String, Artifact)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Artifact> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a.clone())
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RasterSink for MemorySink {
    fn write(&self, name: &str, artifact: &Artifact) -> io::Result<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), artifact.clone()));
        Ok(())
    }
}

/// Writes each artifact as `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl RasterSink for DirectorySink {
    fn write(&self, name: &str, artifact: &Artifact) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut out = BufWriter::new(File::create(self.path_for(name))?);
        serde_json::to_writer(&mut out, artifact)?;
        out.flush()
    }
}
