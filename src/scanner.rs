//! Playback of recorded traces.
use crate::dtype::Element;
use crate::episode::Episode;
use crate::error::CorruptionError;
use crate::manifest::Manifest;
use crate::writer::{FILE_PREFIX, MANIFEST_EXTENSION, PAYLOAD_EXTENSION};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::vec;
use tracing::warn;

/// Scan a trace directory, calling `callback` once for each recorded episode.
///
/// Episodes are visited batch by batch in file name order,
/// and in recorded order within each batch.
/// Corrupt batches and episodes are skipped and listed in the returned report.
/// Only failing to list `directory` is an error.
pub fn scan<O, A, P, F>(directory: P, callback: F) -> io::Result<ScanReport>
where
    O: Element,
    A: Element,
    P: Into<PathBuf>,
    F: FnMut(Episode<O, A>),
{
    TraceScanner::new(directory).scan(callback)
}

/// Something that was skipped while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// The manifest (or orphaned payload) file.
    pub path: PathBuf,
    /// Index of the skipped episode; `None` if the whole batch was skipped.
    pub episode: Option<u64>,
    pub reason: CorruptionError,
}

/// Summary of a scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Number of batches whose manifest and payload were loaded.
    pub batches_read: usize,
    /// Number of episodes reconstructed.
    pub episodes_read: usize,
    pub skipped: Vec<Skipped>,
}

impl ScanReport {
    /// Whether nothing was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, path: PathBuf, episode: Option<u64>, reason: CorruptionError) {
        match episode {
            Some(index) => warn!(
                path = %path.display(),
                episode = index,
                %reason,
                "skipping corrupt trace episode"
            ),
            None => warn!(path = %path.display(), %reason, "skipping corrupt trace batch"),
        }
        self.skipped.push(Skipped {
            path,
            episode,
            reason,
        });
    }
}

/// The files of one batch, grouped by file stem.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchFiles {
    pub manifest: Option<PathBuf>,
    pub payload: Option<PathBuf>,
}

/// Reads episodes recorded into a directory.
///
/// `O` and `A` are the observation and action element types;
/// batches stored with other element types are skipped.
#[derive(Debug, Clone)]
pub struct TraceScanner<O, A> {
    directory: PathBuf,
    element_types: PhantomData<fn() -> (O, A)>,
}

impl<O, A> TraceScanner<O, A> {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            element_types: PhantomData,
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Batch files in the directory ordered by file stem.
    ///
    /// Files that are not batch files, including partially written ones, are ignored.
    pub fn batch_files(&self) -> io::Result<Vec<BatchFiles>> {
        let mut batches: BTreeMap<String, BatchFiles> = BTreeMap::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let (stem, extension) = match (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) {
                (Some(stem), Some(extension)) => (stem, extension),
                _ => continue,
            };
            if !stem.starts_with(FILE_PREFIX) || !path.is_file() {
                continue;
            }
            let is_manifest = match extension {
                MANIFEST_EXTENSION => true,
                PAYLOAD_EXTENSION => false,
                _ => continue,
            };
            let files = batches.entry(stem.to_owned()).or_default();
            if is_manifest {
                files.manifest = Some(path);
            } else {
                files.payload = Some(path);
            }
        }
        Ok(batches.into_values().collect())
    }
}

impl<O: Element, A: Element> TraceScanner<O, A> {
    /// Lazily iterate over all recorded episodes.
    ///
    /// The directory is listed immediately; batches are read as the iterator advances.
    pub fn episodes(&self) -> io::Result<Episodes<O, A>> {
        Ok(Episodes {
            directory: self.directory.clone(),
            element_types: PhantomData,
            batches: self.batch_files()?.into_iter(),
            current: None,
            report: ScanReport::default(),
        })
    }

    /// Call `callback` on every recorded episode.
    pub fn scan<F>(&self, mut callback: F) -> io::Result<ScanReport>
    where
        F: FnMut(Episode<O, A>),
    {
        let mut episodes = self.episodes()?;
        for episode in &mut episodes {
            callback(episode);
        }
        Ok(episodes.into_report())
    }
}

/// A loaded batch being iterated.
#[derive(Debug)]
struct OpenBatch {
    path: PathBuf,
    manifest: Manifest,
    payload: Vec<u8>,
    next_entry: usize,
}

/// Iterator over the episodes of a trace directory.
///
/// Yields each episode once; scan again to restart.
#[derive(Debug)]
pub struct Episodes<O, A> {
    directory: PathBuf,
    element_types: PhantomData<fn() -> (O, A)>,
    batches: vec::IntoIter<BatchFiles>,
    current: Option<OpenBatch>,
    report: ScanReport,
}

impl<O, A> Episodes<O, A> {
    /// Report of the batches and episodes visited so far.
    #[must_use]
    pub const fn report(&self) -> &ScanReport {
        &self.report
    }

    #[must_use]
    pub fn into_report(self) -> ScanReport {
        self.report
    }
}

impl<O: Element, A: Element> Episodes<O, A> {
    /// Load the manifest and payload of a batch.
    fn open(&self, manifest_path: &Path) -> Result<OpenBatch, CorruptionError> {
        let manifest_bytes =
            fs::read(manifest_path).map_err(|err| CorruptionError::Read(err.to_string()))?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|err| CorruptionError::InvalidManifest(err.to_string()))?;

        // The payload must be a sibling of the manifest
        if Path::new(&manifest.payload).file_name() != Some(OsStr::new(&manifest.payload)) {
            return Err(CorruptionError::InvalidManifest(format!(
                "payload {:?} is not a file name",
                manifest.payload
            )));
        }
        let payload = fs::read(self.directory.join(&manifest.payload)).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                CorruptionError::MissingPayload
            } else {
                CorruptionError::Read(err.to_string())
            }
        })?;
        manifest.validate::<O, A>(payload.len() as u64)?;

        Ok(OpenBatch {
            path: manifest_path.to_owned(),
            manifest,
            payload,
            next_entry: 0,
        })
    }
}

impl<O: Element, A: Element> Iterator for Episodes<O, A> {
    type Item = Episode<O, A>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = &mut self.current {
                if let Some(entry) = batch.manifest.episodes.get(batch.next_entry) {
                    batch.next_entry += 1;
                    match batch.manifest.resolve_episode::<O, A>(entry, &batch.payload) {
                        Ok(episode) => {
                            self.report.episodes_read += 1;
                            return Some(episode);
                        }
                        Err(reason) => {
                            let (path, index) = (batch.path.clone(), entry.index);
                            self.report.skip(path, Some(index), reason);
                            continue;
                        }
                    }
                }
                self.current = None;
            }

            let files = self.batches.next()?;
            match (files.manifest, files.payload) {
                (Some(manifest_path), _) => match self.open(&manifest_path) {
                    Ok(batch) => {
                        self.report.batches_read += 1;
                        self.current = Some(batch);
                    }
                    Err(reason) => self.report.skip(manifest_path, None, reason),
                },
                (None, Some(payload_path)) => {
                    self.report
                        .skip(payload_path, None, CorruptionError::MissingManifest);
                }
                (None, None) => {}
            }
        }
    }
}

impl<O: Element, A: Element> FusedIterator for Episodes<O, A> {}
