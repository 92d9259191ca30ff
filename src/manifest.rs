use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::sampling::Mode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub label: i64,
    pub spatial_temporal_index: usize,
}

/// Parsed `<mode>.csv`: one entry per video.
#[derive(Debug, Clone)]
pub struct Manifest {
    source: PathBuf,
    entries: Vec<ManifestEntry>,
    chunk: Option<ChunkCursor>,
}

impl Manifest {
    /// Loads the manifest for `mode` from `data.path_to_data_dir`.
    ///
    /// Training manifests are read in chunks of `data.loader_chunk_size` rows
    /// when that value is non-zero.
    pub fn load(cfg: &DatasetConfig, mode: Mode) -> Result<Self> {
        let source = manifest_path(cfg, mode);
        let chunk = (mode == Mode::Train && cfg.data.loader_chunk_size > 0).then(|| ChunkCursor {
            chunk_size: cfg.data.loader_chunk_size,
            skip_rows: cfg.data.skip_rows,
        });
        let mut manifest = Self {
            source,
            entries: Vec::new(),
            chunk: None,
        };
        manifest.reload(chunk, cfg, mode)?;
        Ok(manifest)
    }

    /// Builds a manifest directly from rows, without touching the filesystem.
    pub fn from_rows<S: AsRef<str>>(
        rows: &[S],
        cfg: &DatasetConfig,
        mode: Mode,
        source: impl Into<PathBuf>,
    ) -> Result<Self> {
        let source = source.into();
        let entries = parse_rows(rows, &source, cfg)?;
        ensure_not_empty(&entries, &source, mode)?;
        Ok(Self {
            source,
            entries,
            chunk: None,
        })
    }

    /// Advances to the next chunk of a chunked manifest and reparses it.
    /// Returns `false` for manifests that are read whole. On error the
    /// current window and its entries are kept.
    pub fn advance_chunk(&mut self, cfg: &DatasetConfig, mode: Mode) -> Result<bool> {
        let Some(mut next) = self.chunk.clone() else {
            return Ok(false);
        };
        next.skip_rows += next.chunk_size;
        self.reload(Some(next), cfg, mode)?;
        Ok(true)
    }

    fn reload(
        &mut self,
        mut chunk: Option<ChunkCursor>,
        cfg: &DatasetConfig,
        mode: Mode,
    ) -> Result<()> {
        if !self.source.exists() {
            return Err(DatasetError::ManifestMissing(self.source.clone()));
        }
        let rows = match chunk.as_mut() {
            Some(cursor) => cursor.read(&self.source)?,
            None => read_rows(&self.source)?,
        };
        let entries = parse_rows(&rows, &self.source, cfg)?;
        ensure_not_empty(&entries, &self.source, mode)?;
        info!(
            size = entries.len(),
            skip_rows = chunk.as_ref().map_or(0, |cursor| cursor.skip_rows),
            manifest = %self.source.display(),
            "Constructed {mode} clip dataset"
        );
        self.chunk = chunk;
        self.entries = entries;
        Ok(())
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ManifestEntry> {
        self.entries.get(index)
    }

    pub fn skip_rows(&self) -> usize {
        self.chunk.as_ref().map_or(0, |cursor| cursor.skip_rows)
    }
}

/// Row window over a chunked manifest.
#[derive(Debug, Clone)]
struct ChunkCursor {
    chunk_size: usize,
    skip_rows: usize,
}

impl ChunkCursor {
    /// Reads `chunk_size` non-blank rows after `skip_rows`. An offset past the
    /// last non-blank row rewinds to the first row once.
    fn read(&mut self, path: &Path) -> Result<Vec<String>> {
        let rows = read_window(path, self.skip_rows, self.chunk_size)?;
        if !rows.is_empty() || self.skip_rows == 0 {
            return Ok(rows);
        }
        warn!(
            skip_rows = self.skip_rows,
            manifest = %path.display(),
            "Chunk offset past end of manifest; rewinding"
        );
        self.skip_rows = 0;
        read_window(path, 0, self.chunk_size)
    }
}

pub fn manifest_path(cfg: &DatasetConfig, mode: Mode) -> PathBuf {
    cfg.data.path_to_data_dir.join(format!("{mode}.csv"))
}

/// Applies the binary-classification label rule: any positive label becomes 1.
pub fn normalize_label(label: i64, num_classes: usize) -> i64 {
    if num_classes == 2 && label > 0 { 1 } else { label }
}

fn read_rows(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        DatasetError::io(format!("failed to read manifest {}", path.display()), err)
    })?;
    Ok(content.lines().map(str::to_string).collect())
}

fn read_window(path: &Path, skip: usize, take: usize) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|err| {
        DatasetError::io(format!("failed to open manifest {}", path.display()), err)
    })?;
    BufReader::new(file)
        .lines()
        .map(|line| {
            line.map_err(|err| {
                DatasetError::io(format!("failed to read manifest {}", path.display()), err)
            })
        })
        .filter(|line| line.as_ref().map_or(true, |row| !row.trim().is_empty()))
        .skip(skip)
        .take(take)
        .collect()
}

fn parse_rows<S: AsRef<str>>(
    rows: &[S],
    source: &Path,
    cfg: &DatasetConfig,
) -> Result<Vec<ManifestEntry>> {
    let separator = cfg.data.path_label_separator.as_str();
    if separator.is_empty() {
        return Err(DatasetError::InvalidConfig(
            "data.path_label_separator must not be empty".into(),
        ));
    }

    let mut entries = Vec::with_capacity(rows.len());
    for (line_idx, row) in rows.iter().enumerate() {
        let row = row.as_ref();
        if row.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = row.split(separator).collect();
        let (path, label) = match fields.as_slice() {
            [path] => (*path, None),
            [path, label] | [path, _, label] => (*path, Some(*label)),
            _ => {
                return Err(DatasetError::ManifestLine {
                    path: source.to_path_buf(),
                    line: line_idx + 1,
                    content: row.to_string(),
                    fields: fields.len(),
                });
            }
        };
        let label = match label {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| DatasetError::ManifestLabel {
                    path: source.to_path_buf(),
                    line: line_idx + 1,
                    label: raw.to_string(),
                })?,
            None => 0,
        };
        entries.push(ManifestEntry {
            path: cfg.data.path_prefix.join(path),
            label,
            spatial_temporal_index: 0,
        });
    }
    Ok(entries)
}

fn ensure_not_empty(entries: &[ManifestEntry], source: &Path, mode: Mode) -> Result<()> {
    if entries.is_empty() {
        return Err(DatasetError::EmptyManifest {
            path: source.to_path_buf(),
            mode: mode.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::normalize_label;

    #[test]
    fn binary_labels_collapse_to_one() {
        assert_eq!(normalize_label(0, 2), 0);
        assert_eq!(normalize_label(1, 2), 1);
        assert_eq!(normalize_label(7, 2), 1);
        assert_eq!(normalize_label(7, 400), 7);
    }
}
