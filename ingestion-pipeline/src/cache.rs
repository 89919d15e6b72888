use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use common::error::AppError;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::types::CachedSpace;

/// Filename suffix of the legacy "all pages" cache variant.
const FULL_SUFFIX: &str = "_full";

/// Read-through disk cache of fetched spaces, one JSON blob per space key.
/// A corrupt blob is deleted and reported as a miss so later runs do not
/// keep failing on the same bytes; `save` atomically overwrites.
pub struct SpaceCache {
    dir: PathBuf,
}

/// What `reconcile` did (or would do, in dry-run mode) for one space key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Both naming variants existed; the winner is now the canonical file.
    Merged { space_key: String, kept_full: bool },
    /// Only the `_full` variant existed; it was renamed to the canonical name.
    Renamed { space_key: String },
    /// One of the variants could not be read; nothing was touched.
    Unreadable { space_key: String },
}

impl SpaceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn canonical_path(&self, space_key: &str) -> PathBuf {
        self.dir.join(format!("{space_key}.json"))
    }

    fn full_variant_path(&self, space_key: &str) -> PathBuf {
        self.dir.join(format!("{space_key}{FULL_SUFFIX}.json"))
    }

    pub fn load(&self, space_key: &str) -> Result<Option<CachedSpace>, AppError> {
        let path = self.canonical_path(space_key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice::<CachedSpace>(&bytes) {
            Ok(space) => Ok(Some(space)),
            Err(err) => {
                warn!(
                    space_key,
                    path = %path.display(),
                    error = %err,
                    "cache entry is corrupt; removing it and treating as a miss"
                );
                fs::remove_file(&path)?;
                Ok(None)
            }
        }
    }

    /// Unconditional overwrite through a temp file in the same directory so
    /// a crash mid-write never leaves a truncated canonical entry behind.
    pub fn save(&self, space: &CachedSpace) -> Result<(), AppError> {
        let path = self.canonical_path(&space.space_key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, space)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| AppError::Io(err.error))?;
        Ok(())
    }

    /// One-time maintenance: merge the legacy `<KEY>_full.json` naming
    /// variant with the canonical `<KEY>.json`. The variant with more pages
    /// wins; ties go to the larger file (the full variant on an exact tie).
    /// After a non-dry run every surviving space has exactly one cache
    /// entry, under the canonical name.
    pub fn reconcile(&self, dry_run: bool) -> Result<Vec<ReconcileOutcome>, AppError> {
        let mut outcomes = Vec::new();

        let mut full_keys: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".json") {
                if let Some(key) = stem.strip_suffix(FULL_SUFFIX) {
                    full_keys.push(key.to_string());
                }
            }
        }
        full_keys.sort();

        for space_key in full_keys {
            let full_path = self.full_variant_path(&space_key);
            let canonical_path = self.canonical_path(&space_key);

            if !canonical_path.exists() {
                info!(%space_key, "only the full variant exists; renaming to canonical");
                if !dry_run {
                    fs::rename(&full_path, &canonical_path)?;
                }
                outcomes.push(ReconcileOutcome::Renamed { space_key });
                continue;
            }

            let (Some(full), Some(canonical)) = (
                read_blob_info(&full_path),
                read_blob_info(&canonical_path),
            ) else {
                warn!(%space_key, "could not read one of the cache variants; skipping");
                outcomes.push(ReconcileOutcome::Unreadable { space_key });
                continue;
            };

            let keep_full = match full.pages.cmp(&canonical.pages) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => full.size_bytes >= canonical.size_bytes,
            };

            info!(
                %space_key,
                full_pages = full.pages,
                canonical_pages = canonical.pages,
                keep_full,
                "reconciling duplicate cache variants"
            );

            if !dry_run {
                if keep_full {
                    fs::rename(&full_path, &canonical_path)?;
                } else {
                    fs::remove_file(&full_path)?;
                }
            }
            outcomes.push(ReconcileOutcome::Merged {
                space_key,
                kept_full: keep_full,
            });
        }

        Ok(outcomes)
    }
}

struct BlobInfo {
    pages: usize,
    size_bytes: u64,
}

fn read_blob_info(path: &Path) -> Option<BlobInfo> {
    let size_bytes = fs::metadata(path).ok()?.len();
    let bytes = fs::read(path).ok()?;
    let space: CachedSpace = serde_json::from_slice(&bytes).ok()?;
    Some(BlobInfo {
        pages: space.sampled_pages.len(),
        size_bytes,
    })
}
