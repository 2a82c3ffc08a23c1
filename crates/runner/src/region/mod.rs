//! The shared region: a memory-mapped file holding one `SharedData` in the
//! fixed layout from [`layout`], written by the control commands and read by
//! the data-plane loop. Out of scope per the spec: a real `nfqueue-lb` uses
//! POSIX `shm_open`; here a plain file under a runtime directory stands in
//! for it, since both are just named, persistent, mappable byte regions.

pub mod layout;

use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};
use nfqlb_common::SharedData;

use self::layout::{decode, encode, LayoutError, REGION_SIZE};

/// Env var naming the region, matching the original's `MEM_VAR` (§6).
pub const SHM_NAME_VAR: &str = "SHM_NAME";
const DEFAULT_NAME: &str = "nfqueue-lb";
const SUBDIR: &str = "nfqlb";

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("no writable runtime directory found for the shared region")]
    NoRuntimeDir,
    #[error("shared region {path} does not exist; run `nfqlb create` first")]
    NotFound { path: PathBuf },
    #[error("shared region {path} already exists")]
    AlreadyExists { path: PathBuf },
    #[error("failed to open shared region {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to map shared region {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Resolves the region name from `$SHM_NAME`, falling back to the
/// original's default name.
pub fn region_name() -> String {
    env::var(SHM_NAME_VAR).unwrap_or_else(|_| DEFAULT_NAME.to_string())
}

/// Walks the fallback chain `$XDG_RUNTIME_DIR/nfqlb` -> `/dev/shm/nfqlb` ->
/// `$TMPDIR/nfqlb`, returning the first directory that exists or can be
/// created.
fn region_dir() -> Result<PathBuf, RegionError> {
    let candidates = [
        env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from),
        Some(PathBuf::from("/dev/shm")),
        Some(env::temp_dir()),
    ];

    for candidate in candidates.into_iter().flatten() {
        let dir = candidate.join(SUBDIR);
        if dir.is_dir() || fs::create_dir_all(&dir).is_ok() {
            return Ok(dir);
        }
    }
    Err(RegionError::NoRuntimeDir)
}

/// Full path to the named region's backing file.
pub fn region_path(name: &str) -> Result<PathBuf, RegionError> {
    Ok(region_dir()?.join(name))
}

/// Creates a new region file sized to [`layout::REGION_SIZE`] and writes
/// `sh` into it. Fails if the region already exists (`clean` removes it
/// first).
pub fn create(name: &str, sh: &SharedData) -> Result<(), RegionError> {
    let path = region_path(name)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                RegionError::AlreadyExists { path: path.clone() }
            } else {
                RegionError::Open {
                    path: path.clone(),
                    source,
                }
            }
        })?;
    file.set_len(REGION_SIZE as u64)
        .map_err(|source| RegionError::Open {
            path: path.clone(),
            source,
        })?;

    let mut mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| RegionError::Map {
        path: path.clone(),
        source,
    })?;
    encode(sh, &mut mmap)?;
    mmap.flush().map_err(|source| RegionError::Open {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Deletes the named region's backing file. Missing files are not an error
/// (`clean` is idempotent).
pub fn destroy(name: &str) -> Result<(), RegionError> {
    let path = region_path(name)?;
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RegionError::Open { path, source }),
    }
}

fn open(path: &Path, writable: bool) -> Result<File, RegionError> {
    if !path.exists() {
        return Err(RegionError::NotFound {
            path: path.to_path_buf(),
        });
    }
    OpenOptions::new()
        .read(true)
        .write(writable)
        .open(path)
        .map_err(|source| RegionError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads a one-shot snapshot of the named region: opens a handle, decodes,
/// and drops it. Used by `show` and other short-lived control commands; the
/// data-plane loop instead holds a [`RegionReader`] for its lifetime (§3:
/// "the data-plane process holds a read-only handle for its lifetime").
pub fn read(name: &str) -> Result<SharedData, RegionError> {
    let path = region_path(name)?;
    let file = open(&path, false)?;
    let mmap = unsafe { Mmap::map(&file) }.map_err(|source| RegionError::Map {
        path: path.clone(),
        source,
    })?;
    Ok(decode(&mmap)?)
}

/// A read-only handle to the region held open for the lifetime of the
/// data-plane loop. A single `mmap(2)` call already reflects every write a
/// control command makes through [`RegionWriter`] (they write into the same
/// backing file); re-decoding `self.mmap` per packet costs no new `open`/
/// `mmap` syscalls, unlike calling [`read`] in a loop.
pub struct RegionReader {
    mmap: Mmap,
}

impl RegionReader {
    pub fn open(name: &str) -> Result<Self, RegionError> {
        let path = region_path(name)?;
        let file = open(&path, false)?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| RegionError::Map {
            path: path.clone(),
            source,
        })?;
        Ok(Self { mmap })
    }

    /// Decodes the current contents of the live mapping. No syscall: this
    /// reads straight out of the pages already mapped by `open`.
    pub fn load(&self) -> Result<SharedData, RegionError> {
        Ok(decode(&self.mmap)?)
    }
}

/// A handle to the region held open for read-modify-write control commands
/// (`activate`, `deactivate`). Not held across the data-plane loop: that
/// path holds a [`RegionReader`] instead.
pub struct RegionWriter {
    path: PathBuf,
    mmap: MmapMut,
}

impl RegionWriter {
    pub fn open(name: &str) -> Result<Self, RegionError> {
        let path = region_path(name)?;
        let file = open(&path, true)?;
        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|source| RegionError::Map {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, mmap })
    }

    pub fn load(&self) -> Result<SharedData, RegionError> {
        Ok(decode(&self.mmap)?)
    }

    pub fn store(&mut self, sh: &SharedData) -> Result<(), RegionError> {
        encode(sh, &mut self.mmap)?;
        self.mmap.flush().map_err(|source| RegionError::Open {
            path: self.path.clone(),
            source,
        })
    }
}
