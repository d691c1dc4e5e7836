//! Row/column access to the float matrix stored in a CIFTI file.
//!
//! `MatrixStore` keeps the matrix either fully in memory or on disk. On disk,
//! reads come from the source file until the first write. That write copies
//! the source into a cache file ("promotion") and all later I/O targets the
//! cache, so the source file is never modified.

use crate::byteorder::swap_bytes;
use crate::error::{CiftiError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use strum_macros::{Display, EnumString};
use tempfile::NamedTempFile;
use tracing::{debug, trace};

const FLOAT_SIZE: u64 = size_of::<f32>() as u64;

/// Where matrix data lives after `setup`
#[derive(
    Display, EnumString, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default,
)]
pub enum CachingMode {
    #[default]
    InMemory,
    OnDisk,
}

/// Parameters needed to set up a `MatrixStore`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatrixDescriptor {
    /// (row count, column count)
    pub dimensions: Vec<usize>,
    /// File offset of the first matrix element
    pub byte_offset: i64,
    pub needs_byte_swap: bool,
    pub caching_mode: CachingMode,
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackingState {
    Uninitialized,
    /// Reads come from the source file, nothing written yet
    ReadOnlyBacked,
    /// All reads and writes target the cache (or the in-memory buffer)
    CacheBacked,
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    rows: usize,
    cols: usize,
    offset: u64,
}

impl Geometry {
    /// Reject shapes whose element count or byte extent does not fit the address space
    fn new(rows: usize, cols: usize, offset: u64) -> Result<Self> {
        let extent = rows
            .checked_mul(cols)
            .and_then(|len| u64::try_from(len).ok())
            .and_then(|len| len.checked_mul(FLOAT_SIZE))
            .and_then(|bytes| bytes.checked_add(offset));
        if extent.is_none() {
            return Err(CiftiError::malformed_header(format!(
                "matrix of {rows}x{cols} floats at offset {offset} exceeds the addressable size"
            )));
        }
        Ok(Self { rows, cols, offset })
    }

    fn len(&self) -> usize {
        self.rows * self.cols
    }

    fn row_position(&self, row: usize) -> u64 {
        self.offset + (row * self.cols) as u64 * FLOAT_SIZE
    }

    fn element_position(&self, row: usize, col: usize) -> u64 {
        self.row_position(row) + col as u64 * FLOAT_SIZE
    }

    /// File position one past the last element
    fn end(&self) -> u64 {
        self.offset + self.len() as u64 * FLOAT_SIZE
    }
}

#[derive(Debug)]
struct MemoryBacking {
    data: Vec<f32>,
    state: BackingState,
}

/// Writable cache file, removed on drop when temporary
#[derive(Debug)]
struct CacheFile {
    file: File,
    path: PathBuf,
    _temporary: Option<tempfile::TempPath>,
}

impl CacheFile {
    fn open(name: Option<&Path>) -> Result<Self> {
        match name {
            Some(path) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| CiftiError::cache_file(path, e.to_string()))?;
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                    _temporary: None,
                })
            }
            None => {
                let (file, temp_path) = NamedTempFile::new()
                    .map_err(|e| CiftiError::cache_file(std::env::temp_dir(), e.to_string()))?
                    .into_parts();
                Ok(Self {
                    file,
                    path: temp_path.to_path_buf(),
                    _temporary: Some(temp_path),
                })
            }
        }
    }
}

#[derive(Debug)]
struct DiskBacking {
    /// Read-only handle on the source; released by promotion
    source: Option<File>,
    source_path: PathBuf,
    cache: CacheFile,
    state: BackingState,
    needs_swap: bool,
}

impl DiskBacking {
    fn reader(&mut self) -> (&mut File, &Path) {
        match self.source.as_mut() {
            Some(file) => (file, self.source_path.as_path()),
            None => (&mut self.cache.file, self.cache.path.as_path()),
        }
    }

    /// Copy the source into the cache in host order, once
    fn promote(&mut self, geometry: Geometry) -> Result<()> {
        if self.state == BackingState::CacheBacked {
            return Ok(());
        }
        if let Some(source) = self.source.as_mut() {
            debug!(
                "Promoting {} into cache {}",
                self.source_path.display(),
                self.cache.path.display()
            );
            let mut row = vec![0f32; geometry.cols];
            for r in 0..geometry.rows {
                let position = geometry.row_position(r);
                source.seek(SeekFrom::Start(position))?;
                let read = read_fully(source, bytemuck::cast_slice_mut(&mut row))?;
                if read < row.len() * FLOAT_SIZE as usize {
                    return Err(CiftiError::truncated_file(
                        &self.source_path,
                        "error reading row, file may be truncated",
                    ));
                }
                if self.needs_swap {
                    swap_bytes(&mut row);
                }
                self.cache.file.seek(SeekFrom::Start(position))?;
                write_floats(&mut self.cache.file, &self.cache.path, &row)?;
            }
            self.cache.file.flush()?;
        }
        self.source = None;
        self.needs_swap = false;
        self.state = BackingState::CacheBacked;
        debug!("Cache {} now backs the matrix", self.cache.path.display());
        Ok(())
    }
}

#[derive(Debug)]
enum Backing {
    InMemory(RwLock<MemoryBacking>),
    OnDisk(Mutex<DiskBacking>),
}

#[derive(Debug)]
struct Initialized {
    geometry: Geometry,
    caching_mode: CachingMode,
    backing: Backing,
}

/// A 2D float matrix backed by a CIFTI file, in memory or on disk
///
/// Accessors take `&self` and may be called from many threads. On-disk
/// seek/read/write sequences are serialized by a single mutex per store.
#[derive(Debug, Default)]
pub struct MatrixStore {
    file_name: Option<PathBuf>,
    cache_file_name: Option<PathBuf>,
    inner: Option<Initialized>,
}

impl MatrixStore {
    /// Create an uninitialized store over `file_name`
    ///
    /// `cache_file_name` names the on-disk cache; `None` uses a temporary
    /// file that is deleted when the store is dropped.
    pub fn new(file_name: impl Into<PathBuf>, cache_file_name: Option<PathBuf>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            cache_file_name,
            inner: None,
        }
    }

    /// Create an uninitialized store with no source file
    ///
    /// Every element starts at zero. `cache_file_name` names the on-disk
    /// cache as in [`MatrixStore::new`].
    pub fn with_cache_file(cache_file_name: Option<PathBuf>) -> Self {
        Self {
            file_name: None,
            cache_file_name,
            inner: None,
        }
    }

    /// Point the store at a different file; the store must be set up again
    pub fn set_matrix_file(
        &mut self,
        file_name: impl Into<PathBuf>,
        cache_file_name: Option<PathBuf>,
    ) {
        self.file_name = Some(file_name.into());
        self.cache_file_name = cache_file_name;
        self.inner = None;
    }

    /// Fix dimensions, offset, and backing storage
    ///
    /// # Errors
    /// `UnsupportedDimensionality` unless exactly two dimensions are given.
    /// I/O failures while opening or reading the backing files.
    pub fn setup(
        &mut self,
        dimensions: &[usize],
        byte_offset: i64,
        caching_mode: CachingMode,
        needs_swap: bool,
    ) -> Result<()> {
        self.inner = None;
        let &[rows, cols] = dimensions else {
            return Err(CiftiError::UnsupportedDimensionality {
                count: dimensions.len(),
            });
        };
        let offset = u64::try_from(byte_offset).map_err(|_| CiftiError::Other {
            message: format!("matrix offset {byte_offset} is negative"),
            source: None,
        })?;
        let geometry = Geometry::new(rows, cols, offset)?;
        let source_path = self.file_name.clone().filter(|path| path.exists());
        let needs_swap = needs_swap && source_path.is_some();

        debug!(
            "Setting up {} matrix {}x{} at offset {} (swap = {})",
            caching_mode, rows, cols, offset, needs_swap
        );
        let backing = match caching_mode {
            CachingMode::InMemory => {
                if let Some(path) = &source_path {
                    let available = std::fs::metadata(path)?.len();
                    if available < geometry.end() {
                        return Err(CiftiError::truncated_file(
                            path,
                            format!(
                                "matrix needs {} bytes, file holds {available}",
                                geometry.end()
                            ),
                        ));
                    }
                }
                let mut data = Vec::new();
                data.try_reserve_exact(geometry.len())
                    .map_err(|e| CiftiError::Other {
                        message: format!("cannot allocate {}x{} matrix: {e}", rows, cols),
                        source: Some(Box::new(e)),
                    })?;
                data.resize(geometry.len(), 0f32);
                if let Some(path) = &source_path {
                    read_matrix_rows(path, geometry, &mut data)?;
                    if needs_swap {
                        swap_bytes(&mut data);
                    }
                }
                Backing::InMemory(RwLock::new(MemoryBacking {
                    data,
                    state: BackingState::ReadOnlyBacked,
                }))
            }
            CachingMode::OnDisk => {
                let cache = CacheFile::open(self.cache_file_name.as_deref())?;
                let source = match &source_path {
                    Some(path) => Some(File::open(path)?),
                    None => {
                        // Unwritten elements read back as zeros
                        cache.file.set_len(geometry.end())?;
                        None
                    }
                };
                Backing::OnDisk(Mutex::new(DiskBacking {
                    source,
                    source_path: source_path.unwrap_or_else(|| cache.path.clone()),
                    cache,
                    state: BackingState::ReadOnlyBacked,
                    needs_swap,
                }))
            }
        };
        self.inner = Some(Initialized {
            geometry,
            caching_mode,
            backing,
        });
        Ok(())
    }

    /// `setup` from a descriptor
    pub fn setup_from_descriptor(&mut self, descriptor: &MatrixDescriptor) -> Result<()> {
        self.setup(
            &descriptor.dimensions,
            descriptor.byte_offset,
            descriptor.caching_mode,
            descriptor.needs_byte_swap,
        )
    }

    fn initialized(&self) -> Result<&Initialized> {
        self.inner.as_ref().ok_or(CiftiError::NotInitialized)
    }

    /// Copy row `row` into `out`
    ///
    /// With `tolerate_short_read`, a row past the end of the file is returned
    /// zero-filled instead of failing.
    pub fn get_row(&self, out: &mut [f32], row: usize, tolerate_short_read: bool) -> Result<()> {
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        check_index("row", row, geometry.rows)?;
        check_length(geometry.cols, out.len())?;
        match &inner.backing {
            Backing::InMemory(memory) => {
                let memory = memory.read()?;
                let start = row * geometry.cols;
                out.copy_from_slice(&memory.data[start..start + geometry.cols]);
            }
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                let needs_swap = disk.needs_swap;
                let (file, path) = disk.reader();
                file.seek(SeekFrom::Start(geometry.row_position(row)))?;
                let wanted = out.len() * FLOAT_SIZE as usize;
                let read = read_fully(file, bytemuck::cast_slice_mut(out))?;
                if read < wanted {
                    if !tolerate_short_read {
                        return Err(CiftiError::truncated_file(
                            path,
                            "error reading row, file may be truncated",
                        ));
                    }
                    trace!("Short read of row {}: {} of {} bytes", row, read, wanted);
                    bytemuck::cast_slice_mut::<f32, u8>(out)[read..].fill(0);
                }
                if needs_swap {
                    swap_bytes(out);
                }
            }
        }
        Ok(())
    }

    /// Overwrite row `row` with `data`
    pub fn set_row(&self, data: &[f32], row: usize) -> Result<()> {
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        check_index("row", row, geometry.rows)?;
        check_length(geometry.cols, data.len())?;
        match &inner.backing {
            Backing::InMemory(memory) => {
                let mut memory = memory.write()?;
                let start = row * geometry.cols;
                memory.data[start..start + geometry.cols].copy_from_slice(data);
                memory.state = BackingState::CacheBacked;
            }
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                disk.promote(geometry)?;
                let cache = &mut disk.cache;
                cache.file.seek(SeekFrom::Start(geometry.row_position(row)))?;
                write_floats(&mut cache.file, &cache.path, data)?;
            }
        }
        Ok(())
    }

    /// Copy column `col` into `out`
    ///
    /// On disk this reads one float per row.
    pub fn get_column(&self, out: &mut [f32], col: usize) -> Result<()> {
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        check_index("column", col, geometry.cols)?;
        check_length(geometry.rows, out.len())?;
        match &inner.backing {
            Backing::InMemory(memory) => {
                let memory = memory.read()?;
                for (value, row) in out.iter_mut().zip(memory.data.chunks_exact(geometry.cols)) {
                    *value = row[col];
                }
            }
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                let needs_swap = disk.needs_swap;
                let (file, path) = disk.reader();
                for (row, value) in out.iter_mut().enumerate() {
                    file.seek(SeekFrom::Start(geometry.element_position(row, col)))?;
                    let mut bytes = [0u8; FLOAT_SIZE as usize];
                    if read_fully(file, &mut bytes)? < bytes.len() {
                        return Err(CiftiError::truncated_file(
                            path,
                            "error reading column, file may be truncated",
                        ));
                    }
                    *value = f32::from_ne_bytes(bytes);
                }
                if needs_swap {
                    swap_bytes(out);
                }
            }
        }
        Ok(())
    }

    /// Overwrite column `col` with `data`
    pub fn set_column(&self, data: &[f32], col: usize) -> Result<()> {
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        check_index("column", col, geometry.cols)?;
        check_length(geometry.rows, data.len())?;
        match &inner.backing {
            Backing::InMemory(memory) => {
                let mut memory = memory.write()?;
                for (row, value) in memory.data.chunks_exact_mut(geometry.cols).zip(data) {
                    row[col] = *value;
                }
                memory.state = BackingState::CacheBacked;
            }
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                disk.promote(geometry)?;
                let cache = &mut disk.cache;
                for (row, value) in data.iter().enumerate() {
                    cache
                        .file
                        .seek(SeekFrom::Start(geometry.element_position(row, col)))?;
                    write_floats(&mut cache.file, &cache.path, std::slice::from_ref(value))?;
                }
            }
        }
        Ok(())
    }

    /// Copy the whole matrix, row-major, into `out`
    pub fn get_matrix(&self, out: &mut [f32]) -> Result<()> {
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        check_length(geometry.len(), out.len())?;
        match &inner.backing {
            Backing::InMemory(memory) => out.copy_from_slice(&memory.read()?.data),
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                let needs_swap = disk.needs_swap;
                let (file, path) = disk.reader();
                if geometry.cols > 0 {
                    file.seek(SeekFrom::Start(geometry.offset))?;
                    for row in out.chunks_exact_mut(geometry.cols) {
                        let wanted = row.len() * FLOAT_SIZE as usize;
                        if read_fully(file, bytemuck::cast_slice_mut(row))? < wanted {
                            return Err(CiftiError::truncated_file(
                                path,
                                "error reading matrix, file may be truncated",
                            ));
                        }
                    }
                }
                if needs_swap {
                    swap_bytes(out);
                }
            }
        }
        Ok(())
    }

    /// Overwrite the whole matrix from row-major `data`
    pub fn set_matrix(&self, data: &[f32]) -> Result<()> {
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        check_length(geometry.len(), data.len())?;
        match &inner.backing {
            Backing::InMemory(memory) => {
                let mut memory = memory.write()?;
                memory.data.copy_from_slice(data);
                memory.state = BackingState::CacheBacked;
            }
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                // Every element is overwritten, so the source copy can be skipped.
                // The source stays readable until the whole matrix is in the cache.
                let cache = &mut disk.cache;
                if geometry.cols > 0 {
                    cache.file.seek(SeekFrom::Start(geometry.offset))?;
                    for row in data.chunks_exact(geometry.cols) {
                        write_floats(&mut cache.file, &cache.path, row)?;
                    }
                }
                cache.file.flush()?;
                disk.source = None;
                disk.needs_swap = false;
                disk.state = BackingState::CacheBacked;
            }
        }
        Ok(())
    }

    /// Move on-disk data into the cache now instead of at the first write
    pub fn promote(&self) -> Result<()> {
        let inner = self.initialized()?;
        if let Backing::OnDisk(disk) = &inner.backing {
            disk.lock()?.promote(inner.geometry)?;
        }
        Ok(())
    }

    /// The whole matrix as a `rows x cols` array
    pub fn matrix_array(&self) -> Result<Array2<f32>> {
        let geometry = self.initialized()?.geometry;
        let mut data = vec![0f32; geometry.len()];
        self.get_matrix(&mut data)?;
        Array2::from_shape_vec((geometry.rows, geometry.cols), data).map_err(|e| {
            CiftiError::Other {
                message: format!("matrix shape mismatch: {e}"),
                source: Some(Box::new(e)),
            }
        })
    }

    /// Export the matrix in host byte order to `path` at `offset`
    ///
    /// The destination is not truncated, so a header written beforehand is
    /// kept. Writing to the store's own cache file only flushes it.
    pub fn write_to_new_file(&self, path: impl AsRef<Path>, offset: i64) -> Result<()> {
        let path = path.as_ref();
        let inner = self.initialized()?;
        let geometry = inner.geometry;
        let offset = u64::try_from(offset).map_err(|_| CiftiError::Other {
            message: format!("output offset {offset} is negative"),
            source: None,
        })?;
        match &inner.backing {
            Backing::InMemory(memory) => {
                let memory = memory.read()?;
                let mut output = open_output(path)?;
                output.seek(SeekFrom::Start(offset))?;
                if geometry.cols > 0 {
                    for row in memory.data.chunks_exact(geometry.cols) {
                        write_floats(&mut output, path, row)?;
                    }
                }
                output.flush()?;
            }
            Backing::OnDisk(disk) => {
                let mut disk = disk.lock()?;
                if same_file(path, &disk.cache.path) {
                    debug!("{} is the matrix cache, flushing in place", path.display());
                    disk.promote(geometry)?;
                    disk.cache.file.sync_all()?;
                    return Ok(());
                }
                if disk.source.is_some() && same_file(path, &disk.source_path) {
                    disk.promote(geometry)?;
                }
                debug!("Streaming matrix rows to {} at offset {}", path.display(), offset);
                let mut output = open_output(path)?;
                output.seek(SeekFrom::Start(offset))?;
                let needs_swap = disk.needs_swap;
                let (file, source_path) = disk.reader();
                let mut row = vec![0f32; geometry.cols];
                for r in 0..geometry.rows {
                    file.seek(SeekFrom::Start(geometry.row_position(r)))?;
                    if read_fully(file, bytemuck::cast_slice_mut(&mut row))?
                        < row.len() * FLOAT_SIZE as usize
                    {
                        return Err(CiftiError::truncated_file(
                            source_path,
                            "error reading row, file may be truncated",
                        ));
                    }
                    if needs_swap {
                        swap_bytes(&mut row);
                    }
                    write_floats(&mut output, path, &row)?;
                }
                output.flush()?;
            }
        }
        Ok(())
    }

    /// (row count, column count)
    pub fn dimensions(&self) -> Result<[usize; 2]> {
        let geometry = self.initialized()?.geometry;
        Ok([geometry.rows, geometry.cols])
    }

    pub fn caching_mode(&self) -> Result<CachingMode> {
        Ok(self.initialized()?.caching_mode)
    }

    pub fn matrix_offset(&self) -> Result<i64> {
        Ok(self.initialized()?.geometry.offset as i64)
    }

    pub fn backing_state(&self) -> Result<BackingState> {
        match &self.inner {
            None => Ok(BackingState::Uninitialized),
            Some(inner) => match &inner.backing {
                Backing::InMemory(memory) => Ok(memory.read()?.state),
                Backing::OnDisk(disk) => Ok(disk.lock()?.state),
            },
        }
    }

    /// Current parameters; the swap flag clears once data lives in host order
    pub fn descriptor(&self) -> Result<MatrixDescriptor> {
        let inner = self.initialized()?;
        let needs_byte_swap = match &inner.backing {
            Backing::InMemory(_) => false,
            Backing::OnDisk(disk) => disk.lock()?.needs_swap,
        };
        Ok(MatrixDescriptor {
            dimensions: vec![inner.geometry.rows, inner.geometry.cols],
            byte_offset: inner.geometry.offset as i64,
            needs_byte_swap,
            caching_mode: inner.caching_mode,
        })
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    /// Path of the on-disk cache, temporary or named
    pub fn cache_file_path(&self) -> Result<Option<PathBuf>> {
        match &self.initialized()?.backing {
            Backing::InMemory(_) => Ok(None),
            Backing::OnDisk(disk) => Ok(Some(disk.lock()?.cache.path.clone())),
        }
    }
}

fn check_index(axis: &'static str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(CiftiError::index_out_of_range(axis, index, len));
    }
    Ok(())
}

fn check_length(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CiftiError::buffer_length(expected, actual));
    }
    Ok(())
}

/// Read until `buf` is full or the file ends, returning the bytes read
fn read_fully(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_floats(file: &mut File, path: &Path, data: &[f32]) -> Result<()> {
    file.write_all(bytemuck::cast_slice(data)).map_err(|e| {
        if e.kind() == ErrorKind::WriteZero {
            CiftiError::truncated_write(path, "error writing to file, file may be truncated")
        } else {
            CiftiError::Io(e)
        }
    })
}

/// Read row by row so no single read exceeds one row
fn read_matrix_rows(path: &Path, geometry: Geometry, data: &mut [f32]) -> Result<()> {
    let mut file = File::open(path)?;
    if geometry.cols == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(geometry.offset))?;
    for row in data.chunks_exact_mut(geometry.cols) {
        let wanted = row.len() * FLOAT_SIZE as usize;
        if read_fully(&mut file, bytemuck::cast_slice_mut(row))? < wanted {
            return Err(CiftiError::truncated_file(
                path,
                "error reading matrix, file may be truncated",
            ));
        }
    }
    Ok(())
}

fn open_output(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

pub(crate) fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
