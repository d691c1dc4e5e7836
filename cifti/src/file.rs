//! Whole-file access: a decoded header paired with its matrix store.

use crate::byteorder::ByteOrder;
use crate::error::{CiftiError, Result};
use crate::header::{CiftiHeader, IntentCode, NiftiVersion};
use crate::matrix::{CachingMode, MatrixStore, same_file};
use memmap3::MmapOptions;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Hands out default names for newly created files
///
/// Each namer owns its counter, so two namers never share numbering.
#[derive(Debug, Clone)]
pub struct DefaultFileNamer {
    next: u64,
}

impl Default for DefaultFileNamer {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl DefaultFileNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `<type>_file_<n>.<extension>`, e.g. `connectivity_dense_file_1.dconn.nii`
    pub fn next_name(&mut self, intent: IntentCode) -> PathBuf {
        let name = format!(
            "{}_file_{}.{}",
            intent.type_name(),
            self.next,
            intent.file_extension()
        );
        self.next += 1;
        PathBuf::from(name)
    }
}

/// A CIFTI file: header plus matrix
#[derive(Debug)]
pub struct CiftiFile {
    path: PathBuf,
    header: CiftiHeader,
    matrix: MatrixStore,
}

impl CiftiFile {
    /// Open an existing file and set up its matrix
    ///
    /// # Errors
    /// Will return `Err` if:
    /// - the file cannot be opened or memory-mapped
    /// - the header cannot be decoded
    /// - the header does not describe a 2D matrix
    pub fn open(
        path: impl AsRef<Path>,
        caching_mode: CachingMode,
        cache_file: Option<PathBuf>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let header = read_header(path).map_err(|e| e.with_context(path.display().to_string()))?;
        let descriptor = header.matrix_descriptor(caching_mode);
        debug!(
            "Opening {} ({}), matrix {:?}",
            path.display(),
            header.intent_code(),
            descriptor.dimensions
        );
        let mut matrix = MatrixStore::new(path, cache_file);
        matrix.setup_from_descriptor(&descriptor)?;
        Ok(Self {
            path: path.to_path_buf(),
            header,
            matrix,
        })
    }

    /// Create a new, zero-filled matrix described by `header`
    ///
    /// `path` defaults to a name from `namer`; nothing is written until `write`.
    pub fn create(
        header: CiftiHeader,
        path: Option<PathBuf>,
        namer: &mut DefaultFileNamer,
        caching_mode: CachingMode,
        cache_file: Option<PathBuf>,
    ) -> Result<Self> {
        let path = path.unwrap_or_else(|| namer.next_name(header.intent_code()));
        if path.exists() {
            warn!(
                "{} already exists; the new matrix ignores its contents",
                path.display()
            );
        }
        let dimensions = header.dimensions();
        let mut matrix = MatrixStore::with_cache_file(cache_file);
        matrix.setup(&dimensions, header.vox_offset(), caching_mode, false)?;
        Ok(Self {
            path,
            header,
            matrix,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &CiftiHeader {
        &self.header
    }

    pub fn matrix(&self) -> &MatrixStore {
        &self.matrix
    }

    /// Write header and matrix to `path` in host byte order
    ///
    /// # Errors
    /// Besides I/O failures, writing over the store's own cache fails when
    /// the header's data offset differs from where the cache holds the matrix.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut header = self.header.clone();
        let minimum = header.version().default_vox_offset();
        if header.vox_offset() < minimum {
            header.set_vox_offset(minimum);
        }
        let writes_over_cache = self
            .matrix
            .cache_file_path()?
            .is_some_and(|cache| same_file(&cache, path));
        let matrix_offset = self.matrix.matrix_offset()?;
        if writes_over_cache && header.vox_offset() != matrix_offset {
            return Err(CiftiError::Other {
                message: format!(
                    "{}: cannot move matrix data from offset {} to {} inside its own cache",
                    path.display(),
                    matrix_offset,
                    header.vox_offset()
                ),
                source: None,
            });
        }
        let bytes = header.encode(ByteOrder::native())?;
        if same_file(path, &self.path) {
            // the source is about to be truncated
            self.matrix.promote()?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(!writes_over_cache)
            .open(path)?;
        file.write_all(&bytes)?;
        // zeroed extension flag bytes up to the data offset
        let padding = header.vox_offset() as usize - bytes.len();
        file.write_all(&vec![0u8; padding])?;
        file.flush()?;
        drop(file);

        debug!(
            "Writing {} header and matrix to {}",
            header.version(),
            path.display()
        );
        self.matrix
            .write_to_new_file(path, header.vox_offset())
            .map_err(|e| e.with_context(path.display().to_string()))
    }
}

fn read_header(path: &Path) -> Result<CiftiHeader> {
    let file = File::open(path)?;
    let length = file.metadata()?.len() as usize;
    if length < NiftiVersion::Nifti1.header_size() {
        return Err(CiftiError::malformed_header(format!(
            "file is too short ({length} bytes)"
        )));
    }
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    CiftiHeader::decode(&mmap)
}
