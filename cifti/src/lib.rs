//! # neuro-cifti
//!
//! Storage engine for CIFTI connectivity matrices.
//!
//! A CIFTI file is a NIfTI-1 or NIfTI-2 binary header followed by a row-major
//! matrix of 32-bit floats, possibly stored in the opposite byte order from
//! the host. This crate provides:
//!
//! - **Byte order**: detection of the file's endianness and in-place word swapping
//! - **Header codec**: decode/encode of both header versions, intent codes, and
//!   the CIFTI dimension layout (including legacy files)
//! - **Matrix store**: row, column, and whole-matrix access, held in memory or
//!   on disk with a copy-on-first-write cache that never modifies the source
//! - **Files**: opening and writing complete files, plus default file naming
//!
//! ## Quick Start
//!
//! ```rust
//! use neuro_cifti::{CachingMode, MatrixStore};
//!
//! # fn example() -> neuro_cifti::Result<()> {
//! let mut store = MatrixStore::default();
//! store.setup(&[4, 3], 0, CachingMode::InMemory, false)?;
//! store.set_row(&[1.0, 2.0, 3.0], 0)?;
//!
//! let mut column = [0f32; 4];
//! store.get_column(&mut column, 1)?;
//! assert_eq!(column[0], 2.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! [`MatrixStore`] accessors take `&self`; share the store behind an `Arc`.
//! In-memory stores allow parallel readers. On-disk stores serialize every
//! seek/read/write sequence, including promotion, under one mutex.

pub mod byteorder;
pub mod error;
pub mod file;
pub mod header;
pub mod matrix;


pub use byteorder::{ByteOrder, SwapBytes, swap_bytes};
pub use error::{CiftiError, Result};
pub use file::{CiftiFile, DefaultFileNamer};
pub use header::{CiftiHeader, IntentCode, NiftiVersion};
pub use matrix::{BackingState, CachingMode, MatrixDescriptor, MatrixStore};
