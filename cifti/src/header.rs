//! NIfTI-1/NIfTI-2 header codec for CIFTI files.
//!
//! A CIFTI file starts with a fixed-size NIfTI header: 348 bytes for the
//! legacy NIfTI-1 layout, 540 bytes for NIfTI-2. The header carries the
//! dimension array, the intent code describing the matrix layout, and the
//! byte offset of the first matrix element. Byte order is detected from the
//! `sizeof_hdr` field; every field is decoded into host order.

use crate::byteorder::ByteOrder;
use crate::error::{CiftiError, Result};
use crate::matrix::{CachingMode, MatrixDescriptor};
use byteorder::{BigEndian as BE, ByteOrder as BO, LittleEndian as LE};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, warn};

/// NIfTI datatype code for IEEE-754 32-bit floats
pub const DT_FLOAT32: i16 = 16;

/// Maximum number of matrix dimensions the header can describe
pub const MAX_MATRIX_DIMENSIONS: usize = 3;

/// Number of leading spatial/temporal slots before the matrix axes
const SPATIAL_SLOTS: usize = 4;

#[derive(Display, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum NiftiVersion {
    Nifti1,
    #[default]
    Nifti2,
}

impl NiftiVersion {
    pub const fn header_size(self) -> usize {
        match self {
            Self::Nifti1 => 348,
            Self::Nifti2 => 540,
        }
    }

    /// Offset of the extension block, immediately after the fixed header
    pub const fn extensions_offset(self) -> i64 {
        self.header_size() as i64
    }

    /// Default offset of the first data element (header plus 4-byte extender)
    pub const fn default_vox_offset(self) -> i64 {
        self.header_size() as i64 + 4
    }

    const fn digit(self) -> u8 {
        match self {
            Self::Nifti1 => b'1',
            Self::Nifti2 => b'2',
        }
    }
}

/// Intent codes distinguishing CIFTI matrix layouts
#[derive(Display, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum IntentCode {
    #[default]
    None,
    ConnectivityDense,
    ConnectivityDenseTime,
    ConnectivityParcellated,
    ConnectivityParcellatedTime,
    Other(i32),
}

impl IntentCode {
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::None,
            3001 => Self::ConnectivityDense,
            3002 => Self::ConnectivityDenseTime,
            3003 => Self::ConnectivityParcellated,
            3004 => Self::ConnectivityParcellatedTime,
            other => Self::Other(other),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::ConnectivityDense => 3001,
            Self::ConnectivityDenseTime => 3002,
            Self::ConnectivityParcellated => 3003,
            Self::ConnectivityParcellatedTime => 3004,
            Self::Other(code) => code,
        }
    }

    /// Short name stored in the header's `intent_name` field
    pub const fn intent_name(self) -> &'static str {
        match self {
            Self::ConnectivityDense => "ConnDense",
            Self::ConnectivityDenseTime => "ConnDenseTime",
            Self::ConnectivityParcellated => "ConnParcels",
            Self::ConnectivityParcellatedTime => "ConnParcelTime",
            Self::None | Self::Other(_) => "",
        }
    }

    /// Conventional file extension for this layout
    pub const fn file_extension(self) -> &'static str {
        match self {
            Self::ConnectivityDense => "dconn.nii",
            Self::ConnectivityDenseTime => "dtseries.nii",
            Self::ConnectivityParcellated => "pconn.nii",
            Self::ConnectivityParcellatedTime => "ptseries.nii",
            Self::None | Self::Other(_) => "nii",
        }
    }

    /// Lower-case type name used when generating default file names
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::ConnectivityDense => "connectivity_dense",
            Self::ConnectivityDenseTime => "connectivity_dense_time_series",
            Self::ConnectivityParcellated => "connectivity_parcellated",
            Self::ConnectivityParcellatedTime => "connectivity_parcellated_time_series",
            Self::None | Self::Other(_) => "cifti",
        }
    }
}

/// NIfTI-1 field offsets
mod v1 {
    pub const DIM_INFO: usize = 39;
    pub const DIM: usize = 40;
    pub const INTENT_P: usize = 56;
    pub const INTENT_CODE: usize = 68;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const SLICE_START: usize = 74;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const SLICE_END: usize = 120;
    pub const SLICE_CODE: usize = 122;
    pub const XYZT_UNITS: usize = 123;
    pub const CAL_MAX: usize = 124;
    pub const CAL_MIN: usize = 128;
    pub const SLICE_DURATION: usize = 132;
    pub const TOFFSET: usize = 136;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const QFORM_CODE: usize = 252;
    pub const SFORM_CODE: usize = 254;
    pub const QUATERN: usize = 256;
    pub const QOFFSET: usize = 268;
    pub const SROW: usize = 280;
    pub const INTENT_NAME: usize = 328;
    pub const MAGIC: usize = 344;
}

/// NIfTI-2 field offsets
mod v2 {
    pub const MAGIC: usize = 4;
    pub const DATATYPE: usize = 12;
    pub const BITPIX: usize = 14;
    pub const DIM: usize = 16;
    pub const INTENT_P: usize = 80;
    pub const PIXDIM: usize = 104;
    pub const VOX_OFFSET: usize = 168;
    pub const SCL_SLOPE: usize = 176;
    pub const SCL_INTER: usize = 184;
    pub const CAL_MAX: usize = 192;
    pub const CAL_MIN: usize = 200;
    pub const SLICE_DURATION: usize = 208;
    pub const TOFFSET: usize = 216;
    pub const SLICE_START: usize = 224;
    pub const SLICE_END: usize = 232;
    pub const DESCRIP: usize = 240;
    pub const AUX_FILE: usize = 320;
    pub const QFORM_CODE: usize = 344;
    pub const SFORM_CODE: usize = 348;
    pub const QUATERN: usize = 352;
    pub const QOFFSET: usize = 376;
    pub const SROW: usize = 400;
    pub const SLICE_CODE: usize = 496;
    pub const XYZT_UNITS: usize = 500;
    pub const INTENT_CODE: usize = 504;
    pub const INTENT_NAME: usize = 508;
    pub const DIM_INFO: usize = 524;
}

const DESCRIP_LEN: usize = 80;
const AUX_FILE_LEN: usize = 24;
const INTENT_NAME_LEN: usize = 16;
const NIFTI2_MAGIC_TAIL: &[u8; 4] = b"\r\n\x1a\n";

/// Decoded CIFTI header, all fields in host byte order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiftiHeader {
    version: NiftiVersion,
    byte_order: ByteOrder,
    dim_info: u8,
    dim: [i64; 8],
    intent_p: [f64; 3],
    intent_code: i32,
    datatype: i16,
    bitpix: i16,
    slice_start: i64,
    pixdim: [f64; 8],
    vox_offset: i64,
    scl_slope: f64,
    scl_inter: f64,
    slice_end: i64,
    slice_code: i32,
    xyzt_units: i32,
    cal_max: f64,
    cal_min: f64,
    slice_duration: f64,
    toffset: f64,
    description: String,
    aux_file: String,
    qform_code: i32,
    sform_code: i32,
    quatern: [f64; 3],
    qoffset: [f64; 3],
    srow: [[f64; 4]; 3],
    intent_name: String,
}

impl Default for CiftiHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl CiftiHeader {
    /// An empty NIfTI-2 float32 header in host byte order
    pub fn new() -> Self {
        let mut pixdim = [1.0; 8];
        pixdim[0] = 0.0;
        Self {
            version: NiftiVersion::Nifti2,
            byte_order: ByteOrder::native(),
            dim_info: 0,
            dim: [0, 1, 1, 1, 1, 1, 1, 1],
            intent_p: [0.0; 3],
            intent_code: 0,
            datatype: DT_FLOAT32,
            bitpix: 32,
            slice_start: 0,
            pixdim,
            vox_offset: NiftiVersion::Nifti2.default_vox_offset(),
            scl_slope: 1.0,
            scl_inter: 0.0,
            slice_end: 0,
            slice_code: 0,
            // millimeters and seconds
            xyzt_units: 0x0A,
            cal_max: 0.0,
            cal_min: 0.0,
            slice_duration: 0.0,
            toffset: 0.0,
            description: String::new(),
            aux_file: String::new(),
            qform_code: 0,
            sform_code: 0,
            quatern: [0.0; 3],
            qoffset: [0.0; 3],
            srow: [[0.0; 4]; 3],
            intent_name: String::new(),
        }
    }

    /// Header for a dense connectivity (`.dconn.nii`) matrix
    pub fn dense_connectivity() -> Self {
        let mut header = Self::new();
        header.set_intent(IntentCode::ConnectivityDense);
        header.dim[0] = 6;
        header
    }

    /// Header for a dense time-series (`.dtseries.nii`) matrix
    pub fn dense_time_series() -> Self {
        let mut header = Self::new();
        header.set_intent(IntentCode::ConnectivityDenseTime);
        header.dim[0] = 6;
        header
    }

    /// Decode a header from the leading bytes of a file
    ///
    /// # Errors
    /// `MalformedHeader` when the buffer is short, the header size field is
    /// not recognized, or the magic signature is wrong; `UnsupportedVersion`
    /// when the magic declares a version other than 1 or 2.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(CiftiError::malformed_header("file is too short"));
        }
        let size_le = LE::read_i32(&bytes[0..4]);
        let size_be = BE::read_i32(&bytes[0..4]);
        let (version, byte_order) = match (size_le, size_be) {
            (348, _) => (NiftiVersion::Nifti1, ByteOrder::LittleEndian),
            (_, 348) => (NiftiVersion::Nifti1, ByteOrder::BigEndian),
            (540, _) => (NiftiVersion::Nifti2, ByteOrder::LittleEndian),
            (_, 540) => (NiftiVersion::Nifti2, ByteOrder::BigEndian),
            _ => {
                return Err(CiftiError::malformed_header(format!(
                    "unrecognized header size {size_le}"
                )));
            }
        };
        if bytes.len() < version.header_size() {
            return Err(CiftiError::malformed_header(format!(
                "file is too short: {} bytes, header needs {}",
                bytes.len(),
                version.header_size()
            )));
        }
        check_magic(version, bytes)?;

        let mut header = match (version, byte_order) {
            (NiftiVersion::Nifti1, ByteOrder::LittleEndian) => Self::decode_v1::<LE>(bytes),
            (NiftiVersion::Nifti1, ByteOrder::BigEndian) => Self::decode_v1::<BE>(bytes),
            (NiftiVersion::Nifti2, ByteOrder::LittleEndian) => Self::decode_v2::<LE>(bytes),
            (NiftiVersion::Nifti2, ByteOrder::BigEndian) => Self::decode_v2::<BE>(bytes),
        };
        header.byte_order = byte_order;
        header.fix_dimensions()?;

        debug!(
            "Decoded {} header ({}), dim = {:?}, vox_offset = {}",
            version, byte_order, header.dim, header.vox_offset
        );
        Ok(header)
    }

    fn decode_v1<B: BO>(bytes: &[u8]) -> Self {
        use v1::*;
        let mut dim = [0i64; 8];
        let mut pixdim = [0f64; 8];
        for i in 0..8 {
            dim[i] = B::read_i16(&bytes[DIM + 2 * i..]) as i64;
            pixdim[i] = B::read_f32(&bytes[PIXDIM + 4 * i..]) as f64;
        }
        let read_f32s = |start: usize, out: &mut [f64]| {
            for (i, value) in out.iter_mut().enumerate() {
                *value = B::read_f32(&bytes[start + 4 * i..]) as f64;
            }
        };
        let mut intent_p = [0.0; 3];
        let mut quatern = [0.0; 3];
        let mut qoffset = [0.0; 3];
        let mut srow = [[0.0; 4]; 3];
        read_f32s(INTENT_P, &mut intent_p);
        read_f32s(QUATERN, &mut quatern);
        read_f32s(QOFFSET, &mut qoffset);
        for (row, values) in srow.iter_mut().enumerate() {
            read_f32s(SROW + 16 * row, values);
        }

        Self {
            version: NiftiVersion::Nifti1,
            byte_order: ByteOrder::native(),
            dim_info: bytes[DIM_INFO],
            dim,
            intent_p,
            intent_code: B::read_i16(&bytes[INTENT_CODE..]) as i32,
            datatype: B::read_i16(&bytes[DATATYPE..]),
            bitpix: B::read_i16(&bytes[BITPIX..]),
            slice_start: B::read_i16(&bytes[SLICE_START..]) as i64,
            pixdim,
            vox_offset: B::read_f32(&bytes[VOX_OFFSET..]) as i64,
            scl_slope: B::read_f32(&bytes[SCL_SLOPE..]) as f64,
            scl_inter: B::read_f32(&bytes[SCL_INTER..]) as f64,
            slice_end: B::read_i16(&bytes[SLICE_END..]) as i64,
            slice_code: bytes[SLICE_CODE] as i32,
            xyzt_units: bytes[XYZT_UNITS] as i32,
            cal_max: B::read_f32(&bytes[CAL_MAX..]) as f64,
            cal_min: B::read_f32(&bytes[CAL_MIN..]) as f64,
            slice_duration: B::read_f32(&bytes[SLICE_DURATION..]) as f64,
            toffset: B::read_f32(&bytes[TOFFSET..]) as f64,
            description: read_string(&bytes[DESCRIP..DESCRIP + DESCRIP_LEN]),
            aux_file: read_string(&bytes[AUX_FILE..AUX_FILE + AUX_FILE_LEN]),
            qform_code: B::read_i16(&bytes[QFORM_CODE..]) as i32,
            sform_code: B::read_i16(&bytes[SFORM_CODE..]) as i32,
            quatern,
            qoffset,
            srow,
            intent_name: read_string(&bytes[INTENT_NAME..INTENT_NAME + INTENT_NAME_LEN]),
        }
    }

    fn decode_v2<B: BO>(bytes: &[u8]) -> Self {
        use v2::*;
        let read_f64s = |start: usize, out: &mut [f64]| {
            for (i, value) in out.iter_mut().enumerate() {
                *value = B::read_f64(&bytes[start + 8 * i..]);
            }
        };
        let mut dim = [0i64; 8];
        for (i, value) in dim.iter_mut().enumerate() {
            *value = B::read_i64(&bytes[DIM + 8 * i..]);
        }
        let mut pixdim = [0.0; 8];
        let mut intent_p = [0.0; 3];
        let mut quatern = [0.0; 3];
        let mut qoffset = [0.0; 3];
        let mut srow = [[0.0; 4]; 3];
        read_f64s(PIXDIM, &mut pixdim);
        read_f64s(INTENT_P, &mut intent_p);
        read_f64s(QUATERN, &mut quatern);
        read_f64s(QOFFSET, &mut qoffset);
        for (row, values) in srow.iter_mut().enumerate() {
            read_f64s(SROW + 32 * row, values);
        }

        Self {
            version: NiftiVersion::Nifti2,
            byte_order: ByteOrder::native(),
            dim_info: bytes[DIM_INFO],
            dim,
            intent_p,
            intent_code: B::read_i32(&bytes[INTENT_CODE..]),
            datatype: B::read_i16(&bytes[DATATYPE..]),
            bitpix: B::read_i16(&bytes[BITPIX..]),
            slice_start: B::read_i64(&bytes[SLICE_START..]),
            pixdim,
            vox_offset: B::read_i64(&bytes[VOX_OFFSET..]),
            scl_slope: B::read_f64(&bytes[SCL_SLOPE..]),
            scl_inter: B::read_f64(&bytes[SCL_INTER..]),
            slice_end: B::read_i64(&bytes[SLICE_END..]),
            slice_code: B::read_i32(&bytes[SLICE_CODE..]),
            xyzt_units: B::read_i32(&bytes[XYZT_UNITS..]),
            cal_max: B::read_f64(&bytes[CAL_MAX..]),
            cal_min: B::read_f64(&bytes[CAL_MIN..]),
            slice_duration: B::read_f64(&bytes[SLICE_DURATION..]),
            toffset: B::read_f64(&bytes[TOFFSET..]),
            description: read_string(&bytes[DESCRIP..DESCRIP + DESCRIP_LEN]),
            aux_file: read_string(&bytes[AUX_FILE..AUX_FILE + AUX_FILE_LEN]),
            qform_code: B::read_i32(&bytes[QFORM_CODE..]),
            sform_code: B::read_i32(&bytes[SFORM_CODE..]),
            quatern,
            qoffset,
            srow,
            intent_name: read_string(&bytes[INTENT_NAME..INTENT_NAME + INTENT_NAME_LEN]),
        }
    }

    /// Encode the header in `order`
    ///
    /// # Errors
    /// `MalformedHeader` when a NIfTI-1 header cannot represent a field value
    pub fn encode(&self, order: ByteOrder) -> Result<Vec<u8>> {
        match (self.version, order) {
            (NiftiVersion::Nifti1, ByteOrder::LittleEndian) => self.encode_v1::<LE>(),
            (NiftiVersion::Nifti1, ByteOrder::BigEndian) => self.encode_v1::<BE>(),
            (NiftiVersion::Nifti2, ByteOrder::LittleEndian) => Ok(self.encode_v2::<LE>()),
            (NiftiVersion::Nifti2, ByteOrder::BigEndian) => Ok(self.encode_v2::<BE>()),
        }
    }

    fn encode_v1<B: BO>(&self) -> Result<Vec<u8>> {
        use v1::*;
        let narrow = |value: i64, field: &str| {
            i16::try_from(value).map_err(|_| {
                CiftiError::malformed_header(format!(
                    "{field} value {value} does not fit in a NIfTI-1 header"
                ))
            })
        };
        let mut buf = vec![0u8; NiftiVersion::Nifti1.header_size()];
        B::write_i32(&mut buf[0..], 348);
        buf[DIM_INFO] = self.dim_info;
        for i in 0..8 {
            B::write_i16(&mut buf[DIM + 2 * i..], narrow(self.dim[i], "dim")?);
            B::write_f32(&mut buf[PIXDIM + 4 * i..], self.pixdim[i] as f32);
        }
        let write_f32s = |buf: &mut [u8], start: usize, values: &[f64]| {
            for (i, value) in values.iter().enumerate() {
                B::write_f32(&mut buf[start + 4 * i..], *value as f32);
            }
        };
        write_f32s(&mut buf, INTENT_P, &self.intent_p);
        write_f32s(&mut buf, QUATERN, &self.quatern);
        write_f32s(&mut buf, QOFFSET, &self.qoffset);
        for (row, values) in self.srow.iter().enumerate() {
            write_f32s(&mut buf, SROW + 16 * row, values);
        }
        B::write_i16(
            &mut buf[INTENT_CODE..],
            narrow(self.intent_code as i64, "intent_code")?,
        );
        B::write_i16(&mut buf[DATATYPE..], self.datatype);
        B::write_i16(&mut buf[BITPIX..], self.bitpix);
        B::write_i16(&mut buf[SLICE_START..], narrow(self.slice_start, "slice_start")?);
        B::write_f32(&mut buf[VOX_OFFSET..], self.vox_offset as f32);
        B::write_f32(&mut buf[SCL_SLOPE..], self.scl_slope as f32);
        B::write_f32(&mut buf[SCL_INTER..], self.scl_inter as f32);
        B::write_i16(&mut buf[SLICE_END..], narrow(self.slice_end, "slice_end")?);
        buf[SLICE_CODE] = self.slice_code as u8;
        buf[XYZT_UNITS] = self.xyzt_units as u8;
        B::write_f32(&mut buf[CAL_MAX..], self.cal_max as f32);
        B::write_f32(&mut buf[CAL_MIN..], self.cal_min as f32);
        B::write_f32(&mut buf[SLICE_DURATION..], self.slice_duration as f32);
        B::write_f32(&mut buf[TOFFSET..], self.toffset as f32);
        write_string(&mut buf[DESCRIP..DESCRIP + DESCRIP_LEN], &self.description);
        write_string(&mut buf[AUX_FILE..AUX_FILE + AUX_FILE_LEN], &self.aux_file);
        B::write_i16(&mut buf[QFORM_CODE..], self.qform_code as i16);
        B::write_i16(&mut buf[SFORM_CODE..], self.sform_code as i16);
        write_string(
            &mut buf[INTENT_NAME..INTENT_NAME + INTENT_NAME_LEN],
            &self.intent_name,
        );
        buf[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
        Ok(buf)
    }

    fn encode_v2<B: BO>(&self) -> Vec<u8> {
        use v2::*;
        let mut buf = vec![0u8; NiftiVersion::Nifti2.header_size()];
        let write_f64s = |buf: &mut [u8], start: usize, values: &[f64]| {
            for (i, value) in values.iter().enumerate() {
                B::write_f64(&mut buf[start + 8 * i..], *value);
            }
        };
        B::write_i32(&mut buf[0..], 540);
        buf[MAGIC..MAGIC + 4].copy_from_slice(b"n+2\0");
        buf[MAGIC + 4..MAGIC + 8].copy_from_slice(NIFTI2_MAGIC_TAIL);
        B::write_i16(&mut buf[DATATYPE..], self.datatype);
        B::write_i16(&mut buf[BITPIX..], self.bitpix);
        for (i, value) in self.dim.iter().enumerate() {
            B::write_i64(&mut buf[DIM + 8 * i..], *value);
        }
        write_f64s(&mut buf, INTENT_P, &self.intent_p);
        write_f64s(&mut buf, PIXDIM, &self.pixdim);
        B::write_i64(&mut buf[VOX_OFFSET..], self.vox_offset);
        B::write_f64(&mut buf[SCL_SLOPE..], self.scl_slope);
        B::write_f64(&mut buf[SCL_INTER..], self.scl_inter);
        B::write_f64(&mut buf[CAL_MAX..], self.cal_max);
        B::write_f64(&mut buf[CAL_MIN..], self.cal_min);
        B::write_f64(&mut buf[SLICE_DURATION..], self.slice_duration);
        B::write_f64(&mut buf[TOFFSET..], self.toffset);
        B::write_i64(&mut buf[SLICE_START..], self.slice_start);
        B::write_i64(&mut buf[SLICE_END..], self.slice_end);
        write_string(&mut buf[DESCRIP..DESCRIP + DESCRIP_LEN], &self.description);
        write_string(&mut buf[AUX_FILE..AUX_FILE + AUX_FILE_LEN], &self.aux_file);
        B::write_i32(&mut buf[QFORM_CODE..], self.qform_code);
        B::write_i32(&mut buf[SFORM_CODE..], self.sform_code);
        write_f64s(&mut buf, QUATERN, &self.quatern);
        write_f64s(&mut buf, QOFFSET, &self.qoffset);
        for (row, values) in self.srow.iter().enumerate() {
            write_f64s(&mut buf, SROW + 32 * row, values);
        }
        B::write_i32(&mut buf[SLICE_CODE..], self.slice_code);
        B::write_i32(&mut buf[XYZT_UNITS..], self.xyzt_units);
        B::write_i32(&mut buf[INTENT_CODE..], self.intent_code);
        write_string(
            &mut buf[INTENT_NAME..INTENT_NAME + INTENT_NAME_LEN],
            &self.intent_name,
        );
        buf[DIM_INFO] = self.dim_info;
        buf
    }

    /// Axes beyond the declared count are defined to be 1
    fn fix_dimensions(&mut self) -> Result<()> {
        let count = self.dim[0];
        if !(0..=7).contains(&count) {
            return Err(CiftiError::malformed_header(format!(
                "dimension count {count} is outside 0..=7"
            )));
        }
        let count = count as usize;
        for slot in &mut self.dim[count + 1..] {
            *slot = 1;
        }
        if let Some(bad) = self.dim[1..=count].iter().find(|&&d| d < 0) {
            return Err(CiftiError::malformed_header(format!(
                "negative dimension {bad}"
            )));
        }
        Ok(())
    }

    /// Matrix dimensions declared by the header
    ///
    /// Files with fewer than five declared axes predate the CIFTI layout; their
    /// spatial axes are reported directly and a warning is logged.
    pub fn dimensions(&self) -> Vec<usize> {
        let count = self.dim[0].clamp(0, 7) as usize;
        if count <= SPATIAL_SLOTS {
            warn!(
                "Header declares {} axes; reading dimensions from legacy format",
                count
            );
            return self.dim[1..=count].iter().map(|&d| d as usize).collect();
        }
        self.dim[SPATIAL_SLOTS + 1..=count]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Store matrix dimensions after the four unit spatial/temporal axes
    ///
    /// # Errors
    /// `NoDimensions` for an empty list, `TooManyDimensions` for more than three
    pub fn set_dimensions(&mut self, dims: &[usize]) -> Result<()> {
        if dims.is_empty() {
            return Err(CiftiError::NoDimensions);
        }
        if dims.len() > MAX_MATRIX_DIMENSIONS {
            return Err(CiftiError::TooManyDimensions { count: dims.len() });
        }
        self.dim = [1; 8];
        self.dim[0] = (dims.len() + SPATIAL_SLOTS) as i64;
        for (slot, &d) in self.dim[SPATIAL_SLOTS + 1..].iter_mut().zip(dims) {
            *slot = d as i64;
        }
        Ok(())
    }

    pub fn version(&self) -> NiftiVersion {
        self.version
    }

    /// Switch layouts, moving a default data offset along with the header size
    pub fn set_version(&mut self, version: NiftiVersion) {
        if self.vox_offset == self.version.default_vox_offset() {
            self.vox_offset = version.default_vox_offset();
        }
        self.version = version;
    }

    /// Byte order the header was decoded from
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Whether data following this header is stored in non-host order
    pub fn needs_swap(&self) -> bool {
        self.byte_order.needs_swap()
    }

    pub fn vox_offset(&self) -> i64 {
        self.vox_offset
    }

    pub fn set_vox_offset(&mut self, offset: i64) {
        self.vox_offset = offset;
    }

    pub fn extensions_offset(&self) -> i64 {
        self.version.extensions_offset()
    }

    pub fn intent_code(&self) -> IntentCode {
        IntentCode::from_code(self.intent_code)
    }

    pub fn intent_name(&self) -> &str {
        &self.intent_name
    }

    pub fn set_intent(&mut self, intent: IntentCode) {
        self.intent_code = intent.code();
        self.intent_name = intent.intent_name().to_string();
    }

    pub fn datatype(&self) -> i16 {
        self.datatype
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Matrix parameters for a store reading the data that follows this header
    pub fn matrix_descriptor(&self, caching_mode: CachingMode) -> MatrixDescriptor {
        MatrixDescriptor {
            dimensions: self.dimensions(),
            byte_offset: self.vox_offset,
            needs_byte_swap: self.needs_swap(),
            caching_mode,
        }
    }
}

fn check_magic(version: NiftiVersion, bytes: &[u8]) -> Result<()> {
    let start = match version {
        NiftiVersion::Nifti1 => v1::MAGIC,
        NiftiVersion::Nifti2 => v2::MAGIC,
    };
    let magic = &bytes[start..start + 4];
    let prefix_ok = magic[0] == b'n' && (magic[1] == b'+' || magic[1] == b'i') && magic[3] == 0;
    if !prefix_ok || !magic[2].is_ascii_digit() {
        return Err(CiftiError::malformed_header(format!(
            "bad magic signature {:?}",
            String::from_utf8_lossy(magic)
        )));
    }
    let digit = magic[2];
    if digit != b'1' && digit != b'2' {
        return Err(CiftiError::UnsupportedVersion {
            version: (digit - b'0') as i64,
        });
    }
    if digit != version.digit() {
        return Err(CiftiError::malformed_header(format!(
            "magic declares version {} but header size is {}",
            digit as char,
            version.header_size()
        )));
    }
    if version == NiftiVersion::Nifti2 && &bytes[start + 4..start + 8] != NIFTI2_MAGIC_TAIL {
        return Err(CiftiError::malformed_header(
            "NIfTI-2 magic is missing its line-ending check bytes",
        ));
    }
    Ok(())
}

fn read_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copy `value` into a fixed-width field, leaving room for a terminating NUL
fn write_string(field: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_header_fields() {
        let header = CiftiHeader::new();
        assert_eq!(header.version(), NiftiVersion::Nifti2);
        assert_eq!(header.vox_offset(), 544);
        assert_eq!(header.datatype(), DT_FLOAT32);
        assert_eq!(header.extensions_offset(), 540);
        assert!(!header.needs_swap());
    }

    #[test]
    fn test_dense_presets_set_intent() {
        let dconn = CiftiHeader::dense_connectivity();
        assert_eq!(dconn.intent_code(), IntentCode::ConnectivityDense);
        assert_eq!(dconn.intent_name(), "ConnDense");
        let dtseries = CiftiHeader::dense_time_series();
        assert_eq!(dtseries.intent_code(), IntentCode::ConnectivityDenseTime);
        assert_eq!(dtseries.intent_code().code(), 3002);
    }

    #[test]
    fn test_set_dimensions_layout() {
        let mut header = CiftiHeader::new();
        header.set_dimensions(&[91282, 1200]).unwrap();
        assert_eq!(header.dim, [6, 1, 1, 1, 1, 91282, 1200, 1]);
        assert_eq!(header.dimensions(), vec![91282, 1200]);
    }

    #[test]
    fn test_set_dimensions_rejects_bad_counts() {
        let mut header = CiftiHeader::new();
        assert!(matches!(
            header.set_dimensions(&[]),
            Err(CiftiError::NoDimensions)
        ));
        assert!(matches!(
            header.set_dimensions(&[1, 2, 3, 4]),
            Err(CiftiError::TooManyDimensions { count: 4 })
        ));
        header.set_dimensions(&[2, 3, 4]).unwrap();
        assert_eq!(header.dimensions(), vec![2, 3, 4]);
    }

    #[test]
    fn test_legacy_dimensions_use_spatial_axes() {
        let mut header = CiftiHeader::new();
        header.dim = [2, 10, 20, 1, 1, 1, 1, 1];
        assert_eq!(header.dimensions(), vec![10, 20]);
    }

    #[test]
    fn test_intent_code_round_trip() {
        for code in [0, 3001, 3002, 3003, 3004, 42] {
            assert_eq!(IntentCode::from_code(code).code(), code);
        }
        assert_eq!(IntentCode::from_code(42), IntentCode::Other(42));
    }

    #[test]
    fn test_encode_writes_magic_and_size() {
        let header = CiftiHeader::dense_connectivity();
        let bytes = header.encode(ByteOrder::LittleEndian).unwrap();
        assert_eq!(bytes.len(), 540);
        assert_eq!(LE::read_i32(&bytes[0..4]), 540);
        assert_eq!(&bytes[4..12], b"n+2\0\r\n\x1a\n");
    }

    #[test]
    fn test_nifti1_rejects_oversized_dimension() {
        let mut header = CiftiHeader::new();
        header.set_version(NiftiVersion::Nifti1);
        header.set_dimensions(&[91282, 91282]).unwrap();
        assert!(matches!(
            header.encode(ByteOrder::native()),
            Err(CiftiError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_set_version_moves_default_offset() {
        let mut header = CiftiHeader::new();
        header.set_version(NiftiVersion::Nifti1);
        assert_eq!(header.vox_offset(), 352);
        header.set_vox_offset(1024);
        header.set_version(NiftiVersion::Nifti2);
        assert_eq!(header.vox_offset(), 1024);
    }

    #[test]
    fn test_write_string_truncates() {
        let mut field = [0u8; 4];
        write_string(&mut field, "abcdef");
        assert_eq!(&field, b"abc\0");
        assert_eq!(read_string(&field), "abc");
    }
}
