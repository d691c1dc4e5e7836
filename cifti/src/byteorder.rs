use byteorder::{BigEndian as BE, ByteOrder as BO, LittleEndian as LE};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Byte order (endianness) of a CIFTI file on disk
///
/// Files may be written on either little-endian or big-endian hosts. The
/// header's `sizeof_hdr` field tells which one was used; data read in the
/// non-native order must be swapped before it is handed to callers.
#[derive(
    Display, EnumString, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash,
)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the running host
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::LittleEndian
        } else {
            Self::BigEndian
        }
    }

    /// The opposite of the host byte order
    pub const fn swapped() -> Self {
        match Self::native() {
            Self::LittleEndian => Self::BigEndian,
            Self::BigEndian => Self::LittleEndian,
        }
    }

    pub const fn is_native(&self) -> bool {
        matches!(
            (self, cfg!(target_endian = "little")),
            (Self::LittleEndian, true) | (Self::BigEndian, false)
        )
    }

    /// Whether values stored in this order must be swapped to reach host order
    pub const fn needs_swap(&self) -> bool {
        !self.is_native()
    }

    /// Reads a single 32-bit floating point number from a byte slice
    pub fn read_f32(&self, bytes: &[u8]) -> f32 {
        match self {
            Self::LittleEndian => LE::read_f32(bytes),
            Self::BigEndian => BE::read_f32(bytes),
        }
    }
}

/// Fixed-width values whose byte order can be reversed
pub trait SwapBytes: Copy {
    fn swapped(self) -> Self;
}

macro_rules! impl_swap_int {
    ($($t:ty),*) => {
        $(impl SwapBytes for $t {
            #[inline]
            fn swapped(self) -> Self {
                self.swap_bytes()
            }
        })*
    };
}

impl_swap_int!(i16, u16, i32, u32, i64, u64);

impl SwapBytes for f32 {
    #[inline]
    fn swapped(self) -> Self {
        f32::from_bits(self.to_bits().swap_bytes())
    }
}

impl SwapBytes for f64 {
    #[inline]
    fn swapped(self) -> Self {
        f64::from_bits(self.to_bits().swap_bytes())
    }
}

/// Reverse the byte order of every word in `buffer`
///
/// Applying it twice restores the original contents.
pub fn swap_bytes<T: SwapBytes>(buffer: &mut [T]) {
    for value in buffer.iter_mut() {
        *value = value.swapped();
    }
}
