//! Low-level byte order and safe reading/writing utilities for PE and CIL metadata structures.
//!
//! All reads are bounds-checked and return [`crate::Error::OutOfBounds`] instead of panicking.
//! Writes come in two flavours: in-place writes into an existing buffer (used when patching
//! header fields of a PE image) and appending writes into a growable `Vec<u8>` (used when
//! re-encoding metadata streams).
//!
//! # Key Components
//!
//! - [`CilIO`] - Endian-aware conversion trait for the primitive integer types
//! - [`read_le`], [`read_le_at`], [`read_le_at_dyn`] - Little-endian reads
//! - [`write_le_at`] - Little-endian in-place writes
//! - [`push_le`], [`push_le_dyn`] - Little-endian appending writes
//! - [`read_compressed_uint`], [`push_compressed_uint`] - ECMA-335 II.23.2 compressed integers
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::file::io::{push_le_dyn, read_le_at_dyn};
//!
//! let mut data = Vec::new();
//! push_le_dyn(&mut data, 1, false);
//! push_le_dyn(&mut data, 2, true);
//! assert_eq!(data.len(), 6);
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at_dyn(&data, &mut offset, false)?, 1);
//! assert_eq!(read_le_at_dyn(&data, &mut offset, true)?, 2);
//! # Ok::<(), dotpatch::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for type-specific safe binary conversion.
///
/// Each implementation names the fixed-size byte array backing the type, so reads and writes
/// can be expressed generically over all primitive integers used by the PE and metadata
/// formats.
pub trait CilIO: Sized + Copy {
    /// The fixed-size byte representation of the implementing type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Build a value from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Convert the value into little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty),*) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io!(u8, u16, u32, u64);

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing the
/// offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads a 2 or 4 byte index, as used for heap and table references in metadata rows.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Writes `value` in little-endian byte order at `offset` into an existing buffer, advancing
/// the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = end;
    Ok(())
}

/// Appends `value` in little-endian byte order.
pub fn push_le<T: CilIO>(data: &mut Vec<u8>, value: T) {
    data.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Appends a 2 or 4 byte index. Small indexes are truncated to `u16`; callers size the
/// column from the same row counts that produced the value.
#[allow(clippy::cast_possible_truncation)]
pub fn push_le_dyn(data: &mut Vec<u8>, value: u32, is_large: bool) {
    if is_large {
        push_le::<u32>(data, value);
    } else {
        push_le::<u16>(data, value as u16);
    }
}

/// Reads an ECMA-335 II.23.2 compressed unsigned integer at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for truncated input and [`crate::Error::Malformed`]
/// for an invalid leading byte.
pub fn read_compressed_uint(data: &[u8], offset: &mut usize) -> Result<u32> {
    let first_byte = read_le_at::<u8>(data, offset)?;

    // 1-byte encoding: 0xxxxxxx
    if (first_byte & 0x80) == 0 {
        return Ok(u32::from(first_byte));
    }

    // 2-byte encoding: 10xxxxxx xxxxxxxx
    if (first_byte & 0xC0) == 0x80 {
        let second_byte = read_le_at::<u8>(data, offset)?;
        return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
    }

    // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
    if (first_byte & 0xE0) == 0xC0 {
        let b1 = u32::from(read_le_at::<u8>(data, offset)?);
        let b2 = u32::from(read_le_at::<u8>(data, offset)?);
        let b3 = u32::from(read_le_at::<u8>(data, offset)?);
        return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
    }

    Err(malformed_error!("Invalid compressed uint - {}", first_byte))
}

/// Appends `value` as an ECMA-335 II.23.2 compressed unsigned integer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the value exceeds `0x1FFF_FFFF`.
#[allow(clippy::cast_possible_truncation)]
pub fn push_compressed_uint(data: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..=0x7F => data.push(value as u8),
        0x80..=0x3FFF => {
            data.push(((value >> 8) as u8) | 0x80);
            data.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            data.push(((value >> 24) as u8) | 0xC0);
            data.push((value >> 16) as u8);
            data.push((value >> 8) as u8);
            data.push(value as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value too large for a compressed uint - {}",
                value
            ))
        }
    }

    Ok(())
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two.
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_le_sequence() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
        let mut offset = 0;

        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 1);
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 2);
        assert_eq!(read_le_at::<u32>(&data, &mut offset).unwrap(), 3);
        assert_eq!(offset, 8);
        assert!(matches!(
            read_le_at::<u8>(&data, &mut offset),
            Err(OutOfBounds)
        ));
    }

    #[test]
    fn write_le_in_place() {
        let mut data = [0u8; 6];
        let mut offset = 2;
        write_le_at::<u32>(&mut data, &mut offset, 0xAABB_CCDD).unwrap();
        assert_eq!(data, [0x00, 0x00, 0xDD, 0xCC, 0xBB, 0xAA]);

        let mut offset = 4;
        assert!(write_le_at::<u32>(&mut data, &mut offset, 1).is_err());
    }

    #[test]
    fn compressed_uint_encodings() {
        // ECMA-335 II.23.2 examples
        #[rustfmt::skip]
        let cases: [(u32, &[u8]); 6] = [
            (0x03, &[0x03]),
            (0x7F, &[0x7F]),
            (0x80, &[0x80, 0x80]),
            (0x2E57, &[0xAE, 0x57]),
            (0x4000, &[0xC0, 0x00, 0x40, 0x00]),
            (0x1FFF_FFFF, &[0xDF, 0xFF, 0xFF, 0xFF]),
        ];

        for (value, encoded) in cases {
            let mut data = Vec::new();
            push_compressed_uint(&mut data, value).unwrap();
            assert_eq!(data, encoded);

            let mut offset = 0;
            assert_eq!(read_compressed_uint(encoded, &mut offset).unwrap(), value);
            assert_eq!(offset, encoded.len());
        }

        assert!(push_compressed_uint(&mut Vec::new(), 0x2000_0000).is_err());
    }

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 4), 0);
        assert_eq!(align_up(5, 4), 8);
        assert_eq!(align_up(0x200, 0x200), 0x200);
        assert_eq!(align_up(0x201, 0x200), 0x400);
    }
}
