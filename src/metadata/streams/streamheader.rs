//! Stream header for .NET metadata streams.
//!
//! Each entry of the stream directory that follows the metadata root names one stream and
//! records where its data lives relative to the start of the metadata.
//!
//! # Reference
//! - [ECMA-335 II.24.2.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{push_le, read_le_at},
    Error::OutOfBounds,
    Result,
};

/// Maximum length of a stream name, including its terminating null byte
const MAX_NAME_LEN: usize = 32;

/// A single entry of the metadata stream directory.
///
/// Names are not restricted to the five standard streams, so auxiliary streams produced by
/// some compilers (`#JTD`, `#Pdb`) survive a rewrite untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamHeader {
    /// Offset of the stream data, relative to the metadata root
    pub offset: u32,
    /// Size of the stream data in bytes
    pub size: u32,
    /// Stream name, without the terminating null byte
    pub name: String,
}

impl StreamHeader {
    /// Parse a stream header from the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the data is too short, or
    /// [`crate::Error::Malformed`] if the name is empty, unterminated or not ASCII.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let mut offset = 0;
        let stream_offset = read_le_at::<u32>(data, &mut offset)?;
        let size = read_le_at::<u32>(data, &mut offset)?;

        let name_area = &data[8..data.len().min(8 + MAX_NAME_LEN)];
        let Some(name_len) = name_area.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Stream header name is not terminated"));
        };

        let name_bytes = &name_area[..name_len];
        if name_bytes.is_empty() || !name_bytes.is_ascii() {
            return Err(malformed_error!(
                "Invalid stream header name - {:?}",
                String::from_utf8_lossy(name_bytes)
            ));
        }

        Ok(StreamHeader {
            offset: stream_offset,
            size,
            name: String::from_utf8_lossy(name_bytes).into_owned(),
        })
    }

    /// Number of bytes this header occupies in the stream directory.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        8 + Self::padded_name_len(&self.name)
    }

    /// Append the binary form of this header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        push_le::<u32>(out, self.offset);
        push_le::<u32>(out, self.size);

        let padded = Self::padded_name_len(&self.name);
        out.extend_from_slice(self.name.as_bytes());
        out.resize(out.len() + padded - self.name.len(), 0);
    }

    fn padded_name_len(name: &str) -> usize {
        (name.len() + 1 + 3) & !3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00,
        ];

        let parsed_header = StreamHeader::from(&header_bytes).unwrap();

        assert_eq!(parsed_header.offset, 0x6C);
        assert_eq!(parsed_header.size, 0x45A4);
        assert_eq!(parsed_header.name, "#~");
        assert_eq!(parsed_header.encoded_size(), 12);
    }

    #[test]
    fn unterminated_name() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x7E,
        ];

        assert!(StreamHeader::from(&header_bytes).is_err());
    }

    #[test]
    fn write_pads_name() {
        let header = StreamHeader {
            offset: 0x20,
            size: 0x10,
            name: "#Strings".to_string(),
        };

        let mut out = Vec::new();
        header.write(&mut out);

        #[rustfmt::skip]
        let expected = [
            0x20, 0x00, 0x00, 0x00,
            0x10, 0x00, 0x00, 0x00,
            b'#', b'S', b't', b'r', b'i', b'n', b'g', b's',
            0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(out, expected);
        assert_eq!(StreamHeader::from(&out).unwrap(), header);
    }
}
