//! Metadata root header and stream directory for .NET assemblies.
//!
//! This module defines the [`Root`] struct, which represents the root metadata header and stream
//! directory as specified by ECMA-335, together with [`Root::write`] which lays out a complete
//! metadata block from a set of stream payloads.
//!
//! # Example
//!
//! ```rust
//! use dotpatch::metadata::root::Root;
//! let root = Root::read(&[
//!            0x42, 0x53, 0x4A, 0x42,
//!            0x01, 0x00,
//!            0x01, 0x00,
//!            0x00, 0x00, 0x00, 0x00,
//!            0x08, 0x00, 0x00, 0x00,
//!            b'v', b'4', b'.', b'0', 0x00, 0x00, 0x00, 0x00,
//!            0x00, 0x00,
//!            0x01, 0x00,
//!            0x24, 0x00, 0x00, 0x00, // StreamHeader
//!            0x00, 0x00, 0x00, 0x00,
//!            0x23, 0x7E, 0x00, 0x00,
//!        ])?;
//! assert_eq!(root.version, "v4.0");
//! for stream in &root.stream_headers {
//!     println!("Stream: {} (offset: {}, size: {})", stream.name, stream.offset, stream.size);
//! }
//! # Ok::<(), dotpatch::Error>(())
//! ```
//!
//! # References
//!
//! - [ECMA-335 II.24.2.1: Metadata root](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{align_up, push_le, read_le, read_le_at},
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// The magic signature `BSJB` that starts every metadata root
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Upper bound on stream directory entries accepted when parsing
const MAX_STREAMS: u16 = 16;

/// The metadata root header (ECMA-335 II.24.2.1).
#[derive(Clone, Debug)]
pub struct Root {
    /// Magic signature, always [`CIL_HEADER_MAGIC`]
    pub signature: u32,
    /// Major version, 1 for all current runtimes
    pub major_version: u16,
    /// Minor version, 1 for all current runtimes
    pub minor_version: u16,
    /// Reserved, always 0
    pub reserved: u32,
    /// Declared length of the version string area, padded to a multiple of 4
    pub length: u32,
    /// Runtime version string, e.g. `v4.0.30319`, without padding
    pub version: String,
    /// Reserved, always 0
    pub flags: u16,
    /// Number of streams
    pub stream_number: u16,
    /// The stream directory
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Create a root for a fresh metadata block with the given runtime version string.
    #[must_use]
    pub fn new(version: &str) -> Root {
        Root {
            signature: CIL_HEADER_MAGIC,
            major_version: 1,
            minor_version: 1,
            reserved: 0,
            length: 0,
            version: version.to_string(),
            flags: 0,
            stream_number: 0,
            stream_headers: Vec::new(),
        }
    }

    /// Parse the metadata root from the start of a metadata block.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if any header or stream points past `data`, and
    /// [`crate::Error::Malformed`] for a wrong signature or an invalid stream directory.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 20 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        let version_string_length = read_le_at::<u32>(data, &mut 12)?;
        let Some(str_end) = (version_string_length as usize).checked_add(16) else {
            return Err(malformed_error!(
                "Version string length causing integer overflow - {}",
                version_string_length
            ));
        };
        if str_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version_bytes = &data[16..str_end];
        let version_len = version_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8_lossy(&version_bytes[..version_len]).into_owned();

        let mut offset = str_end;
        let flags = read_le_at::<u16>(data, &mut offset)?;
        let stream_count = read_le_at::<u16>(data, &mut offset)?;
        if stream_count == 0 || stream_count > MAX_STREAMS {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut streams = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            if offset >= data.len() {
                return Err(OutOfBounds);
            }

            let new_stream = StreamHeader::from(&data[offset..])?;
            match new_stream.offset.checked_add(new_stream.size) {
                Some(range) => {
                    if range as usize > data.len() {
                        return Err(OutOfBounds);
                    }
                }
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        new_stream.offset,
                        new_stream.size
                    ))
                }
            }

            if streams
                .iter()
                .any(|existing: &StreamHeader| existing.name == new_stream.name)
            {
                return Err(malformed_error!(
                    "Duplicate stream header - {}",
                    new_stream.name
                ));
            }

            offset += new_stream.encoded_size();
            streams.push(new_stream);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            reserved: read_le::<u32>(&data[8..])?,
            length: version_string_length,
            flags,
            stream_number: stream_count,
            stream_headers: streams,
            version,
        })
    }

    /// Look up a stream header by name.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }

    /// Slice the data of the named stream out of the metadata block it was parsed from.
    #[must_use]
    pub fn stream_data<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        let header = self.stream(name)?;
        let start = header.offset as usize;
        let end = start.checked_add(header.size as usize)?;
        data.get(start..end)
    }

    /// Lay out a complete metadata block: this root's version information followed by the
    /// given streams, in order.
    ///
    /// Every stream is padded with zero bytes to a multiple of 4. The directory of `self` is
    /// ignored; the written block's directory is derived from `streams`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if there are no streams, too many of them, or the
    /// block outgrows 32-bit offsets.
    pub fn write(&self, streams: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        if streams.is_empty() || streams.len() > MAX_STREAMS as usize {
            return Err(malformed_error!("Invalid stream count - {}", streams.len()));
        }

        let version_len = align_up(self.version.len() + 1, 4);
        let mut headers: Vec<StreamHeader> = streams
            .iter()
            .map(|(name, _)| StreamHeader {
                offset: 0,
                size: 0,
                name: (*name).to_string(),
            })
            .collect();

        let directory_len: usize = headers.iter().map(StreamHeader::encoded_size).sum();
        let mut position = 16 + version_len + 4 + directory_len;
        for (header, (_, payload)) in headers.iter_mut().zip(streams) {
            let size = align_up(payload.len(), 4);
            header.offset = u32::try_from(position)
                .map_err(|_| malformed_error!("Metadata too large"))?;
            header.size =
                u32::try_from(size).map_err(|_| malformed_error!("Stream too large"))?;
            position += size;
        }

        let mut out = Vec::with_capacity(position);
        push_le::<u32>(&mut out, CIL_HEADER_MAGIC);
        push_le::<u16>(&mut out, self.major_version);
        push_le::<u16>(&mut out, self.minor_version);
        push_le::<u32>(&mut out, self.reserved);
        push_le::<u32>(
            &mut out,
            u32::try_from(version_len).map_err(|_| malformed_error!("Version too long"))?,
        );
        out.extend_from_slice(self.version.as_bytes());
        out.resize(16 + version_len, 0);
        push_le::<u16>(&mut out, self.flags);
        #[allow(clippy::cast_possible_truncation)]
        push_le::<u16>(&mut out, headers.len() as u16);

        for header in &headers {
            header.write(&mut out);
        }

        for (_, payload) in streams {
            out.extend_from_slice(payload);
            out.resize(align_up(out.len(), 4), 0);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x00, 0x20,
            0x00, 0x30,
            0x00, 0x00, 0x00, 0x40,
            0x05, 0x00, 0x00, 0x00,
            b'H', b'E', b'L', b'L', b'O',
            0x00, 0x60,
            0x01, 0x00,

            0x1, 0x00, 0x00, 0x00, // StreamHeader
            0x5, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00,
        ];

        let parsed_header = Root::read(&header_bytes).unwrap();

        assert_eq!(parsed_header.signature, CIL_HEADER_MAGIC);
        assert_eq!(parsed_header.major_version, 0x2000);
        assert_eq!(parsed_header.minor_version, 0x3000);
        assert_eq!(parsed_header.reserved, 0x40000000);
        assert_eq!(parsed_header.length, 5);
        assert_eq!(parsed_header.version, "HELLO");
        assert_eq!(parsed_header.flags, 0x6000);
        assert_eq!(parsed_header.stream_number, 1);
        assert_eq!(parsed_header.stream_headers.len(), 1);
        assert_eq!(parsed_header.stream_headers[0].offset, 0x1);
        assert_eq!(parsed_header.stream_headers[0].size, 0x5);
        assert_eq!(parsed_header.stream_headers[0].name, "#~");
    }

    #[test]
    fn bad_signature() {
        let mut data = [0u8; 32];
        data[0] = 0x42;
        assert!(Root::read(&data).is_err());
    }

    #[test]
    fn write_and_read_back() {
        let root = Root::new("v4.0.30319");
        let tables = [0xAAu8; 6];
        let strings = [0x00u8, b'A', 0x00];

        let block = root
            .write(&[("#~", &tables), ("#Strings", &strings)])
            .unwrap();
        assert_eq!(block.len() % 4, 0);

        let parsed = Root::read(&block).unwrap();
        assert_eq!(parsed.version, "v4.0.30319");
        assert_eq!(parsed.length, 12);
        assert_eq!(parsed.stream_headers.len(), 2);

        let tables_data = parsed.stream_data(&block, "#~").unwrap();
        assert_eq!(tables_data.len(), 8);
        assert_eq!(&tables_data[..6], &tables);

        let strings_data = parsed.stream_data(&block, "#Strings").unwrap();
        assert_eq!(&strings_data[..3], &strings);
        assert!(parsed.stream("#Blob").is_none());
    }
}
