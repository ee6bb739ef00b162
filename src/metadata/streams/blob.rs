//! Blob heap (`#Blob`) for .NET metadata.
//!
//! Stores length-prefixed binary data such as member signatures and custom attribute values.
//! The heap is owned so that new attribute blobs can be appended before writing.
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{
    file::io::{push_compressed_uint, read_compressed_uint},
    Error::OutOfBounds,
    Result,
};

/// The `#Blob` heap: compressed-length-prefixed byte sequences, starting with an empty blob.
#[derive(Clone, Debug)]
pub struct Blob {
    data: Vec<u8>,
}

impl Default for Blob {
    fn default() -> Self {
        Blob { data: vec![0] }
    }
}

impl Blob {
    /// Create an empty heap containing only the mandatory empty blob.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a copy of an existing `#Blob` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn from(data: &[u8]) -> Result<Blob> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob {
            data: data.to_vec(),
        })
    }

    /// Get the blob stored at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the index or the encoded length points past
    /// the heap.
    pub fn get(&self, index: u32) -> Result<&[u8]> {
        let index = index as usize;
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut offset = index;
        let len = read_compressed_uint(&self.data, &mut offset)? as usize;

        let Some(data_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[offset..data_end])
    }

    /// Find the index of an existing blob equal to `value`.
    ///
    /// Only entry boundaries reached by walking the heap from the start are considered. Walking
    /// stops at the first entry that cannot be decoded.
    #[must_use]
    pub fn find(&self, value: &[u8]) -> Option<u32> {
        let mut position = 1;
        while position < self.data.len() {
            let mut offset = position;
            let len = read_compressed_uint(&self.data, &mut offset).ok()? as usize;
            let end = offset.checked_add(len)?;
            if end > self.data.len() {
                return None;
            }

            if &self.data[offset..end] == value {
                return u32::try_from(position).ok();
            }
            position = end;
        }

        None
    }

    /// Return the index of `value`, appending it to the heap if no identical blob exists.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob or the heap outgrow their encodings.
    pub fn append(&mut self, value: &[u8]) -> Result<u32> {
        if value.is_empty() {
            return Ok(0);
        }

        if let Some(index) = self.find(value) {
            return Ok(index);
        }

        let index = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Blob heap too large"))?;
        let len =
            u32::try_from(value.len()).map_err(|_| malformed_error!("Blob value too large"))?;

        push_compressed_uint(&mut self.data, len)?;
        self.data.extend_from_slice(value);
        Ok(index)
    }

    /// Raw heap contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Heap size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the heap only holds the mandatory empty blob.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }
}
