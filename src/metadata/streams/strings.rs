//! String heap (`#Strings`) for .NET metadata.
//!
//! Holds the identifier strings (type, member and namespace names) referenced by the metadata
//! tables. The heap is owned so that new identifiers can be interned before the metadata is
//! written back.
//!
//! # Reference
//! - [ECMA-335 II.24.2.3](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use std::{ffi::CStr, str};

use crate::{Error::OutOfBounds, Result};

/// The `#Strings` heap: null-terminated UTF-8 strings, starting with an empty entry.
#[derive(Clone, Debug)]
pub struct Strings {
    data: Vec<u8>,
}

impl Default for Strings {
    fn default() -> Self {
        Strings { data: vec![0] }
    }
}

impl Strings {
    /// Create an empty heap containing only the mandatory empty string.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a copy of an existing `#Strings` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn from(data: &[u8]) -> Result<Strings> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #String heap is empty"));
        }

        Ok(Strings {
            data: data.to_vec(),
        })
    }

    /// Get the string starting at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap and
    /// [`crate::Error::Malformed`] for unterminated or non UTF-8 data.
    pub fn get(&self, index: u32) -> Result<&str> {
        let index = index as usize;
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        match CStr::from_bytes_until_nul(&self.data[index..]) {
            Ok(result) => match result.to_str() {
                Ok(result) => Ok(result),
                Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
            },
            Err(_) => Err(malformed_error!("Invalid string at index - {}", index)),
        }
    }

    /// Find the index of an existing entry equal to `value`.
    #[must_use]
    pub fn find(&self, value: &str) -> Option<u32> {
        if value.is_empty() {
            return Some(0);
        }

        let mut start = 1;
        for (position, byte) in self.data.iter().enumerate().skip(1) {
            if *byte == 0 {
                if &self.data[start..position] == value.as_bytes() {
                    return u32::try_from(start).ok();
                }
                start = position + 1;
            }
        }

        None
    }

    /// Return the index of `value`, appending it to the heap if it is not present yet.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` contains a null byte or the heap would
    /// outgrow a 32-bit index.
    pub fn intern(&mut self, value: &str) -> Result<u32> {
        if let Some(index) = self.find(value) {
            return Ok(index);
        }

        if value.as_bytes().contains(&0) {
            return Err(malformed_error!(
                "Identifier contains a null byte - {:?}",
                value
            ));
        }

        let index = u32::try_from(self.data.len())
            .map_err(|_| malformed_error!("#Strings heap too large"))?;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
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

    /// True if the heap only holds the mandatory empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data : [u8; 47] = [
            0x00,
            0x3c, 0x4d, 0x61, 0x69, 0x6e, 0x3e, 0x24, 0x00,
            0x43, 0x5f, 0x53, 0x68, 0x61, 0x72, 0x70, 0x5f, 0x50, 0x4f, 0x43, 0x5f, 0x31, 0x00,
            0x3c, 0x4d, 0x6f, 0x64, 0x75, 0x6c, 0x65, 0x3e, 0x00,
            0x53, 0x79, 0x73, 0x74, 0x65, 0x6d, 0x2e, 0x43, 0x6f, 0x6e, 0x73, 0x6f, 0x6c, 0x65, 0x00,
        ];

        let str_view = Strings::from(&data).unwrap();

        assert_eq!(str_view.get(1).unwrap(), "<Main>$");
        assert_eq!(str_view.get(9).unwrap(), "C_Sharp_POC_1");
        assert_eq!(str_view.get(23).unwrap(), "<Module>");
        assert_eq!(str_view.get(32).unwrap(), "System.Console");
        // Indexes may point into the middle of an entry
        assert_eq!(str_view.get(39).unwrap(), "Console");
        assert!(str_view.get(47).is_err());
    }

    #[test]
    fn intern_reuses_entries() {
        let mut heap = Strings::new();
        let first = heap.intern("InternalsVisibleToAttribute").unwrap();
        let second = heap.intern("System.Runtime.CompilerServices").unwrap();

        assert_eq!(first, 1);
        assert_eq!(heap.intern("InternalsVisibleToAttribute").unwrap(), first);
        assert_eq!(heap.get(second).unwrap(), "System.Runtime.CompilerServices");
        assert_eq!(heap.intern("").unwrap(), 0);
        assert!(heap.intern("bad\0name").is_err());
    }

    #[test]
    fn invalid_heap() {
        assert!(Strings::from(&[]).is_err());
        assert!(Strings::from(&[0x41, 0x00]).is_err());
    }
}
