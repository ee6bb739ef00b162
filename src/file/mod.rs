//! PE container handling for .NET assemblies.
//!
//! [`File`] owns the complete image bytes, validates them with `goblin`, and knows the few
//! header locations that have to change when the metadata block is replaced. The whole file is
//! read into memory up front, so the image can be written back over its own source path.
//!
//! # Key Components
//!
//! - [`File`] - An owned PE image with a CLI header
//! - [`MetadataPlacement`] - Where [`File::replace_metadata`] put the new metadata
//! - [`io`] - Little-endian read/write helpers shared by the metadata codec
//!
//! # Example
//!
//! ```rust,no_run
//! use dotpatch::file::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("Core.dll"))?;
//! let cor20 = file.cor20()?;
//! println!("metadata at RVA 0x{:X} ({} bytes)", cor20.meta_data_rva, file.metadata()?.len());
//! # Ok::<(), dotpatch::Error>(())
//! ```

pub mod io;

use std::path::Path;

use goblin::pe::PE;
use log::debug;

use crate::{
    file::io::{align_up, write_le_at},
    metadata::cor20header::{Cor20Header, COR20_HEADER_SIZE, META_DATA_RVA_OFFSET},
    Error::{Empty, NotSupported, OutOfBounds},
    Result,
};

/// Size of one entry of the section table
const SECTION_HEADER_SIZE: usize = 40;

/// Name of the section added for relocated metadata
const METADATA_SECTION_NAME: [u8; 8] = *b".meta\0\0\0";

/// `IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ`
const METADATA_SECTION_CHARACTERISTICS: u32 = 0x4000_0040;

/// `IMAGE_SCN_MEM_DISCARDABLE`
const SCN_MEM_DISCARDABLE: u32 = 0x0200_0000;

// Offsets relative to the start of the optional header; identical for PE32 and PE32+
const OPT_SIZE_OF_IMAGE: usize = 56;
const OPT_CHECKSUM: usize = 64;

/// Where [`File::replace_metadata`] stored the new metadata block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataPlacement {
    /// Written over the original metadata region, which was large enough
    InPlace,
    /// Written into a newly added section at the given RVA
    NewSection(u32),
    /// Appended to the last section, which now ends at a higher RVA
    ExtendedSection(u32),
}

#[derive(Clone, Copy, Debug)]
struct Section {
    header_offset: usize,
    virtual_address: u32,
    virtual_size: u32,
    size_of_raw_data: u32,
    pointer_to_raw_data: u32,
    characteristics: u32,
}

impl Section {
    fn virtual_end(&self) -> u64 {
        u64::from(self.virtual_address)
            + u64::from(self.virtual_size.max(self.size_of_raw_data))
    }
}

/// An owned PE image carrying .NET metadata.
pub struct File {
    data: Vec<u8>,
    pe_offset: usize,
    optional_header_offset: usize,
    section_table_offset: usize,
    section_alignment: usize,
    file_alignment: usize,
    size_of_headers: usize,
    sections: Vec<Section>,
    cor20_offset: usize,
}

impl File {
    /// Read and validate the image at `file`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be read, otherwise the errors
    /// of [`File::from_mem`].
    pub fn from_file(file: &Path) -> Result<File> {
        let data = std::fs::read(file)?;
        Self::from_mem(data)
    }

    /// Validate an in-memory image.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::GoblinErr`] if the PE
    /// structure is invalid, and [`crate::Error::Malformed`] if the image has no CLI header.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(Empty);
        }

        let (pe_offset, size_of_optional_header, windows, clr, sections) = {
            let pe = PE::parse(&data)?;
            let Some(optional_header) = pe.header.optional_header.as_ref() else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };

            let Some(clr) = optional_header.data_directories.get_clr_runtime_header() else {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ));
            };

            let windows = &optional_header.windows_fields;
            let sections: Vec<_> = pe
                .sections
                .iter()
                .map(|section| {
                    (
                        section.virtual_address,
                        section.virtual_size,
                        section.size_of_raw_data,
                        section.pointer_to_raw_data,
                        section.characteristics,
                    )
                })
                .collect();

            (
                pe.header.dos_header.pe_pointer as usize,
                usize::from(pe.header.coff_header.size_of_optional_header),
                (
                    windows.section_alignment,
                    windows.file_alignment,
                    windows.size_of_headers,
                ),
                (clr.virtual_address, clr.size),
                sections,
            )
        };

        let optional_header_offset = pe_offset + 24;
        let section_table_offset = optional_header_offset + size_of_optional_header;
        let sections = sections
            .into_iter()
            .enumerate()
            .map(
                |(index, (virtual_address, virtual_size, size_of_raw_data, pointer, flags))| {
                    Section {
                        header_offset: section_table_offset + index * SECTION_HEADER_SIZE,
                        virtual_address,
                        virtual_size,
                        size_of_raw_data,
                        pointer_to_raw_data: pointer,
                        characteristics: flags,
                    }
                },
            )
            .collect();

        let mut file = File {
            data,
            pe_offset,
            optional_header_offset,
            section_table_offset,
            section_alignment: windows.0 as usize,
            file_alignment: windows.1 as usize,
            size_of_headers: windows.2 as usize,
            sections,
            cor20_offset: 0,
        };

        let (clr_rva, clr_size) = clr;
        if clr_rva == 0 || (clr_size as usize) < COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "File does not have a valid CLR runtime header - 0x{:X} / {}",
                clr_rva,
                clr_size
            ));
        }
        file.cor20_offset = file.rva_to_offset(clr_rva as usize)?;

        Ok(file)
    }

    /// The raw image bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the file, returning the raw image bytes
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Image size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the image holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of sections in the image
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Parse the CLI header.
    ///
    /// # Errors
    /// See [`Cor20Header::read`].
    pub fn cor20(&self) -> Result<Cor20Header> {
        let data = self.data.get(self.cor20_offset..).ok_or(OutOfBounds)?;
        Cor20Header::read(data)
    }

    /// The current metadata block, as located by the CLI header.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the block is not backed by file data.
    pub fn metadata(&self) -> Result<&[u8]> {
        let cor20 = self.cor20()?;
        let offset = self.rva_to_offset(cor20.meta_data_rva as usize)?;
        let end = offset
            .checked_add(cor20.meta_data_size as usize)
            .ok_or(OutOfBounds)?;

        self.data.get(offset..end).ok_or(OutOfBounds)
    }

    /// Translate an RVA into a file offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section backs the RVA with file data.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        for section in &self.sections {
            let start = section.virtual_address as usize;
            let end = section.virtual_end() as usize;
            if rva >= start && rva < end {
                let delta = rva - start;
                if delta >= section.size_of_raw_data as usize {
                    break;
                }
                return Ok(delta + section.pointer_to_raw_data as usize);
            }
        }

        Err(malformed_error!(
            "RVA could not be converted to offset - {}",
            rva
        ))
    }

    /// Replace the metadata block with `metadata`.
    ///
    /// A block that fits into the current metadata region is written over it, padding the rest
    /// of the region with zeros and leaving the recorded metadata size unchanged. A larger block
    /// goes into a new section when the section table has room for one more header, or else
    /// at the end of the last section. The PE checksum is cleared whenever the layout changes.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the image has neither room for another section
    /// header nor a last section that can grow.
    pub fn replace_metadata(&mut self, metadata: &[u8]) -> Result<MetadataPlacement> {
        let cor20 = self.cor20()?;
        let old_offset = self.rva_to_offset(cor20.meta_data_rva as usize)?;
        let old_size = cor20.meta_data_size as usize;
        let new_size =
            u32::try_from(metadata.len()).map_err(|_| malformed_error!("Metadata too large"))?;

        if metadata.len() <= old_size {
            let region = self
                .data
                .get_mut(old_offset..old_offset + old_size)
                .ok_or(OutOfBounds)?;
            region[..metadata.len()].copy_from_slice(metadata);
            region[metadata.len()..].fill(0);

            debug!(
                "Rewrote metadata in place ({} of {} bytes)",
                metadata.len(),
                old_size
            );
            return Ok(MetadataPlacement::InPlace);
        }

        let placement = if self.has_room_for_section_header() {
            self.append_section(metadata)?
        } else {
            self.extend_last_section(metadata)?
        };

        let rva = match placement {
            MetadataPlacement::NewSection(rva) | MetadataPlacement::ExtendedSection(rva) => rva,
            MetadataPlacement::InPlace => cor20.meta_data_rva,
        };

        let mut offset = self.cor20_offset + META_DATA_RVA_OFFSET;
        write_le_at::<u32>(&mut self.data, &mut offset, rva)?;
        write_le_at::<u32>(&mut self.data, &mut offset, new_size)?;

        let mut offset = self.optional_header_offset + OPT_CHECKSUM;
        write_le_at::<u32>(&mut self.data, &mut offset, 0)?;

        debug!(
            "Relocated metadata to RVA 0x{:X} ({:?}, {} bytes)",
            rva, placement, new_size
        );
        Ok(placement)
    }

    fn has_room_for_section_header(&self) -> bool {
        let table_end = self.section_table_offset + (self.sections.len() + 1) * SECTION_HEADER_SIZE;
        let first_raw = self
            .sections
            .iter()
            .filter(|section| section.size_of_raw_data > 0)
            .map(|section| section.pointer_to_raw_data as usize)
            .min()
            .unwrap_or(usize::MAX);

        table_end <= self.size_of_headers && table_end <= first_raw
    }

    fn next_virtual_address(&self) -> Result<u32> {
        let end = self
            .sections
            .iter()
            .map(Section::virtual_end)
            .max()
            .unwrap_or(0);

        u32::try_from(align_up(end as usize, self.section_alignment))
            .map_err(|_| malformed_error!("Image too large"))
    }

    fn append_section(&mut self, metadata: &[u8]) -> Result<MetadataPlacement> {
        let virtual_address = self.next_virtual_address()?;
        let raw_pointer = align_up(self.data.len(), self.file_alignment);
        let raw_size = align_up(metadata.len(), self.file_alignment);

        let to_u32 = |value: usize| {
            u32::try_from(value).map_err(|_| malformed_error!("Section too large - {}", value))
        };

        let header_offset = self.section_table_offset + self.sections.len() * SECTION_HEADER_SIZE;
        let section = Section {
            header_offset,
            virtual_address,
            virtual_size: to_u32(metadata.len())?,
            size_of_raw_data: to_u32(raw_size)?,
            pointer_to_raw_data: to_u32(raw_pointer)?,
            characteristics: METADATA_SECTION_CHARACTERISTICS,
        };

        self.data
            .get_mut(header_offset..header_offset + 8)
            .ok_or(OutOfBounds)?
            .copy_from_slice(&METADATA_SECTION_NAME);
        self.write_section_header(&section)?;
        let mut offset = header_offset + 24;
        write_le_at::<u32>(&mut self.data, &mut offset, 0)?; // PointerToRelocations
        write_le_at::<u32>(&mut self.data, &mut offset, 0)?; // PointerToLinenumbers
        write_le_at::<u16>(&mut self.data, &mut offset, 0)?; // NumberOfRelocations
        write_le_at::<u16>(&mut self.data, &mut offset, 0)?; // NumberOfLinenumbers

        let section_count = u16::try_from(self.sections.len() + 1)
            .map_err(|_| malformed_error!("Too many sections"))?;
        let mut offset = self.pe_offset + 6;
        write_le_at::<u16>(&mut self.data, &mut offset, section_count)?;

        self.data.resize(raw_pointer, 0);
        self.data.extend_from_slice(metadata);
        self.data.resize(raw_pointer + raw_size, 0);

        self.sections.push(section);
        self.update_size_of_image()?;

        Ok(MetadataPlacement::NewSection(virtual_address))
    }

    fn extend_last_section(&mut self, metadata: &[u8]) -> Result<MetadataPlacement> {
        let Some(last) = self
            .sections
            .iter()
            .enumerate()
            .max_by_key(|(_, section)| section.pointer_to_raw_data)
            .map(|(index, _)| index)
        else {
            return Err(NotSupported("Image has no sections".to_string()));
        };

        let mut section = self.sections[last];
        let raw_end = section.pointer_to_raw_data as usize + section.size_of_raw_data as usize;
        let virtually_last = self
            .sections
            .iter()
            .all(|other| other.virtual_address <= section.virtual_address);
        if !virtually_last || self.data.len() > align_up(raw_end, self.file_alignment) {
            return Err(NotSupported(
                "No room for a metadata section and the last section can not grow".to_string(),
            ));
        }

        let inner = align_up(
            section.virtual_size.max(section.size_of_raw_data) as usize,
            16,
        );
        let new_virtual_size = inner + metadata.len();
        let new_raw_size = align_up(new_virtual_size, self.file_alignment);
        let rva = u32::try_from(section.virtual_address as usize + inner)
            .map_err(|_| malformed_error!("Image too large"))?;

        section.virtual_size = u32::try_from(new_virtual_size)
            .map_err(|_| malformed_error!("Section too large"))?;
        section.size_of_raw_data =
            u32::try_from(new_raw_size).map_err(|_| malformed_error!("Section too large"))?;
        section.characteristics =
            (section.characteristics & !SCN_MEM_DISCARDABLE) | METADATA_SECTION_CHARACTERISTICS;

        let start = section.pointer_to_raw_data as usize;
        self.data.resize(start + new_raw_size, 0);
        self.data[start + inner..start + inner + metadata.len()].copy_from_slice(metadata);

        self.write_section_header(&section)?;
        self.sections[last] = section;
        self.update_size_of_image()?;

        Ok(MetadataPlacement::ExtendedSection(rva))
    }

    fn write_section_header(&mut self, section: &Section) -> Result<()> {
        let mut offset = section.header_offset + 8;
        write_le_at::<u32>(&mut self.data, &mut offset, section.virtual_size)?;
        write_le_at::<u32>(&mut self.data, &mut offset, section.virtual_address)?;
        write_le_at::<u32>(&mut self.data, &mut offset, section.size_of_raw_data)?;
        write_le_at::<u32>(&mut self.data, &mut offset, section.pointer_to_raw_data)?;

        let mut offset = section.header_offset + 36;
        write_le_at::<u32>(&mut self.data, &mut offset, section.characteristics)
    }

    fn update_size_of_image(&mut self) -> Result<()> {
        let section_alignment = self.section_alignment;
        let size_of_image = self
            .sections
            .iter()
            .map(|section| {
                align_up(
                    section.virtual_address as usize + section.virtual_size as usize,
                    section_alignment,
                )
            })
            .max()
            .unwrap_or(self.size_of_headers);

        let size_of_image =
            u32::try_from(size_of_image).map_err(|_| malformed_error!("Image too large"))?;
        let mut offset = self.optional_header_offset + OPT_SIZE_OF_IMAGE;
        write_le_at::<u32>(&mut self.data, &mut offset, size_of_image)
    }
}
