//! Shared fixtures for the integration tests.
//!
//! [`build_assembly`] synthesizes a small PE32 class library named `Core` with metadata built
//! through the public codec API. Its types:
//!
//! | Row | Type                 | Flags                     | Members                         |
//! |-----|----------------------|---------------------------|---------------------------------|
//! | 1   | `<Module>`           |                           |                                 |
//! | 2   | `MyApp.FooOptions`   | public sealed             |                                 |
//! | 3   | `MyApp.Bar`          | public sealed             |                                 |
//! | 4   | `MyApp.BazOptions`   | public                    |                                 |
//! | 5   | `MyApp.Service`      | public                    | `Run`, `Helper`, `Name`, `.ctor`, `Secret` |
//! | 6   | `MyApp.Service/Inner`| nested public sealed      |                                 |

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dotpatch::{
    file::io::{align_up, push_le},
    metadata::{
        root::Root,
        streams::{Blob, Strings},
        tables::{CodedIndex, CodedIndexType, TableId, TablesStream},
    },
    model::TypeAttributes,
};

pub const PUBLIC_SEALED: u32 = TypeAttributes::PUBLIC | TypeAttributes::SEALED;

pub const RUN_FLAGS: u32 = 0x0086; // public hidebysig
pub const HELPER_FLAGS: u32 = 0x0083; // assembly hidebysig
pub const GET_NAME_FLAGS: u32 = 0x0883; // assembly hidebysig specialname
pub const SET_NAME_FLAGS: u32 = 0x0886; // public hidebysig specialname
pub const CTOR_FLAGS: u32 = 0x1886; // public hidebysig specialname rtspecialname
pub const SECRET_FLAGS: u32 = 0x0081; // private hidebysig

/// Method rows of `MyApp.Service`
pub const RUN: u32 = 1;
pub const HELPER: u32 = 2;
pub const GET_NAME: u32 = 3;
pub const SET_NAME: u32 = 4;
pub const CTOR: u32 = 5;
pub const SECRET: u32 = 6;

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: usize = 0x2000;
const TEXT_RVA: usize = 0x2000;
const COR20_SIZE: usize = 72;
const PE_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_OFFSET: usize = PE_OFFSET + 24;
const SECTION_TABLE_OFFSET: usize = OPTIONAL_HEADER_OFFSET + 0xE0;

/// Variations of the synthesized assembly.
#[derive(Clone, Copy, Debug)]
pub struct Fixture {
    /// Add `.rsrc` and `.reloc` so the section table has no room for another header
    pub crowded: bool,
    /// Name of the tables stream; `#-` marks unoptimized metadata
    pub tables_stream: &'static str,
    /// Emit an `Assembly` row
    pub assembly_row: bool,
}

impl Default for Fixture {
    fn default() -> Self {
        Fixture {
            crowded: false,
            tables_stream: "#~",
            assembly_row: true,
        }
    }
}

/// Build the `Core` fixture and store it as `dir/Core.dll`
pub fn write_assembly(dir: &Path, fixture: Fixture) -> PathBuf {
    let path = dir.join("Core.dll");
    std::fs::write(&path, build_assembly(fixture)).unwrap();
    path
}

pub fn build_assembly(fixture: Fixture) -> Vec<u8> {
    let metadata = build_metadata(fixture);
    build_pe(&metadata, fixture.crowded)
}

fn build_metadata(fixture: Fixture) -> Vec<u8> {
    let mut strings = Strings::new();
    let mut blob = Blob::new();
    let mut tables = TablesStream::new();
    let mut s = |value: &str| strings.intern(value).unwrap();

    let void_method = blob.append(&[0x20, 0x00, 0x01]).unwrap();
    let string_property = blob.append(&[0x28, 0x00, 0x0E]).unwrap();
    let attribute_value = blob.append(&[0x01, 0x00, 0x00, 0x00]).unwrap();

    let type_def_or_ref = |table, row| CodedIndexType::TypeDefOrRef.encode(&CodedIndex::new(table, row)).unwrap();

    tables
        .push(TableId::Module, vec![0, s("Core.dll"), 1, 0, 0])
        .unwrap();

    tables
        .push(TableId::AssemblyRef, vec![8, 0, 0, 0, 0, 0, s("System.Runtime"), 0, 0])
        .unwrap();
    let runtime_scope = CodedIndexType::ResolutionScope
        .encode(&CodedIndex::new(TableId::AssemblyRef, 1))
        .unwrap();
    tables
        .push(TableId::TypeRef, vec![runtime_scope, s("Object"), s("System")])
        .unwrap();
    let object = type_def_or_ref(TableId::TypeRef, 1);

    let types = [
        (0, "<Module>", "", 0, 1),
        (PUBLIC_SEALED | TypeAttributes::BEFORE_FIELD_INIT, "FooOptions", "MyApp", object, 1),
        (PUBLIC_SEALED, "Bar", "MyApp", object, 1),
        (TypeAttributes::PUBLIC, "BazOptions", "MyApp", object, 1),
        (TypeAttributes::PUBLIC, "Service", "MyApp", object, 1),
        (TypeAttributes::NESTED_PUBLIC | TypeAttributes::SEALED, "Inner", "", object, 7),
    ];
    for (flags, name, namespace, extends, method_list) in types {
        tables
            .push(
                TableId::TypeDef,
                vec![flags, s(name), s(namespace), extends, 1, method_list],
            )
            .unwrap();
    }

    let methods = [
        (RUN_FLAGS, "Run"),
        (HELPER_FLAGS, "Helper"),
        (GET_NAME_FLAGS, "get_Name"),
        (SET_NAME_FLAGS, "set_Name"),
        (CTOR_FLAGS, ".ctor"),
        (SECRET_FLAGS, "Secret"),
    ];
    for (flags, name) in methods {
        tables
            .push(TableId::MethodDef, vec![0, 0, flags, s(name), void_method, 1])
            .unwrap();
    }

    tables.push(TableId::PropertyMap, vec![5, 1]).unwrap();
    tables
        .push(TableId::Property, vec![0, s("Name"), string_property])
        .unwrap();
    let name_property = CodedIndexType::HasSemantics
        .encode(&CodedIndex::new(TableId::Property, 1))
        .unwrap();
    tables
        .push(TableId::MethodSemantics, vec![0x0001, SET_NAME, name_property])
        .unwrap();
    tables
        .push(TableId::MethodSemantics, vec![0x0002, GET_NAME, name_property])
        .unwrap();

    tables.push(TableId::NestedClass, vec![6, 5]).unwrap();

    // An attribute on MyApp.Service, sorting after anything attached to the assembly
    let service = CodedIndexType::HasCustomAttribute
        .encode(&CodedIndex::new(TableId::TypeDef, 5))
        .unwrap();
    let constructor = CodedIndexType::CustomAttributeType
        .encode(&CodedIndex::new(TableId::MethodDef, CTOR))
        .unwrap();
    tables
        .push(TableId::CustomAttribute, vec![service, constructor, attribute_value])
        .unwrap();

    if fixture.assembly_row {
        tables
            .push(TableId::Assembly, vec![0x8004, 1, 0, 0, 0, 0, 0, s("Core"), 0])
            .unwrap();
    }

    let tables = tables.to_bytes().unwrap();
    let guid = [0x5A_u8; 16];
    let user_strings = [0_u8];

    Root::new("v4.0.30319")
        .write(&[
            (fixture.tables_stream, &tables),
            ("#Strings", strings.data()),
            ("#US", &user_strings),
            ("#GUID", &guid),
            ("#Blob", blob.data()),
        ])
        .unwrap()
}

fn build_pe(metadata: &[u8], crowded: bool) -> Vec<u8> {
    let text_size = COR20_SIZE + metadata.len();
    let text_raw = align_up(text_size, FILE_ALIGNMENT);

    // (name, virtual size, content, characteristics)
    let mut sections: Vec<(&[u8; 8], usize, Vec<u8>, u32)> = Vec::new();

    let mut text = Vec::with_capacity(text_raw);
    push_le::<u32>(&mut text, COR20_SIZE as u32);
    push_le::<u16>(&mut text, 2);
    push_le::<u16>(&mut text, 5);
    push_le::<u32>(&mut text, (TEXT_RVA + COR20_SIZE) as u32);
    push_le::<u32>(&mut text, metadata.len() as u32);
    push_le::<u32>(&mut text, 1); // ILONLY
    text.resize(COR20_SIZE, 0);
    text.extend_from_slice(metadata);
    sections.push((b".text\0\0\0", text_size, text, 0x6000_0020));

    if crowded {
        sections.push((b".rsrc\0\0\0", 0x10, vec![0; 0x10], 0x4000_0040));
        sections.push((b".reloc\0\0", 0x0C, vec![0; 0x0C], 0x4200_0040));
    }

    let mut image = vec![0_u8; FILE_ALIGNMENT];
    image[0..2].copy_from_slice(b"MZ");
    image[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());
    image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

    let mut coff = Vec::new();
    push_le::<u16>(&mut coff, 0x014C);
    push_le::<u16>(&mut coff, sections.len() as u16);
    push_le::<u32>(&mut coff, 0);
    push_le::<u32>(&mut coff, 0);
    push_le::<u32>(&mut coff, 0);
    push_le::<u16>(&mut coff, 0xE0);
    push_le::<u16>(&mut coff, 0x2102);
    image[PE_OFFSET + 4..PE_OFFSET + 24].copy_from_slice(&coff);

    let mut headers = Vec::new();
    let mut virtual_address = TEXT_RVA;
    let mut raw_pointer = FILE_ALIGNMENT;
    let mut bodies = Vec::new();
    for (name, virtual_size, content, characteristics) in &sections {
        let raw_size = align_up(content.len(), FILE_ALIGNMENT);
        headers.extend_from_slice(*name);
        push_le::<u32>(&mut headers, *virtual_size as u32);
        push_le::<u32>(&mut headers, virtual_address as u32);
        push_le::<u32>(&mut headers, raw_size as u32);
        push_le::<u32>(&mut headers, raw_pointer as u32);
        push_le::<u32>(&mut headers, 0);
        push_le::<u32>(&mut headers, 0);
        push_le::<u16>(&mut headers, 0);
        push_le::<u16>(&mut headers, 0);
        push_le::<u32>(&mut headers, *characteristics);

        let mut body = content.clone();
        body.resize(raw_size, 0);
        bodies.push(body);

        virtual_address += align_up(*virtual_size, SECTION_ALIGNMENT);
        raw_pointer += raw_size;
    }
    let size_of_image = virtual_address;

    let mut optional = Vec::new();
    push_le::<u16>(&mut optional, 0x010B);
    push_le::<u8>(&mut optional, 8);
    push_le::<u8>(&mut optional, 0);
    push_le::<u32>(&mut optional, text_raw as u32); // SizeOfCode
    push_le::<u32>(&mut optional, 0); // SizeOfInitializedData
    push_le::<u32>(&mut optional, 0); // SizeOfUninitializedData
    push_le::<u32>(&mut optional, 0); // AddressOfEntryPoint
    push_le::<u32>(&mut optional, TEXT_RVA as u32); // BaseOfCode
    push_le::<u32>(&mut optional, 0); // BaseOfData
    push_le::<u32>(&mut optional, 0x1000_0000); // ImageBase
    push_le::<u32>(&mut optional, SECTION_ALIGNMENT as u32);
    push_le::<u32>(&mut optional, FILE_ALIGNMENT as u32);
    push_le::<u16>(&mut optional, 4); // OS version
    push_le::<u16>(&mut optional, 0);
    push_le::<u16>(&mut optional, 0); // Image version
    push_le::<u16>(&mut optional, 0);
    push_le::<u16>(&mut optional, 4); // Subsystem version
    push_le::<u16>(&mut optional, 0);
    push_le::<u32>(&mut optional, 0); // Win32VersionValue
    push_le::<u32>(&mut optional, size_of_image as u32);
    push_le::<u32>(&mut optional, FILE_ALIGNMENT as u32); // SizeOfHeaders
    push_le::<u32>(&mut optional, 0x1234_5678); // CheckSum
    push_le::<u16>(&mut optional, 3); // Subsystem: console
    push_le::<u16>(&mut optional, 0x8540); // DllCharacteristics
    push_le::<u32>(&mut optional, 0x0010_0000);
    push_le::<u32>(&mut optional, 0x1000);
    push_le::<u32>(&mut optional, 0x0010_0000);
    push_le::<u32>(&mut optional, 0x1000);
    push_le::<u32>(&mut optional, 0); // LoaderFlags
    push_le::<u32>(&mut optional, 16); // NumberOfRvaAndSizes
    for index in 0..16 {
        if index == 14 {
            push_le::<u32>(&mut optional, TEXT_RVA as u32);
            push_le::<u32>(&mut optional, COR20_SIZE as u32);
        } else {
            push_le::<u64>(&mut optional, 0);
        }
    }
    assert_eq!(optional.len(), 0xE0);

    image[OPTIONAL_HEADER_OFFSET..SECTION_TABLE_OFFSET].copy_from_slice(&optional);
    image[SECTION_TABLE_OFFSET..SECTION_TABLE_OFFSET + headers.len()].copy_from_slice(&headers);

    for body in bodies {
        image.extend_from_slice(&body);
    }
    image
}

/// Read a little-endian `u32` of the image
pub fn read_u32(image: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(image[offset..offset + 4].try_into().unwrap())
}

/// `(SizeOfImage, CheckSum, NumberOfSections)` of an image built by [`build_assembly`]
pub fn pe_fields(image: &[u8]) -> (u32, u32, u16) {
    let sections = u16::from_le_bytes([image[PE_OFFSET + 6], image[PE_OFFSET + 7]]);
    (
        read_u32(image, OPTIONAL_HEADER_OFFSET + 56),
        read_u32(image, OPTIONAL_HEADER_OFFSET + 64),
        sections,
    )
}
