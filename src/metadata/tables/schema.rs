//! Column layout of every metadata table (ECMA-335 II.22).
//!
//! Rows are stored as plain `u32` cells in column order; the layout below tells the codec how
//! wide each cell is on disk. The `*Column` modules name the cells that patching reads or
//! writes.

use crate::metadata::tables::{CodedIndexType, TableId, TableInfo};

/// The on-disk representation of one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Fixed 2-byte value
    U16,
    /// Fixed 4-byte value
    U32,
    /// Index into the `#Strings` heap
    Str,
    /// Index into the `#GUID` heap
    Guid,
    /// Index into the `#Blob` heap
    Blob,
    /// Simple index into another table
    Index(TableId),
    /// Coded index
    Coded(CodedIndexType),
}

impl ColumnKind {
    /// True if this column takes 4 bytes under the given widths
    #[must_use]
    pub fn is_large(&self, info: &TableInfo) -> bool {
        match self {
            ColumnKind::U16 => false,
            ColumnKind::U32 => true,
            ColumnKind::Str => info.is_large_str(),
            ColumnKind::Guid => info.is_large_guid(),
            ColumnKind::Blob => info.is_large_blob(),
            ColumnKind::Index(table) => info.is_large(*table),
            ColumnKind::Coded(kind) => info.is_large_coded(*kind),
        }
    }

    /// Size of this column in bytes
    #[must_use]
    pub fn size(&self, info: &TableInfo) -> usize {
        if self.is_large(info) {
            4
        } else {
            2
        }
    }
}

use ColumnKind::{Blob, Coded, Guid, Index, Str, U16, U32};

impl TableId {
    /// The columns of this table, in on-disk order
    #[must_use]
    pub fn columns(self) -> &'static [ColumnKind] {
        match self {
            TableId::Module => &[U16, Str, Guid, Guid, Guid],
            TableId::TypeRef => &[Coded(CodedIndexType::ResolutionScope), Str, Str],
            TableId::TypeDef => &[
                U32,
                Str,
                Str,
                Coded(CodedIndexType::TypeDefOrRef),
                Index(TableId::Field),
                Index(TableId::MethodDef),
            ],
            TableId::FieldPtr => &[Index(TableId::Field)],
            TableId::Field => &[U16, Str, Blob],
            TableId::MethodPtr => &[Index(TableId::MethodDef)],
            TableId::MethodDef => &[U32, U16, U16, Str, Blob, Index(TableId::Param)],
            TableId::ParamPtr => &[Index(TableId::Param)],
            TableId::Param => &[U16, U16, Str],
            TableId::InterfaceImpl => &[
                Index(TableId::TypeDef),
                Coded(CodedIndexType::TypeDefOrRef),
            ],
            TableId::MemberRef => &[Coded(CodedIndexType::MemberRefParent), Str, Blob],
            // Type is a single byte followed by a padding byte
            TableId::Constant => &[U16, Coded(CodedIndexType::HasConstant), Blob],
            TableId::CustomAttribute => &[
                Coded(CodedIndexType::HasCustomAttribute),
                Coded(CodedIndexType::CustomAttributeType),
                Blob,
            ],
            TableId::FieldMarshal => &[Coded(CodedIndexType::HasFieldMarshal), Blob],
            TableId::DeclSecurity => &[U16, Coded(CodedIndexType::HasDeclSecurity), Blob],
            TableId::ClassLayout => &[U16, U32, Index(TableId::TypeDef)],
            TableId::FieldLayout => &[U32, Index(TableId::Field)],
            TableId::StandAloneSig => &[Blob],
            TableId::EventMap => &[Index(TableId::TypeDef), Index(TableId::Event)],
            TableId::EventPtr => &[Index(TableId::Event)],
            TableId::Event => &[U16, Str, Coded(CodedIndexType::TypeDefOrRef)],
            TableId::PropertyMap => &[Index(TableId::TypeDef), Index(TableId::Property)],
            TableId::PropertyPtr => &[Index(TableId::Property)],
            TableId::Property => &[U16, Str, Blob],
            TableId::MethodSemantics => &[
                U16,
                Index(TableId::MethodDef),
                Coded(CodedIndexType::HasSemantics),
            ],
            TableId::MethodImpl => &[
                Index(TableId::TypeDef),
                Coded(CodedIndexType::MethodDefOrRef),
                Coded(CodedIndexType::MethodDefOrRef),
            ],
            TableId::ModuleRef => &[Str],
            TableId::TypeSpec => &[Blob],
            TableId::ImplMap => &[
                U16,
                Coded(CodedIndexType::MemberForwarded),
                Str,
                Index(TableId::ModuleRef),
            ],
            TableId::FieldRVA => &[U32, Index(TableId::Field)],
            TableId::EncLog => &[U32, U32],
            TableId::EncMap => &[U32],
            TableId::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            TableId::AssemblyProcessor => &[U32],
            TableId::AssemblyOS => &[U32, U32, U32],
            TableId::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            TableId::AssemblyRefProcessor => &[U32, Index(TableId::AssemblyRef)],
            TableId::AssemblyRefOS => &[U32, U32, U32, Index(TableId::AssemblyRef)],
            TableId::File => &[U32, Str, Blob],
            TableId::ExportedType => &[
                U32,
                U32,
                Str,
                Str,
                Coded(CodedIndexType::Implementation),
            ],
            TableId::ManifestResource => &[U32, U32, Str, Coded(CodedIndexType::Implementation)],
            TableId::NestedClass => &[Index(TableId::TypeDef), Index(TableId::TypeDef)],
            TableId::GenericParam => &[U16, U16, Coded(CodedIndexType::TypeOrMethodDef), Str],
            TableId::MethodSpec => &[Coded(CodedIndexType::MethodDefOrRef), Blob],
            TableId::GenericParamConstraint => &[
                Index(TableId::GenericParam),
                Coded(CodedIndexType::TypeDefOrRef),
            ],
        }
    }

    /// Size of one row of this table in bytes
    #[must_use]
    pub fn row_size(self, info: &TableInfo) -> usize {
        self.columns().iter().map(|column| column.size(info)).sum()
    }
}

#[allow(non_snake_case)]
/// Columns of the `TypeRef` table
pub mod TypeRefColumn {
    /// `ResolutionScope` coded index
    pub const RESOLUTION_SCOPE: usize = 0;
    /// `TypeName` string index
    pub const NAME: usize = 1;
    /// `TypeNamespace` string index
    pub const NAMESPACE: usize = 2;
}

#[allow(non_snake_case)]
/// Columns of the `TypeDef` table
pub mod TypeDefColumn {
    /// a 4-byte bitmask of type `TypeAttributes`
    pub const FLAGS: usize = 0;
    /// `TypeName` string index
    pub const NAME: usize = 1;
    /// `TypeNamespace` string index
    pub const NAMESPACE: usize = 2;
    /// `Extends` coded index
    pub const EXTENDS: usize = 3;
    /// first of a contiguous run of Fields owned by this Type
    pub const FIELD_LIST: usize = 4;
    /// first of a contiguous run of Methods owned by this Type
    pub const METHOD_LIST: usize = 5;
}

#[allow(non_snake_case)]
/// Columns of the `MethodDef` table
pub mod MethodDefColumn {
    /// RVA of the method body
    pub const RVA: usize = 0;
    /// `MethodImplAttributes`
    pub const IMPL_FLAGS: usize = 1;
    /// `MethodAttributes`
    pub const FLAGS: usize = 2;
    /// Name string index
    pub const NAME: usize = 3;
    /// Signature blob index
    pub const SIGNATURE: usize = 4;
    /// first of a contiguous run of Params owned by this method
    pub const PARAM_LIST: usize = 5;
}

#[allow(non_snake_case)]
/// Columns of the `MemberRef` table
pub mod MemberRefColumn {
    /// `MemberRefParent` coded index
    pub const CLASS: usize = 0;
    /// Name string index
    pub const NAME: usize = 1;
    /// Signature blob index
    pub const SIGNATURE: usize = 2;
}

#[allow(non_snake_case)]
/// Columns of the `CustomAttribute` table
pub mod CustomAttributeColumn {
    /// `HasCustomAttribute` coded index
    pub const PARENT: usize = 0;
    /// `CustomAttributeType` coded index of the constructor
    pub const TYPE: usize = 1;
    /// Value blob index
    pub const VALUE: usize = 2;
}

#[allow(non_snake_case)]
/// Columns of the `EventMap` and `PropertyMap` tables
pub mod MapColumn {
    /// Owning `TypeDef` index
    pub const PARENT: usize = 0;
    /// first of a contiguous run of members owned by the parent
    pub const LIST: usize = 1;
}

#[allow(non_snake_case)]
/// Columns of the `Event` and `Property` tables
pub mod MemberColumn {
    /// Flags
    pub const FLAGS: usize = 0;
    /// Name string index
    pub const NAME: usize = 1;
}

#[allow(non_snake_case)]
/// Columns of the `MethodSemantics` table
pub mod MethodSemanticsColumn {
    /// `MethodSemanticsAttributes`
    pub const SEMANTICS: usize = 0;
    /// `MethodDef` index of the accessor
    pub const METHOD: usize = 1;
    /// `HasSemantics` coded index of the owning event or property
    pub const ASSOCIATION: usize = 2;
}

#[allow(non_snake_case)]
/// Columns of the `NestedClass` table
pub mod NestedClassColumn {
    /// `TypeDef` index of the nested type
    pub const NESTED: usize = 0;
    /// `TypeDef` index of the enclosing type
    pub const ENCLOSING: usize = 1;
}

#[allow(non_snake_case)]
/// Columns of the `Assembly` table
pub mod AssemblyColumn {
    /// Name string index
    pub const NAME: usize = 7;
}

#[allow(non_snake_case)]
/// Columns of the `AssemblyRef` table
pub mod AssemblyRefColumn {
    /// Name string index
    pub const NAME: usize = 6;
}

#[allow(non_snake_case)]
/// All possible values of the `MethodSemantics.Semantics` column
pub mod MethodSemanticsAttributes {
    /// Setter for a property
    pub const SETTER: u32 = 0x0001;
    /// Getter for a property
    pub const GETTER: u32 = 0x0002;
    /// Other method for a property or event
    pub const OTHER: u32 = 0x0004;
    /// `AddOn` method for an event
    pub const ADD_ON: u32 = 0x0008;
    /// `RemoveOn` method for an event
    pub const REMOVE_ON: u32 = 0x0010;
    /// Fire method for an event
    pub const FIRE: u32 = 0x0020;
}

#[cfg(test)]
mod tests {
    use strum::{EnumCount, IntoEnumIterator};

    use super::*;

    #[test]
    fn row_sizes_small() {
        let info = TableInfo::new(&[0; TableId::COUNT], 0);

        assert_eq!(TableId::Module.row_size(&info), 10);
        assert_eq!(TableId::TypeDef.row_size(&info), 14);
        assert_eq!(TableId::MethodDef.row_size(&info), 14);
        assert_eq!(TableId::CustomAttribute.row_size(&info), 6);
        assert_eq!(TableId::Assembly.row_size(&info), 22);
        assert_eq!(TableId::AssemblyRef.row_size(&info), 20);
        assert_eq!(TableId::MethodSemantics.row_size(&info), 6);
    }

    #[test]
    fn row_sizes_large_heaps() {
        let info = TableInfo::new(&[0; TableId::COUNT], 0b111);

        assert_eq!(TableId::Module.row_size(&info), 18);
        assert_eq!(TableId::TypeDef.row_size(&info), 18);
        assert_eq!(TableId::MemberRef.row_size(&info), 10);
    }

    #[test]
    fn every_table_has_columns() {
        for table in TableId::iter() {
            assert!(!table.columns().is_empty(), "{:?}", table);
        }
    }
}
