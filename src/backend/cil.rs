//! The ECMA-335 module backend.
//!
//! [`CilModule`] keeps the decoded image next to the [`Module`] built from it. Loading reads
//! `TypeDef`, `NestedClass`, `MethodDef`, the property and event maps, `MethodSemantics`, the
//! assembly name and existing `InternalsVisibleTo` markers. Writing copies type and method
//! flags back into their rows, adds one `CustomAttribute` row per new friend, and re-encodes
//! the metadata. Rows are never removed or reordered, except for `CustomAttribute` which no
//! other table points into, so existing tokens stay valid.

use std::{
    ops::{Deref, DerefMut, Range},
    path::Path,
};

use log::debug;

use crate::{
    backend::ModuleBackend,
    file::{
        io::{push_compressed_uint, read_compressed_uint},
        File, MetadataPlacement,
    },
    metadata::{
        root::Root,
        streams::{Blob, Strings},
        tables::{
            AssemblyColumn, AssemblyRefColumn, CodedIndex, CodedIndexType,
            CustomAttributeColumn, MapColumn, MemberColumn, MemberRefColumn, MethodDefColumn,
            MethodSemanticsAttributes, MethodSemanticsColumn, NestedClassColumn, TableId,
            TablesStream, TypeDefColumn, TypeRefColumn,
        },
    },
    model::{MethodId, Module, TypeId},
    Error::{NotSupported, OutOfBounds},
    Result,
};

const IVT_NAMESPACE: &str = "System.Runtime.CompilerServices";
const IVT_NAME: &str = "InternalsVisibleToAttribute";

/// `instance void .ctor(string)`
const IVT_CTOR_SIGNATURE: [u8; 4] = [0x20, 0x01, 0x01, 0x0E];

/// Assembly references that can scope a type of the core library
const CORE_LIBRARIES: [&str; 4] = ["System.Runtime", "mscorlib", "netstandard", "System.Private.CoreLib"];

/// Indirection tables that only appear in unoptimized (`#-`) metadata
const PTR_TABLES: [TableId; 5] = [
    TableId::FieldPtr,
    TableId::MethodPtr,
    TableId::ParamPtr,
    TableId::EventPtr,
    TableId::PropertyPtr,
];

/// Loads and writes .NET PE images.
#[derive(Clone, Copy, Debug, Default)]
pub struct CilBackend;

impl CilBackend {
    /// Create a new backend
    #[must_use]
    pub fn new() -> Self {
        CilBackend
    }
}

impl ModuleBackend for CilBackend {
    type Handle = CilModule;

    fn load(&self, path: &Path) -> Result<CilModule> {
        let data = std::fs::read(path)?;
        let fallback = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let module = CilModule::from_mem(data, &fallback)?;
        debug!(
            "Loaded '{}' from '{}' ({} types, {} methods)",
            module.name(),
            path.display(),
            module.type_count(),
            module.method_count()
        );
        Ok(module)
    }

    fn write(&self, module: CilModule, path: &Path) -> Result<()> {
        let data = module.into_bytes()?;
        std::fs::write(path, data)?;
        debug!("Wrote '{}'", path.display());
        Ok(())
    }
}

/// A [`Module`] loaded from a PE image, together with the decoded metadata it came from.
pub struct CilModule {
    module: Module,
    file: File,
    root: Root,
    streams: Vec<(String, Vec<u8>)>,
    tables: TablesStream,
    strings: Strings,
    blob: Blob,
    types: Vec<TypeId>,
    methods: Vec<(MethodId, u32)>,
}

impl CilModule {
    /// Decode a PE image. `fallback_name` names the module if it has no `Assembly` row.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for unoptimized metadata, and the errors of the
    /// metadata codec for damaged images.
    pub fn from_mem(data: Vec<u8>, fallback_name: &str) -> Result<CilModule> {
        let file = File::from_mem(data)?;
        let metadata = file.metadata()?;
        let root = Root::read(metadata)?;

        if root.stream("#-").is_some() {
            return Err(NotSupported(
                "Uncompressed '#-' tables stream".to_string(),
            ));
        }

        let mut streams = Vec::with_capacity(root.stream_headers.len());
        for header in &root.stream_headers {
            let data = root
                .stream_data(metadata, &header.name)
                .ok_or(OutOfBounds)?;
            streams.push((header.name.clone(), data.to_vec()));
        }

        let stream = |name: &str| {
            streams
                .iter()
                .find(|(stream_name, _)| stream_name == name)
                .map(|(_, data)| data.as_slice())
        };

        let Some(tables_data) = stream("#~") else {
            return Err(malformed_error!("Metadata has no '#~' stream"));
        };
        let tables = TablesStream::from(tables_data)?;
        if let Some(table_id) = PTR_TABLES
            .iter()
            .find(|table_id| tables.table_row_count(**table_id) > 0)
        {
            return Err(NotSupported(format!("Indirection table {:?}", table_id)));
        }

        let strings = match stream("#Strings") {
            Some(data) => Strings::from(data)?,
            None => Strings::new(),
        };
        let blob = match stream("#Blob") {
            Some(data) => Blob::from(data)?,
            None => Blob::new(),
        };

        let mut module = CilModule {
            module: Module::default(),
            file,
            root,
            streams,
            tables,
            strings,
            blob,
            types: Vec::new(),
            methods: Vec::new(),
        };
        module.module = module.build_model(fallback_name)?;
        Ok(module)
    }

    fn build_model(&mut self, fallback_name: &str) -> Result<Module> {
        let tables = &self.tables;
        let strings = &self.strings;

        let name = match tables.row(TableId::Assembly, 1) {
            Some(row) => strings.get(row[AssemblyColumn::NAME])?,
            None => fallback_name,
        };
        let mut module = Module::new(name);

        for row in tables.rows(TableId::TypeDef) {
            let id = module.add_type(
                strings.get(row[TypeDefColumn::NAMESPACE])?,
                strings.get(row[TypeDefColumn::NAME])?,
                row[TypeDefColumn::FLAGS],
            );
            self.types.push(id);
        }

        for row in tables.rows(TableId::NestedClass) {
            let nested = self.type_id(row[NestedClassColumn::NESTED])?;
            let enclosing = self.type_id(row[NestedClassColumn::ENCLOSING])?;
            module.set_enclosing(nested, enclosing)?;
        }

        let method_count = tables.table_row_count(TableId::MethodDef);
        let mut method_ids = vec![None; method_count as usize];
        for (type_rid, run) in member_runs(
            tables,
            TableId::TypeDef,
            TypeDefColumn::METHOD_LIST,
            method_count,
        )? {
            let owner = self.type_id(type_rid)?;
            for method_rid in run {
                let row = tables.row(TableId::MethodDef, method_rid).ok_or(OutOfBounds)?;
                let id = module.add_method(
                    owner,
                    strings.get(row[MethodDefColumn::NAME])?,
                    row[MethodDefColumn::FLAGS],
                )?;
                method_ids[method_rid as usize - 1] = Some(id);
                self.methods.push((id, method_rid));
            }
        }

        let property_count = tables.table_row_count(TableId::Property);
        let event_count = tables.table_row_count(TableId::Event);
        let mut property_accessors = vec![[None; 2]; property_count as usize];
        let mut event_accessors = vec![[None; 3]; event_count as usize];

        for row in tables.rows(TableId::MethodSemantics) {
            let Some(method) = method_ids
                .get((row[MethodSemanticsColumn::METHOD] as usize).wrapping_sub(1))
                .copied()
                .flatten()
            else {
                return Err(malformed_error!(
                    "MethodSemantics references unknown method - {}",
                    row[MethodSemanticsColumn::METHOD]
                ));
            };

            let association =
                CodedIndexType::HasSemantics.decode(row[MethodSemanticsColumn::ASSOCIATION])?;
            let index = (association.row as usize).wrapping_sub(1);
            let slot = match (association.tag, row[MethodSemanticsColumn::SEMANTICS]) {
                (TableId::Property, MethodSemanticsAttributes::GETTER) => property_accessors
                    .get_mut(index)
                    .map(|accessors| &mut accessors[0]),
                (TableId::Property, MethodSemanticsAttributes::SETTER) => property_accessors
                    .get_mut(index)
                    .map(|accessors| &mut accessors[1]),
                (TableId::Event, MethodSemanticsAttributes::ADD_ON) => event_accessors
                    .get_mut(index)
                    .map(|accessors| &mut accessors[0]),
                (TableId::Event, MethodSemanticsAttributes::REMOVE_ON) => event_accessors
                    .get_mut(index)
                    .map(|accessors| &mut accessors[1]),
                (TableId::Event, MethodSemanticsAttributes::FIRE) => event_accessors
                    .get_mut(index)
                    .map(|accessors| &mut accessors[2]),
                // 'other' methods are not accessors
                _ => continue,
            };

            match slot {
                Some(slot) => *slot = Some(method),
                None => {
                    return Err(malformed_error!(
                        "MethodSemantics references unknown {:?} - {}",
                        association.tag,
                        association.row
                    ))
                }
            }
        }

        for (map_rid, run) in member_runs(
            tables,
            TableId::PropertyMap,
            MapColumn::LIST,
            property_count,
        )? {
            let owner = self.type_id(tables.cell(TableId::PropertyMap, map_rid, MapColumn::PARENT)?)?;
            for property_rid in run {
                let row = tables.row(TableId::Property, property_rid).ok_or(OutOfBounds)?;
                let [getter, setter] = property_accessors[property_rid as usize - 1];
                module.add_property(
                    owner,
                    strings.get(row[MemberColumn::NAME])?,
                    getter,
                    setter,
                )?;
            }
        }

        for (map_rid, run) in member_runs(tables, TableId::EventMap, MapColumn::LIST, event_count)? {
            let owner = self.type_id(tables.cell(TableId::EventMap, map_rid, MapColumn::PARENT)?)?;
            for event_rid in run {
                let row = tables.row(TableId::Event, event_rid).ok_or(OutOfBounds)?;
                let [add, remove, raise] = event_accessors[event_rid as usize - 1];
                module.add_event(
                    owner,
                    strings.get(row[MemberColumn::NAME])?,
                    add,
                    remove,
                    raise,
                )?;
            }
        }

        for row in tables.rows(TableId::CustomAttribute) {
            let parent = CodedIndexType::HasCustomAttribute.decode(row[CustomAttributeColumn::PARENT])?;
            if parent.tag != TableId::Assembly {
                continue;
            }

            let constructor =
                CodedIndexType::CustomAttributeType.decode(row[CustomAttributeColumn::TYPE])?;
            if !self.is_ivt_constructor(constructor)? {
                continue;
            }

            match read_ser_string(self.blob.get(row[CustomAttributeColumn::VALUE])?) {
                Some(friend) => module.record_internals_visible_to(&friend),
                None => debug!("Skipping InternalsVisibleTo marker without a readable argument"),
            }
        }

        Ok(module)
    }

    fn type_id(&self, rid: u32) -> Result<TypeId> {
        (rid as usize)
            .checked_sub(1)
            .and_then(|index| self.types.get(index))
            .copied()
            .ok_or_else(|| malformed_error!("Reference to unknown TypeDef - {}", rid))
    }

    /// True for a `MemberRef` to the constructor of a type reference named
    /// `System.Runtime.CompilerServices.InternalsVisibleToAttribute`
    fn is_ivt_constructor(&self, constructor: CodedIndex) -> Result<bool> {
        if constructor.tag != TableId::MemberRef {
            return Ok(false);
        }

        let class = CodedIndexType::MemberRefParent.decode(self.tables.cell(
            TableId::MemberRef,
            constructor.row,
            MemberRefColumn::CLASS,
        )?)?;
        if class.tag != TableId::TypeRef {
            return Ok(false);
        }

        self.is_ivt_type_ref(class.row)
    }

    fn is_ivt_type_ref(&self, rid: u32) -> Result<bool> {
        let row = self.tables.row(TableId::TypeRef, rid).ok_or(OutOfBounds)?;
        Ok(self.strings.get(row[TypeRefColumn::NAME])? == IVT_NAME
            && self.strings.get(row[TypeRefColumn::NAMESPACE])? == IVT_NAMESPACE)
    }

    /// The decoded `#~` stream, as last loaded or written
    #[must_use]
    pub fn tables(&self) -> &TablesStream {
        &self.tables
    }

    /// The `#Strings` heap
    #[must_use]
    pub fn strings(&self) -> &Strings {
        &self.strings
    }

    /// The `#Blob` heap
    #[must_use]
    pub fn blob(&self) -> &Blob {
        &self.blob
    }

    /// Apply the model to the metadata and encode the complete image.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if types or methods were added to the model, if a
    /// marker has to be added to a module without an `Assembly` row or core library reference,
    /// or if the image has no room for larger metadata.
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        let placement = self.apply()?;
        debug!("Metadata of '{}' placed {:?}", self.module.name(), placement);
        Ok(self.file.into_data())
    }

    fn apply(&mut self) -> Result<MetadataPlacement> {
        if self.module.type_count() != self.types.len()
            || self.module.method_count() != self.methods.len()
        {
            return Err(NotSupported(
                "Adding types or methods to a loaded image".to_string(),
            ));
        }

        for (index, id) in self.types.iter().enumerate() {
            let flags = self.module.type_def(*id).ok_or(OutOfBounds)?.flags();
            let row = self
                .tables
                .row_mut(TableId::TypeDef, index as u32 + 1)
                .ok_or(OutOfBounds)?;
            row[TypeDefColumn::FLAGS] = flags;
        }

        for (id, rid) in &self.methods {
            let flags = self.module.method(*id).ok_or(OutOfBounds)?.flags();
            let row = self
                .tables
                .row_mut(TableId::MethodDef, *rid)
                .ok_or(OutOfBounds)?;
            row[MethodDefColumn::FLAGS] = flags;
        }

        let friends = self.module.added_internals_visible_to().to_vec();
        if !friends.is_empty() {
            let constructor = self.ivt_constructor()?;
            for friend in &friends {
                self.add_ivt_row(constructor, friend)?;
            }
        }

        let guid_len = self
            .streams
            .iter()
            .find(|(name, _)| name == "#GUID")
            .map_or(0, |(_, data)| data.len());
        self.tables
            .require_heap_sizes(self.strings.len(), guid_len, self.blob.len());

        let tables = self.tables.to_bytes()?;
        self.store_stream("#Strings", self.strings.data().to_vec());
        self.store_stream("#Blob", self.blob.data().to_vec());
        self.store_stream("#~", tables);

        let streams: Vec<(&str, &[u8])> = self
            .streams
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        let metadata = self.root.write(&streams)?;

        if self.file.cor20()?.is_strong_name_signed() {
            debug!(
                "'{}' is strong-name signed; the signature no longer matches",
                self.module.name()
            );
        }

        let placement = self.file.replace_metadata(&metadata)?;
        self.module.commit_internals_visible_to();
        Ok(placement)
    }

    fn store_stream(&mut self, name: &str, data: Vec<u8>) {
        match self.streams.iter_mut().find(|(stream, _)| stream == name) {
            Some((_, stored)) => *stored = data,
            // A heap holding only its mandatory empty entry is left out
            None if data.len() > 1 => self.streams.push((name.to_string(), data)),
            None => {}
        }
    }

    /// Find or add the `MemberRef` for `InternalsVisibleToAttribute::.ctor(string)`
    fn ivt_constructor(&mut self) -> Result<u32> {
        if self.tables.table_row_count(TableId::Assembly) == 0 {
            return Err(NotSupported(
                "InternalsVisibleTo on a module without an Assembly row".to_string(),
            ));
        }

        let type_ref = self.ivt_type_ref()?;
        let class = CodedIndexType::MemberRefParent
            .encode(&CodedIndex::new(TableId::TypeRef, type_ref))?;

        for (index, row) in self.tables.rows(TableId::MemberRef).iter().enumerate() {
            if row[MemberRefColumn::CLASS] == class
                && self.strings.get(row[MemberRefColumn::NAME])? == ".ctor"
                && self.blob.get(row[MemberRefColumn::SIGNATURE])? == IVT_CTOR_SIGNATURE
            {
                return Ok(index as u32 + 1);
            }
        }

        let name = self.strings.intern(".ctor")?;
        let signature = self.blob.append(&IVT_CTOR_SIGNATURE)?;
        let rid = self
            .tables
            .push(TableId::MemberRef, vec![class, name, signature])?;
        debug!("Added MemberRef {} for {}.{}::.ctor", rid, IVT_NAMESPACE, IVT_NAME);
        Ok(rid)
    }

    fn ivt_type_ref(&mut self) -> Result<u32> {
        for rid in 1..=self.tables.table_row_count(TableId::TypeRef) {
            if self.is_ivt_type_ref(rid)? {
                return Ok(rid);
            }
        }

        let scope = self.core_library_scope()?;
        let name = self.strings.intern(IVT_NAME)?;
        let namespace = self.strings.intern(IVT_NAMESPACE)?;
        let rid = self
            .tables
            .push(TableId::TypeRef, vec![scope, name, namespace])?;
        debug!("Added TypeRef {} for {}.{}", rid, IVT_NAMESPACE, IVT_NAME);
        Ok(rid)
    }

    /// The resolution scope of `System.Object`, or else a reference to a known core library
    fn core_library_scope(&self) -> Result<u32> {
        for row in self.tables.rows(TableId::TypeRef) {
            if self.strings.get(row[TypeRefColumn::NAME])? == "Object"
                && self.strings.get(row[TypeRefColumn::NAMESPACE])? == "System"
            {
                return Ok(row[TypeRefColumn::RESOLUTION_SCOPE]);
            }
        }

        for (index, row) in self.tables.rows(TableId::AssemblyRef).iter().enumerate() {
            if CORE_LIBRARIES.contains(&self.strings.get(row[AssemblyRefColumn::NAME])?) {
                return CodedIndexType::ResolutionScope
                    .encode(&CodedIndex::new(TableId::AssemblyRef, index as u32 + 1));
            }
        }

        Err(NotSupported(
            "No core library reference to scope InternalsVisibleToAttribute".to_string(),
        ))
    }

    /// Insert a marker row, keeping `CustomAttribute` sorted by parent
    fn add_ivt_row(&mut self, constructor: u32, friend: &str) -> Result<()> {
        let parent =
            CodedIndexType::HasCustomAttribute.encode(&CodedIndex::new(TableId::Assembly, 1))?;
        let kind = CodedIndexType::CustomAttributeType
            .encode(&CodedIndex::new(TableId::MemberRef, constructor))?;
        let value = self.blob.append(&ivt_value(friend)?)?;

        let position = self
            .tables
            .rows(TableId::CustomAttribute)
            .iter()
            .position(|row| row[CustomAttributeColumn::PARENT] > parent)
            .unwrap_or(self.tables.table_row_count(TableId::CustomAttribute) as usize);

        self.tables.insert(
            TableId::CustomAttribute,
            position as u32 + 1,
            vec![parent, kind, value],
        )?;
        debug!("Added InternalsVisibleTo row for '{}'", friend);
        Ok(())
    }
}

impl Deref for CilModule {
    type Target = Module;

    fn deref(&self) -> &Module {
        &self.module
    }
}

impl DerefMut for CilModule {
    fn deref_mut(&mut self) -> &mut Module {
        &mut self.module
    }
}

/// The runs of member rows owned by each row of `owner_table`, as `(owner rid, member rids)`.
///
/// Each owner row names the first member of its run in column `list_column`; the run ends where
/// the next owner's begins, the last one at the end of the member table.
fn member_runs(
    tables: &TablesStream,
    owner_table: TableId,
    list_column: usize,
    member_count: u32,
) -> Result<Vec<(u32, Range<u32>)>> {
    let rows = tables.rows(owner_table);
    let end_of_table = member_count + 1;
    let mut runs = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let start = row[list_column].clamp(1, end_of_table);
        let end = rows
            .get(index + 1)
            .map_or(end_of_table, |next| next[list_column].clamp(1, end_of_table));

        if end < start {
            return Err(malformed_error!(
                "{:?} member lists are not ascending at row {}",
                owner_table,
                index + 1
            ));
        }

        runs.push((index as u32 + 1, start..end));
    }

    Ok(runs)
}

/// Encode the value blob of `InternalsVisibleToAttribute(friend)`: prolog, the argument as a
/// `SerString`, and zero named arguments.
fn ivt_value(friend: &str) -> Result<Vec<u8>> {
    let length =
        u32::try_from(friend.len()).map_err(|_| malformed_error!("Friend name too long"))?;

    let mut value = vec![0x01, 0x00];
    push_compressed_uint(&mut value, length)?;
    value.extend_from_slice(friend.as_bytes());
    value.extend_from_slice(&[0x00, 0x00]);
    Ok(value)
}

/// Decode the single string argument of an attribute value blob. `None` for a missing prolog,
/// a null string or invalid UTF-8.
fn read_ser_string(value: &[u8]) -> Option<String> {
    if value.get(..2)? != [0x01, 0x00] || *value.get(2)? == 0xFF {
        return None;
    }

    let mut offset = 2;
    let length = read_compressed_uint(value, &mut offset).ok()? as usize;
    let bytes = value.get(offset..offset.checked_add(length)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_value() {
        #[rustfmt::skip]
        let expected = [
            0x01, 0x00,
            0x0A, b'C', b'o', b'r', b'e', b'.', b'T', b'e', b's', b't', b's',
            0x00, 0x00,
        ];

        let value = ivt_value("Core.Tests").unwrap();
        assert_eq!(value, expected);
        assert_eq!(read_ser_string(&value).as_deref(), Some("Core.Tests"));
    }

    #[test]
    fn marker_value_rejects() {
        assert_eq!(read_ser_string(&[]), None);
        assert_eq!(read_ser_string(&[0x01, 0x00, 0xFF, 0x00, 0x00]), None);
        assert_eq!(read_ser_string(&[0x02, 0x00, 0x01, b'A']), None);
        // Length runs past the blob
        assert_eq!(read_ser_string(&[0x01, 0x00, 0x05, b'A']), None);
        assert_eq!(read_ser_string(&[0x01, 0x00, 0x00, 0x00, 0x00]).as_deref(), Some(""));
    }

    #[test]
    fn runs() {
        let mut tables = TablesStream::new();
        // <Module> owns nothing, A owns methods 1..=2, B owns method 3, C owns nothing
        for method_list in [1, 1, 3, 4] {
            tables
                .push(TableId::TypeDef, vec![0, 0, 0, 0, 1, method_list])
                .unwrap();
        }

        let runs = member_runs(&tables, TableId::TypeDef, TypeDefColumn::METHOD_LIST, 3).unwrap();
        assert_eq!(runs, vec![(1, 1..1), (2, 1..3), (3, 3..4), (4, 4..4)]);
    }

    #[test]
    fn runs_descending() {
        let mut tables = TablesStream::new();
        for method_list in [3, 1] {
            tables
                .push(TableId::TypeDef, vec![0, 0, 0, 0, 1, method_list])
                .unwrap();
        }

        assert!(member_runs(&tables, TableId::TypeDef, TypeDefColumn::METHOD_LIST, 3).is_err());
    }
}
