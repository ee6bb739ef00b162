//! The compressed metadata tables stream (`#~`).
//!
//! [`TablesStream`] decodes every table into rows of `u32` cells, lets callers edit cells and
//! add rows, and encodes the result again with index widths recomputed from the final row
//! counts.
//!
//! # Reference
//! - [ECMA-335 II.24.2.6](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::{align_up, push_le, push_le_dyn, read_le, read_le_at, read_le_at_dyn},
    metadata::tables::{ColumnKind, TableId, TableInfo},
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// One decoded row; cells follow the column order of [`TableId::columns`].
pub type Row = Vec<u32>;

/// `HeapSizes` bit marking 4-byte `#Strings` indexes
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// `HeapSizes` bit marking 4-byte `#GUID` indexes
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// `HeapSizes` bit marking 4-byte `#Blob` indexes
pub const HEAP_LARGE_BLOB: u8 = 0x04;
/// `HeapSizes` bit announcing an extra 4-byte field after the row counts
const HEAP_EXTRA_DATA: u8 = 0x40;

/// Tables that ECMA-335 requires to be sorted by their primary key
const DEFAULT_SORTED: u64 = 0x0000_1600_3301_FA00;

/// Offset of the first row count
const ROW_COUNTS_OFFSET: usize = 24;

/// A decoded `#~` stream.
#[derive(Clone, Debug)]
pub struct TablesStream {
    /// Reserved, always 0
    pub reserved: u32,
    /// Major version of the table schema, 2
    pub major_version: u8,
    /// Minor version of the table schema, 0
    pub minor_version: u8,
    /// Heap size flags, see [`HEAP_LARGE_STRINGS`] and friends
    pub heap_sizes: u8,
    /// Reserved, always 1
    pub reserved_2: u8,
    /// Bit mask of present tables
    pub valid: u64,
    /// Bit mask of sorted tables
    pub sorted: u64,
    tables: Vec<Vec<Row>>,
}

impl Default for TablesStream {
    fn default() -> Self {
        TablesStream {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            reserved_2: 1,
            valid: 0,
            sorted: DEFAULT_SORTED,
            tables: vec![Vec::new(); TableId::COUNT],
        }
    }
}

impl TablesStream {
    /// Create an empty tables stream
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a `#~` stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated data and
    /// [`crate::Error::NotSupported`] for tables beyond `GenericParamConstraint` (portable PDB
    /// tables) or the extra-data header extension.
    pub fn from(data: &[u8]) -> Result<TablesStream> {
        if data.len() < ROW_COUNTS_OFFSET {
            return Err(OutOfBounds);
        }

        let valid = read_le::<u64>(&data[8..])?;
        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        if valid >> TableId::COUNT != 0 {
            return Err(NotSupported(format!(
                "Tables stream references unknown tables - 0x{:016X}",
                valid
            )));
        }

        let heap_sizes = read_le::<u8>(&data[6..])?;
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            return Err(NotSupported(
                "Tables stream with extra header data".to_string(),
            ));
        }

        let mut offset = ROW_COUNTS_OFFSET;
        let mut row_counts = vec![0_u32; TableId::COUNT];
        for table_id in TableId::iter() {
            if valid & table_id.mask() != 0 {
                row_counts[table_id as usize] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        let info = TableInfo::new(&row_counts, heap_sizes);
        let mut tables = vec![Vec::new(); TableId::COUNT];
        for table_id in TableId::iter() {
            let count = row_counts[table_id as usize] as usize;
            let columns = table_id.columns();

            let Some(table_len) = table_id.row_size(&info).checked_mul(count) else {
                return Err(OutOfBounds);
            };
            if offset + table_len > data.len() {
                return Err(OutOfBounds);
            }

            let rows = &mut tables[table_id as usize];
            rows.reserve(count);
            for _ in 0..count {
                let mut row = Vec::with_capacity(columns.len());
                for column in columns {
                    row.push(Self::read_cell(data, &mut offset, *column, &info)?);
                }
                rows.push(row);
            }
        }

        Ok(TablesStream {
            reserved: read_le::<u32>(data)?,
            major_version: read_le::<u8>(&data[4..])?,
            minor_version: read_le::<u8>(&data[5..])?,
            heap_sizes,
            reserved_2: read_le::<u8>(&data[7..])?,
            valid,
            sorted: read_le::<u64>(&data[16..])?,
            tables,
        })
    }

    fn read_cell(
        data: &[u8],
        offset: &mut usize,
        column: ColumnKind,
        info: &TableInfo,
    ) -> Result<u32> {
        match column {
            ColumnKind::U16 => Ok(u32::from(read_le_at::<u16>(data, offset)?)),
            ColumnKind::U32 => read_le_at::<u32>(data, offset),
            other => read_le_at_dyn(data, offset, other.is_large(info)),
        }
    }

    /// Encode the stream with index widths derived from the current row counts.
    ///
    /// Tables that gained rows become valid; tables that were marked valid but are empty
    /// keep their (zero) row count. The result is padded to a multiple of 4.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a row does not match its table layout.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let row_counts = self.row_counts()?;
        let valid = self.valid_mask();
        let info = self.info()?;

        let mut out = Vec::new();
        push_le::<u32>(&mut out, self.reserved);
        push_le::<u8>(&mut out, self.major_version);
        push_le::<u8>(&mut out, self.minor_version);
        push_le::<u8>(&mut out, self.heap_sizes);
        push_le::<u8>(&mut out, self.reserved_2);
        push_le::<u64>(&mut out, valid);
        push_le::<u64>(&mut out, self.sorted);

        for table_id in TableId::iter() {
            if valid & table_id.mask() != 0 {
                push_le::<u32>(&mut out, row_counts[table_id as usize]);
            }
        }

        for table_id in TableId::iter() {
            let columns = table_id.columns();
            for (rid, row) in self.tables[table_id as usize].iter().enumerate() {
                if row.len() != columns.len() {
                    return Err(malformed_error!(
                        "{:?} row {} has {} cells, expected {}",
                        table_id,
                        rid + 1,
                        row.len(),
                        columns.len()
                    ));
                }

                for (cell, column) in row.iter().zip(columns) {
                    match column {
                        ColumnKind::U16 => push_le::<u16>(&mut out, *cell as u16),
                        ColumnKind::U32 => push_le::<u32>(&mut out, *cell),
                        other => push_le_dyn(&mut out, *cell, other.is_large(&info)),
                    }
                }
            }
        }

        out.resize(align_up(out.len(), 4), 0);
        Ok(out)
    }

    /// Index widths for the current row counts and heap flags.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a table holds more than `u32::MAX` rows.
    pub fn info(&self) -> Result<TableInfo> {
        Ok(TableInfo::new(&self.row_counts()?, self.heap_sizes))
    }

    fn row_counts(&self) -> Result<Vec<u32>> {
        self.tables
            .iter()
            .map(|rows| u32::try_from(rows.len()).map_err(|_| malformed_error!("Table too large")))
            .collect()
    }

    fn valid_mask(&self) -> u64 {
        TableId::iter()
            .filter(|table_id| !self.tables[*table_id as usize].is_empty())
            .fold(self.valid, |mask, table_id| mask | table_id.mask())
    }

    /// Set the heap size flags required for heaps of the given byte sizes. Flags already set
    /// are kept.
    pub fn require_heap_sizes(&mut self, strings_len: usize, guid_len: usize, blob_len: usize) {
        if strings_len > usize::from(u16::MAX) {
            self.heap_sizes |= HEAP_LARGE_STRINGS;
        }
        // #GUID indexes count 16-byte entries
        if guid_len / 16 > usize::from(u16::MAX) {
            self.heap_sizes |= HEAP_LARGE_GUID;
        }
        if blob_len > usize::from(u16::MAX) {
            self.heap_sizes |= HEAP_LARGE_BLOB;
        }
    }

    /// Number of tables present in the stream
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid_mask().count_ones()
    }

    /// True if `table_id` is marked present or holds rows
    #[must_use]
    pub fn has_table(&self, table_id: TableId) -> bool {
        self.valid_mask() & table_id.mask() != 0
    }

    /// Number of rows in a table
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn table_row_count(&self, table_id: TableId) -> u32 {
        self.tables[table_id as usize].len() as u32
    }

    /// All rows of a table
    #[must_use]
    pub fn rows(&self, table_id: TableId) -> &[Row] {
        &self.tables[table_id as usize]
    }

    /// The row with 1-based index `rid`
    #[must_use]
    pub fn row(&self, table_id: TableId, rid: u32) -> Option<&Row> {
        let index = (rid as usize).checked_sub(1)?;
        self.tables[table_id as usize].get(index)
    }

    /// Mutable access to the row with 1-based index `rid`
    pub fn row_mut(&mut self, table_id: TableId, rid: u32) -> Option<&mut Row> {
        let index = (rid as usize).checked_sub(1)?;
        self.tables[table_id as usize].get_mut(index)
    }

    /// Read one cell, failing with [`crate::Error::OutOfBounds`] for a missing row or column
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the row or column does not exist.
    pub fn cell(&self, table_id: TableId, rid: u32, column: usize) -> Result<u32> {
        self.row(table_id, rid)
            .and_then(|row| row.get(column))
            .copied()
            .ok_or(OutOfBounds)
    }

    /// Append a row and return its 1-based index.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the row does not match the table layout.
    pub fn push(&mut self, table_id: TableId, row: Row) -> Result<u32> {
        self.check_row(table_id, &row)?;
        let rows = &mut self.tables[table_id as usize];
        rows.push(row);
        u32::try_from(rows.len()).map_err(|_| malformed_error!("Table too large"))
    }

    /// Insert a row so that it gets the 1-based index `rid`, shifting later rows down.
    ///
    /// Only tables that no other table points into may be reordered this way.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a row that does not match the table layout and
    /// [`crate::Error::OutOfBounds`] for an index past the end of the table.
    pub fn insert(&mut self, table_id: TableId, rid: u32, row: Row) -> Result<()> {
        self.check_row(table_id, &row)?;
        let rows = &mut self.tables[table_id as usize];
        let Some(index) = (rid as usize).checked_sub(1) else {
            return Err(OutOfBounds);
        };
        if index > rows.len() {
            return Err(OutOfBounds);
        }

        rows.insert(index, row);
        Ok(())
    }

    fn check_row(&self, table_id: TableId, row: &Row) -> Result<()> {
        let expected = table_id.columns().len();
        if row.len() != expected {
            return Err(malformed_error!(
                "{:?} row has {} cells, expected {}",
                table_id,
                row.len(),
                expected
            ));
        }
        Ok(())
    }
}
