//! Decoded footer and page-header structures.

use crate::io::RangeKey;

macro_rules! thrift_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant = $value),+
        }

        impl TryFrom<i32> for $name {
            type Error = i32;

            fn try_from(value: i32) -> std::result::Result<Self, i32> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(other),
                }
            }
        }
    };
}

thrift_enum!(
    /// Physical storage type of a leaf column
    PhysicalType {
        Boolean = 0,
        Int32 = 1,
        Int64 = 2,
        Int96 = 3,
        Float = 4,
        Double = 5,
        ByteArray = 6,
        FixedLenByteArray = 7,
    }
);

thrift_enum!(Repetition {
    Required = 0,
    Optional = 1,
    Repeated = 2,
});

thrift_enum!(
    /// Legacy type annotation, superseded by [`LogicalType`]
    ConvertedType {
        Utf8 = 0,
        Map = 1,
        MapKeyValue = 2,
        List = 3,
        Enum = 4,
        Decimal = 5,
        Date = 6,
        TimeMillis = 7,
        TimeMicros = 8,
        TimestampMillis = 9,
        TimestampMicros = 10,
        Uint8 = 11,
        Uint16 = 12,
        Uint32 = 13,
        Uint64 = 14,
        Int8 = 15,
        Int16 = 16,
        Int32 = 17,
        Int64 = 18,
        Json = 19,
        Bson = 20,
        Interval = 21,
    }
);

thrift_enum!(Encoding {
    Plain = 0,
    PlainDictionary = 2,
    Rle = 3,
    BitPacked = 4,
    DeltaBinaryPacked = 5,
    DeltaLengthByteArray = 6,
    DeltaByteArray = 7,
    RleDictionary = 8,
    ByteStreamSplit = 9,
});

thrift_enum!(CompressionCodec {
    Uncompressed = 0,
    Snappy = 1,
    Gzip = 2,
    Lzo = 3,
    Brotli = 4,
    Lz4 = 5,
    Zstd = 6,
    Lz4Raw = 7,
});

thrift_enum!(PageType {
    DataPage = 0,
    IndexPage = 1,
    DictionaryPage = 2,
    DataPageV2 = 3,
});

thrift_enum!(BoundaryOrder {
    Unordered = 0,
    Ascending = 1,
    Descending = 2,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    /// Ticks of this unit per second
    pub fn per_second(&self) -> i64 {
        match self {
            TimeUnit::Millis => 1_000,
            TimeUnit::Micros => 1_000_000,
            TimeUnit::Nanos => 1_000_000_000,
        }
    }
}

/// Logical type annotation of a schema node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalType {
    String,
    Map,
    List,
    Enum,
    Decimal { scale: i32, precision: i32 },
    Date,
    Time { adjusted_to_utc: bool, unit: TimeUnit },
    Timestamp { adjusted_to_utc: bool, unit: TimeUnit },
    Integer { bit_width: i8, signed: bool },
    Unknown,
    Json,
    Bson,
    Uuid,
    Float16,
}

/// One node of the flattened schema tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaElement {
    pub name: String,
    /// Set for leaves only
    pub physical_type: Option<PhysicalType>,
    pub type_length: Option<i32>,
    /// Absent on the root
    pub repetition: Option<Repetition>,
    pub num_children: usize,
    pub converted_type: Option<ConvertedType>,
    pub scale: Option<i32>,
    pub precision: Option<i32>,
    pub field_id: Option<i32>,
    pub logical_type: Option<LogicalType>,
}

impl SchemaElement {
    pub fn is_leaf(&self) -> bool {
        self.num_children == 0 && self.physical_type.is_some()
    }
}

/// Column-chunk statistics with raw, type-specific bounds
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statistics {
    pub min: Option<Vec<u8>>,
    pub max: Option<Vec<u8>>,
    pub null_count: Option<i64>,
    pub distinct_count: Option<i64>,
    /// Bounds came from the deprecated `min`/`max` fields, whose ordering is
    /// only reliable for signed numeric columns
    pub legacy_bounds: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetaData {
    pub physical_type: PhysicalType,
    pub encodings: Vec<Encoding>,
    pub path_in_schema: Vec<String>,
    pub codec: CompressionCodec,
    pub num_values: i64,
    pub total_uncompressed_size: i64,
    pub total_compressed_size: i64,
    pub key_value_metadata: Vec<KeyValue>,
    pub data_page_offset: i64,
    pub index_page_offset: Option<i64>,
    pub dictionary_page_offset: Option<i64>,
    pub statistics: Option<Statistics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChunk {
    pub file_path: Option<String>,
    pub file_offset: i64,
    pub meta_data: ColumnMetaData,
    pub offset_index_offset: Option<i64>,
    pub offset_index_length: Option<i32>,
    pub column_index_offset: Option<i64>,
    pub column_index_length: Option<i32>,
}

impl ColumnChunk {
    /// Dotted leaf path, e.g. `tags.list.element`
    pub fn path(&self) -> String {
        self.meta_data.path_in_schema.join(".")
    }

    /// Bytes holding the chunk's pages, dictionary page included
    pub fn byte_range(&self) -> RangeKey {
        let meta = &self.meta_data;
        let start = match meta.dictionary_page_offset {
            // Some writers record 0 when there is no dictionary
            Some(offset) if offset > 0 && offset < meta.data_page_offset => offset,
            _ => meta.data_page_offset,
        };
        let start = start.max(0) as u64;
        RangeKey {
            start,
            end: start + meta.total_compressed_size.max(0) as u64,
        }
    }

    /// Location of the dictionary page, if the chunk has one
    pub fn dictionary_page_offset(&self) -> Option<u64> {
        let meta = &self.meta_data;
        match meta.dictionary_page_offset {
            Some(offset) if offset > 0 && offset < meta.data_page_offset => Some(offset as u64),
            _ => None,
        }
    }

    pub fn column_index_range(&self) -> Option<RangeKey> {
        index_range(self.column_index_offset, self.column_index_length)
    }

    pub fn offset_index_range(&self) -> Option<RangeKey> {
        index_range(self.offset_index_offset, self.offset_index_length)
    }
}

fn index_range(offset: Option<i64>, length: Option<i32>) -> Option<RangeKey> {
    match (offset, length) {
        (Some(offset), Some(length)) if offset >= 0 && length > 0 => Some(RangeKey {
            start: offset as u64,
            end: offset as u64 + length as u64,
        }),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowGroup {
    pub columns: Vec<ColumnChunk>,
    pub total_byte_size: i64,
    pub num_rows: i64,
    pub file_offset: Option<i64>,
    pub total_compressed_size: Option<i64>,
    pub ordinal: Option<i16>,
}

impl RowGroup {
    /// Find a column chunk by dotted path
    pub fn column(&self, path: &str) -> Option<&ColumnChunk> {
        self.columns.iter().find(|chunk| chunk.path() == path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileMetadata {
    pub version: i32,
    /// Pre-order flattening of the schema tree, root first
    pub schema: Vec<SchemaElement>,
    pub num_rows: i64,
    pub row_groups: Vec<RowGroup>,
    pub key_value_metadata: Vec<KeyValue>,
    pub created_by: Option<String>,
}

impl FileMetadata {
    /// Value of a key/value metadata entry
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.key_value_metadata
            .iter()
            .find(|kv| kv.key == key)
            .and_then(|kv| kv.value.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub definition_level_encoding: Encoding,
    pub repetition_level_encoding: Encoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub is_sorted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPageHeaderV2 {
    pub num_values: i32,
    pub num_nulls: i32,
    pub num_rows: i32,
    pub encoding: Encoding,
    pub definition_levels_byte_length: i32,
    pub repetition_levels_byte_length: i32,
    pub is_compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub uncompressed_page_size: i32,
    pub compressed_page_size: i32,
    pub crc: Option<i32>,
    pub data_page: Option<DataPageHeader>,
    pub dictionary_page: Option<DictionaryPageHeader>,
    pub data_page_v2: Option<DataPageHeaderV2>,
}
