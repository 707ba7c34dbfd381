//! Compact-protocol decoding of footer and page-header structures.

use super::types::*;
use crate::error::Result;
use crate::thrift::{CompactReader, FieldType};

fn read_enum<T: TryFrom<i32, Error = i32>>(r: &mut CompactReader<'_>, what: &str) -> Result<T> {
    let raw = r.read_i32()?;
    T::try_from(raw).map_err(|value| r.error(format!("unknown {what} value {value}")))
}

fn required<T>(r: &CompactReader<'_>, value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| r.error(format!("missing required field {what}")))
}

fn read_key_value(r: &mut CompactReader<'_>) -> Result<KeyValue> {
    let mut key = None;
    let mut value = None;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::Binary) => key = Some(r.read_string()?),
            (2, FieldType::Binary) => value = Some(r.read_string()?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    Ok(KeyValue {
        key: required(r, key, "KeyValue.key")?,
        value,
    })
}

fn read_key_values(r: &mut CompactReader<'_>) -> Result<Vec<KeyValue>> {
    r.read_list(|r, _| read_key_value(r))
}

fn read_time_unit(r: &mut CompactReader<'_>) -> Result<TimeUnit> {
    let mut unit = None;
    r.read_struct(|r, id, ty| {
        unit = match id {
            1 => Some(TimeUnit::Millis),
            2 => Some(TimeUnit::Micros),
            3 => Some(TimeUnit::Nanos),
            _ => unit,
        };
        r.skip(ty)
    })?;
    required(r, unit, "TimeUnit")
}

/// Fields shared by TIME and TIMESTAMP annotations
fn read_temporal(r: &mut CompactReader<'_>) -> Result<(bool, TimeUnit)> {
    let mut adjusted_to_utc = false;
    let mut unit = None;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::BoolTrue | FieldType::BoolFalse) => adjusted_to_utc = r.read_bool(ty)?,
            (2, FieldType::Struct) => unit = Some(read_time_unit(r)?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    Ok((adjusted_to_utc, required(r, unit, "unit")?))
}

fn read_logical_type(r: &mut CompactReader<'_>) -> Result<Option<LogicalType>> {
    let mut logical = None;
    r.read_struct(|r, id, ty| {
        if ty != FieldType::Struct {
            return r.skip(ty);
        }
        logical = match id {
            5 => {
                let mut scale = 0;
                let mut precision = 0;
                r.read_struct(|r, id, ty| {
                    match (id, ty) {
                        (1, FieldType::I32) => scale = r.read_i32()?,
                        (2, FieldType::I32) => precision = r.read_i32()?,
                        _ => r.skip(ty)?,
                    }
                    Ok(())
                })?;
                Some(LogicalType::Decimal { scale, precision })
            }
            7 => {
                let (adjusted_to_utc, unit) = read_temporal(r)?;
                Some(LogicalType::Time {
                    adjusted_to_utc,
                    unit,
                })
            }
            8 => {
                let (adjusted_to_utc, unit) = read_temporal(r)?;
                Some(LogicalType::Timestamp {
                    adjusted_to_utc,
                    unit,
                })
            }
            10 => {
                let mut bit_width = 64;
                let mut signed = true;
                r.read_struct(|r, id, ty| {
                    match (id, ty) {
                        (1, FieldType::I8) => bit_width = r.read_i8()?,
                        (2, FieldType::BoolTrue | FieldType::BoolFalse) => {
                            signed = r.read_bool(ty)?
                        }
                        _ => r.skip(ty)?,
                    }
                    Ok(())
                })?;
                Some(LogicalType::Integer { bit_width, signed })
            }
            _ => {
                r.skip(ty)?;
                match id {
                    1 => Some(LogicalType::String),
                    2 => Some(LogicalType::Map),
                    3 => Some(LogicalType::List),
                    4 => Some(LogicalType::Enum),
                    6 => Some(LogicalType::Date),
                    11 => Some(LogicalType::Unknown),
                    12 => Some(LogicalType::Json),
                    13 => Some(LogicalType::Bson),
                    14 => Some(LogicalType::Uuid),
                    15 => Some(LogicalType::Float16),
                    _ => logical,
                }
            }
        };
        Ok(())
    })?;
    Ok(logical)
}

fn read_schema_element(r: &mut CompactReader<'_>) -> Result<SchemaElement> {
    let mut element = SchemaElement::default();
    let mut name = None;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => element.physical_type = Some(read_enum(r, "physical type")?),
            (2, FieldType::I32) => element.type_length = Some(r.read_i32()?),
            (3, FieldType::I32) => element.repetition = Some(read_enum(r, "repetition")?),
            (4, FieldType::Binary) => name = Some(r.read_string()?),
            (5, FieldType::I32) => {
                let children = r.read_i32()?;
                element.num_children = usize::try_from(children)
                    .map_err(|_| r.error(format!("negative child count {children}")))?;
            }
            (6, FieldType::I32) => {
                element.converted_type = Some(read_enum(r, "converted type")?)
            }
            (7, FieldType::I32) => element.scale = Some(r.read_i32()?),
            (8, FieldType::I32) => element.precision = Some(r.read_i32()?),
            (9, FieldType::I32) => element.field_id = Some(r.read_i32()?),
            (10, FieldType::Struct) => element.logical_type = read_logical_type(r)?,
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    element.name = required(r, name, "SchemaElement.name")?;
    Ok(element)
}

pub(crate) fn read_statistics(r: &mut CompactReader<'_>) -> Result<Statistics> {
    let mut legacy_max = None;
    let mut legacy_min = None;
    let mut max_value = None;
    let mut min_value = None;
    let mut stats = Statistics::default();
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::Binary) => legacy_max = Some(r.read_binary()?.to_vec()),
            (2, FieldType::Binary) => legacy_min = Some(r.read_binary()?.to_vec()),
            (3, FieldType::I64) => stats.null_count = Some(r.read_i64()?),
            (4, FieldType::I64) => stats.distinct_count = Some(r.read_i64()?),
            (5, FieldType::Binary) => max_value = Some(r.read_binary()?.to_vec()),
            (6, FieldType::Binary) => min_value = Some(r.read_binary()?.to_vec()),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    if min_value.is_some() || max_value.is_some() {
        stats.min = min_value;
        stats.max = max_value;
    } else {
        stats.legacy_bounds = legacy_min.is_some() || legacy_max.is_some();
        stats.min = legacy_min;
        stats.max = legacy_max;
    }
    Ok(stats)
}

fn read_column_metadata(r: &mut CompactReader<'_>) -> Result<ColumnMetaData> {
    let mut physical_type = None;
    let mut encodings = Vec::new();
    let mut path_in_schema = None;
    let mut codec = None;
    let mut num_values = 0;
    let mut total_uncompressed_size = 0;
    let mut total_compressed_size = 0;
    let mut key_value_metadata = Vec::new();
    let mut data_page_offset = None;
    let mut index_page_offset = None;
    let mut dictionary_page_offset = None;
    let mut statistics = None;

    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => physical_type = Some(read_enum(r, "physical type")?),
            (2, FieldType::List) => {
                // Encodings newer than this reader are dropped from the summary
                encodings = r
                    .read_list(|r, _| r.read_i32())?
                    .into_iter()
                    .filter_map(|raw| Encoding::try_from(raw).ok())
                    .collect();
            }
            (3, FieldType::List) => path_in_schema = Some(r.read_list(|r, _| r.read_string())?),
            (4, FieldType::I32) => codec = Some(read_enum(r, "compression codec")?),
            (5, FieldType::I64) => num_values = r.read_i64()?,
            (6, FieldType::I64) => total_uncompressed_size = r.read_i64()?,
            (7, FieldType::I64) => total_compressed_size = r.read_i64()?,
            (8, FieldType::List) => key_value_metadata = read_key_values(r)?,
            (9, FieldType::I64) => data_page_offset = Some(r.read_i64()?),
            (10, FieldType::I64) => index_page_offset = Some(r.read_i64()?),
            (11, FieldType::I64) => dictionary_page_offset = Some(r.read_i64()?),
            (12, FieldType::Struct) => statistics = Some(read_statistics(r)?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;

    Ok(ColumnMetaData {
        physical_type: required(r, physical_type, "ColumnMetaData.type")?,
        encodings,
        path_in_schema: required(r, path_in_schema, "ColumnMetaData.path_in_schema")?,
        codec: required(r, codec, "ColumnMetaData.codec")?,
        num_values,
        total_uncompressed_size,
        total_compressed_size,
        key_value_metadata,
        data_page_offset: required(r, data_page_offset, "ColumnMetaData.data_page_offset")?,
        index_page_offset,
        dictionary_page_offset,
        statistics,
    })
}

fn read_column_chunk(r: &mut CompactReader<'_>) -> Result<ColumnChunk> {
    let mut file_path = None;
    let mut file_offset = 0;
    let mut meta_data = None;
    let mut offset_index_offset = None;
    let mut offset_index_length = None;
    let mut column_index_offset = None;
    let mut column_index_length = None;

    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::Binary) => file_path = Some(r.read_string()?),
            (2, FieldType::I64) => file_offset = r.read_i64()?,
            (3, FieldType::Struct) => meta_data = Some(read_column_metadata(r)?),
            (4, FieldType::I64) => offset_index_offset = Some(r.read_i64()?),
            (5, FieldType::I32) => offset_index_length = Some(r.read_i32()?),
            (6, FieldType::I64) => column_index_offset = Some(r.read_i64()?),
            (7, FieldType::I32) => column_index_length = Some(r.read_i32()?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;

    Ok(ColumnChunk {
        file_path,
        file_offset,
        meta_data: required(r, meta_data, "ColumnChunk.meta_data")?,
        offset_index_offset,
        offset_index_length,
        column_index_offset,
        column_index_length,
    })
}

fn read_row_group(r: &mut CompactReader<'_>) -> Result<RowGroup> {
    let mut columns = Vec::new();
    let mut total_byte_size = 0;
    let mut num_rows = None;
    let mut file_offset = None;
    let mut total_compressed_size = None;
    let mut ordinal = None;

    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::List) => columns = r.read_list(|r, _| read_column_chunk(r))?,
            (2, FieldType::I64) => total_byte_size = r.read_i64()?,
            (3, FieldType::I64) => num_rows = Some(r.read_i64()?),
            (5, FieldType::I64) => file_offset = Some(r.read_i64()?),
            (6, FieldType::I64) => total_compressed_size = Some(r.read_i64()?),
            (7, FieldType::I16) => ordinal = Some(r.read_i16()?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;

    Ok(RowGroup {
        columns,
        total_byte_size,
        num_rows: required(r, num_rows, "RowGroup.num_rows")?,
        file_offset,
        total_compressed_size,
        ordinal,
    })
}

/// Decode a serialized `FileMetaData` struct.
///
/// `base` is the absolute file offset of `bytes`, reported in errors.
pub fn decode_file_metadata(bytes: &[u8], base: u64) -> Result<FileMetadata> {
    let mut r = CompactReader::with_offset(bytes, base);
    let mut version = 0;
    let mut schema = None;
    let mut num_rows = None;
    let mut row_groups = None;
    let mut key_value_metadata = Vec::new();
    let mut created_by = None;

    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => version = r.read_i32()?,
            (2, FieldType::List) => schema = Some(r.read_list(|r, _| read_schema_element(r))?),
            (3, FieldType::I64) => num_rows = Some(r.read_i64()?),
            (4, FieldType::List) => row_groups = Some(r.read_list(|r, _| read_row_group(r))?),
            (5, FieldType::List) => key_value_metadata = read_key_values(r)?,
            (6, FieldType::Binary) => created_by = Some(r.read_string()?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;

    let schema = required(&r, schema, "FileMetaData.schema")?;
    if schema.is_empty() {
        return Err(r.error("schema has no root element"));
    }
    Ok(FileMetadata {
        version,
        schema,
        num_rows: required(&r, num_rows, "FileMetaData.num_rows")?,
        row_groups: required(&r, row_groups, "FileMetaData.row_groups")?,
        key_value_metadata,
        created_by,
    })
}

fn read_data_page_header(r: &mut CompactReader<'_>) -> Result<DataPageHeader> {
    let mut num_values = None;
    let mut encoding = None;
    let mut definition_level_encoding = Encoding::Rle;
    let mut repetition_level_encoding = Encoding::Rle;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => num_values = Some(r.read_i32()?),
            (2, FieldType::I32) => encoding = Some(read_enum(r, "encoding")?),
            (3, FieldType::I32) => definition_level_encoding = read_enum(r, "encoding")?,
            (4, FieldType::I32) => repetition_level_encoding = read_enum(r, "encoding")?,
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    Ok(DataPageHeader {
        num_values: required(r, num_values, "DataPageHeader.num_values")?,
        encoding: required(r, encoding, "DataPageHeader.encoding")?,
        definition_level_encoding,
        repetition_level_encoding,
    })
}

fn read_dictionary_page_header(r: &mut CompactReader<'_>) -> Result<DictionaryPageHeader> {
    let mut num_values = None;
    let mut encoding = Encoding::Plain;
    let mut is_sorted = false;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => num_values = Some(r.read_i32()?),
            (2, FieldType::I32) => encoding = read_enum(r, "encoding")?,
            (3, FieldType::BoolTrue | FieldType::BoolFalse) => is_sorted = r.read_bool(ty)?,
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    Ok(DictionaryPageHeader {
        num_values: required(r, num_values, "DictionaryPageHeader.num_values")?,
        encoding,
        is_sorted,
    })
}

fn read_data_page_header_v2(r: &mut CompactReader<'_>) -> Result<DataPageHeaderV2> {
    let mut num_values = None;
    let mut num_nulls = 0;
    let mut num_rows = None;
    let mut encoding = None;
    let mut definition_levels_byte_length = 0;
    let mut repetition_levels_byte_length = 0;
    let mut is_compressed = true;
    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => num_values = Some(r.read_i32()?),
            (2, FieldType::I32) => num_nulls = r.read_i32()?,
            (3, FieldType::I32) => num_rows = Some(r.read_i32()?),
            (4, FieldType::I32) => encoding = Some(read_enum(r, "encoding")?),
            (5, FieldType::I32) => definition_levels_byte_length = r.read_i32()?,
            (6, FieldType::I32) => repetition_levels_byte_length = r.read_i32()?,
            (7, FieldType::BoolTrue | FieldType::BoolFalse) => is_compressed = r.read_bool(ty)?,
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;
    if definition_levels_byte_length < 0 || repetition_levels_byte_length < 0 {
        return Err(r.error("negative level section length"));
    }
    Ok(DataPageHeaderV2 {
        num_values: required(r, num_values, "DataPageHeaderV2.num_values")?,
        num_nulls,
        num_rows: required(r, num_rows, "DataPageHeaderV2.num_rows")?,
        encoding: required(r, encoding, "DataPageHeaderV2.encoding")?,
        definition_levels_byte_length,
        repetition_levels_byte_length,
        is_compressed,
    })
}

/// Decode a page header, returning it with its encoded length.
pub fn decode_page_header(bytes: &[u8], base: u64) -> Result<(PageHeader, usize)> {
    let mut r = CompactReader::with_offset(bytes, base);
    let mut page_type = None;
    let mut uncompressed_page_size = None;
    let mut compressed_page_size = None;
    let mut crc = None;
    let mut data_page = None;
    let mut dictionary_page = None;
    let mut data_page_v2 = None;

    r.read_struct(|r, id, ty| {
        match (id, ty) {
            (1, FieldType::I32) => page_type = Some(read_enum(r, "page type")?),
            (2, FieldType::I32) => uncompressed_page_size = Some(r.read_i32()?),
            (3, FieldType::I32) => compressed_page_size = Some(r.read_i32()?),
            (4, FieldType::I32) => crc = Some(r.read_i32()?),
            (5, FieldType::Struct) => data_page = Some(read_data_page_header(r)?),
            (7, FieldType::Struct) => dictionary_page = Some(read_dictionary_page_header(r)?),
            (8, FieldType::Struct) => data_page_v2 = Some(read_data_page_header_v2(r)?),
            _ => r.skip(ty)?,
        }
        Ok(())
    })?;

    let uncompressed_page_size = required(&r, uncompressed_page_size, "uncompressed_page_size")?;
    let compressed_page_size = required(&r, compressed_page_size, "compressed_page_size")?;
    if uncompressed_page_size < 0 || compressed_page_size < 0 {
        return Err(r.error("negative page size"));
    }
    let header = PageHeader {
        page_type: required(&r, page_type, "PageHeader.type")?,
        uncompressed_page_size,
        compressed_page_size,
        crc,
        data_page,
        dictionary_page,
        data_page_v2,
    };
    Ok((header, r.position()))
}
