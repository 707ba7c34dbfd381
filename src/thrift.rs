//! Decoder for the Thrift compact protocol used by Parquet metadata.
//!
//! Structs are read field by field: the caller supplies a closure that is
//! handed each field id and wire type and either decodes the value or skips
//! it. Unknown fields are always skipped, so newer writers stay readable.

use crate::config::MAX_STRUCT_DEPTH;
use crate::error::{ParquetError, Result};

/// Wire type of a compact-protocol field or list element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    BoolTrue,
    BoolFalse,
    I8,
    I16,
    I32,
    I64,
    Double,
    Binary,
    List,
    Set,
    Map,
    Struct,
}

impl FieldType {
    fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            1 => FieldType::BoolTrue,
            2 => FieldType::BoolFalse,
            3 => FieldType::I8,
            4 => FieldType::I16,
            5 => FieldType::I32,
            6 => FieldType::I64,
            7 => FieldType::Double,
            8 => FieldType::Binary,
            9 => FieldType::List,
            10 => FieldType::Set,
            11 => FieldType::Map,
            12 => FieldType::Struct,
            _ => return None,
        })
    }
}

/// Cursor over compact-protocol bytes
pub struct CompactReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]`, used in error messages
    base: u64,
    depth: usize,
}

impl<'a> CompactReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_offset(data, 0)
    }

    pub fn with_offset(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            pos: 0,
            base,
            depth: 0,
        }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn error(&self, message: impl Into<String>) -> ParquetError {
        ParquetError::format_at(message, self.base + self.pos as u64)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                self.error(format!(
                    "truncated metadata: need {len} bytes, {} left",
                    self.data.len() - self.pos
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(self.error("varint overflows 64 bits"));
            }
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let n = self.read_varint()?;
        Ok(((n >> 1) as i64) ^ -((n & 1) as i64))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let value = self.read_i64()?;
        i32::try_from(value).map_err(|_| self.error(format!("value {value} overflows i32")))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let value = self.read_i64()?;
        i16::try_from(value).map_err(|_| self.error(format!("value {value} overflows i16")))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_byte()? as i8)
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    pub fn read_binary(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| self.error("binary length overflows"))?;
        self.take(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_binary()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.error("string is not valid UTF-8"))
    }

    /// Decode a bool field; compact structs store the value in the type nibble.
    pub fn read_bool(&mut self, field_type: FieldType) -> Result<bool> {
        match field_type {
            FieldType::BoolTrue => Ok(true),
            FieldType::BoolFalse => Ok(false),
            other => Err(self.error(format!("expected bool field, found {other:?}"))),
        }
    }

    /// Read a list header: (element count, element type).
    pub fn read_list_header(&mut self) -> Result<(usize, FieldType)> {
        let header = self.read_byte()?;
        let element_type = FieldType::from_nibble(header & 0x0f)
            .ok_or_else(|| self.error(format!("invalid list element type {}", header & 0x0f)))?;
        let size = match header >> 4 {
            0x0f => {
                let size = self.read_varint()?;
                usize::try_from(size).map_err(|_| self.error("list size overflows"))?
            }
            short => short as usize,
        };
        // Every element takes at least one byte
        if size > self.data.len() - self.pos {
            return Err(self.error(format!("list of {size} elements exceeds remaining bytes")));
        }
        Ok((size, element_type))
    }

    /// Read a list whose elements are decoded by `read_element`.
    pub fn read_list<T>(
        &mut self,
        mut read_element: impl FnMut(&mut Self, FieldType) -> Result<T>,
    ) -> Result<Vec<T>> {
        let (size, element_type) = self.read_list_header()?;
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            items.push(read_element(self, element_type)?);
        }
        Ok(items)
    }

    /// Bool list elements are encoded as one byte each.
    pub fn read_list_bool(&mut self) -> Result<bool> {
        Ok(self.read_byte()? == 1)
    }

    /// Walk a struct, handing each field to `on_field`.
    ///
    /// `on_field` must consume the field's value, either by decoding it or by
    /// calling [`CompactReader::skip`].
    pub fn read_struct(
        &mut self,
        mut on_field: impl FnMut(&mut Self, i16, FieldType) -> Result<()>,
    ) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_STRUCT_DEPTH {
            return Err(self.error("struct nesting too deep"));
        }
        let mut last_id = 0i16;
        loop {
            let header = self.read_byte()?;
            if header == 0 {
                break;
            }
            let field_type = FieldType::from_nibble(header & 0x0f)
                .ok_or_else(|| self.error(format!("invalid field type {}", header & 0x0f)))?;
            let delta = (header >> 4) as i16;
            let id = if delta == 0 {
                self.read_i16()?
            } else {
                last_id
                    .checked_add(delta)
                    .ok_or_else(|| self.error("field id overflow"))?
            };
            last_id = id;
            on_field(self, id, field_type)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Skip one value of the given type.
    pub fn skip(&mut self, field_type: FieldType) -> Result<()> {
        match field_type {
            FieldType::BoolTrue | FieldType::BoolFalse => {}
            FieldType::I8 => {
                self.read_byte()?;
            }
            FieldType::I16 | FieldType::I32 | FieldType::I64 => {
                self.read_varint()?;
            }
            FieldType::Double => {
                self.take(8)?;
            }
            FieldType::Binary => {
                self.read_binary()?;
            }
            FieldType::List | FieldType::Set => {
                let (size, element_type) = self.read_list_header()?;
                for _ in 0..size {
                    self.skip_element(element_type)?;
                }
            }
            FieldType::Map => {
                let size = self.read_varint()?;
                if size > 0 {
                    let types = self.read_byte()?;
                    let key_type = FieldType::from_nibble(types >> 4)
                        .ok_or_else(|| self.error("invalid map key type"))?;
                    let value_type = FieldType::from_nibble(types & 0x0f)
                        .ok_or_else(|| self.error("invalid map value type"))?;
                    for _ in 0..size {
                        self.skip_element(key_type)?;
                        self.skip_element(value_type)?;
                    }
                }
            }
            FieldType::Struct => {
                self.read_struct(|reader, _, field_type| reader.skip(field_type))?;
            }
        }
        Ok(())
    }

    /// Skip a collection element; bools take one byte there.
    fn skip_element(&mut self, element_type: FieldType) -> Result<()> {
        match element_type {
            FieldType::BoolTrue | FieldType::BoolFalse => self.read_byte().map(|_| ()),
            other => self.skip(other),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Minimal compact-protocol writer for building test inputs
    #[derive(Default)]
    pub(crate) struct CompactWriter {
        pub(crate) buf: Vec<u8>,
        last_ids: Vec<i16>,
    }

    impl CompactWriter {
        pub(crate) fn varint(&mut self, mut value: u64) -> &mut Self {
            loop {
                let byte = (value & 0x7f) as u8;
                value >>= 7;
                if value == 0 {
                    self.buf.push(byte);
                    return self;
                }
                self.buf.push(byte | 0x80);
            }
        }

        pub(crate) fn zigzag(&mut self, value: i64) -> &mut Self {
            self.varint(((value << 1) ^ (value >> 63)) as u64)
        }

        pub(crate) fn field(&mut self, id: i16, type_nibble: u8) -> &mut Self {
            let last = self.last_ids.last().copied().unwrap_or(0);
            let delta = id - last;
            if (1..=15).contains(&delta) {
                self.buf.push(((delta as u8) << 4) | type_nibble);
            } else {
                self.buf.push(type_nibble);
                self.zigzag(id as i64);
            }
            if let Some(last) = self.last_ids.last_mut() {
                *last = id;
            }
            self
        }

        pub(crate) fn i32_field(&mut self, id: i16, value: i32) -> &mut Self {
            self.field(id, 5).zigzag(value as i64)
        }

        pub(crate) fn i64_field(&mut self, id: i16, value: i64) -> &mut Self {
            self.field(id, 6).zigzag(value)
        }

        pub(crate) fn binary_field(&mut self, id: i16, value: &[u8]) -> &mut Self {
            self.field(id, 8).varint(value.len() as u64);
            self.buf.extend_from_slice(value);
            self
        }

        pub(crate) fn bool_field(&mut self, id: i16, value: bool) -> &mut Self {
            self.field(id, if value { 1 } else { 2 })
        }

        pub(crate) fn list_header(&mut self, size: usize, element_nibble: u8) -> &mut Self {
            if size < 15 {
                self.buf.push(((size as u8) << 4) | element_nibble);
            } else {
                self.buf.push(0xf0 | element_nibble);
                self.varint(size as u64);
            }
            self
        }

        pub(crate) fn begin_struct(&mut self) -> &mut Self {
            self.last_ids.push(0);
            self
        }

        pub(crate) fn struct_field(&mut self, id: i16) -> &mut Self {
            self.field(id, 12).begin_struct()
        }

        pub(crate) fn end_struct(&mut self) -> &mut Self {
            self.buf.push(0);
            self.last_ids.pop();
            self
        }
    }

    #[test]
    fn test_varint_and_zigzag() {
        let mut writer = CompactWriter::default();
        writer.zigzag(-1).zigzag(150).zigzag(i64::MAX).zigzag(i64::MIN);
        let mut reader = CompactReader::new(&writer.buf);

        assert_eq!(reader.read_i64().unwrap(), -1);
        assert_eq!(reader.read_i64().unwrap(), 150);
        assert_eq!(reader.read_i64().unwrap(), i64::MAX);
        assert_eq!(reader.read_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn test_struct_fields_and_skipping() {
        let mut writer = CompactWriter::default();
        writer
            .begin_struct()
            .i32_field(1, 7)
            .binary_field(2, b"skip me")
            .struct_field(3)
            .i64_field(1, 9)
            .end_struct()
            .bool_field(4, true)
            .i64_field(40, 1 << 60)
            .end_struct();

        let mut reader = CompactReader::new(&writer.buf);
        let mut seen = Vec::new();
        reader
            .read_struct(|r, id, ty| {
                match (id, ty) {
                    (1, FieldType::I32) => seen.push(r.read_i32()? as i64),
                    (4, ty) => seen.push(r.read_bool(ty)? as i64),
                    (40, FieldType::I64) => seen.push(r.read_i64()?),
                    (_, ty) => r.skip(ty)?,
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![7, 1, 1 << 60]);
        assert_eq!(reader.position(), writer.buf.len());
    }

    #[test]
    fn test_long_list_header() {
        let mut writer = CompactWriter::default();
        writer.list_header(20, 5);
        for i in 0..20 {
            writer.zigzag(i);
        }
        let mut reader = CompactReader::new(&writer.buf);
        let values = reader.read_list(|r, _| r.read_i32()).unwrap();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_truncated_input_is_format_error() {
        let mut writer = CompactWriter::default();
        writer.begin_struct().binary_field(1, b"abcdef");
        let truncated = &writer.buf[..writer.buf.len() - 2];

        let err = CompactReader::with_offset(truncated, 1000)
            .read_struct(|r, _, ty| r.skip(ty))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(err.to_string().contains("at offset 100"));
    }

    #[test]
    fn test_depth_limit() {
        let mut writer = CompactWriter::default();
        writer.begin_struct();
        for _ in 0..(MAX_STRUCT_DEPTH + 1) {
            writer.struct_field(1);
        }
        let err = CompactReader::new(&writer.buf)
            .read_struct(|r, _, ty| r.skip(ty))
            .unwrap_err();
        assert!(err.to_string().contains("too deep"));
    }
}
