//! Decoding of a single page: header, decompression, levels and values.

use bytes::Bytes;

use crate::codec::Decompressor;
use crate::convert::ValueConverter;
use crate::encoding::{bit_width, decode_bit_packed_msb, decode_hybrid, decode_plain, decode_prefixed_hybrid, decode_values};
use crate::error::{PageContext, ParquetError, Result};
use crate::metadata::{ColumnChunk, CompressionCodec, Encoding, PageHeader, PageType, decode_page_header};
use crate::schema::SchemaPath;
use crate::value::Value;

/// Contents of one decoded page
#[derive(Debug, Clone, PartialEq)]
pub enum Page {
    /// Converted dictionary entries
    Dictionary(Vec<Value>),
    Data(DataPage),
    /// Index pages carry nothing the reader uses
    Skipped,
}

/// A data page split into levels and non-null values
#[derive(Debug, Clone, PartialEq)]
pub struct DataPage {
    /// Level entries in the page, nulls and empty lists included
    pub num_values: usize,
    /// Present when the header declares it (V2 pages)
    pub num_rows: Option<usize>,
    /// `None` when the column has no repeated ancestor
    pub repetition_levels: Option<Vec<u16>>,
    /// `None` when the column has no optional or repeated ancestor
    pub definition_levels: Option<Vec<u16>>,
    /// Non-null values after logical conversion
    pub values: Vec<Value>,
}

/// A page along with where it sat in the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PageRead {
    pub header: PageHeader,
    pub page: Page,
    /// Header plus compressed body
    pub encoded_len: usize,
}

/// Decodes the pages of one column chunk
pub struct PageDecoder<'a> {
    column: String,
    codec: CompressionCodec,
    path: &'a SchemaPath,
    converter: ValueConverter,
    decompressor: &'a dyn Decompressor,
}

impl<'a> PageDecoder<'a> {
    pub fn new(
        chunk: &ColumnChunk,
        path: &'a SchemaPath,
        decompressor: &'a dyn Decompressor,
    ) -> Result<Self> {
        let column = chunk.path();
        let converter = ValueConverter::new(path.leaf_element()).map_err(|e| e.in_column(&column))?;
        if converter.physical_type() != chunk.meta_data.physical_type {
            return Err(ParquetError::format(format!(
                "column chunk is {:?} but the schema leaf is {:?}",
                chunk.meta_data.physical_type,
                converter.physical_type()
            ))
            .in_column(&column));
        }
        Ok(Self {
            column,
            codec: chunk.meta_data.codec,
            path,
            converter,
            decompressor,
        })
    }

    /// Dotted column path used in error reports
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn schema_path(&self) -> &SchemaPath {
        self.path
    }

    /// Decode the page at the start of `data`, which begins at absolute
    /// file offset `offset`.
    ///
    /// Dictionary-encoded data pages resolve against `dictionary`.
    pub fn read_page(&self, data: &Bytes, offset: u64, dictionary: Option<&[Value]>) -> Result<PageRead> {
        self.decode(data, offset, dictionary)
            .at_page(&self.column, offset)
    }

    fn decode(&self, data: &Bytes, offset: u64, dictionary: Option<&[Value]>) -> Result<PageRead> {
        let (header, header_len) = decode_page_header(data, offset)?;
        let body_len = header.compressed_page_size as usize;
        let body_end = header_len
            .checked_add(body_len)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                ParquetError::format_at(
                    format!(
                        "page body of {body_len} bytes overflows the {} bytes fetched",
                        data.len()
                    ),
                    offset,
                )
            })?;
        let body = data.slice(header_len..body_end);

        let page = match header.page_type {
            PageType::DictionaryPage => Page::Dictionary(self.decode_dictionary(&header, body)?),
            PageType::DataPage => Page::Data(self.decode_v1(&header, body, dictionary)?),
            PageType::DataPageV2 => Page::Data(self.decode_v2(&header, body, dictionary)?),
            PageType::IndexPage => Page::Skipped,
        };
        Ok(PageRead {
            header,
            page,
            encoded_len: body_end,
        })
    }

    fn decompress(&self, input: Bytes, output_len: usize) -> Result<Bytes> {
        if self.codec == CompressionCodec::Uncompressed {
            return Ok(input);
        }
        Ok(Bytes::from(
            self.decompressor.decompress(self.codec, &input, output_len)?,
        ))
    }

    fn decode_dictionary(&self, header: &PageHeader, body: Bytes) -> Result<Vec<Value>> {
        let dict = header
            .dictionary_page
            .as_ref()
            .ok_or_else(|| ParquetError::format("DICTIONARY_PAGE without dictionary_page_header"))?;
        if !matches!(dict.encoding, Encoding::Plain | Encoding::PlainDictionary) {
            return Err(ParquetError::UnsupportedEncoding {
                encoding: dict.encoding,
                what: "dictionary page".to_string(),
            });
        }
        let count = non_negative(dict.num_values, "dictionary entry count")?;
        let data = self.decompress(body, header.uncompressed_page_size as usize)?;
        let leaf = self.path.leaf_element();
        let (raw, _) = decode_plain(&data, self.converter.physical_type(), leaf.type_length, count)?;
        raw.into_iter().map(|v| self.converter.convert(v)).collect()
    }

    fn decode_v1(
        &self,
        header: &PageHeader,
        body: Bytes,
        dictionary: Option<&[Value]>,
    ) -> Result<DataPage> {
        let page = header
            .data_page
            .as_ref()
            .ok_or_else(|| ParquetError::format("DATA_PAGE without data_page_header"))?;
        let num_values = non_negative(page.num_values, "value count")?;
        let data = self.decompress(body, header.uncompressed_page_size as usize)?;

        let mut pos = 0usize;
        let repetition_levels = self.v1_levels(
            &data,
            &mut pos,
            page.repetition_level_encoding,
            self.path.max_repetition_level(),
            num_values,
            "repetition",
        )?;
        let definition_levels = self.v1_levels(
            &data,
            &mut pos,
            page.definition_level_encoding,
            self.path.max_definition_level(),
            num_values,
            "definition",
        )?;

        let values = self.page_values(
            page.encoding,
            &data.slice(pos..),
            num_values,
            definition_levels.as_deref(),
            dictionary,
        )?;
        Ok(DataPage {
            num_values,
            num_rows: None,
            repetition_levels,
            definition_levels,
            values,
        })
    }

    fn v1_levels(
        &self,
        data: &[u8],
        pos: &mut usize,
        encoding: Encoding,
        max_level: u16,
        count: usize,
        kind: &str,
    ) -> Result<Option<Vec<u16>>> {
        if max_level == 0 {
            return Ok(None);
        }
        let width = bit_width(u32::from(max_level));
        let section = &data[*pos..];
        let (levels, consumed) = match encoding {
            Encoding::Rle => decode_prefixed_hybrid(section, width, count)?,
            Encoding::BitPacked => decode_bit_packed_msb(section, width, count)?,
            other => {
                return Err(ParquetError::UnsupportedEncoding {
                    encoding: other,
                    what: format!("{kind} levels"),
                });
            }
        };
        *pos += consumed;
        checked_levels(levels, max_level, kind).map(Some)
    }

    fn decode_v2(
        &self,
        header: &PageHeader,
        body: Bytes,
        dictionary: Option<&[Value]>,
    ) -> Result<DataPage> {
        let page = header
            .data_page_v2
            .as_ref()
            .ok_or_else(|| ParquetError::format("DATA_PAGE_V2 without data_page_header_v2"))?;
        let num_values = non_negative(page.num_values, "value count")?;
        let num_rows = non_negative(page.num_rows, "row count")?;
        let rep_len = page.repetition_levels_byte_length as usize;
        let def_len = page.definition_levels_byte_length as usize;
        let levels_len = rep_len + def_len;
        if levels_len > body.len() {
            return Err(ParquetError::format(format!(
                "level sections of {levels_len} bytes exceed the {} byte page",
                body.len()
            )));
        }

        let max_rep = self.path.max_repetition_level();
        let max_def = self.path.max_definition_level();
        let repetition_levels = if max_rep > 0 {
            let levels = decode_hybrid(&body[..rep_len], bit_width(u32::from(max_rep)), num_values)?;
            Some(checked_levels(levels, max_rep, "repetition")?)
        } else {
            None
        };
        let definition_levels = if max_def > 0 {
            let levels = decode_hybrid(
                &body[rep_len..levels_len],
                bit_width(u32::from(max_def)),
                num_values,
            )?;
            Some(checked_levels(levels, max_def, "definition")?)
        } else {
            None
        };

        let values_data = body.slice(levels_len..);
        let values_data = if page.is_compressed {
            let output_len = (header.uncompressed_page_size as usize)
                .checked_sub(levels_len)
                .ok_or_else(|| ParquetError::format("uncompressed size smaller than level sections"))?;
            self.decompress(values_data, output_len)?
        } else {
            values_data
        };

        let values = self.page_values(
            page.encoding,
            &values_data,
            num_values,
            definition_levels.as_deref(),
            dictionary,
        )?;
        Ok(DataPage {
            num_values,
            num_rows: Some(num_rows),
            repetition_levels,
            definition_levels,
            values,
        })
    }

    fn page_values(
        &self,
        encoding: Encoding,
        data: &Bytes,
        num_values: usize,
        definition_levels: Option<&[u16]>,
        dictionary: Option<&[Value]>,
    ) -> Result<Vec<Value>> {
        let max_def = self.path.max_definition_level();
        let present = match definition_levels {
            Some(levels) => levels.iter().filter(|&&level| level == max_def).count(),
            None => num_values,
        };
        let raw = decode_values(
            encoding,
            data,
            self.converter.physical_type(),
            self.path.leaf_element().type_length,
            present,
            dictionary,
        )?;
        match encoding {
            // Dictionary entries were converted when the dictionary was read
            Encoding::PlainDictionary | Encoding::RleDictionary => Ok(raw),
            _ => raw.into_iter().map(|v| self.converter.convert(v)).collect(),
        }
    }
}

fn non_negative(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| ParquetError::format(format!("negative {what} {value}")))
}

fn checked_levels(levels: Vec<u32>, max_level: u16, kind: &str) -> Result<Vec<u16>> {
    levels
        .into_iter()
        .map(|level| match u16::try_from(level) {
            Ok(level) if level <= max_level => Ok(level),
            _ => Err(ParquetError::format(format!(
                "{kind} level {level} exceeds maximum {max_level}"
            ))),
        })
        .collect()
}
