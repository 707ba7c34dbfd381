//! Integration tests over real Parquet files
//!
//! Fixtures are written with the arrow Parquet writer into temp
//! directories, then read back through recording and HTTP sources to
//! check both the decoded values and the byte ranges that were fetched.

#[cfg(test)]
mod tests {
    use crate::{
        ErrorKind, ParquetFile, ReaderOptions, ReaderOptionsBuilder,
        io::{
            ByteRangeSource, CachedSource, HttpRangeSource, HttpSourceArgsBuilder, RangeKey,
            byte_reader::tests::MemorySource, multipart::tests::build_multipart,
        },
        metadata::{CompressionCodec, Encoding, PageType, PhysicalType, decode_page_header},
        pushdown::ValueRange,
        value::{Decimal, Value},
    };
    use arrow::array::{
        ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
        Int32Array, Int64Array, ListArray, StringArray, TimestampMicrosecondArray,
    };
    use arrow::datatypes::{DataType, Field, Int32Type, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use parquet::basic::{Compression, Encoding as WriterEncoding};
    use parquet::file::properties::{WriterProperties, WriterVersion};
    use parquet::schema::types::ColumnPath;
    use std::ops::Range;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    // ============ Test Helpers ============

    /// Write `batches` to `name` inside `dir`
    fn write_parquet(
        dir: &TempDir,
        name: &str,
        batches: &[RecordBatch],
        props: WriterProperties,
    ) -> PathBuf {
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, batches[0].schema(), Some(props)).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
        }
        writer.close().unwrap();
        path
    }

    /// ids 0..n, names with every 7th missing, values i * 1.5
    fn id_name_value_batch(n: i32) -> RecordBatch {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Float64, false),
        ]);
        let names = StringArray::from_iter(
            (0..n).map(|i| (i % 7 != 3).then(|| format!("name_{i}"))),
        );
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from_iter_values(0..n)),
                Arc::new(names),
                Arc::new(Float64Array::from_iter_values((0..n).map(|i| i as f64 * 1.5))),
            ],
        )
        .unwrap()
    }

    fn expected_name(i: i32) -> Value {
        if i % 7 == 3 {
            Value::Null
        } else {
            Value::String(format!("name_{i}"))
        }
    }

    /// Footer read as trailer plus exact footer, so tests see every range
    fn tight_footer() -> ReaderOptions {
        ReaderOptionsBuilder::default()
            .footer_fetch_size(8)
            .build()
            .unwrap()
    }

    async fn open_recorded(path: &Path, options: ReaderOptions) -> (Arc<MemorySource>, ParquetFile) {
        let source = Arc::new(MemorySource::new(std::fs::read(path).unwrap()));
        let file = ParquetFile::open(source.clone(), options).await.unwrap();
        (source, file)
    }

    fn overlaps(request: &Range<u64>, key: RangeKey) -> bool {
        request.start < key.end && key.start < request.end
    }

    fn within(request: &Range<u64>, key: RangeKey) -> bool {
        key.start <= request.start && request.end <= key.end
    }

    fn ints(values: &[Value]) -> Vec<i64> {
        values.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    // ============ Metadata and flat columns ============

    #[tokio::test]
    async fn test_metadata_and_flat_columns() {
        let dir = TempDir::new().unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(50)
            .build();
        let path = write_parquet(&dir, "flat.parquet", &[id_name_value_batch(100)], props);
        let (_, file) = open_recorded(&path, ReaderOptions::default()).await;

        let metadata = file.metadata();
        assert_eq!(metadata.num_rows, 100);
        assert_eq!(metadata.row_groups.len(), 2);
        assert!(metadata.created_by.as_deref().unwrap().starts_with("parquet-rs"));
        assert!(metadata.metadata_value("ARROW:schema").is_some());
        assert_eq!(file.column_paths().unwrap(), vec!["id", "name", "value"]);

        let id_chunk = &metadata.row_groups[1].columns[0];
        assert_eq!(id_chunk.meta_data.physical_type, PhysicalType::Int32);
        assert_eq!(id_chunk.meta_data.num_values, 50);
        let stats = id_chunk.meta_data.statistics.as_ref().unwrap();
        assert_eq!(stats.min.as_deref(), Some(&50i32.to_le_bytes()[..]));
        assert_eq!(stats.max.as_deref(), Some(&99i32.to_le_bytes()[..]));

        let ids = file.read_column_rows("id", None).await.unwrap();
        assert_eq!(ints(&ids), (0..100).collect::<Vec<_>>());

        let names = file.read_column_rows("name", None).await.unwrap();
        assert_eq!(names, (0..100).map(expected_name).collect::<Vec<_>>());

        let values = file.read_column(1, "value", None).await.unwrap();
        assert_eq!(values[0], Value::Double(75.0));
        assert_eq!(values.len(), 50);
    }

    #[tokio::test]
    async fn test_row_limit_is_a_budget() {
        let dir = TempDir::new().unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(50)
            .set_write_batch_size(10)
            .set_data_page_row_count_limit(10)
            .build();
        let path = write_parquet(&dir, "limit.parquet", &[id_name_value_batch(100)], props);
        let (source, file) = open_recorded(&path, tight_footer()).await;

        let rows = file.read_column_rows("id", Some(60)).await.unwrap();
        assert!(rows.len() >= 60 && rows.len() < 100, "read {} rows", rows.len());
        assert_eq!(ints(&rows), (0..rows.len() as i64).collect::<Vec<_>>());

        // The trailing pages of the second row group were never fetched
        let last_chunk = file.metadata().row_groups[1].columns[0].byte_range();
        let requests = source.requests.lock().clone();
        assert!(!requests.iter().any(|r| r.end == last_chunk.end && r.start < last_chunk.end));
    }

    // ============ Encodings, codecs and page versions ============

    #[tokio::test]
    async fn test_dictionary_pages() {
        let dir = TempDir::new().unwrap();
        let colors = ["red", "green", "blue"];
        let batch = RecordBatch::try_from_iter(vec![(
            "color",
            Arc::new(StringArray::from_iter_values((0..300).map(|i| colors[i % 3]))) as ArrayRef,
        )])
        .unwrap();
        let props = WriterProperties::builder().set_dictionary_enabled(true).build();
        let path = write_parquet(&dir, "dict.parquet", &[batch], props);
        let (_, file) = open_recorded(&path, ReaderOptions::default()).await;

        let chunk = &file.metadata().row_groups[0].columns[0];
        assert!(chunk.dictionary_page_offset().is_some());
        assert!(chunk.meta_data.encodings.contains(&Encoding::RleDictionary));

        let rows = file.read_column(0, "color", None).await.unwrap();
        assert_eq!(rows.len(), 300);
        assert_eq!(rows[4], Value::String("green".to_string()));
        assert_eq!(rows[299], Value::String("blue".to_string()));
    }

    #[cfg(feature = "codecs")]
    #[tokio::test]
    async fn test_compressed_files() {
        let dir = TempDir::new().unwrap();
        let codecs = [
            (Compression::SNAPPY, CompressionCodec::Snappy),
            (Compression::GZIP(Default::default()), CompressionCodec::Gzip),
            (Compression::ZSTD(Default::default()), CompressionCodec::Zstd),
            (Compression::LZ4_RAW, CompressionCodec::Lz4Raw),
        ];
        for (i, (compression, codec)) in codecs.into_iter().enumerate() {
            let props = WriterProperties::builder().set_compression(compression).build();
            let path = write_parquet(&dir, &format!("c{i}.parquet"), &[id_name_value_batch(500)], props);
            let (_, file) = open_recorded(&path, ReaderOptions::default()).await;
            assert_eq!(file.metadata().row_groups[0].columns[1].meta_data.codec, codec);

            let names = file.read_column_rows("name", None).await.unwrap();
            assert_eq!(names, (0..500).map(expected_name).collect::<Vec<_>>(), "{codec:?}");
        }
    }

    #[cfg(feature = "codecs")]
    #[tokio::test]
    async fn test_v2_pages_with_delta_and_split_encodings() {
        let dir = TempDir::new().unwrap();
        let n = 1000i64;
        let batch = RecordBatch::try_from_iter(vec![
            (
                "ts",
                Arc::new(Int64Array::from_iter_values((0..n).map(|i| 1_700_000_000_000 + i * i))) as ArrayRef,
            ),
            (
                "label",
                Arc::new(StringArray::from_iter_values((0..n).map(|i| format!("prefix/{:04}", i / 3)))) as ArrayRef,
            ),
            (
                "ratio",
                Arc::new(Float32Array::from_iter_values((0..n).map(|i| i as f32 / 8.0))) as ArrayRef,
            ),
            (
                "flag",
                Arc::new(BooleanArray::from_iter((0..n).map(|i| (i % 5 != 0).then_some(i % 2 == 0)))) as ArrayRef,
            ),
        ])
        .unwrap();
        let props = WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_2_0)
            .set_compression(Compression::SNAPPY)
            .set_dictionary_enabled(false)
            .set_column_encoding(ColumnPath::from("ts"), WriterEncoding::DELTA_BINARY_PACKED)
            .set_column_encoding(ColumnPath::from("label"), WriterEncoding::DELTA_BYTE_ARRAY)
            .set_column_encoding(ColumnPath::from("ratio"), WriterEncoding::BYTE_STREAM_SPLIT)
            .build();
        let path = write_parquet(&dir, "v2.parquet", &[batch], props);
        let (source, file) = open_recorded(&path, ReaderOptions::default()).await;

        let chunk = &file.metadata().row_groups[0].columns[0];
        let start = chunk.meta_data.data_page_offset as u64;
        let header_bytes = crate::io::read_absolute(source.as_ref(), start, start + 256)
            .await
            .unwrap();
        let (header, _) = decode_page_header(&header_bytes, start).unwrap();
        assert_eq!(header.page_type, PageType::DataPageV2);
        assert_eq!(header.data_page_v2.unwrap().encoding, Encoding::DeltaBinaryPacked);

        let ts = file.read_column(0, "ts", None).await.unwrap();
        assert_eq!(ints(&ts), (0..n).map(|i| 1_700_000_000_000 + i * i).collect::<Vec<_>>());

        let labels = file.read_column(0, "label", None).await.unwrap();
        assert_eq!(labels[10], Value::String("prefix/0003".to_string()));
        assert_eq!(labels[999], Value::String("prefix/0333".to_string()));

        let ratios = file.read_column(0, "ratio", None).await.unwrap();
        assert_eq!(ratios[12], Value::Float(1.5));

        let flags = file.read_column(0, "flag", None).await.unwrap();
        assert_eq!(flags[0], Value::Null);
        assert_eq!(flags[1], Value::Bool(false));
        assert_eq!(flags[2], Value::Bool(true));
    }

    #[tokio::test]
    async fn test_logical_types() {
        let dir = TempDir::new().unwrap();
        let batch = RecordBatch::try_from_iter(vec![
            (
                "price",
                Arc::new(
                    Decimal128Array::from(vec![12345, -5])
                        .with_precision_and_scale(10, 2)
                        .unwrap(),
                ) as ArrayRef,
            ),
            (
                "wide",
                Arc::new(
                    Decimal128Array::from(vec![-123_456_789_012_345_678_901i128, 7])
                        .with_precision_and_scale(25, 3)
                        .unwrap(),
                ) as ArrayRef,
            ),
            ("day", Arc::new(Date32Array::from(vec![19_723, 0])) as ArrayRef),
            (
                "at",
                Arc::new(
                    TimestampMicrosecondArray::from(vec![1_700_000_000_123_456, 0]).with_timezone("UTC"),
                ) as ArrayRef,
            ),
        ])
        .unwrap();
        let path = write_parquet(&dir, "logical.parquet", &[batch], WriterProperties::default());
        let (_, file) = open_recorded(&path, ReaderOptions::default()).await;

        let price = file.read_column(0, "price", None).await.unwrap();
        assert_eq!(
            price[0],
            Value::Decimal(Decimal {
                unscaled: 12345,
                scale: 2,
                precision: 10
            })
        );
        assert_eq!(price[1].to_string(), "-0.05");

        let wide = file.read_column(0, "wide", None).await.unwrap();
        assert_eq!(wide[0].to_string(), "-123456789012345678.901");

        let day = file.read_column(0, "day", None).await.unwrap();
        assert_eq!(day[0].to_string(), "2024-01-01");
        assert_eq!(day[1].to_string(), "1970-01-01");

        let at = file.read_column(0, "at", None).await.unwrap();
        let Value::Timestamp(ts) = &at[0] else {
            panic!("expected a timestamp, got {:?}", at[0]);
        };
        assert_eq!(ts.value, 1_700_000_000_123_456);
        assert!(ts.adjusted_to_utc);
        assert_eq!(at[0].to_string(), "2023-11-14 22:13:20.123456");
    }

    #[tokio::test]
    async fn test_list_column() {
        let dir = TempDir::new().unwrap();
        let tags = ListArray::from_iter_primitive::<Int32Type, _, _>(vec![
            Some(vec![Some(1), None]),
            None,
            Some(vec![]),
            Some(vec![Some(2), Some(3), Some(4)]),
        ]);
        let batch = RecordBatch::try_from_iter(vec![("tags", Arc::new(tags) as ArrayRef)]).unwrap();
        let path = write_parquet(&dir, "list.parquet", &[batch], WriterProperties::default());
        let (_, file) = open_recorded(&path, ReaderOptions::default()).await;

        let paths = file.column_paths().unwrap();
        let leaf = paths.iter().find(|p| p.starts_with("tags.")).unwrap();
        let schema_path = file.schema_path(leaf).unwrap();
        assert_eq!(schema_path.max_definition_level(), 3);
        assert_eq!(schema_path.max_repetition_level(), 1);

        let rows = file.read_column(0, leaf, None).await.unwrap();
        assert_eq!(
            rows,
            vec![
                Value::List(vec![Value::Int32(1), Value::Null]),
                Value::Null,
                Value::List(vec![]),
                Value::List(vec![Value::Int32(2), Value::Int32(3), Value::Int32(4)]),
            ]
        );
    }

    // ============ Pushdown ============

    #[tokio::test]
    async fn test_pushdown_never_fetches_pruned_pages() {
        let dir = TempDir::new().unwrap();
        let props = WriterProperties::builder()
            .set_write_batch_size(100)
            .set_data_page_row_count_limit(100)
            .build();
        let path = write_parquet(&dir, "paged.parquet", &[id_name_value_batch(1000)], props);
        let (source, file) = open_recorded(&path, tight_footer()).await;

        let indexes = file.read_page_indexes(0, &["id"]).await.unwrap();
        let offsets = indexes[0].offset_index.clone().unwrap();
        assert!(offsets.page_count() > 3);
        source.requests.lock().clear();

        let predicate = ValueRange::between(Value::Int32(250), Value::Int32(349));
        let read = file
            .read_with_pushdown(0, "id", &predicate, &["id", "name"])
            .await
            .unwrap();

        let ids = ints(read.column("id").unwrap());
        assert!(ids.contains(&250) && ids.contains(&349));
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
        assert!(ids.len() < 1000);
        let names = read.column("name").unwrap();
        assert_eq!(names.len(), ids.len());
        for (id, name) in ids.iter().zip(names) {
            assert_eq!(*name, expected_name(*id as i32));
        }

        // Pages outside the predicate were never requested
        let requests = source.requests.lock().clone();
        for (page, location) in offsets.page_locations.iter().enumerate() {
            let rows = offsets.page_rows(page, 1000);
            if rows.end <= 250 || rows.start > 349 {
                assert!(
                    !requests.iter().any(|r| overlaps(r, location.byte_range())),
                    "page {page} was fetched"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_row_group_pruning_fetches_only_surviving_group() {
        let dir = TempDir::new().unwrap();
        let props = WriterProperties::builder()
            .set_max_row_group_size(100)
            .build();
        let path = write_parquet(&dir, "groups.parquet", &[id_name_value_batch(200)], props);
        let (source, file) = open_recorded(&path, tight_footer()).await;
        assert_eq!(source.request_count(), 2);

        let predicate = ValueRange::at_least(Value::Int32(150));
        let reads = file
            .read_filtered("id", &predicate, &["id", "name"])
            .await
            .unwrap();
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].row_group, 1);
        let ids = ints(reads[0].column("id").unwrap());
        assert!((150..200).all(|id| ids.contains(&id)));
        assert!(ids.iter().all(|id| (100..200).contains(id)));

        let requests = source.requests.lock().clone();
        let metadata = file.metadata();
        for chunk in &metadata.row_groups[0].columns {
            let ranges = [Some(chunk.byte_range()), chunk.column_index_range(), chunk.offset_index_range()];
            for key in ranges.into_iter().flatten() {
                assert!(!requests.iter().any(|r| overlaps(r, key)));
            }
        }

        // footer (trailer + body), then the four index ranges, then data
        let group = &metadata.row_groups[1];
        let index_ranges: Vec<Range<u64>> = group.columns[..2]
            .iter()
            .flat_map(|c| [c.column_index_range(), c.offset_index_range()])
            .flatten()
            .map(|k| k.start..k.end)
            .collect();
        assert_eq!(index_ranges.len(), 4);
        assert_eq!(&requests[2..6], index_ranges.as_slice());
        assert!(requests.len() > 6);
        for request in &requests[6..] {
            assert!(group.columns[..2].iter().any(|c| within(request, c.byte_range())));
        }
    }

    // ============ Sources ============

    struct RangeServer {
        data: Vec<u8>,
        requests: AtomicUsize,
    }

    async fn serve_ranges(
        axum::extract::State(server): axum::extract::State<Arc<RangeServer>>,
        headers: axum::http::HeaderMap,
    ) -> axum::http::Response<axum::body::Body> {
        use axum::body::Body;
        use axum::http::{Response, StatusCode, header};

        server.requests.fetch_add(1, Ordering::SeqCst);
        let data = &server.data;
        let ranges: Vec<(u64, u64)> = headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.trim_start_matches("bytes=")
                    .split(',')
                    .map(|spec| {
                        let (start, end) = spec.trim().split_once('-').unwrap();
                        (start.parse().unwrap(), end.parse::<u64>().unwrap() + 1)
                    })
                    .collect()
            })
            .unwrap_or_default();

        match ranges.as_slice() {
            [] => Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(data.clone()))
                .unwrap(),
            [(start, end)] => Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end - 1, data.len()),
                )
                .body(Body::from(data[*start as usize..*end as usize].to_vec()))
                .unwrap(),
            _ => Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, "multipart/byteranges; boundary=pq_parts")
                .body(Body::from(build_multipart(data, &ranges, "pq_parts")))
                .unwrap(),
        }
    }

    #[tokio::test]
    async fn test_pushdown_over_http_with_cache() {
        let dir = TempDir::new().unwrap();
        let props = WriterProperties::builder()
            .set_write_batch_size(100)
            .set_data_page_row_count_limit(100)
            .build();
        let path = write_parquet(&dir, "remote.parquet", &[id_name_value_batch(1000)], props);
        let data = std::fs::read(&path).unwrap();
        let total_length = data.len() as u64;

        let server = Arc::new(RangeServer {
            data,
            requests: AtomicUsize::new(0),
        });
        let app = axum::Router::new()
            .route("/remote.parquet", axum::routing::get(serve_ranges))
            .with_state(server.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let args = HttpSourceArgsBuilder::default()
            .url(format!("http://{addr}/remote.parquet"))
            .total_length(total_length)
            .max_coalesce_gap(0)
            .build()
            .unwrap();
        let http = HttpRangeSource::open(args).await.unwrap();
        let cached = Arc::new(CachedSource::new(Arc::new(http)));
        let file = ParquetFile::open(cached.clone(), ReaderOptions::default())
            .await
            .unwrap();
        assert_eq!(server.requests.load(Ordering::SeqCst), 1);

        let predicate = ValueRange::equal_to(Value::Int32(512));
        let read = file
            .read_with_pushdown(0, "id", &predicate, &["id", "value"])
            .await
            .unwrap();
        assert!(ints(read.column("id").unwrap()).contains(&512));
        assert_eq!(read.column("value").unwrap().len(), read.num_rows());
        // one batched request for the indexes, one for the pages
        assert_eq!(server.requests.load(Ordering::SeqCst), 3);

        let again = file
            .read_with_pushdown(0, "id", &predicate, &["id", "value"])
            .await
            .unwrap();
        assert_eq!(again, read);
        assert_eq!(server.requests.load(Ordering::SeqCst), 3);
        assert!(!cached.is_empty());
    }

    #[tokio::test]
    async fn test_open_local_uri() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(&dir, "local.parquet", &[id_name_value_batch(20)], WriterProperties::default());

        let file = ParquetFile::open_uri(path.to_str().unwrap(), ReaderOptions::default())
            .await
            .unwrap();
        assert_eq!(file.source().total_length(), std::fs::metadata(&path).unwrap().len());
        let values = file.read_column(0, "value", Some(5)).await.unwrap();
        assert_eq!(values[4], Value::Double(6.0));
    }

    // ============ Failures ============

    #[tokio::test]
    async fn test_not_a_parquet_file() {
        let source = Arc::new(MemorySource::new(b"id,name\n1,a\n2,b\n".to_vec()));
        let err = ParquetFile::open(source, ReaderOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[tokio::test]
    async fn test_unknown_column() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(&dir, "cols.parquet", &[id_name_value_batch(5)], WriterProperties::default());
        let (source, file) = open_recorded(&path, ReaderOptions::default()).await;
        let before = source.request_count();

        let err = file.read_column(0, "missing", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        let err = file.read_column(3, "id", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(source.request_count(), before);
    }

    #[tokio::test]
    async fn test_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = write_parquet(&dir, "trunc.parquet", &[id_name_value_batch(50)], WriterProperties::default());
        let data = std::fs::read(&path).unwrap();
        // Leading magic and trailer survive, the footer they describe does not
        let mut truncated = data[..4].to_vec();
        truncated.extend_from_slice(&data[data.len() - 8..]);
        let data = truncated;

        let source = Arc::new(MemorySource::new(data));
        let err = ParquetFile::open(source, ReaderOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
