use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use super::byte_reader::ByteRangeSource;
use super::range::{ByteRange, RangeKey};
use crate::error::{ParquetError, Result};

type SharedRead = Shared<BoxFuture<'static, std::result::Result<Bytes, Arc<ParquetError>>>>;

/// Memoizing decorator over another ByteRangeSource
///
/// Entries are keyed by the resolved `[start, end)` range, so a suffix read
/// and the equivalent absolute read share one entry. An entry is inserted
/// before the underlying read starts: concurrent callers for the same range
/// await the same read and observe the same outcome. Failed entries are
/// dropped once they complete so a later call can retry.
///
/// The cache lives as long as this value; construct one per opened file.
pub struct CachedSource {
    inner: Arc<dyn ByteRangeSource>,
    entries: Mutex<HashMap<RangeKey, SharedRead>>,
}

impl CachedSource {
    pub fn new(inner: Arc<dyn ByteRangeSource>) -> Self {
        Self {
            inner,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of ranges currently cached or in flight
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Look up every key, starting one batched read for all misses.
    fn reads_for(&self, keys: &[RangeKey]) -> Vec<SharedRead> {
        let mut entries = self.entries.lock();
        let mut misses: Vec<RangeKey> = Vec::new();
        for key in keys {
            if !entries.contains_key(key) && !misses.contains(key) {
                misses.push(*key);
            }
        }
        trace!(
            requested = keys.len(),
            misses = misses.len(),
            "range cache lookup"
        );

        if !misses.is_empty() {
            let inner = self.inner.clone();
            let batch_ranges = misses
                .iter()
                .map(|key| ByteRange::bounded(key.start, key.end).map(Some))
                .collect::<Result<Vec<_>>>();
            let batch = async move {
                let ranges = batch_ranges.map_err(Arc::new)?;
                inner.read_ranges(&ranges).await.map_err(Arc::new)
            }
            .boxed()
            .shared();

            for (position, key) in misses.into_iter().enumerate() {
                let read = batch
                    .clone()
                    .map(move |result| {
                        result.map(|buffers| buffers.get(position).cloned().unwrap_or_default())
                    })
                    .boxed()
                    .shared();
                entries.insert(key, read);
            }
        }

        keys.iter()
            .filter_map(|key| entries.get(key).cloned())
            .collect()
    }

    fn evict_failed(&self, key: RangeKey, read: &SharedRead) {
        let mut entries = self.entries.lock();
        if entries.get(&key).is_some_and(|current| current.ptr_eq(read)) {
            entries.remove(&key);
        }
    }
}

#[async_trait]
impl ByteRangeSource for CachedSource {
    fn total_length(&self) -> u64 {
        self.inner.total_length()
    }

    async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let mut buffers = self.read_ranges(&[Some(range)]).await?;
        Ok(buffers.pop().unwrap_or_default())
    }

    async fn read_ranges(&self, ranges: &[Option<ByteRange>]) -> Result<Vec<Bytes>> {
        let total_length = self.total_length();
        let keys = ranges
            .iter()
            .map(|range| range.map(|r| r.key(total_length)).transpose())
            .collect::<Result<Vec<_>>>()?;

        let wanted: Vec<(usize, RangeKey)> = keys
            .iter()
            .enumerate()
            .filter_map(|(index, key)| key.filter(|k| !k.is_empty()).map(|k| (index, k)))
            .collect();
        let wanted_keys: Vec<RangeKey> = wanted.iter().map(|(_, key)| *key).collect();

        let reads = self.reads_for(&wanted_keys);
        let results = join_all(reads.iter().cloned()).await;

        let mut buffers = vec![Bytes::new(); ranges.len()];
        let mut first_error = None;
        for (((index, key), read), result) in wanted.into_iter().zip(&reads).zip(results) {
            match result {
                Ok(bytes) => buffers[index] = bytes,
                Err(err) => {
                    self.evict_failed(key, read);
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(ParquetError::Shared(err)),
            None => Ok(buffers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::io::byte_reader::tests::MemorySource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Delays every read so concurrent callers overlap
    struct SlowSource {
        inner: MemorySource,
        fail_first: bool,
        calls: AtomicUsize,
    }

    impl SlowSource {
        fn new(data: &[u8], fail_first: bool) -> Self {
            Self {
                inner: MemorySource::new(data.to_vec()),
                fail_first,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ByteRangeSource for SlowSource {
        fn total_length(&self) -> u64 {
            self.inner.total_length()
        }

        async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && call == 0 {
                return Err(ParquetError::HttpStatus {
                    url: "http://test".to_string(),
                    status: 503,
                });
            }
            self.inner.read_range(range).await
        }
    }

    fn data() -> Vec<u8> {
        (0..100u8).collect()
    }

    /// Ranges nearer the end of the file complete sooner
    struct ReversedSource {
        inner: MemorySource,
        completed: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl ByteRangeSource for ReversedSource {
        fn total_length(&self) -> u64 {
            self.inner.total_length()
        }

        async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
            let key = range.key(self.total_length())?;
            let delay = self.total_length() - key.start;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.completed.lock().push(key.start);
            self.inner.read_range(range).await
        }

        async fn read_ranges(&self, ranges: &[Option<ByteRange>]) -> Result<Vec<Bytes>> {
            let reads = ranges.iter().map(|range| async move {
                match range {
                    Some(range) => self.read_range(*range).await,
                    None => Ok(Bytes::new()),
                }
            });
            join_all(reads).await.into_iter().collect()
        }
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let source = Arc::new(SlowSource::new(&data(), false));
        let cached = CachedSource::new(source.clone());
        let range = ByteRange::bounded(20, 30).unwrap();

        let (a, b) = tokio::join!(cached.read_range(range), cached.read_range(range));

        assert_eq!(&a.unwrap()[..], &data()[20..30]);
        assert_eq!(&b.unwrap()[..], &data()[20..30]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_suffix_and_absolute_collapse() {
        let source = Arc::new(MemorySource::new(data()));
        let cached = CachedSource::new(source.clone());

        let suffix = cached.read_range(ByteRange::suffix(10).unwrap()).await.unwrap();
        let absolute = cached
            .read_range(ByteRange::bounded(90, 100).unwrap())
            .await
            .unwrap();

        assert_eq!(suffix, absolute);
        assert_eq!(source.request_count(), 1);
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_batch_fetches_only_misses() {
        let source = Arc::new(MemorySource::new(data()));
        let cached = CachedSource::new(source.clone());
        cached
            .read_range(ByteRange::bounded(0, 10).unwrap())
            .await
            .unwrap();

        let buffers = cached
            .read_ranges(&[
                Some(ByteRange::bounded(50, 60).unwrap()),
                Some(ByteRange::bounded(0, 10).unwrap()),
                None,
                Some(ByteRange::bounded(50, 60).unwrap()),
            ])
            .await
            .unwrap();

        assert_eq!(&buffers[0][..], &data()[50..60]);
        assert_eq!(&buffers[1][..], &data()[0..10]);
        assert!(buffers[2].is_empty());
        assert_eq!(&buffers[3][..], &data()[50..60]);
        assert_eq!(*source.requests.lock(), vec![0..10, 50..60]);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_evicted() {
        let source = Arc::new(SlowSource::new(&data(), true));
        let cached = CachedSource::new(source.clone());
        let range = ByteRange::bounded(0, 8).unwrap();

        let (a, b) = tokio::join!(cached.read_range(range), cached.read_range(range));
        let a = a.unwrap_err();
        assert_eq!(a.kind(), ErrorKind::Transport);
        assert!(b.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cached.is_empty());

        let retried = cached.read_range(range).await.unwrap();
        assert_eq!(&retried[..], &data()[0..8]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_order_survives_out_of_order_completion() {
        let source = Arc::new(ReversedSource {
            inner: MemorySource::new(data()),
            completed: Mutex::new(Vec::new()),
        });
        let cached = CachedSource::new(source.clone());
        let ranges = [(0, 10), (40, 50), (80, 90)]
            .map(|(start, end)| Some(ByteRange::bounded(start, end).unwrap()));

        // The last range is already in flight when the batch starts
        let (warm, batch) = tokio::join!(
            cached.read_range(ByteRange::bounded(80, 90).unwrap()),
            cached.read_ranges(&ranges)
        );

        assert_eq!(*source.completed.lock(), vec![80, 40, 0]);
        assert_eq!(&warm.unwrap()[..], &data()[80..90]);
        let batch = batch.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(&batch[0][..], &data()[0..10]);
        assert_eq!(&batch[1][..], &data()[40..50]);
        assert_eq!(&batch[2][..], &data()[80..90]);
        assert_eq!(source.inner.request_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected_before_io() {
        let source = Arc::new(MemorySource::new(data()));
        let cached = CachedSource::new(source.clone());

        let err = cached
            .read_range(ByteRange::from_offset(101).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(source.request_count(), 0);
    }
}
