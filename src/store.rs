//! ==============================================================================
//! store.rs - bounded reading window with flat-file persistence
//! ==============================================================================
//!
//! purpose:
//!     owns every reading the collector knows about. the window is loaded once
//!     at startup from a csv file and rewritten in full after every ingest.
//!
//! retention:
//!     once the window grows past RETENTION_LIMIT the oldest TRIM_COUNT rows
//!     are dropped in one go. the window therefore saw-tooths between 76 and
//!     100 rows instead of behaving like a ring buffer. a file loaded with
//!     more rows than that shrinks by TRIM_COUNT per ingest until it fits.
//!
//! relationships:
//!     - used by: server.rs (ingest writes, dashboard and api read)
//!     - uses: timestamp.rs (csv timestamp column)
//!
//! ==============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::Reading;
use crate::error::StoreError;

/// the window may hold at most this many readings after an ingest
pub const RETENTION_LIMIT: usize = 100;
/// rows dropped from the front when the limit is exceeded
pub const TRIM_COUNT: usize = 25;

#[derive(Debug)]
pub struct Store {
    readings: Vec<Reading>,
    path: PathBuf,
}

impl Store {
    /// empty store that will persist to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { readings: Vec::new(), path: path.as_ref().to_path_buf() }
    }

    /// load the persisted window, a missing file means no history yet
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(source) => return Err(StoreError::Io { path: path.display().to_string(), source }),
        };

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let readings = reader
            .deserialize::<Reading>()
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { readings, path: path.to_path_buf() })
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn last(&self) -> Option<&Reading> {
        self.readings.last()
    }

    /// push a reading and apply the retention rule, returns rows dropped
    pub fn append(&mut self, reading: Reading) -> usize {
        self.readings.push(reading);
        apply_retention(&mut self.readings)
    }

    /// serialise the whole window as csv
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.readings.is_empty() {
            writer.write_record(["temperature", "humidity", "timestamp"])?;
        }
        for reading in &self.readings {
            writer.serialize(reading)?;
        }
        writer.into_inner().map_err(|e| StoreError::Buffer(e.to_string()))
    }

    /// overwrite the data file with the current window
    pub async fn persist(&self) -> Result<(), StoreError> {
        let bytes = self.encode()?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|source| StoreError::Io { path: self.path.display().to_string(), source })
    }
}

/// drop the oldest TRIM_COUNT readings if the window is over the limit
pub fn apply_retention(readings: &mut Vec<Reading>) -> usize {
    if readings.len() > RETENTION_LIMIT {
        readings.drain(..TRIM_COUNT);
        TRIM_COUNT
    } else {
        0
    }
}

// ==============================================================================
// shared handle
// ==============================================================================
// the ingest path takes the write lock for append -> trim -> persist so two
// posts never interleave. readers copy the window under the read lock and
// never see a half-applied ingest.

#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<Store>>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self { inner: Arc::new(RwLock::new(store)) }
    }

    /// append, trim and persist under one write guard
    ///
    /// the reading stays in memory even when the write to disk fails.
    pub async fn ingest(&self, reading: Reading) -> Result<usize, StoreError> {
        let mut store = self.inner.write().await;
        let dropped = store.append(reading);
        if dropped > 0 {
            tracing::debug!("Retention trimmed {} oldest readings", dropped);
        }

        store.persist().await?;
        Ok(store.len())
    }

    /// consistent copy of the current window
    pub async fn snapshot(&self) -> Vec<Reading> {
        self.inner.read().await.readings.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn base_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    fn reading(i: usize) -> Reading {
        Reading::new(20.0 + i as f64, 50.0 + i as f64 / 10.0, base_time() + Duration::seconds(i as i64))
    }

    #[test]
    fn test_length_follows_retention_rule() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new(dir.path().join("datos.csv"));

        let mut expected = 0usize;
        for i in 0..400 {
            store.append(reading(i));
            expected = if expected + 1 > RETENTION_LIMIT { expected + 1 - TRIM_COUNT } else { expected + 1 };
            assert_eq!(store.len(), expected, "after ingest {}", i + 1);
            assert!(store.len() <= RETENTION_LIMIT);
        }
    }

    #[test]
    fn test_101st_reading_trims_to_76() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new(dir.path().join("datos.csv"));

        for i in 0..100 {
            assert_eq!(store.append(reading(i)), 0);
        }
        assert_eq!(store.len(), 100);

        assert_eq!(store.append(reading(100)), TRIM_COUNT);
        assert_eq!(store.len(), 76);
        // the window now starts at the 26th original reading
        assert_eq!(store.readings()[0], reading(25));
        assert_eq!(store.last(), Some(&reading(100)));
    }

    #[test]
    fn test_out_of_order_timestamps_keep_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::new(dir.path().join("datos.csv"));
        store.append(reading(5));
        store.append(reading(1));
        assert_eq!(store.last(), Some(&reading(1)));
    }

    #[tokio::test]
    async fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        let mut store = Store::new(&path);
        for i in 0..3 {
            store.append(reading(i));
        }
        store.persist().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("temperature,humidity,timestamp\n"));
        assert!(text.contains("20.0,50.0,2024-05-01 08:00:00.000000"));

        let loaded = Store::load(&path).unwrap();
        assert_eq!(loaded.readings(), store.readings());
    }

    #[test]
    fn test_load_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Store::load(dir.path().join("absent.csv")).unwrap().is_empty());

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "").unwrap();
        assert!(Store::load(&empty).unwrap().is_empty());

        let header_only = dir.path().join("header.csv");
        std::fs::write(&header_only, "temperature,humidity,timestamp\n").unwrap();
        assert!(Store::load(&header_only).unwrap().is_empty());
    }

    #[test]
    fn test_load_accepts_legacy_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(
            &path,
            "temperature,humidity,timestamp\n24.0,60.0,2024-05-01 08:00:00\n25,61,2024-05-01T08:00:05.5\n",
        )
        .unwrap();

        let store = Store::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.readings()[0].timestamp, base_time());
        assert_eq!(store.readings()[1].temperature, 25.0);
    }

    #[test]
    fn test_load_reads_empty_measurements_as_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(
            &path,
            "temperature,humidity,timestamp\n,60.0,2024-05-01 08:00:00\n24.0,NaN,2024-05-01 08:00:01\n",
        )
        .unwrap();

        let store = Store::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.readings()[0].temperature.is_nan());
        assert_eq!(store.readings()[0].humidity, 60.0);
        assert!(store.readings()[1].humidity.is_nan());
    }

    #[tokio::test]
    async fn test_oversized_file_is_trimmed_once_per_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        let mut big = Store::new(&path);
        for i in 0..130 {
            big.readings.push(reading(i));
        }
        big.persist().await.unwrap();

        let loaded = Store::load(&path).unwrap();
        assert_eq!(loaded.len(), 130);

        let shared = SharedStore::new(loaded);
        assert_eq!(shared.ingest(reading(130)).await.unwrap(), 106);
        assert_eq!(shared.ingest(reading(131)).await.unwrap(), 82);
        assert_eq!(shared.ingest(reading(132)).await.unwrap(), 83);
        assert_eq!(shared.snapshot().await[0], reading(50));
    }

    #[test]
    fn test_load_rejects_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(&path, "temperature,humidity,timestamp\nhot,60.0,2024-05-01 08:00:00\n").unwrap();
        assert!(matches!(Store::load(&path), Err(StoreError::Csv(_))));
    }

    #[tokio::test]
    async fn test_shared_ingest_persists_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        let shared = SharedStore::new(Store::new(&path));

        for i in 0..101 {
            shared.ingest(reading(i)).await.unwrap();
        }
        assert_eq!(shared.len().await, 76);

        let on_disk = Store::load(&path).unwrap();
        assert_eq!(on_disk.readings(), shared.snapshot().await.as_slice());
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_reading_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be overwritten as a file
        let shared = SharedStore::new(Store::new(dir.path()));

        let result = shared.ingest(reading(0)).await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert_eq!(shared.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingests_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedStore::new(Store::new(dir.path().join("datos.csv")));

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = shared.clone();
            handles.push(tokio::spawn(async move { store.ingest(reading(i)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(shared.len().await, 50);
    }
}
