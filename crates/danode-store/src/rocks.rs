use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};
use tracing::{debug, info};

use crate::error::StoreResult;
use crate::kv::{BatchOp, KvBackend, WriteBatch};

/// Durability of a single commit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` the WAL on every commit.
    EveryWrite,
    /// Group commit; the WAL is replayed after a crash.
    #[default]
    OsDefault,
}

/// Key-value backend on a RocksDB instance.
///
/// Each [`WriteBatch`] maps onto one RocksDB write batch, so a batch is either
/// fully visible after a crash or not at all. Deleted keys leave tombstones
/// that background compaction drops, which returns their space to the disk.
pub struct RocksKv {
    db: DB,
    path: PathBuf,
    sync_mode: SyncMode,
    // Serializes the guard check with the write that follows it.
    commit_lock: Mutex<()>,
}

impl RocksKv {
    /// Open (or create) the database directory at `dir`.
    pub fn open(dir: &Path, sync_mode: SyncMode) -> StoreResult<Self> {
        let db = DB::open(&db_opts(), dir)?;
        info!(path = %dir.display(), ?sync_mode, "opened chunk database");
        Ok(Self {
            db,
            path: dir.to_path_buf(),
            sync_mode,
            commit_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the memtable and compact the whole key space.
    pub fn compact(&self) -> StoreResult<()> {
        self.db.flush()?;
        self.db.compact_range::<&[u8], &[u8]>(None, None);
        Ok(())
    }

    /// Bytes held in SST files.
    pub fn sst_bytes(&self) -> StoreResult<u64> {
        Ok(self
            .db
            .property_int_value("rocksdb.total-sst-files-size")?
            .unwrap_or(0))
    }

    fn write_opts(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_mode == SyncMode::EveryWrite);
        opts.disable_wal(false);
        opts
    }
}

fn db_opts() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);
    let threads = std::thread::available_parallelism().map_or(2, |n| n.get());
    opts.increase_parallelism(threads as i32);
    opts.set_max_background_jobs(4);
    opts.set_bytes_per_sync(1 << 20);
    opts.set_wal_bytes_per_sync(1 << 20);
    opts.set_level_compaction_dynamic_level_bytes(true);
    opts.set_paranoid_checks(true);
    opts
}

impl KvBackend for RocksKv {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn commit(&self, batch: WriteBatch) -> StoreResult<bool> {
        let _guard = self.commit_lock.lock().expect("lock poisoned");
        if let Some(guard) = batch.guard() {
            if self.db.get_pinned(guard)?.is_some() {
                return Ok(false);
            }
        }
        if batch.is_empty() {
            return Ok(true);
        }

        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => rocks_batch.put(key, value),
                BatchOp::Delete { key } => rocks_batch.delete(key),
            }
        }
        let ops = rocks_batch.len();
        self.db.write_opt(rocks_batch, &self.write_opts())?;
        debug!(ops, "chunk database commit");
        Ok(true)
    }

    fn scan_prefix(&self, prefix: &[u8], limit: usize) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for RocksKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksKv")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}
