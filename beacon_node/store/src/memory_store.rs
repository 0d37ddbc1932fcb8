use crate::{metrics, DBColumn, Error, ItemStore, KeyValueStoreOp};
use parking_lot::Mutex;
use slog::{debug, Logger};
use std::collections::HashMap;

/// The in-memory reference implementation of `ItemStore`. A persistent on-disk engine
/// (`LevelDbStore`/`SledStore`) would implement the same trait and swap in transparently, since
/// every caller talks to `Store<S>`, never to `MemoryStore` directly.
pub struct MemoryStore {
    db: Mutex<HashMap<(DBColumn, Vec<u8>), Vec<u8>>>,
    log: Logger,
}

impl MemoryStore {
    pub fn open(log: Logger) -> Self {
        Self {
            db: Mutex::new(HashMap::new()),
            log,
        }
    }
}

impl ItemStore for MemoryStore {
    fn get_bytes(&self, column: DBColumn, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        lighthouse_metrics::inc_counter(&metrics::DISK_DB_READ_COUNT);
        Ok(self.db.lock().get(&(column, key.to_vec())).cloned())
    }

    fn put_bytes(&self, column: DBColumn, key: &[u8], value: &[u8]) -> Result<(), Error> {
        lighthouse_metrics::inc_counter(&metrics::DISK_DB_WRITE_COUNT);
        self.db
            .lock()
            .insert((column, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn key_exists(&self, column: DBColumn, key: &[u8]) -> bool {
        self.db.lock().contains_key(&(column, key.to_vec()))
    }

    /// Applies every op in `batch` while holding the single lock guarding the whole store, so no
    /// other reader or writer can observe the batch partially applied.
    fn do_atomically(&self, batch: Vec<KeyValueStoreOp>) -> Result<(), Error> {
        lighthouse_metrics::inc_counter(&metrics::DISK_DB_BATCH_COUNT);
        let mut db = self.db.lock();
        let len = batch.len();
        for op in batch {
            match op {
                KeyValueStoreOp::PutKeyValue(column, key, value) => {
                    db.insert((column, key), value);
                }
                KeyValueStoreOp::DeleteKey(column, key) => {
                    db.remove(&(column, key));
                }
            }
        }
        debug!(self.log, "Applied atomic batch to store"; "ops" => len);
        Ok(())
    }
}
