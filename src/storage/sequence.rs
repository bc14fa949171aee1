//! Leased integer sequences on top of RocksDB.
//!
//! A sequence owns a block of `bandwidth` numbers at a time. Leasing writes
//! the end of the block to disk with a synced write, so after a crash the
//! next lease starts past anything that could have been handed out. Gaps are
//! possible, duplicates are not.
//!
//! # Data Flow
//! ```text
//! next() ── next < leased ──▶ return next, next += 1
//!    │
//!    └── exhausted ──▶ read stored ──▶ write stored + bandwidth (sync)
//!                                        next = stored
//!
//! release() ──▶ write next (sync), returning the unused tail
//! ```

use rocksdb::{WriteOptions, DB};

use super::error::{StorageError, StorageResult};

/// A leased sequence for one key.
#[derive(Debug)]
pub struct Sequence {
    key: Vec<u8>,
    bandwidth: u64,
    next: u64,
    leased: u64,
}

impl Sequence {
    /// Acquire the sequence at `key`, leasing the first block.
    pub fn acquire(db: &DB, key: impl Into<Vec<u8>>, bandwidth: u64) -> StorageResult<Self> {
        let mut seq = Self {
            key: key.into(),
            bandwidth: bandwidth.max(1),
            next: 0,
            leased: 0,
        };
        seq.update_lease(db)?;
        Ok(seq)
    }

    /// Next value, zero-based. Leases a new block when the current one is used up.
    pub fn next(&mut self, db: &DB) -> StorageResult<u64> {
        if self.next >= self.leased {
            self.update_lease(db)?;
        }
        let value = self.next;
        self.next += 1;
        Ok(value)
    }

    /// Give back the unused part of the lease.
    pub fn release(&mut self, db: &DB) -> StorageResult<()> {
        write_u64(db, &self.key, self.next)?;
        self.leased = self.next;
        Ok(())
    }

    fn update_lease(&mut self, db: &DB) -> StorageResult<()> {
        let stored = read_u64(db, &self.key)?;
        let lease = stored
            .checked_add(self.bandwidth)
            .ok_or_else(|| StorageError::Corrupt {
                key: String::from_utf8_lossy(&self.key).into_owned(),
                reason: "sequence overflow".to_string(),
            })?;
        write_u64(db, &self.key, lease)?;
        self.next = stored;
        self.leased = lease;
        Ok(())
    }
}

fn read_u64(db: &DB, key: &[u8]) -> StorageResult<u64> {
    match db.get(key)? {
        None => Ok(0),
        Some(bytes) => {
            let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| StorageError::Corrupt {
                key: String::from_utf8_lossy(key).into_owned(),
                reason: format!("expected 8 bytes, found {}", bytes.len()),
            })?;
            Ok(u64::from_be_bytes(raw))
        }
    }
}

fn write_u64(db: &DB, key: &[u8], value: u64) -> StorageResult<()> {
    let mut opts = WriteOptions::default();
    opts.set_sync(true);
    db.put_opt(key, value.to_be_bytes(), &opts)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_values_start_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let db = DB::open_default(dir.path()).unwrap();

        let mut seq = Sequence::acquire(&db, "seq", 3).unwrap();
        let values: Vec<u64> = (0..7).map(|_| seq.next(&db).unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn lease_is_persisted_ahead_of_use() {
        let dir = tempfile::tempdir().unwrap();
        let db = DB::open_default(dir.path()).unwrap();

        let mut seq = Sequence::acquire(&db, "seq", 10).unwrap();
        seq.next(&db).unwrap();
        assert_eq!(read_u64(&db, b"seq").unwrap(), 10);

        // Dropped without release: the tail is forfeited.
        drop(seq);
        let mut seq = Sequence::acquire(&db, "seq", 10).unwrap();
        assert_eq!(seq.next(&db).unwrap(), 10);
    }

    #[test]
    fn release_returns_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let db = DB::open_default(dir.path()).unwrap();

        let mut seq = Sequence::acquire(&db, "seq", 100).unwrap();
        seq.next(&db).unwrap();
        seq.next(&db).unwrap();
        seq.release(&db).unwrap();

        let mut seq = Sequence::acquire(&db, "seq", 100).unwrap();
        assert_eq!(seq.next(&db).unwrap(), 2);
    }

    #[test]
    fn rejects_malformed_values() {
        let dir = tempfile::tempdir().unwrap();
        let db = DB::open_default(dir.path()).unwrap();
        db.put(b"seq", b"abc").unwrap();

        let err = Sequence::acquire(&db, "seq", 2).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
