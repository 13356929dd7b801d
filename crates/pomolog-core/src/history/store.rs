//! Durable homes for the strategy log.

use crate::error::StorageError;
use crate::strategy::StrategyRecord;

/// An append-only, ordered log of strategy records.
///
/// Stores reject a record whose sequence number is not above the last one;
/// gap checking is the sequencer's job.
pub trait LogStore {
    fn append(&mut self, record: &StrategyRecord) -> Result<(), StorageError>;

    /// Records with `seq > after`, ascending.
    fn records_after(&self, after: u64) -> Result<Vec<StrategyRecord>, StorageError>;

    /// Sequence number of the newest record, 0 when empty.
    fn last_sequence(&self) -> Result<u64, StorageError>;

    /// Atomically swaps the whole log for `records`. Used by compaction.
    fn replace_all(&mut self, records: &[StrategyRecord]) -> Result<(), StorageError>;

    fn all_records(&self) -> Result<Vec<StrategyRecord>, StorageError> {
        self.records_after(0)
    }
}

/// In-memory log, for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: Vec<StrategyRecord>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LogStore for MemoryLog {
    fn append(&mut self, record: &StrategyRecord) -> Result<(), StorageError> {
        if let Some(last) = self.records.last() {
            if record.seq <= last.seq {
                return Err(StorageError::DuplicateSequence(record.seq));
            }
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn records_after(&self, after: u64) -> Result<Vec<StrategyRecord>, StorageError> {
        let start = self.records.partition_point(|r| r.seq <= after);
        Ok(self.records[start..].to_vec())
    }

    fn last_sequence(&self) -> Result<u64, StorageError> {
        Ok(self.records.last().map_or(0, |r| r.seq))
    }

    fn replace_all(&mut self, records: &[StrategyRecord]) -> Result<(), StorageError> {
        self.records = records.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use chrono::{DateTime, Utc};

    fn record(seq: u64) -> StrategyRecord {
        StrategyRecord::new(
            seq,
            DateTime::<Utc>::UNIX_EPOCH,
            "user@local.host",
            Strategy::DeleteBacklog { uid: "B1".into() },
        )
    }

    #[test]
    fn memory_log_orders_and_filters() {
        let mut log = MemoryLog::new();
        for seq in [5, 6, 7] {
            log.append(&record(seq)).unwrap();
        }
        assert_eq!(log.last_sequence().unwrap(), 7);
        let after: Vec<u64> = log.records_after(5).unwrap().iter().map(|r| r.seq).collect();
        assert_eq!(after, vec![6, 7]);
        assert_eq!(log.all_records().unwrap().len(), 3);
    }

    #[test]
    fn memory_log_rejects_stale_sequence() {
        let mut log = MemoryLog::new();
        log.append(&record(2)).unwrap();
        assert!(matches!(
            log.append(&record(2)),
            Err(StorageError::DuplicateSequence(2))
        ));
        assert_eq!(log.len(), 1);
    }
}
