//! The event log itself.

use crate::clock::Clock;
use crate::error::{LogError, LogResult};
use crate::frame::{read_frame, Frame, ReadOutcome};
use crate::record::{Source, StoredEvent, Timestamp};
use crate::replay;
use listsync_protocol::{AppEvent, ShoppingList};
use listsync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters describing the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Live records.
    pub records: usize,
    /// Live records with `Local` provenance.
    pub local: usize,
    /// Live records with `Remote` provenance.
    pub remote: usize,
    /// Frames in the backing store, including superseded ones.
    pub frames: u64,
    /// Bytes in the backing store.
    pub bytes: u64,
}

/// Outcome of [`EventLog::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Records kept.
    pub records: usize,
    /// Store size before compaction.
    pub bytes_before: u64,
    /// Store size after compaction.
    pub bytes_after: u64,
}

/// Append-only store of every applied event.
///
/// All records are indexed in memory by timestamp; every mutation is first
/// written as a frame to the backend and synced, and only then applied to
/// the index. A failed write leaves the index untouched.
pub struct EventLog {
    backend: Box<dyn StorageBackend>,
    records: BTreeMap<Timestamp, StoredEvent>,
    clock: Clock,
    frames: u64,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("records", &self.records.len())
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl EventLog {
    /// Opens a log over `backend`, replaying every frame in it.
    ///
    /// A partly written final frame is cut off.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Corrupted`] if a frame before the tail is damaged.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> LogResult<Self> {
        let size = backend.size()?;
        let mut records = BTreeMap::new();
        let mut latest = Timestamp::default();
        let mut frames = 0u64;
        let mut offset = 0u64;

        loop {
            match read_frame(backend.as_ref(), offset, size)? {
                ReadOutcome::Frame(frame, next) => {
                    apply_replayed(&mut records, &mut latest, frame, offset)?;
                    frames += 1;
                    offset = next;
                }
                ReadOutcome::End => break,
                ReadOutcome::Torn => {
                    warn!(
                        offset,
                        discarded = size - offset,
                        "truncating partially written tail of event log"
                    );
                    backend.truncate(offset)?;
                    backend.sync()?;
                    break;
                }
            }
        }

        debug!(records = records.len(), frames, "event log opened");
        Ok(Self {
            backend,
            records,
            clock: Clock::starting_after(latest),
            frames,
        })
    }

    /// Opens or creates a file-backed log at `path`.
    ///
    /// The file is locked for the lifetime of the log.
    pub fn open_file(path: &Path) -> LogResult<Self> {
        let backend = FileBackend::open_with_create_dirs(path)?;
        info!(path = %path.display(), "opening event log");
        Self::open(Box::new(backend))
    }

    /// Creates an empty in-memory log.
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(InMemoryBackend::new()),
            records: BTreeMap::new(),
            clock: Clock::default(),
            frames: 0,
        }
    }

    /// Issues a timestamp later than every record in the log.
    pub fn next_timestamp(&mut self) -> Timestamp {
        self.clock.next()
    }

    /// Persists `record` durably before returning.
    ///
    /// # Errors
    ///
    /// Fails if a record with the same timestamp exists or the write
    /// cannot be synced. Nothing is recorded on failure.
    pub fn append(&mut self, record: StoredEvent) -> LogResult<()> {
        if self.records.contains_key(&record.timestamp) {
            return Err(LogError::DuplicateTimestamp(record.timestamp));
        }
        let frame = Frame::Insert(record.to_row()?);
        self.write_frame(&frame)?;

        debug!(
            timestamp = %record.timestamp,
            source = %record.source,
            action = record.event.action(),
            "appended record"
        );
        self.clock.observe(record.timestamp);
        self.records.insert(record.timestamp, record);
        Ok(())
    }

    /// Stamps `event` with a fresh timestamp and appends it.
    pub fn record(&mut self, event: AppEvent, source: Source) -> LogResult<StoredEvent> {
        let record = StoredEvent::new(event, source, self.next_timestamp());
        self.append(record.clone())?;
        Ok(record)
    }

    /// Returns every record, oldest first.
    pub fn query_all(&self) -> Vec<StoredEvent> {
        self.records.values().cloned().collect()
    }

    /// Returns records with the given provenance, oldest first.
    pub fn query_by_source(&self, source: Source) -> Vec<StoredEvent> {
        self.records
            .values()
            .filter(|r| r.source == source)
            .cloned()
            .collect()
    }

    /// Returns records matching `predicate`, oldest first.
    pub fn query_matching<F>(&self, predicate: F) -> Vec<StoredEvent>
    where
        F: Fn(&StoredEvent) -> bool,
    {
        self.records
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Returns the record stamped `timestamp`.
    pub fn find(&self, timestamp: Timestamp) -> Option<&StoredEvent> {
        self.records.get(&timestamp)
    }

    /// Returns local records still waiting to be sent, oldest first.
    pub fn pending(&self) -> Vec<StoredEvent> {
        self.query_matching(StoredEvent::is_pending)
    }

    /// Number of records [`EventLog::pending`] would return.
    pub fn pending_count(&self) -> usize {
        self.records.values().filter(|r| r.is_pending()).count()
    }

    /// Deletes every record matching `predicate` and returns how many.
    pub fn delete_all_matching<F>(&mut self, predicate: F) -> LogResult<usize>
    where
        F: Fn(&StoredEvent) -> bool,
    {
        let doomed: Vec<Timestamp> = self
            .records
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.timestamp)
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        self.write_frame(&Frame::Delete(doomed.clone()))?;
        for ts in &doomed {
            self.records.remove(ts);
        }
        debug!(count = doomed.len(), "deleted records");
        Ok(doomed.len())
    }

    /// Moves the record stamped `timestamp` from `Local` to `Remote`.
    ///
    /// Returns `false` without writing if there is no such record or it
    /// is already `Remote`.
    pub fn mark_acknowledged(&mut self, timestamp: Timestamp) -> LogResult<bool> {
        match self.records.get(&timestamp) {
            Some(record) if record.source == Source::Local => {}
            _ => return Ok(false),
        }

        self.write_frame(&Frame::Acknowledge(timestamp))?;
        if let Some(record) = self.records.get_mut(&timestamp) {
            record.source = Source::Remote;
        }
        debug!(%timestamp, "record acknowledged");
        Ok(true)
    }

    /// Rebuilds list state from every record in the log.
    pub fn rebuild_state(&self) -> Vec<ShoppingList> {
        replay::rebuild_state(self.records.values())
    }

    /// Rewrites the store with one frame per live record.
    pub fn compact(&mut self) -> LogResult<CompactStats> {
        let bytes_before = self.backend.size()?;
        let mut data = Vec::new();
        for record in self.records.values() {
            data.extend(Frame::Insert(record.to_row()?).encode()?);
        }

        self.backend.rewrite(&data)?;
        self.frames = self.records.len() as u64;

        let stats = CompactStats {
            records: self.records.len(),
            bytes_before,
            bytes_after: data.len() as u64,
        };
        info!(
            records = stats.records,
            bytes_before, bytes_after = stats.bytes_after, "event log compacted"
        );
        Ok(stats)
    }

    /// Returns counters for the log.
    pub fn stats(&self) -> LogResult<LogStats> {
        let local = self
            .records
            .values()
            .filter(|r| r.source == Source::Local)
            .count();
        Ok(LogStats {
            records: self.records.len(),
            local,
            remote: self.records.len() - local,
            frames: self.frames,
            bytes: self.backend.size()?,
        })
    }

    /// Returns the number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn write_frame(&mut self, frame: &Frame) -> LogResult<()> {
        let data = frame.encode()?;
        let offset = self.backend.append(&data)?;

        let durable = self.backend.flush().and_then(|()| self.backend.sync());
        if let Err(err) = durable {
            if let Err(rollback) = self.backend.truncate(offset) {
                warn!(offset, error = %rollback, "could not roll back unsynced frame");
            }
            return Err(err.into());
        }

        self.frames += 1;
        Ok(())
    }
}

fn apply_replayed(
    records: &mut BTreeMap<Timestamp, StoredEvent>,
    latest: &mut Timestamp,
    frame: Frame,
    offset: u64,
) -> LogResult<()> {
    match frame {
        Frame::Insert(row) => {
            let record = StoredEvent::from_row(&row)
                .map_err(|e| LogError::corrupted(offset, format!("unreadable event: {e}")))?;
            if records.contains_key(&record.timestamp) {
                return Err(LogError::corrupted(
                    offset,
                    format!("duplicate record timestamp {}", record.timestamp),
                ));
            }
            *latest = (*latest).max(record.timestamp);
            records.insert(record.timestamp, record);
        }
        Frame::Acknowledge(ts) => match records.get_mut(&ts) {
            Some(record) => record.source = Source::Remote,
            None => warn!(offset, timestamp = %ts, "acknowledgment for unknown record"),
        },
        Frame::Delete(timestamps) => {
            for ts in timestamps {
                records.remove(&ts);
            }
        }
    }
    Ok(())
}
