//! Append-only journal store
//!
//! Every committed cut batch is appended as one record; a record either
//! decodes completely or is treated as a torn tail and cut off on open.
//!
//! # Layout
//!
//! ```text
//! registry.journal:
//! [Snapshot {header, groups, entries}]   ← written by compaction
//! [Batch 7: {ops, entries}]              ← one per committed cut
//! [Batch 8: {ops, entries}]
//! ```
//!
//! Each record is framed as `[4-byte LE length][json][4-byte LE checksum]`.
//! Recovery replays records in order; a snapshot resets the state.

use super::slot::{SlotArray, SlotHeader, SlotVec, SlotWord};
use super::staged::{ChangeSet, SlotOp};
use super::{merge_entries, RegistryStore};
use crate::error::{Error, Result};
use crate::types::{Entry, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const JOURNAL_FILE: &str = "registry.journal";

/// A journal record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    /// Full state; everything before it is obsolete
    Snapshot {
        sequence: u64,
        timestamp: i64,
        header: SlotHeader,
        groups: Vec<SlotWord>,
        entries: Vec<(Selector, Entry)>,
    },
    /// One committed cut batch
    Batch {
        sequence: u64,
        timestamp: i64,
        changes: ChangeSet,
    },
}

impl JournalRecord {
    pub fn sequence(&self) -> u64 {
        match self {
            JournalRecord::Snapshot { sequence, .. } | JournalRecord::Batch { sequence, .. } => {
                *sequence
            }
        }
    }

    /// Serialize to a framed record
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| {
            Error::Serialization(format!("Failed to serialize journal record: {}", e))
        })?;

        let mut result = Vec::with_capacity(json.len() + 8);
        result.extend_from_slice(&(json.len() as u32).to_le_bytes());
        result.extend_from_slice(&json);
        result.extend_from_slice(&checksum(&json).to_le_bytes());
        Ok(result)
    }

    /// Deserialize one framed record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(Error::Serialization("Journal record too short".to_string()));
        }

        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if bytes.len() < len + 8 {
            return Err(Error::Serialization(format!(
                "Incomplete journal record: expected {} bytes, got {}",
                len + 8,
                bytes.len()
            )));
        }

        let json = &bytes[4..4 + len];
        let stored = u32::from_le_bytes([
            bytes[4 + len],
            bytes[5 + len],
            bytes[6 + len],
            bytes[7 + len],
        ]);
        if stored != checksum(json) {
            return Err(Error::Serialization("Checksum mismatch".to_string()));
        }

        serde_json::from_slice(json).map_err(|e| {
            Error::Serialization(format!("Failed to deserialize journal record: {}", e))
        })
    }
}

/// Rotating XOR over the payload
fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b))
}

/// Journal tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalOptions {
    /// fsync after every appended record
    pub sync_writes: bool,
    /// Compact after this many batch records; 0 disables automatic compaction
    pub compact_after: u64,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            sync_writes: true,
            compact_after: 1024,
        }
    }
}

/// Journal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalStats {
    pub next_sequence: u64,
    pub journal_bytes: u64,
    pub batches_since_compaction: u64,
}

/// File-backed registry store
pub struct JournalStore {
    path: PathBuf,
    options: JournalOptions,
    slots: SlotVec,
    entries: HashMap<Selector, Entry>,
    next_sequence: u64,
    journal_len: u64,
    batches_since_compaction: u64,
}

impl JournalStore {
    /// Create or open a journal store in `base_path`
    pub fn open<P: AsRef<Path>>(base_path: P, options: JournalOptions) -> Result<Self> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)
            .map_err(|e| Error::Storage(format!("Failed to create journal dir: {}", e)))?;

        let mut store = Self {
            path: base_path.join(JOURNAL_FILE),
            options,
            slots: SlotVec::new(),
            entries: HashMap::new(),
            next_sequence: 0,
            journal_len: 0,
            batches_since_compaction: 0,
        };

        store.recover()?;
        Ok(store)
    }

    /// Open with default options
    pub fn with_defaults<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        Self::open(base_path, JournalOptions::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> JournalStats {
        JournalStats {
            next_sequence: self.next_sequence,
            journal_bytes: self.journal_len,
            batches_since_compaction: self.batches_since_compaction,
        }
    }

    /// Rebuild in-memory state from the journal
    fn recover(&mut self) -> Result<()> {
        if !self.path.exists() {
            info!(path = ?self.path, "No journal found, starting fresh");
            return Ok(());
        }

        info!(path = ?self.path, "Recovering registry from journal");

        let file = File::open(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to open journal: {}", e)))?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::Storage(format!("Failed to stat journal: {}", e)))?
            .len();
        let mut reader = BufReader::new(file);

        let mut valid_len = 0u64;
        let mut records = 0u64;

        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    warn!("Error reading record length: {}", e);
                    break;
                }
            }

            let len = u32::from_le_bytes(len_bytes) as usize;
            if valid_len + len as u64 + 8 > file_len {
                warn!(offset = valid_len, "Journal ends in a torn record");
                break;
            }

            let mut record_bytes = vec![0u8; len + 8];
            record_bytes[0..4].copy_from_slice(&len_bytes);
            if let Err(e) = reader.read_exact(&mut record_bytes[4..]) {
                warn!(offset = valid_len, "Failed to read journal record: {}", e);
                break;
            }

            let record = match JournalRecord::from_bytes(&record_bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(offset = valid_len, "Failed to decode journal record: {}", e);
                    break;
                }
            };

            self.replay_record(record)?;
            valid_len += record_bytes.len() as u64;
            records += 1;
        }

        if valid_len < file_len {
            warn!(
                valid = valid_len,
                total = file_len,
                "Truncating journal to last complete record"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| Error::Storage(format!("Failed to open journal: {}", e)))?;
            file.set_len(valid_len)
                .map_err(|e| Error::Storage(format!("Failed to truncate journal: {}", e)))?;
        }
        self.journal_len = valid_len;

        info!(
            records,
            selectors = self.entries.len(),
            next_sequence = self.next_sequence,
            "Journal recovery complete"
        );
        Ok(())
    }

    fn replay_record(&mut self, record: JournalRecord) -> Result<()> {
        self.next_sequence = self.next_sequence.max(record.sequence() + 1);
        match record {
            JournalRecord::Snapshot {
                header,
                groups,
                entries,
                ..
            } => {
                let mut slots = SlotVec::new();
                for word in groups {
                    slots.append_group(word)?;
                }
                slots.set_length(header)?;
                self.slots = slots;
                self.entries = entries.into_iter().collect();
                self.batches_since_compaction = 0;
            }
            JournalRecord::Batch { changes, .. } => {
                changes.replay(&mut self.slots).map_err(|e| {
                    Error::Corrupt(format!("Journal batch does not replay: {}", e))
                })?;
                merge_entries(&mut self.entries, &changes.entries);
                self.batches_since_compaction += 1;
            }
        }
        Ok(())
    }

    fn append_record(&mut self, record: &JournalRecord) -> Result<()> {
        let bytes = record.to_bytes()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Storage(format!("Failed to open journal: {}", e)))?;

        let written = file.write_all(&bytes).and_then(|_| {
            if self.options.sync_writes {
                file.sync_all()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Drop whatever part of the record made it to disk
            if let Err(trunc) = file.set_len(self.journal_len) {
                warn!("Failed to roll back journal tail: {}", trunc);
            }
            return Err(Error::Storage(format!("Failed to append journal record: {}", e)));
        }

        self.journal_len += bytes.len() as u64;
        Ok(())
    }

    /// Rewrite the journal as a single snapshot
    pub fn compact(&mut self) -> Result<()> {
        info!(path = ?self.path, "Compacting journal");

        let sequence = self.next_sequence;
        let mut entries: Vec<_> = self.entries.iter().map(|(s, e)| (*s, *e)).collect();
        entries.sort_by_key(|(_, entry)| entry.location());

        let snapshot = JournalRecord::Snapshot {
            sequence,
            timestamp: chrono::Utc::now().timestamp_millis(),
            header: self.slots.length(),
            groups: self.slots.groups().to_vec(),
            entries,
        };
        let bytes = snapshot.to_bytes()?;

        let temp_path = self.path.with_extension("journal.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::Storage(format!("Failed to create temp journal: {}", e)))?;

        file.write_all(&bytes)
            .map_err(|e| Error::Storage(format!("Failed to write compacted journal: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::Storage(format!("Failed to sync compacted journal: {}", e)))?;

        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::Storage(format!("Failed to replace journal: {}", e)))?;

        let before = self.journal_len;
        self.next_sequence = sequence + 1;
        self.journal_len = bytes.len() as u64;
        self.batches_since_compaction = 0;

        info!(before, after = self.journal_len, "Journal compaction complete");
        Ok(())
    }
}

impl SlotArray for JournalStore {
    fn length(&self) -> SlotHeader {
        self.slots.length()
    }

    fn set_length(&mut self, header: SlotHeader) -> Result<()> {
        self.apply(ChangeSet {
            ops: vec![SlotOp::SetLength { header }],
            entries: Vec::new(),
        })
    }

    fn group_count(&self) -> u64 {
        self.slots.group_count()
    }

    fn read_group(&self, index: u64) -> Result<SlotWord> {
        self.slots.read_group(index)
    }

    fn write_group(&mut self, index: u64, word: SlotWord) -> Result<()> {
        self.apply(ChangeSet {
            ops: vec![SlotOp::Write { index, word }],
            entries: Vec::new(),
        })
    }

    fn delete_group(&mut self, index: u64) -> Result<()> {
        self.apply(ChangeSet {
            ops: vec![SlotOp::Delete { index }],
            entries: Vec::new(),
        })
    }

    fn append_group(&mut self, word: SlotWord) -> Result<()> {
        self.apply(ChangeSet {
            ops: vec![SlotOp::Append { word }],
            entries: Vec::new(),
        })
    }
}

impl RegistryStore for JournalStore {
    fn load_entries(&self) -> Result<HashMap<Selector, Entry>> {
        Ok(self.entries.clone())
    }

    fn apply(&mut self, changes: ChangeSet) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // The batch must replay cleanly before it is made durable
        let mut slots = self.slots.clone();
        changes.replay(&mut slots)?;

        let sequence = self.next_sequence;
        let ops = changes.ops.len();
        let updates = changes.entries.clone();
        let record = JournalRecord::Batch {
            sequence,
            timestamp: chrono::Utc::now().timestamp_millis(),
            changes,
        };
        self.append_record(&record)?;

        self.slots = slots;
        merge_entries(&mut self.entries, &updates);
        self.next_sequence = sequence + 1;
        self.batches_since_compaction += 1;

        debug!(sequence, ops, entries = updates.len(), "Appended journal batch");

        // The batch is durable at this point; a failed compaction only
        // leaves a longer journal behind
        if self.options.compact_after > 0
            && self.batches_since_compaction >= self.options.compact_after
        {
            if let Err(e) = self.compact() {
                warn!(error = %e, sequence, "Automatic journal compaction failed");
            }
        }
        Ok(())
    }
}
